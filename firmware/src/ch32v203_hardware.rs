//! CH32V203 Hardware Implementation
//!
//! 64KB Flash / 20KB RAM - register-level GPIO, EXTI, IWDG and I2C1

use core::ptr::{read_volatile, write_volatile};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

use monitor_core::{HalError, MonotonicClock, OutputLine, Watchdog};

use crate::{KEYPAD_IRQ, RANGER_IRQ};

mod reg {
    pub const RCC_APB2PCENR: usize = 0x4002_1018;
    pub const RCC_APB1PCENR: usize = 0x4002_101C;

    pub const GPIOA: usize = 0x4001_0800;
    pub const GPIOB: usize = 0x4001_0C00;
    pub const GPIOC: usize = 0x4001_1000;

    pub const CFGLR: usize = 0x00;
    pub const CFGHR: usize = 0x04;
    pub const INDR: usize = 0x08;
    pub const OUTDR: usize = 0x0C;
    pub const BSHR: usize = 0x10;

    pub const EXTI_INTENR: usize = 0x4001_0400;
    pub const EXTI_RTENR: usize = 0x4001_0408;
    pub const EXTI_FTENR: usize = 0x4001_040C;
    pub const EXTI_INTFR: usize = 0x4001_0414;

    pub const PFIC_IENR1: usize = 0xE000_E100;

    pub const IWDG_CTLR: usize = 0x4000_3000;
    pub const IWDG_PSCR: usize = 0x4000_3004;
    pub const IWDG_RLDR: usize = 0x4000_3008;

    pub const I2C1: usize = 0x4000_5400;
    pub const I2C_CTLR1: usize = 0x00;
    pub const I2C_CTLR2: usize = 0x04;
    pub const I2C_DATAR: usize = 0x10;
    pub const I2C_STAR1: usize = 0x14;
    pub const I2C_STAR2: usize = 0x18;
    pub const I2C_CKCFGR: usize = 0x1C;
}

fn read(addr: usize) -> u32 {
    // SAFETY: every address used is a memory-mapped peripheral register of the CH32V203
    unsafe { read_volatile(addr as *const u32) }
}

fn write(addr: usize, value: u32) {
    // SAFETY: see `read`
    unsafe { write_volatile(addr as *mut u32, value) }
}

fn modify(addr: usize, f: impl FnOnce(u32) -> u32) {
    critical_section::with(|_| write(addr, f(read(addr))));
}

/// GPIO port of the CH32V203
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    C,
}

impl Port {
    const fn base(self) -> usize {
        match self {
            Port::A => reg::GPIOA,
            Port::B => reg::GPIOB,
            Port::C => reg::GPIOC,
        }
    }
}

/// Pin configuration nibble (CNF[1:0] MODE[1:0])
#[derive(Copy, Clone, Debug)]
enum PinMode {
    /// Push-pull output, 10 MHz
    PushPull = 0b0001,
    /// Input with pull-up or pull-down, selected by OUTDR
    Pulled = 0b1000,
    /// Alternate function open-drain, 10 MHz
    AltOpenDrain = 0b1101,
}

fn configure(port: Port, pin: u8, mode: PinMode) {
    let (offset, shift) = if pin < 8 {
        (reg::CFGLR, pin * 4)
    } else {
        (reg::CFGHR, (pin - 8) * 4)
    };
    modify(port.base() + offset, |v| (v & !(0xF << shift)) | ((mode as u32) << shift));
}

fn read_pin(port: Port, pin: u8) -> bool {
    read(port.base() + reg::INDR) & (1 << pin) != 0
}

/// Push-pull output line with optional active-low drive
pub struct GpioLine {
    port: Port,
    pin: u8,
    inverted: bool,
    state: bool,
}

impl GpioLine {
    pub fn new(port: Port, pin: u8, inverted: bool) -> Self {
        configure(port, pin, PinMode::PushPull);
        let mut line = Self { port, pin, inverted, state: true };
        // Start inactive regardless of the reset level
        let _ = line.set_state(false);
        line
    }
}

impl OutputLine for GpioLine {
    type Error = HalError;

    fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
        let level = state != self.inverted;
        let bit = if level { 1 << self.pin } else { 1 << (self.pin + 16) };
        write(self.port.base() + reg::BSHR, bit);
        self.state = state;
        Ok(())
    }

    fn get_state(&self) -> Result<bool, Self::Error> {
        Ok(self.state)
    }
}

/// Buzzer module: a power line plus an active-low drive line
pub struct AlarmOutput {
    _power: GpioLine,
    drive: GpioLine,
}

impl AlarmOutput {
    /// The drive goes inactive before the module is powered so it never chirps at boot
    pub fn new(mut power: GpioLine, drive: GpioLine) -> Self {
        let _ = power.set_state(true);
        Self { _power: power, drive }
    }
}

impl OutputLine for AlarmOutput {
    type Error = HalError;

    fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        if state != self.drive.state {
            defmt::info!("🚨 Alarm: {}", if state { "ON" } else { "OFF" });
        }
        self.drive.set_state(state)
    }

    fn get_state(&self) -> Result<bool, Self::Error> {
        self.drive.get_state()
    }
}

/// Microsecond timestamps from the SysTick behind the embassy time driver
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    fn now_us(&self) -> u32 {
        crate::time_driver::now_us()
    }
}

/// Independent watchdog clocked from the 40 kHz LSI
pub struct IndependentWatchdog {
    running: bool,
}

impl IndependentWatchdog {
    /// LSI / 256
    const PRESCALER: u32 = 6;
    const TICK_US: u32 = 6_400;
    const MAX_RELOAD: u32 = 0x0FFF;

    pub const fn new() -> Self {
        Self { running: false }
    }
}

impl Watchdog for IndependentWatchdog {
    type Error = HalError;

    fn start(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
        // Longest reachable timeout is about 26 s
        let reload = (timeout_ms.saturating_mul(1_000) / Self::TICK_US).clamp(1, Self::MAX_RELOAD);
        write(reg::IWDG_CTLR, 0x5555);
        write(reg::IWDG_PSCR, Self::PRESCALER);
        write(reg::IWDG_RLDR, reload);
        write(reg::IWDG_CTLR, 0xAAAA);
        write(reg::IWDG_CTLR, 0xCCCC);
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn kick(&mut self) -> Result<(), Self::Error> {
        if !self.running {
            return Err(HalError::NotInitialized);
        }
        write(reg::IWDG_CTLR, 0xAAAA);
        Ok(())
    }
}

/// Blocking I2C1 master, writes only (PB6 SCL, PB7 SDA)
pub struct Ch32I2c {
    _private: (),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    Nack,
    Timeout,
    Unsupported,
}

impl embedded_hal::i2c::Error for I2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            I2cError::Nack => ErrorKind::NoAcknowledge(embedded_hal::i2c::NoAcknowledgeSource::Unknown),
            I2cError::Timeout | I2cError::Unsupported => ErrorKind::Other,
        }
    }
}

impl Ch32I2c {
    const START: u32 = 1 << 8;
    const STOP: u32 = 1 << 9;
    const PE: u32 = 1 << 0;

    const SB: u32 = 1 << 0;
    const ADDR: u32 = 1 << 1;
    const BTF: u32 = 1 << 2;
    const TXE: u32 = 1 << 7;
    const AF: u32 = 1 << 10;

    const SPIN_LIMIT: u32 = 100_000;

    /// 100 kHz standard mode from an 8 MHz APB1
    pub fn new() -> Self {
        modify(reg::RCC_APB1PCENR, |v| v | (1 << 21));
        configure(Port::B, pins::LCD_SCL, PinMode::AltOpenDrain);
        configure(Port::B, pins::LCD_SDA, PinMode::AltOpenDrain);

        write(reg::I2C1 + reg::I2C_CTLR1, 0);
        write(reg::I2C1 + reg::I2C_CTLR2, 8);
        write(reg::I2C1 + reg::I2C_CKCFGR, 40);
        write(reg::I2C1 + reg::I2C_CTLR1, Self::PE);
        Self { _private: () }
    }

    fn wait(&self, flag: u32) -> Result<(), I2cError> {
        for _ in 0..Self::SPIN_LIMIT {
            let status = read(reg::I2C1 + reg::I2C_STAR1);
            if status & Self::AF != 0 {
                modify(reg::I2C1 + reg::I2C_STAR1, |v| v & !Self::AF);
                self.stop();
                return Err(I2cError::Nack);
            }
            if status & flag != 0 {
                return Ok(());
            }
        }
        self.stop();
        Err(I2cError::Timeout)
    }

    fn stop(&self) {
        modify(reg::I2C1 + reg::I2C_CTLR1, |v| v | Self::STOP);
    }

    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), I2cError> {
        modify(reg::I2C1 + reg::I2C_CTLR1, |v| v | Self::START);
        self.wait(Self::SB)?;
        write(reg::I2C1 + reg::I2C_DATAR, (address as u32) << 1);
        self.wait(Self::ADDR)?;
        // Reading STAR2 after STAR1 clears ADDR
        let _ = read(reg::I2C1 + reg::I2C_STAR2);

        for &byte in bytes {
            self.wait(Self::TXE)?;
            write(reg::I2C1 + reg::I2C_DATAR, byte as u32);
        }
        self.wait(Self::BTF)?;
        self.stop();
        Ok(())
    }
}

impl ErrorType for Ch32I2c {
    type Error = I2cError;
}

impl I2c<SevenBitAddress> for Ch32I2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => self.write_bytes(address, bytes)?,
                Operation::Read(_) => return Err(I2cError::Unsupported),
            }
        }
        Ok(())
    }
}

/// Monitor I/O lines, configured and ready for the workers
pub struct Ch32v203MonitorHal {
    pub rows: [GpioLine; 4],
    pub trigger: GpioLine,
    pub indicator: GpioLine,
    pub alarm: AlarmOutput,
    pub watchdog: IndependentWatchdog,
    pub i2c: Ch32I2c,
}

impl Ch32v203MonitorHal {
    /// Initialize CH32V203 hardware
    pub fn new() -> Self {
        // AFIO plus ports A, B and C
        modify(reg::RCC_APB2PCENR, |v| v | 0b1_1101);

        for pin in pins::COLUMNS {
            configure(Port::A, pin, PinMode::Pulled);
        }
        configure(Port::A, pins::ECHO, PinMode::Pulled);
        // Pull-downs: OUTDR bit clear
        let inputs = pins::COLUMNS.iter().fold(1 << pins::ECHO, |m, &p| m | (1 << p));
        modify(Port::A.base() + reg::OUTDR, |v| v & !inputs);

        let hal = Self {
            rows: pins::ROWS.map(|pin| GpioLine::new(Port::B, pin, false)),
            trigger: GpioLine::new(Port::A, pins::TRIGGER, false),
            indicator: GpioLine::new(Port::C, pins::INDICATOR, false),
            alarm: AlarmOutput::new(
                GpioLine::new(Port::B, pins::ALARM_POWER, false),
                GpioLine::new(Port::B, pins::ALARM_DRIVE, true),
            ),
            watchdog: IndependentWatchdog::new(),
            i2c: Ch32I2c::new(),
        };

        // Both edges on the columns and the echo line
        write(reg::EXTI_RTENR, inputs);
        write(reg::EXTI_FTENR, inputs);
        write(reg::EXTI_INTFR, inputs);
        write(reg::EXTI_INTENR, inputs);
        // EXTI0..EXTI3 are IRQ 22..25, EXTI9_5 is IRQ 39
        write(reg::PFIC_IENR1, 0b1111 << 22);
        write(reg::PFIC_IENR1 + 4, 1 << (39 - 32));

        #[cfg(feature = "defmt")]
        defmt::info!("🔌 CH32V203 HAL initialized");

        hal
    }
}

/// Shared EXTI handler for EXTI0..EXTI3 and EXTI9_5
///
/// Only reads levels and timestamps; the work is queued for the workers.
pub fn on_exti_interrupt() {
    let pending = read(reg::EXTI_INTFR);
    write(reg::EXTI_INTFR, pending);

    for (column, &pin) in pins::COLUMNS.iter().enumerate() {
        if pending & (1 << pin) != 0 {
            let rising = read_pin(Port::A, pin);
            if KEYPAD_IRQ.on_column_edge(column as u8, rising).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("⌨️ Keypad queue full, edge dropped");
            }
        }
    }

    if pending & (1 << pins::ECHO) != 0 {
        let rising = read_pin(Port::A, pins::ECHO);
        if RANGER_IRQ.on_echo_edge(rising).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("📏 Ranger queue full, echo dropped");
        }
    }
}

/// CH32V203 pin configuration constants
pub mod pins {
    /// Keypad row drives on port B, rows *0#D, 789C, 456B, 123A
    pub const ROWS: [u8; 4] = [12, 13, 14, 15];

    /// Keypad column inputs on port A (EXTI0..EXTI3), columns DCBA, #963, 0852, *741
    pub const COLUMNS: [u8; 4] = [0, 1, 2, 3];

    /// Ranger echo input (PA8, EXTI8)
    pub const ECHO: u8 = 8;

    /// Ranger trigger output (PA9)
    pub const TRIGGER: u8 = 9;

    /// Buzzer module supply (PB10)
    pub const ALARM_POWER: u8 = 10;

    /// Buzzer drive, active low (PB11)
    pub const ALARM_DRIVE: u8 = 11;

    /// Key-detected LED (PC13)
    pub const INDICATOR: u8 = 13;

    /// LCD backpack on I2C1 (PB6 SCL, PB7 SDA)
    pub const LCD_SCL: u8 = 6;
    pub const LCD_SDA: u8 = 7;
}

/// CH32V203 memory layout information
pub mod memory {
    /// Available RAM
    pub const RAM_SIZE: u32 = 20 * 1024;

    /// Embassy task arena size
    pub const TASK_ARENA_SIZE: u32 = 8 * 1024;
}
