//! Embassy time driver on the CH32V203 SysTick

use core::cell::Cell;

use critical_section::Mutex;
use embassy_time_driver::{AlarmHandle, Driver};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

const STK_CTLR: usize = 0xE000_F000;
const STK_SR: usize = 0xE000_F004;
const STK_CNTL: usize = 0xE000_F008;
const STK_CMPLR: usize = 0xE000_F010;
const STK_CMPHR: usize = 0xE000_F014;

/// HCLK after reset (HSI, no PLL)
const HCLK_HZ: u32 = 8_000_000;

/// SysTick reload period in HCLK cycles
const CYCLES_PER_TICK: u32 = HCLK_HZ / embassy_time_driver::TICK_HZ as u32;

#[derive(Copy, Clone)]
struct AlarmCallback {
    callback: fn(*mut ()),
    ctx: *mut (),
}

// SAFETY: the context pointer is only dereferenced by the executor that registered it
unsafe impl Send for AlarmCallback {}

/// Tick counter advanced by the SysTick compare interrupt, with a single alarm
pub struct SysTickDriver {
    tick_count: AtomicU64,
    alarm_at: AtomicU64,
    allocated: AtomicBool,
    callback: Mutex<Cell<Option<AlarmCallback>>>,
}

impl SysTickDriver {
    const fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            alarm_at: AtomicU64::new(u64::MAX),
            allocated: AtomicBool::new(false),
            callback: Mutex::new(Cell::new(None)),
        }
    }

    /// Advance one tick and fire the alarm when due (SysTick interrupt)
    pub fn tick(&self) {
        let now = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;
        if now < self.alarm_at.load(Ordering::Relaxed) {
            return;
        }
        self.alarm_at.store(u64::MAX, Ordering::Relaxed);
        let pending = critical_section::with(|cs| self.callback.borrow(cs).get());
        if let Some(alarm) = pending {
            (alarm.callback)(alarm.ctx);
        }
    }
}

impl Driver for SysTickDriver {
    fn now(&self) -> u64 {
        self.tick_count.load(Ordering::Relaxed)
    }

    unsafe fn allocate_alarm(&self) -> Option<AlarmHandle> {
        if self.allocated.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(AlarmHandle::new(0))
        }
    }

    fn set_alarm_callback(&self, _alarm: AlarmHandle, callback: fn(*mut ()), ctx: *mut ()) {
        critical_section::with(|cs| {
            self.callback.borrow(cs).set(Some(AlarmCallback { callback, ctx }));
        });
    }

    fn set_alarm(&self, _alarm: AlarmHandle, timestamp: u64) -> bool {
        if timestamp <= self.now() {
            self.alarm_at.store(u64::MAX, Ordering::Relaxed);
            return false;
        }
        self.alarm_at.store(timestamp, Ordering::Relaxed);
        true
    }
}

embassy_time_driver::time_driver_impl!(static DRIVER: SysTickDriver = SysTickDriver::new());

/// Start SysTick at the embassy tick rate
pub fn init() {
    let compare = CYCLES_PER_TICK;
    // SAFETY: SysTick registers of the CH32V203
    unsafe {
        core::ptr::write_volatile(STK_CTLR as *mut u32, 0);
        core::ptr::write_volatile(STK_CMPLR as *mut u32, compare - 1);
        core::ptr::write_volatile(STK_CMPHR as *mut u32, 0);
        core::ptr::write_volatile(STK_SR as *mut u32, 0);
        // STE | STIE | STCLK (HCLK) | STRE (auto-reload)
        core::ptr::write_volatile(STK_CTLR as *mut u32, 0b1111);
    }
}

/// Microsecond timestamp from the tick count and the live SysTick counter
pub fn now_us() -> u32 {
    critical_section::with(|_| {
        let mut ticks = DRIVER.tick_count.load(Ordering::Relaxed);
        // SAFETY: read-only access to the SysTick counter and status
        let mut count = unsafe { core::ptr::read_volatile(STK_CNTL as *const u32) };
        // Reloaded with the compare interrupt still pending
        if unsafe { core::ptr::read_volatile(STK_SR as *const u32) } & 1 != 0 {
            count = unsafe { core::ptr::read_volatile(STK_CNTL as *const u32) };
            ticks += 1;
        }
        monitor_core::counter_micros(ticks, CYCLES_PER_TICK, count, HCLK_HZ / 1_000_000)
    })
}

/// SysTick compare interrupt
pub fn on_systick_interrupt() {
    // SAFETY: clearing the compare flag
    unsafe { core::ptr::write_volatile(STK_SR as *mut u32, 0) };
    DRIVER.tick();
}

// Critical section implementation for single-core RISC-V
critical_section::set_impl!(RiscvCriticalSection);

struct RiscvCriticalSection;

unsafe impl critical_section::Impl for RiscvCriticalSection {
    unsafe fn acquire() -> u8 {
        let mut mstatus: usize;
        core::arch::asm!("csrrci {}, mstatus, 8", out(reg) mstatus);
        (mstatus & 8) as u8
    }

    unsafe fn release(was_active: u8) {
        if was_active != 0 {
            core::arch::asm!("csrsi mstatus, 8");
        }
    }
}
