#![no_std]
#![no_main]

#[cfg(feature = "defmt")]
use defmt_rtt as _;

// RISC-V runtime
use riscv_rt as _;

// Panic handler
#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use panic_probe as _;

use embassy_executor::Spawner;

use closing_monitor_firmware::*;

/// PFIC interrupt numbers reported in mcause
mod irq {
    pub const SYSTICK: usize = 12;
    pub const EXTI0: usize = 22;
    pub const EXTI3: usize = 25;
    pub const EXTI9_5: usize = 39;
}

/// Main firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    #[cfg(feature = "defmt")]
    defmt::info!("🔧 Closing Monitor Firmware Starting...");

    let config = default_config();
    if config.validate().is_err() {
        #[cfg(feature = "defmt")]
        defmt::error!("❌ Invalid configuration");
        return;
    }

    time_driver::init();
    let hal = Ch32v203MonitorHal::new();
    #[cfg(feature = "defmt")]
    defmt::info!("✅ Hardware initialized");

    let gate = DebounceGate::new(config.debounce_ticks);

    let scanner = KeypadScanner::new(hal.rows, Delay, &ACTIVE_ROW, config.row_settle_us, config.row_buffer_us);
    let mut keypad: Keypad = KeypadWorker::new(&KEYPAD_JOBS, &SHARED, gate, scanner, hal.indicator);

    let ranger = DistanceRanger::new(hal.trigger, Delay, &config);
    let ranger: Ranger = RangerWorker::new(&RANGER_JOBS, &SHARED, &ECHO, ranger);

    let lcd: Lcd = I2cLcd::new(hal.i2c, Delay, lcd::DEFAULT_ADDRESS);
    let mut output: Output = OutputWorker::new(&OUTPUT_JOBS, &SHARED, lcd, hal.alarm);

    if let Err(_e) = keypad.start() {
        #[cfg(feature = "defmt")]
        defmt::error!("❌ Keypad start failed: {}", _e);
    }
    if let Err(_e) = output.start() {
        #[cfg(feature = "defmt")]
        defmt::error!("❌ Display start failed: {}", _e);
    }

    let supervisor = Supervisor::new(&SHARED, gate, hal.watchdog, config.watchdog_timeout_ms);

    // SAFETY: every handler reached from the trap only touches atomics and job queues
    unsafe { riscv::interrupt::enable() };

    #[cfg(feature = "defmt")]
    defmt::info!("🚀 Spawning monitor tasks...");

    spawner.must_spawn(keypad_task(keypad));
    spawner.must_spawn(ranger_task(ranger));
    spawner.must_spawn(output_task(output));
    spawner.must_spawn(supervisor_task(supervisor, config.debounce_period));

    spawner.must_spawn(keypad_feed_task(KeypadJob::Scan, config.scan_period));
    spawner.must_spawn(ranger_feed_task(RangerJob::Poll, config.poll_period));
    spawner.must_spawn(output_feed_task(OutputJob::Refresh, config.refresh_period));
    spawner.must_spawn(output_feed_task(OutputJob::ClockTick, config.clock_period));

    #[cfg(feature = "defmt")]
    defmt::info!("✨ Closing monitor ready!");
}

/// Peripheral interrupts land here through the common trap entry
#[export_name = "DefaultHandler"]
fn interrupt_dispatch() {
    let code = riscv::register::mcause::read().code();
    match code {
        irq::SYSTICK => time_driver::on_systick_interrupt(),
        irq::EXTI0..=irq::EXTI3 | irq::EXTI9_5 => on_exti_interrupt(),
        _ => {
            #[cfg(feature = "defmt")]
            defmt::warn!("Unexpected interrupt {}", code);
        }
    }
}
