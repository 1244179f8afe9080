#![no_std]

//! Firmware library: static resources, interrupt front-ends and tasks

pub use embassy_executor::Spawner;
pub use embassy_time::{Delay, Duration};
pub use static_cell::StaticCell;

pub use monitor_core::*;

pub use crate::ch32v203_hardware::*;
pub use crate::tasks::*;

/// Range assumed until both calibration points are captured
pub const UNCALIBRATED: CapacityRange = CapacityRange::new(400, 2);

/// Every entity shared between the workers
pub static SHARED: SharedState = SharedState::new(UNCALIBRATED);

pub static KEYPAD_JOBS: JobQueue<KeypadJob> = JobQueue::new();
pub static RANGER_JOBS: JobQueue<RangerJob> = JobQueue::new();
pub static OUTPUT_JOBS: JobQueue<OutputJob> = JobQueue::new();

pub static ACTIVE_ROW: ActiveRow = ActiveRow::new();
pub static ECHO: EchoCapture = EchoCapture::new();
static CLOCK: EmbassyClock = EmbassyClock;

/// Column interrupt front-end
pub static KEYPAD_IRQ: KeypadIrq<'static, EmbassyClock> = KeypadIrq::new(&KEYPAD_JOBS, &ACTIVE_ROW, &CLOCK);

/// Echo interrupt front-end
pub static RANGER_IRQ: RangerIrq<'static, EmbassyClock> = RangerIrq::new(&RANGER_JOBS, &ECHO, &CLOCK);

pub type Lcd = I2cLcd<Ch32I2c, Delay>;
pub type Keypad = KeypadWorker<'static, GpioLine, Delay, GpioLine>;
pub type Ranger = RangerWorker<'static, GpioLine, Delay, STABILIZER_LEN>;
pub type Output = OutputWorker<'static, Lcd, AlarmOutput>;

// Embassy tasks module
pub mod tasks {
    use super::*;

    #[embassy_executor::task]
    pub async fn keypad_task(mut worker: Keypad) {
        #[cfg(feature = "defmt")]
        defmt::info!("⌨️ Keypad worker started");
        worker.run().await
    }

    #[embassy_executor::task]
    pub async fn ranger_task(mut worker: Ranger) {
        #[cfg(feature = "defmt")]
        defmt::info!("📏 Ranger worker started");
        worker.run().await
    }

    #[embassy_executor::task]
    pub async fn output_task(mut worker: Output) {
        #[cfg(feature = "defmt")]
        defmt::info!("🖥️ Output worker started");
        worker.run().await
    }

    /// Debounce countdown and watchdog
    #[embassy_executor::task]
    pub async fn supervisor_task(mut supervisor: Supervisor<'static, IndependentWatchdog>, period: Duration) {
        #[cfg(feature = "defmt")]
        defmt::info!("🐕 Supervisor started");
        supervisor.run(period).await
    }

    #[embassy_executor::task]
    pub async fn keypad_feed_task(job: KeypadJob, period: Duration) {
        periodic(&KEYPAD_JOBS, job, period).await
    }

    #[embassy_executor::task]
    pub async fn ranger_feed_task(job: RangerJob, period: Duration) {
        periodic(&RANGER_JOBS, job, period).await
    }

    /// Refresh and clock tick both feed the output queue
    #[embassy_executor::task(pool_size = 2)]
    pub async fn output_feed_task(job: OutputJob, period: Duration) {
        periodic(&OUTPUT_JOBS, job, period).await
    }
}

// CH32V203 hardware module
pub mod ch32v203_hardware;

// Time driver for embassy
pub mod time_driver;
