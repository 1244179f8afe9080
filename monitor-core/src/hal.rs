//! Hardware capabilities the monitor is written against

// Re-export time types based on feature
#[cfg(feature = "embassy-time")]
pub use embassy_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
pub use self::mock_time::{Duration, Instant};

#[cfg(not(feature = "embassy-time"))]
mod mock_time {
    /// Mock instant type for compilation without embassy-time
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Instant(u64);

    impl Instant {
        pub fn now() -> Self {
            Self(0) // Placeholder implementation
        }

        pub const fn from_millis(ms: u64) -> Self {
            Self(ms)
        }

        pub fn duration_since(&self, other: Instant) -> Duration {
            Duration::from_millis(self.0.saturating_sub(other.0))
        }

        pub fn as_millis(&self) -> u64 {
            self.0
        }
    }

    /// Mock duration type with millisecond resolution
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Duration(u64);

    impl Duration {
        pub const fn from_millis(ms: u64) -> Self {
            Self(ms)
        }

        pub const fn from_secs(secs: u64) -> Self {
            Self(secs * 1_000)
        }

        pub const fn as_millis(&self) -> u64 {
            self.0
        }

        pub const fn as_micros(&self) -> u64 {
            self.0 * 1_000
        }
    }

    impl core::ops::Div<u32> for Duration {
        type Output = Duration;

        fn div(self, rhs: u32) -> Duration {
            Duration(self.0 / rhs as u64)
        }
    }

    impl core::ops::Mul<u32> for Duration {
        type Output = Duration;

        fn mul(self, rhs: u32) -> Duration {
            Duration(self.0 * rhs as u64)
        }
    }
}

use embedded_hal::digital::OutputPin;

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// Character display rejected a command
    DisplayError,
    /// Timing operation failed
    TimingError,
    /// A job queue had no free slot
    QueueFull,
    /// Hardware not initialized
    NotInitialized,
    /// Invalid configuration
    InvalidConfig,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::DisplayError => write!(f, "Display operation failed"),
            HalError::TimingError => write!(f, "Timing operation failed"),
            HalError::QueueFull => write!(f, "Job queue full"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Trait for a digital output line (rows, trigger, buzzer, status LED)
pub trait OutputLine {
    type Error: From<HalError>;

    /// Set logical line state (true = active)
    fn set_state(&mut self, state: bool) -> Result<(), Self::Error>;

    /// Get current logical line state
    fn get_state(&self) -> Result<bool, Self::Error>;

    /// Toggle line state
    fn toggle(&mut self) -> Result<(), Self::Error> {
        let current = self.get_state()?;
        self.set_state(!current)
    }
}

/// Trait for a character display addressed by column and row
pub trait CharDisplay {
    type Error: From<HalError>;

    /// Initialize the controller
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Move the write position
    fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), Self::Error>;

    /// Write text at the cursor
    fn print(&mut self, text: &str) -> Result<(), Self::Error>;
}

/// Trait for the hardware watchdog
pub trait Watchdog {
    type Error: From<HalError>;

    /// Arm the watchdog with a reset timeout
    fn start(&mut self, timeout_ms: u32) -> Result<(), Self::Error>;

    /// Returns true once the watchdog has been armed
    fn is_running(&self) -> bool;

    /// Postpone the reset
    fn kick(&mut self) -> Result<(), Self::Error>;
}

/// Free-running microsecond timer, readable from interrupt context
///
/// The counter is allowed to wrap; consumers take differences with `wrapping_sub`.
pub trait MonotonicClock {
    fn now_us(&self) -> u32;
}

/// Microseconds elapsed on a tick counter backed by a faster cycle counter
///
/// `ticks` whole periods of `cycles_per_tick` cycles have passed, plus
/// `sub_tick_cycles` of the current one. The result wraps like [`MonotonicClock`].
pub const fn counter_micros(ticks: u64, cycles_per_tick: u32, sub_tick_cycles: u32, cycles_per_us: u32) -> u32 {
    if cycles_per_us == 0 {
        return 0;
    }
    let sub = if sub_tick_cycles < cycles_per_tick { sub_tick_cycles } else { cycles_per_tick - 1 };
    let cycles = ticks.wrapping_mul(cycles_per_tick as u64).wrapping_add(sub as u64);
    (cycles / cycles_per_us as u64) as u32
}

/// Generic implementation for embedded-hal compatible output pins
pub struct EmbeddedHalOutput<P> {
    pin: P,
    inverted: bool,
    state: bool,
}

impl<P> EmbeddedHalOutput<P>
where
    P: OutputPin,
{
    /// `inverted` maps the active state to a low level (active-low buzzer drive)
    pub fn new(pin: P, inverted: bool) -> Self {
        Self { pin, inverted, state: false }
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

impl<P> OutputLine for EmbeddedHalOutput<P>
where
    P: OutputPin,
{
    type Error = HalError;

    fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
        let output_state = if self.inverted { !state } else { state };
        if output_state {
            self.pin.set_high().map_err(|_| HalError::GpioError)?;
        } else {
            self.pin.set_low().map_err(|_| HalError::GpioError)?;
        }
        self.state = state;
        Ok(())
    }

    fn get_state(&self) -> Result<bool, Self::Error> {
        // embedded-hal has no read-back for output pins, report the last write
        Ok(self.state)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::Cell;
    use std::string::String;
    use std::vec::Vec;

    #[derive(Default, Debug)]
    pub struct MockOutput {
        state: bool,
        writes: usize,
        rising: usize,
    }

    impl MockOutput {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_active(&self) -> bool {
            self.state
        }

        /// Number of set_state calls
        pub fn writes(&self) -> usize {
            self.writes
        }

        /// Number of inactive -> active transitions
        pub fn activations(&self) -> usize {
            self.rising
        }
    }

    impl OutputLine for MockOutput {
        type Error = HalError;

        fn set_state(&mut self, state: bool) -> Result<(), Self::Error> {
            if state && !self.state {
                self.rising += 1;
            }
            self.state = state;
            self.writes += 1;
            Ok(())
        }

        fn get_state(&self) -> Result<bool, Self::Error> {
            Ok(self.state)
        }
    }

    /// 16x2 display that keeps what was printed on each row
    #[derive(Default, Debug)]
    pub struct MockDisplay {
        begun: bool,
        cursor: (u8, u8),
        rows: [String; 2],
        prints: usize,
        fail_prints: usize,
    }

    impl MockDisplay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_begun(&self) -> bool {
            self.begun
        }

        /// Text last printed at column 0 of a row
        pub fn row(&self, row: usize) -> &str {
            &self.rows[row]
        }

        pub fn prints(&self) -> usize {
            self.prints
        }

        /// Make the next `count` prints fail
        pub fn fail_next(&mut self, count: usize) {
            self.fail_prints = count;
        }
    }

    impl CharDisplay for MockDisplay {
        type Error = HalError;

        fn begin(&mut self) -> Result<(), Self::Error> {
            self.begun = true;
            Ok(())
        }

        fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), Self::Error> {
            if row > 1 || column > 15 {
                return Err(HalError::DisplayError);
            }
            self.cursor = (column, row);
            Ok(())
        }

        fn print(&mut self, text: &str) -> Result<(), Self::Error> {
            if !self.begun {
                return Err(HalError::NotInitialized);
            }
            if self.fail_prints > 0 {
                self.fail_prints -= 1;
                return Err(HalError::DisplayError);
            }
            let (column, row) = self.cursor;
            let line = &mut self.rows[row as usize];
            line.truncate(column as usize);
            line.push_str(text);
            self.prints += 1;
            Ok(())
        }
    }

    /// Delay that returns immediately and remembers what was asked of it
    #[derive(Default, Debug)]
    pub struct MockDelay {
        pub requested_ns: Vec<u32>,
    }

    impl MockDelay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn total_us(&self) -> u64 {
            self.requested_ns.iter().map(|ns| *ns as u64).sum::<u64>() / 1_000
        }
    }

    impl embedded_hal_async::delay::DelayNs for MockDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.requested_ns.push(ns);
        }
    }

    #[derive(Default, Debug)]
    pub struct MockWatchdog {
        timeout_ms: Option<u32>,
        kicks: usize,
    }

    impl MockWatchdog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn timeout_ms(&self) -> Option<u32> {
            self.timeout_ms
        }

        pub fn kicks(&self) -> usize {
            self.kicks
        }
    }

    impl Watchdog for MockWatchdog {
        type Error = HalError;

        fn start(&mut self, timeout_ms: u32) -> Result<(), Self::Error> {
            self.timeout_ms = Some(timeout_ms);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.timeout_ms.is_some()
        }

        fn kick(&mut self) -> Result<(), Self::Error> {
            if self.timeout_ms.is_none() {
                return Err(HalError::NotInitialized);
            }
            self.kicks += 1;
            Ok(())
        }
    }

    /// Manually advanced microsecond clock
    #[derive(Default, Debug)]
    pub struct MockClock {
        now: Cell<u32>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, us: u32) {
            self.now.set(us);
        }

        pub fn advance(&self, us: u32) {
            self.now.set(self.now.get().wrapping_add(us));
        }
    }

    impl MonotonicClock for MockClock {
        fn now_us(&self) -> u32 {
            self.now.get()
        }
    }
}
