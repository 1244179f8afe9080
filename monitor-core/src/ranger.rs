//! Ultrasonic distance ranger
//!
//! A trigger pulse starts a measurement; the sensor answers with an echo pulse
//! whose width is the round-trip time. Both echo edges are timestamped in
//! interrupt context by [`EchoCapture`], the falling edge queues a processing
//! job, and [`DistanceRanger::process_sample`] turns the pulse into a distance,
//! filters it and publishes the moving average as the stable distance.

use embedded_hal_async::delay::DelayNs;
use heapless::HistoryBuffer;
use portable_atomic::{AtomicU32, Ordering};

use crate::hal::OutputLine;
use crate::sync::{LockOrder, SharedState};
use crate::types::MonitorConfig;

/// Number of accepted samples averaged into the stable distance
pub const STABILIZER_LEN: usize = 4;

/// Echo edge timestamps written from interrupt context
pub struct EchoCapture {
    rise_us: AtomicU32,
    fall_us: AtomicU32,
}

impl EchoCapture {
    pub const fn new() -> Self {
        Self {
            rise_us: AtomicU32::new(0),
            fall_us: AtomicU32::new(0),
        }
    }

    pub fn on_echo_rise(&self, now_us: u32) {
        self.rise_us.store(now_us, Ordering::Release);
    }

    pub fn on_echo_fall(&self, now_us: u32) {
        self.fall_us.store(now_us, Ordering::Release);
    }

    /// Pulse width in microseconds; both timestamps are cleared
    pub fn take_pulse_us(&self) -> u32 {
        let rise = self.rise_us.swap(0, Ordering::AcqRel);
        let fall = self.fall_us.swap(0, Ordering::AcqRel);
        fall.wrapping_sub(rise)
    }
}

impl Default for EchoCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one echo
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// Distance outside the usable range; nothing recorded
    Rejected(u32),
    /// New stable distance published and the display flagged
    Published(u16),
    /// Stable distance already had this value
    Unchanged(u16),
    /// Someone else held the stable distance; retried with the next sample
    Deferred(u16),
}

/// Trigger line plus the moving-average stabilizer
pub struct DistanceRanger<T, D, const N: usize = STABILIZER_LEN> {
    trigger: T,
    delay: D,
    samples: HistoryBuffer<u16, N>,
    min_cm: u16,
    max_cm: u16,
    us_per_cm: u32,
    pulse_us: u32,
}

impl<T, D, const N: usize> DistanceRanger<T, D, N>
where
    T: OutputLine,
    D: DelayNs,
{
    pub fn new(trigger: T, delay: D, config: &MonitorConfig) -> Self {
        Self {
            trigger,
            delay,
            samples: HistoryBuffer::new(),
            min_cm: config.min_range_cm,
            max_cm: config.max_range_cm,
            us_per_cm: config.echo_us_per_cm,
            pulse_us: config.trigger_pulse_us,
        }
    }

    /// Emit one trigger pulse
    pub async fn poll(&mut self) -> Result<(), T::Error> {
        self.trigger.set_state(true)?;
        self.delay.delay_us(self.pulse_us).await;
        self.trigger.set_state(false)
    }

    /// Convert, filter and publish the pulse held in `capture`
    pub async fn process_sample(&mut self, capture: &EchoCapture, shared: &SharedState) -> SampleOutcome {
        // A zero divisor reads as out of range
        let distance_cm = capture.take_pulse_us().checked_div(self.us_per_cm).unwrap_or(u32::MAX);

        let Some(stable) = self.record(distance_cm) else {
            #[cfg(feature = "defmt")]
            defmt::trace!("📏 Echo rejected: {}cm", distance_cm);
            return SampleOutcome::Rejected(distance_cm);
        };

        publish(shared, stable).await
    }

    /// Record a distance if it is in range, returning the new average
    pub fn record(&mut self, distance_cm: u32) -> Option<u16> {
        if distance_cm < self.min_cm as u32 || distance_cm > self.max_cm as u32 {
            return None;
        }
        self.samples.write(distance_cm as u16);
        self.average()
    }

    /// Mean of the recorded samples, None before the first one
    pub fn average(&self) -> Option<u16> {
        let count = self.samples.len() as u32;
        if count == 0 {
            return None;
        }
        let sum: u32 = self.samples.as_slice().iter().map(|&cm| cm as u32).sum();
        Some((sum / count) as u16)
    }

    pub fn trigger(&self) -> &T {
        &self.trigger
    }
}

/// Dirty (rank 2) is taken first; the stable distance (rank 3) is only tried
async fn publish(shared: &SharedState, stable_cm: u16) -> SampleOutcome {
    let order = LockOrder::new();
    let mut dirty = shared.dirty.lock(&order).await;
    let Some(mut stable) = shared.stable_distance.try_lock(&order) else {
        #[cfg(feature = "defmt")]
        defmt::debug!("📏 Stable distance busy, deferring {}cm", stable_cm);
        return SampleOutcome::Deferred(stable_cm);
    };

    if *stable == stable_cm {
        return SampleOutcome::Unchanged(stable_cm);
    }

    *stable = stable_cm;
    *dirty = true;
    drop(stable);
    drop(dirty);

    #[cfg(feature = "defmt")]
    defmt::debug!("📏 Stable distance: {}cm", stable_cm);

    SampleOutcome::Published(stable_cm)
}
