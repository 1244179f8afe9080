//! Job queues, interrupt front-ends and the workers that drain them
//!
//! Interrupt handlers never take a lock. They capture a timestamp (and, for
//! the keypad, the energized row) and push a job onto their subsystem's
//! queue with `try_send`. Each subsystem has one worker that receives jobs in
//! order and is the only place its locks are taken. Periodic sources feed the
//! same queues, so a subsystem's jobs never run concurrently with each other.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal_async::delay::DelayNs;

use crate::compositor::{OutputCompositor, RefreshOutcome};
use crate::debounce::{DebounceGate, GateOutcome};
use crate::hal::{CharDisplay, HalError, MonotonicClock, OutputLine, Watchdog};
use crate::keypad::{ActiveRow, KeypadScanner};
use crate::machine::ModeMachine;
use crate::ranger::{DistanceRanger, EchoCapture, SampleOutcome};
use crate::sync::SharedState;
use crate::types::{Edge, KeyEvent, RawEdge, TimeOfDay};

#[cfg(feature = "embassy-time")]
use crate::hal::Duration;

/// Slots per job queue
pub const QUEUE_DEPTH: usize = 32;

/// Bounded FIFO of jobs for one subsystem
pub type JobQueue<J> = Channel<CriticalSectionRawMutex, J, QUEUE_DEPTH>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeypadJob {
    /// Column edge captured by the interrupt
    Edge(RawEdge),
    /// Advance the row scan
    Scan,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangerJob {
    /// Emit a trigger pulse
    Poll,
    /// An echo has completed
    Process,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputJob {
    /// Redraw the display if dirty and drive the buzzer
    Refresh,
    /// One wall-clock second elapsed
    ClockTick,
}

/// Non-blocking enqueue, usable from interrupt context
pub fn enqueue<J>(queue: &JobQueue<J>, job: J) -> Result<(), HalError> {
    queue.try_send(job).map_err(|_| HalError::QueueFull)
}

/// Column interrupt handler state
pub struct KeypadIrq<'a, C> {
    queue: &'a JobQueue<KeypadJob>,
    row: &'a ActiveRow,
    clock: &'a C,
}

impl<'a, C: MonotonicClock> KeypadIrq<'a, C> {
    pub const fn new(queue: &'a JobQueue<KeypadJob>, row: &'a ActiveRow, clock: &'a C) -> Self {
        Self { queue, row, clock }
    }

    /// A column line changed level
    pub fn on_column_edge(&self, column: u8, rising: bool) -> Result<(), HalError> {
        let raw = RawEdge {
            column,
            row: self.row.get(),
            edge: Edge::from_rising(rising),
            timestamp_us: self.clock.now_us(),
        };
        enqueue(self.queue, KeypadJob::Edge(raw))
    }
}

/// Echo interrupt handler state
pub struct RangerIrq<'a, C> {
    queue: &'a JobQueue<RangerJob>,
    capture: &'a EchoCapture,
    clock: &'a C,
}

impl<'a, C: MonotonicClock> RangerIrq<'a, C> {
    pub const fn new(queue: &'a JobQueue<RangerJob>, capture: &'a EchoCapture, clock: &'a C) -> Self {
        Self { queue, capture, clock }
    }

    /// The echo line changed level; the falling edge completes a sample
    pub fn on_echo_edge(&self, rising: bool) -> Result<(), HalError> {
        let now = self.clock.now_us();
        if rising {
            self.capture.on_echo_rise(now);
            Ok(())
        } else {
            self.capture.on_echo_fall(now);
            enqueue(self.queue, RangerJob::Process)
        }
    }
}

/// Drains the keypad queue: debounce, scan and key handling
pub struct KeypadWorker<'a, R, D, L> {
    queue: &'a JobQueue<KeypadJob>,
    shared: &'a SharedState,
    gate: DebounceGate,
    scanner: KeypadScanner<'a, R, D>,
    machine: ModeMachine<'a>,
    indicator: L,
}

impl<'a, R, D, L> KeypadWorker<'a, R, D, L>
where
    R: OutputLine<Error = HalError>,
    D: DelayNs,
    L: OutputLine<Error = HalError>,
{
    pub fn new(
        queue: &'a JobQueue<KeypadJob>,
        shared: &'a SharedState,
        gate: DebounceGate,
        scanner: KeypadScanner<'a, R, D>,
        indicator: L,
    ) -> Self {
        Self { queue, shared, gate, scanner, machine: ModeMachine::new(shared), indicator }
    }

    pub fn start(&mut self) -> Result<(), HalError> {
        self.indicator.set_state(false)?;
        self.scanner.start()
    }

    /// Run one job; returns the key event it produced, if any
    pub async fn dispatch(&mut self, job: KeypadJob) -> Result<Option<KeyEvent>, HalError> {
        match job {
            KeypadJob::Edge(raw) => match self.gate.on_edge(self.shared, raw).await {
                GateOutcome::Pressed(event) => {
                    self.indicator.set_state(true)?;
                    self.machine.handle_key(event.key).await;
                    Ok(Some(event))
                }
                GateOutcome::Released(event) => {
                    self.indicator.set_state(false)?;
                    Ok(Some(event))
                }
                GateOutcome::Ignored => Ok(None),
            },
            KeypadJob::Scan => {
                self.scanner.step(self.shared).await?;
                Ok(None)
            }
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let job = self.queue.receive().await;
            if let Err(_e) = self.dispatch(job).await {
                #[cfg(feature = "defmt")]
                defmt::warn!("⌨️ Keypad job {} failed: {}", job, _e);
            }
        }
    }

    pub fn scanner(&self) -> &KeypadScanner<'a, R, D> {
        &self.scanner
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }
}

/// Drains the ranger queue: trigger pulses and echo processing
pub struct RangerWorker<'a, T, D, const N: usize> {
    queue: &'a JobQueue<RangerJob>,
    shared: &'a SharedState,
    capture: &'a EchoCapture,
    ranger: DistanceRanger<T, D, N>,
}

impl<'a, T, D, const N: usize> RangerWorker<'a, T, D, N>
where
    T: OutputLine<Error = HalError>,
    D: DelayNs,
{
    pub fn new(
        queue: &'a JobQueue<RangerJob>,
        shared: &'a SharedState,
        capture: &'a EchoCapture,
        ranger: DistanceRanger<T, D, N>,
    ) -> Self {
        Self { queue, shared, capture, ranger }
    }

    pub async fn dispatch(&mut self, job: RangerJob) -> Result<Option<SampleOutcome>, HalError> {
        match job {
            RangerJob::Poll => {
                self.ranger.poll().await?;
                Ok(None)
            }
            RangerJob::Process => Ok(Some(self.ranger.process_sample(self.capture, self.shared).await)),
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let job = self.queue.receive().await;
            if let Err(_e) = self.dispatch(job).await {
                #[cfg(feature = "defmt")]
                defmt::warn!("📏 Ranger job {} failed: {}", job, _e);
            }
        }
    }
}

/// What an output job did
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputStep {
    Refreshed(RefreshOutcome),
    /// New wall-clock time, None while the clock is being set
    Ticked(Option<TimeOfDay>),
}

/// Drains the output queue: clock ticks and display refreshes
pub struct OutputWorker<'a, Disp, A> {
    queue: &'a JobQueue<OutputJob>,
    compositor: OutputCompositor<'a, Disp, A>,
    machine: ModeMachine<'a>,
}

impl<'a, Disp, A> OutputWorker<'a, Disp, A>
where
    Disp: CharDisplay<Error = HalError>,
    A: OutputLine<Error = HalError>,
{
    pub fn new(queue: &'a JobQueue<OutputJob>, shared: &'a SharedState, display: Disp, alarm: A) -> Self {
        Self {
            queue,
            compositor: OutputCompositor::new(shared, display, alarm),
            machine: ModeMachine::new(shared),
        }
    }

    pub fn start(&mut self) -> Result<(), HalError> {
        self.compositor.begin()
    }

    pub async fn dispatch(&mut self, job: OutputJob) -> Result<OutputStep, HalError> {
        match job {
            OutputJob::Refresh => Ok(OutputStep::Refreshed(self.compositor.refresh().await?)),
            OutputJob::ClockTick => Ok(OutputStep::Ticked(self.machine.tick_clock().await)),
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let job = self.queue.receive().await;
            if let Err(_e) = self.dispatch(job).await {
                #[cfg(feature = "defmt")]
                defmt::warn!("🖥️ Output job {} failed: {}", job, _e);
            }
        }
    }

    pub fn compositor(&self) -> &OutputCompositor<'a, Disp, A> {
        &self.compositor
    }
}

/// Debounce lockout countdown plus the watchdog
///
/// The watchdog is only kicked while no key is held, so a key stuck down
/// longer than the timeout resets the device.
pub struct Supervisor<'a, W> {
    shared: &'a SharedState,
    gate: DebounceGate,
    watchdog: W,
    timeout_ms: u32,
}

impl<'a, W> Supervisor<'a, W>
where
    W: Watchdog<Error = HalError>,
{
    pub fn new(shared: &'a SharedState, gate: DebounceGate, watchdog: W, timeout_ms: u32) -> Self {
        Self { shared, gate, watchdog, timeout_ms }
    }

    /// One debounce tick; returns true if the watchdog was kicked
    pub async fn step(&mut self) -> Result<bool, HalError> {
        if self.gate.tick(self.shared).await {
            return Ok(false);
        }
        if !self.watchdog.is_running() {
            #[cfg(feature = "defmt")]
            defmt::info!("🐕 Watchdog armed: {}ms", self.timeout_ms);
            self.watchdog.start(self.timeout_ms)?;
        }
        self.watchdog.kick()?;
        Ok(true)
    }

    #[cfg(feature = "embassy-time")]
    pub async fn run(&mut self, period: Duration) -> ! {
        let mut ticker = embassy_time::Ticker::every(period);
        loop {
            ticker.next().await;
            if let Err(_e) = self.step().await {
                #[cfg(feature = "defmt")]
                defmt::warn!("🐕 Supervisor step failed: {}", _e);
            }
        }
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }
}

/// Push `job` onto `queue` every `period`
#[cfg(feature = "embassy-time")]
pub async fn periodic<J: Copy>(queue: &JobQueue<J>, job: J, period: Duration) -> ! {
    let mut ticker = embassy_time::Ticker::every(period);
    loop {
        ticker.next().await;
        if enqueue(queue, job).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("⏱️ Job queue full, periodic job dropped");
        }
    }
}
