//! Output compositor: character display and buzzer
//!
//! Runs on every refresh period but only redraws when the dirty flag is set.
//! The shared entities are copied into a [`Snapshot`] under their locks; the
//! dirty flag is cleared in the same critical section so a change arriving
//! while the slow display is being written is not lost.

use crate::display::{DisplayBuffer, ROWS};
use crate::hal::{CharDisplay, HalError, OutputLine};
use crate::machine::{alarm_due, Clocks};
use crate::sync::{LockOrder, SharedState};
use crate::types::{CapacityRange, FillLevel, SystemMode};

/// Everything the display and alarm depend on, copied out of the shared state
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub mode: SystemMode,
    pub cursor: u8,
    pub stable_cm: u16,
    pub clocks: Clocks,
    pub capacity: CapacityRange,
    pub armed: bool,
}

impl Snapshot {
    pub fn fill_level(&self) -> FillLevel {
        self.capacity.fill_level(self.stable_cm)
    }

    /// Alarm output for this state; only sounds while observing
    pub fn alarm_due(&self) -> bool {
        self.mode == SystemMode::Observing
            && alarm_due(self.armed, self.clocks.current.time(), self.clocks.closing.time(), self.fill_level())
    }
}

/// Result of one refresh
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefreshOutcome {
    /// Nothing changed since the last draw
    Idle,
    /// Display redrawn and alarm line driven
    Drawn { mode: SystemMode, alarm: bool },
}

/// Owns the display, the buzzer line and the rendered text
pub struct OutputCompositor<'a, Disp, A> {
    shared: &'a SharedState,
    display: Disp,
    alarm: A,
    buffer: DisplayBuffer,
}

impl<'a, Disp, A> OutputCompositor<'a, Disp, A>
where
    Disp: CharDisplay<Error = HalError>,
    A: OutputLine<Error = HalError>,
{
    pub fn new(shared: &'a SharedState, display: Disp, alarm: A) -> Self {
        Self { shared, display, alarm, buffer: DisplayBuffer::new() }
    }

    /// Initialize the display and silence the buzzer
    pub fn begin(&mut self) -> Result<(), HalError> {
        self.display.begin()?;
        self.alarm.set_state(false)
    }

    /// Redraw if anything changed
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, HalError> {
        let Some(snapshot) = self.take_snapshot().await else {
            return Ok(RefreshOutcome::Idle);
        };

        match self.draw(&snapshot) {
            Ok(alarm) => Ok(RefreshOutcome::Drawn { mode: snapshot.mode, alarm }),
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("🖥️ Refresh failed: {}", e);

                // Try again on the next refresh
                self.shared.mark_dirty(&LockOrder::new()).await;
                Err(e)
            }
        }
    }

    /// Copy the shared state and clear the dirty flag, or None if it was clean
    async fn take_snapshot(&self) -> Option<Snapshot> {
        let order = LockOrder::new();
        let state = self.shared.mode.lock(&order).await;
        let mut dirty = self.shared.dirty.lock(&order).await;
        if !*dirty {
            return None;
        }
        let stable = self.shared.stable_distance.lock(&order).await;
        let clocks = self.shared.clocks.lock(&order).await;
        let capacity = self.shared.capacity.lock(&order).await;
        let armed = self.shared.alarm_armed.lock(&order).await;

        *dirty = false;
        Some(Snapshot {
            mode: state.mode,
            cursor: state.cursor,
            stable_cm: *stable,
            clocks: *clocks,
            capacity: *capacity,
            armed: *armed,
        })
    }

    fn draw(&mut self, snapshot: &Snapshot) -> Result<bool, HalError> {
        let alarm = snapshot.alarm_due();
        self.alarm.set_state(alarm)?;

        self.buffer.render(snapshot);
        for row in 0..ROWS {
            self.display.set_cursor(0, row as u8)?;
            self.display.print(self.buffer.line(snapshot.mode, row))?;
        }
        Ok(alarm)
    }

    pub fn display(&self) -> &Disp {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Disp {
        &mut self.display
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }
}
