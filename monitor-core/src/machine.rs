//! Timer and mode state machine
//!
//! Keys walk the monitor through its configuration phases:
//!
//! ```text
//! SettingClock --A--> SettingCloseTime --A--> CalibratingEmpty --A--> CalibratingFull --A--> Observing
//!      ^                                                                                        |
//!      +------------------------------------------- D (from any mode) -------------------------+
//! ```
//!
//! Each operation takes the mode lock first and only then the entities it
//! touches, in ascending rank. The dirty flag is raised last, after the inner
//! locks have been released.

use crate::sync::{LockOrder, SharedState};
use crate::types::{FillLevel, Key, SystemMode, TimeEntry, TimeOfDay};

/// Current phase and the digit cursor of the time being typed
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeState {
    pub mode: SystemMode,
    /// Next digit position of the active time entry
    pub cursor: u8,
}

impl ModeState {
    pub const fn new() -> Self {
        Self { mode: SystemMode::SettingClock, cursor: 0 }
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall clock and closing time, both as keypad entries
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub current: TimeEntry,
    pub closing: TimeEntry,
}

impl Clocks {
    pub const fn new() -> Self {
        Self { current: TimeEntry::blank(), closing: TimeEntry::blank() }
    }

    /// The entry edited in a time-entry mode
    pub fn entry_mut(&mut self, mode: SystemMode) -> Option<&mut TimeEntry> {
        match mode {
            SystemMode::SettingClock => Some(&mut self.current),
            SystemMode::SettingCloseTime => Some(&mut self.closing),
            _ => None,
        }
    }
}

impl Default for Clocks {
    fn default() -> Self {
        Self::new()
    }
}

/// The buzzer sounds once closing time is reached with food still inside
pub fn alarm_due(armed: bool, now: TimeOfDay, closing: TimeOfDay, fill: FillLevel) -> bool {
    armed && now >= closing && fill.is_occupied()
}

/// Applies key presses and clock ticks to the shared state
pub struct ModeMachine<'a> {
    shared: &'a SharedState,
}

impl<'a> ModeMachine<'a> {
    pub fn new(shared: &'a SharedState) -> Self {
        Self { shared }
    }

    /// Apply one debounced key press, returning the mode afterwards
    pub async fn handle_key(&self, key: Key) -> SystemMode {
        let order = LockOrder::new();
        let mut state = self.shared.mode.lock(&order).await;
        let mode = state.mode;

        match (mode, key) {
            (_, Key::D) => {
                state.mode = SystemMode::SettingClock;
                state.cursor = 0;
                self.shared.alarm_armed.set(&order, false).await;
            }
            (SystemMode::SettingClock | SystemMode::SettingCloseTime, Key::Digit(digit)) => {
                let mut clocks = self.shared.clocks.lock(&order).await;
                if let Some(entry) = clocks.entry_mut(mode) {
                    entry.enter_digit(&mut state.cursor, digit);
                }
            }
            (SystemMode::SettingClock | SystemMode::SettingCloseTime, Key::C) => {
                let mut clocks = self.shared.clocks.lock(&order).await;
                if let Some(entry) = clocks.entry_mut(mode) {
                    entry.clear();
                }
                state.cursor = 0;
            }
            (SystemMode::SettingClock | SystemMode::SettingCloseTime, Key::A) => {
                let mut clocks = self.shared.clocks.lock(&order).await;
                if let Some(entry) = clocks.entry_mut(mode) {
                    entry.fill_unset();
                }
                state.cursor = 0;
                state.mode = if mode == SystemMode::SettingClock {
                    SystemMode::SettingCloseTime
                } else {
                    SystemMode::CalibratingEmpty
                };
            }
            (SystemMode::CalibratingEmpty, Key::A) => {
                let stable = self.shared.stable_distance.lock(&order).await;
                let mut capacity = self.shared.capacity.lock(&order).await;
                capacity.empty_cm = *stable;
                state.mode = SystemMode::CalibratingFull;
            }
            (SystemMode::CalibratingFull, Key::A) => {
                let stable = self.shared.stable_distance.lock(&order).await;
                let mut capacity = self.shared.capacity.lock(&order).await;
                let mut armed = self.shared.alarm_armed.lock(&order).await;
                capacity.full_cm = *stable;
                *armed = true;
                state.mode = SystemMode::Observing;
            }
            (SystemMode::Observing, Key::Hash) => {
                let _was_armed = self.shared.alarm_armed.compute_and_swap(&order, |armed| !armed).await;

                #[cfg(feature = "defmt")]
                defmt::info!("🔔 Alarm {}", if _was_armed { "disarmed" } else { "armed" });
            }
            _ => {}
        }

        let next = state.mode;
        self.shared.mark_dirty(&order).await;
        drop(state);

        #[cfg(feature = "defmt")]
        if next != mode {
            defmt::info!("🔄 Mode: {} -> {}", mode, next);
        }

        next
    }

    /// One wall-clock second; returns the new time unless the clock is being set
    pub async fn tick_clock(&self) -> Option<TimeOfDay> {
        let order = LockOrder::new();
        let state = self.shared.mode.lock(&order).await;
        let mut dirty = self.shared.dirty.lock(&order).await;
        let mut clocks = self.shared.clocks.lock(&order).await;

        *dirty = true;
        if !state.mode.clock_runs() {
            return None;
        }
        clocks.current.tick();
        Some(clocks.current.time())
    }
}
