//! Debounce gate for the keypad column edges

use crate::keypad::KEY_MAP;
use crate::sync::{LockOrder, SharedState};
use crate::types::{Edge, Key, KeyEvent, RawEdge};

/// Result of feeding one raw edge through the gate
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateOutcome {
    /// A new key went down; forwarded to the mode machine
    Pressed(KeyEvent),
    /// The held key came back up
    Released(KeyEvent),
    /// Bounce, a second key, a stray release or an impossible coordinate
    Ignored,
}

/// Which key is held and how long new presses stay locked out
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyLatch {
    pressed: Option<Key>,
    lockout: u16,
}

impl KeyLatch {
    pub const fn new() -> Self {
        Self { pressed: None, lockout: 0 }
    }

    /// Key currently held down, if any
    pub fn pressed(&self) -> Option<Key> {
        self.pressed
    }

    /// Remaining lockout ticks
    pub fn lockout(&self) -> u16 {
        self.lockout
    }

    /// Apply a raw edge, starting a lockout of `lockout_ticks` on an accepted press
    pub fn apply(&mut self, raw: RawEdge, lockout_ticks: u16) -> GateOutcome {
        let Some(key) = key_at(raw.column, raw.row) else {
            return GateOutcome::Ignored;
        };
        let event = KeyEvent { key, edge: raw.edge, timestamp_us: raw.timestamp_us };

        match raw.edge {
            Edge::Down => {
                if self.lockout > 0 || self.pressed.is_some() {
                    return GateOutcome::Ignored;
                }
                self.pressed = Some(key);
                self.lockout = lockout_ticks;
                GateOutcome::Pressed(event)
            }
            Edge::Up => {
                // Only the held key may release; anything else is left over from an earlier row
                if self.pressed == Some(key) {
                    self.pressed = None;
                    GateOutcome::Released(event)
                } else {
                    GateOutcome::Ignored
                }
            }
        }
    }

    /// One debounce tick elapsed
    pub fn tick(&mut self) {
        self.lockout = self.lockout.saturating_sub(1);
    }
}

impl Default for KeyLatch {
    fn default() -> Self {
        Self::new()
    }
}

fn key_at(column: u8, row: u8) -> Option<Key> {
    KEY_MAP.get(column as usize)?.get(row as usize).copied()
}

/// Filters raw column edges into a single clean key stream
#[derive(Copy, Clone, Debug)]
pub struct DebounceGate {
    lockout_ticks: u16,
}

impl DebounceGate {
    pub const fn new(lockout_ticks: u16) -> Self {
        Self { lockout_ticks }
    }

    /// Feed an edge captured in interrupt context (worker context only)
    pub async fn on_edge(&self, shared: &SharedState, raw: RawEdge) -> GateOutcome {
        let order = LockOrder::new();
        let mut latch = shared.key_latch.lock(&order).await;
        let outcome = latch.apply(raw, self.lockout_ticks);

        #[cfg(feature = "defmt")]
        match outcome {
            GateOutcome::Pressed(event) => defmt::debug!("⌨️ Key down: {}", event.key),
            GateOutcome::Released(event) => defmt::trace!("⌨️ Key up: {}", event.key),
            GateOutcome::Ignored => defmt::trace!("Edge ignored: {}", raw),
        }

        outcome
    }

    /// Decrement the lockout; returns true while a key is held
    pub async fn tick(&self, shared: &SharedState) -> bool {
        let order = LockOrder::new();
        let mut latch = shared.key_latch.lock(&order).await;
        latch.tick();
        latch.pressed().is_some()
    }
}
