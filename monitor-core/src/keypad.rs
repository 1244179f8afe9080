//! Row scanning for the 4x4 matrix keypad
//!
//! One row is driven high at a time; the four column inputs are pulled down
//! and raise an interrupt on either edge. The interrupt side reads
//! [`ActiveRow`] to attribute a column edge to a key, so the row index is
//! published only after every row has been released and before the new row is
//! energized.

use embedded_hal_async::delay::DelayNs;
use portable_atomic::{AtomicU8, Ordering};

use crate::hal::OutputLine;
use crate::sync::{LockOrder, SharedState};
use crate::types::Key;

/// Number of keypad rows and columns
pub const MATRIX_SIZE: usize = 4;

/// Key legends indexed `[column][row]`
pub const KEY_MAP: [[Key; MATRIX_SIZE]; MATRIX_SIZE] = [
    [Key::D, Key::C, Key::B, Key::A],
    [Key::Hash, Key::Digit(9), Key::Digit(6), Key::Digit(3)],
    [Key::Digit(0), Key::Digit(8), Key::Digit(5), Key::Digit(2)],
    [Key::Star, Key::Digit(7), Key::Digit(4), Key::Digit(1)],
];

/// Index of the energized row, shared with the column interrupt
pub struct ActiveRow(AtomicU8);

impl ActiveRow {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, row: u8) {
        self.0.store(row, Ordering::Release);
    }
}

impl Default for ActiveRow {
    fn default() -> Self {
        Self::new()
    }
}

/// What one scan step did
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanStep {
    /// A key is held; its row stays energized so the release can be seen
    Frozen(Key),
    /// Moved on to this row
    Advanced(u8),
}

/// Drives the four row lines in turn
pub struct KeypadScanner<'a, R, D> {
    rows: [R; MATRIX_SIZE],
    delay: D,
    active: &'a ActiveRow,
    settle_us: u32,
    buffer_us: u32,
}

impl<'a, R, D> KeypadScanner<'a, R, D>
where
    R: OutputLine,
    D: DelayNs,
{
    pub fn new(rows: [R; MATRIX_SIZE], delay: D, active: &'a ActiveRow, settle_us: u32, buffer_us: u32) -> Self {
        Self { rows, delay, active, settle_us, buffer_us }
    }

    /// Energize the first row
    pub fn start(&mut self) -> Result<(), R::Error> {
        self.release_all()?;
        self.active.set(0);
        self.rows[0].set_state(true)
    }

    /// Advance to the next row unless a key is held
    pub async fn step(&mut self, shared: &SharedState) -> Result<ScanStep, R::Error> {
        let order = LockOrder::new();
        if let Some(key) = shared.key_latch.lock(&order).await.pressed() {
            return Ok(ScanStep::Frozen(key));
        }

        self.release_all()?;
        self.delay.delay_us(self.buffer_us).await;

        let next = (self.active.get() + 1) % MATRIX_SIZE as u8;
        self.active.set(next);
        self.rows[next as usize].set_state(true)?;
        self.delay.delay_us(self.settle_us).await;

        Ok(ScanStep::Advanced(next))
    }

    fn release_all(&mut self) -> Result<(), R::Error> {
        for row in self.rows.iter_mut() {
            row.set_state(false)?;
        }
        Ok(())
    }

    pub fn rows(&self) -> &[R; MATRIX_SIZE] {
        &self.rows
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}
