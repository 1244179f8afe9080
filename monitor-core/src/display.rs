//! Per-mode text templates for the 16x2 character display

use crate::compositor::Snapshot;
use crate::types::{FillLevel, SystemMode, TimeEntry, TIME_DIGITS};

/// Characters per display line
pub const COLUMNS: usize = 16;
/// Display lines
pub const ROWS: usize = 2;

type Screen = [[u8; COLUMNS]; ROWS];

const TEMPLATES: [Screen; 5] = [
    [*b"Set current time", *b"(24hr)  hh:mm:ss"],
    [*b"Set closing time", *b"(24hr)  hh:mm:ss"],
    [*b"[A] confirm     ", *b"Set empty: 000cm"],
    [*b"[A] confirm     ", *b"Set full:  000cm"],
    [*b"Space       Time", *b"nnn%   #hh:mm:ss"],
];

/// Columns of the hh, mm and ss digits on a time line
const TIME_COLUMNS: [usize; TIME_DIGITS] = [8, 9, 11, 12, 14, 15];
/// First column of the three distance digits on a calibration line
const DISTANCE_COLUMN: usize = 11;
/// Column of the alarm-armed glyph while observing
const ALARM_COLUMN: usize = 7;

/// Text of every mode's screen, updated field by field
#[derive(Clone, Debug)]
pub struct DisplayBuffer {
    screens: [Screen; 5],
}

impl DisplayBuffer {
    pub const fn new() -> Self {
        Self { screens: TEMPLATES }
    }

    /// Text of one line of a mode's screen
    pub fn line(&self, mode: SystemMode, row: usize) -> &str {
        // Every byte written is ASCII
        core::str::from_utf8(&self.screens[mode.index()][row]).unwrap_or("")
    }

    /// Fill the variable fields of every screen from a snapshot
    pub fn render(&mut self, snapshot: &Snapshot) {
        self.put_time(SystemMode::SettingClock, &snapshot.clocks.current);
        self.put_time(SystemMode::SettingCloseTime, &snapshot.clocks.closing);
        self.put_distance(SystemMode::CalibratingEmpty, snapshot.stable_cm);
        self.put_distance(SystemMode::CalibratingFull, snapshot.stable_cm);

        self.put_time(SystemMode::Observing, &snapshot.clocks.current);
        self.put_fill(snapshot.fill_level());
        let glyph = if snapshot.armed { b'#' } else { b' ' };
        self.screens[SystemMode::Observing.index()][1][ALARM_COLUMN] = glyph;
    }

    fn put_time(&mut self, mode: SystemMode, entry: &TimeEntry) {
        let line = &mut self.screens[mode.index()][1];
        for (position, &column) in TIME_COLUMNS.iter().enumerate() {
            line[column] = entry.glyph(position);
        }
    }

    fn put_distance(&mut self, mode: SystemMode, distance_cm: u16) {
        let line = &mut self.screens[mode.index()][1];
        line[DISTANCE_COLUMN..DISTANCE_COLUMN + 3].copy_from_slice(&three_digits(distance_cm));
    }

    fn put_fill(&mut self, fill: FillLevel) {
        let field = match fill {
            FillLevel::Percent(p) => three_digits(p),
            FillLevel::Undefined => *b"N/A",
        };
        self.screens[SystemMode::Observing.index()][1][..3].copy_from_slice(&field);
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-padded, saturating at 999
fn three_digits(value: u16) -> [u8; 3] {
    let v = value.min(999);
    [b'0' + (v / 100) as u8, b'0' + (v / 10 % 10) as u8, b'0' + (v % 10) as u8]
}
