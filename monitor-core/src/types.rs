//! Core data types for the closing-time monitor

use crate::hal::Duration;

/// Keys of the 4x4 matrix keypad
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "std", derive(Hash))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Numeric key 0-9
    Digit(u8),
    /// Confirm
    A,
    /// Unused
    B,
    /// Clear time input
    C,
    /// Reset to clock setup
    D,
    /// Unused
    Star,
    /// Toggle alarm while observing
    Hash,
}

impl Key {
    /// Parse a keypad legend character (letters are case-insensitive)
    pub const fn from_char(c: char) -> Option<Key> {
        match c {
            '0'..='9' => Some(Key::Digit(c as u8 - b'0')),
            'A' | 'a' => Some(Key::A),
            'B' | 'b' => Some(Key::B),
            'C' | 'c' => Some(Key::C),
            'D' | 'd' => Some(Key::D),
            '*' => Some(Key::Star),
            '#' => Some(Key::Hash),
            _ => None,
        }
    }

    /// Legend printed on the key cap
    pub const fn as_char(&self) -> char {
        match self {
            Key::Digit(d) => (b'0' + *d) as char,
            Key::A => 'A',
            Key::B => 'B',
            Key::C => 'C',
            Key::D => 'D',
            Key::Star => '*',
            Key::Hash => '#',
        }
    }

    /// Returns the numeric value for digit keys
    pub const fn digit(&self) -> Option<u8> {
        match self {
            Key::Digit(d) => Some(*d),
            _ => None,
        }
    }
}

/// Direction of a key transition
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Key struck (rising edge on a pulled-down column)
    Down,
    /// Key released (falling edge)
    Up,
}

impl Edge {
    /// Column inputs are pulled down, so a rising edge means a key closed the circuit
    pub const fn from_rising(rising: bool) -> Edge {
        if rising {
            Edge::Down
        } else {
            Edge::Up
        }
    }
}

/// Raw column edge captured in interrupt context, attributed to the energized row
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawEdge {
    pub column: u8,
    pub row: u8,
    pub edge: Edge,
    /// Microseconds on the monotonic timer when the edge was captured
    pub timestamp_us: u32,
}

/// Debounced key transition
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEvent {
    pub key: Key,
    pub edge: Edge,
    pub timestamp_us: u32,
}

/// Configuration phases of the monitor
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemMode {
    /// Entering the current wall-clock time
    SettingClock,
    /// Entering the closing time
    SettingCloseTime,
    /// Capturing the distance of the empty container
    CalibratingEmpty,
    /// Capturing the distance of the full container
    CalibratingFull,
    /// Watching the fill level against the closing time
    Observing,
}

impl SystemMode {
    /// All modes in configuration order
    pub const ALL: [SystemMode; 5] = [
        SystemMode::SettingClock,
        SystemMode::SettingCloseTime,
        SystemMode::CalibratingEmpty,
        SystemMode::CalibratingFull,
        SystemMode::Observing,
    ];

    /// Index into per-mode tables
    pub const fn index(&self) -> usize {
        match self {
            SystemMode::SettingClock => 0,
            SystemMode::SettingCloseTime => 1,
            SystemMode::CalibratingEmpty => 2,
            SystemMode::CalibratingFull => 3,
            SystemMode::Observing => 4,
        }
    }

    /// Returns true while the user is typing a time
    pub const fn is_time_entry(&self) -> bool {
        matches!(self, SystemMode::SettingClock | SystemMode::SettingCloseTime)
    }

    /// The wall clock is frozen only while it is being set
    pub const fn clock_runs(&self) -> bool {
        !matches!(self, SystemMode::SettingClock)
    }
}

/// Wall-clock time on a 24 hour dial
///
/// Field order makes the derived `Ord` compare hours, then minutes, then seconds.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeOfDay {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hours: 0, minutes: 0, seconds: 0 };

    /// Create a validated time
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> Result<Self, &'static str> {
        if hours > 23 {
            return Err("Hours must be between 0 and 23");
        }
        if minutes > 59 {
            return Err("Minutes must be between 0 and 59");
        }
        if seconds > 59 {
            return Err("Seconds must be between 0 and 59");
        }
        Ok(Self { hours, minutes, seconds })
    }

    /// One second later, carrying into minutes and hours; 23:59:59 wraps to 00:00:00
    pub const fn next_second(&self) -> TimeOfDay {
        let mut t = *self;
        t.seconds += 1;
        if t.seconds >= 60 {
            t.seconds = 0;
            t.minutes += 1;
            if t.minutes >= 60 {
                t.minutes = 0;
                t.hours += 1;
                if t.hours >= 24 {
                    t.hours = 0;
                }
            }
        }
        t
    }

    /// The six decimal digits hh mm ss
    pub const fn digits(&self) -> [u8; 6] {
        [
            self.hours / 10,
            self.hours % 10,
            self.minutes / 10,
            self.minutes % 10,
            self.seconds / 10,
            self.seconds % 10,
        ]
    }
}

/// Number of digit positions in a time entry
pub const TIME_DIGITS: usize = 6;

/// Placeholder glyphs shown for digits not yet entered
pub const TIME_PLACEHOLDER: [u8; TIME_DIGITS] = *b"hhmmss";

/// Per-position validity rule for a digit about to be stored in an entry
pub type DigitRule = fn(&TimeEntry, u8) -> bool;

fn tens_of_hours(_: &TimeEntry, d: u8) -> bool {
    d <= 2
}

fn hours(entry: &TimeEntry, d: u8) -> bool {
    match entry.digit(0) {
        Some(2) => d <= 3,
        _ => d <= 9,
    }
}

fn tens_of_sixty(_: &TimeEntry, d: u8) -> bool {
    d <= 5
}

fn any_digit(_: &TimeEntry, d: u8) -> bool {
    d <= 9
}

/// Validity rules for hh mm ss, indexed by position
pub const DIGIT_RULES: [DigitRule; TIME_DIGITS] = [
    tens_of_hours,
    hours,
    tens_of_sixty,
    any_digit,
    tens_of_sixty,
    any_digit,
];

/// A time of day as typed on the keypad, one optional digit per position
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeEntry {
    digits: [Option<u8>; TIME_DIGITS],
}

impl TimeEntry {
    /// Entry with every position unset
    pub const fn blank() -> Self {
        Self { digits: [None; TIME_DIGITS] }
    }

    /// Entry holding a complete time
    pub const fn from_time(time: TimeOfDay) -> Self {
        let d = time.digits();
        Self {
            digits: [Some(d[0]), Some(d[1]), Some(d[2]), Some(d[3]), Some(d[4]), Some(d[5])],
        }
    }

    /// Digit stored at a position, if entered
    pub fn digit(&self, position: usize) -> Option<u8> {
        self.digits.get(position).copied().flatten()
    }

    /// Display glyph for a position
    pub fn glyph(&self, position: usize) -> u8 {
        match self.digit(position) {
            Some(d) => b'0' + d,
            None => TIME_PLACEHOLDER[position],
        }
    }

    /// Returns true once every position has a digit
    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    /// Store `digit` at `position` if `rule` accepts it
    ///
    /// Later positions invalidated by the new digit (an hour digit above 3 once
    /// the tens of hours become 2) fall back to their placeholder.
    pub fn try_commit_digit(&mut self, position: usize, digit: u8, rule: DigitRule) -> bool {
        if position >= TIME_DIGITS || !rule(self, digit) {
            return false;
        }
        self.digits[position] = Some(digit);
        for later in position + 1..TIME_DIGITS {
            if let Some(d) = self.digits[later] {
                if !DIGIT_RULES[later](self, d) {
                    self.digits[later] = None;
                }
            }
        }
        true
    }

    /// Enter a digit at the cursor, advancing it on success
    ///
    /// Once all six positions are filled the entry shifts left instead: the
    /// oldest digit drops off and the new one lands in the seconds position,
    /// provided every shifted digit is still valid where it lands.
    pub fn enter_digit(&mut self, cursor: &mut u8, digit: u8) -> bool {
        let position = *cursor as usize;
        if position < TIME_DIGITS {
            let accepted = self.try_commit_digit(position, digit, DIGIT_RULES[position]);
            if accepted {
                *cursor += 1;
            }
            return accepted;
        }

        let mut shifted = Self::blank();
        for i in 0..TIME_DIGITS - 1 {
            shifted.digits[i] = self.digits[i + 1];
        }
        shifted.digits[TIME_DIGITS - 1] = Some(digit);
        if shifted.is_valid() {
            *self = shifted;
            true
        } else {
            false
        }
    }

    /// Returns true if every entered digit satisfies its position rule
    pub fn is_valid(&self) -> bool {
        (0..TIME_DIGITS).all(|i| match self.digits[i] {
            Some(d) => DIGIT_RULES[i](self, d),
            None => true,
        })
    }

    /// Reset every position to its placeholder
    pub fn clear(&mut self) {
        self.digits = [None; TIME_DIGITS];
    }

    /// Replace unset positions with zero
    pub fn fill_unset(&mut self) {
        for d in self.digits.iter_mut() {
            if d.is_none() {
                *d = Some(0);
            }
        }
    }

    /// Interpret the entry as a time, unset positions reading as zero
    pub fn time(&self) -> TimeOfDay {
        let d = |i: usize| self.digit(i).unwrap_or(0);
        TimeOfDay {
            hours: d(0) * 10 + d(1),
            minutes: d(2) * 10 + d(3),
            seconds: d(4) * 10 + d(5),
        }
    }

    /// Advance the stored time by one second
    pub fn tick(&mut self) {
        *self = Self::from_time(self.time().next_second());
    }
}

impl Default for TimeEntry {
    fn default() -> Self {
        Self::blank()
    }
}

/// Fill level of the container
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FillLevel {
    /// Percentage of the calibrated range in use, never negative
    Percent(u16),
    /// Empty and full distances are equal, no range to measure against
    Undefined,
}

impl FillLevel {
    /// Returns true if there is something left in the container
    pub const fn is_occupied(&self) -> bool {
        match self {
            FillLevel::Percent(p) => *p > 0,
            FillLevel::Undefined => false,
        }
    }
}

/// Calibrated distances of the empty and full container
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityRange {
    pub empty_cm: u16,
    pub full_cm: u16,
}

impl CapacityRange {
    pub const fn new(empty_cm: u16, full_cm: u16) -> Self {
        Self { empty_cm, full_cm }
    }

    /// `100 * (empty - stable) / (empty - full)`, clamped at zero
    pub const fn fill_level(&self, stable_cm: u16) -> FillLevel {
        if self.empty_cm == self.full_cm {
            return FillLevel::Undefined;
        }
        let numerator = 100 * (self.empty_cm as i32 - stable_cm as i32);
        let percent = numerator / (self.empty_cm as i32 - self.full_cm as i32);
        if percent < 0 {
            FillLevel::Percent(0)
        } else if percent > u16::MAX as i32 {
            FillLevel::Percent(u16::MAX)
        } else {
            FillLevel::Percent(percent as u16)
        }
    }
}

/// Monitor configuration parameters
#[derive(Copy, Clone, Debug)]
pub struct MonitorConfig {
    /// Debounce lockout after an accepted key, in debounce ticks
    pub debounce_ticks: u16,
    /// Shortest distance the ranger reports reliably
    pub min_range_cm: u16,
    /// Longest distance the ranger reports reliably
    pub max_range_cm: u16,
    /// Echo round-trip microseconds per centimeter
    pub echo_us_per_cm: u32,
    /// Width of the trigger pulse
    pub trigger_pulse_us: u32,
    /// Settle time after energizing a keypad row
    pub row_settle_us: u32,
    /// Gap with every row de-energized before the next row is driven
    pub row_buffer_us: u32,
    /// Keypad row alternation period
    pub scan_period: Duration,
    /// Debounce lockout decrement period
    pub debounce_period: Duration,
    /// Ranger trigger period
    pub poll_period: Duration,
    /// Display and alarm refresh period
    pub refresh_period: Duration,
    /// Wall-clock tick period
    pub clock_period: Duration,
    /// Watchdog reset timeout while a key is held
    pub watchdog_timeout_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ticks: 100,
            min_range_cm: 2,
            max_range_cm: 400,
            echo_us_per_cm: 58,
            trigger_pulse_us: 10,
            row_settle_us: 1_000,
            row_buffer_us: 1_000,
            scan_period: Duration::from_millis(10),
            debounce_period: Duration::from_millis(1),
            poll_period: Duration::from_millis(100),
            refresh_period: Duration::from_millis(100),
            clock_period: Duration::from_millis(1_000),
            watchdog_timeout_ms: 30_000,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with validation, keeping the default periods
    pub fn new(
        debounce_ticks: u16,
        min_range_cm: u16,
        max_range_cm: u16,
        echo_us_per_cm: u32,
        watchdog_timeout_ms: u32,
    ) -> Result<Self, &'static str> {
        let config = Self {
            debounce_ticks,
            min_range_cm,
            max_range_cm,
            echo_us_per_cm,
            watchdog_timeout_ms,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.debounce_ticks == 0 || self.debounce_ticks > 1_000 {
            return Err("Debounce must be between 1 and 1000 ticks");
        }
        if self.min_range_cm >= self.max_range_cm {
            return Err("Minimum range must be below maximum range");
        }
        if self.max_range_cm > 400 {
            return Err("Maximum range must be <= 400cm");
        }
        if self.echo_us_per_cm == 0 {
            return Err("Echo divisor must be non-zero");
        }
        if self.trigger_pulse_us == 0 || self.trigger_pulse_us > 1_000 {
            return Err("Trigger pulse must be between 1 and 1000us");
        }
        if self.row_settle_us > 5_000 || self.row_buffer_us > 5_000 {
            return Err("Row settle and buffer must be <= 5000us");
        }
        let periods = [
            self.scan_period,
            self.debounce_period,
            self.poll_period,
            self.refresh_period,
            self.clock_period,
        ];
        if periods.iter().any(|p| p.as_millis() == 0) {
            return Err("Periods must be non-zero");
        }
        if self.watchdog_timeout_ms < 1_000 {
            return Err("Watchdog timeout must be >= 1000ms");
        }
        Ok(())
    }

    /// Capacity range assumed before calibration
    pub const fn uncalibrated_range(&self) -> CapacityRange {
        CapacityRange::new(self.max_range_cm, self.min_range_cm)
    }
}
