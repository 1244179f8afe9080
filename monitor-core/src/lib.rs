#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # Monitor Core
//!
//! Hardware-agnostic logic for the food-container closing-time monitor.
//! A 4x4 keypad configures the wall clock, the closing time and the empty/full
//! distances of the container; an ultrasonic ranger watches the fill level and
//! a buzzer sounds once closing time has passed while food is left inside.

pub mod types;
pub mod hal;
pub mod sync;
pub mod debounce;
pub mod keypad;
pub mod ranger;
pub mod machine;
pub mod display;
pub mod compositor;
pub mod lcd;
pub mod worker;


pub use types::*;
pub use hal::{*, Duration, Instant};
pub use sync::{LockOrder, LockRank, OrderedGuard, OrderedMutex, SharedState};
pub use debounce::{DebounceGate, GateOutcome, KeyLatch};
pub use keypad::{ActiveRow, KeypadScanner, ScanStep, KEY_MAP, MATRIX_SIZE};
pub use ranger::{DistanceRanger, EchoCapture, SampleOutcome, STABILIZER_LEN};
pub use machine::{alarm_due, Clocks, ModeMachine, ModeState};
pub use display::DisplayBuffer;
pub use compositor::{OutputCompositor, RefreshOutcome, Snapshot};
pub use lcd::I2cLcd;
pub use worker::*;

/// Monitor library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration matching the HC-SR04 ranger and a 16x2 character display
pub fn default_config() -> MonitorConfig {
    MonitorConfig::default()
}
