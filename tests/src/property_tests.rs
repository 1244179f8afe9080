//! Property and table tests for the keypad, ranger and fill arithmetic

use proptest::prelude::*;
use rstest::rstest;

use monitor_core::mock::{MockDelay, MockOutput};
use monitor_core::*;

fn raw(key: Key, edge: Edge, timestamp_us: u32) -> RawEdge {
    let (column, row) = crate::position_of(key);
    RawEdge { column, row, edge, timestamp_us }
}

fn any_key() -> impl Strategy<Value = Key> {
    prop_oneof![
        (0u8..10).prop_map(Key::Digit),
        Just(Key::A),
        Just(Key::B),
        Just(Key::C),
        Just(Key::D),
        Just(Key::Star),
        Just(Key::Hash),
    ]
}

proptest! {
    #[test]
    fn prop_one_press_per_bounce_burst(key in any_key(), bounces in 1usize..40) {
        let mut latch = KeyLatch::new();
        let mut presses = 0;
        let mut releases = 0;
        for i in 0..bounces {
            let t = i as u32 * 100;
            for edge in [Edge::Down, Edge::Up] {
                match latch.apply(raw(key, edge, t), 100) {
                    GateOutcome::Pressed(_) => presses += 1,
                    GateOutcome::Released(_) => releases += 1,
                    GateOutcome::Ignored => {}
                }
            }
        }
        prop_assert_eq!(presses, 1);
        prop_assert_eq!(releases, 1);
        prop_assert_eq!(latch.pressed(), None);
    }

    #[test]
    fn prop_lockout_expires(ticks in 1u16..200) {
        let mut latch = KeyLatch::new();
        prop_assert!(matches!(latch.apply(raw(Key::A, Edge::Down, 0), ticks), GateOutcome::Pressed(_)));
        latch.apply(raw(Key::A, Edge::Up, 10), ticks);
        for _ in 0..ticks - 1 {
            latch.tick();
        }
        prop_assert!(matches!(latch.apply(raw(Key::B, Edge::Down, 20), ticks), GateOutcome::Ignored));
        latch.tick();
        prop_assert_eq!(latch.lockout(), 0);
        prop_assert!(matches!(latch.apply(raw(Key::B, Edge::Down, 30), ticks), GateOutcome::Pressed(_)));
    }

    #[test]
    fn prop_stable_distance_is_mean_of_window(samples in prop::collection::vec(2u32..=400, 1..30)) {
        let config = default_config();
        let mut ranger: DistanceRanger<_, _> = DistanceRanger::new(MockOutput::new(), MockDelay::new(), &config);
        let mut last = None;
        for &cm in &samples {
            last = ranger.record(cm);
        }
        let window = &samples[samples.len().saturating_sub(STABILIZER_LEN)..];
        let mean = window.iter().sum::<u32>() / window.len() as u32;
        prop_assert_eq!(last, Some(mean as u16));
    }

    #[test]
    fn prop_out_of_range_never_recorded(cm in prop_oneof![0u32..2, 401u32..100_000]) {
        let config = default_config();
        let mut ranger: DistanceRanger<_, _> = DistanceRanger::new(MockOutput::new(), MockDelay::new(), &config);
        ranger.record(100);
        prop_assert_eq!(ranger.record(cm), None);
        prop_assert_eq!(ranger.average(), Some(100));
    }

    #[test]
    fn prop_time_entry_always_valid(digits in prop::collection::vec(0u8..10, 0..20)) {
        let mut entry = TimeEntry::blank();
        let mut cursor = 0;
        for d in digits {
            entry.enter_digit(&mut cursor, d);
            prop_assert!(entry.is_valid());
        }
        entry.fill_unset();
        let time = entry.time();
        prop_assert!(time.hours < 24);
        prop_assert!(time.minutes < 60);
        prop_assert!(time.seconds < 60);
    }

    #[test]
    fn prop_fill_level_bounded(full in 2u16..200, span in 1u16..200, stable in 0u16..=400) {
        let range = CapacityRange::new(full + span, full);
        match range.fill_level(stable) {
            FillLevel::Percent(p) => {
                if stable >= full {
                    prop_assert!(p <= 100);
                }
                if stable >= full + span {
                    prop_assert_eq!(p, 0);
                }
            }
            FillLevel::Undefined => prop_assert!(false, "range is non-empty"),
        }
    }

    #[test]
    fn prop_clock_ticks_wrap_at_midnight(start in 0u32..86_400, ticks in 0u32..7_200) {
        let at = |s: u32| TimeOfDay::new((s / 3_600) as u8, (s / 60 % 60) as u8, (s % 60) as u8).unwrap();
        let mut entry = TimeEntry::from_time(at(start));
        for _ in 0..ticks {
            entry.tick();
        }
        prop_assert_eq!(entry.time(), at((start + ticks) % 86_400));
    }

    #[test]
    fn prop_machine_never_leaves_valid_entry(keys in prop::collection::vec(any_key(), 0..40)) {
        let shared = SharedState::new(default_config().uncalibrated_range());
        let machine = ModeMachine::new(&shared);
        tokio_test::block_on(async {
            for key in keys {
                machine.handle_key(key).await;
            }
        });
        let clocks = tokio_test::block_on(shared.clocks.get(&LockOrder::new()));
        prop_assert!(clocks.current.is_valid());
        prop_assert!(clocks.closing.is_valid());
    }
}

#[rstest]
#[case(100, 20, 100, FillLevel::Percent(0))]
#[case(100, 20, 92, FillLevel::Percent(10))]
#[case(100, 20, 60, FillLevel::Percent(50))]
#[case(100, 20, 20, FillLevel::Percent(100))]
#[case(100, 20, 10, FillLevel::Percent(112))]
#[case(100, 20, 150, FillLevel::Percent(0))]
#[case(50, 50, 30, FillLevel::Undefined)]
fn test_fill_level_table(#[case] empty: u16, #[case] full: u16, #[case] stable: u16, #[case] expected: FillLevel) {
    assert_eq!(CapacityRange::new(empty, full).fill_level(stable), expected);
}

#[rstest]
#[case(true, "18:00:00", "17:00:00", FillLevel::Percent(10), true)]
#[case(true, "17:00:00", "17:00:00", FillLevel::Percent(10), true)]
#[case(true, "16:59:59", "17:00:00", FillLevel::Percent(10), false)]
#[case(true, "18:00:00", "17:00:00", FillLevel::Percent(0), false)]
#[case(false, "18:00:00", "17:00:00", FillLevel::Percent(10), false)]
#[case(true, "18:00:00", "17:00:00", FillLevel::Undefined, false)]
fn test_alarm_rule(
    #[case] armed: bool,
    #[case] now: &str,
    #[case] closing: &str,
    #[case] fill: FillLevel,
    #[case] expected: bool,
) {
    fn parse(text: &str) -> TimeOfDay {
        let parts: Vec<u8> = text.split(':').map(|p| p.parse().unwrap()).collect();
        TimeOfDay::new(parts[0], parts[1], parts[2]).unwrap()
    }
    assert_eq!(alarm_due(armed, parse(now), parse(closing), fill), expected);
}

#[rstest]
#[case('1', 3, 3)]
#[case('A', 0, 3)]
#[case('D', 0, 0)]
#[case('0', 2, 0)]
#[case('*', 3, 0)]
#[case('#', 1, 0)]
#[case('5', 2, 2)]
fn test_key_positions(#[case] legend: char, #[case] column: u8, #[case] row: u8) {
    let key = Key::from_char(legend).unwrap();
    assert_eq!(crate::position_of(key), (column, row));
    assert_eq!(key.as_char(), legend);
}
