//! End-to-end runs: interrupt front-ends, job queues and workers on mock hardware

use crate::{configure, position_of, Rig};
use monitor_core::*;

async fn current_time(rig: &Rig) -> TimeOfDay {
    rig.shared.clocks.get(&LockOrder::new()).await.current.time()
}

async fn closing_time(rig: &Rig) -> TimeOfDay {
    rig.shared.clocks.get(&LockOrder::new()).await.closing.time()
}

fn time(hours: u8, minutes: u8, seconds: u8) -> TimeOfDay {
    TimeOfDay::new(hours, minutes, seconds).unwrap()
}

#[tokio::test]
async fn test_power_on_screen() {
    println!("🖥️ Testing power-on screen...");
    let mut rig = Rig::new();

    assert_eq!(rig.mode().await, SystemMode::SettingClock);
    assert_eq!(rig.refresh().await.unwrap(), RefreshOutcome::Drawn { mode: SystemMode::SettingClock, alarm: false });
    assert_eq!(rig.line(0), "Set current time");
    assert_eq!(rig.line(1), "(24hr)  hh:mm:ss");
    assert!(!rig.alarm_on());

    // Nothing changed since the last draw
    assert_eq!(rig.refresh().await.unwrap(), RefreshOutcome::Idle);
    println!("  ✅ Power-on screen drawn once");
}

#[tokio::test]
async fn test_clock_entry_then_confirm() {
    println!("⌨️ Testing 1230A...");
    let mut rig = Rig::new();

    rig.type_keys("123").await;
    rig.refresh().await.unwrap();
    assert_eq!(rig.line(1), "(24hr)  12:3m:ss");

    rig.type_keys("0A").await;
    assert_eq!(rig.mode().await, SystemMode::SettingCloseTime);
    assert_eq!(current_time(&rig).await, time(12, 30, 0));

    rig.refresh().await.unwrap();
    assert_eq!(rig.line(0), "Set closing time");
    println!("  ✅ Clock set to 12:30:00");
}

#[tokio::test]
async fn test_invalid_digits_are_refused() {
    let mut rig = Rig::new();

    // Tens of hours cannot be 3, tens of minutes cannot be 7
    rig.type_keys("3").await;
    rig.type_keys("2").await;
    rig.type_keys("4").await;
    rig.type_keys("3").await;
    rig.type_keys("7").await;
    rig.type_keys("5").await;
    rig.refresh().await.unwrap();
    assert_eq!(rig.line(1), "(24hr)  23:5m:ss");
}

#[tokio::test]
async fn test_clear_key_resets_entry() {
    let mut rig = Rig::new();

    rig.type_keys("1745").await;
    rig.type_keys("C").await;
    rig.type_keys("08A").await;
    assert_eq!(current_time(&rig).await, time(8, 0, 0));
}

#[tokio::test]
async fn test_full_entry_shifts_left() {
    let mut rig = Rig::new();

    rig.type_keys("123450").await;
    rig.type_keys("1").await;
    rig.refresh().await.unwrap();
    assert_eq!(rig.line(1), "(24hr)  23:45:01");

    // 34:50:17 is not a time, the shift is refused
    rig.type_keys("7").await;
    rig.type_keys("A").await;
    assert_eq!(current_time(&rig).await, time(23, 45, 1));
}

#[tokio::test]
async fn test_calibration_walk() {
    println!("📏 Testing calibration walk...");
    let mut rig = Rig::new();

    rig.type_keys("1700A").await;
    rig.type_keys("1800A").await;
    assert_eq!(rig.mode().await, SystemMode::CalibratingEmpty);

    rig.settle_distance(100).await;
    rig.refresh().await.unwrap();
    assert_eq!(rig.line(1), "Set empty: 100cm");
    rig.type_keys("A").await;
    assert_eq!(rig.mode().await, SystemMode::CalibratingFull);

    rig.settle_distance(20).await;
    rig.refresh().await.unwrap();
    assert_eq!(rig.line(1), "Set full:  020cm");
    rig.type_keys("A").await;

    assert_eq!(rig.mode().await, SystemMode::Observing);
    let order = LockOrder::new();
    assert_eq!(rig.shared.capacity.get(&order).await, CapacityRange::new(100, 20));
    assert!(rig.shared.alarm_armed.get(&order).await);
    assert_eq!(closing_time(&rig).await, time(18, 0, 0));
    println!("  ✅ Empty 100cm, full 20cm, alarm armed");
}

#[tokio::test]
async fn test_alarm_after_closing_with_food_left() {
    println!("🔔 Testing alarm past closing time...");
    let mut rig = Rig::new();
    configure(&mut rig, "18", "17").await;

    rig.settle_distance(92).await;
    let outcome = rig.refresh().await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Drawn { mode: SystemMode::Observing, alarm: true });
    assert!(rig.alarm_on());
    assert_eq!(rig.line(0), "Space       Time");
    assert_eq!(rig.line(1), "010%   #18:00:00");
    println!("  ✅ Buzzer on at 10%");
}

#[tokio::test]
async fn test_no_alarm_when_empty() {
    let mut rig = Rig::new();
    configure(&mut rig, "18", "17").await;

    rig.settle_distance(100).await;
    rig.refresh().await.unwrap();
    assert!(!rig.alarm_on());
    assert_eq!(rig.line(1), "000%   #18:00:00");

    // Further than the empty distance still reads as empty
    rig.settle_distance(130).await;
    rig.refresh().await.unwrap();
    assert!(!rig.alarm_on());
    assert_eq!(rig.line(1), "000%   #18:00:00");
}

#[tokio::test]
async fn test_no_alarm_when_disarmed() {
    let mut rig = Rig::new();
    configure(&mut rig, "18", "17").await;
    rig.settle_distance(92).await;

    rig.type_keys("#").await;
    rig.refresh().await.unwrap();
    assert!(!rig.alarm_on());
    assert_eq!(rig.line(1), "010%    18:00:00");

    rig.type_keys("#").await;
    rig.refresh().await.unwrap();
    assert!(rig.alarm_on());
}

#[tokio::test]
async fn test_alarm_starts_at_closing_time() {
    let mut rig = Rig::new();
    configure(&mut rig, "175958", "18").await;
    rig.settle_distance(60).await;

    rig.refresh().await.unwrap();
    assert!(!rig.alarm_on());

    rig.tick_clock(1).await;
    rig.refresh().await.unwrap();
    assert!(!rig.alarm_on());
    assert_eq!(rig.line(1), "050%   #17:59:59");

    rig.tick_clock(1).await;
    rig.refresh().await.unwrap();
    assert!(rig.alarm_on());
    assert_eq!(rig.line(1), "050%   #18:00:00");
}

#[tokio::test]
async fn test_clock_holds_while_being_set() {
    let mut rig = Rig::new();
    rig.type_keys("09").await;

    let step = rig.output.dispatch(OutputJob::ClockTick).await.unwrap();
    assert_eq!(step, OutputStep::Ticked(None));

    rig.type_keys("A").await;
    let step = rig.output.dispatch(OutputJob::ClockTick).await.unwrap();
    assert_eq!(step, OutputStep::Ticked(Some(time(9, 0, 1))));
}

#[tokio::test]
async fn test_reset_key_returns_to_clock_setup() {
    let mut rig = Rig::new();
    configure(&mut rig, "18", "17").await;
    rig.settle_distance(92).await;
    rig.refresh().await.unwrap();
    assert!(rig.alarm_on());

    rig.type_keys("D").await;
    assert_eq!(rig.mode().await, SystemMode::SettingClock);
    assert!(!rig.shared.alarm_armed.get(&LockOrder::new()).await);

    let outcome = rig.refresh().await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Drawn { mode: SystemMode::SettingClock, alarm: false });
    assert!(!rig.alarm_on());
    // Stored times survive the reset
    assert_eq!(rig.line(1), "(24hr)  18:00:00");
    assert_eq!(closing_time(&rig).await, time(17, 0, 0));
}

#[tokio::test]
async fn test_bouncing_contacts_give_one_press() {
    println!("⌨️ Testing contact bounce...");
    let mut rig = Rig::new();
    let (column, row) = position_of(Key::Digit(1));
    rig.row.set(row);

    for _ in 0..5 {
        rig.keypad_irq.on_column_edge(column, true).unwrap();
        rig.clock.advance(200);
        rig.keypad_irq.on_column_edge(column, false).unwrap();
        rig.clock.advance(200);
    }
    let events = rig.drain_keypad().await;

    let edges: Vec<Edge> = events.iter().map(|e| e.edge).collect();
    assert_eq!(edges, vec![Edge::Down, Edge::Up]);
    assert!(events.iter().all(|e| e.key == Key::Digit(1)));
    assert!(!rig.keypad.indicator().is_active());

    let entry = rig.shared.clocks.get(&LockOrder::new()).await.current;
    assert_eq!(entry.digit(0), Some(1));
    assert_eq!(entry.digit(1), None);
    println!("  ✅ 10 edges, 1 press");
}

#[tokio::test]
async fn test_release_of_another_key_is_ignored() {
    let mut rig = Rig::new();
    let (held_column, held_row) = position_of(Key::Digit(1));
    let (other_column, other_row) = position_of(Key::Digit(2));

    rig.row.set(held_row);
    rig.keypad_irq.on_column_edge(held_column, true).unwrap();
    rig.row.set(other_row);
    rig.keypad_irq.on_column_edge(other_column, false).unwrap();

    let events = rig.drain_keypad().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, Key::Digit(1));
    assert_eq!(events[0].edge, Edge::Down);
    assert!(rig.keypad.indicator().is_active());
}

#[tokio::test]
async fn test_watchdog_only_kicked_while_idle() {
    println!("🐕 Testing watchdog supervision...");
    let mut rig = Rig::new();
    rig.press(Key::Digit(1)).await;
    let kicks = rig.supervisor.watchdog().kicks();
    assert_eq!(kicks, rig.config.debounce_ticks as usize);
    assert_eq!(rig.supervisor.watchdog().timeout_ms(), Some(rig.config.watchdog_timeout_ms));

    // Hold a key: no kicks while it is down
    let (column, row) = position_of(Key::Digit(2));
    rig.row.set(row);
    rig.keypad_irq.on_column_edge(column, true).unwrap();
    rig.drain_keypad().await;
    for _ in 0..10 {
        assert!(!rig.supervisor.step().await.unwrap());
    }
    assert_eq!(rig.supervisor.watchdog().kicks(), kicks);

    rig.keypad_irq.on_column_edge(column, false).unwrap();
    rig.drain_keypad().await;
    assert!(rig.supervisor.step().await.unwrap());
    println!("  ✅ Watchdog kicked only with no key held");
}

#[tokio::test]
async fn test_out_of_range_echo_is_rejected() {
    let mut rig = Rig::new();
    rig.settle_distance(150).await;

    assert_eq!(rig.echo(1).await, SampleOutcome::Rejected(1));
    assert_eq!(rig.echo(401).await, SampleOutcome::Rejected(401));
    assert_eq!(rig.shared.stable_distance.get(&LockOrder::new()).await, 150);

    assert_eq!(rig.echo(400).await, SampleOutcome::Published(212));
    assert_eq!(rig.echo(2).await, SampleOutcome::Published(175));
}

#[tokio::test]
async fn test_scanner_freezes_while_key_held() {
    let mut rig = Rig::new();
    rig.keypad.dispatch(KeypadJob::Scan).await.unwrap();
    let row = rig.row.get();
    assert_eq!(row, 1);

    let (column, _) = position_of(Key::Digit(1));
    rig.keypad_irq.on_column_edge(column, true).unwrap();
    rig.drain_keypad().await;

    for _ in 0..4 {
        rig.keypad.dispatch(KeypadJob::Scan).await.unwrap();
    }
    assert_eq!(rig.row.get(), row);
}
