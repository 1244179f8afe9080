//! Keypad, ranger and output workers on separate threads sharing one state

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use monitor_core::mock::{MockClock, MockDelay, MockDisplay, MockOutput};
use monitor_core::*;

const ROUNDS: usize = 300;

/// Run a worker loop on its own single-threaded runtime, failing if it stalls
fn run_bounded<F: Future>(name: &str, work: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(20), work)
            .await
            .unwrap_or_else(|_| panic!("{} worker stalled", name))
    })
}

fn shared_state() -> &'static SharedState {
    Box::leak(Box::new(SharedState::new(default_config().uncalibrated_range())))
}

async fn keypad_loop(shared: &SharedState) -> usize {
    let queue: JobQueue<KeypadJob> = JobQueue::new();
    let row = ActiveRow::new();
    let clock = MockClock::new();
    let irq = KeypadIrq::new(&queue, &row, &clock);

    let gate = DebounceGate::new(1);
    let rows = [MockOutput::new(), MockOutput::new(), MockOutput::new(), MockOutput::new()];
    let scanner = KeypadScanner::new(rows, MockDelay::new(), &row, 0, 0);
    let mut worker = KeypadWorker::new(&queue, shared, gate, scanner, MockOutput::new());
    worker.start().unwrap();

    let mut presses = 0;
    for round in 0..ROUNDS {
        let key = "D1700A1800AAA##".chars().nth(round % 15).and_then(Key::from_char).unwrap();
        let (column, key_row) = crate::position_of(key);
        row.set(key_row);

        irq.on_column_edge(column, true).unwrap();
        clock.advance(50_000);
        irq.on_column_edge(column, false).unwrap();
        while let Ok(job) = queue.try_receive() {
            if let Some(event) = worker.dispatch(job).await.unwrap() {
                if event.edge == Edge::Down {
                    presses += 1;
                }
            }
        }
        gate.tick(shared).await;
        worker.dispatch(KeypadJob::Scan).await.unwrap();
        tokio::task::yield_now().await;
    }
    presses
}

async fn ranger_loop(shared: &SharedState, deferred: &AtomicUsize) -> usize {
    let config = default_config();
    let capture = EchoCapture::new();
    let mut ranger: DistanceRanger<_, _> = DistanceRanger::new(MockOutput::new(), MockDelay::new(), &config);

    let mut published = 0;
    for round in 0..ROUNDS {
        let cm = 20 + (round as u32 * 7) % 90;
        ranger.poll().await.unwrap();
        capture.on_echo_rise(1_000);
        capture.on_echo_fall(1_000 + cm * config.echo_us_per_cm);
        match ranger.process_sample(&capture, shared).await {
            SampleOutcome::Published(_) => published += 1,
            SampleOutcome::Deferred(_) => {
                deferred.fetch_add(1, Ordering::Relaxed);
            }
            SampleOutcome::Unchanged(_) => {}
            SampleOutcome::Rejected(cm) => panic!("{}cm is in range", cm),
        }
        tokio::task::yield_now().await;
    }
    published
}

async fn output_loop(shared: &SharedState) -> usize {
    let mut compositor = OutputCompositor::new(shared, MockDisplay::new(), MockOutput::new());
    compositor.begin().unwrap();
    let machine = ModeMachine::new(shared);

    let mut drawn = 0;
    for _ in 0..ROUNDS {
        machine.tick_clock().await;
        if let RefreshOutcome::Drawn { .. } = compositor.refresh().await.unwrap() {
            drawn += 1;
        }
        assert_eq!(compositor.display().row(0).len(), 16);
        tokio::task::yield_now().await;
    }
    drawn
}

#[test]
fn test_three_workers_no_deadlock() {
    println!("🔒 Testing three workers on one shared state...");
    let shared = shared_state();
    let deferred = AtomicUsize::new(0);

    let (presses, published, drawn) = std::thread::scope(|s| {
        let keypad = s.spawn(|| run_bounded("keypad", keypad_loop(shared)));
        let ranger = s.spawn(|| run_bounded("ranger", ranger_loop(shared, &deferred)));
        let output = s.spawn(|| run_bounded("output", output_loop(shared)));
        (keypad.join().unwrap(), ranger.join().unwrap(), output.join().unwrap())
    });

    assert_eq!(presses, ROUNDS);
    assert!(published > 0);
    assert!(drawn > 0);
    println!(
        "  ✅ {} presses, {} published, {} deferred, {} redraws",
        presses,
        published,
        deferred.load(Ordering::Relaxed),
        drawn
    );
}

#[test]
fn test_final_state_is_consistent() {
    let shared = shared_state();
    let deferred = AtomicUsize::new(0);

    std::thread::scope(|s| {
        s.spawn(|| run_bounded("keypad", keypad_loop(shared)));
        s.spawn(|| run_bounded("ranger", ranger_loop(shared, &deferred)));
    });

    // The key cycle ends on "##", leaving the monitor observing
    let final_state = tokio_test::block_on(async {
        let order = LockOrder::new();
        let mode = shared.mode.get(&order).await;
        let latch = shared.key_latch.get(&order).await;
        (mode, latch)
    });
    let (mode, latch) = final_state;
    assert_eq!(mode.mode, SystemMode::Observing);
    assert_eq!(latch.pressed(), None);
}

#[tokio::test]
async fn test_busy_distance_is_deferred() {
    let shared = shared_state();
    let config = default_config();
    let capture = EchoCapture::new();
    let mut ranger: DistanceRanger<_, _> = DistanceRanger::new(MockOutput::new(), MockDelay::new(), &config);

    let order = LockOrder::new();
    let held = shared.stable_distance.lock(&order).await;

    capture.on_echo_rise(0);
    capture.on_echo_fall(50 * config.echo_us_per_cm);
    assert_eq!(ranger.process_sample(&capture, shared).await, SampleOutcome::Deferred(50));
    drop(held);

    capture.on_echo_rise(0);
    capture.on_echo_fall(50 * config.echo_us_per_cm);
    assert_eq!(ranger.process_sample(&capture, shared).await, SampleOutcome::Published(50));
}

#[test]
#[should_panic(expected = "lock order violation")]
fn test_descending_acquisition_panics() {
    let shared = shared_state();
    tokio_test::block_on(async {
        let order = LockOrder::new();
        let _clocks = shared.clocks.lock(&order).await;
        let _mode = shared.mode.lock(&order).await;
    });
}
