//! Grace-period correctness tests.
//!
//! These verify the core guarantees:
//! 1. wait() never returns while an active reader lags the target
//! 2. parked readers never block a grace period
//! 3. registration round-trips leave no occupancy behind
//! 4. the capacity boundary fails cleanly with Exhausted

use quiesce::{Exhausted, Qsbr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

#[test]
fn wait_blocks_on_lagging_reader() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            qsbr.wait(1);
            done.store(true, Ordering::Release);
        });

        // Give the waiter ample time to finish if it were going to
        // falsely complete.
        thread::sleep(Duration::from_millis(200));
        assert!(
            !done.load(Ordering::Acquire),
            "wait() returned while a reader still lagged the target"
        );

        reader.update(1);
    });

    assert!(done.load(Ordering::Acquire));
}

#[test]
fn wait_tracks_every_active_reader() {
    const READERS: usize = 8;

    let qsbr = Qsbr::new();
    let quiesced = AtomicUsize::new(0);
    let barrier = Barrier::new(READERS + 1);

    thread::scope(|s| {
        for i in 0..READERS {
            let quiesced = &quiesced;
            let barrier = &barrier;
            let qsbr = &qsbr;
            s.spawn(move || {
                let reader = qsbr.register().unwrap();
                barrier.wait();
                // Stagger the announcements so the writer has to make
                // several passes.
                thread::sleep(Duration::from_millis(5 * i as u64));
                quiesced.fetch_add(1, Ordering::SeqCst);
                reader.update(1);
            });
        }

        barrier.wait();
        qsbr.wait(1);
        // The counter is bumped strictly before each update, so a
        // completed wait implies every reader got counted.
        assert_eq!(quiesced.load(Ordering::SeqCst), READERS);
    });
}

#[test]
fn wait_holds_until_the_target_exactly() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            qsbr.wait(3);
            done.store(true, Ordering::Release);
        });

        // Still blocked at generation 0.
        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::Acquire));

        // An announcement short of the target must not release it.
        reader.update(2);
        thread::sleep(Duration::from_millis(100));
        assert!(
            !done.load(Ordering::Acquire),
            "wait() returned below the target generation"
        );

        reader.update(3);
    });

    assert!(done.load(Ordering::Acquire));
}

#[test]
fn reader_past_the_target_is_satisfied() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    // A reader that raced ahead of the writer's target must not stall
    // the grace period.
    reader.update(10);
    qsbr.wait(5);
    drop(reader);
}

#[test]
fn parked_reader_never_blocks_wait() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    reader.update(3);
    reader.park();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            qsbr.wait(4);
            done.store(true, Ordering::Release);
        });
    });
    assert!(done.load(Ordering::Acquire));

    reader.resume();
    reader.update(4);
}

#[test]
fn park_resume_cycles_stay_consistent() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    for gen in 1..100u64 {
        reader.update(gen);
        reader.park();
        reader.resume();
    }
    qsbr.wait(99);
}

#[test]
fn registration_round_trip_leaks_no_occupancy() {
    let qsbr = Qsbr::new();
    for _ in 0..1000 {
        let reader = qsbr.register().unwrap();
        drop(reader);
    }
    assert_eq!(qsbr.active(), 0);
}

#[test]
fn capacity_boundary_fails_with_exhausted() {
    let qsbr = Qsbr::new();
    let mut readers = Vec::with_capacity(qsbr.capacity());
    for _ in 0..qsbr.capacity() {
        readers.push(qsbr.register().expect("within capacity"));
    }
    assert_eq!(qsbr.active(), qsbr.capacity());

    assert_eq!(qsbr.register().unwrap_err(), Exhausted);

    // Freeing a single slot makes registration possible again.
    readers.pop();
    let reader = qsbr.register().expect("slot was just freed");
    drop(reader);
    drop(readers);
    assert_eq!(qsbr.active(), 0);
}

#[test]
fn full_registry_still_completes_grace_periods() {
    let qsbr = Qsbr::new();
    let readers: Vec<_> = (0..qsbr.capacity())
        .map(|_| qsbr.register().unwrap())
        .collect();
    for reader in &readers {
        reader.update(1);
    }
    qsbr.wait(1);
}

#[test]
fn reader_handle_moves_between_threads() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    reader.update(1);

    thread::scope(|s| {
        s.spawn(move || {
            // Ownership moved here; announcements continue unchanged.
            reader.update(2);
            drop(reader);
        });
    });

    qsbr.wait(2);
    assert_eq!(qsbr.active(), 0);
}

#[test]
fn exhausted_formats_as_an_error() {
    let err: Box<dyn std::error::Error> = Box::new(Exhausted);
    assert!(err.to_string().contains("capacity"));
}

#[test]
fn drop_of_empty_registry_is_clean() {
    let qsbr = Qsbr::new();
    let reader = qsbr.register().unwrap();
    drop(reader);
    drop(qsbr);
}
