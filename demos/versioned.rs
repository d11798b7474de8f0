//! Writer/reader demonstration over a small versioned array.
//!
//! A writer publishes new versions of a value, waits out a grace period
//! after each bump, and only then frees the previous version's
//! allocation. Readers loop: load the current version, hold its data for
//! a while, then announce quiescence. Run with:
//!
//! ```text
//! cargo run --example versioned
//! ```

use quiesce::Qsbr;
use rand::Rng;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const VERSIONS: usize = 5;
const READERS: usize = 4;

fn main() {
    let qsbr = Qsbr::new();
    let version = AtomicU64::new(0);
    let data: Vec<AtomicPtr<u64>> = (0..=VERSIONS)
        .map(|v| AtomicPtr::new(Box::into_raw(Box::new((v as u64) * 1000))))
        .collect();

    thread::scope(|s| {
        for id in 0..READERS {
            let qsbr = &qsbr;
            let version = &version;
            let data = &data[..];
            s.spawn(move || {
                let reader = qsbr.register().expect("registry at capacity");
                let mut rng = rand::rng();
                loop {
                    let v = version.load(Ordering::Acquire) as usize;
                    let p = data[v].load(Ordering::Acquire);
                    // SAFETY: data[v] is freed only after a grace period
                    // proves every reader has announced a generation
                    // past v; this reader has not yet done so.
                    let value = unsafe { *p };
                    thread::sleep(Duration::from_millis(rng.random_range(50..300)));
                    println!("reader {id} releases value {value}");

                    // Done touching version `v`; announce the freshest
                    // version we can see.
                    reader.update(version.load(Ordering::Acquire));

                    if v == VERSIONS {
                        break;
                    }
                }
                println!("reader {id} exits");
            });
        }

        for _ in 0..VERSIONS {
            thread::sleep(Duration::from_millis(400));
            let target = version.fetch_add(1, Ordering::AcqRel) + 1;
            println!("---- begin grace period {target} ----");
            qsbr.wait(target);
            println!("---- end grace period {target} ----");

            let old = data[(target - 1) as usize].swap(ptr::null_mut(), Ordering::AcqRel);
            // SAFETY: the grace period for `target` has elapsed, so no
            // reader still holds version target - 1.
            drop(unsafe { Box::from_raw(old) });
        }
    });

    let last = data[VERSIONS].swap(ptr::null_mut(), Ordering::AcqRel);
    // SAFETY: all readers have exited.
    drop(unsafe { Box::from_raw(last) });
}
