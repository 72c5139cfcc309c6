//! End-to-end: a single thread submits 1000 counter-increment tasks across
//! a 4-worker bus; the final count is exactly 1000 and no task runs twice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use task_bus::TaskBus;

#[test]
fn thousand_tasks_from_one_submitter_all_run_exactly_once() {
    let original_dir = std::env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_current_dir(tmp.path()).unwrap();

    let mut bus = TaskBus::start(4).expect("bus starts");
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        loop {
            let c = counter.clone();
            match bus.add_task(move || {
                c.fetch_add(1, Ordering::SeqCst);
                0
            }) {
                Ok(()) => break,
                Err(_) => sleep(Duration::from_millis(1)),
            }
        }
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while counter.load(Ordering::SeqCst) < 1000 && std::time::Instant::now() < deadline {
        sleep(Duration::from_millis(10));
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1000);

    bus.close().unwrap();
    std::env::set_current_dir(original_dir).unwrap();
}
