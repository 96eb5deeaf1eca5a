//! Wait/notify protocol tests. These involve real blocking and sleeps, so
//! they run serialized to keep the timing assumptions honest.

use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use riptide_core::FnCallback;
use riptide_queue::EventQueue;

const STOP_EVENT: i32 = 1;
const DATA_EVENT: i32 = 2;

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::yield_now();
    }
}

// One consumer blocked in wait(), processing every batch the producers wake
// it for. Returns the join handle; enqueue STOP_EVENT to shut it down.
fn spawn_waiting_consumer(
    queue: Arc<EventQueue<i32, i32>>,
    wakeups: Arc<AtomicUsize>,
) -> thread::JoinHandle<()> {
    let should_stop = Arc::new(AtomicBool::new(false));
    {
        let should_stop = Arc::clone(&should_stop);
        queue.append_listener(
            STOP_EVENT,
            FnCallback::new(move |_| should_stop.store(true, Ordering::Relaxed)),
        );
    }

    thread::spawn(move || {
        while !should_stop.load(Ordering::Relaxed) {
            queue.wait();
            wakeups.fetch_add(1, Ordering::Relaxed);
            queue.process();
        }
    })
}

#[test]
#[serial]
fn test_waiter_wakes_per_enqueue() {
    let queue = Arc::new(EventQueue::<i32, i32>::new());
    let total = Arc::new(AtomicUsize::new(0));
    {
        let total = Arc::clone(&total);
        queue.append_listener(
            DATA_EVENT,
            FnCallback::new(move |amount: &i32| {
                total.fetch_add(*amount as usize, Ordering::Relaxed);
            }),
        );
    }

    let wakeups = Arc::new(AtomicUsize::new(0));
    let consumer = spawn_waiting_consumer(Arc::clone(&queue), Arc::clone(&wakeups));

    thread::sleep(Duration::from_millis(10));
    assert_eq!(wakeups.load(Ordering::Relaxed), 0);

    queue.enqueue(DATA_EVENT, 2);
    wait_until(|| total.load(Ordering::Relaxed) == 2);
    assert_eq!(wakeups.load(Ordering::Relaxed), 1);
    assert!(queue.is_empty());

    queue.enqueue(DATA_EVENT, 4);
    wait_until(|| total.load(Ordering::Relaxed) == 6);
    assert_eq!(wakeups.load(Ordering::Relaxed), 2);

    queue.enqueue(STOP_EVENT, 0);
    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_disable_notify_batches_wakeups() {
    let queue = Arc::new(EventQueue::<i32, i32>::new());
    let total = Arc::new(AtomicUsize::new(0));
    {
        let total = Arc::clone(&total);
        queue.append_listener(
            DATA_EVENT,
            FnCallback::new(move |amount: &i32| {
                total.fetch_add(*amount as usize, Ordering::Relaxed);
            }),
        );
    }

    let wakeups = Arc::new(AtomicUsize::new(0));
    let consumer = spawn_waiting_consumer(Arc::clone(&queue), Arc::clone(&wakeups));

    // Prime the consumer so it is parked in wait() before suppression starts.
    queue.enqueue(DATA_EVENT, 1);
    wait_until(|| total.load(Ordering::Relaxed) == 1);
    thread::sleep(Duration::from_millis(20));

    {
        let _suppressed = queue.disable_notify();

        queue.enqueue(DATA_EVENT, 2);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wakeups.load(Ordering::Relaxed), 1);
        assert!(!queue.is_empty());

        queue.enqueue(DATA_EVENT, 4);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wakeups.load(Ordering::Relaxed), 1);
        assert!(!queue.is_empty());
    }

    // Dropping the token releases the waiter, which processes both events.
    wait_until(|| total.load(Ordering::Relaxed) == 7);
    assert_eq!(wakeups.load(Ordering::Relaxed), 2);
    assert!(queue.is_empty());

    queue.enqueue(STOP_EVENT, 0);
    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_nested_disable_notify_releases_on_last_drop() {
    let queue = Arc::new(EventQueue::<i32, i32>::new());
    let total = Arc::new(AtomicUsize::new(0));
    {
        let total = Arc::clone(&total);
        queue.append_listener(
            DATA_EVENT,
            FnCallback::new(move |_| {
                total.fetch_add(1, Ordering::Relaxed);
            }),
        );
    }

    let wakeups = Arc::new(AtomicUsize::new(0));
    let consumer = spawn_waiting_consumer(Arc::clone(&queue), Arc::clone(&wakeups));

    // Prime the consumer so it is parked in wait() before suppression starts.
    queue.enqueue(DATA_EVENT, 0);
    wait_until(|| total.load(Ordering::Relaxed) == 1);
    thread::sleep(Duration::from_millis(20));

    {
        let _outer = queue.disable_notify();
        {
            let _inner = queue.disable_notify();
            queue.enqueue(DATA_EVENT, 0);
        }
        // Inner token dropped; the outer scope still suppresses.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wakeups.load(Ordering::Relaxed), 1);
        assert!(!queue.is_empty());
    }

    wait_until(|| total.load(Ordering::Relaxed) == 2);

    queue.enqueue(STOP_EVENT, 0);
    consumer.join().unwrap();
}

#[test]
#[serial]
fn test_wait_for_bounds_the_wait() {
    let queue: EventQueue<i32, i32> = EventQueue::new();

    let started = Instant::now();
    assert!(!queue.wait_for(Duration::from_millis(50)));
    assert!(started.elapsed() >= Duration::from_millis(50));

    queue.enqueue(DATA_EVENT, 0);
    let started = Instant::now();
    assert!(queue.wait_for(Duration::from_secs(10)));
    // An already-satisfied wait returns promptly.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
#[serial]
fn test_wait_for_wakes_on_concurrent_enqueue() {
    let queue = Arc::new(EventQueue::<i32, i32>::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            queue.enqueue(DATA_EVENT, 0);
        })
    };

    assert!(queue.wait_for(Duration::from_secs(10)));
    producer.join().unwrap();
}
