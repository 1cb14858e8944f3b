//! Pending reply table: ordering between resolve and deadline.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use uuid::Uuid;

use courier_core::{ErrorCode, MessageEnvelope, TypedEnvelope};
use courier_messenger::obs::MessengerMetrics;
use courier_messenger::reply::{PendingReplies, ReplyCallback, Scheduler, TimeoutTask};

fn request() -> MessageEnvelope {
    MessageEnvelope::new("requester", "orders", TypedEnvelope::new("ping"))
}

fn reply_to(request: &MessageEnvelope) -> MessageEnvelope {
    MessageEnvelope::reply_for(request, "responder", TypedEnvelope::new("pong"))
}

fn runtime_table() -> (Arc<PendingReplies>, Arc<MessengerMetrics>) {
    let metrics = Arc::new(MessengerMetrics::default());
    let table = Arc::new(PendingReplies::new(
        Scheduler::Runtime(Handle::current()),
        Arc::clone(&metrics),
    ));
    (table, metrics)
}

fn noop() -> ReplyCallback {
    Box::new(|_: Option<MessageEnvelope>| {})
}

/// Scheduler that parks deadline tasks until the test runs them.
type Parked = Arc<Mutex<Vec<TimeoutTask>>>;

fn manual_table() -> (Arc<PendingReplies>, Parked, Arc<MessengerMetrics>) {
    let parked: Arc<Mutex<Vec<TimeoutTask>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&parked);
    let metrics = Arc::new(MessengerMetrics::default());
    let table = Arc::new(PendingReplies::new(
        Scheduler::custom(move |task, _after| sink.lock().push(task)),
        Arc::clone(&metrics),
    ));
    (table, parked, metrics)
}

#[tokio::test]
async fn reply_before_timeout_delivers_envelope() {
    let (table, metrics) = runtime_table();
    let req = request();
    let id = req.id();
    let (tx, rx) = oneshot::channel();

    table
        .register(id, Duration::from_secs(1), Box::new(move |r: Option<MessageEnvelope>| {
            let _ = tx.send(r);
        }))
        .unwrap();
    assert!(table.contains(id));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(table.resolve(id, reply_to(&req)));

    let got = rx.await.unwrap().expect("reply expected");
    assert_eq!(got.reply_to(), Some(id));
    assert!(table.is_empty());
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "resolved")]), 1);
    assert_eq!(metrics.reply_latency.count(&[]), 1);
    assert_eq!(metrics.pending_replies.get(&[]), 0);
}

#[tokio::test]
async fn timeout_before_reply_yields_none_and_late_reply_is_ignored() {
    let (table, metrics) = runtime_table();
    let req = request();
    let id = req.id();
    let (tx, rx) = oneshot::channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let started = Instant::now();
    table
        .register(id, Duration::from_millis(100), Box::new(move |r: Option<MessageEnvelope>| {
            c.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(r);
        }))
        .unwrap();

    assert!(rx.await.unwrap().is_none());
    assert!(started.elapsed() >= Duration::from_millis(90));

    assert!(!table.resolve(id, reply_to(&req)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "timed_out")]), 1);
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "unmatched")]), 1);
}

#[test]
fn unmatched_reply_is_a_noop() {
    let (table, parked, metrics) = manual_table();
    let stray = reply_to(&request());
    assert!(!table.resolve(stray.reply_to().unwrap(), stray));
    assert!(table.is_empty());
    assert!(parked.lock().is_empty());
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "unmatched")]), 1);
}

#[test]
fn duplicate_live_request_id_is_rejected() {
    let (table, _parked, _metrics) = manual_table();
    let id = Uuid::new_v4();

    table.register(id, Duration::from_secs(5), noop()).unwrap();
    let err = table
        .register(id, Duration::from_secs(5), noop())
        .expect_err("second registration must fail");
    assert_eq!(err.code(), ErrorCode::DuplicateCorrelation);
    assert_eq!(table.len(), 1);
}

#[test]
fn deadline_after_resolve_is_a_noop() {
    let (table, parked, _metrics) = manual_table();
    let req = request();
    let id = req.id();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);

    let record: ReplyCallback =
        Box::new(move |r: Option<MessageEnvelope>| s.lock().push(r.is_some()));
    table.register(id, Duration::from_millis(10), record).unwrap();
    assert!(table.resolve(id, reply_to(&req)));

    for task in parked.lock().drain(..) {
        task.run();
    }
    assert_eq!(*seen.lock(), vec![true]);
    assert!(!table.expire(id));
}

#[test]
fn concurrent_resolve_and_timeout_invoke_each_callback_once() {
    const N: usize = 500;

    let (table, parked, metrics) = manual_table();
    let invocations: Arc<Vec<AtomicUsize>> =
        Arc::new((0..N).map(|_| AtomicUsize::new(0)).collect());
    let mut requests = Vec::with_capacity(N);

    for i in 0..N {
        let req = request();
        let inv = Arc::clone(&invocations);
        let count: ReplyCallback = Box::new(move |_: Option<MessageEnvelope>| {
            inv[i].fetch_add(1, Ordering::SeqCst);
        });
        table.register(req.id(), Duration::from_millis(1), count).unwrap();
        requests.push(req);
    }

    let tasks: Vec<TimeoutTask> = parked.lock().drain(..).collect();
    assert_eq!(tasks.len(), N);

    let barrier = Arc::new(Barrier::new(2));

    let b = Arc::clone(&barrier);
    let timers = thread::spawn(move || {
        b.wait();
        for task in tasks {
            task.run();
        }
    });

    let b = Arc::clone(&barrier);
    let t = Arc::clone(&table);
    let resolver = thread::spawn(move || {
        b.wait();
        requests
            .iter()
            .filter(|req| t.resolve(req.id(), reply_to(req)))
            .count()
    });

    timers.join().unwrap();
    let resolved = resolver.join().unwrap();

    for (i, count) in invocations.iter().enumerate() {
        assert_eq!(count.load(Ordering::SeqCst), 1, "entry {i}");
    }
    assert!(table.is_empty());

    let timed_out = metrics.reply_outcomes.get(&[("outcome", "timed_out")]) as usize;
    assert_eq!(resolved + timed_out, N);
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "unmatched")]) as usize, N - resolved);
}

#[test]
fn cancel_removes_without_invoking() {
    let (table, _parked, _metrics) = manual_table();
    let id = Uuid::new_v4();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    table
        .register(id, Duration::from_secs(1), Box::new(move |_: Option<MessageEnvelope>| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    assert!(table.cancel(id));
    assert!(!table.cancel(id));
    assert!(!table.expire(id));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn drain_completes_everything_with_none() {
    let (table, _parked, metrics) = manual_table();
    let results = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let r = Arc::clone(&results);
        let record: ReplyCallback = Box::new(move |reply: Option<MessageEnvelope>| {
            r.lock().push(reply.is_none());
        });
        table.register(Uuid::new_v4(), Duration::from_secs(1), record).unwrap();
    }

    assert_eq!(table.drain(), 3);
    assert_eq!(*results.lock(), vec![true, true, true]);
    assert!(table.is_empty());
    assert_eq!(table.drain(), 0);
    assert_eq!(metrics.reply_outcomes.get(&[("outcome", "drained")]), 3);
    assert_eq!(metrics.pending_replies.get(&[]), 0);
}

#[test]
fn panicking_callback_does_not_poison_the_table() {
    let (table, _parked, _metrics) = manual_table();
    let bad = request();
    let good = request();

    let explode: ReplyCallback = Box::new(|_: Option<MessageEnvelope>| panic!("callback blew up"));
    table.register(bad.id(), Duration::from_secs(1), explode).unwrap();
    table.register(good.id(), Duration::from_secs(1), noop()).unwrap();

    assert!(table.resolve(bad.id(), reply_to(&bad)));
    assert!(table.resolve(good.id(), reply_to(&good)));
    assert!(table.is_empty());
}

#[test]
fn dropped_table_makes_deadline_a_noop() {
    let (table, parked, _metrics) = manual_table();
    table
        .register(Uuid::new_v4(), Duration::from_millis(1), noop())
        .unwrap();
    drop(table);

    for task in parked.lock().drain(..) {
        task.run();
    }
}
