use std::sync::{Arc, Mutex};
use std::time::Duration;

use dialog_client::memory::MemoryTransport;
use dialog_client::{MessageId, Peer, ResolveQueue};

fn mid(s: &str) -> MessageId {
    MessageId::from(s)
}

fn transport_with(mids: &[&str]) -> Arc<MemoryTransport> {
    let t = Arc::new(MemoryTransport::new(7));
    for m in mids {
        t.insert_text(Peer::user(42), *m, 99, format!("text of {m}"));
    }
    t
}

async fn let_tasks_run() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn concurrent_resolves_share_one_fetch() {
    let transport = transport_with(&["m1"]);
    let queue = Arc::new(ResolveQueue::new(transport.clone()));
    transport.pause_fetches();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let q = queue.clone();
            tokio::spawn(async move { q.resolve(Peer::user(42), mid("m1")).await })
        })
        .collect();
    let_tasks_run().await;
    transport.release_fetches();

    let mut results = Vec::new();
    for t in tasks {
        results.push(t.await.unwrap().unwrap());
    }
    assert_eq!(transport.fetch_count(&mid("m1")), 1);
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].text(), Some("text of m1"));
}

#[tokio::test]
async fn cached_message_is_served_without_fetch() {
    let transport = transport_with(&["m1"]);
    let queue = ResolveQueue::new(transport.clone());

    let first  = queue.resolve(Peer::user(42), mid("m1")).await.unwrap();
    let second = queue.resolve(Peer::user(42), mid("m1")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.fetch_count(&mid("m1")), 1);
    assert!(queue.is_cached(&mid("m1")));
}

#[tokio::test(start_paused = true)]
async fn distinct_ids_complete_independently() {
    let transport = transport_with(&["m1", "m2", "m3"]);
    transport.delay_fetches("m1", Duration::from_millis(30));
    transport.delay_fetches("m3", Duration::from_millis(10));
    let queue = Arc::new(ResolveQueue::new(transport.clone()));
    let finished = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = ["m1", "m2", "m3"]
        .into_iter()
        .map(|m| {
            let q = queue.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                let msg = q.resolve(Peer::user(42), mid(m)).await.unwrap();
                finished.lock().unwrap().push(msg.mid.clone());
                (m, msg)
            })
        })
        .collect();

    for t in tasks {
        let (requested, msg) = t.await.unwrap();
        assert_eq!(msg.mid, mid(requested));
        assert_eq!(msg.text(), Some(format!("text of {requested}").as_str()));
        assert_eq!(transport.fetch_count(&mid(requested)), 1);
    }
    assert_eq!(*finished.lock().unwrap(), vec![mid("m2"), mid("m3"), mid("m1")]);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let transport = transport_with(&["m1"]);
    transport.fail_fetches("m1", 3);
    let queue = ResolveQueue::new(transport.clone());

    for attempt in 1..=3 {
        let err = queue.resolve(Peer::user(42), mid("m1")).await.unwrap_err();
        assert_eq!(err.mid, mid("m1"));
        assert!(err.source.is("INTERNAL_*"));
        assert!(!queue.is_cached(&mid("m1")));
        assert_eq!(transport.fetch_count(&mid("m1")), attempt);
    }

    queue.resolve(Peer::user(42), mid("m1")).await.unwrap();
    queue.resolve(Peer::user(42), mid("m1")).await.unwrap();
    assert_eq!(transport.fetch_count(&mid("m1")), 4);
    assert_eq!(queue.cached_len(), 1);
}

#[tokio::test]
async fn failure_reaches_every_waiter() {
    let transport = transport_with(&["m1"]);
    transport.fail_fetches("m1", 1);
    let queue = Arc::new(ResolveQueue::new(transport.clone()));
    transport.pause_fetches();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let q = queue.clone();
            tokio::spawn(async move { q.resolve(Peer::user(42), mid("m1")).await })
        })
        .collect();
    let_tasks_run().await;
    transport.release_fetches();

    for t in tasks {
        assert!(t.await.unwrap().is_err());
    }
    assert_eq!(transport.fetch_count(&mid("m1")), 1);

    queue.resolve(Peer::user(42), mid("m1")).await.unwrap();
    assert_eq!(transport.fetch_count(&mid("m1")), 2);
}

#[tokio::test]
async fn missing_message_is_a_resolution_error() {
    let transport = transport_with(&[]);
    let queue = ResolveQueue::new(transport.clone());

    let err = queue.resolve(Peer::group(5), mid("nope")).await.unwrap_err();
    assert!(err.source.is("MESSAGE_NOT_FOUND"));
    assert_eq!(err.to_string(), "failed to resolve message nope: MESSAGE_NOT_FOUND: Message not found");
}

#[tokio::test]
async fn waiters_retry_when_the_fetching_caller_is_dropped() {
    let transport = transport_with(&["m1"]);
    let queue = Arc::new(ResolveQueue::new(transport.clone()));
    transport.pause_fetches();

    let leader = {
        let q = queue.clone();
        tokio::spawn(async move { q.resolve(Peer::user(42), mid("m1")).await })
    };
    let_tasks_run().await;
    let waiter = {
        let q = queue.clone();
        tokio::spawn(async move { q.resolve(Peer::user(42), mid("m1")).await })
    };
    let_tasks_run().await;

    leader.abort();
    let_tasks_run().await;
    transport.release_fetches();

    let msg = waiter.await.unwrap().unwrap();
    assert_eq!(msg.mid, mid("m1"));
    assert_eq!(transport.fetch_count(&mid("m1")), 2);
}

#[tokio::test]
async fn bounded_cache_evicts_oldest() {
    let transport = transport_with(&["m1", "m2", "m3"]);
    let queue = ResolveQueue::with_capacity(transport.clone(), Some(2));

    for m in ["m1", "m2", "m3"] {
        queue.resolve(Peer::user(42), mid(m)).await.unwrap();
    }
    assert_eq!(queue.cached_len(), 2);
    assert!(!queue.is_cached(&mid("m1")));
    assert!(queue.is_cached(&mid("m3")));

    queue.resolve(Peer::user(42), mid("m1")).await.unwrap();
    assert_eq!(transport.fetch_count(&mid("m1")), 2);
    assert!(!queue.is_cached(&mid("m2")));
}
