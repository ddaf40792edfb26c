//! Fan-out and history benchmarks for hubbub.
//!
//! These benchmarks measure broadcast cost as the number of recipients grows,
//! and the cost of reading a full history window.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hubbub_core::{ChatMessage, Hub, MessageStore};
use hubbub_transport::MemoryConnection;
use serde_json::json;

/// Benchmark broadcast_to_user with N chat sockets and one push queue.
fn bench_broadcast_to_user(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("broadcast_to_user");

    for sockets in [1usize, 10, 100] {
        let hub = Hub::new();
        let mut receivers = Vec::with_capacity(sockets);
        for _ in 0..sockets {
            let (handle, rx) = MemoryConnection::pair();
            hub.register_chat("bench", handle);
            receivers.push(rx);
        }
        let mut sub = hub.subscribe_push("bench");
        let payload = json!({"type": "message", "data": {"text": "hello", "echoed": true}});

        group.throughput(Throughput::Elements(sockets as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(sockets), &sockets, |b, _| {
            b.iter(|| {
                let delivered = rt
                    .block_on(hub.broadcast_to_user("bench", black_box(&payload)))
                    .unwrap();
                for rx in &mut receivers {
                    while rx.try_recv().is_ok() {}
                }
                while sub.try_recv().is_some() {}
                delivered
            });
        });
    }

    group.finish();
}

/// Benchmark broadcast_to_room excluding the sender.
fn bench_broadcast_to_room(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let hub = Hub::new();
    let mut receivers = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let (handle, rx) = MemoryConnection::pair();
        hub.register_room("room", handle.clone());
        handles.push(handle);
        receivers.push(rx);
    }
    let offer = json!({"type": "offer", "sdp": "v=0", "ts": "2024-01-01T00:00:00+00:00"});

    c.bench_function("broadcast_to_room/8", |b| {
        b.iter(|| {
            let delivered = rt
                .block_on(hub.broadcast_to_room("room", black_box(&offer), Some(&handles[0])))
                .unwrap();
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
            delivered
        });
    });
}

/// Benchmark reading the history window from a long sequence.
fn bench_history(c: &mut Criterion) {
    let store = MessageStore::new();
    for i in 0..10_000 {
        store
            .append("bench", ChatMessage::new("bench", "user", format!("message {i}")))
            .unwrap();
    }

    c.bench_function("history/200_of_10000", |b| {
        b.iter(|| store.history(black_box("bench")))
    });
}

criterion_group!(
    benches,
    bench_broadcast_to_user,
    bench_broadcast_to_room,
    bench_history
);
criterion_main!(benches);
