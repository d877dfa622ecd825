//! # Reco Benchmarks
//!
//! | Group | Measures |
//! |-------|----------|
//! | envelope | frame encode/decode per codec |
//! | compile | interface compilation into a fresh registry |
//! | call | in-process call and a full DIRECT round trip |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reco_bus::{BusConfig, CodecKind, Domain, Envelope, MemoryBroker, Message};
use reco_rpc::{Handlers, Registry, RpcManager};
use reco_tests::fixtures::{Alarms, Logger, Worker};
use serde_json::{json, Value};
use std::time::Duration;

// ============================================================================
// ENVELOPE
// ============================================================================

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");

    for size in [1usize, 16, 256] {
        let args: Vec<Value> = (0..size).map(|i| json!({"index": i, "label": format!("arg-{i}")})).collect();
        let message = Message::new("rpcivk", json!({"callId": 7, "name": "Logger.log(string)", "args": args}));

        for codec in [CodecKind::Json, CodecKind::MsgPack] {
            let serializer = codec.serializer();
            let frame = Envelope::encode(&message, Domain::Direct, "bench", serializer.as_ref()).unwrap_or_default();

            group.throughput(Throughput::Bytes(frame.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("encode_{}", serializer.name()), size),
                &message,
                |b, message| {
                    b.iter(|| Envelope::encode(black_box(message), Domain::Direct, "bench", serializer.as_ref()))
                },
            );
            group.bench_with_input(
                BenchmarkId::new(format!("decode_{}", serializer.name()), size),
                &frame,
                |b, frame| b.iter(|| Envelope::decode(black_box(frame.clone()), serializer.as_ref())),
            );
        }
    }

    group.finish();
}

// ============================================================================
// COMPILE
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let groups = vec!["all".to_string()];

    group.bench_function("logger", |b| {
        b.iter(|| Registry::new(groups.clone()).compile::<Logger>().map(|i| i.methods().len()))
    });
    group.bench_function("alarms_with_object_class", |b| {
        b.iter(|| Registry::new(groups.clone()).compile::<Alarms>().map(|i| i.methods().len()))
    });
    group.bench_function("memoized_lookup", |b| {
        let registry = Registry::new(groups.clone());
        let _ = registry.compile::<Worker>();
        b.iter(|| registry.compile::<Worker>().map(|i| i.methods().len()))
    });

    group.finish();
}

// ============================================================================
// CALL
// ============================================================================

fn bench_call(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let mut group = c.benchmark_group("call");
    group.measurement_time(Duration::from_secs(5));

    let nodes = runtime.block_on(async {
        let broker = MemoryBroker::new("bench");
        let a = broker.connect(&BusConfig::named("a")).ok()?;
        let b = broker.connect(&BusConfig::named("b")).ok()?;
        let server = RpcManager::new(a);
        let client = RpcManager::new(b);
        server
            .register::<Worker>(Handlers::new().on_fn("foo", |_, _| async { Ok(json!(42)) }))
            .ok()?;
        let binding = client.bind::<Worker>("a").ok()?;
        Some((broker, server, binding))
    });
    let Some((_broker, server, binding)) = nodes else {
        return;
    };

    group.bench_function("local", |b| {
        b.to_async(&runtime).iter(|| server.call_local("Worker.foo()", Vec::new()))
    });
    group.bench_function("direct_round_trip", |b| {
        b.to_async(&runtime).iter(|| binding.call::<u64, _>("foo", ()))
    });

    group.finish();
}

criterion_group!(benches, bench_envelope, bench_compile, bench_call);
criterion_main!(benches);
