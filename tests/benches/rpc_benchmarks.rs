//! # Batch RPC Benchmarks
//!
//! | Benchmark | What it measures |
//! |-----------|------------------|
//! | `kernel/cpu` | Doubling kernel alone, inline vs Rayon sizes |
//! | `round_trip` | Full call: publish, worker, reply, correlation |
//! | `envelope` | Request encode + decode |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rpc_broker::{InMemoryBroker, Transport};
use rpc_client::{ClientConfig, RpcClient};
use rpc_compute::{create_backend, Backend};
use rpc_types::{CorrelationId, ReplyTo, RequestEnvelope};
use rpc_worker::{WorkerConfig, WorkerEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::watch;

const SIZES: [usize; 4] = [8, 1_000, 10_000, 100_000];

fn bench_cpu_kernel(c: &mut Criterion) {
    let kernel = create_backend(Backend::Cpu).expect("cpu backend");
    let mut group = c.benchmark_group("kernel/cpu");

    for size in SIZES {
        let input: Vec<i32> = (0..size as i32).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(kernel.transform(input).expect("transform")))
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let broker = InMemoryBroker::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = runtime.block_on(async {
        let worker_transport: Arc<dyn Transport> =
            Arc::new(broker.connect().expect("worker connection"));
        let engine = WorkerEngine::new(
            worker_transport,
            create_backend(Backend::Cpu).expect("cpu backend"),
            WorkerConfig::default(),
        );
        tokio::spawn(async move { engine.run(shutdown_rx).await });

        let client_transport: Arc<dyn Transport> =
            Arc::new(broker.connect().expect("client connection"));
        RpcClient::connect(client_transport, ClientConfig::default())
            .await
            .expect("client session")
    });

    let mut group = c.benchmark_group("round_trip");
    group.measurement_time(Duration::from_secs(10));
    for size in SIZES {
        let input: Vec<i32> = (0..size as i32).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                runtime
                    .block_on(client.call(input.clone(), Duration::from_secs(10)))
                    .expect("call")
            })
        });
    }
    group.finish();

    runtime.block_on(async {
        client.close().await.expect("close");
    });
    let _ = shutdown_tx.send(true);
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let reply_to = ReplyTo::new("amq.gen-bench");

    for size in [8usize, 10_000] {
        let request = RequestEnvelope::new(
            CorrelationId::new(),
            reply_to.clone(),
            (0..size as i32).collect(),
        );
        group.bench_with_input(BenchmarkId::new("encode_decode", size), &request, |b, request| {
            b.iter(|| {
                let message = request.to_message();
                black_box(RequestEnvelope::from_message(&message).expect("decode"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cpu_kernel, bench_round_trip, bench_envelope);
criterion_main!(benches);
