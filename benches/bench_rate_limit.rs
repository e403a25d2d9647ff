//! Micro benchmarks for the per-client admission path.
//! Pure CPU - no network, no IO.
//!
//! ```bash
//! cargo bench --bench bench_rate_limit
//! ```

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use throttle_proxy_lib::security::rate_limit::{
    ClientRegistry, RateLimitManager, RegistryConfig, RequestTracker, TokenBucket,
};

fn bench_tracker_record(c: &mut Criterion) {
    let tracker = RequestTracker::new();
    c.bench_function("tracker_record", |b| b.iter(|| black_box(tracker.record())));
}

fn bench_bucket_acquire(c: &mut Criterion) {
    let bucket = TokenBucket::new(1_000_000.0, 1);
    c.bench_function("token_bucket_try_acquire", |b| {
        b.iter(|| black_box(bucket.try_acquire()))
    });
}

fn bench_check_known_client(c: &mut Criterion) {
    let manager =
        RateLimitManager::new(ClientRegistry::new(RegistryConfig::for_limit(u32::MAX)), u32::MAX);
    manager.check("203.0.113.1");
    c.bench_function("manager_check_known_client", |b| {
        b.iter(|| black_box(manager.check(black_box("203.0.113.1"))))
    });
}

fn bench_check_over_limit(c: &mut Criterion) {
    // Every check past the first goes through the gate
    let manager = RateLimitManager::new(ClientRegistry::new(RegistryConfig::for_limit(1)), 1);
    c.bench_function("manager_check_over_limit", |b| {
        b.iter(|| black_box(manager.check(black_box("203.0.113.2"))))
    });
}

fn bench_check_many_clients(c: &mut Criterion) {
    let manager = RateLimitManager::new(ClientRegistry::new(RegistryConfig::for_limit(10)), 10);
    let clients: Vec<String> = (0..10_000)
        .map(|i| format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff))
        .collect();
    for client in &clients {
        manager.check(client);
    }
    let mut i = 0usize;
    c.bench_function("manager_check_10k_clients", |b| {
        b.iter(|| {
            i = (i + 1) % clients.len();
            black_box(manager.check(&clients[i]))
        })
    });
}

fn bench_sweep(c: &mut Criterion) {
    let t0 = Instant::now();
    let registry: Arc<ClientRegistry> = ClientRegistry::new(RegistryConfig::for_limit(10));
    for i in 0..10_000 {
        registry.get_or_create_at(&format!("client-{i}"), t0);
    }
    // Nothing is stale at t0, so this measures the scan alone
    c.bench_function("registry_sweep_10k_live", |b| {
        b.iter(|| black_box(registry.sweep_at(t0 + Duration::from_secs(1))))
    });
}

criterion_group!(
    rate_limit_benches,
    bench_tracker_record,
    bench_bucket_acquire,
    bench_check_known_client,
    bench_check_over_limit,
    bench_check_many_clients,
    bench_sweep,
);
criterion_main!(rate_limit_benches);
