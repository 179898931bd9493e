use criterion::{Criterion, criterion_group, criterion_main};
use esox_resourcepool::ResourcePool;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

fn uncontended(c: &mut Criterion) {
    let pool = ResourcePool::with_capacity(5).unwrap();

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let handle = pool.acquire().unwrap();
            pool.release(black_box(handle));
        })
    });

    c.bench_function("checkout_guard", |b| {
        b.iter(|| {
            let guard = pool.checkout().unwrap();
            black_box(guard.id());
        })
    });
}

fn contended(c: &mut Criterion) {
    let pool = Arc::new(ResourcePool::with_capacity(2).unwrap());

    c.bench_function("contended_4_threads", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| {
                        for _ in 0..100 {
                            let handle = pool.acquire().unwrap();
                            pool.release(handle);
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(benches, uncontended, contended);
criterion_main!(benches);
