//! Benchmark for callback list registration and invocation throughput.
//!
//! Run with: cargo bench --package riptide-core --bench callback_list_benchmark

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use riptide_core::{CallbackList, FnCallback};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LIST_SIZES: [usize; 3] = [10, 100, 1_000];

fn bench_append_remove(list: &CallbackList<usize>, count: usize) {
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        handles.push(list.append(FnCallback::new(|amount| {
            black_box(*amount);
        })));
    }
    for handle in handles {
        list.remove(&handle);
    }
}

fn bench_invoke(list: &CallbackList<usize>, sweeps: usize) {
    for _ in 0..sweeps {
        list.invoke(&1);
    }
}

fn bench_concurrent_invoke(list: Arc<CallbackList<usize>>, thread_count: usize, sweeps: usize) {
    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                for _ in 0..sweeps {
                    list.invoke(&1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

fn callback_list_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("callback_list");

    for size in LIST_SIZES {
        group.bench_with_input(
            BenchmarkId::new("append_remove", size),
            &size,
            |bencher, &size| {
                let list = CallbackList::new();
                bencher.iter(|| bench_append_remove(&list, size));
            },
        );

        group.bench_with_input(BenchmarkId::new("invoke", size), &size, |bencher, &size| {
            let list = CallbackList::new();
            let total = Arc::new(AtomicUsize::new(0));
            for _ in 0..size {
                let total = Arc::clone(&total);
                list.append(FnCallback::new(move |amount: &usize| {
                    total.fetch_add(*amount, Ordering::Relaxed);
                }));
            }
            bencher.iter(|| bench_invoke(&list, 10));
        });

        group.bench_with_input(
            BenchmarkId::new("concurrent_invoke_4", size),
            &size,
            |bencher, &size| {
                let list = Arc::new(CallbackList::new());
                let total = Arc::new(AtomicUsize::new(0));
                for _ in 0..size {
                    let total = Arc::clone(&total);
                    list.append(FnCallback::new(move |amount: &usize| {
                        total.fetch_add(*amount, Ordering::Relaxed);
                    }));
                }
                bencher.iter(|| bench_concurrent_invoke(Arc::clone(&list), 4, 10));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, callback_list_benchmark);
criterion_main!(benches);
