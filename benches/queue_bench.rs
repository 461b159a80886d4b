//! Benchmarks for the priority queue.
//!
//! Covers push/pop throughput, mixed-priority ordering, targeted removal,
//! and contended producer/consumer throughput.

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::Value;
use taskmill::{Priority, PriorityQueue, Task, TaskId, TaskOutcome, TaskType};

fn make_task(id: TaskId, priority: Priority) -> Arc<Task> {
    let mut task = Task::new(TaskType::UserDefined, priority, || {
        TaskOutcome::success(Value::Null)
    });
    task.id = id;
    task.submit_time = Instant::now();
    Arc::new(task)
}

fn priority_for(i: u64) -> Priority {
    match i % 5 {
        0 => Priority::Critical,
        1 => Priority::High,
        2 => Priority::Normal,
        3 => Priority::Low,
        _ => Priority::Background,
    }
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_pop");
    for &size in &[100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("mixed_priorities", size), &size, |b, &n| {
            b.iter(|| {
                let queue = PriorityQueue::new();
                for i in 0..n {
                    queue.push(make_task(i + 1, priority_for(i))).unwrap();
                }
                while let Some(task) = queue.try_pop() {
                    black_box(task.id);
                }
            });
        });
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_remove");
    for &size in &[100_u64, 1_000] {
        group.bench_with_input(BenchmarkId::new("middle_of_queue", size), &size, |b, &n| {
            b.iter(|| {
                let queue = PriorityQueue::new();
                for i in 0..n {
                    queue.push(make_task(i + 1, priority_for(i))).unwrap();
                }
                black_box(queue.remove(n / 2));
            });
        });
    }
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_contended");
    group.sample_size(10);
    group.throughput(Throughput::Elements(2_000));
    group.bench_function("two_producers_two_consumers", |b| {
        b.iter(|| {
            let queue = Arc::new(PriorityQueue::new());
            let per_producer = 1_000_u64;

            let producers: Vec<_> = (0..2u64)
                .map(|p| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..per_producer {
                            let id = p * per_producer + i + 1;
                            queue.push(make_task(id, priority_for(i))).unwrap();
                        }
                    })
                })
                .collect();

            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || {
                        let mut count = 0_u64;
                        while queue
                            .pop_with_timeout(Duration::from_millis(50))
                            .is_some()
                        {
                            count += 1;
                        }
                        count
                    })
                })
                .collect();

            for handle in producers {
                handle.join().unwrap();
            }
            let consumed: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();
            black_box(consumed);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_remove, bench_contended);
criterion_main!(benches);
