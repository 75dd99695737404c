use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use open_agent::{
    CharCountTokenCounter, ContextStrategy, ContextWindowManager, ResponseInputItem, SlidingWindow, Summarization,
    TokenCounter,
};

fn synthetic_history(turns: usize) -> Vec<ResponseInputItem> {
    let mut history = vec![ResponseInputItem::developer_text("You are a helpful assistant.")];
    for i in 0..turns {
        history.push(ResponseInputItem::user_text(format!(
            "Question {i}: can you explain how retries with exponential backoff work?"
        )));
        history.push(ResponseInputItem::assistant_text(format!(
            "Answer {i}: each retry waits base_delay * multiplier^attempt, capped at max_delay, plus jitter."
        )));
    }
    history
}

fn bench_char_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("char_count_token_counter");
    for turns in [10usize, 100, 1000] {
        let history = synthetic_history(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &history, |b, history| {
            let counter = CharCountTokenCounter;
            b.iter(|| black_box(counter.count(black_box(history))));
        });
    }
    group.finish();
}

fn bench_sliding_window_shrink(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window_shrink");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    for turns in [10usize, 100, 1000] {
        let history = synthetic_history(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &history, |b, history| {
            let strategy = SlidingWindow::new(20);
            let counter = CharCountTokenCounter;
            b.to_async(&runtime).iter(|| async { black_box(strategy.shrink(black_box(history), &counter, 0).await.unwrap()) });
        });
    }
    group.finish();
}

fn bench_summarization_shrink(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarization_shrink");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    for turns in [10usize, 100, 1000] {
        let history = synthetic_history(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &history, |b, history| {
            let strategy = Summarization::new(20, |items| format!("summary of {} items", items.len()));
            let counter = CharCountTokenCounter;
            b.to_async(&runtime).iter(|| async { black_box(strategy.shrink(black_box(history), &counter, 0).await.unwrap()) });
        });
    }
    group.finish();
}

fn bench_manager_maybe_shrink(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_window_manager_maybe_shrink");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    for turns in [10usize, 100, 1000] {
        let history = synthetic_history(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &history, |b, history| {
            let manager = ContextWindowManager::new(4_000);
            b.to_async(&runtime).iter(|| async { black_box(manager.maybe_shrink(black_box(history)).await.unwrap()) });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_char_count,
    bench_sliding_window_shrink,
    bench_summarization_shrink,
    bench_manager_maybe_shrink
);
criterion_main!(benches);
