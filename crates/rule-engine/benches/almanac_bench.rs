//! 事实解析与条件评估性能基准测试
//!
//! 对比缓存命中与每次重新计算的事实解析开销，以及常用操作符的评估开销。

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rule_engine::{
    Almanac, AlmanacOptions, Condition, ConditionEvaluator, Engine, Event, Fact, FactOptions,
    LogicalGroup, Operator, Rule, RuleNode,
};
use serde_json::{json, Map, Value};
use std::hint::black_box;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn profile_fact(cache: bool) -> Fact {
    Fact::from_fn("profile", |params, _almanac| async move {
        let id = params.get("id").cloned().unwrap_or(Value::Null);
        Ok(json!({"id": id, "level": "gold", "tags": ["a", "b", "c"]}))
    })
    .unwrap()
    .with_options(FactOptions::default().with_cache(cache))
}

/// 缓存命中与未命中的事实解析
fn bench_fact_resolution(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fact_resolution");

    for cache in [true, false] {
        let almanac = Almanac::new(AlmanacOptions::default());
        almanac.add_fact(profile_fact(cache));
        let mut params = Map::new();
        params.insert("id".to_string(), json!("user-1"));

        let label = if cache { "cached" } else { "uncached" };
        group.bench_with_input(BenchmarkId::new("profile", label), &params, |b, params| {
            b.iter(|| {
                rt.block_on(almanac.fact_value(black_box("profile"), Some(params)))
                    .unwrap()
            })
        });
    }

    let almanac = Almanac::new(AlmanacOptions::default());
    almanac.add_runtime_fact("user", json!({"id": "user-1"}));
    group.bench_function("runtime_fact", |b| {
        b.iter(|| rt.block_on(almanac.fact_value(black_box("user"), None)).unwrap())
    });

    group.finish();
}

/// 有容量上限时持续写入新键的开销
fn bench_bounded_cache(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("bounded_cache");

    for max_size in [16usize, 256, 4096] {
        let almanac = Almanac::new(AlmanacOptions::default().with_cache_max_size(max_size));
        almanac.add_fact(profile_fact(true));
        let mut counter = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(max_size), &max_size, |b, _| {
            b.iter(|| {
                counter += 1;
                let mut params = Map::new();
                params.insert("id".to_string(), json!(counter));
                rt.block_on(almanac.fact_value("profile", Some(&params))).unwrap()
            })
        });
    }

    group.finish();
}

/// 常用操作符评估
fn bench_operators(c: &mut Criterion) {
    let mut group = c.benchmark_group("operators");

    let number = json!(1000);
    let threshold = json!(500);
    let text = json!("hello world");
    let list = json!(["a", "b", "c", "d", "e"]);

    group.bench_function("greater_than", |b| {
        b.iter(|| {
            ConditionEvaluator::evaluate(
                black_box(&number),
                black_box(Operator::GreaterThan),
                black_box(&threshold),
            )
        })
    });

    group.bench_function("in", |b| {
        let needle = json!("d");
        b.iter(|| {
            ConditionEvaluator::evaluate(black_box(&needle), black_box(Operator::In), black_box(&list))
        })
    });

    group.bench_function("contains", |b| {
        let world = json!("world");
        b.iter(|| {
            ConditionEvaluator::evaluate(
                black_box(&text),
                black_box(Operator::Contains),
                black_box(&world),
            )
        })
    });

    group.finish();
}

/// 引擎完整运行
fn bench_engine_run(c: &mut Criterion) {
    let rt = runtime();
    let engine = Engine::default();
    engine.add_fact(profile_fact(true));

    for i in 0..20 {
        let rule = Rule::new(
            format!("rule-{}", i),
            RuleNode::Group(LogicalGroup::and(vec![
                RuleNode::Condition(
                    Condition::new("order", Operator::GreaterThan, i * 100).with_path("$.amount"),
                ),
                RuleNode::Condition(
                    Condition::new("profile", Operator::Equal, "gold").with_path("$.level"),
                ),
            ])),
            Event::new(format!("event-{}", i)),
        )
        .with_priority(i % 3);
        engine.add_rule(rule).unwrap();
    }

    let mut facts = Map::new();
    facts.insert("order".to_string(), json!({"amount": 1050}));

    c.bench_function("engine_run_20_rules", |b| {
        b.iter(|| rt.block_on(engine.run(black_box(facts.clone()))).unwrap())
    });
}

criterion_group!(
    benches,
    bench_fact_resolution,
    bench_bounded_cache,
    bench_operators,
    bench_engine_run
);
criterion_main!(benches);
