//! Demo command - runs simulated forum reads through an in-process cache

use std::cmp::Ordering;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use clap::Args;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::query::{
    Condition, NormalizedOptions, QueryOptions, RangeBounds, ReadDescriptor, Scalar, SortDirection,
};
use crate::infrastructure::cache::StoreType;
use crate::infrastructure::observability::{init_metrics, MetricsConfig};
use crate::infrastructure::services::QueryCache;

use super::load_config;

/// Arguments for the demo command
#[derive(Args, Clone, Debug)]
pub struct DemoArgs {
    /// Number of passes over the read set
    #[arg(long, default_value_t = 3)]
    pub runs: usize,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

/// Run the demo
pub async fn run(args: DemoArgs) -> anyhow::Result<()> {
    let config = load_config()?;

    let metrics = if args.metrics || config.observability.metrics.enabled {
        init_metrics(&MetricsConfig { enabled: true })
    } else {
        None
    };

    let mut settings = config.cache.clone();
    settings.store_type = StoreType::InMemory;
    let cache = QueryCache::open(&settings)?;

    let records = forum_threads();
    let reads = demo_reads();
    let executions = AtomicUsize::new(0);
    let mut fetches = 0;

    for pass in 0..args.runs {
        for (label, descriptor, options) in &reads {
            let rows: Vec<Value> = cache
                .fetch("threads", descriptor, options, |filter, normalized| {
                    executions.fetch_add(1, AtomicOrdering::SeqCst);
                    let rows = run_query(&records, &filter, &normalized);
                    async move { Ok::<_, Infallible>(rows) }
                })
                .await?;

            fetches += 1;
            info!(pass, read = %label, rows = rows.len(), "Read served");
        }
    }

    let removed = cache.invalidate_namespace("threads").await;
    cache.close().await?;

    let executed = executions.load(AtomicOrdering::SeqCst);
    println!("reads:       {}", fetches);
    println!("executions:  {}", executed);
    println!("cache hits:  {}", fetches - executed);
    println!("invalidated: {}", removed);

    if let Some(metrics) = metrics {
        println!();
        print!("{}", metrics.render());
    }

    Ok(())
}

fn demo_reads() -> Vec<(&'static str, ReadDescriptor, QueryOptions)> {
    vec![
        (
            "latest open",
            ReadDescriptor::new().with("status", Condition::eq("open")),
            QueryOptions::new().with_sort("-createdAt").with_limit(2u64),
        ),
        (
            "open or pinned ($or)",
            ReadDescriptor::new().with_any_of(vec![
                ReadDescriptor::new().with("status", Condition::eq("open")),
                ReadDescriptor::new().with("status", Condition::eq("pinned")),
            ]),
            QueryOptions::new().with_sort("createdAt"),
        ),
        (
            "open or pinned ($in)",
            ReadDescriptor::new().with("status", Condition::is_in(["open", "pinned"])),
            QueryOptions::new().with_sort("createdAt"),
        ),
        (
            "january",
            ReadDescriptor::new().with(
                "createdAt",
                Condition::Range(RangeBounds {
                    gte: Some(Scalar::from("2024-01-01")),
                    lt: Some(Scalar::from("2024-02-01")),
                    ..Default::default()
                }),
            ),
            QueryOptions::new().with_skip("abc").with_limit("5"),
        ),
    ]
}

/// Fixture forum threads used by the demo
pub fn forum_threads() -> Vec<Value> {
    vec![
        json!({"id": 1, "board": "general", "status": "pinned", "title": "Welcome", "createdAt": "2023-12-20T09:00:00.000Z"}),
        json!({"id": 2, "board": "general", "status": "open", "title": "Introductions", "createdAt": "2024-01-03T12:30:00.000Z"}),
        json!({"id": 3, "board": "help", "status": "closed", "title": "Login loop", "createdAt": "2024-01-15T08:15:00.000Z"}),
        json!({"id": 4, "board": "help", "status": "open", "title": "Upload limits", "createdAt": "2024-01-28T17:45:00.000Z"}),
        json!({"id": 5, "board": "general", "status": "open", "title": "February meetup", "createdAt": "2024-02-02T19:00:00.000Z"}),
    ]
}

/// Evaluates a normalized read against in-memory records
pub fn run_query(
    records: &[Value],
    filter: &ReadDescriptor,
    options: &NormalizedOptions,
) -> Vec<Value> {
    let mut rows: Vec<&Value> = records.iter().filter(|r| matches(r, filter)).collect();

    rows.sort_by(|a, b| {
        options
            .sort
            .iter()
            .map(|(field, direction)| {
                let ordering =
                    compare(&a[field.as_str()], &b[field.as_str()]).unwrap_or(Ordering::Equal);
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    rows.into_iter()
        .skip(options.skip as usize)
        .take(options.limit as usize)
        .map(|row| project(row, options))
        .collect()
}

fn matches(record: &Value, filter: &ReadDescriptor) -> bool {
    let conditions_hold = filter
        .conditions
        .iter()
        .all(|(field, condition)| condition_holds(&record[field.as_str()], condition));

    let branch_holds = match &filter.any_of {
        Some(branches) => branches.iter().any(|b| matches(record, b)),
        None => true,
    };

    conditions_hold && branch_holds
}

fn condition_holds(value: &Value, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(expected) => *value == scalar_value(expected),
        Condition::In(options) => options.iter().any(|o| *value == scalar_value(o)),
        Condition::Range(bounds) => {
            let check = |bound: &Option<Scalar>, accept: fn(Ordering) -> bool| {
                bound
                    .as_ref()
                    .is_none_or(|b| compare(value, &scalar_value(b)).is_some_and(accept))
            };

            check(&bounds.gt, Ordering::is_gt)
                && check(&bounds.gte, Ordering::is_ge)
                && check(&bounds.lt, Ordering::is_lt)
                && check(&bounds.lte, Ordering::is_le)
        }
        Condition::Other(_) => false,
    }
}

fn scalar_value(scalar: &Scalar) -> Value {
    serde_json::to_value(scalar).unwrap_or(Value::Null)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn project(row: &Value, options: &NormalizedOptions) -> Value {
    let (Some(select), Value::Object(object)) = (&options.select, row) else {
        return row.clone();
    };

    let included: Map<String, Value> = object
        .iter()
        .filter(|(field, _)| select.get(field.as_str()).is_some_and(|flag| *flag != 0))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    Value::Object(included)
}
