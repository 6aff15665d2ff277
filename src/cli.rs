//! Demo binary: drives a simulated bulk run end to end and prints the live
//! event stream, so the pause/stop/throttle behavior can be watched from a
//! terminal.

use crate::cache::MemoryCache;
use crate::controller::RunController;
use crate::engine::throttle::ThrottlePolicy;
use crate::model::{CacheEffect, RunEvent, RunOptions, WorkItem};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThrottleKind {
    None,
    Fixed,
    Jitter,
}

#[derive(Debug, Parser)]
#[command(
    name = "bulklane",
    version,
    about = "Simulated bulk run through the single-lane engine"
)]
pub struct Cli {
    /// Number of simulated items to enqueue
    #[arg(long, default_value_t = 10)]
    pub items: usize,

    /// Fail every Nth item (1-based; e.g. 3 fails items 3, 6, 9, ...)
    #[arg(long)]
    pub fail_every: Option<usize>,

    /// Simulated per-item work duration
    #[arg(long, default_value = "200ms")]
    pub work: humantime::Duration,

    /// Inter-item throttle policy
    #[arg(long, value_enum, default_value_t = ThrottleKind::Fixed)]
    pub throttle: ThrottleKind,

    /// Delay for the fixed policy
    #[arg(long, default_value = "100ms")]
    pub delay: humantime::Duration,

    /// Lower jitter bound
    #[arg(long, default_value = "1s")]
    pub jitter_min: humantime::Duration,

    /// Upper jitter bound
    #[arg(long, default_value = "3s")]
    pub jitter_max: humantime::Duration,

    /// Subject domain for cache invalidation
    #[arg(long, default_value = "demo-records")]
    pub domain: String,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

fn throttle_policy(args: &Cli) -> ThrottlePolicy {
    match args.throttle {
        ThrottleKind::None => ThrottlePolicy::None,
        ThrottleKind::Fixed => ThrottlePolicy::Fixed {
            delay: args.delay.into(),
        },
        ThrottleKind::Jitter => ThrottlePolicy::Jittered {
            min: args.jitter_min.into(),
            max: args.jitter_max.into(),
        },
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.items == 0 {
        bail!("--items must be at least 1");
    }

    let cache = Arc::new(MemoryCache::new());
    let items: Vec<WorkItem> = (1..=args.items)
        .map(|i| {
            let id = i.to_string();
            cache.insert(&args.domain, &id, json!({ "record": i, "status": "live" }));
            WorkItem::new(id, format!("record {i}"))
        })
        .collect();

    let controller = RunController::with_cache(cache.clone());
    let mut events = controller.subscribe();

    let work = Duration::from(args.work);
    let fail_every = args.fail_every;
    let options = RunOptions::new("demo", &args.domain)
        .throttle(throttle_policy(&args))
        .cache_effect(CacheEffect::Remove)
        .dependents(vec![format!("{}-summary", args.domain)]);

    controller
        .start(
            items,
            move |item| async move {
                tokio::time::sleep(work).await;
                if let Some(n) = fail_every {
                    let ordinal: usize = item.id.parse().unwrap_or(0);
                    if n > 0 && ordinal % n == 0 {
                        anyhow::bail!("simulated failure for {}", item.label);
                    }
                }
                Ok(())
            },
            options,
        )
        .context("failed to start run")?;

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                RunEvent::RunStarted { kind, total, .. } => {
                    println!("started {kind} run over {total} items");
                }
                RunEvent::ItemStarted { index, label } => {
                    println!("[{}] processing {label}", index + 1);
                }
                RunEvent::ItemFinished {
                    index,
                    label,
                    outcome,
                    detail,
                } => match detail {
                    Some(detail) => println!("[{}] {label}: {outcome:?} ({detail})", index + 1),
                    None => println!("[{}] {label}: {outcome:?}", index + 1),
                },
                RunEvent::Paused => println!("paused"),
                RunEvent::Resumed => println!("resumed"),
                RunEvent::Fatal { message } => println!("fatal: {message}"),
                RunEvent::RunFinished { status } => {
                    println!("run finished: {status:?}");
                    break;
                }
            }
        }
    });

    let status = controller.join().await?;
    let _ = printer.await;

    let snapshot = controller.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "status={status:?} progress={}/{} cached_left={} invalidated={:?}",
            snapshot.progress,
            snapshot.total,
            cache.len(&args.domain),
            cache.invalidated(),
        );
    }
    Ok(())
}
