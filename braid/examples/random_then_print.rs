//! Draws a random number on a worker, chains a couple of continuations on it
//! and logs which thread runs each step.
//!
//! Run with `RUST_LOG=info cargo run --example random_then_print`.

use anyhow::Result;
use braid::runtime::{Builder, TraceEvent, TraceKind};
use std::thread;
use tracing_subscriber::EnvFilter;

fn thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_owned()
}

fn random() -> u32 {
    tracing::info!(thread = %thread_name(), "random()");
    let i = fastrand::u32(..100);
    tracing::info!(thread = %thread_name(), i, "drew a number");
    i
}

fn convert_to_string(i: &u32) -> String {
    tracing::info!(thread = %thread_name(), "convert_to_string()");
    i.to_string()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_thread_names(true)
        .init();

    let scheduler = Builder::new()
        .worker_threads(4)
        .on_trace(|event: &TraceEvent| {
            if let TraceKind::TaskStarted(id) = event.kind {
                tracing::debug!(worker = %event.worker, task.id = %id, "task started");
            }
        })
        .try_build()?;

    tracing::info!(thread = %thread_name(), "submitting");

    let random = scheduler.spawn(random)?;
    let printed = random.then_run(|| tracing::info!(thread = %thread_name(), "yodo"));
    let converted = random.then_apply_async(&scheduler, convert_to_string);

    printed.get()?;
    tracing::info!(value = %converted.get()?, "converted");

    scheduler.shutdown()?;
    tracing::info!(metrics = ?scheduler.metrics(), "done");
    Ok(())
}
