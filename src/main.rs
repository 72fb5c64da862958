mod app;
mod config;
mod entity;
mod metadata;
mod pipeline;
mod sinks;
mod tags;
mod transform;

use anyhow::{Context, Result};
use clap::Parser;

use app::{Cli, init_sink, process_pbf};
use config::{RuntimeConfig, TransformConfig, TransformOverrides};
use transform::ScriptRuleSet;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let overrides = TransformOverrides {
        script_path: cli.script.clone(),
        extra_attributes: cli.extra_attributes,
    };
    let transform = TransformConfig::load(cli.config.as_deref(), &overrides)?;

    // Configuration errors in the style surface here, before any input is read.
    let mut rules = ScriptRuleSet::load(&transform).context("CLI: Failed to load tag transform")?;
    tracing::info!(
        "Tag transform: {:?} (extra attributes: {})",
        transform.script_path,
        transform.extra_attributes
    );

    let runtime = RuntimeConfig {
        threads: cli.threads,
        strict: cli.strict,
        include_dropped: cli.include_dropped,
    };

    if let Some(threads) = runtime.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let sink = init_sink(&cli.output)?;

    let start = std::time::Instant::now();
    let stats = process_pbf(&cli, &transform, &runtime, &mut rules, sink)?;

    let elapsed = start.elapsed();
    stats.log_summary();
    if stats.failed() > 0 {
        tracing::warn!("{} entities skipped after rule set errors", stats.failed());
    }
    tracing::info!("Done in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
