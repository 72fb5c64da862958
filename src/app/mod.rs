use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::bounded;
use osmpbf::{Blob, BlobDecode, BlobReader};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::{RuntimeConfig, TransformConfig};
use crate::pipeline::{
    BlockContext, BlockOutput, FilterStats, PendingRelation, filter_block, filter_relations,
    relation_way_members,
};
use crate::sinks::{DecisionSink, JsonlSink};
use crate::tags::TagList;
use crate::transform::ScriptRuleSet;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input PBF file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file for JSON lines decisions, `-` for stdout
    #[arg(short, long)]
    pub output: PathBuf,

    /// Tag transform configuration file (YAML or TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tag transform script, overrides `script_path` from the config
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Hand osm_user, osm_uid, osm_version, osm_timestamp and osm_changeset
    /// to the rule set
    #[arg(long)]
    pub extra_attributes: bool,

    /// Number of worker threads, each with its own rule set (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Abort on the first entity the rule set fails on
    #[arg(long)]
    pub strict: bool,

    /// Also write decisions for dropped entities
    #[arg(long)]
    pub include_dropped: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// What pass 2 leaves for the relation member pass.
#[derive(Default)]
pub struct Deferred {
    pub way_tags: HashMap<i64, TagList>,
    pub relations: Vec<PendingRelation>,
}

impl Deferred {
    fn absorb(&mut self, output: BlockOutput) {
        self.way_tags.extend(output.member_way_tags);
        self.relations.extend(output.relations);
    }
}

pub fn init_sink(output: &Path) -> Result<Box<dyn DecisionSink>> {
    if output == Path::new("-") {
        tracing::info!("Sink: jsonl -> stdout");
        Ok(Box::new(JsonlSink::stdout()?))
    } else {
        tracing::info!("Sink: jsonl -> {:?}", output);
        Ok(Box::new(JsonlSink::new(output).with_context(|| {
            format!("CLI: Failed to create output file {:?}", output)
        })?))
    }
}

/// Pass 1: ids of all ways that are relation members.
pub fn pass1_member_ways(path: &Path) -> Result<HashSet<i64>> {
    let reader = BlobReader::from_path(path)
        .with_context(|| format!("Pipeline: Failed to open {:?}", path))?;

    reader
        .par_bridge()
        .map(|blob_result| -> Result<HashSet<i64>> {
            let blob = blob_result?;
            match blob.decode()? {
                BlobDecode::OsmData(block) => Ok(relation_way_members(&block)),
                BlobDecode::OsmHeader(_) => Ok(HashSet::new()),
                BlobDecode::Unknown(unknown) => {
                    tracing::info!("Unknown blob: {}", unknown);
                    Ok(HashSet::new())
                }
            }
        })
        .try_reduce(HashSet::new, |mut acc, ids| {
            acc.extend(ids);
            Ok(acc)
        })
}

/// Pass 2: every entity through the object filter.
///
/// Each pool thread loads its own rule set and pulls blobs from a shared
/// channel; a writer thread owns the sink.
pub fn pass2_filter(
    path: &Path,
    transform: &TransformConfig,
    runtime: &RuntimeConfig,
    member_ways: &HashSet<i64>,
    sink: Box<dyn DecisionSink>,
) -> Result<(Box<dyn DecisionSink>, Deferred, FilterStats)> {
    let reader = BlobReader::from_path(path)
        .with_context(|| format!("Pipeline: Failed to open {:?}", path))?;
    let (blob_tx, blob_rx) = bounded::<Blob>(64);
    let (out_tx, out_rx) = bounded::<BlockOutput>(64);

    let feeder = std::thread::spawn(move || -> Result<()> {
        for blob in reader {
            let blob = blob?;
            if blob_tx.send(blob).is_err() {
                // Workers are gone; their error is reported instead.
                break;
            }
        }
        Ok(())
    });

    let writer = std::thread::spawn(move || -> Result<(Box<dyn DecisionSink>, Deferred)> {
        let mut sink = sink;
        let mut deferred = Deferred::default();
        for mut output in out_rx {
            for record in output.records.drain(..) {
                sink.write(&record)
                    .context("Pipeline: Failed writing decision")?;
            }
            deferred.absorb(output);
        }
        Ok((sink, deferred))
    });

    let ctx = BlockContext {
        extra_attributes: transform.extra_attributes,
        runtime,
        member_ways,
    };

    let worker_results: Vec<Result<FilterStats>> = rayon::broadcast(|worker| {
        let mut rules = ScriptRuleSet::load(transform)?;
        tracing::debug!("Worker {} loaded its rule set", worker.index());

        let mut stats = FilterStats::default();
        for blob in blob_rx.iter() {
            let block = match blob.decode()? {
                BlobDecode::OsmData(block) => block,
                BlobDecode::OsmHeader(_) => continue,
                BlobDecode::Unknown(unknown) => {
                    tracing::info!("Unknown blob: {}", unknown);
                    continue;
                }
            };
            let output = filter_block(&mut rules, &block, &ctx, &mut stats)?;
            out_tx
                .send(output)
                .map_err(|err| anyhow!("Pipeline: Failed to send block output: {}", err))?;
        }
        Ok(stats)
    });

    drop(blob_rx);
    drop(out_tx);

    let feeder_result = join_thread(feeder, "Blob reader")?;
    let writer_result = join_thread(writer, "Sink writer")?;

    let mut stats = FilterStats::default();
    for result in worker_results {
        stats.merge(&result?);
    }
    feeder_result?;
    let (sink, deferred) = writer_result?;

    Ok((sink, deferred, stats))
}

fn join_thread<T>(handle: std::thread::JoinHandle<T>, label: &str) -> Result<T> {
    handle.join().map_err(|panic_payload| {
        let panic_msg = panic_payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        anyhow!("Pipeline: {} thread panicked: {}", label, panic_msg)
    })
}

/// Run all three passes. `rules` is the instance validated at startup; it
/// serves the relation member pass on the calling thread.
pub fn process_pbf(
    cli: &Cli,
    transform: &TransformConfig,
    runtime: &RuntimeConfig,
    rules: &mut ScriptRuleSet,
    sink: Box<dyn DecisionSink>,
) -> Result<FilterStats> {
    tracing::info!("Pass 1: Collecting relation members from {:?}...", cli.input);
    let member_ways = pass1_member_ways(&cli.input)?;
    tracing::info!("Found {} ways referenced by relations.", member_ways.len());

    tracing::info!(
        "Pass 2: Filtering entities ({} workers)...",
        rayon::current_num_threads()
    );
    let (mut sink, deferred, mut stats) =
        pass2_filter(&cli.input, transform, runtime, &member_ways, sink)?;

    tracing::info!(
        "Pass 3: Filtering {} relations with their members...",
        deferred.relations.len()
    );
    filter_relations(
        rules,
        &deferred.relations,
        &deferred.way_tags,
        runtime,
        sink.as_mut(),
        &mut stats,
    )?;

    sink.finish().context("Pipeline: Failed to finalize sink")?;
    Ok(stats)
}
