// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod store;
pub mod types;
pub mod units;

use anyhow::{Context, Result, anyhow, bail};
use aws_config::SdkConfig;
use tracing::{debug, error, info};

use crate::cli::{CliArgs, Command};
use crate::config::{BatchConfig, ConfigOverrides, load_with_overrides};
use crate::engine::{BatchReport, ChainRunner, DispatchQueue, ReadinessPoller, StateChain, UnitPipeline};
use crate::errors::BatchError;
use crate::exec::{
    CommandForcingSource, CommandZeroState, LambdaInvoker, ProcessInvoker, SimulationInvoker,
    VolumeOutcome, VolumeWorker,
};
use crate::plan::TaskEnumerator;
use crate::store::S3Gate;
use crate::store::aws::load_sdk_config;
use crate::types::{EndpointKind, ReadinessTarget, WorkerStage};
use crate::units::{ComputeRequest, SimulationUnit};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (+ CLI overrides)
/// - task enumeration
/// - AWS clients
/// - the selected engine: chain runner, dispatch queue or single-unit worker
pub async fn run(args: CliArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        bucket: args.bucket.clone(),
        arch: args.arch.clone(),
    };
    let cfg = load_with_overrides(&args.config, &overrides)
        .with_context(|| format!("loading config from '{}'", args.config))?;

    match args.command {
        Command::Work { request, stage } => {
            let request = load_request(&request)?;
            if args.dry_run {
                print_work_dry_run(&cfg, &request, stage);
                return Ok(());
            }
            let sdk_config = load_sdk_config(&cfg.aws).await;
            run_work(&cfg, &sdk_config, &request, stage).await
        }
        Command::Chain { remote } => {
            let units = TaskEnumerator::from_config(&cfg).enumerate();
            if args.dry_run {
                print_dry_run(&cfg, &units);
                return Ok(());
            }
            let sdk_config = load_sdk_config(&cfg.aws).await;
            let gate = S3Gate::new(&sdk_config, &cfg.batch.bucket);
            run_chain(&cfg, &sdk_config, &gate, &units, remote).await
        }
        Command::Dispatch { readiness } => {
            let units = TaskEnumerator::from_config(&cfg).enumerate();
            if args.dry_run {
                print_dry_run(&cfg, &units);
                return Ok(());
            }
            let sdk_config = load_sdk_config(&cfg.aws).await;
            let gate = S3Gate::new(&sdk_config, &cfg.batch.bucket);
            run_dispatch(&cfg, &sdk_config, &gate, units, readiness).await
        }
    }
}

/// `--request` takes inline JSON or `@path`.
fn load_request(arg: &str) -> Result<ComputeRequest> {
    let body = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading request file '{path}'"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&body).context("parsing compute request JSON")
}

fn local_invoker(cfg: &BatchConfig) -> Result<ProcessInvoker> {
    let routing_cmd = cfg.worker.routing_cmd.as_deref().ok_or_else(|| {
        BatchError::ConfigError("[worker].routing_cmd is required to run routing locally".into())
    })?;
    Ok(ProcessInvoker::new(routing_cmd, &cfg.worker.scratch_dir))
}

async fn run_chain(
    cfg: &BatchConfig,
    sdk_config: &SdkConfig,
    gate: &S3Gate,
    units: &[SimulationUnit],
    remote: bool,
) -> Result<()> {
    let invoker: Box<dyn SimulationInvoker> = if remote {
        let endpoint = cfg
            .endpoint()
            .filter(|e| e.kind == EndpointKind::Lambda)
            .ok_or_else(|| {
                anyhow!(
                    "--remote needs a lambda endpoint for arch '{}'",
                    cfg.batch.arch
                )
            })?;
        Box::new(LambdaInvoker::new(sdk_config, &endpoint.target, &cfg.batch.bucket))
    } else {
        Box::new(local_invoker(cfg)?)
    };
    let zero_state = CommandZeroState::new(&cfg.worker.zero_state_cmd);

    let runner = ChainRunner::new(
        StateChain::new(cfg.chain_origin()),
        ReadinessPoller::from_config(gate, cfg),
        UnitPipeline::new(gate, invoker.as_ref(), &zero_state, &cfg.worker.scratch_dir),
        cfg.retry.unit_attempts,
    );
    let report = runner.run_batch(units).await?;
    finish_chains(&report)
}

fn finish_chains(report: &BatchReport) -> Result<()> {
    let aborted = report.aborted();
    for abort in aborted.iter() {
        error!(unit = %abort.unit, reason = %abort.reason, "chain aborted");
    }
    if !aborted.is_empty() {
        bail!(
            "{} of {} chain(s) aborted before completion",
            aborted.len(),
            report.chains.len()
        );
    }
    Ok(())
}

async fn run_dispatch(
    cfg: &BatchConfig,
    sdk_config: &SdkConfig,
    gate: &S3Gate,
    units: Vec<SimulationUnit>,
    readiness: ReadinessTarget,
) -> Result<()> {
    let endpoint = cfg.endpoint().ok_or_else(|| {
        BatchError::ConfigError(format!(
            "dispatch needs an [endpoints.{}] table",
            cfg.batch.arch
        ))
    })?;
    let trigger = exec::trigger::from_endpoint(sdk_config, endpoint);

    let mut queue = DispatchQueue::new(gate, trigger.as_ref(), units, &cfg.batch.bucket, readiness)
        .with_rescan(cfg.rescan_interval(), cfg.retry.max_passes);
    let summary = queue.run_until_empty().await?;
    info!(passes = summary.passes, completed = summary.completed, "dispatch finished");
    Ok(())
}

async fn run_work(
    cfg: &BatchConfig,
    sdk_config: &SdkConfig,
    request: &ComputeRequest,
    stage: WorkerStage,
) -> Result<()> {
    let unit = request.unit();
    let gate = S3Gate::new(sdk_config, &request.bucket);
    info!(unit = %unit, bucket = %request.bucket, ?stage, "handling compute request");

    match stage {
        WorkerStage::Routing => {
            let invoker = local_invoker(cfg)?;
            let zero_state = CommandZeroState::new(&cfg.worker.zero_state_cmd);
            let runner = ChainRunner::new(
                StateChain::new(cfg.chain_origin()),
                ReadinessPoller::from_config(&gate, cfg),
                UnitPipeline::new(&gate, &invoker, &zero_state, &cfg.worker.scratch_dir),
                cfg.retry.unit_attempts,
            );
            let report = runner.run_chain(unit.chain_key(), &[unit.clone()]).await?;
            if let Some(abort) = report.aborted {
                bail!("{}: {}", abort.unit, abort.reason);
            }
            Ok(())
        }
        WorkerStage::Volume => {
            let fetch_cmd = cfg.worker.fetch_cmd.as_deref().ok_or_else(|| {
                BatchError::ConfigError("[worker].fetch_cmd is required for the volume stage".into())
            })?;
            let volume_cmd = cfg.worker.volume_cmd.as_deref().ok_or_else(|| {
                BatchError::ConfigError("[worker].volume_cmd is required for the volume stage".into())
            })?;
            let source = CommandForcingSource::new(fetch_cmd);
            let worker = VolumeWorker::new(
                &gate,
                &source,
                volume_cmd,
                cfg.worker.dataset.clone(),
                &cfg.worker.scratch_dir,
            );
            match worker.run(&unit).await? {
                VolumeOutcome::AlreadyPresent => info!(unit = %unit, "nothing to do"),
                VolumeOutcome::Published { granules, bytes } => {
                    info!(unit = %unit, granules, bytes, "volume stage complete")
                }
            }
            Ok(())
        }
    }
}

/// Dry-run output: resolved configuration and the enumerated units.
fn print_dry_run(cfg: &BatchConfig, units: &[SimulationUnit]) {
    let chain = StateChain::new(cfg.chain_origin());

    println!("rapid-batch dry-run");
    println!("  batch.bucket = {}", cfg.batch.bucket);
    println!("  batch.arch = {}", cfg.batch.arch);
    match cfg.endpoint() {
        Some(endpoint) => println!("  endpoint = {:?} {}", endpoint.kind, endpoint.target),
        None => println!("  endpoint = (none)"),
    }
    println!(
        "  retry = {} x {}s, rescan every {}s, max_passes = {:?}, unit_attempts = {}",
        cfg.retry.max_attempts,
        cfg.retry.interval_secs,
        cfg.retry.rescan_interval_secs,
        cfg.retry.max_passes,
        cfg.retry.unit_attempts
    );
    match cfg.chain_origin() {
        Some(origin) => println!("  chain.origin = {origin}"),
        None => println!("  chain.origin = (none)"),
    }
    println!("  worker.scratch_dir = {}", cfg.worker.scratch_dir.display());
    println!();

    println!("units ({}):", units.len());
    for unit in units {
        if chain.is_origin(unit) {
            println!("  - {unit} (chain origin)");
        } else {
            println!("  - {unit}");
        }
    }

    debug!("dry-run complete (no remote calls)");
}

fn print_work_dry_run(cfg: &BatchConfig, request: &ComputeRequest, stage: WorkerStage) {
    println!("rapid-batch dry-run");
    println!("  stage = {stage:?}");
    println!("  unit = {}", request.unit());
    println!("  bucket = {}", request.bucket);
    println!("  dedup_key = {}", request.dedup_key());
    println!("  worker.scratch_dir = {}", cfg.worker.scratch_dir.display());
}
