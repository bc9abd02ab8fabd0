//! The per-target pipeline: cache lookup, toolchain dispatch, artifact
//! capture and cache population.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forge_cache::{BuildCache, BuildRecord, EntryMetadata, Fingerprint};
use forge_common::ContentHash;
use forge_graph::AffectedSet;
use forge_report::{CacheOutcome, RunId, StepPhase, StepReport, StepStatus};
use forge_toolchain::{
    BuildRequest, CommandSpec, ProcessOutput, ProcessRunner, RunOptions, ToolchainAdapter,
    ToolchainError,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::options::BuildOptions;

/// Result of graphing and fingerprinting one target.
#[derive(Debug, Clone)]
pub(crate) struct Analysis {
    pub fingerprint: Fingerprint,
    pub files: BTreeMap<PathBuf, ContentHash>,
    pub affected: AffectedSet,
}

/// One target ready for dispatch.
pub(crate) struct Job {
    pub request: BuildRequest,
    pub adapter: Arc<dyn ToolchainAdapter>,
    pub analysis: Analysis,
}

/// State shared by every pipeline of a run.
#[derive(Clone)]
pub(crate) struct Context {
    pub cache: Arc<BuildCache>,
    pub options: BuildOptions,
    pub cancel: CancellationToken,
    pub semaphore: Arc<Semaphore>,
    pub run_id: RunId,
}

/// Runs one target to a terminal step status.
pub(crate) async fn run(job: Job, ctx: Context) -> StepReport {
    let started = Instant::now();
    let mut step = StepReport::new(&job.request.target, job.request.config.platform);
    execute(&job, &ctx, &mut step).await;
    step.set_duration(started.elapsed());
    info!(
        target_name = %step.target,
        status = %step.status,
        elapsed_ms = step.duration_ms,
        "step finished"
    );
    step
}

fn advance(step: &mut StepReport, next: StepStatus) {
    if let Err(e) = step.transition(next) {
        warn!(error = %e, "ignoring step transition");
    }
}

async fn execute(job: &Job, ctx: &Context, step: &mut StepReport) {
    let request = &job.request;
    let analysis = &job.analysis;
    step.fingerprint = Some(analysis.fingerprint);
    step.affected_files = analysis.affected.len();
    step.cache = if ctx.options.cache {
        CacheOutcome::Miss
    } else {
        CacheOutcome::Disabled
    };

    let _permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return step.fail(StepPhase::Execute, "cancelled"),
        permit = ctx.semaphore.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return step.fail(StepPhase::Execute, "scheduler closed"),
        },
    };
    if ctx.cancel.is_cancelled() {
        return step.fail(StepPhase::Execute, "cancelled");
    }

    if ctx.options.cache {
        if let Some(paths) = restore(ctx, request, analysis.fingerprint).await {
            advance(step, StepStatus::Cached);
            step.cache = CacheOutcome::Hit;
            step.artifacts = paths.iter().map(|p| request.output_dir.join(p)).collect();
            store_record(ctx, request, analysis).await;
            return;
        }
    }

    let spec = match job.adapter.command(request) {
        Ok(spec) => spec,
        Err(e) => return step.fail(StepPhase::Execute, e.to_string()),
    };
    advance(step, StepStatus::Running);
    debug!(
        target_name = %request.target,
        adapter = job.adapter.name(),
        affected = analysis.affected.len(),
        changed = ?analysis.affected.changed,
        "cache miss, running toolchain"
    );

    if let Err(message) = reset_output_dir(request).await {
        return step.fail(StepPhase::Execute, message);
    }

    let Some(output) = run_with_retries(ctx, request, &spec, step).await else {
        return;
    };

    let artifacts = match job.adapter.collect_artifacts(request, &output) {
        Ok(artifacts) => artifacts,
        Err(e) => return step.fail(StepPhase::Collect, e.to_string()),
    };
    let output_dir = request.output_dir.clone();
    let staged = tokio::task::spawn_blocking(move || artifacts.stage_into(&output_dir)).await;
    let staged = match staged {
        Ok(Ok(staged)) => staged,
        Ok(Err(e)) => return step.fail(StepPhase::Collect, e.to_string()),
        Err(e) => return step.fail(StepPhase::Collect, e.to_string()),
    };

    advance(step, StepStatus::Succeeded);
    step.artifacts = staged.iter().map(|p| request.output_dir.join(p)).collect();

    if ctx.options.cache {
        store_artifacts(ctx, request, analysis.fingerprint, spec.argv(), staged).await;
    }
    store_record(ctx, request, analysis).await;
}

/// Clears the output directory so only this configuration's files are
/// collected or restored into it.
async fn reset_output_dir(request: &BuildRequest) -> Result<(), String> {
    let owned = request.clone();
    match tokio::task::spawn_blocking(move || owned.reset_output_dir()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Runs the toolchain, retrying non-zero exits up to `options.retries`
/// times. Timeouts and cancellation are never retried. Marks the step
/// failed and returns `None` when no attempt succeeds.
async fn run_with_retries(
    ctx: &Context,
    request: &BuildRequest,
    spec: &CommandSpec,
    step: &mut StepReport,
) -> Option<ProcessOutput> {
    let mut run_options = RunOptions::new(ctx.options.timeout);
    run_options.cancel = ctx.cancel.clone();
    run_options.label = request.target.clone();
    if let Some(dir) = &ctx.options.log_dir {
        let dir = dir.join(ctx.run_id.to_string());
        run_options.stdout_log = Some(dir.join(format!("{}.stdout.log", request.target)));
        run_options.stderr_log = Some(dir.join(format!("{}.stderr.log", request.target)));
    }
    step.stdout_log = run_options.stdout_log.clone();
    step.stderr_log = run_options.stderr_log.clone();

    loop {
        step.attempts += 1;
        let retry_allowed = step.attempts <= ctx.options.retries && !ctx.cancel.is_cancelled();

        let failure = match ProcessRunner::run(spec, &run_options).await {
            Ok(output) if output.success => {
                step.exit_code = output.exit_code;
                return Some(output);
            }
            Ok(output) => {
                step.exit_code = output.exit_code;
                step.stderr_tail = output.stderr_tail();
                match output.exit_code {
                    Some(code) => format!("{} exited with code {code}", spec.program),
                    None => format!("{} was terminated by a signal", spec.program),
                }
            }
            Err(ToolchainError::Timeout {
                after,
                stderr_tail,
            }) => {
                step.stderr_tail = stderr_tail;
                let message = format!("timed out after {}s", after.as_secs());
                step.fail(StepPhase::Execute, message);
                return None;
            }
            Err(ToolchainError::Cancelled) => {
                step.fail(StepPhase::Execute, "cancelled");
                return None;
            }
            Err(e) => e.to_string(),
        };

        if retry_allowed {
            warn!(
                target_name = %request.target,
                attempt = step.attempts,
                error = %failure,
                "toolchain failed, retrying"
            );
            continue;
        }
        step.fail(StepPhase::Execute, failure);
        return None;
    }
}

/// Looks up a cache entry and restores it into a cleared output directory.
/// Any failure is a miss.
async fn restore(
    ctx: &Context,
    request: &BuildRequest,
    fingerprint: Fingerprint,
) -> Option<Vec<PathBuf>> {
    let cache = ctx.cache.clone();
    let owned = request.clone();
    let restored = tokio::task::spawn_blocking(move || {
        let entry = cache.get(&fingerprint)?;
        let target = &owned.target;
        if let Err(e) = owned.reset_output_dir() {
            warn!(target_name = %target, error = %e, "cannot clear output directory for restore");
            return None;
        }
        match cache.restore(&entry, &owned.output_dir) {
            Ok(paths) => Some(paths),
            Err(e) => {
                warn!(target_name = %target, error = %e, "cache restore failed, rebuilding");
                None
            }
        }
    })
    .await;
    restored.ok().flatten()
}

async fn store_artifacts(
    ctx: &Context,
    request: &BuildRequest,
    fingerprint: Fingerprint,
    command: Vec<String>,
    artifacts: Vec<PathBuf>,
) {
    let cache = ctx.cache.clone();
    let metadata = EntryMetadata {
        target: request.target.clone(),
        config: request.config.clone(),
        command,
    };
    let output_dir = request.output_dir.clone();
    let stored = tokio::task::spawn_blocking(move || {
        cache.put(&fingerprint, metadata, &output_dir, &artifacts)
    })
    .await;
    match stored {
        Ok(Ok(entry)) => debug!(
            target_name = %request.target,
            fingerprint = %fingerprint,
            bytes = entry.total_size,
            "stored artifacts"
        ),
        Ok(Err(e)) => warn!(target_name = %request.target, error = %e, "failed to cache artifacts"),
        Err(e) => warn!(target_name = %request.target, error = %e, "cache task failed"),
    }
}

async fn store_record(ctx: &Context, request: &BuildRequest, analysis: &Analysis) {
    let cache = ctx.cache.clone();
    let config = request.config.clone();
    let record = BuildRecord {
        target: request.target.clone(),
        fingerprint: analysis.fingerprint,
        files: analysis.files.clone(),
        finished_at: Utc::now(),
    };
    let stored = tokio::task::spawn_blocking(move || cache.store_record(&config, &record)).await;
    match stored {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(target_name = %request.target, error = %e, "failed to store build record"),
        Err(e) => warn!(target_name = %request.target, error = %e, "record task failed"),
    }
}
