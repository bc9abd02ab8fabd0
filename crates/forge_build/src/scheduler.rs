//! The execution scheduler.
//!
//! A run goes through three barriers before anything executes: every
//! target's tools are validated, every target's graph is built and checked
//! for cycles, and every target is fingerprinted. Only then are the
//! per-target pipelines dispatched onto a bounded task set.

use std::path::PathBuf;
use std::sync::Arc;

use forge_cache::{fingerprint, BuildCache, CacheError, CacheStats, EvictionPolicy, EvictionSummary};
use forge_common::Platform;
use forge_graph::{affected_set, build_graph, GraphError};
use forge_report::{BuildReport, RunId, StepPhase, StepReport};
use forge_toolchain::{
    AdapterRegistry, BuildRequest, DependencyValidator, ToolchainAdapter, ValidationReport,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BuildError, SourceFailure};
use crate::options::BuildOptions;
use crate::pipeline::{self, Analysis, Context, Job};

/// Drives build runs against one cache.
#[derive(Clone)]
pub struct Scheduler {
    cache: Arc<BuildCache>,
    registry: AdapterRegistry,
    validator: DependencyValidator,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cache", &self.cache.root())
            .field("registry", &self.registry)
            .field("validator", &self.validator)
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler with the built-in adapters.
    pub fn new(cache: Arc<BuildCache>) -> Self {
        Self {
            cache,
            registry: AdapterRegistry::new(),
            validator: DependencyValidator::new(),
        }
    }

    /// Replaces the adapter registry.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the tool validator.
    pub fn with_validator(mut self, validator: DependencyValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Returns the shared cache.
    pub fn cache(&self) -> &Arc<BuildCache> {
        &self.cache
    }

    /// Runs one build over `requests`.
    ///
    /// Returns `Err` only for conditions that stop the run before any
    /// toolchain starts: missing tools, an import cycle, unreadable sources
    /// or a duplicated target. Everything else is recorded per step in the report, which
    /// lists steps in request order.
    pub async fn build(
        &self,
        requests: Vec<BuildRequest>,
        options: &BuildOptions,
        cancel: CancellationToken,
    ) -> Result<BuildReport, BuildError> {
        let report = BuildReport::start();
        let run_id = report.run_id;
        info!(run = %run_id, targets = requests.len(), "starting build");

        let mut seen = std::collections::HashSet::new();
        for request in &requests {
            if !seen.insert(request.target.as_str()) {
                return Err(BuildError::DuplicateTarget(request.target.clone()));
            }
        }

        let prepared = self.validate(requests).await?;
        let jobs = self.analyze(prepared, options).await?;

        let steps = self.dispatch(jobs, options, cancel, run_id).await;
        let report = report.finish(steps);
        info!(
            run = %run_id,
            success = report.success(),
            cache_hits = report.cache_hits(),
            elapsed_ms = report.duration_ms,
            "build finished"
        );
        Ok(report)
    }

    /// Resolves adapters and checks every target's tools. Returns each
    /// request with its adapter and toolchain version.
    async fn validate(
        &self,
        requests: Vec<BuildRequest>,
    ) -> Result<Vec<(BuildRequest, Arc<dyn ToolchainAdapter>, String)>, BuildError> {
        let mut prepared = Vec::with_capacity(requests.len());
        let mut unmet: Vec<ValidationReport> = Vec::new();

        for request in requests {
            let adapter = self.registry.resolve(&request);
            let tools = adapter.tools(&request);
            let report = self
                .validator
                .check(&request.target, request.config.platform, &tools)
                .await;
            if !report.is_satisfied() {
                unmet.push(report);
                continue;
            }
            let version = request
                .toolchain_version
                .clone()
                .unwrap_or_else(|| report.toolchain_version());
            debug!(
                target_name = %request.target,
                adapter = adapter.name(),
                toolchain = %version,
                "tools satisfied"
            );
            prepared.push((request, adapter, version));
        }

        if unmet.is_empty() {
            Ok(prepared)
        } else {
            Err(BuildError::Validation { reports: unmet })
        }
    }

    /// Graphs and fingerprints every target on the blocking pool. A cycle
    /// aborts the run at once; unreadable sources are collected across all
    /// targets and abort the run together.
    async fn analyze(
        &self,
        prepared: Vec<(BuildRequest, Arc<dyn ToolchainAdapter>, String)>,
        options: &BuildOptions,
    ) -> Result<Vec<Job>, BuildError> {
        let mut jobs = Vec::with_capacity(prepared.len());
        let mut unreadable = Vec::new();
        for (mut request, adapter, version) in prepared {
            let cache = self.cache.clone();
            let incremental = options.incremental;
            let task_request = request.clone();
            let analysis = tokio::task::spawn_blocking(move || {
                analyze_target(&cache, &task_request, &version, incremental)
            })
            .await;

            let analysis = match analysis {
                Ok(Ok(analysis)) => analysis,
                Ok(Err(GraphError::CyclicDependency { members })) => {
                    return Err(BuildError::CyclicDependency {
                        target: request.target,
                        members,
                    });
                }
                Ok(Err(GraphError::Io { path, source })) => {
                    warn!(target_name = %request.target, path = %path.display(), error = %source, "cannot read sources");
                    unreadable.push(SourceFailure {
                        target: request.target,
                        path,
                        reason: source.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    unreadable.push(SourceFailure {
                        target: request.target,
                        path: PathBuf::new(),
                        reason: format!("graph task failed: {e}"),
                    });
                    continue;
                }
            };

            request.changed_files = analysis.affected.affected.iter().cloned().collect();
            debug!(
                target_name = %request.target,
                fingerprint = %analysis.fingerprint,
                files = analysis.files.len(),
                affected = analysis.affected.len(),
                full = analysis.affected.full,
                "analyzed target"
            );
            jobs.push(Job {
                request,
                adapter,
                analysis,
            });
        }

        if unreadable.is_empty() {
            Ok(jobs)
        } else {
            Err(BuildError::UnreadableSources { failures: unreadable })
        }
    }

    async fn dispatch(
        &self,
        jobs: Vec<Job>,
        options: &BuildOptions,
        cancel: CancellationToken,
        run_id: RunId,
    ) -> Vec<StepReport> {
        let ctx = Context {
            cache: self.cache.clone(),
            options: options.clone(),
            cancel,
            semaphore: Arc::new(Semaphore::new(options.parallel_jobs.max(1))),
            run_id,
        };

        let placeholders: Vec<StepReport> = jobs
            .iter()
            .map(|job| StepReport::new(&job.request.target, job.request.config.platform))
            .collect();

        // Each pipeline runs in its own task so a panic is reported against
        // the step that caused it.
        let mut set = JoinSet::new();
        for (i, job) in jobs.into_iter().enumerate() {
            let ctx = ctx.clone();
            set.spawn(async move { (i, tokio::spawn(pipeline::run(job, ctx)).await) });
        }

        let mut steps: Vec<Option<StepReport>> = vec![None; placeholders.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, Ok(step))) => steps[i] = Some(step),
                Ok((i, Err(e))) => {
                    warn!(target_name = %placeholders[i].target, error = %e, "build task panicked");
                    let mut step = placeholders[i].clone();
                    step.fail(StepPhase::Execute, format!("build task failed: {e}"));
                    steps[i] = Some(step);
                }
                Err(e) => warn!(error = %e, "build task failed"),
            }
        }

        steps
            .into_iter()
            .zip(placeholders)
            .map(|(step, mut placeholder)| {
                step.unwrap_or_else(|| {
                    placeholder.fail(StepPhase::Execute, "build task lost");
                    placeholder
                })
            })
            .collect()
    }

    /// Probes the built-in tool table of `platform`.
    pub async fn check_dependencies(&self, platform: Platform) -> ValidationReport {
        self.validator.check_platform(platform).await
    }

    /// Returns cache usage.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Removes every entry, or only those of `platform`.
    pub fn clear_cache(&self, platform: Option<Platform>) -> Result<EvictionSummary, CacheError> {
        self.cache.clear(platform)
    }

    /// Applies an eviction policy.
    pub fn evict_cache(&self, policy: &EvictionPolicy) -> Result<EvictionSummary, CacheError> {
        self.cache.evict(policy)
    }
}

fn analyze_target(
    cache: &BuildCache,
    request: &BuildRequest,
    toolchain_version: &str,
    incremental: bool,
) -> Result<Analysis, GraphError> {
    let graph = build_graph(&request.sources)?;
    let base = request.project_dir.as_path();
    let files = graph.file_hashes(base);

    let record = if incremental {
        cache.load_record(&request.target, &request.config)
    } else {
        None
    };
    let affected = affected_set(&graph, base, record.as_ref().map(|r| &r.files));

    let inputs = graph.fingerprint_inputs(base);
    let fingerprint = fingerprint(
        inputs.iter().map(|(path, hash)| (path.as_path(), *hash)),
        &request.config,
        toolchain_version,
    );

    Ok(Analysis {
        fingerprint,
        files,
        affected,
    })
}
