//! `forge build`: one orchestration run over the selected targets.
//!
//! Loads `forge.toml`, applies command-line overrides, runs the scheduler
//! with Ctrl-C wired to cancellation, then saves the report under
//! `.forge/reports` and trims the cache per `[cache]`.

use forge_build::{plan_requests, BuildOptions, ConfigOverrides, Scheduler};
use forge_common::ConfigLevel;
use forge_config::parse_duration;
use forge_report::{BuildReport, ReportStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::project::{eviction_policy, format_bytes, Project};
use crate::{BuildArgs, GlobalArgs, ReportFormat};

/// Saved reports kept under `.forge/reports`.
const REPORTS_KEPT: usize = 50;

/// Runs the `forge build` command. Returns exit code 0 when every target
/// succeeded or was cached, 1 otherwise.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;

    if !global.quiet && args.format == ReportFormat::Text {
        eprintln!(
            "   Building {} {}",
            project.config.project.name, project.config.project.version
        );
    }

    let overrides = overrides(args);
    let requests = plan_requests(&project.config, &project.root, &args.targets, &overrides)?;
    let options = build_options(args, &project)?;
    debug!(?options, targets = requests.len(), "planned build");

    let cache = project.open_cache();
    if let Some(reason) = cache.degraded_reason() {
        warn!(%reason, "artifact cache unavailable, every target will rebuild");
    }
    let scheduler = Scheduler::new(cache);

    let report = crate::runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("  Cancelling...");
                on_signal.cancel();
            }
        });
        scheduler.build(requests, &options, cancel).await
    })?;

    let store = ReportStore::new(&project.state_dir());
    match store.save(&report) {
        Ok(path) => debug!(path = %path.display(), "saved build report"),
        Err(e) => warn!(error = %e, "failed to save build report"),
    }
    if let Err(e) = store.prune(REPORTS_KEPT) {
        warn!(error = %e, "failed to prune old build reports");
    }

    if let Some(policy) = eviction_policy(&project.config.cache) {
        match scheduler.evict_cache(&policy) {
            Ok(summary) if !summary.removed.is_empty() => debug!(
                removed = summary.removed.len(),
                freed = %format_bytes(summary.freed_bytes),
                "evicted cache entries"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cache eviction failed"),
        }
    }

    print_report(&report, args.format, global)?;
    if global.verbose {
        if let Some(dir) = &options.log_dir {
            eprintln!("   Logs in {}", dir.join(report.run_id.to_string()).display());
        }
    }
    Ok(if report.success() { 0 } else { 1 })
}

fn overrides(args: &BuildArgs) -> ConfigOverrides {
    let configuration = if args.release {
        Some(ConfigLevel::Release)
    } else {
        args.configuration.map(Into::into)
    };
    ConfigOverrides {
        configuration,
        optimization: args.optimization.map(Into::into),
    }
}

/// Options from `[build]`, with command-line flags taking precedence.
fn build_options(
    args: &BuildArgs,
    project: &Project,
) -> Result<BuildOptions, Box<dyn std::error::Error>> {
    let mut options = BuildOptions::from_settings(&project.config.build);
    if let Some(jobs) = args.jobs {
        options.parallel_jobs = jobs.max(1);
    }
    if args.no_cache {
        options.cache = false;
    }
    if args.no_incremental {
        options.incremental = false;
    }
    if let Some(retries) = args.retries {
        options.retries = retries;
    }
    if let Some(timeout) = &args.timeout {
        options.timeout = parse_duration(timeout)?;
    }
    options.log_dir = Some(project.log_dir());
    Ok(options)
}

fn print_report(
    report: &BuildReport,
    format: ReportFormat,
    global: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        ReportFormat::Text if global.quiet && report.success() => {}
        ReportFormat::Text => eprintln!("{report}"),
    }
    Ok(())
}
