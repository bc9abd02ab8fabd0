//! `forge history`: list or show saved build reports.

use forge_report::{BuildReport, ReportStore, RunId, StepStatus};

use crate::project::Project;
use crate::{GlobalArgs, HistoryArgs};

/// Runs the `forge history` command.
pub fn run(args: &HistoryArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let store = ReportStore::new(&project.state_dir());

    if let Some(run) = &args.run {
        let run_id: RunId = run
            .parse()
            .map_err(|e| format!("invalid run id '{run}': {e}"))?;
        return match store.load(&run_id)? {
            Some(report) => {
                println!("{report}");
                Ok(0)
            }
            None => Err(format!("no report for run {run_id}").into()),
        };
    }

    let reports = store.recent(args.limit)?;
    if reports.is_empty() && !global.quiet {
        eprintln!("   No builds recorded yet");
    }
    for report in &reports {
        println!("{}", summary_line(report));
    }
    Ok(0)
}

fn summary_line(report: &BuildReport) -> String {
    format!(
        "{}  {}  {:<9} {:>7.2}s  {} cached, {} built, {} failed",
        report.run_id,
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        if report.success() { "succeeded" } else { "failed" },
        report.duration_ms as f64 / 1000.0,
        report.count(StepStatus::Cached),
        report.count(StepStatus::Succeeded),
        report.count(StepStatus::Failed),
    )
}
