//! `forge doctor`: report which platform toolchains are usable.

use forge_common::Platform;
use forge_toolchain::{DependencyValidator, ValidationReport};

use crate::GlobalArgs;

/// Runs the `forge doctor` command. Returns 1 if any required tool of a
/// checked platform is missing.
pub fn run(platform: Option<Platform>, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let platforms: Vec<Platform> = match platform {
        Some(p) => vec![p],
        None => Platform::ALL.to_vec(),
    };

    let validator = DependencyValidator::new();
    let reports = crate::runtime()?.block_on(async {
        let mut reports = Vec::with_capacity(platforms.len());
        for platform in platforms {
            reports.push(validator.check_platform(platform).await);
        }
        reports
    });

    for report in &reports {
        if !global.quiet || !report.is_satisfied() {
            print!("{}", render(report));
        }
    }
    Ok(exit_code(&reports))
}

fn render(report: &ValidationReport) -> String {
    if report.statuses.is_empty() {
        return format!("{}: no built-in tools (uses the target's command)\n", report.platform);
    }
    report.to_string()
}

fn exit_code(reports: &[ValidationReport]) -> i32 {
    if reports.iter().all(ValidationReport::is_satisfied) {
        0
    } else {
        1
    }
}
