//! `forge cache`: inspect and trim the artifact cache.

use forge_build::Scheduler;
use forge_cache::CacheStats;

use crate::project::{eviction_policy, format_bytes, Project};
use crate::{CacheAction, GlobalArgs};

/// Runs a `forge cache` subcommand.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let scheduler = Scheduler::new(project.open_cache());

    match action {
        CacheAction::Stats => println!("{}", render_stats(&scheduler.cache_stats())),
        CacheAction::Clear { platform } => {
            let summary = scheduler.clear_cache(*platform)?;
            if !global.quiet {
                let scope = platform.map_or("all platforms".to_string(), |p| p.to_string());
                eprintln!(
                    "   Cleared {} entries ({}) for {scope}",
                    summary.removed.len(),
                    format_bytes(summary.freed_bytes)
                );
                if summary.skipped_locked > 0 {
                    eprintln!("   Skipped {} entries in use", summary.skipped_locked);
                }
            }
        }
        CacheAction::Gc => {
            let mut removed = 0;
            let mut freed = 0;
            if let Some(policy) = eviction_policy(&project.config.cache) {
                let summary = scheduler.evict_cache(&policy)?;
                removed = summary.removed.len();
                freed = summary.freed_bytes;
            }
            let orphans = scheduler.cache().gc()?;
            if !global.quiet {
                eprintln!(
                    "   Evicted {removed} entries ({}), removed {orphans} orphaned objects",
                    format_bytes(freed)
                );
            }
        }
    }
    Ok(0)
}

fn render_stats(stats: &CacheStats) -> String {
    let mut out = format!(
        "cache: {}\nentries: {}\nsize: {}",
        stats.root.display(),
        stats.entry_count,
        format_bytes(stats.total_size_bytes)
    );
    for (platform, share) in &stats.per_platform {
        out.push_str(&format!(
            "\n  {:<8} {:>5} entries  {}",
            platform.as_str(),
            share.entries,
            format_bytes(share.size_bytes)
        ));
    }
    if stats.unindexed_bytes > 0 {
        out.push_str(&format!(
            "\nunindexed: {} (run `forge cache gc`)",
            format_bytes(stats.unindexed_bytes)
        ));
    }
    if let Some(reason) = &stats.degraded {
        out.push_str(&format!("\ndegraded: {reason}"));
    }
    out
}
