//! `dxsync status`: local changes relative to the hash cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tracing::{debug, info};

use dxsync_core::{SyncFlags, TenantId};
use dxsync_sync::{hash_cache, HashCache, TenantCache};

/// Arguments for `dxsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Working directory to inspect.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Tenant whose cache scope is used.
    #[arg(long, default_value = "default")]
    pub tenant: String,

    /// Only report files never pushed or pulled.
    #[arg(long, conflicts_with = "modified")]
    pub new: bool,

    /// Only report files changed since they were last synced.
    #[arg(long)]
    pub modified: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let working_dir = fs::canonicalize(&self.dir)
            .with_context(|| format!("cannot open working directory {}", self.dir.display()))?;
        let flags = match (self.new, self.modified) {
            (true, false) => SyncFlags::NEW,
            (false, true) => SyncFlags::MODIFIED,
            _ => SyncFlags::EITHER,
        };

        info!(dir = %working_dir.display(), tenant = %self.tenant, "checking status");
        let cache = HashCache::open(working_dir.clone());
        let tenant = cache.tenant(&TenantId::from(self.tenant.as_str()));
        let report = build_report(&cache, &tenant, flags)?;
        info!(
            tracked = report.tracked,
            changed = report.changes.len(),
            "status complete"
        );

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report, &working_dir);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    tenant: String,
    tracked: usize,
    last_pull: Option<String>,
    last_push: Option<String>,
    changes: Vec<FileChange>,
}

#[derive(Debug, Serialize, Tabled)]
struct FileChange {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "status")]
    status: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ChangeKind {
    New,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::New => "NEW".fmt(f),
            ChangeKind::Modified => "MODIFIED".fmt(f),
        }
    }
}

fn build_report(
    cache: &HashCache,
    tenant: &TenantCache<'_>,
    flags: SyncFlags,
) -> Result<StatusReport> {
    let state_dir = hash_cache::cache_path_at(cache.working_dir())
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut files = Vec::new();
    collect_files(cache.working_dir(), &state_dir, &mut files)?;
    files.sort();

    let mut changes = Vec::new();
    for file in files {
        if !tenant.is_locally_modified(flags, &file) {
            continue;
        }
        let status = if tenant.lookup_by_path(&file).is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::New
        };
        changes.push(FileChange {
            path: cache.relative_key(&file),
            status,
        });
    }

    Ok(StatusReport {
        tenant: tenant.tenant_id().to_string(),
        tracked: tenant.list_tracked_paths().len(),
        last_pull: tenant.last_pull_timestamp().map(|t| t.to_rfc3339()),
        last_push: tenant.last_push_timestamp().map(|t| t.to_rfc3339()),
        changes,
    })
}

/// Every regular file under `dir`, skipping `skip` and everything below it.
///
/// Symlinked directories are not followed; symlinks to files are listed.
fn collect_files(dir: &Path, skip: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("cannot read {}", dir.display()))?;
        let path = entry.path();
        if path == skip {
            continue;
        }
        let file_type = entry
            .file_type()
            .with_context(|| format!("cannot stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(&path, skip, out)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            out.push(path);
        } else {
            debug!(path = %path.display(), "skipping non-file entry");
        }
    }
    Ok(())
}

fn print_table(report: &StatusReport, working_dir: &Path) {
    println!(
        "dxsync v{} | {} | tenant {} | {} tracked | {} changed",
        env!("CARGO_PKG_VERSION"),
        working_dir.display(),
        report.tenant.bold(),
        report.tracked,
        report.changes.len(),
    );
    println!(
        "last pull: {}  last push: {}",
        report.last_pull.as_deref().unwrap_or("never"),
        report.last_push.as_deref().unwrap_or("never"),
    );

    if report.changes.is_empty() {
        println!("{}", "Nothing to push.".green());
        return;
    }

    let rows: Vec<FileChange> = report
        .changes
        .iter()
        .map(|c| FileChange {
            path: c.path.clone(),
            status: c.status,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
