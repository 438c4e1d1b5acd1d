//! Source-file and manifest discovery on the live filesystem.
//!
//! `.gitignore` and hidden-file filters are always respected; on top of that a
//! hard skip list removes build-output directories that commonly hold copied
//! or generated source.

use crate::config::Config;
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn should_skip_dir_name(name: &str) -> bool {
    matches!(
        name,
        // VCS / editor
        ".git" | ".vs" | ".vscode" | ".idea"
        // .NET build outputs
        | "bin" | "obj" | "packages" | "TestResults" | "artifacts"
        // Other ecosystems' junk that shows up in mixed repos
        | "node_modules" | "dist" | "build" | "target"
        // Generic junk
        | "tmp" | "temp" | "logs" | ".cache"
    )
}

fn build_walker(root: &Path, cfg: &Config) -> ignore::Walk {
    let extra: Vec<String> = cfg.scan.exclude_dir_names.clone();
    WalkBuilder::new(root)
        .standard_filters(true) // .gitignore, .ignore, hidden, etc.
        .filter_entry(move |entry| {
            let name = entry.file_name().to_str().unwrap_or("");
            if entry.depth() == 0 {
                return true;
            }
            if should_skip_dir_name(name) {
                return false;
            }
            !extra.iter().any(|d| d == name)
        })
        .build()
}

/// List every file under `root` whose name ends with `extension`
/// (case-insensitive), sorted for deterministic discovery order.
pub fn list_files_with_extension(root: &Path, extension: &str, cfg: &Config) -> Vec<PathBuf> {
    let ext = extension.to_ascii_lowercase();
    let mut out = Vec::new();

    for item in build_walker(root, cfg) {
        let Ok(dent) = item else { continue };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let name = dent.file_name().to_str().unwrap_or("");
        if !name.to_ascii_lowercase().ends_with(&ext) {
            continue;
        }
        let bytes = dent.metadata().map(|m| m.len()).unwrap_or(0);
        if bytes > cfg.analysis.max_file_bytes {
            continue;
        }
        out.push(dent.into_path());
    }

    out.sort();
    out
}

/// All manifests in a search scope.
pub fn find_manifests(scope: &Path, cfg: &Config) -> Vec<PathBuf> {
    list_files_with_extension(scope, &cfg.analysis.manifest_extension, cfg)
}

/// Read-through cache of per-directory source-file listings.
///
/// Populated at most once per directory per funnel invocation and never
/// invalidated mid-run (the filesystem is assumed stable for the run's
/// duration). One cache instance belongs to one invocation; concurrent
/// invocations take independent caches.
pub struct DirectoryScanCache<'c> {
    cfg: &'c Config,
    listings: HashMap<PathBuf, Vec<PathBuf>>,
}

impl<'c> DirectoryScanCache<'c> {
    pub fn new(cfg: &'c Config) -> Self {
        Self {
            cfg,
            listings: HashMap::new(),
        }
    }

    /// Source files under `dir`, listing the directory on first access only.
    pub fn source_files(&mut self, dir: &Path) -> &[PathBuf] {
        if !self.listings.contains_key(dir) {
            let files =
                list_files_with_extension(dir, &self.cfg.analysis.source_extension, self.cfg);
            self.listings.insert(dir.to_path_buf(), files);
        }
        self.listings.get(dir).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
