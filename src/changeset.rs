//! Branch-range change analysis: turns a base..feature diff into a mapping of
//! {owning manifest → changed source files}, resolving owners against the
//! feature commit's snapshot rather than the working tree.

use crate::config::Config;
use crate::debug_log;
use crate::locator::find_build_unit;
use crate::navigator::GitTreeNavigator;
use anyhow::{bail, Context, Result};
use git2::{BranchType, Delta, Repository};
use std::collections::BTreeMap;
use std::path::Path;

/// Changed source files grouped by their owning manifest, both as
/// repo-relative forward-slash paths.
pub type ChangedProjects = BTreeMap<String, Vec<String>>;

fn posix(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

/// Diff `feature` against its merge base with `base` and map every changed
/// (non-deleted) source file to its owning build unit in the feature snapshot.
///
/// Missing branches are configuration errors and fail before any scan. Files
/// whose owner cannot be located are counted and skipped, never fatal.
pub fn analyze_branch_changes(
    repo_path: &Path,
    feature_branch: &str,
    base_branch: &str,
    cfg: &Config,
) -> Result<ChangedProjects> {
    let repo = Repository::discover(repo_path)
        .with_context(|| format!("not a git repository: {}", repo_path.display()))?;

    let base_commit = repo
        .find_branch(base_branch, BranchType::Local)
        .with_context(|| format!("base branch '{base_branch}' not found in repository"))?
        .get()
        .peel_to_commit()
        .context("resolving base branch commit")?;
    let feature_commit = repo
        .find_branch(feature_branch, BranchType::Local)
        .with_context(|| format!("feature branch '{feature_branch}' not found in repository"))?
        .get()
        .peel_to_commit()
        .context("resolving feature branch commit")?;

    debug_log!(
        "comparing {feature_branch} ({}) against {base_branch} ({})",
        feature_commit.id(),
        base_commit.id()
    );

    // Prefer the merge base; diffing against the feature tip's first parent is
    // a last resort and may not be the intended range.
    let comparison_base = match repo.merge_base(base_commit.id(), feature_commit.id()) {
        Ok(oid) => repo.find_commit(oid).context("resolving merge base commit")?,
        Err(_) => {
            eprintln!(
                "warning: no common merge base between '{base_branch}' and '{feature_branch}'; comparing against the feature tip's first parent"
            );
            match feature_commit.parent(0) {
                Ok(parent) => parent,
                Err(_) => bail!(
                    "feature branch '{feature_branch}' has no parents and no merge base with '{base_branch}'; cannot diff"
                ),
            }
        }
    };

    let base_tree = comparison_base.tree()?;
    let feature_tree = feature_commit.tree()?;
    let diff = repo
        .diff_tree_to_tree(Some(&base_tree), Some(&feature_tree), None)
        .context("computing branch diff")?;

    let nav = GitTreeNavigator::for_commit(&repo, &feature_commit)?;
    let source_ext = cfg.analysis.source_extension.to_ascii_lowercase();

    let mut changes: ChangedProjects = BTreeMap::new();
    let mut changed_count = 0usize;
    let mut unmapped_count = 0usize;

    for delta in diff.deltas() {
        if delta.status() == Delta::Deleted {
            continue;
        }
        let Some(path) = delta.new_file().path() else { continue };
        if !path.to_string_lossy().to_ascii_lowercase().ends_with(&source_ext) {
            continue;
        }
        changed_count += 1;

        match find_build_unit(&nav, path, &cfg.analysis.manifest_extension) {
            Some(manifest) => {
                changes.entry(posix(&manifest)).or_default().push(posix(path));
            }
            None => {
                unmapped_count += 1;
                debug_log!("no owning manifest found for changed file {}", path.display());
            }
        }
    }

    if changed_count == 0 {
        eprintln!("no changed source files found in the diff");
    } else {
        let mut msg = format!(
            "processed {changed_count} changed source file(s); {} project(s) affected",
            changes.len()
        );
        if unmapped_count > 0 {
            msg.push_str(&format!(" ({unmapped_count} file(s) could not be mapped to a manifest)"));
        }
        eprintln!("{msg}");
    }

    Ok(changes)
}
