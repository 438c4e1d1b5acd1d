//! The consumer-resolution funnel: narrows a repository-wide project set down
//! to precise call-site matches in four ordered stages.
//!
//! Each stage operates only on the previous stage's survivors and, from the
//! namespace stage onward, only on the files already attributed to each
//! survivor — a survivor's file set can shrink across stages, never grow.

use crate::config::Config;
use crate::debug_log;
use crate::manifest::{self, BuildUnit};
use crate::scanner::{self, DirectoryScanCache};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Funnel precision levels, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    ProjectReference,
    NamespaceImport,
    TypeUsage,
    CallSiteUsage,
}

impl Stage {
    pub fn describe(self) -> &'static str {
        match self {
            Stage::ProjectReference => "project reference",
            Stage::NamespaceImport => "namespace import",
            Stage::TypeUsage => "type usage",
            Stage::CallSiteUsage => "call-site usage",
        }
    }
}

/// One consuming build unit, the deepest stage it survived, and the files
/// that satisfied that stage (empty at the Project-Reference stage).
#[derive(Debug, Clone)]
pub struct ConsumerMatch {
    pub unit: BuildUnit,
    pub stage: Stage,
    pub files: Vec<PathBuf>,
}

/// What to resolve consumers for.
pub struct ConsumerQuery<'a> {
    pub target_manifest: &'a Path,
    pub search_scope: &'a Path,
    /// `None` means the namespace is unknown or unreliable: the namespace
    /// stage is skipped and every Project-Reference survivor passes through
    /// with no asserted files.
    pub namespace: Option<&'a str>,
    pub type_name: Option<&'a str>,
    pub method_name: Option<&'a str>,
}

/// Identity used to compare manifests: canonicalized when possible so two
/// relative spellings of one path compare equal.
fn path_identity(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

fn read_lossy(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            eprintln!("warning: could not read {}: {e}", path.display());
            None
        }
    }
}

/// Stage 1: every build unit in scope whose manifest declares a direct
/// reference to the target. The target itself is excluded by resolved
/// identity, never by spelling.
pub fn find_reference_consumers(
    target_manifest: &Path,
    search_scope: &Path,
    cfg: &Config,
) -> Vec<ConsumerMatch> {
    let target_id = path_identity(target_manifest);
    let mut consumers = Vec::new();

    for candidate in scanner::find_manifests(search_scope, cfg) {
        if path_identity(&candidate) == target_id {
            continue;
        }

        let refs = match manifest::project_references(&candidate) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("warning: skipping reference check for {}: {e:#}", candidate.display());
                continue;
            }
        };

        let candidate_dir = candidate.parent().unwrap_or_else(|| Path::new(""));
        for include in refs {
            let include = include.replace('\\', "/");

            // References carrying unevaluated build variables cannot be
            // resolved without a build context.
            if include.contains("$(") && include.contains(')') {
                debug_log!(
                    "skipping reference with build variable '{include}' in {}",
                    candidate.display()
                );
                continue;
            }

            let resolved = candidate_dir.join(&include);
            match resolved.canonicalize() {
                Ok(id) if id == target_id => {
                    debug_log!("direct reference: {} -> target", candidate.display());
                    consumers.push(ConsumerMatch {
                        unit: BuildUnit::new(candidate.clone()),
                        stage: Stage::ProjectReference,
                        files: vec![],
                    });
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug_log!(
                        "could not resolve reference '{include}' in {}: {e}",
                        candidate.display()
                    );
                }
            }
        }
    }

    consumers
}

fn namespace_import_re(namespace: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"(?m)(?:^|;|\{{)\s*(?:global\s+)?using\s+{}(?:\.[A-Za-z0-9_.]+)?\s*;",
        regex::escape(namespace)
    ))
    .context("building namespace import pattern")
}

fn whole_word_re(name: &str) -> Result<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(name))).context("building type usage pattern")
}

fn call_site_re(name: &str) -> Result<Regex> {
    Regex::new(&format!(r"\.\s*{}\s*\(", regex::escape(name)))
        .context("building call-site pattern")
}

/// Keep each survivor whose attributed file set still matches `pattern`,
/// narrowing the file set to the matching subset.
fn narrow_by_pattern(survivors: Vec<ConsumerMatch>, pattern: &Regex, stage: Stage) -> Vec<ConsumerMatch> {
    let mut out = Vec::new();
    for survivor in survivors {
        let matching: Vec<PathBuf> = survivor
            .files
            .iter()
            .filter(|f| read_lossy(f).map(|text| pattern.is_match(&text)).unwrap_or(false))
            .cloned()
            .collect();
        if matching.is_empty() {
            debug_log!("{}: dropped at {}", survivor.unit.name(), stage.describe());
            continue;
        }
        out.push(ConsumerMatch {
            unit: survivor.unit,
            stage,
            files: matching,
        });
    }
    out
}

/// Resolve the consumers of a target build unit through the full funnel.
///
/// Stage order: project reference, namespace import, type usage, call-site
/// usage. An empty namespace-stage result is final when a type filter was
/// requested; without one it falls back to the wider Project-Reference set —
/// a caller filtering by type wants precision, a broad sweep wants the safer
/// answer.
pub fn find_consumers(query: &ConsumerQuery, cfg: &Config) -> Result<Vec<ConsumerMatch>> {
    // ── Stage 1: project references ──────────────────────────────────────
    let direct = find_reference_consumers(query.target_manifest, query.search_scope, cfg);
    debug_log!("{} direct consumer(s) via project reference", direct.len());
    if direct.is_empty() {
        return Ok(vec![]);
    }

    let mut cache = DirectoryScanCache::new(cfg);

    // ── Stage 2: namespace imports ───────────────────────────────────────
    let namespace_stage = match query.namespace {
        None => {
            eprintln!(
                "warning: target namespace unknown or unreliable; skipping namespace check, keeping all direct consumers"
            );
            direct.clone()
        }
        Some(ns) => {
            let pattern = namespace_import_re(ns)?;
            let mut survivors = Vec::new();
            for consumer in &direct {
                let files: Vec<PathBuf> = cache.source_files(consumer.unit.dir()).to_vec();
                let matching: Vec<PathBuf> = files
                    .into_iter()
                    .filter(|f| {
                        read_lossy(f)
                            .map(|text| pattern.is_match(&text))
                            .unwrap_or(false)
                    })
                    .collect();
                if matching.is_empty() {
                    continue;
                }
                survivors.push(ConsumerMatch {
                    unit: consumer.unit.clone(),
                    stage: Stage::NamespaceImport,
                    files: matching,
                });
            }
            survivors
        }
    };

    if namespace_stage.is_empty() {
        return Ok(if query.type_name.is_some() { vec![] } else { direct });
    }
    let Some(type_name) = query.type_name else {
        return Ok(namespace_stage);
    };

    // ── Stage 3: type usage ──────────────────────────────────────────────
    let type_stage = narrow_by_pattern(namespace_stage, &whole_word_re(type_name)?, Stage::TypeUsage);
    if type_stage.is_empty() {
        return Ok(vec![]);
    }
    let Some(method_name) = query.method_name else {
        return Ok(type_stage);
    };

    // ── Stage 4: call-site usage ─────────────────────────────────────────
    let call_stage = narrow_by_pattern(type_stage, &call_site_re(method_name)?, Stage::CallSiteUsage);
    Ok(call_stage)
}
