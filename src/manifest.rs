//! Build-unit manifest reading: namespace derivation and declared project
//! references, tolerant of both tag-namespacing conventions found in the wild
//! (prefixed `msb:ProjectReference` and plain `ProjectReference`).

use crate::debug_log;
use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};

/// A project identified by its manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    pub manifest_path: PathBuf,
}

impl BuildUnit {
    pub fn new(manifest_path: PathBuf) -> Self {
        Self { manifest_path }
    }

    /// Short display name: the manifest filename stem.
    pub fn name(&self) -> String {
        self.manifest_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Derive the primary namespace of a project manifest.
///
/// Checks `<RootNamespace>`, then `<AssemblyName>` (first non-empty wins),
/// falling back to the manifest's filename stem when neither tag is present.
/// Returns `None` when the manifest is missing or unparsable.
pub fn derive_namespace(manifest_path: &Path) -> Option<String> {
    if !manifest_path.is_file() {
        eprintln!(
            "warning: project file not found for namespace derivation: {}",
            manifest_path.display()
        );
        return None;
    }
    let text = match std::fs::read(manifest_path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            eprintln!("warning: could not read {}: {e}", manifest_path.display());
            return None;
        }
    };

    let mut reader = Reader::from_str(&text);
    let mut capture: Option<&'static str> = None;
    let mut root_namespace: Option<String> = None;
    let mut assembly_name: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                capture = match e.local_name().as_ref() {
                    b"RootNamespace" => Some("RootNamespace"),
                    b"AssemblyName" => Some("AssemblyName"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let Some(tag) = capture {
                    let value = t.unescape().unwrap_or_default().trim().to_string();
                    if !value.is_empty() {
                        match tag {
                            "RootNamespace" if root_namespace.is_none() => {
                                root_namespace = Some(value)
                            }
                            "AssemblyName" if assembly_name.is_none() => {
                                assembly_name = Some(value)
                            }
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(_)) => capture = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                eprintln!(
                    "warning: failed to parse {} for namespace derivation: {e}",
                    manifest_path.display()
                );
                return None;
            }
            _ => {}
        }
    }

    if let Some(ns) = root_namespace.or(assembly_name) {
        debug_log!("derived namespace '{ns}' from {}", manifest_path.display());
        return Some(ns);
    }

    // No tag present: the filename stem is the conventional default.
    let stem = manifest_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())?;
    debug_log!(
        "no RootNamespace/AssemblyName in {}; falling back to stem '{stem}'",
        manifest_path.display()
    );
    Some(stem)
}

/// Extract the raw `Include` values of every `<ProjectReference>` in a
/// manifest. Values are returned as written (separators not yet normalized);
/// the caller resolves and filters them.
pub fn project_references(manifest_path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(manifest_path)
        .with_context(|| format!("could not read {}", manifest_path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let mut reader = Reader::from_str(&text);
    let mut refs = Vec::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed XML in {}", manifest_path.display()))?;
        match event {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() != b"ProjectReference" {
                    continue;
                }
                for attr in e.attributes().with_checks(false).flatten() {
                    if attr.key.local_name().as_ref() != b"Include" {
                        continue;
                    }
                    if let Ok(value) = attr.unescape_value() {
                        let value = value.trim().to_string();
                        if !value.is_empty() {
                            refs.push(value);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(refs)
}

/// Resolve a `--target-project` argument: either a manifest file itself or a
/// directory containing one (first glob match wins).
pub fn find_target_manifest(target: &Path, manifest_extension: &str) -> Result<PathBuf> {
    let target = target
        .canonicalize()
        .with_context(|| format!("target project path not found: {}", target.display()))?;

    if target.is_file() {
        let name = target.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if !name
            .to_ascii_lowercase()
            .ends_with(&manifest_extension.to_ascii_lowercase())
        {
            bail!(
                "invalid target project path: {} (expected a {manifest_extension} file or a directory containing one)",
                target.display()
            );
        }
        return Ok(target);
    }

    if target.is_dir() {
        let pattern = target
            .join(format!("*{manifest_extension}"))
            .to_string_lossy()
            .to_string();
        if let Ok(paths) = glob::glob(&pattern) {
            if let Some(first) = paths.flatten().next() {
                return Ok(first);
            }
        }
        bail!(
            "no {manifest_extension} file found in the target directory: {}",
            target.display()
        );
    }

    bail!("invalid target project path: {}", target.display())
}
