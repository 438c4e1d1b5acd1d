//! Directory-tree abstraction over two backends: the live filesystem and an
//! immutable snapshot of a commit's tree.
//!
//! The snapshot backend matches path components **case-insensitively** (the
//! working filesystem may disagree with the historical record's stored case)
//! and refuses to descend through blobs or submodule entries. Either refusal
//! aborts the current directory lookup only; callers retry at a shallower
//! path on their own.

use anyhow::{anyhow, bail, Result};
use git2::{Commit, ObjectType, Repository, Tree};
use std::path::{Component, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    /// A directory / tree: can be descended into.
    Container,
    /// A regular file / blob.
    Leaf,
    /// A placeholder that is neither, e.g. a nested-repository (submodule) entry.
    ExternalLink,
}

pub trait TreeNavigator {
    /// List the immediate children of `dir` with their stored names and kinds.
    fn list(&self, dir: &Path) -> Result<Vec<(String, NodeKind)>>;

    /// Read a leaf's content as best-effort text (decoding errors are lossy,
    /// never fatal).
    fn read_leaf(&self, path: &Path) -> Result<String>;
}

/// Live-filesystem backend. A thin wrapper over `std::fs`.
pub struct FsNavigator;

impl TreeNavigator for FsNavigator {
    fn list(&self, dir: &Path) -> Result<Vec<(String, NodeKind)>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Follow symlinks: what matters is what the entry resolves to.
            let kind = match std::fs::metadata(entry.path()) {
                Ok(m) if m.is_dir() => NodeKind::Container,
                Ok(_) => NodeKind::Leaf,
                Err(_) => NodeKind::ExternalLink,
            };
            out.push((name, kind));
        }
        Ok(out)
    }

    fn read_leaf(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Snapshot backend over a commit's tree.
///
/// Stateless per call: every lookup re-walks from the root tree, mirroring the
/// caller's own upward retries.
pub struct GitTreeNavigator<'r> {
    repo: &'r Repository,
    root: Tree<'r>,
}

impl<'r> GitTreeNavigator<'r> {
    pub fn for_commit(repo: &'r Repository, commit: &Commit<'r>) -> Result<Self> {
        Ok(Self {
            repo,
            root: commit.tree()?,
        })
    }

    /// Walk `dir` component by component from the root tree.
    ///
    /// Component names match case-insensitively against stored entry names. A
    /// component that resolves to a blob or a commit (submodule) entry cannot
    /// be descended and fails the lookup.
    fn resolve_tree(&self, dir: &Path) -> Result<Tree<'r>> {
        let mut current = self.repo.find_tree(self.root.id())?;
        for comp in dir.components() {
            let part = match comp {
                Component::Normal(os) => os
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF-8 path component in {}", dir.display()))?,
                Component::CurDir => continue,
                other => bail!("unsupported path component {:?} in {}", other, dir.display()),
            };
            if part.is_empty() {
                continue;
            }

            let mut found: Option<(git2::Oid, Option<ObjectType>, String)> = None;
            for entry in current.iter() {
                let Some(name) = entry.name() else { continue };
                if name.eq_ignore_ascii_case(part) {
                    found = Some((entry.id(), entry.kind(), name.to_string()));
                    break;
                }
            }

            let Some((id, kind, stored_name)) = found else {
                bail!("path component '{part}' not found under {}", dir.display());
            };
            match kind {
                Some(ObjectType::Tree) => {
                    current = self.repo.find_tree(id)?;
                }
                Some(ObjectType::Blob) => {
                    bail!("path component '{stored_name}' is a file, cannot descend");
                }
                Some(ObjectType::Commit) => {
                    // Submodule boundary: standard tree traversal stops here.
                    bail!("path component '{stored_name}' is a nested-repository entry");
                }
                _ => bail!("path component '{stored_name}' has an unexpected object type"),
            }
        }
        Ok(current)
    }

    fn entry_kind(kind: Option<ObjectType>) -> NodeKind {
        match kind {
            Some(ObjectType::Tree) => NodeKind::Container,
            Some(ObjectType::Blob) => NodeKind::Leaf,
            _ => NodeKind::ExternalLink,
        }
    }
}

impl<'r> TreeNavigator for GitTreeNavigator<'r> {
    fn list(&self, dir: &Path) -> Result<Vec<(String, NodeKind)>> {
        let tree = self.resolve_tree(dir)?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let Some(name) = entry.name() else { continue };
            out.push((name.to_string(), Self::entry_kind(entry.kind())));
        }
        Ok(out)
    }

    fn read_leaf(&self, path: &Path) -> Result<String> {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("leaf path has no file name: {}", path.display()))?;

        let tree = self.resolve_tree(parent)?;
        for entry in tree.iter() {
            let Some(name) = entry.name() else { continue };
            if !name.eq_ignore_ascii_case(file_name) {
                continue;
            }
            if entry.kind() != Some(ObjectType::Blob) {
                bail!("'{name}' is not a file in this snapshot");
            }
            let blob = self.repo.find_blob(entry.id())?;
            return Ok(String::from_utf8_lossy(blob.content()).into_owned());
        }
        bail!("'{file_name}' not found under {}", parent.display())
    }
}
