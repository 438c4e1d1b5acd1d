//! Build-unit locator: maps a source file to its owning manifest by walking
//! ancestor directories upward until one contains a manifest leaf.

use crate::debug_log;
use crate::navigator::{NodeKind, TreeNavigator};
use std::path::{Path, PathBuf};

/// Find the manifest owning `source_file`, searching upward from its directory.
///
/// Returns the manifest's path (the ancestor directory joined with the leaf's
/// stored name), or `None` when the root is reached without a hit or when
/// navigation fails. Absence of a result is the reported outcome — this never
/// raises.
///
/// When a directory holds more than one manifest, the first in the navigator's
/// enumeration order wins. That order is backend-dependent; the ambiguity is
/// accepted.
pub fn find_build_unit(
    nav: &dyn TreeNavigator,
    source_file: &Path,
    manifest_extension: &str,
) -> Option<PathBuf> {
    let ext = manifest_extension.to_ascii_lowercase();
    let mut dir: PathBuf = source_file.parent()?.to_path_buf();

    loop {
        let children = match nav.list(&dir) {
            Ok(c) => c,
            Err(e) => {
                // Ambiguous path, submodule boundary, or I/O failure: the
                // upward search cannot continue past an unreadable directory.
                debug_log!(
                    "locator: stopping at unreadable directory {}: {e:#}",
                    dir.display()
                );
                return None;
            }
        };

        for (name, kind) in &children {
            if *kind == NodeKind::Leaf && name.to_ascii_lowercase().ends_with(&ext) {
                debug_log!(
                    "locator: found manifest '{name}' for {}",
                    source_file.display()
                );
                return Some(dir.join(name));
            }
        }

        let parent = match dir.parent() {
            Some(p) => p.to_path_buf(),
            None => return None,
        };
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}
