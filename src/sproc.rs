//! Stored-procedure binding resolution: find every source file referencing a
//! literal name and bind each reference to the declared type and build unit
//! that contains it.

use crate::config::Config;
use crate::debug_log;
use crate::extractor::find_enclosing_declaration;
use crate::locator::find_build_unit;
use crate::navigator::FsNavigator;
use crate::scanner;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Substitution point expected in a custom `--sproc-pattern` template.
pub const PATTERN_PLACEHOLDER: &str = "{name}";

/// One binding site: the build unit and declared type a referencing file
/// belongs to, with every file attributed to that pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprocBinding {
    pub manifest_path: PathBuf,
    pub type_name: String,
    pub files: Vec<PathBuf>,
}

/// Build the search pattern for a procedure name.
///
/// The default matches the name enclosed in quotes with an optional dotted
/// qualifier prefix (e.g. `"dbo.usp_Load"`), case-insensitively. A custom
/// template must contain exactly the `{name}` placeholder; a template without
/// it (or one that is not a valid pattern) is reported and the default is
/// used instead — a degraded run, not an abort.
pub fn build_search_pattern(name: &str, template: Option<&str>) -> Result<Regex> {
    let escaped = regex::escape(name);

    if let Some(template) = template {
        if !template.contains(PATTERN_PLACEHOLDER) {
            eprintln!(
                "warning: custom pattern is missing the {PATTERN_PLACEHOLDER} placeholder; using the default pattern"
            );
        } else {
            let custom = format!("(?i){}", template.replace(PATTERN_PLACEHOLDER, &escaped));
            match Regex::new(&custom) {
                Ok(re) => return Ok(re),
                Err(e) => {
                    eprintln!("warning: custom pattern is not a valid regex ({e}); using the default pattern");
                }
            }
        }
    }

    Regex::new(&format!(r#"(?i)"(?:[A-Za-z0-9_\[\]]+\.)*{escaped}""#))
        .context("building procedure search pattern")
}

/// Scan every source file in scope for the procedure name and bind each
/// referencing file to its {build unit, enclosing type} pair.
///
/// Only the first match in a file is bound to a declaration; later matches in
/// the same file are not separately attributed. Files whose build unit cannot
/// be located, or whose first match has no preceding declaration, are logged
/// and dropped.
pub fn resolve_bindings(
    name: &str,
    template: Option<&str>,
    search_scope: &Path,
    cfg: &Config,
) -> Result<Vec<SprocBinding>> {
    let pattern = build_search_pattern(name, template)?;

    // manifest path -> type name -> files, discovery-ordered within each pair
    let mut grouped: BTreeMap<PathBuf, BTreeMap<String, Vec<PathBuf>>> = BTreeMap::new();

    for file in scanner::list_files_with_extension(search_scope, &cfg.analysis.source_extension, cfg)
    {
        let content = match std::fs::read(&file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                eprintln!("warning: could not read {}: {e}", file.display());
                continue;
            }
        };
        let Some(first) = pattern.find(&content) else { continue };

        let Some(manifest) = find_build_unit(&FsNavigator, &file, &cfg.analysis.manifest_extension)
        else {
            eprintln!(
                "warning: no owning project found for {}; skipping reference",
                file.display()
            );
            continue;
        };

        let Some(type_name) = find_enclosing_declaration(&content, first.start()) else {
            debug_log!(
                "no enclosing declaration before match in {}; dropping file",
                file.display()
            );
            continue;
        };

        grouped
            .entry(manifest)
            .or_default()
            .entry(type_name)
            .or_default()
            .push(file);
    }

    let mut bindings = Vec::new();
    for (manifest_path, by_type) in grouped {
        for (type_name, files) in by_type {
            bindings.push(SprocBinding {
                manifest_path: manifest_path.clone(),
                type_name,
                files,
            });
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn default_pattern_matches_quoted_and_qualified_names() {
        let re = build_search_pattern("usp_Load", None).unwrap();
        assert!(re.is_match(r#"cmd.CommandText = "usp_Load";"#));
        assert!(re.is_match(r#"Exec("dbo.usp_load")"#), "qualifier and case are tolerated");
        assert!(!re.is_match("usp_Load"), "unquoted references do not match");
        assert!(!re.is_match(r#""usp_LoadAll""#), "longer names do not match");
    }

    #[test]
    fn template_without_placeholder_falls_back_to_default() {
        let re = build_search_pattern("usp_Load", Some("CommandText = X")).unwrap();
        assert!(re.is_match(r#""usp_Load""#), "fallback is the default pattern");
    }

    #[test]
    fn custom_template_is_substituted() {
        let re = build_search_pattern("usp_Load", Some(r"CommandText\s*=\s*@?{name}\b")).unwrap();
        assert!(re.is_match("CommandText = usp_Load;"));
        assert!(!re.is_match(r#""usp_Load""#), "custom pattern replaces the default");
    }

    #[test]
    fn bindings_group_by_unit_and_enclosing_type() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "Data/Data.csproj", "<Project/>");
        write(
            tmp.path(),
            "Data/OrderRepo.cs",
            "class OrderRepo {\n  void Load() { Exec(\"usp_GetOrders\"); }\n  void Reload() { Exec(\"dbo.usp_GetOrders\"); }\n}",
        );
        write(
            tmp.path(),
            "Data/Reports.cs",
            "class Reports { void Run() { Exec(\"usp_GetOrders\"); } }",
        );
        let cfg = Config::default();
        let bindings =
            resolve_bindings("usp_GetOrders", None, &tmp.path().join("Data"), &cfg).unwrap();

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].type_name, "OrderRepo");
        assert_eq!(bindings[0].files, vec![tmp.path().join("Data/OrderRepo.cs")]);
        assert_eq!(bindings[1].type_name, "Reports");
    }

    #[test]
    fn file_without_enclosing_declaration_is_dropped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "P/P.csproj", "<Project/>");
        write(tmp.path(), "P/Script.cs", "// top-of-file note: \"usp_Orphan\"\n");

        let cfg = Config::default();
        let bindings = resolve_bindings("usp_Orphan", None, tmp.path(), &cfg).unwrap();
        assert!(bindings.is_empty());
    }
}
