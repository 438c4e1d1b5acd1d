//! Project → pipeline-label mapping, loaded from a two-column CSV with
//! `Project Name` and `Pipeline Name` headers.
//!
//! The format is simple enough to parse by line (quoted fields and a leading
//! BOM are tolerated). A missing or malformed file degrades to an empty map
//! with a warning — pipeline labels are enrichment, never required.

use crate::debug_log;
use std::collections::HashMap;
use std::path::Path;

/// Split one CSV line into fields, honoring double-quoted fields with `""`
/// escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Load the project → pipeline map. Duplicate project names keep the last
/// entry.
pub fn load_pipeline_map(path: &Path) -> HashMap<String, String> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!(
                "warning: pipeline CSV not readable: {} ({e}); proceeding without pipeline data",
                path.display()
            );
            return HashMap::new();
        }
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        eprintln!("warning: pipeline CSV is empty: {}", path.display());
        return HashMap::new();
    };

    let headers: Vec<String> = split_csv_line(header)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let project_idx = headers.iter().position(|h| h == "Project Name");
    let pipeline_idx = headers.iter().position(|h| h == "Pipeline Name");
    let (Some(project_idx), Some(pipeline_idx)) = (project_idx, pipeline_idx) else {
        eprintln!(
            "warning: pipeline CSV {} is missing 'Project Name'/'Pipeline Name' columns; proceeding without pipeline data",
            path.display()
        );
        return HashMap::new();
    };

    let mut map = HashMap::new();
    let mut duplicates = 0usize;
    for line in lines {
        let fields = split_csv_line(line);
        let project = fields.get(project_idx).map(|s| s.trim()).unwrap_or("");
        let pipeline = fields.get(pipeline_idx).map(|s| s.trim()).unwrap_or("");
        if project.is_empty() || pipeline.is_empty() {
            continue;
        }
        if map.insert(project.to_string(), pipeline.to_string()).is_some() {
            duplicates += 1;
            debug_log!("duplicate project '{project}' in pipeline CSV; last entry wins");
        }
    }

    if duplicates > 0 {
        eprintln!(
            "loaded {} pipeline mapping(s) ({duplicates} duplicate project name(s), last entry used)",
            map.len()
        );
    } else {
        eprintln!("loaded {} pipeline mapping(s)", map.len());
    }
    map
}
