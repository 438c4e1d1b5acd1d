//! Result records and their three output shapes: grouped console report, CSV
//! export, and JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One consuming relationship, ready for output.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactRecord {
    pub target_name: String,
    pub target_path: String,
    /// The symbol or stage that triggered the match, e.g. `Widget.Render`,
    /// a bare type name, or a stage description like `project reference`.
    pub triggering_symbol: String,
    pub consumer_name: String,
    pub consumer_path: String,
    pub pipeline_name: String,
    /// Relative file path → summary text, when summarization ran.
    pub file_summaries: BTreeMap<String, String>,
}

/// Sort records the way the report groups them: by target, then triggering
/// symbol, then consumer.
pub fn sort_records(records: &mut [ImpactRecord]) {
    records.sort_by(|a, b| {
        (&a.target_name, &a.triggering_symbol, &a.consumer_name).cmp(&(
            &b.target_name,
            &b.triggering_symbol,
            &b.consumer_name,
        ))
    });
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write records as CSV, creating parent directories as needed. Summaries are
/// serialized as one JSON object string per row.
pub fn write_csv(path: &Path, records: &[ImpactRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }

    let mut out = String::new();
    out.push_str(
        "Target Name,Target Path,Triggering Symbol,Consumer Name,Consumer Path,Pipeline Name,File Summaries\n",
    );
    for r in records {
        let summaries = serde_json::to_string(&r.file_summaries)?;
        let row = [
            r.target_name.as_str(),
            r.target_path.as_str(),
            r.triggering_symbol.as_str(),
            r.consumer_name.as_str(),
            r.consumer_path.as_str(),
            r.pipeline_name.as_str(),
            summaries.as_str(),
        ]
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }

    std::fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Print the grouped console report body: one heading per (target, symbol),
/// consumers and their summaries beneath it.
pub fn print_report(records: &[ImpactRecord]) {
    println!("\n--- Consuming Relationships Found ---");
    if records.is_empty() {
        println!("(none)");
    } else {
        let mut last_group: Option<(&str, &str)> = None;
        for r in records {
            let group = (r.target_name.as_str(), r.triggering_symbol.as_str());
            if last_group != Some(group) {
                println!("\nTarget: {} ({})", r.target_name, r.target_path);
                println!("  Symbol: {}", r.triggering_symbol);
                last_group = Some(group);
            }

            let pipeline = if r.pipeline_name.is_empty() {
                String::new()
            } else {
                format!(" [pipeline: {}]", r.pipeline_name)
            };
            println!("    -> consumed by: {} ({}){pipeline}", r.consumer_name, r.consumer_path);

            if !r.file_summaries.is_empty() {
                println!("       summaries:");
                for (file, summary) in &r.file_summaries {
                    println!("         file: {file}");
                    for line in summary.lines() {
                        println!("           {line}");
                    }
                }
            }
        }
    }
    println!("\n--- Total Consuming Relationships Found: {} ---", records.len());
}
