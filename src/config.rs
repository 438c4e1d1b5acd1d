use serde::{Deserialize, Serialize};
use std::path::Path;

/// Controls workspace scanning behavior (what to skip).
///
/// Note: `.gitignore` is always respected by the scanner; these are additional
/// hard skips for noisy build-output directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory *names* to skip anywhere in the tree (e.g. "generated", "tmp").
    ///
    /// These are compared against path components, not full paths.
    pub exclude_dir_names: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_dir_names: vec![],
        }
    }
}

/// Extensions and limits that define what counts as a build unit and a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Manifest extension marking a build unit (matched case-insensitively).
    pub manifest_extension: String,
    /// Source-file extension scanned for declarations and usages.
    pub source_extension: String,
    /// Files larger than this are skipped during consumer scans.
    pub max_file_bytes: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            manifest_extension: ".csproj".to_string(),
            source_extension: ".cs".to_string(),
            // 1 MB default — enough for any hand-written source file, blocks
            // designer-generated bloat.
            max_file_bytes: 1_000_000,
        }
    }
}

/// Defaults for the consumer-file summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Generative model used for summaries.
    pub model: String,
    /// REST endpoint base; the model and API key are appended per request.
    pub endpoint: String,
    /// Code payload cap per request, in chars.
    pub max_code_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_code_chars: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings that govern file discovery and exclusion.
    pub scan: ScanConfig,
    /// Settings that define manifests, source files, and scan limits.
    pub analysis: AnalysisConfig,
    /// Settings for the optional consumer-file summarizer.
    pub summarizer: SummarizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            analysis: AnalysisConfig::default(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

pub fn load_config(repo_root: &Path) -> Config {
    let primary = repo_root.join(".ripplescan.json");

    let text = std::fs::read_to_string(&primary);
    let Ok(text) = text else {
        return Config::default();
    };

    serde_json::from_str::<Config>(&text).unwrap_or_else(|_| Config::default())
}
