use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use ripplescan::changeset::analyze_branch_changes;
use ripplescan::config::{load_config, Config};
use ripplescan::extractor::extract_type_names;
use ripplescan::funnel::{find_consumers, ConsumerMatch, ConsumerQuery};
use ripplescan::manifest::{derive_namespace, find_target_manifest, BuildUnit};
use ripplescan::pipeline::load_pipeline_map;
use ripplescan::report::{print_report, sort_records, write_csv, ImpactRecord};
use ripplescan::sproc;
use ripplescan::summarizer::Summarizer;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "ripplescan")]
#[command(version)]
#[command(about = "Lexical impact analysis for multi-project .NET source trees")]
#[command(group(ArgGroup::new("mode").required(true)))]
struct Cli {
    /// Analyze consumers of this project (.csproj file, or a directory containing one)
    #[arg(long, value_name = "PATH", group = "mode")]
    target_project: Option<PathBuf>,

    /// Analyze the projects changed on this branch relative to --base-branch
    #[arg(long, value_name = "BRANCH", group = "mode")]
    branch_name: Option<String>,

    /// Find bindings of a stored-procedure name and report their build units
    #[arg(long, value_name = "NAME", group = "mode")]
    sproc_name: Option<String>,

    /// Path to the git repository
    #[arg(short = 'r', long, default_value = ".")]
    repo_path: PathBuf,

    /// Base branch to compare against in branch mode
    #[arg(short = 'b', long, default_value = "main")]
    base_branch: String,

    /// Root directory searched for consuming projects
    /// (defaults to --repo-path in branch and sproc modes; required with --target-project)
    #[arg(long, value_name = "DIR")]
    search_scope: Option<PathBuf>,

    /// Filter: only analyze usage of this type
    #[arg(long, value_name = "TYPE")]
    class_name: Option<String>,

    /// Filter: only report call sites of this method (requires --class-name)
    #[arg(long, value_name = "METHOD")]
    method_name: Option<String>,

    /// Explicit target namespace, overriding derivation from the manifest
    #[arg(long, value_name = "NS")]
    target_namespace: Option<String>,

    /// Custom sproc search template; must contain the {name} placeholder
    #[arg(long, value_name = "TEMPLATE")]
    sproc_pattern: Option<String>,

    /// CSV mapping 'Project Name' to 'Pipeline Name'
    #[arg(long, value_name = "CSV")]
    pipeline_csv: Option<PathBuf>,

    /// Write results to this CSV file instead of the console report
    #[arg(long, value_name = "CSV")]
    output_file: Option<PathBuf>,

    /// Print results as JSON to stdout
    #[arg(long)]
    json: bool,

    /// Summarize the relevant files of each consumer via the Gemini API
    #[arg(long)]
    summarize_consumers: bool,

    /// Google API key for Gemini (falls back to GOOGLE_API_KEY)
    #[arg(long, value_name = "KEY")]
    google_api_key: Option<String>,

    /// Gemini model used for summaries
    #[arg(long, value_name = "MODEL")]
    gemini_model: Option<String>,

    /// Print extra progress detail
    #[arg(short, long)]
    verbose: bool,
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb.set_message(msg.to_string());
    pb
}

/// Display `path` relative to `base` with forward slashes, falling back to the
/// full path when it lies outside `base`.
fn rel_display(base: &Path, path: &Path) -> String {
    let p = path.strip_prefix(base).unwrap_or(path);
    p.to_string_lossy().replace('\\', "/")
}

fn summarize_files(
    summarizer: &Summarizer,
    files: &[PathBuf],
    scope: &Path,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} summarizing {msg}")
            .unwrap(),
    );
    for file in files {
        let rel = rel_display(scope, file);
        pb.set_message(rel.clone());
        let summary = match std::fs::read(file) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                summarizer.summarize_source(&text, file)
            }
            Err(e) => {
                eprintln!("warning: could not read {} for summarization: {e}", file.display());
                "[Error reading file]".to_string()
            }
        };
        out.insert(rel, summary);
        pb.inc(1);
    }
    pb.finish_and_clear();
    out
}

/// Build report rows from one funnel result.
fn consumer_records(
    consumers: &[ConsumerMatch],
    target_name: &str,
    target_path: &str,
    trigger: Option<&str>,
    scope: &Path,
    pipeline_map: &HashMap<String, String>,
    summarizer: Option<&Summarizer>,
) -> Vec<ImpactRecord> {
    let mut records = Vec::new();
    for consumer in consumers {
        let consumer_name = consumer.unit.name();
        let file_summaries = match summarizer {
            Some(s) if !consumer.files.is_empty() => summarize_files(s, &consumer.files, scope),
            _ => BTreeMap::new(),
        };
        records.push(ImpactRecord {
            target_name: target_name.to_string(),
            target_path: target_path.to_string(),
            triggering_symbol: trigger
                .map(|t| t.to_string())
                .unwrap_or_else(|| consumer.stage.describe().to_string()),
            consumer_name: consumer_name.clone(),
            consumer_path: rel_display(scope, &consumer.unit.manifest_path),
            pipeline_name: pipeline_map.get(&consumer_name).cloned().unwrap_or_default(),
            file_summaries,
        });
    }
    records
}

fn run_target_mode(
    cli: &Cli,
    cfg: &Config,
    scope: &Path,
    pipeline_map: &HashMap<String, String>,
    summarizer: Option<&Summarizer>,
) -> Result<Vec<ImpactRecord>> {
    let target = cli.target_project.as_ref().unwrap();
    let target_manifest = find_target_manifest(target, &cfg.analysis.manifest_extension)?;
    let target_unit = BuildUnit::new(target_manifest.clone());
    eprintln!("analyzing target project: {} ({})", target_unit.name(), target_manifest.display());

    let namespace = match cli.target_namespace.clone() {
        Some(ns) => {
            eprintln!("using explicitly provided target namespace: '{ns}'");
            ns
        }
        None => derive_namespace(&target_manifest).context(
            "could not derive the target namespace; specify it with --target-namespace",
        )?,
    };

    let query = ConsumerQuery {
        target_manifest: &target_manifest,
        search_scope: scope,
        namespace: Some(&namespace),
        type_name: cli.class_name.as_deref(),
        method_name: cli.method_name.as_deref(),
    };
    let pb = spinner("scanning for consumers...");
    let consumers = find_consumers(&query, cfg)?;
    pb.finish_with_message(format!("found {} consumer(s)", consumers.len()));

    let trigger = match (cli.class_name.as_deref(), cli.method_name.as_deref()) {
        (Some(c), Some(m)) => Some(format!("{c}.{m}")),
        (Some(c), None) => Some(c.to_string()),
        _ => None,
    };

    Ok(consumer_records(
        &consumers,
        &target_unit.name(),
        &rel_display(scope, &target_manifest),
        trigger.as_deref(),
        scope,
        pipeline_map,
        summarizer,
    ))
}

fn run_branch_mode(
    cli: &Cli,
    cfg: &Config,
    repo_path: &Path,
    scope: &Path,
    pipeline_map: &HashMap<String, String>,
    summarizer: Option<&Summarizer>,
) -> Result<Vec<ImpactRecord>> {
    let branch = cli.branch_name.as_ref().unwrap();
    eprintln!("comparing branch '{branch}' against base '{}' in {}", cli.base_branch, repo_path.display());

    let pb = spinner("analyzing branch changes...");
    let changed = analyze_branch_changes(repo_path, branch, &cli.base_branch, cfg)?;
    pb.finish_with_message(format!("{} project(s) with changes", changed.len()));

    if changed.is_empty() {
        eprintln!("no projects with changed source files found");
        return Ok(vec![]);
    }

    // Declared types per changed project, read from the working tree.
    let mut types_by_project: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (proj_rel, file_rels) in &changed {
        let mut types = BTreeSet::new();
        for file_rel in file_rels {
            let abs = repo_path.join(file_rel);
            if !abs.is_file() {
                eprintln!("warning: changed file not found on disk (deleted or moved?): {}", abs.display());
                continue;
            }
            match std::fs::read(&abs) {
                Ok(bytes) => {
                    let extracted = extract_type_names(&String::from_utf8_lossy(&bytes));
                    if cli.verbose && !extracted.is_empty() {
                        eprintln!(
                            "  {file_rel}: {}",
                            extracted.iter().cloned().collect::<Vec<_>>().join(", ")
                        );
                    }
                    types.extend(extracted);
                }
                Err(e) => eprintln!("warning: could not read {}: {e}", abs.display()),
            }
        }
        if !types.is_empty() {
            types_by_project.insert(proj_rel.clone(), types);
        }
    }

    if types_by_project.is_empty() {
        eprintln!("no type declarations found in the changed files");
        return Ok(vec![]);
    }

    let mut records = Vec::new();
    for (proj_rel, extracted) in &types_by_project {
        let target_manifest = repo_path.join(proj_rel);
        if !target_manifest.is_file() {
            eprintln!("warning: changed project manifest not found on disk: {}", target_manifest.display());
            continue;
        }
        let target_unit = BuildUnit::new(target_manifest.clone());
        eprintln!("-- analyzing consumers of {} --", target_unit.name());

        // Underivable namespaces are unreliable; the funnel skips the
        // namespace check and keeps all direct consumers.
        let namespace = derive_namespace(&target_manifest);
        if namespace.is_none() {
            eprintln!(
                "warning: could not derive namespace for {}; consumer analysis may be incomplete",
                target_unit.name()
            );
        }

        let types_to_analyze: Vec<&str> = match cli.class_name.as_ref() {
            Some(filter) if extracted.contains(filter) => vec![filter.as_str()],
            Some(filter) => {
                eprintln!(
                    "type '{filter}' was not declared in {}'s changed files; skipping",
                    target_unit.name()
                );
                continue;
            }
            None => extracted.iter().map(|s| s.as_str()).collect(),
        };

        for type_name in types_to_analyze {
            // The method filter only applies to the explicitly requested type.
            let method_filter = match cli.class_name.as_deref() {
                Some(c) if c == type_name => cli.method_name.as_deref(),
                _ => None,
            };

            let pb = spinner(&format!("checking consumers of '{type_name}'..."));
            let query = ConsumerQuery {
                target_manifest: &target_manifest,
                search_scope: scope,
                namespace: namespace.as_deref(),
                type_name: Some(type_name),
                method_name: method_filter,
            };
            let consumers = find_consumers(&query, cfg)?;
            pb.finish_with_message(format!("'{type_name}': {} consumer(s)", consumers.len()));

            records.extend(consumer_records(
                &consumers,
                &target_unit.name(),
                proj_rel,
                Some(type_name),
                scope,
                pipeline_map,
                summarizer,
            ));
        }
    }

    Ok(records)
}

fn run_sproc_mode(
    cli: &Cli,
    cfg: &Config,
    scope: &Path,
    pipeline_map: &HashMap<String, String>,
    summarizer: Option<&Summarizer>,
) -> Result<Vec<ImpactRecord>> {
    let name = cli.sproc_name.as_ref().unwrap();
    eprintln!("searching for references to stored procedure '{name}'");

    let pb = spinner("scanning source files...");
    let bindings = sproc::resolve_bindings(name, cli.sproc_pattern.as_deref(), scope, cfg)?;
    pb.finish_with_message(format!("{} binding(s)", bindings.len()));

    let mut records = Vec::new();
    for binding in &bindings {
        let unit = BuildUnit::new(binding.manifest_path.clone());
        let unit_name = unit.name();
        let file_summaries = match summarizer {
            Some(s) => summarize_files(s, &binding.files, scope),
            None => BTreeMap::new(),
        };
        records.push(ImpactRecord {
            target_name: name.clone(),
            target_path: scope.to_string_lossy().replace('\\', "/"),
            triggering_symbol: binding.type_name.clone(),
            consumer_name: unit_name.clone(),
            consumer_path: rel_display(scope, &binding.manifest_path),
            pipeline_name: pipeline_map.get(&unit_name).cloned().unwrap_or_default(),
            file_summaries,
        });
    }
    Ok(records)
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // ── Validate inputs; all failures here are fatal before any scan ─────
    let repo_path = cli
        .repo_path
        .canonicalize()
        .with_context(|| format!("repository path not found: {}", cli.repo_path.display()))?;

    let scope = match cli.search_scope.as_ref() {
        Some(s) => s
            .canonicalize()
            .with_context(|| format!("search scope not found: {}", s.display()))?,
        None => {
            if cli.target_project.is_some() {
                bail!("--search-scope is required with --target-project");
            }
            repo_path.clone()
        }
    };

    if cli.method_name.is_some() && cli.class_name.is_none() {
        eprintln!("warning: ignoring --method-name because --class-name was not provided");
        cli.method_name = None;
    }

    let cfg = load_config(&repo_path);

    let summarizer = if cli.summarize_consumers {
        match Summarizer::new(
            cli.google_api_key.as_deref(),
            cli.gemini_model.as_deref(),
            &cfg.summarizer,
        ) {
            Ok(s) => {
                eprintln!("summarization enabled (model: {})", s.model());
                Some(s)
            }
            Err(e) => {
                eprintln!("error: {e:#}; summarization disabled");
                None
            }
        }
    } else {
        None
    };

    let pipeline_map = match cli.pipeline_csv.as_ref() {
        Some(p) => load_pipeline_map(p),
        None => HashMap::new(),
    };

    // ── Dispatch ─────────────────────────────────────────────────────────
    let mut records = if cli.target_project.is_some() {
        run_target_mode(&cli, &cfg, &scope, &pipeline_map, summarizer.as_ref())?
    } else if cli.branch_name.is_some() {
        run_branch_mode(&cli, &cfg, &repo_path, &scope, &pipeline_map, summarizer.as_ref())?
    } else {
        run_sproc_mode(&cli, &cfg, &scope, &pipeline_map, summarizer.as_ref())?
    };

    sort_records(&mut records);

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if let Some(out) = cli.output_file.as_ref() {
        write_csv(out, &records)?;
        eprintln!("wrote {} result(s) to {}", records.len(), out.display());
        return Ok(());
    }

    println!("\n--- Impact Analysis Report ---");
    if let Some(t) = cli.target_project.as_ref() {
        println!("Mode: target project ({})", t.display());
    } else if let Some(b) = cli.branch_name.as_ref() {
        println!("Mode: branch analysis ('{b}' vs '{}')", cli.base_branch);
    } else if let Some(s) = cli.sproc_name.as_ref() {
        println!("Mode: stored procedure ('{s}')");
    }
    println!("Search scope: {}", scope.display());
    let mut filters = Vec::new();
    if let Some(c) = cli.class_name.as_ref() {
        filters.push(format!("type '{c}'"));
    }
    if let Some(m) = cli.method_name.as_ref() {
        filters.push(format!("method '{m}'"));
    }
    if !filters.is_empty() {
        println!("Filters: {}", filters.join(", "));
    }
    if !pipeline_map.is_empty() {
        println!("Pipeline labels: {} mapping(s) loaded", pipeline_map.len());
    }
    if let Some(s) = summarizer.as_ref() {
        println!("Summarization: enabled (model: {})", s.model());
    }
    print_report(&records);

    Ok(())
}
