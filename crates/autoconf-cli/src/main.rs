//! Autoconf - conditional auto-configuration CLI
//!
//! The `autoconf` command resolves a candidate manifest against a class
//! path, properties and pre-existing beans, and explains the outcome.
//!
//! ## Commands
//!
//! - `resolve`: Run a full resolution and render the evaluation report
//! - `plan`: Apply exclusions and static conditions, then print the ordering
//! - `validate`: Register the candidates and check the full ordering graph

use anyhow::{Context, Result};
use autoconf_core::{
    AutoConfigurationEngine, BeanContribution, EnvPropertySource, Environment, EvaluationReport,
    LayeredPropertySource, Manifest, MapPropertySource, OrderingGraph, OrderingResolver,
    ResolutionFailure, ResolutionRequest, StaticClassPath,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "autoconf")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conditional auto-configuration resolution", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the candidates and render the evaluation report
    Resolve {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Print the ordered plan over units that survive static conditions
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Register the candidates and check before/after constraints for cycles
    Validate {
        /// Candidate manifest (.json or .toml)
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Candidate manifest (.json or .toml)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Unit ids to exclude (comma-separated)
    #[arg(short, long, env = "AUTOCONF_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Property override, `key=value` (repeatable)
    #[arg(short, long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Class to add to the class path (repeatable)
    #[arg(short, long = "class")]
    classes: Vec<String>,

    /// Pre-existing bean, `kind` or `kind:name` (repeatable)
    #[arg(short, long = "bean", value_parser = parse_bean)]
    beans: Vec<BeanContribution>,

    /// Also read properties from environment variables with this prefix
    #[arg(long)]
    env_prefix: Option<String>,

    /// Upper bound on registry passes
    #[arg(long)]
    max_passes: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autoconf_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Resolve { run } => cmd_resolve(&run),
        Commands::Plan { run } => cmd_plan(&run),
        Commands::Validate { manifest } => cmd_validate(&manifest),
    }
}

/// Parse a `key=value` property override.
fn parse_property(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse a `kind` or `kind:name` bean declaration.
fn parse_bean(raw: &str) -> std::result::Result<BeanContribution, String> {
    let (kind, name) = match raw.split_once(':') {
        Some((kind, name)) => (kind.trim(), Some(name.trim())),
        None => (raw.trim(), None),
    };
    if kind.is_empty() {
        return Err(format!("empty bean kind in '{raw}'"));
    }
    match name {
        Some("") => Err(format!("empty bean name in '{raw}'")),
        Some(name) => Ok(BeanContribution::new(name, kind)),
        None => Ok(BeanContribution::of_kind(kind)),
    }
}

/// Everything a run needs, assembled from the manifest and the flags.
struct Prepared {
    engine: AutoConfigurationEngine,
    request: ResolutionRequest,
}

fn prepare(args: &RunArgs) -> Result<Prepared> {
    let manifest = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {:?}", args.manifest))?;
    let registry = manifest
        .registry()
        .with_context(|| format!("Invalid candidates in {:?}", args.manifest))?;

    let mut options = manifest.options.clone();
    if args.max_passes.is_some() {
        options.max_passes = args.max_passes;
    }

    let engine = AutoConfigurationEngine::new(registry, build_environment(&manifest, args))
        .with_options(options);

    let mut request = manifest.request();
    request.initial_beans.extend(args.beans.iter().cloned());
    request.exclusions.extend(
        args.exclude
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    );

    Ok(Prepared { engine, request })
}

/// Class path is the manifest's classes plus `--class`; properties are
/// looked up in command line, then environment variables, then manifest.
fn build_environment(manifest: &Manifest, args: &RunArgs) -> Environment {
    let class_path = args
        .classes
        .iter()
        .fold(
            StaticClassPath::new(manifest.environment.classes.iter().cloned()),
            |cp, class| cp.with_class(class.clone()),
        );

    let mut overrides = MapPropertySource::new("command-line");
    for (key, value) in &args.properties {
        overrides.insert(key.clone(), value.clone());
    }

    let mut properties = LayeredPropertySource::new().with_layer(overrides);
    if let Some(prefix) = &args.env_prefix {
        properties = properties.with_layer(EnvPropertySource::with_prefix(prefix.clone()));
    }
    let properties = properties.with_layer(MapPropertySource::from_map(
        "manifest",
        manifest.environment.properties.clone(),
    ));

    Environment::new(class_path, properties)
}

#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    run_id: String,
    accepted: &'a [String],
    digest: String,
    report: &'a EvaluationReport,
}

#[derive(Debug, Serialize)]
struct FailureOutput<'a> {
    error: String,
    report: &'a EvaluationReport,
}

/// Resolve and render the report.
fn cmd_resolve(args: &RunArgs) -> Result<()> {
    let prepared = prepare(args)?;

    match prepared.engine.resolve(&prepared.request) {
        Ok(resolution) => {
            let rendered = match args.format {
                OutputFormat::Text => resolution.report.render_text(),
                OutputFormat::Json => serde_json::to_string_pretty(&ResolveOutput {
                    run_id: resolution.run_id.to_string(),
                    accepted: &resolution.accepted,
                    digest: resolution.report.digest()?,
                    report: &resolution.report,
                })?,
            };
            write_output(args.output.as_deref(), &rendered)?;
            info!(
                accepted = resolution.accepted.len(),
                passes = resolution.report.passes,
                cache_hits = resolution.cache_stats.hits,
                cache_misses = resolution.cache_stats.misses,
                "resolution complete"
            );
            Ok(())
        }
        Err(failure) => {
            render_failure(args, &failure)?;
            Err(anyhow::Error::new(failure.error).context("Resolution failed"))
        }
    }
}

/// Print the plan without consulting the bean registry.
fn cmd_plan(args: &RunArgs) -> Result<()> {
    let prepared = prepare(args)?;

    match prepared.engine.plan(&prepared.request) {
        Ok((plan, report)) => {
            let rendered = match args.format {
                OutputFormat::Text => render_plan_text(plan.ids(), &report),
                OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                    "plan": plan.ids(),
                    "report": report,
                }))?,
            };
            write_output(args.output.as_deref(), &rendered)
        }
        Err(failure) => {
            render_failure(args, &failure)?;
            Err(anyhow::Error::new(failure.error).context("Planning failed"))
        }
    }
}

fn render_plan_text(plan: &[String], report: &EvaluationReport) -> String {
    let mut out = String::from("Ordered plan:\n");
    if plan.is_empty() {
        out.push_str("   None\n");
    }
    for (i, id) in plan.iter().enumerate() {
        out.push_str(&format!("  {:>3}. {}\n", i + 1, id));
    }

    let pruned: Vec<_> = report.rejected().chain(report.excluded()).collect();
    if !pruned.is_empty() {
        out.push_str("\nPruned before ordering:\n");
        for unit in pruned {
            let why = unit
                .reasons
                .last()
                .cloned()
                .unwrap_or_else(|| "excluded".to_string());
            out.push_str(&format!("   {} ({})\n", unit.unit_id, why));
        }
    }
    out
}

/// Render the partial report of a failed run.
fn render_failure(args: &RunArgs, failure: &ResolutionFailure) -> Result<()> {
    let rendered = match args.format {
        OutputFormat::Text => format!(
            "Resolution failed: {}\n\n{}",
            failure.error,
            failure.report.render_text()
        ),
        OutputFormat::Json => serde_json::to_string_pretty(&FailureOutput {
            error: failure.error.to_string(),
            report: &failure.report,
        })?,
    };
    write_output(args.output.as_deref(), &rendered)
}

/// Register candidates and check the unpruned ordering graph.
fn cmd_validate(path: &Path) -> Result<()> {
    let manifest =
        Manifest::load(path).with_context(|| format!("Failed to load manifest {:?}", path))?;
    let registry = manifest
        .registry()
        .with_context(|| format!("Invalid candidates in {:?}", path))?;

    let units: Vec<_> = registry.iter().collect();
    let graph = OrderingGraph::build(&units);
    OrderingResolver::resolve_all(&registry)
        .with_context(|| format!("Ordering constraints in {:?} are not satisfiable", path))?;

    println!(
        "{} candidates, {} ordering constraints, no cycles",
        registry.len(),
        graph.edge_count()
    );
    if graph.dropped_hints() > 0 {
        println!(
            "{} ordering hints reference units outside the manifest and will be ignored",
            graph.dropped_hints()
        );
    }
    Ok(())
}

fn write_output(path: Option<&Path>, rendered: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
