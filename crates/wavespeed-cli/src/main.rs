use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wavespeed_contracts::catalog::{CachedModel, ModelFilter, RecommendedModel};
use wavespeed_contracts::config::discover_config;
use wavespeed_contracts::env::{ProcessEnv, SecretSource};
use wavespeed_contracts::errors::{ConfigurationError, ExitHint};
use wavespeed_contracts::models::{ModelListing, ModelOrigin, ResolvedModelSummary};
use wavespeed_contracts::tasks::{Operation, OperationResult};
use wavespeed_engine::operations::ImageRequest;
use wavespeed_engine::outputs::SavedOutput;
use wavespeed_engine::WavespeedEngine;

const LOG_ENV: &str = "WAVESPEED_LOG";

const EXIT_TASK_FAILED: i32 = 1;
const EXIT_CONFIGURATION: i32 = 2;
const EXIT_SECRET: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "wavespeed", version, about = "WaveSpeed image generation CLI")]
struct Cli {
    /// Model configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless WAVESPEED_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Text to image.
    Generate(ImageArgs),
    /// Edit one or more input images.
    Edit(ImageArgs),
    /// Text to a consistent image sequence.
    GenerateSequential(ImageArgs),
    /// Edit input images into a consistent sequence.
    EditSequential(ImageArgs),
    /// Configured, registry and built-in models.
    Models(JsonArgs),
    /// Remote model catalogue.
    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(Debug, Args)]
struct ImageArgs {
    #[arg(long)]
    prompt: String,
    /// `W*H` or `WxH`.
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// URL, data URI or local file. Repeatable.
    #[arg(long = "image")]
    images: Vec<String>,
    #[arg(long)]
    max_images: Option<u32>,
    #[arg(long)]
    seed: Option<i64>,
    /// Ask for base64 outputs instead of URLs.
    #[arg(long)]
    base64: bool,
    /// Wait for the result inside the submit call.
    #[arg(long)]
    sync: bool,
    /// Save outputs into this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

impl ImageArgs {
    fn request(&self) -> ImageRequest {
        ImageRequest {
            prompt: self.prompt.clone(),
            size: self.size.clone(),
            images: self.images.clone(),
            max_images: self.max_images,
            seed: self.seed,
            enable_base64_output: self.base64,
            enable_sync_mode: self.sync,
        }
    }
}

#[derive(Debug, Args)]
struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    /// List catalogue models, optionally filtered.
    List {
        #[arg(long = "type")]
        model_type: Option<String>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        limit: Option<usize>,
        /// Bypass the cache.
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Case-insensitive search over id, name and description.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Model counts per type.
    Types(JsonArgs),
    /// Popular models that are live in the catalogue.
    Recommended(JsonArgs),
    Stats,
    Refresh,
    Clear,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("wavespeed error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let env: Arc<dyn SecretSource> = Arc::new(ProcessEnv);
    let cwd = std::env::current_dir().context("failed reading current directory")?;
    let config = discover_config(cli.config.as_deref(), &cwd, env.as_ref())?;
    if let Some(loaded) = &config {
        tracing::debug!(path = %loaded.path.display(), "loaded model configuration");
    }
    let mut engine = WavespeedEngine::new(env, config)?;

    match cli.command {
        Command::Generate(args) => run_operation(&engine, Operation::Generate, &args),
        Command::Edit(args) => run_operation(&engine, Operation::Edit, &args),
        Command::GenerateSequential(args) => {
            run_operation(&engine, Operation::GenerateSequential, &args)
        }
        Command::EditSequential(args) => run_operation(&engine, Operation::EditSequential, &args),
        Command::Models(args) => {
            let recommended: Vec<&str> = engine
                .registry()
                .recommended()
                .into_iter()
                .map(|model| model.id.as_str())
                .collect();
            print_listing(&engine.list_models(), &recommended, args.json)?;
            Ok(0)
        }
        Command::Catalog(command) => run_catalog(&mut engine, command),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = ProcessEnv
        .get(LOG_ENV)
        .and_then(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Configuration problems and missing secrets get distinct exit codes so
/// scripts can tell them apart from task failures.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let config_error = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ConfigurationError>());
    match config_error.map(ConfigurationError::exit_hint) {
        Some(ExitHint::Configuration) => EXIT_CONFIGURATION,
        Some(ExitHint::Secret) => EXIT_SECRET,
        None => EXIT_TASK_FAILED,
    }
}

fn run_operation(engine: &WavespeedEngine, operation: Operation, args: &ImageArgs) -> Result<i32> {
    let result = engine.run(operation, args.model.as_deref(), args.request())?;
    let saved = match (&args.out_dir, result.success) {
        (Some(out_dir), true) => engine.save_outputs(&result, out_dir),
        _ => Ok(Vec::new()),
    };
    report_operation(&result, saved, args.json)
}

/// Prints the result before any save failure is surfaced, so the task id
/// and output URLs are never lost.
fn report_operation(
    result: &OperationResult,
    saved: Result<Vec<SavedOutput>>,
    as_json: bool,
) -> Result<i32> {
    let (saved, save_error) = match saved {
        Ok(saved) => (saved, None),
        Err(err) => (Vec::new(), Some(err)),
    };
    if as_json {
        let mut report = json!({"result": result, "saved": saved});
        if let Some(err) = &save_error {
            report["saveError"] = Value::String(format!("{err:#}"));
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_result(result, &saved);
    }
    if let Some(err) = save_error {
        return Err(err.context(format!(
            "task {} finished but its outputs could not be saved",
            result.task_id
        )));
    }
    Ok(if result.success { 0 } else { EXIT_TASK_FAILED })
}

fn print_result(result: &OperationResult, saved: &[SavedOutput]) {
    if !result.success {
        let task = if result.task_id.is_empty() {
            String::new()
        } else {
            format!(" (task {})", result.task_id)
        };
        eprintln!(
            "Generation failed{task}: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        return;
    }
    let timing = result
        .timing_ms
        .map(|ms| format!(" in {:.1}s", ms / 1000.0))
        .unwrap_or_default();
    println!("Task {} {}{timing}", result.task_id, result.status);
    if saved.is_empty() {
        for output in &result.outputs {
            println!("  {}", summarize_output(output));
        }
    } else {
        for row in saved {
            println!(
                "  {} ({}x{} {})",
                row.path.display(),
                row.width,
                row.height,
                row.format
            );
        }
    }
    if let Some(flags) = &result.nsfw_flags {
        let flagged = flags.iter().filter(|flag| **flag).count();
        if flagged > 0 {
            println!("  {flagged} output(s) flagged as NSFW");
        }
    }
}

fn summarize_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("<base64 image, {} chars>", trimmed.len())
}

fn print_listing(listing: &ModelListing, recommended: &[&str], as_json: bool) -> Result<()> {
    if as_json {
        let mut report = serde_json::to_value(listing)?;
        report["recommended"] = json!(recommended);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if let Some(source) = &listing.source {
        println!("Config: {source}");
    }
    for model in &listing.models {
        let marks = listing_marks(model, recommended);
        println!(
            "{:<20} {:<18} {:<32} {:?}{marks}",
            model.id,
            model.provider.as_str(),
            model.model_name,
            model.origin
        );
    }
    Ok(())
}

fn listing_marks(model: &ResolvedModelSummary, recommended: &[&str]) -> String {
    let mut marks = Vec::new();
    if model.origin == ModelOrigin::Registry && recommended.contains(&model.id.as_str()) {
        marks.push("recommended".to_string());
    }
    if model.is_global_default {
        marks.push("default".to_string());
    }
    if !model.default_for_commands.is_empty() {
        marks.push(format!("default for {}", model.default_for_commands.join(",")));
    }
    if !model.has_api_key {
        let env_name = if model.api_key_env_name.is_empty() {
            "<unset>"
        } else {
            model.api_key_env_name.as_str()
        };
        marks.push(format!("missing {env_name}"));
    }
    if marks.is_empty() {
        String::new()
    } else {
        format!(" [{}]", marks.join("; "))
    }
}

fn run_catalog(engine: &mut WavespeedEngine, command: CatalogCommand) -> Result<i32> {
    match command {
        CatalogCommand::List {
            model_type,
            max_price,
            limit,
            refresh,
            json,
        } => {
            let key = engine.catalog_api_key()?;
            engine.cache().get_models(&key, refresh)?;
            let models = engine.cache().filter_models(&ModelFilter {
                model_type,
                query: None,
                max_price,
                limit,
            });
            print_models(&models, json)?;
        }
        CatalogCommand::Search { query, limit, json } => {
            let key = engine.catalog_api_key()?;
            engine.cache().get_models(&key, false)?;
            let models = engine.cache().search_models(&query, limit);
            print_models(&models, json)?;
        }
        CatalogCommand::Types(args) => {
            let key = engine.catalog_api_key()?;
            engine.cache().get_models(&key, false)?;
            let counts = engine.cache().get_type_counts();
            if args.json {
                let rows: Vec<Value> = counts
                    .iter()
                    .map(|(model_type, count)| json!({"type": model_type, "count": count}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (model_type, count) in counts {
                    println!("{count:>5}  {model_type}");
                }
            }
        }
        CatalogCommand::Recommended(args) => {
            let key = engine.catalog_api_key().ok();
            let models = engine.cache().get_recommended_models(key.as_deref());
            print_recommended(&models, args.json)?;
        }
        CatalogCommand::Stats => {
            if let Ok(key) = engine.catalog_api_key() {
                if let Err(err) = engine.cache().get_models(&key, false) {
                    tracing::warn!(error = %format!("{err:#}"), "catalogue unavailable");
                }
            }
            println!("{}", serde_json::to_string_pretty(&engine.cache().get_stats())?);
        }
        CatalogCommand::Refresh => {
            let key = engine.catalog_api_key()?;
            let models = engine.cache().get_models(&key, true)?;
            println!("Refreshed {} models", models.len());
        }
        CatalogCommand::Clear => {
            let path = engine.cache().cache_path();
            engine.cache().invalidate();
            println!("Cleared model cache {}", path.display());
        }
    }
    Ok(0)
}

fn print_models(models: &[CachedModel], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(models)?);
        return Ok(());
    }
    if models.is_empty() {
        println!("No models matched.");
    }
    for model in models {
        println!(
            "{:<48} {:<16} {:>8}",
            model.model_id,
            model.model_type,
            format_price(Some(model.base_price))
        );
    }
    Ok(())
}

fn print_recommended(models: &[RecommendedModel], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(models)?);
        return Ok(());
    }
    for model in models {
        let origin = if model.from_fallback { " (fallback)" } else { "" };
        println!(
            "{:<48} {:<16} {:>8}{origin}",
            model.model_id,
            model.model_type,
            format_price(model.price)
        );
    }
    Ok(())
}

fn format_price(price: Option<f64>) -> String {
    match price {
        Some(price) => format!("${price:.3}"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use wavespeed_contracts::errors::{ConfigErrorKind, ConfigurationError};
    use wavespeed_contracts::models::{ModelOrigin, Provider, ResolvedModelSummary};
    use wavespeed_contracts::tasks::{OperationResult, TaskRecord, TaskStatus};

    use super::{
        exit_code_for, format_price, listing_marks, report_operation, summarize_output,
        CatalogCommand, Cli, Command, EXIT_CONFIGURATION, EXIT_SECRET, EXIT_TASK_FAILED,
    };

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sequential_edit_flags() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "wavespeed",
            "edit-sequential",
            "--prompt",
            "storyboard",
            "--image",
            "a.png",
            "--image",
            "https://img/b.png",
            "--max-images",
            "4",
            "--sync",
            "--model",
            "seedream-v4",
            "--config",
            "cfg.json",
        ])?;
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("cfg.json")));
        let Command::EditSequential(args) = cli.command else {
            panic!("wrong subcommand");
        };
        let request = args.request();
        assert_eq!(request.images.len(), 2);
        assert_eq!(request.max_images, Some(4));
        assert!(request.enable_sync_mode);
        assert!(!request.enable_base64_output);
        assert_eq!(args.model.as_deref(), Some("seedream-v4"));
        Ok(())
    }

    #[test]
    fn parses_catalog_subcommands() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "wavespeed", "catalog", "list", "--type", "text-to-image", "--max-price", "0.05",
        ])?;
        match cli.command {
            Command::Catalog(CatalogCommand::List {
                model_type,
                max_price,
                ..
            }) => {
                assert_eq!(model_type.as_deref(), Some("text-to-image"));
                assert_eq!(max_price, Some(0.05));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["wavespeed", "generate"]).is_err());
        Ok(())
    }

    #[test]
    fn exit_codes_follow_error_class() {
        let config = anyhow::Error::new(ConfigurationError::new(
            ConfigErrorKind::UnknownModel,
            Some("x"),
            "unknown",
        ));
        let secret = anyhow::Error::new(ConfigurationError::new(
            ConfigErrorKind::MissingSecret,
            None,
            "unset",
        ))
        .context("resolving model");
        assert_eq!(exit_code_for(&config), EXIT_CONFIGURATION);
        assert_eq!(exit_code_for(&secret), EXIT_SECRET);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_TASK_FAILED);
    }

    #[test]
    fn output_formatting() {
        assert_eq!(format_price(Some(0.027)), "$0.027");
        assert_eq!(format_price(None), "-");
        assert_eq!(summarize_output("https://img/1.png"), "https://img/1.png");
        assert_eq!(summarize_output("AAAA"), "<base64 image, 4 chars>");
    }

    #[test]
    fn save_failure_keeps_the_task_id() {
        let result = OperationResult::from_record(TaskRecord {
            id: "t1".to_string(),
            status: TaskStatus::Completed,
            outputs: vec!["https://img/1.png".to_string()],
            ..TaskRecord::default()
        });

        let err = report_operation(&result, Err(anyhow::anyhow!("disk full")), true)
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("task t1"), "{err}");
        assert!(err.contains("disk full"), "{err}");

        assert_eq!(report_operation(&result, Ok(Vec::new()), false).ok(), Some(0));
        let failed = OperationResult::failure(Some("t2"), "nsfw content blocked");
        assert_eq!(
            report_operation(&failed, Ok(Vec::new()), false).ok(),
            Some(EXIT_TASK_FAILED)
        );
    }

    #[test]
    fn recommended_registry_rows_are_marked() {
        let row = |id: &str, origin| ResolvedModelSummary {
            id: id.to_string(),
            provider: Provider::WavespeedNative,
            base_url: "https://api.wavespeed.ai/api/v3".to_string(),
            api_key_env_name: "WAVESPEED_API_KEY".to_string(),
            model_name: String::new(),
            has_api_key: true,
            origin,
            is_global_default: false,
            default_for_commands: Vec::new(),
        };
        let recommended = ["seedream-v4"];
        assert_eq!(
            listing_marks(&row("seedream-v4", ModelOrigin::Registry), &recommended),
            " [recommended]"
        );
        assert_eq!(
            listing_marks(&row("seedream-v4", ModelOrigin::Config), &recommended),
            ""
        );
        assert_eq!(
            listing_marks(&row("seedream-v3", ModelOrigin::Registry), &recommended),
            ""
        );
    }
}
