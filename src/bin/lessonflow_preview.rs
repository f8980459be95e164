//! lessonflow preview
//!
//! Loads a module's content from disk, builds one session stack against the
//! stock template catalog, and prints the result as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use lessonflow::catalog;
use lessonflow::{LessonContext, LessonEngine, SeedLoader, SessionState, UserSnapshot};

/// Preview configuration
struct Config {
    /// Root of the content repository
    content_dir: PathBuf,
    /// Module code every pack and the flow must belong to
    module: String,
    /// Flow path relative to the content root
    flow: Option<String>,
    /// Seed pack paths relative to the content root
    packs: Vec<String>,
    /// A/B variant assigned to the preview learner
    variant: Option<String>,
    /// Persisted session state to resume from
    session: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("./content"),
            module: "moduleA".to_string(),
            flow: None,
            packs: Vec::new(),
            variant: None,
            session: None,
        }
    }
}

fn usage() {
    println!("lessonflow-preview - build one lesson card stack");
    println!();
    println!("USAGE:");
    println!("    lessonflow-preview [OPTIONS] --flow <PATH>");
    println!();
    println!("OPTIONS:");
    println!("    -c, --content-dir <DIR>   Content root [default: ./content]");
    println!("    -m, --module <CODE>       Module code [default: moduleA]");
    println!("    -f, --flow <PATH>         Flow descriptor, relative to the content root");
    println!("    -p, --pack <PATH>         Seed pack, relative to the content root (repeatable)");
    println!("        --variant <NAME>      A/B variant for the preview learner");
    println!("        --session <FILE>      Resume from persisted session JSON");
    println!("    -h, --help                Print help information");
}

fn take_value(args: &[String], i: usize, flag: &str) -> Result<String, String> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_args() -> Result<Option<Config>, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--content-dir" | "-c" => config.content_dir = PathBuf::from(take_value(&args, i, "--content-dir")?),
            "--module" | "-m" => config.module = take_value(&args, i, "--module")?,
            "--flow" | "-f" => config.flow = Some(take_value(&args, i, "--flow")?),
            "--pack" | "-p" => config.packs.push(take_value(&args, i, "--pack")?),
            "--variant" => config.variant = Some(take_value(&args, i, "--variant")?),
            "--session" => config.session = Some(PathBuf::from(take_value(&args, i, "--session")?)),
            "--help" | "-h" => {
                usage();
                return Ok(None);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 2;
    }
    Ok(Some(config))
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let flow_path = config.flow.ok_or("--flow is required")?;

    let loader = SeedLoader::from_directory(&config.content_dir);
    let seeds = loader.resolve_module_seeds(
        &config.module,
        config.packs.iter().map(String::as_str),
        &flow_path,
    )?;
    let engine = LessonEngine::from_module(Arc::new(catalog::default_registry()?), seeds)?;

    let session = match &config.session {
        Some(path) => SessionState::from_json(serde_json::from_slice(&std::fs::read(path)?)?)?,
        None => SessionState::new(),
    };
    let user = UserSnapshot {
        ab_variant: config.variant,
        ..UserSnapshot::default()
    };
    let mut ctx = LessonContext::resume(config.module, user, session);
    let stack = engine.build_session_stack(&mut ctx)?;

    let report = json!({
        "flow": engine.flow().name(),
        "version": engine.flow().version(),
        "stack": stack,
        "fallbacks": ctx.fallbacks().collect::<Vec<_>>(),
        "analytics": ctx.analytics,
        "session": ctx.session.to_json(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = match parse_args() {
        Ok(Some(config)) => config,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
