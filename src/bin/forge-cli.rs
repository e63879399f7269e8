//! Forge CLI - compile and run templates from the command line
//!
//! Runs against the built-in functions only; platform natives are supplied
//! by embedding applications.

use clap::{Parser, Subcommand};
use forge::builtins;
use forge::config::EngineConfig;
use forge::error::{EngineError, Result};
use forge::registry::FunctionCatalog;
use forge::{Engine, run};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Compile and run $function[...] templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template and print the compiled program as JSON
    Compile {
        /// Template file
        file: PathBuf,
    },

    /// Run a template and print the resolved content
    Run {
        /// Template file
        file: PathBuf,

        /// Session variable (NAME=VALUE); may be repeated
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// JSON config file (defaults come from FORGE_* variables)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum reprocessing depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Disable reprocessing of produced values
        #[arg(long)]
        no_reprocess: bool,

        /// Disable failure recovery
        #[arg(long)]
        no_recovery: bool,
    },

    /// List registered functions and their aliases
    Functions,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    FunctionCatalog::global().set_functions(builtins::all())?;

    match cli.command {
        Commands::Compile { file } => {
            let source = std::fs::read_to_string(&file)?;
            let path = file.display().to_string();
            let engine = Engine::from_global();
            let program = engine.compile(&source, Some(&path))?;
            println!("{}", serde_json::to_string_pretty(&program)?);
        }

        Commands::Run {
            file,
            vars,
            config,
            max_depth,
            no_reprocess,
            no_recovery,
        } => {
            let mut engine_config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::from_env(),
            };
            if let Some(depth) = max_depth {
                engine_config.max_reprocess_depth = depth;
            }
            if no_reprocess {
                engine_config.reprocess_enabled = false;
            }
            if no_recovery {
                engine_config.recovery_enabled = false;
            }
            EngineConfig::set_global(engine_config);

            let source = std::fs::read_to_string(&file)?;
            let path = file.display().to_string();
            let engine = Engine::from_global();
            let program = engine.compile_cached(&source, Some(&path))?;

            let mut ctx = engine.context(program).without_delivery();
            for var in vars {
                let (name, value) = parse_var(&var)?;
                ctx.set_keyword(name, value);
            }

            match run(&mut ctx).await {
                Some(content) => println!("{}", content),
                None => println!("<no output>"),
            }
            for error in ctx.errors() {
                eprintln!("error: {}", error);
            }
        }

        Commands::Functions => {
            let registry = FunctionCatalog::global().snapshot();
            println!("Functions:");
            for native in registry.functions() {
                let definition = native.definition();
                if definition.aliases.is_empty() {
                    println!("  {}", definition.name);
                } else {
                    println!(
                        "  {}  (aliases: {})",
                        definition.name,
                        definition.aliases.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Split `NAME=VALUE`; values that parse as JSON keep their type.
fn parse_var(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| EngineError::Config(format!("Expected NAME=VALUE, got {:?}", raw)))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), value))
}
