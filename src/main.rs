//! confstack command-line tool.
//!
//! Builds the standard layer stack, prints the effective configuration and
//! optionally keeps watching the file layers.
//!
//! # Layer Order (highest priority first)
//!
//! ```text
//!   runtime    (created by the engine, empty here)
//!   cli        --set KEY=VALUE
//!   env        <prefix>* environment variables
//!   <stem>     one layer per --file, in the order given
//!   defaults   --defaults file
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use tokio::sync::mpsc;

use confstack::observability::logging::{init_logging, ChangeLogger};
use confstack::{CliLoader, Engine, EnvLoader, FileLoader, LayerWatcher, RUNTIME_LAYER};

#[derive(Parser, Debug)]
#[command(name = "confstack")]
#[command(about = "Resolve layered configuration and print the effective values", long_about = None)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON) loaded as its own layer; repeatable, highest priority first
    #[arg(short, long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Built-in defaults file, loaded as the lowest-priority layer
    #[arg(long, value_name = "PATH")]
    defaults: Option<PathBuf>,

    /// Set a value on the command-line layer
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,

    /// Prefix of environment variables loaded into the env layer
    #[arg(long, env = "CONFSTACK_ENV_PREFIX", default_value = "CONFSTACK_")]
    env_prefix: String,

    /// Show the layer and location of every value
    #[arg(short, long)]
    locations: bool,

    /// Print effective values as JSON
    #[arg(long)]
    json: bool,

    /// Keep running and reload file layers when they change
    #[arg(short, long)]
    watch: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "CONFSTACK_LOG", default_value = "confstack=info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    tracing::info!("confstack v{} starting", env!("CARGO_PKG_VERSION"));

    let mut engine = Engine::new();
    let file_layers = build_stack(&mut engine, &cli)?;
    engine.set_current_layer(RUNTIME_LAYER)?;

    tracing::info!(
        layers = ?engine.layer_names(),
        keys = engine.setting_names().len(),
        "Configuration loaded"
    );
    print_config(&engine, &cli)?;

    if cli.watch {
        watch(&mut engine, &cli, &file_layers).await?;
    }
    Ok(())
}

/// Push every layer in priority order. Returns the file-backed layers.
fn build_stack(engine: &mut Engine, cli: &Cli) -> Result<Vec<(String, PathBuf)>, Box<dyn std::error::Error>> {
    let mut file_layers = Vec::new();

    engine.push_layer_with("cli", CliLoader::from_assignments(cli.sets.iter().cloned()))?;
    engine.push_layer_with("env", EnvLoader::new(cli.env_prefix.as_str()))?;

    for path in &cli.files {
        let name = layer_name(path);
        engine.push_layer_with(name.as_str(), FileLoader::new(path))?;
        file_layers.push((name, path.clone()));
    }

    if let Some(path) = &cli.defaults {
        engine.push_layer_with("defaults", FileLoader::new(path))?;
        file_layers.push(("defaults".to_string(), path.clone()));
    }

    Ok(file_layers)
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_config(engine: &Engine, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
    } else {
        print!("{}", engine.dump(cli.locations));
    }
    Ok(())
}

fn observe_all(engine: &mut Engine, logger: &Rc<ChangeLogger>) {
    let keys: Vec<String> = engine.setting_names().into_iter().map(str::to_string).collect();
    for key in keys {
        engine.add_observer_for_key(key, logger);
    }
}

async fn watch(
    engine: &mut Engine,
    cli: &Cli,
    file_layers: &[(String, PathBuf)],
) -> Result<(), Box<dyn std::error::Error>> {
    if file_layers.is_empty() {
        tracing::warn!("No file layers to watch");
        return Ok(());
    }

    let logger = Rc::new(ChangeLogger);
    observe_all(engine, &logger);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watchers = Vec::with_capacity(file_layers.len());
    for (name, path) in file_layers {
        watchers.push(LayerWatcher::new(name.as_str(), path, tx.clone()).run()?);
    }
    drop(tx);

    loop {
        tokio::select! {
            Some(layer) = rx.recv() => {
                let Some((_, path)) = file_layers.iter().find(|(name, _)| *name == layer) else {
                    continue;
                };
                // Keep the current values if the new file does not parse.
                let mut parsed = match FileLoader::new(path).parse() {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
                        continue;
                    }
                };
                // New keys need the logger before the reload defines them.
                for key in parsed.keys() {
                    engine.add_observer_for_key(key, &logger);
                }
                match engine.reload_layer_using(layer.as_str(), &mut parsed) {
                    Ok(()) => print_config(engine, cli)?,
                    Err(e) => tracing::error!(layer = %layer, error = %e, "Layer reload failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            else => break,
        }
    }

    drop(watchers);
    tracing::info!("Shutdown complete");
    Ok(())
}
