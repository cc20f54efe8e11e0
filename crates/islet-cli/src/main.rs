//! Command-line interface for islet native modules.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use islet_core::config::{IsolateConfig, env_vars};
use islet_core::{
    Isolate, NativeModule, NativeModuleHandle, NativeModuleTransferable, Transferable,
    TransferableHandle,
};
use serde_json::{Value, json};
use tracing::info;

/// islet - Load native modules into isolates.
#[derive(Parser, Debug)]
#[command(name = "islet")]
#[command(author, version, about = "Load native modules into isolates", long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load a module and show which entry points it exports.
    Inspect {
        /// Path to the shared library.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Initialize a module into a fresh context of each isolate.
    Run {
        /// Path to the shared library.
        #[arg(required = true)]
        path: PathBuf,
        /// Number of isolates to spawn.
        #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=256))]
        isolates: u32,
        /// Use the asynchronous create path.
        #[arg(long = "async")]
        async_mode: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Inspect { path } => inspect(&path),
        Command::Run {
            path,
            isolates,
            async_mode,
        } => run(&path, isolates, async_mode).await,
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "islet=debug" } else { "islet=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(verbose)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn inspect(path: &Path) -> Result<()> {
    let module = NativeModule::load(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;

    println!("Path:        {}", module.path().display());
    println!("Module:      {}", module.id());
    println!("Entry point: {}", module.entry_point().kind());
    Ok(())
}

async fn run(path: &Path, count: u32, async_mode: bool) -> Result<()> {
    let handle = NativeModuleHandle::new(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let config = IsolateConfig::from_env();
    let isolates = (0..count)
        .map(|_| Isolate::new(config.clone()))
        .collect::<islet_core::Result<Vec<_>>>()
        .context("Failed to spawn isolates")?;

    for isolate in &isolates {
        let envelope = handle.transfer_out();
        let exports = if async_mode {
            initialize_async(isolate, envelope).await
        } else {
            initialize_sync(isolate, envelope)
        }
        .with_context(|| format!("Initialization in {} failed", isolate.id()))?;

        let line = json!({ "isolate": isolate.id().to_string(), "exports": exports });
        println!("{}", serde_json::to_string(&line)?);
    }

    let mode = if async_mode { "async" } else { "sync" };
    info!(
        module = %handle.module().id(),
        isolates = count,
        mode,
        "Module initialized in all isolates"
    );
    Ok(())
}

/// Materialize the handle inside `isolate` and initialize there, blocking.
fn initialize_sync(isolate: &Isolate, envelope: NativeModuleTransferable) -> Result<Value> {
    let exports = isolate.holder().execute_sync(move |env| {
        let handle = envelope.transfer_in()?;
        let context = env.holder().create_context()?;
        handle.create_sync(&context)?.copy_sync()
    })??;
    Ok(exports)
}

/// Issue the create from inside `isolate` and complete it here.
async fn initialize_async(isolate: &Isolate, envelope: NativeModuleTransferable) -> Result<Value> {
    let pending = isolate.holder().execute_sync(move |env| {
        let handle = envelope.transfer_in()?;
        let context = env.holder().create_context()?;
        Ok::<_, islet_core::Error>(handle.create(&context))
    })??;
    let exports = pending.await?;
    Ok(exports.copy().await?)
}
