//! # Front Asset Pipeline - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (`asset-pipeline.json`) e override da CLI
//! - Scelta della composizione (`default`, `build` o stage singolo) ed esecuzione
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (task, root, config, porta, json, verbose)
//! 2. Configura il logging (INFO o DEBUG, su stderr in modalità JSON)
//! 3. Carica e valida la configurazione
//! 4. Crea la `ReloadSession` e la `Pipeline` (composition root)
//! 5. Esegue il task graph; Ctrl+C termina le composizioni long-running
//!
//! ## Esempio di utilizzo:
//! ```bash
//! asset-pipeline                 # dev server + watch
//! asset-pipeline build --json    # build di release con eventi NDJSON
//! asset-pipeline webpDel -C site # singolo stage su un altro progetto
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use front_asset_pipeline::config::CONFIG_FILE_NAME;
use front_asset_pipeline::platform::PlatformCommands;
use front_asset_pipeline::{Config, Pipeline, ReloadSession, StageId, TaskGraph};

const EXTERNAL_TOOLS: &[&str] = &[
    "mozjpeg", "cjpeg", "jpegtran", "optipng", "oxipng", "gifsicle", "svgo", "cwebp", "terser", "uglifyjs",
];

#[derive(Parser)]
#[command(name = "asset-pipeline")]
#[command(about = "Compile, optimize, package and serve front-end assets")]
#[command(after_help = "Tasks: default, build, styles, scripts, htmlMin, cssMin, jsMin, imagesMin, webp, \
webpDel, sprite, buildOther, cleanDist, zipArchive, browsersync, watching")]
struct Args {
    /// Task to run: a composition (default, build) or a single stage
    #[arg(default_value = "default")]
    task: String,

    /// Project root containing app/ and dist/
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,

    /// Configuration file (default: <root>/asset-pipeline.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dev server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit newline-delimited JSON events on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Resolve a task name into its task graph
fn task_graph(task: &str) -> Result<TaskGraph> {
    match task {
        "default" => TaskGraph::development(),
        "build" => TaskGraph::release(),
        name => {
            let stage: StageId = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            TaskGraph::single(stage)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if args.json {
        // stdout carries only JSON events
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let graph = task_graph(&args.task)?;
    for stage in graph.stages() {
        let after = graph.dependencies(stage);
        if after.is_empty() {
            debug!("Plan '{}': {}", graph.name(), stage);
        } else {
            let after: Vec<&str> = after.iter().map(|s| s.name()).collect();
            debug!("Plan '{}': {} after {}", graph.name(), stage, after.join(", "));
        }
    }

    let config_path = args.config.clone().unwrap_or_else(|| args.root.join(CONFIG_FILE_NAME));
    let mut config = Config::from_file(&config_path).await?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.json_output = args.json;

    debug!("System: {}", PlatformCommands::system_info());
    let pipeline = Pipeline::new(&args.root, config, ReloadSession::new()).await?;
    debug!("{}", pipeline.platform().get_tools_report(EXTERNAL_TOOLS));

    let long_running = graph.stages().iter().any(|stage| stage.is_long_running());
    if long_running {
        tokio::select! {
            result = pipeline.run(&graph) => {
                result?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
            }
        }
    } else {
        pipeline.run(&graph).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names() {
        assert_eq!(task_graph("default").unwrap().name(), "default");
        assert_eq!(task_graph("build").unwrap().name(), "build");
        assert_eq!(task_graph("webpDel").unwrap().stages(), vec![StageId::WebpDel]);
        assert!(task_graph("deploy").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["asset-pipeline", "build", "-C", "site", "--json", "-p", "8080"]).unwrap();
        assert_eq!(args.task, "build");
        assert_eq!(args.root, PathBuf::from("site"));
        assert!(args.json);
        assert_eq!(args.port, Some(8080));

        let args = Args::try_parse_from(["asset-pipeline"]).unwrap();
        assert_eq!(args.task, "default");
    }
}
