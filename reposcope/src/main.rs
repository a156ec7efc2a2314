//! Reposcope - repository review scope
//!
//! Shows which repositories the review profile applies to, previews how a
//! selection change reconciles with the persisted overrides, and saves it.

#![forbid(unsafe_code)]

mod render;
mod source;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use reposcope_common::catalog::{
    CacheStore, DisabledCacheStore, FileCacheStore, MemoryCacheStore,
};
use reposcope_common::http::{RestCatalogProvider, RestClient, RestScopePersistence};
use reposcope_common::logging::{LogConfig, init_logging};
use reposcope_common::{
    CatalogCache, EventBus, FetchSettings, GroupKind, RepoKey, ScopeConfig, ScopeEngine,
    ScopeError, SystemClock,
};
use source::{CatalogSource, FileCatalogProvider, FileScopePersistence, ScopeSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

type Engine = ScopeEngine<CatalogSource, ScopeSource>;

#[derive(Parser, Debug)]
#[command(name = "reposcope")]
#[command(author, version, about = "Repository review scope - inspect, reconcile, save")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "REPOSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Read the catalog from a JSON file instead of the service
    #[arg(long, global = true, value_name = "PATH")]
    catalog_file: Option<PathBuf>,

    /// Read and save the scope in a JSON file instead of the service
    #[arg(long, global = true, value_name = "PATH")]
    overrides_file: Option<PathBuf>,

    /// Ignore the cached catalog and fetch it again
    #[arg(long, global = true)]
    refresh: bool,

    /// Neither read nor write the catalog cache file
    #[arg(long, global = true)]
    no_cache: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the selection tree with checkbox states
    Tree {
        #[command(flatten)]
        selection: Selection,
    },

    /// Print how the selection reconciles with the persisted overrides
    Diff {
        #[command(flatten)]
        selection: Selection,
    },

    /// Print the body a save would send
    Payload {
        #[command(flatten)]
        selection: Selection,
    },

    /// Save the selection
    Save {
        #[command(flatten)]
        selection: Selection,
    },
}

impl Commands {
    fn selection(&self) -> &Selection {
        match self {
            Self::Tree { selection }
            | Self::Diff { selection }
            | Self::Payload { selection }
            | Self::Save { selection } => selection,
        }
    }
}

/// Edits applied on top of the persisted scope, in the order: mode, checks,
/// unchecks.
#[derive(Args, Debug, Default, Clone)]
struct Selection {
    /// Apply to all repositories, present and future
    #[arg(long, conflicts_with_all = ["scoped", "select", "project", "group", "deselect"])]
    global: bool,

    /// Switch to an explicit allow-list, restoring the previous one
    #[arg(long)]
    scoped: bool,

    /// Check a repository (repeatable)
    #[arg(long, value_name = "KEY/SLUG")]
    select: Vec<RepoKey>,

    /// Uncheck a repository (repeatable)
    #[arg(long, value_name = "KEY/SLUG")]
    deselect: Vec<RepoKey>,

    /// Check every repository of a project (repeatable)
    #[arg(long, value_name = "KEY")]
    project: Vec<String>,

    /// Check every repository of a group: org or personal (repeatable)
    #[arg(long, value_name = "GROUP")]
    group: Vec<GroupKind>,
}

impl Selection {
    fn apply(&self, engine: &mut Engine) -> Result<(), ScopeError> {
        if self.global {
            engine.set_global(true);
        }
        if self.scoped {
            engine.set_global(false);
        }
        for key in &self.select {
            engine.toggle_repository(key, true)?;
        }
        for project in &self.project {
            engine.toggle_project(project, true)?;
        }
        for kind in &self.group {
            engine.toggle_group(*kind, true);
        }
        for key in &self.deselect {
            engine.toggle_repository(key, false)?;
        }
        Ok(())
    }
}

/// Surface a library error with its catalogue code and remediation steps.
fn report(err: ScopeError) -> anyhow::Error {
    let steps: String = err
        .code()
        .remediation()
        .iter()
        .map(|step| format!("\n  - {step}"))
        .collect();
    anyhow!("{}{}", err.banner(), steps)
}

fn build_engine(cli: &Cli, config: &ScopeConfig) -> Result<Engine> {
    let client = || RestClient::from_config(&config.server).map_err(report);

    let (provider, store): (CatalogSource, Arc<dyn CacheStore>) = match &cli.catalog_file {
        // A local catalog never lands in the shared cache file.
        Some(path) => (
            CatalogSource::File(FileCatalogProvider::new(path)),
            Arc::new(MemoryCacheStore::new()),
        ),
        None => {
            let store: Arc<dyn CacheStore> = match &config.catalog.cache_path {
                _ if cli.no_cache => Arc::new(DisabledCacheStore),
                Some(path) => {
                    debug!("Catalog cache at {:?}", path);
                    Arc::new(FileCacheStore::new(path))
                }
                None => Arc::new(MemoryCacheStore::new()),
            };
            (CatalogSource::Rest(RestCatalogProvider::new(client()?)), store)
        }
    };

    let persistence = match &cli.overrides_file {
        Some(path) => {
            let file = FileScopePersistence::new(path).with_author(std::env::var("USER").ok());
            debug!("Scope file at {:?}", file.path());
            ScopeSource::File(file)
        }
        None => ScopeSource::Rest(RestScopePersistence::new(client()?)),
    };

    let cache = CatalogCache::with_parts(
        Arc::new(provider),
        store,
        Arc::new(SystemClock),
        EventBus::default(),
        FetchSettings::from(&config.catalog),
    );
    Ok(ScopeEngine::new(cache, persistence, config.tree.clone()))
}

async fn run(cli: Cli, config: ScopeConfig) -> Result<()> {
    let mut engine = build_engine(&cli, &config)?;

    engine.load_catalog(cli.refresh).await.map_err(report)?;
    engine.load_scope().await.map_err(report)?;
    cli.command.selection().apply(&mut engine).map_err(report)?;

    match &cli.command {
        Commands::Tree { .. } => {
            let states = engine.tri_states();
            if cli.json {
                let body = serde_json::json!({
                    "mode": engine.state().mode(),
                    "tree": engine.tree(),
                    "states": states,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print!("{}", render::tree(engine.tree(), &states));
            }
        }
        Commands::Diff { .. } => {
            let rows = engine.diff();
            let summary = engine.summary();
            if cli.json {
                let body = serde_json::json!({ "rows": rows, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print!("{}", render::diff(&rows, &summary));
            }
        }
        Commands::Payload { .. } => {
            let payload = engine.save_payload();
            reposcope_common::reconcile::validate_payload(&payload).map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Save { .. } => {
            let pending = engine.summary();
            let rows = engine.save().await.map_err(report)?;
            info!("Saved ({})", pending);
            if cli.json {
                let body = serde_json::json!({
                    "mode": engine.state().mode(),
                    "rows": rows,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Scope saved: {}", engine.state().mode());
                print!("{}", render::diff(&rows, &engine.summary()));
            }
        }
    }
    Ok(())
}

/// `[general] log_level` from the loaded config; `--verbose` wins.
fn log_config(cli: &Cli, config: &ScopeConfig) -> LogConfig {
    let log_config = LogConfig::from_config(&config.general).with_stderr();
    if cli.verbose {
        log_config.with_level("debug")
    } else {
        log_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ScopeConfig::load(cli.config.as_deref())
        .map_err(report)
        .context("failed to load configuration")?;
    init_logging(&log_config(&cli, &config));

    run(cli, config).await
}
