//! CLI mode for pwa-cache: drive the lifecycle from the command line.

mod progress;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::config::AppConfig;
use crate::controller::OfflineCacheController;
use crate::error::{Error, Result};
use crate::fetch::HttpFetcher;
use crate::graph::{LabelOptions, NetworkGraph};
use crate::payload::{
    self, MapMarker, ORGANISATION_RELATIONSHIP_SET, ORGANISATION_SET, OrganisationRecord,
    PERSON_SET, PersonRecord, RELATIONSHIP_SET, RelationshipRecord,
};
use crate::request::{Method, Request};
use crate::state::WorkerRecord;
use crate::storage::{CacheStorage, DiskStorage};
use crate::worker::{self, WorkerHandle, WorkerOptions};

use progress::{
    make_spinner, print_activate_summary, print_graph_summary, print_install_summary,
    print_markers, print_status,
};

const GENERATIONS_DIR: &str = "generations";

/// Offline cache controller for the Breccia Mapper web app.
#[derive(Debug, Parser)]
#[command(name = "pwa-cache", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ./pwa-cache.toml if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the cache directory from the configuration.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch every manifest asset into the current generation.
    Install,
    /// Evict stale generations and take control.
    Activate,
    /// Install, then activate.
    Run,
    /// Answer one request cache-first.
    Fetch {
        /// Request path, e.g. /css/django-pwa-app.css
        path: String,
        /// HTTP method; only GET is answered from the cache.
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Write the body here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the current generation and what is on disk.
    Status,
    /// Serve every request cache-first over HTTP.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Build the relationship graph from saved page payloads.
    Graph {
        /// Directory holding `person-set-data.json` and friends.
        dir: PathBuf,
        #[arg(long)]
        hide_organisations: bool,
        #[arg(long)]
        anonymise_people: bool,
        #[arg(long)]
        anonymise_organisations: bool,
    },
    /// List the organisation map pins from a saved payload.
    Markers {
        file: PathBuf,
    },
}

type DiskController = OfflineCacheController<DiskStorage, HttpFetcher>;

/// Builds a controller over the on-disk cache, picking up a generation a
/// previous invocation installed.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub async fn build_controller(config: &AppConfig) -> Result<DiskController> {
    let storage = DiskStorage::new(config.paths.cache_dir.join(GENERATIONS_DIR));
    let fetcher = HttpFetcher::from_config(&config.origin)?;
    let mut controller = OfflineCacheController::new(config.cache.clone(), storage, fetcher)?;
    let state = controller.restore().await?;
    log::debug!("controller for {} restored as {state}", controller.current());
    Ok(controller)
}

struct Session {
    handle: WorkerHandle,
    join: tokio::task::JoinHandle<DiskController>,
}

impl Session {
    async fn start(config: &AppConfig) -> Result<Self> {
        let controller = build_controller(config).await?;
        let (handle, join) = worker::spawn(
            controller,
            WorkerOptions {
                record_dir: Some(config.paths.cache_dir.clone()),
            },
        );
        Ok(Self { handle, join })
    }

    async fn finish(self) -> Result<DiskController> {
        self.handle.shutdown();
        self.join
            .await
            .map_err(|e| Error::InvalidState(format!("worker task failed: {e}")))
    }
}

async fn install(config: &AppConfig) -> Result<()> {
    let session = Session::start(config).await?;
    let spinner = make_spinner("installing");
    let result = session.handle.install().await;
    spinner.finish_and_clear();
    session.finish().await?;
    print_install_summary(&result?);
    Ok(())
}

async fn activate(config: &AppConfig) -> Result<()> {
    let session = Session::start(config).await?;
    let spinner = make_spinner("activating");
    let result = session.handle.activate().await;
    spinner.finish_and_clear();
    session.finish().await?;
    match result {
        Ok(report) => {
            print_activate_summary(&report);
            Ok(())
        }
        Err(Error::InvalidState(reason)) => Err(Error::InvalidState(format!(
            "{reason}; run `pwa-cache install` first, or `pwa-cache run` when the version \
             changes on every start"
        ))),
        Err(e) => Err(e),
    }
}

async fn run_lifecycle(config: &AppConfig) -> Result<()> {
    let session = Session::start(config).await?;
    let spinner = make_spinner("installing and activating");
    let result = session.handle.start().await;
    spinner.finish_and_clear();
    session.finish().await?;
    let (installed, activated) = result?;
    print_install_summary(&installed);
    print_activate_summary(&activated);
    Ok(())
}

async fn fetch(
    config: &AppConfig,
    path: &str,
    method: &str,
    output: Option<&Path>,
) -> Result<()> {
    let method =
        Method::parse(method).ok_or_else(|| Error::Config(format!("unknown method {method}")))?;
    let session = Session::start(config).await?;
    let result = session.handle.fetch(Request::new(method, path)).await;
    session.finish().await?;
    let outcome = result?;

    eprintln!(
        "{} {} ({})",
        outcome.response.status,
        outcome.response.url,
        outcome.served_from.as_str()
    );
    match output {
        Some(path) => tokio::fs::write(path, &outcome.response.body).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&outcome.response.body).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn status(config: &AppConfig) -> Result<()> {
    let session = Session::start(config).await?;
    let result = session.handle.status().await;
    let controller = session.finish().await?;
    let status = result?;

    let generations: Vec<String> = controller
        .storage()
        .keys()
        .await?
        .into_iter()
        .map(|name| name.as_str().to_string())
        .collect();
    let record = WorkerRecord::load(&config.paths.cache_dir)?;
    print_status(&status, record.as_ref(), &generations);
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let session = Session::start(config).await?;
    // A failed install leaves the previous generation serving.
    match session.handle.start().await {
        Ok((installed, activated)) => {
            print_install_summary(&installed);
            print_activate_summary(&activated);
        }
        Err(e) => log::error!("lifecycle failed, serving what is cached: {e}"),
    }
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    crate::server::run_server(&host, port, session.handle.clone()).await?;
    session.finish().await?;
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn serve(_config: &AppConfig, _host: Option<String>, _port: Option<u16>) -> Result<()> {
    Err(Error::Config("server support not compiled in".into()))
}

async fn read_payload<T: serde::de::DeserializeOwned>(dir: &Path, id: &str) -> Result<Vec<T>> {
    let path = dir.join(format!("{id}.json"));
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    payload::parse(&text)
}

#[derive(Serialize)]
struct NodeView<'a> {
    id: &'a str,
    label: &'a str,
    size: usize,
    colour: &'static str,
    shape: &'static str,
}

#[derive(Serialize)]
struct GraphView<'a> {
    nodes: Vec<NodeView<'a>>,
    edges: &'a [crate::graph::Edge],
}

async fn graph(dir: &Path, hide_organisations: bool, labels: LabelOptions) -> Result<()> {
    let people: Vec<PersonRecord> = read_payload(dir, PERSON_SET).await?;
    let organisations: Vec<OrganisationRecord> = read_payload(dir, ORGANISATION_SET).await?;
    let relationships: Vec<RelationshipRecord> = read_payload(dir, RELATIONSHIP_SET).await?;
    let organisation_relationships: Vec<RelationshipRecord> =
        read_payload(dir, ORGANISATION_RELATIONSHIP_SET).await?;

    let mut graph = NetworkGraph::build(
        &people,
        &organisations,
        &relationships,
        &organisation_relationships,
    );
    if hide_organisations {
        graph = graph.without_organisations();
    }

    let view = GraphView {
        nodes: graph
            .nodes()
            .map(|node| NodeView {
                id: &node.id,
                label: graph.label(node, labels),
                size: graph.node_size(&node.id),
                colour: node.colour,
                shape: node.shape,
            })
            .collect(),
        edges: graph.edges(),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    print_graph_summary(&graph);
    Ok(())
}

async fn markers(file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file).await?;
    let markers: Vec<MapMarker> = payload::parse(&text)?;
    print_markers(&markers);
    Ok(())
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns the error of the command that failed.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.paths.cache_dir = dir;
    }

    match cli.command {
        Command::Install => install(&config).await,
        Command::Activate => activate(&config).await,
        Command::Run => run_lifecycle(&config).await,
        Command::Fetch {
            path,
            method,
            output,
        } => fetch(&config, &path, &method, output.as_deref()).await,
        Command::Status => status(&config).await,
        Command::Serve { host, port } => serve(&config, host, port).await,
        Command::Graph {
            dir,
            hide_organisations,
            anonymise_people,
            anonymise_organisations,
        } => {
            let labels = LabelOptions {
                anonymise_people,
                anonymise_organisations,
            };
            graph(&dir, hide_organisations, labels).await
        }
        Command::Markers { file } => markers(&file).await,
    }
}
