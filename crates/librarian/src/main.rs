//! librarian: Continuous vault indexer
//!
//! The librarian keeps a property graph in sync with a vault of Markdown
//! notes, source code, and assets, and renders the graph as diagrams.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use librarian_graph::store::RecordingExecutor;
use librarian_graph::{
    Classifier, Detail, Exporter, Filter, FullScanner, GraphStore, Indexer, ScanCounts,
    VaultConfig, VaultWatcher,
};

/// Keeps a property graph in sync with a vault of notes and code
#[derive(Parser)]
#[command(name = "librarian")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .librarian directory or config file (default: search for .librarian/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .librarian directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run one full scan of the vault
    Scan {
        /// Worker threads (default: from config, 0 = CPU count)
        #[arg(long)]
        workers: Option<usize>,

        /// Print the statements instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Keep the graph in sync until interrupted
    Watch {
        /// Skip the initial full scan
        #[arg(long)]
        no_scan: bool,
    },

    /// Write every diagram and report
    Export {
        /// Output directory (default: export.out_dir from config)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Detail level: low, medium, high
        #[arg(long)]
        detail: Option<Detail>,

        /// Relationship filter: all, internal, external
        #[arg(long)]
        filter: Option<Filter>,

        /// Maximum path length followed from --focus
        #[arg(long)]
        depth: Option<usize>,

        /// Path prefix to center the export on
        #[arg(long)]
        focus: Option<String>,

        /// Node labels to keep (comma separated)
        #[arg(long, value_delimiter = ',')]
        node_types: Vec<String>,

        /// Relationship types to keep (comma separated)
        #[arg(long, value_delimiter = ',')]
        rel_types: Vec<String>,
    },

    /// Print graph statistics
    Stats,

    /// Print notes nothing links to
    Orphans,

    /// Print notes linking to a note
    Backlinks {
        /// Note name, e.g. "Project Plan"
        name: String,
    },

    /// Print notes with a tag
    Tag {
        /// Tag, with or without the leading '#'
        tag: String,
    },

    /// Run a raw query and print the rows as JSON
    Query {
        /// Cypher statement
        cypher: String,
    },
}

/// Initialize logging for one-shot commands.
/// Logs to stderr for interactive use.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Initialize logging for `watch`.
/// Logs to rotating files in .librarian/logs/ with daily rotation.
fn init_file_logging(librarian_dir: &Path, verbose: bool) {
    let logs_dir = librarian_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "librarian.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .init();
}

/// Load config from an explicit path or auto-discover `.librarian/config.toml`.
///
/// Returns the config and the `.librarian` directory it came from.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let librarian_dir = config_file.parent().unwrap_or(path).to_path_buf();
        let config = Config::from_file(&config_file)?;
        return Ok((config, Some(librarian_dir)));
    }

    match Config::find_and_load() {
        Ok(Some((config, librarian_dir))) => Ok((config, Some(librarian_dir))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("Warning: error searching for config: {}, using defaults", e);
            Ok((Config::default(), None))
        }
    }
}

/// Resolved configuration shared by the commands.
struct Workspace {
    config: Config,
    librarian_dir: Option<PathBuf>,
    vault_root: PathBuf,
}

impl Workspace {
    fn load(override_path: Option<&PathBuf>) -> Result<Self> {
        let (config, librarian_dir) = load_config(override_path)?;

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                eprintln!("config error: {}", error);
            }
            anyhow::bail!("Invalid configuration ({} errors)", errors.len());
        }

        let vault_root = config.resolve_vault_root(librarian_dir.as_deref());
        let vault_root = vault_root
            .canonicalize()
            .with_context(|| format!("Vault root not found: {}", vault_root.display()))?;
        Ok(Self {
            config,
            librarian_dir,
            vault_root,
        })
    }

    fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            root: self.vault_root.clone(),
            ..self.config.vault.clone()
        }
    }

    fn librarian_dir(&self) -> PathBuf {
        self.librarian_dir
            .clone()
            .unwrap_or_else(|| self.vault_root.join(config::LIBRARIAN_DIR))
    }

    /// Connect to the graph server. Failing here is fatal.
    fn open_store(&self) -> Result<Arc<GraphStore>> {
        let address = self.config.graph.address();
        let store = GraphStore::connect(&address, self.config.graph.name.clone())
            .with_context(|| format!("Failed to connect to graph server at {}:{}", address.host, address.port))?;
        store
            .ensure_indexes()
            .context("Failed to create graph indexes")?;
        info!("Connected to graph '{}' at {}:{}", self.config.graph.name, address.host, address.port);
        Ok(Arc::new(store))
    }

    fn indexer(&self, store: Arc<GraphStore>) -> Result<Arc<Indexer>> {
        let classifier =
            Classifier::new(&self.vault_config()).context("Invalid vault configuration")?;
        Ok(Arc::new(Indexer::new(store, classifier)))
    }

    fn scanner(&self, indexer: Arc<Indexer>, workers: Option<usize>) -> FullScanner {
        FullScanner::new(indexer).with_workers(workers.unwrap_or(self.config.scan.workers))
    }
}

fn print_counts(counts: &ScanCounts) {
    println!(
        "Scanned {} files in {:.2}s: {} notes, {} code, {} assets ({} failed, {} ignored)",
        counts.synced(),
        counts.elapsed.as_secs_f64(),
        counts.notes,
        counts.code,
        counts.assets,
        counts.failed,
        counts.ignored
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Init needs neither a vault nor a server.
        Commands::Init { force } => {
            init_logging(cli.verbose);
            run_init(force)
        }
        command => {
            if matches!(command, Commands::Watch { .. }) {
                // Logging goes to a file; find the directory first.
                let (_, librarian_dir) = load_config(cli.config.as_ref())?;
                let dir = librarian_dir.unwrap_or_else(|| PathBuf::from(config::LIBRARIAN_DIR));
                init_file_logging(&dir, cli.verbose);
            } else {
                init_logging(cli.verbose);
            }
            let workspace = Workspace::load(cli.config.as_ref())?;
            run(command, &workspace).await
        }
    }
}

async fn run(command: Commands, workspace: &Workspace) -> Result<()> {
    match command {
        Commands::Init { force } => run_init(force)?,

        Commands::Scan { workers, dry_run } => {
            if dry_run {
                let executor = Arc::new(RecordingExecutor::new());
                let store = Arc::new(GraphStore::new(
                    executor.clone(),
                    workspace.config.graph.name.clone(),
                ));
                let indexer = workspace.indexer(store)?;
                let counts = workspace.scanner(indexer, workers).full_scan()?;
                for statement in executor.statements() {
                    println!("{}", statement);
                }
                print_counts(&counts);
            } else {
                let store = workspace.open_store()?;
                let indexer = workspace.indexer(store)?;
                let counts = workspace.scanner(indexer, workers).full_scan()?;
                print_counts(&counts);
            }
        }

        Commands::Watch { no_scan } => {
            let store = workspace.open_store()?;
            let indexer = workspace.indexer(store)?;

            if workspace.config.scan.on_start && !no_scan {
                let scanner = workspace.scanner(indexer.clone(), None);
                let counts = tokio::task::spawn_blocking(move || scanner.full_scan()).await??;
                print_counts(&counts);
            }

            let watcher = VaultWatcher::new(indexer, workspace.config.vault.debounce());
            watcher.start()?;
            println!(
                "Watching {} (logs in {}). Press Ctrl-C to stop.",
                workspace.vault_root.display(),
                workspace.librarian_dir().join("logs").display()
            );

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping watcher");
            watcher.stop();
        }

        Commands::Export {
            out,
            detail,
            filter,
            depth,
            focus,
            node_types,
            rel_types,
        } => {
            let mut options = workspace.config.export.options()?;
            if let Some(detail) = detail {
                options.detail = detail;
            }
            if let Some(filter) = filter {
                options.filter = filter;
            }
            if let Some(depth) = depth {
                options.depth = depth;
            }
            if focus.is_some() {
                options.focus = focus;
            }
            if !node_types.is_empty() {
                options.node_types = node_types;
            }
            if !rel_types.is_empty() {
                options.rel_types = rel_types;
            }

            let out_dir = match out {
                Some(dir) => dir,
                None => workspace.config.resolve_out_dir(&workspace.vault_root),
            };
            let store = workspace.open_store()?;
            let written = Exporter::new(store, options).export_all(&out_dir)?;
            for path in written {
                println!("{}", path.display());
            }
        }

        Commands::Stats => {
            let stats = workspace.open_store()?.get_stats()?;
            println!("Notes:            {}", stats.notes);
            println!("Links:            {}", stats.links);
            println!("Tags:             {}", stats.tags);
            println!("Code files:       {}", stats.code);
            println!("External modules: {}", stats.modules);
            println!("Assets:           {}", stats.assets);
        }

        Commands::Orphans => {
            for note in workspace.open_store()?.get_orphans()? {
                println!("{}", note.path);
            }
        }

        Commands::Backlinks { name } => {
            for note in workspace.open_store()?.get_backlinks(&name)? {
                println!("{}", note.path);
            }
        }

        Commands::Tag { tag } => {
            for note in workspace.open_store()?.get_notes_by_tag(&tag)? {
                println!("{}", note.path);
            }
        }

        Commands::Query { cypher } => {
            let result = workspace.open_store()?.query(&cypher)?;
            println!("{}", serde_json::to_string_pretty(&result.records())?);
            for line in &result.stats {
                eprintln!("{}", line);
            }
        }
    }

    Ok(())
}

fn run_init(force: bool) -> Result<()> {
    let librarian_dir = PathBuf::from(config::LIBRARIAN_DIR);
    let config_path = librarian_dir.join(config::CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(".librarian/config.toml already exists. Use --force to overwrite.");
    }

    if !librarian_dir.exists() {
        std::fs::create_dir_all(&librarian_dir)?;
        info!("Created {}/", librarian_dir.display());
    }

    std::fs::write(&config_path, Config::default_toml())?;
    info!("Created {}", config_path.display());
    info!("Next steps:");
    info!("  1. Edit .librarian/config.toml to point at your vault and graph server");
    info!("  2. Run 'librarian scan' to build the graph");
    info!("  3. Run 'librarian watch' to keep it in sync");
    Ok(())
}
