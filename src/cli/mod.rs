use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::{App, ErrorBoundary};
use crate::config::{ConfigLoader, ENV_CONFIG, ENV_DATA};
use crate::storage::{self, Persistence};

pub mod commands;

use self::commands::{
    AreaArgs, ChatArgs, DiagramArgs, ExportArgs, NoteArgs, NotebookArgs, RenameArgs, StackArgs,
    SyncArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Hierarchical notes: areas, stacks, notebooks and rich-text notes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over STRATA_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over STRATA_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Show full error chains when a view fails
    #[arg(long, global = true)]
    pub dev: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the workspace tree (default)
    Tree,
    /// Manage areas
    Area(AreaArgs),
    /// Manage stacks inside an area
    Stack(StackArgs),
    /// Manage notebooks inside a stack
    Notebook(NotebookArgs),
    /// Create, show, edit and delete notes
    Note(NoteArgs),
    /// Rename an area, stack or notebook
    Rename(RenameArgs),
    /// Export notes as Markdown files
    Export(ExportArgs),
    /// Publish notes to the remote drive
    Sync(SyncArgs),
    /// Diagram templates and insertion
    Diagram(DiagramArgs),
    /// Ask a configured AI provider
    Chat(ChatArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(ENV_CONFIG, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(ENV_DATA, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let mut config = loader.load_or_init()?;
    config.dev_mode |= cli.dev;

    let persistence = match storage::init(&config.storage) {
        Ok(store) => Persistence::new(Arc::new(store)),
        Err(err) => {
            tracing::warn!(error = ?err, "storage unavailable, changes will not be saved");
            Persistence::unavailable()
        }
    };

    let config = Arc::new(config);
    let mut boundary = ErrorBoundary::new(config.dev_mode);
    let mut app = App::new(config, paths, persistence);
    let command = cli.command.unwrap_or(Commands::Tree);
    match command {
        Commands::Tree => commands::print_tree(&app, &mut boundary),
        Commands::Area(args) => commands::handle_area_command(&mut app, args),
        Commands::Stack(args) => commands::handle_stack_command(&mut app, args),
        Commands::Notebook(args) => commands::handle_notebook_command(&mut app, args),
        Commands::Note(args) => commands::handle_note_command(&mut app, &mut boundary, args),
        Commands::Rename(args) => commands::rename(&mut app, args),
        Commands::Export(args) => commands::export_notes(&app, args),
        Commands::Sync(args) => block_on(commands::sync(&mut app, args)),
        Commands::Diagram(args) => block_on(commands::handle_diagram_command(&mut app, args)),
        Commands::Chat(args) => block_on(commands::chat(&app, args)),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(future)
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .init();
        Ok(())
    })
    .map(|_| ())
}
