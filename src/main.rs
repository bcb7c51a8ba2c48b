use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::{Parser, Subcommand};

use notedeck::{NotesConfig, NotesWatcher, PathSpec, Session, TextRenderer};

#[derive(Debug, Parser)]
#[command(name = "notedeck", version, about = "Browse and filter a collection of plain-text notes")]
struct Cli {
    /// YAML configuration file (default: ~/.config/notedeck/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Note directory; repeat to use several. Replaces the configured list.
    #[arg(short = 'd', long = "dir", global = true)]
    dirs: Vec<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the note list, newest first
    List {
        #[arg(long)]
        filter: Option<String>,
        /// Search index query (requires `index.enabled`)
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Create a note in the first directory
    New { title: Option<String> },
    /// Print the list again whenever notes change on disk
    Watch {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Drop cached metadata for deleted notes
    Gc,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> notedeck::Result<NotesConfig> {
    let mut config = match &cli.config {
        Some(path) => NotesConfig::load(path)?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => NotesConfig::load(&path)?,
            None => NotesConfig::default(),
        },
    };
    if !cli.dirs.is_empty() {
        config.directories = cli.dirs.iter().map(|d| PathSpec::from(d.as_path())).collect();
    }
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/notedeck/config.yaml"))
}

fn run(cli: Cli) -> notedeck::Result<()> {
    let config = load_config(&cli)?;
    let mut session = Session::from_config(config)?;

    match cli.command {
        Commands::List { filter, query, json } => {
            let stdout = io::stdout().lock();
            let mut renderer = if json {
                TextRenderer::json(stdout)
            } else {
                TextRenderer::new(stdout)
            };
            session.query_changed(query.as_deref());
            session.filter_changed(filter.as_deref());
            session.flush_if_observable(true, &mut renderer)?;
        }
        Commands::New { title } => {
            let path = session.new_note(title.as_deref(), None)?;
            println!("{}", path.display());
        }
        Commands::Watch { filter } => {
            let mut renderer = TextRenderer::new(io::stdout());
            session.filter_changed(filter.as_deref());
            session.flush_if_observable(true, &mut renderer)?;

            let (tx, rx) = mpsc::channel();
            let _watcher = NotesWatcher::start(session.directories(), session.scanner().clone(), tx)?;
            while let Ok(change) = rx.recv() {
                session.apply_change(change);
                // Coalesce whatever else arrived during the refresh.
                while let Ok(change) = rx.try_recv() {
                    session.apply_change(change);
                }
                session.collect_garbage();
                println!();
                session.flush_if_observable(true, &mut renderer)?;
            }
        }
        Commands::Gc => {
            session.refresh();
            for path in session.collect_garbage() {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
