//! Point d'entrée CLI pour gmlscan

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::{Commands, ScanArgs};

/// Inspecter un document GML: schéma des classes, statistiques, features
#[derive(Parser)]
#[command(name = "gmlscan")]
#[command(author, version)]
#[command(about = "Inspecter un document GML : classes découvertes, comptes, étendues")]
#[command(
    long_about = "Parcourt un document GML en streaming pour découvrir ses classes de features.\n\nPar défaut, effectue un prescan et affiche le schéma par classe. Utilisez 'dump' pour lister les features."
)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: scan du schéma)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments du scan (commande par défaut)
    #[command(flatten)]
    scan: Option<ScanArgs>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Dump {
            path,
            class,
            limit,
            push,
        }) => {
            cli::cmd_dump(&path, class.as_deref(), limit, push)?;
        }
        None => {
            let args = cli.scan.expect("Arguments de scan requis (--path)");
            cli::cmd_scan(&args)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
