use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "movierec-server")]
#[command(about = "Movie recommendation web site", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "movierec.yaml")]
    config: String,

    /// Log as JSON lines instead of plain text.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations and serve (the default).
    Serve,
    /// Apply pending migrations and exit.
    Migrate,
    /// List migrations and whether they are applied.
    Showmigrations,
    /// Import movies from a JSON file of TMDB records.
    Import { file: PathBuf },
    /// Delete a movie by its TMDB id.
    RemoveMovie { id: i64 },
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "movierec=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn execute(args: Args) -> Result<(), movierec::ServerError> {
    let config = movierec::load_config(&args.config, args.json_logs)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => movierec::run(config).await,
        Command::Migrate => {
            let applied = movierec::migrate(&config).await?;
            if applied.is_empty() {
                println!("No migrations to apply.");
            }
            for id in applied {
                println!("Applied {}", id);
            }
            Ok(())
        }
        Command::Showmigrations => {
            for line in movierec::show_migrations(&config).await? {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Import { file } => {
            let summary = movierec::import(&config, &file).await?;
            println!("Imported {} movies, skipped {}", summary.imported, summary.skipped);
            Ok(())
        }
        Command::RemoveMovie { id } => {
            let movie = movierec::remove_movie(&config, id).await?;
            println!("Removed {} ({})", movie.title, movie.id);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.json_logs);

    if let Err(e) = execute(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
