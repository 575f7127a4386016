//! JournalSync - copy a Monica journal into a Zim notebook
//!
//! Fetches journal entries from a Monica instance (through a local response
//! cache), groups them by date and writes one plaintext Zim page per date.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journalsync::app::App;
use journalsync::cli::{Cli, Command};
use journalsync::config::Config;

/// Sets up log output; `RUST_LOG` overrides the verbosity flags
fn init_tracing(cli: &Cli) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Secrets may be provided through a .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli);

    let config = Config::load(&cli.config, &cli.secrets)?;
    let mut app = App::new(config);
    if cli.no_cache {
        app = app.without_cache();
    }

    match cli.command() {
        Command::Sync => {
            let report = app.sync().await?;
            let entries: usize = report.dates.iter().map(|(_, n)| n).sum();
            println!(
                "Monica journal has {} dates ({} entries)",
                report.dates.len(),
                entries
            );
            for path in &report.written {
                println!("\t{}", path.display());
            }
            println!("Wrote {} pages", report.written.len());
        }
        Command::List => {
            let journal = app.load_journal().await?;
            println!("Monica journal has {} dates:", journal.len());
            for bucket in journal.buckets() {
                println!("\t{}: {} entries", bucket.date().date(), bucket.len());
            }
        }
        Command::Titles => {
            for (date, titles) in app.titles().await? {
                println!("{}", date.date());
                for title in titles {
                    println!("\t{}", title);
                }
            }
        }
        Command::Check => {
            if app.check_api().await? {
                println!("API reachable at {}", app.config().api_url);
            } else {
                return Err(format!("Unexpected response from {}", app.config().api_url).into());
            }
        }
        Command::Pages => {
            let pages = app.pages()?;
            println!("Notebook has {} journal pages:", pages.len());
            for (date, path) in pages {
                println!("\t{}: {}", date, path.display());
            }
        }
    }

    Ok(())
}
