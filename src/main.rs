use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskmill::recurrence::{GenerationConfig, RecurrenceEngine};
use taskmill::{api, db, scheduler};

#[derive(Parser)]
#[command(name = "taskmill")]
#[command(about = "Personal task backend with recurring task generation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the taskmill server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },
    /// Run one recurring-task generation pass and exit
    Generate {
        /// Reference day (YYYY-MM-DD); defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "taskmill=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Generate { date }) => {
            let db = db::Database::open_default()?;
            db.migrate()?;

            let engine = RecurrenceEngine::new(db, GenerationConfig::from_env());
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = engine.run(today)?;
            println!(
                "{}: {} eligible, {} instances created, {} failed",
                today, report.eligible_parents, report.instances_created, report.failed_parents
            );
        }
        Some(Commands::Serve { port }) => serve(port).await?,
        None => serve(5000).await?,
    }

    Ok(())
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting taskmill server on port {}", port);

    let db = db::Database::open_default()?;
    db.migrate()?;

    let engine = RecurrenceEngine::new(db.clone(), GenerationConfig::from_env());
    scheduler::spawn(engine);

    let app = api::create_router(db);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("taskmill server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}
