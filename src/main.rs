use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use backoffice_views::config::AppConfig;
use backoffice_views::db::{self, PgSource};
use backoffice_views::models::{FieldValue, Record};
use backoffice_views::notify::LogSink;
use backoffice_views::permissions::{self, PermissionOracle};
use backoffice_views::pipeline::Screen;
use backoffice_views::source::MutationOp;
use backoffice_views::{report, screens};

#[derive(Parser)]
#[command(name = "backoffice-views")]
#[command(about = "Expenses and Performance list views", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ./backoffice-views.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    module: String,
    #[arg(long)]
    section: String,
}

#[derive(Args)]
struct ViewArgs {
    #[command(flatten)]
    target: Target,
    /// Filter as key=value, e.g. statusFilter=completed (repeatable)
    #[arg(long = "filter", value_parser = parse_pair)]
    filters: Vec<(String, String)>,
    #[arg(long, default_value_t = 1)]
    page: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import records into a collection from a CSV file
    Import {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// List the sections of a module you may open
    Sections {
        #[arg(long)]
        module: String,
    },
    /// Print a screen with filters applied
    Show {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Write a screen to a markdown file
    Report {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Update fields of one record
    Update {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
        /// Field as key=value (repeatable)
        #[arg(long = "set", value_parser = parse_pair, required = true)]
        set: Vec<(String, String)>,
    },
    /// Delete one record
    Delete {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: Uuid,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_screen(
    target: &Target,
    config: &AppConfig,
    oracle: &dyn PermissionOracle,
    pool: PgPool,
) -> anyhow::Result<Screen> {
    let navigable = permissions::navigable_sections(
        oracle,
        &target.module,
        screens::sections(&target.module),
    );
    if !navigable.contains(&target.section.as_str()) {
        bail!(
            "no section {}/{} available; try `sections --module {}`",
            target.module,
            target.section,
            target.module
        );
    }

    let screen_config = screens::screen(&target.module, &target.section)
        .with_context(|| format!("unknown screen {}/{}", target.module, target.section))?
        .page_size(config.page_size);

    let mut screen = Screen::new(
        screen_config,
        Arc::new(PgSource::new(pool)),
        Arc::new(LogSink),
    )
    .with_retries(config.fetch_retries);

    // Failures are already reported through the sink; the view shows the
    // error state.
    let _ = screen.load().await;
    Ok(screen)
}

async fn render(
    view: &ViewArgs,
    config: &AppConfig,
    oracle: &dyn PermissionOracle,
    pool: PgPool,
) -> anyhow::Result<String> {
    let mut screen = open_screen(&view.target, config, oracle, pool).await?;
    for (key, value) in &view.filters {
        if !screen.config().filters.contains(key) {
            tracing::warn!(key = %key, "screen has no such filter; ignoring");
        }
        screen.set_filter(key, value);
    }
    screen.go_to_page(view.page);

    permissions::guard_view(oracle, &view.target.module, &view.target.section)?;
    Ok(report::build_report(
        screen.config(),
        screen.state(),
        screen.filter(),
        screen.view(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::discover(cli.config.as_deref()).context("failed to load config")?;
    let oracle = config.permissions();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new records).");
        }
        Commands::Import { collection, csv } => {
            let pool = connect(&config).await?;
            let inserted = db::import_csv(&pool, &collection, &csv).await?;
            println!("Inserted {inserted} records into {collection} from {}.", csv.display());
        }
        Commands::Sections { module } => {
            let visible =
                permissions::navigable_sections(&oracle, &module, screens::sections(&module));
            if visible.is_empty() {
                println!("No sections available in {module}.");
            }
            for section in visible {
                println!("- {section}");
            }
        }
        Commands::Show { view } => {
            let pool = connect(&config).await?;
            let output = render(&view, &config, &oracle, pool).await?;
            println!("{output}");
        }
        Commands::Report { view, out } => {
            let pool = connect(&config).await?;
            let output = render(&view, &config, &oracle, pool).await?;
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Update { target, id, set } => {
            permissions::guard_edit(&oracle, &target.module, &target.section)?;
            let pool = connect(&config).await?;
            let mut screen = open_screen(&target, &config, &oracle, pool).await?;

            let mut patch = Record::new(id);
            for (field, value) in &set {
                patch.fields.insert(field.clone(), FieldValue::parse(value));
            }
            screen
                .mutate(MutationOp::Update, patch, &format!("Updated {id}."))
                .await
                .with_context(|| format!("failed to update {id}"))?;
        }
        Commands::Delete { target, id } => {
            permissions::guard_edit(&oracle, &target.module, &target.section)?;
            let pool = connect(&config).await?;
            let mut screen = open_screen(&target, &config, &oracle, pool).await?;
            screen
                .mutate(MutationOp::Delete, Record::new(id), &format!("Deleted {id}."))
                .await
                .with_context(|| format!("failed to delete {id}"))?;
        }
    }

    Ok(())
}
