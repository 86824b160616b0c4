use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod classes;
mod config;
mod db;
mod error;
mod fetch;
#[cfg(test)]
mod fixtures;
mod kpi;
mod models;
mod pipeline;
mod report;
mod risk;
mod students;

use crate::config::{AppConfig, LogConfig};
use crate::fetch::{RecordSource, Snapshot};
use crate::models::TeacherDashboard;

#[derive(Parser)]
#[command(name = "eduthink-teacher-results")]
#[command(about = "Per-teacher class results, alerts and KPIs for EduThink", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo teacher with two classes
    Seed,
    /// Print KPIs, class metrics and students needing attention
    Summary {
        #[arg(long)]
        user_id: Uuid,
        /// Read a frozen snapshot instead of the database
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export one CSV row per student result
    Export {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long, default_value = "results.csv")]
        out: PathBuf,
    },
    /// Dump the teacher's fetched records as a JSON snapshot
    Snapshot {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long, default_value = "snapshot.json")]
        out: PathBuf,
    },
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_source(
    config: &AppConfig,
    snapshot: Option<&Path>,
) -> anyhow::Result<Box<dyn RecordSource>> {
    match snapshot {
        Some(path) => {
            info!(path = %path.display(), "reading frozen snapshot");
            Ok(Box::new(Snapshot::load(path)?))
        }
        None => Ok(Box::new(db::PgSource::new(connect(config).await?))),
    }
}

async fn load_dashboard(
    config: &AppConfig,
    user_id: Uuid,
    snapshot: Option<&Path>,
) -> anyhow::Result<TeacherDashboard> {
    let source = open_source(config, snapshot).await?;
    let (teacher, records) = fetch::fetch_records(source.as_ref(), user_id)
        .await
        .context("could not load your data")?;
    Ok(pipeline::build_dashboard(&teacher, &records))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.log);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted. Demo teacher user id: {}", db::demo_user_id());
        }
        Commands::Summary {
            user_id,
            snapshot,
            json,
            limit,
        } => {
            let dashboard = load_dashboard(&config, user_id, snapshot.as_deref()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
                return Ok(());
            }

            let kpis = &dashboard.kpis;
            println!("Results for {}:", dashboard.teacher.full_name());
            println!(
                "{} classes, overall average {}, participation {}%, {} at risk, {} quizzes pending review",
                kpis.total_classes,
                kpis.overall_average
                    .map_or_else(|| "-".to_string(), |avg| format!("{avg:.2}")),
                kpis.avg_participation,
                kpis.at_risk_count,
                kpis.pending_review_count
            );

            for line in report::class_lines(&dashboard) {
                println!("{line}");
            }

            if dashboard.attention.is_empty() {
                println!("No students need attention.");
                return Ok(());
            }

            println!("Students needing attention:");
            for entry in dashboard.attention.iter().take(limit) {
                println!(
                    "- {} ({}, {}) average {} with {} pending quizzes",
                    entry.student_name,
                    entry.group_label,
                    entry.subject_name,
                    entry
                        .average_score
                        .map_or_else(|| "-".to_string(), |avg| format!("{avg:.2}")),
                    entry.pending_quizzes
                );
            }
        }
        Commands::Report {
            user_id,
            snapshot,
            out,
        } => {
            let dashboard = load_dashboard(&config, user_id, snapshot.as_deref()).await?;
            std::fs::write(&out, report::build_report(&dashboard))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            user_id,
            snapshot,
            out,
        } => {
            let dashboard = load_dashboard(&config, user_id, snapshot.as_deref()).await?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let rows = report::write_student_csv(file, &dashboard)?;
            println!("Exported {rows} student results to {}.", out.display());
        }
        Commands::Snapshot { user_id, out } => {
            let source = db::PgSource::new(connect(&config).await?);
            let (teacher, records) = fetch::fetch_records(&source, user_id)
                .await
                .context("could not load your data")?;
            Snapshot::from_records(teacher, records).save(&out)?;
            println!("Snapshot written to {}.", out.display());
        }
    }

    Ok(())
}
