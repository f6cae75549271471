use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use success_tracker::client::{HttpTransport, RecordsClient, Transport};
use success_tracker::config::TrackerConfig;
use success_tracker::status::StatusMapper;
use success_tracker::report;
use success_tracker::tracker::{FetchFailure, Session, Snapshot, Tracker};

#[derive(Parser)]
#[command(name = "success-tracker")]
#[command(about = "Student GPA and attendance tracker over the institutional records API", long_about = None)]
struct Cli {
    /// TOML file with colors, thresholds and term exclusions
    #[arg(long, env = "SUCCESS_TRACKER_CONFIG", global = true)]
    config: Option<PathBuf>,
    #[arg(long, env = "SUCCESS_TRACKER_BASE_URL", global = true)]
    base_url: Option<String>,
    #[arg(long, env = "SUCCESS_TRACKER_CARD_ID", global = true, default_value = "")]
    card_id: String,
    #[arg(long, env = "SUCCESS_TRACKER_API_TOKEN", global = true, hide_env_values = true)]
    api_token: Option<String>,
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// List the student's terms, oldest first
    Terms,
    /// Print the tracker card for a term
    Summary {
        #[arg(long)]
        term: Option<String>,
    },
    /// Write the tracker card to a file
    Report {
        #[arg(long)]
        term: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long, default_value = "success-tracker.md")]
        out: PathBuf,
    },
    /// Chart term GPA across every term
    History,
    /// Look up attendance for one section
    Section {
        #[arg(long)]
        term: String,
        #[arg(long)]
        section_id: String,
    },
    /// Look up grade and credit detail for one course
    Performance {
        #[arg(long)]
        term: String,
        #[arg(long)]
        crn: String,
    },
    /// Show term information, the latest term when none is given
    Info {
        #[arg(long)]
        term: Option<String>,
    },
    /// Read term codes from stdin and reload on every line
    Watch,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    let base_url = cli
        .base_url
        .as_deref()
        .context("SUCCESS_TRACKER_BASE_URL must point at the student records API")?;
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(base_url, cli.api_token.as_deref(), config.request_timeout())
            .context("failed to build http transport")?,
    );
    let client = RecordsClient::new(transport, cli.card_id.clone());
    let tracker = Tracker::new(
        client,
        config.aggregator(),
        config.excluded_term_codes.clone(),
        config.attendance_concurrency,
    );
    let mapper = config.status_mapper();

    match cli.command {
        Commands::Terms => {
            let (timeline, failure) = tracker.timeline().await;
            print_advisory(failure.as_slice());
            let Some(latest) = timeline.latest() else {
                println!("No terms available.");
                return Ok(());
            };
            let previous = latest.previous.as_ref().map(|t| t.term_code.as_str());
            for term in timeline.terms() {
                let marker = if term.term_code == latest.current.term_code {
                    " (current)"
                } else if Some(term.term_code.as_str()) == previous {
                    " (previous)"
                } else {
                    ""
                };
                println!("- {} {}{}", term.term_code, term.label(), marker);
            }
        }
        Commands::Summary { term } => {
            let Some(snapshot) = load_selected(&tracker, term.as_deref()).await? else {
                return Ok(());
            };
            print!(
                "{}",
                report::build_report(&snapshot, &mapper, &config.display, chrono::Utc::now())
            );
        }
        Commands::Report { term, format, out } => {
            let Some(snapshot) = load_selected(&tracker, term.as_deref()).await? else {
                return Ok(());
            };
            write_report(&snapshot, &mapper, &config, format, &out)?;
            println!("Report written to {}.", out.display());
        }
        Commands::History => {
            let (timeline, failure) = tracker.timeline().await;
            let (points, failures) = tracker.gpa_history(&timeline).await;
            let all: Vec<FetchFailure> = failure.into_iter().chain(failures).collect();
            print_advisory(&all);
            print!("{}", report::render_history(&points));
        }
        Commands::Section { term, section_id } => {
            let banner_id = banner_for(&tracker, &term).await?;
            let section = tracker
                .client()
                .fetch_section_attendance(&term, &banner_id, &section_id)
                .await
                .context("section attendance lookup failed")?;
            println!("{}", serde_json::to_string_pretty(&section)?);
            println!(
                "Status: {}",
                mapper.attendance_status(section.attendance_percentage).label()
            );
        }
        Commands::Performance { term, crn } => {
            let banner_id = banner_for(&tracker, &term).await?;
            let performance = tracker
                .client()
                .fetch_academic_performance(&term, &crn, &banner_id)
                .await
                .context("academic performance lookup failed")?;
            println!("{}", serde_json::to_string_pretty(&performance)?);
        }
        Commands::Info { term } => {
            let info = match term {
                Some(term) => tracker.client().fetch_term_information(&term).await,
                None => tracker.client().fetch_latest_term_information().await,
            }
            .context("term information lookup failed")?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Watch => watch(tracker, mapper, config).await?,
    }

    Ok(())
}

async fn load_selected(
    tracker: &Tracker,
    term: Option<&str>,
) -> anyhow::Result<Option<Snapshot>> {
    let (timeline, failure) = tracker.timeline().await;
    let mut session = Session::new(timeline);
    let ticket = match term {
        Some(code) => Some(
            session
                .select(code)
                .with_context(|| format!("term {code} is not available for this student"))?,
        ),
        None => session.select_latest(),
    };

    let Some(ticket) = ticket else {
        print_advisory(failure.as_slice());
        println!("No terms available.");
        return Ok(None);
    };

    let snapshot = tracker.load(ticket).await;
    if session.accept(snapshot) {
        Ok(session.latest().cloned())
    } else {
        Ok(None)
    }
}

async fn banner_for(tracker: &Tracker, term_code: &str) -> anyhow::Result<String> {
    let (timeline, _) = tracker.timeline().await;
    let selection = timeline
        .select(term_code)
        .with_context(|| format!("term {term_code} is not available for this student"))?;
    Ok(selection.current.banner_id)
}

fn write_report(
    snapshot: &Snapshot,
    mapper: &StatusMapper,
    config: &TrackerConfig,
    format: Format,
    out: &Path,
) -> anyhow::Result<()> {
    match format {
        Format::Markdown => {
            let body =
                report::build_report(snapshot, mapper, &config.display, chrono::Utc::now());
            std::fs::write(out, body)?;
        }
        Format::Json => {
            let view = report::ReportView::new(snapshot, mapper, chrono::Utc::now());
            std::fs::write(out, serde_json::to_string_pretty(&view)?)?;
        }
        Format::Csv => {
            let file = std::fs::File::create(out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_csv(&snapshot.aggregate.rows, mapper, file)?;
        }
    }
    Ok(())
}

fn print_advisory(failures: &[FetchFailure]) {
    if !failures.is_empty() {
        println!("> {}", report::PARTIAL_DATA_ADVISORY);
    }
}

async fn watch(
    tracker: Tracker,
    mapper: StatusMapper,
    config: TrackerConfig,
) -> anyhow::Result<()> {
    let (timeline, failure) = tracker.timeline().await;
    print_advisory(failure.as_slice());
    if timeline.is_empty() {
        println!("No terms available.");
    }

    let input = BufReader::new(tokio::io::stdin());
    success_tracker::watch::watch(&tracker, input, Session::new(timeline), |snapshot| {
        print!(
            "{}",
            report::build_report(snapshot, &mapper, &config.display, chrono::Utc::now())
        );
    })
    .await
    .context("failed to read term codes from stdin")?;
    Ok(())
}
