mod batch;
mod control;
mod db;
mod dedupe;
mod export;
mod model;
mod parser;
mod renderer;
mod session;
mod settings;
mod target;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{Orchestrator, RunStatus};
use crate::control::Controller;
use crate::export::ExportError;
use crate::parser::Recovery;
use crate::session::Session;
use crate::settings::{RendererKind, Settings};

#[derive(Parser)]
#[command(name = "tour_scraper", about = "Bandsintown concert history scraper")]
struct Cli {
    /// Settings file (default: ./tour_scraper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Page renderer to drive
    #[arg(long, global = true, value_enum)]
    renderer: Option<RendererKind>,

    /// Max listing pages per artist
    #[arg(long, global = true)]
    max_pages: Option<usize>,

    /// SQLite run history
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a batch of artist pages and export the concerts to CSV
    Run {
        /// Artist page URLs
        urls: Vec<String>,
        /// Read URLs from a file, one per line
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// CSV output path (default: concerts_<timestamp>.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check artist URLs without scraping
    Validate {
        urls: Vec<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Run field recovery over a saved page text sample
    Extract {
        text_file: PathBuf,
        /// Artist name to attach to the records
        #[arg(short, long, default_value = "Unknown Artist")]
        artist: String,
    },
    /// List stored runs
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Re-export a stored run to CSV
    Export {
        run_id: i64,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let result = match cli.command {
        Commands::Run { urls, file, out } => {
            let addresses = collect_addresses(urls, file.as_deref())?;
            run(&settings, &addresses, out).await
        }
        Commands::Validate { urls, file } => {
            let addresses = collect_addresses(urls, file.as_deref())?;
            let v = target::validate(&addresses);
            for t in &v.targets {
                println!("{:>10} | {:<32} | {}", t.id, truncate(&t.name, 32), t.url);
            }
            println!("\n{} valid, {} invalid", v.targets.len(), v.invalid.len());
            if !v.invalid.is_empty() {
                bail!(v.invalid_message());
            }
            Ok(())
        }
        Commands::Extract { text_file, artist } => {
            let text = std::fs::read_to_string(&text_file)
                .with_context(|| format!("reading {}", text_file.display()))?;
            let recovery = Recovery::new(&settings.recovery)?;
            let records = dedupe::dedupe(recovery.extract(&text, &artist));
            if records.is_empty() {
                println!("No venue lines recognized.");
                return Ok(());
            }
            println!("{:<36} | {:<24} | {:<16}", "Venue", "Address", "Date");
            println!("{}", "-".repeat(82));
            for r in &records {
                println!(
                    "{:<36} | {:<24} | {:<16}",
                    truncate(r.venue_name(), 36),
                    truncate(r.venue_address(), 24),
                    truncate(r.event_date(), 16)
                );
            }
            let dated = records.iter().filter(|r| r.has_date()).count();
            let located = records.iter().filter(|r| r.has_address()).count();
            println!(
                "\n{} records ({} with a date, {} with an address)",
                records.len(),
                dated,
                located
            );
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let runs = db::fetch_runs(&conn, limit)?;
            if runs.is_empty() {
                println!("No stored runs.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<20} | {:<20} | {:>7} | {:>6} | {:>8} | {:>6} | {:>6} | {}",
                "#", "Started", "Finished", "Artists", "Failed", "Concerts", "Venues", "Errors", "Stopped"
            );
            println!("{}", "-".repeat(109));
            for r in &runs {
                let started = r.started_at.as_deref().unwrap_or("-");
                let finished = r.finished_at.as_deref().unwrap_or("-");
                println!(
                    "{:>4} | {:<20} | {:<20} | {:>3}/{:<3} | {:>6} | {:>8} | {:>6} | {:>6} | {}",
                    r.id,
                    truncate(started, 19),
                    truncate(finished, 19),
                    r.artists_processed,
                    r.artists_total,
                    r.artists_failed,
                    r.concerts_found,
                    r.unique_venues,
                    r.error_count,
                    if r.stopped { "yes" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Export { run_id, out } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            if !db::run_exists(&conn, run_id)? {
                bail!("no stored run with id {}", run_id);
            }
            let records = db::fetch_events(&conn, run_id)?;
            let path = out.unwrap_or_else(|| PathBuf::from(format!("concerts_run_{}.csv", run_id)));
            export::write_file(&path, &records)
                .with_context(|| format!("exporting run {}", run_id))?;
            println!("Exported {} concerts to {}", records.len(), path.display());
            let errors = db::fetch_errors(&conn, run_id)?;
            if !errors.is_empty() {
                println!("Run {} recorded {} errors:", run_id, errors.len());
                for e in &errors {
                    println!("  ! {}", e);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(kind) = cli.renderer {
        settings.renderer.kind = kind;
    }
    if let Some(n) = cli.max_pages {
        settings.session.max_pages = n;
    }
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    settings.validate().context("checking settings overrides")?;
    Ok(settings)
}

fn collect_addresses(mut urls: Vec<String>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading URL list {}", path.display()))?;
        urls.extend(text.lines().map(str::to_string));
    }
    Ok(urls)
}

async fn run(settings: &Settings, addresses: &[String], out: Option<PathBuf>) -> anyhow::Result<()> {
    let recovery = Recovery::new(&settings.recovery)?;
    let factory = renderer::factory(&settings.renderer)?;
    let session = Session::new(settings.session.clone(), recovery, factory);
    let controller = Controller::new(Orchestrator::new(session, settings.batch.clone()));

    let handle = controller.start(addresses)?;
    println!("Scraping {} artists...", handle.total);

    let stopper = controller.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping after the current artist...");
            stopper.stop();
        }
    });

    let pb = ProgressBar::new(handle.total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let outcome = loop {
        tokio::select! {
            res = &mut wait => break res.context("batch worker failed")?,
            _ = tick.tick() => show_progress(&pb, &controller.poll_status()),
        }
    };
    ctrl_c.abort();
    pb.finish_and_clear();

    let status = &outcome.status;
    println!(
        "Processed {}/{} artists ({} failed): {} concerts at {} venues.",
        status.artists_processed,
        status.artists_total,
        status.artists_failed,
        status.concerts_found,
        status.unique_venues
    );
    if status.stop_requested {
        println!("Stopped early on request.");
    }
    for e in &status.errors {
        println!("  ! {}", e);
    }

    match controller.export() {
        Ok(csv) => {
            let path = out.unwrap_or_else(|| PathBuf::from(export::default_filename(chrono::Local::now())));
            export::save_csv(&path, &csv).with_context(|| format!("writing {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
        Err(ExportError::NoData) => println!("No concerts found, nothing exported."),
        Err(e) => return Err(e).context("rendering CSV"),
    }

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    let run_id = db::save_run(&conn, status, &outcome.records)?;
    println!("Saved as run #{} in {}", run_id, settings.db_path.display());
    Ok(())
}

fn show_progress(pb: &ProgressBar, status: &RunStatus) {
    pb.set_position(status.artists_processed as u64);
    let current = if status.current_artist.is_empty() {
        String::new()
    } else {
        format!("{} | ", truncate(&status.current_artist, 28))
    };
    pb.set_message(format!(
        "{}{} concerts, {} venues, {} errors",
        current,
        status.concerts_found,
        status.unique_venues,
        status.errors.len()
    ));
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("Théâtre du Châtelet", 7), "Théâtre...");
        assert_eq!(truncate("Ryman", 10), "Ryman");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn zero_max_pages_override_rejected() {
        let cli = Cli::parse_from(["tour_scraper", "--max-pages", "0", "history"]);
        let err = load_settings(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("session.max_pages"));
    }

    #[test]
    fn url_file_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://www.bandsintown.com/a/2-b\n\n").unwrap();
        let all = collect_addresses(vec!["https://www.bandsintown.com/a/1-a".into()], Some(&path)).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(target::validate(&all).targets.len(), 2);
    }
}
