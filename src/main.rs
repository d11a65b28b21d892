use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use scraper_console::application::catalog::{ScraperFilter, SortKey};
use scraper_console::application::display::{format_elapsed, format_memory, DisplayState, Notice};
use scraper_console::application::polling::{PollingHub, PollingPolicy, ScraperView};
use scraper_console::config::settings::AppConfig;
use scraper_console::domain::log_entry::LogTail;
use scraper_console::domain::notification::{Notification, NotificationCenter, Severity};
use scraper_console::infrastructure::http::client::{
    AnalyticsApi, ApiClient, ScheduleApi, ScraperApi, StubAnalytics,
};
use scraper_console::utils::logging;

#[derive(Parser)]
#[command(name = "scraper-console", version, about = "Console for the scraper management API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List scrapers with their current state
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        state: Option<DisplayState>,
        #[arg(long, default_value = "name")]
        sort: SortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Follow one scraper until Ctrl-C
    Watch { id: String },
    Start { id: String },
    Stop { id: String },
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// List schedules with their next run
    Schedules,
    /// Analytics summary, overall or for one scraper
    Analytics {
        id: Option<String>,
        /// Use the built-in empty analytics backend
        #[arg(long)]
        stub: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;
    info!("Using scraper API at {}", config.api.base_url);

    let client = Arc::new(ApiClient::new(&config.api)?);
    let hub = PollingHub::new(client.clone(), PollingPolicy::from(&config.polling));

    let outcome = match cli.command {
        Command::List {
            search,
            state,
            sort,
            desc,
        } => {
            let filter = ScraperFilter {
                search,
                state,
                sort,
                descending: desc,
            };
            list(client.as_ref(), &filter).await
        }
        Command::Watch { id } => {
            watch(&hub, &id).await;
            Ok(())
        }
        Command::Start { id } => hub.start(&id).await.map_err(|e| report("start scraper", e)),
        Command::Stop { id } => hub.stop(&id).await.map_err(|e| report("stop scraper", e)),
        Command::Delete { id, yes } => {
            if !yes {
                warn!("Refusing to delete {} without --yes", id);
                return Ok(());
            }
            hub.delete(&id).await.map_err(|e| report("delete scraper", e))
        }
        Command::Schedules => schedules(client.as_ref()).await,
        Command::Analytics { id, stub } => {
            if stub {
                analytics(&StubAnalytics, id.as_deref()).await
            } else {
                analytics(client.as_ref(), id.as_deref()).await
            }
        }
    };

    if let Err(e) = &outcome {
        error!("{}", e);
    }
    outcome
}

fn report(action: &str, e: scraper_console::utils::error::AppError) -> anyhow::Error {
    let notice = Notice::from_mutation_error(action, &e);
    anyhow::anyhow!(notice.message)
}

async fn list(api: &ApiClient, filter: &ScraperFilter) -> Result<()> {
    let scrapers = api.list_scrapers().await?;

    let lookups = scrapers.iter().map(|s| async move {
        let status = api.get_status(&s.id).await;
        if let Err(e) = &status {
            warn!("Status for {} unavailable: {}", s.id, e);
        }
        (s.id.clone(), status.ok())
    });
    let statuses: HashMap<_, _> = join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(id, status)| status.map(|s| (id, s)))
        .collect();

    for row in filter.apply(&scrapers, &statuses) {
        let last_run = row
            .scraper
            .last_run
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{:<12} {:<8} {:<30} {:<17} {}",
            row.scraper.id, row.state, row.scraper.name, last_run, row.scraper.start_url
        );
    }
    Ok(())
}

async fn watch(hub: &PollingHub, id: &str) {
    let mut subscription = hub.subscribe(id);
    let mut notifications = NotificationCenter::new();
    let mut log_tail = LogTail::new();
    let mut previous = subscription.view();
    info!("Watching scraper {} (Ctrl-C to stop)", id);

    loop {
        tokio::select! {
            view = subscription.changed() => {
                render_changes(id, &previous, &view, &mut notifications, &mut log_tail);
                previous = view;
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, stopping polls");
                break;
            }
        }
    }

    subscription.unsubscribe();
    info!("{} unread notifications", notifications.unread_count());
}

fn render_changes(
    id: &str,
    previous: &ScraperView,
    view: &ScraperView,
    notifications: &mut NotificationCenter,
    log_tail: &mut LogTail,
) {
    let name = view
        .scraper
        .data()
        .map(|s| s.name.as_str())
        .unwrap_or(id);

    let (before, after) = (previous.display_state(), view.display_state());
    if before != after {
        info!("{} is {}", name, after);
        if let Some(n) = Notification::from_transition(id, name, before, after) {
            match n.severity {
                Severity::Error => error!("{}", n.message),
                _ => info!("{}", n.message),
            }
            notifications.push(n);
        }
    }

    if let Some(err) = view.status.error() {
        if previous.status.error() != Some(err) {
            warn!("Status refresh failing, showing last known state: {}", err);
        }
    }

    if view.status.updated_at() != previous.status.updated_at() && view.is_running() {
        let elapsed = view
            .status
            .data()
            .and_then(|s| s.elapsed_time.clone())
            .unwrap_or_default();
        info!("{} URLs processed {}", view.urls_processed(), elapsed);
    }

    if view.monitor.updated_at() != previous.monitor.updated_at() {
        if let Some(m) = view.monitor.data() {
            info!(
                "{:.1}% depth {} at {} ({:.1} req/s, {})",
                m.progress.percent_complete,
                m.progress.current_depth,
                m.progress.current_url.as_deref().unwrap_or("-"),
                m.performance.requests_per_second,
                m.performance
                    .memory_usage
                    .map(format_memory)
                    .unwrap_or_else(|| "-".into()),
            );
        }
    }

    let notice = view.monitor_notice();
    if notice != previous.monitor_notice() {
        if let Some(notice) = notice {
            match notice.severity {
                Severity::Error => error!("{}", notice.message),
                _ => info!("{}", notice.message),
            }
        }
    }

    if view.logs.updated_at() != previous.logs.updated_at() {
        if let Some(logs) = view.logs.data() {
            for entry in log_tail.advance(logs) {
                info!("[{}] {} {}", entry.level, entry.timestamp.format("%H:%M:%S"), entry.message);
            }
        }
    }
}

async fn schedules(api: &ApiClient) -> Result<()> {
    let now = Utc::now();
    for schedule in api.list_schedules().await? {
        let next = schedule
            .next_occurrence(now)
            .or(schedule.next_run)
            .map(|t| {
                let wait = (t - now).num_seconds().max(0) as u64;
                format!("{} (in {})", t.format("%Y-%m-%d %H:%M"), format_elapsed(wait))
            })
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<10} {:<10} {:<24} {:<6} {}",
            schedule.id,
            schedule.scraper_id,
            schedule.name,
            if schedule.active { "on" } else { "off" },
            next
        );
    }
    Ok(())
}

async fn analytics<A: AnalyticsApi + ?Sized>(api: &A, id: Option<&str>) -> Result<()> {
    match id {
        Some(id) => {
            let m = api.scraper_metrics(id).await?;
            println!(
                "runs {}  urls {}  changes {}  errors {}",
                m.total_runs, m.urls_processed, m.content_changes, m.error_count
            );
            for run in m.recent_runs {
                println!(
                    "  {}  {} urls  {} errors",
                    run.started_at.format("%Y-%m-%d %H:%M"),
                    run.urls_processed,
                    run.errors
                );
            }
        }
        None => {
            let o = api.overview().await?;
            println!(
                "scrapers {} ({} active)  urls {}  changes {}",
                o.total_scrapers, o.active_scrapers, o.total_urls_processed, o.total_content_changes
            );
        }
    }
    Ok(())
}
