use crate::audit::StaticAuditProbe;
use crate::config::ExploreConfig;
use crate::data::{Database, DatabaseSink, RunStatus};
use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use wayfinder_scanner::explorer::{NavigationEdge, PageRecord, ProgressCallback};
use wayfinder_scanner::journey::JourneyReport;
use wayfinder_scanner::ledger::JsonlSink;
use wayfinder_scanner::{
    ActionKind, ActionLedger, DiscoveredFeature, Document, ElementResolver, ExplorationState,
    Explorer, HttpSource, JourneyRunner, LedgerEntry, RunSummary, ScanError, StaticDocument,
};

/// Options for an exploration run.
pub struct ExploreOptions {
    pub config: ExploreConfig,
    /// Run store; when set the ledger is written to it as the run progresses.
    pub db_path: Option<PathBuf>,
    /// JSONL copy of the ledger.
    pub ledger_path: Option<PathBuf>,
    pub show_progress_bar: bool,
}

/// Everything gathered by a run, including one that ended early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationReport {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub entry_points: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub pages: Vec<PageRecord>,
    pub edges: Vec<NavigationEdge>,
    pub features: Vec<DiscoveredFeature>,
    pub ledger: Vec<LedgerEntry>,
    pub journeys: Vec<JourneyReport>,
    pub failure: Option<String>,
}

impl ExplorationReport {
    /// Whether the caller should exit with a failure code.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, RunStatus::SessionExpired | RunStatus::Failed)
    }
}

fn store_error(e: rusqlite::Error) -> ScanError {
    ScanError::Ledger(io::Error::other(e))
}

/// Serialized configuration for the run store, with credentials masked.
fn redacted_config(config: &ExploreConfig) -> Option<String> {
    let mut config = config.clone();
    for value in config.session.headers.values_mut() {
        *value = "***".to_string();
    }
    if config.session.cookie.is_some() {
        config.session.cookie = Some("***".to_string());
    }
    serde_json::to_string(&config).ok()
}

/// Runs an exploration over HTTP using the bundled static document.
pub async fn execute_exploration(
    options: ExploreOptions,
    progress_callback: Option<ProgressCallback>,
) -> Result<ExplorationReport, ScanError> {
    options.config.validate()?;
    let source = HttpSource::new(options.config.http_options())?;
    let mut document = StaticDocument::new(source);
    explore_document(options, &mut document, progress_callback).await
}

/// Runs an exploration against any document: entry-point discovery, bounded
/// expansion, then the configured journeys.
pub async fn explore_document(
    options: ExploreOptions,
    document: &mut dyn Document,
    progress_callback: Option<ProgressCallback>,
) -> Result<ExplorationReport, ScanError> {
    let config = &options.config;
    config.validate()?;
    let started_at = Utc::now();

    let mut db = match &options.db_path {
        Some(path) => Some(Database::new(path).map_err(store_error)?),
        None => None,
    };
    let run_id = match &db {
        Some(db) => Some(
            db.create_run(&config.entry_points, redacted_config(config).as_deref())
                .map_err(store_error)?,
        ),
        None => None,
    };

    let mut ledger = ActionLedger::new();
    if let (Some(path), Some(run_id)) = (&options.db_path, &run_id) {
        ledger = ledger.with_sink(Box::new(
            DatabaseSink::open(path, run_id.clone()).map_err(store_error)?,
        ));
    }
    if let Some(path) = &options.ledger_path {
        ledger = ledger.with_sink(Box::new(JsonlSink::create(path)?));
    }

    let cancel = CancellationToken::new();
    if let Some(max_errors) = config.max_errors {
        let errors = Arc::new(AtomicUsize::new(0));
        let token = cancel.clone();
        ledger = ledger.with_observer(Arc::new(move |entry: &LedgerEntry| {
            if entry.kind == ActionKind::Error {
                let count = errors.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= max_errors && !token.is_cancelled() {
                    warn!("Error cap of {} reached, stopping after the current branch", max_errors);
                    token.cancel();
                }
            }
        }));
    }

    // Setup progress spinner
    let spinner = if options.show_progress_bar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Opening entry point...");
        Some(pb)
    } else {
        None
    };

    let spinner_for_progress = spinner.clone();
    let on_visit: ProgressCallback = Arc::new(move |visited: usize, location: String| {
        if let Some(ref pb) = spinner_for_progress {
            pb.set_message(format!("[{}] {}", visited, extract_url_path(&location)));
        }
        if let Some(ref cb) = progress_callback {
            cb(visited, location);
        }
    });

    let settings = config.explorer_settings();
    let mut explorer = Explorer::new(settings.clone())
        .with_identity(config.identity())
        .with_probe(Arc::new(StaticAuditProbe::new()))
        .with_session_guard(Arc::new(config.session_guard()))
        .with_progress_callback(on_visit)
        .with_cancellation(cancel.clone());
    if let Some(budget) = config.time_budget() {
        explorer = explorer.with_time_budget(budget);
    }

    let mapper = config.mapper();
    let mut state = ExplorationState::new(&settings, ledger);

    info!("Exploring {} entry point(s)", config.entry_points.len());
    let (mut status, summary, mut failure) = match explorer
        .explore(document, &config.entry_points, &mapper, &mut state)
        .await
    {
        Ok(summary) => {
            let status = if summary.cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            };
            (status, summary, None)
        }
        Err(e @ ScanError::SessionExpired { .. }) => {
            warn!("{}", e);
            (RunStatus::SessionExpired, partial_summary(&state), Some(e.to_string()))
        }
        Err(e @ ScanError::Ledger(_)) => {
            warn!("{}", e);
            (RunStatus::Failed, partial_summary(&state), Some(e.to_string()))
        }
        Err(e) => {
            if let Some(pb) = &spinner {
                pb.finish_and_clear();
            }
            if let (Some(db), Some(run_id)) = (&db, &run_id) {
                mark_failed(db, run_id);
            }
            return Err(e);
        }
    };

    let mut journeys = Vec::new();
    if status == RunStatus::Completed && !config.journeys.is_empty() {
        let runner = JourneyRunner::new(
            ElementResolver::new(config.action_timeout()),
            config.test_prefix(),
        );
        info!("Running {} journey(s) with prefix {}", config.journeys.len(), runner.prefix());
        for journey in &config.journeys {
            if let Some(pb) = &spinner {
                pb.set_message(format!("Journey: {}", journey.name));
            }
            match runner.run(document, journey, &mut state.ledger).await {
                Ok(report) => journeys.push(report),
                Err(e) => {
                    warn!("Journey '{}' aborted the run: {}", journey.name, e);
                    status = RunStatus::Failed;
                    failure = Some(e.to_string());
                    break;
                }
            }
        }
    }

    if let Some(pb) = &spinner {
        pb.finish_with_message(format!(
            "{} Explored {} resource(s), {} ledger entries",
            if status == RunStatus::Completed { "✓" } else { "!" },
            state.visited.len(),
            state.ledger.len()
        ));
    }

    if let (Some(db), Some(run_id)) = (db.as_mut(), &run_id) {
        db.save_exploration(run_id, &state).map_err(store_error)?;
        db.finish_run(run_id, status).map_err(store_error)?;
    }

    let summary = RunSummary {
        ledger_entries: state.ledger.len(),
        errors: state.ledger.count(ActionKind::Error),
        ..summary
    };
    let ExplorationState {
        pages,
        edges,
        features,
        ledger,
        ..
    } = state;

    Ok(ExplorationReport {
        run_id,
        status,
        entry_points: config.entry_points.clone(),
        started_at,
        finished_at: Utc::now(),
        summary,
        pages,
        edges,
        features,
        ledger: ledger.into_entries(),
        journeys,
        failure,
    })
}

/// Best effort; the caller is already returning the error that ended the run.
fn mark_failed(db: &Database, run_id: &str) {
    if let Err(e) = db.finish_run(run_id, RunStatus::Failed) {
        warn!("Could not mark run {} as failed: {}", run_id, e);
    }
}

fn partial_summary(state: &ExplorationState) -> RunSummary {
    RunSummary {
        entry: state.pages.first().map(|p| p.resource.canonical_id.clone()),
        visited: state.visited.len(),
        expansions: state.expansions,
        ledger_entries: state.ledger.len(),
        errors: state.ledger.count(ActionKind::Error),
        cancelled: false,
    }
}

/// Extracts the path (plus route fragment) from a URL for display.
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            match u.fragment() {
                Some(fragment) if fragment.starts_with('/') || fragment.starts_with("!/") => {
                    format!("{}#{}", path, fragment)
                }
                _ => path,
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Short console summary printed after `explore`.
pub fn generate_run_summary(report: &ExplorationReport) -> String {
    let mut out = String::new();

    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    out.push_str("# Summary:\n");
    if let Some(run_id) = &report.run_id {
        out.push_str(&format!("  Run: {}\n", run_id));
    }
    out.push_str(&format!("  Status: {}\n", report.status));
    out.push_str(&format!("  Resources visited: {}\n", report.summary.visited));
    out.push_str(&format!("  Expansions: {}\n", report.summary.expansions));
    out.push_str(&format!("  Ledger entries: {}\n", report.summary.ledger_entries));
    out.push_str(&format!("  Errors: {}\n", report.summary.errors));
    let violations: usize = report.pages.iter().map(|p| p.violations.len()).sum();
    out.push_str(&format!("  Accessibility violations: {}\n", violations));
    if let Some(failure) = &report.failure {
        out.push_str(&format!("  {} {}\n", "Stopped:".red(), failure));
    }
    out.push('\n');

    // Group pages by section
    let mut by_section: BTreeMap<&str, Vec<&PageRecord>> = BTreeMap::new();
    for page in &report.pages {
        by_section
            .entry(page.section.as_deref().unwrap_or("(unsectioned)"))
            .or_default()
            .push(page);
    }

    for (section, pages) in &by_section {
        out.push_str(&format!("## {}\n", section.bold()));
        out.push_str(&format!("  {} pages found\n\n", pages.len()));
        for page in pages {
            let path = extract_url_path(&page.resource.raw_location);
            let load = page.perf.as_ref().map(|p| p.load_time_ms).unwrap_or(0);
            let timing = match load {
                0..=5000 => format!("{}ms", load).green(),
                5001..=10000 => format!("{}ms", load).yellow(),
                _ => format!("{}ms", load).red(),
            };
            let mut line = format!("  {} {}", timing, path);
            if let Some(title) = &page.title {
                line.push_str(&format!(" {}", title.dimmed()));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }

    if !report.journeys.is_empty() {
        out.push_str("## Journeys\n");
        for journey in &report.journeys {
            let mark = if journey.passed() { "✓".green() } else { "✗".red() };
            out.push_str(&format!(
                "  {} {} ({}/{} steps)\n",
                mark, journey.name, journey.steps_completed, journey.steps_total
            ));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_config_masks_credentials() {
        let mut config = ExploreConfig::default();
        config.session.cookie = Some("session=secret".to_string());
        config
            .session
            .headers
            .insert("Authorization".to_string(), "Bearer secret".to_string());

        let json = redacted_config(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("***"));
    }

    #[test]
    fn test_mark_failed_updates_run_status() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let run_id = db.create_run(&["https://app.test/".to_string()], None).unwrap();

        mark_failed(&db, &run_id);

        let run = db.get_run(&run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.end_time.is_some());
    }

    #[test]
    fn test_mark_failed_survives_store_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let run_id = db.create_run(&["https://app.test/".to_string()], None).unwrap();
        db.get_connection().execute_batch("PRAGMA query_only = ON").unwrap();

        assert!(db.finish_run(&run_id, RunStatus::Failed).is_err());
        mark_failed(&db, &run_id);
    }
}
