use crate::document::{Document, ElementHandle, PerfSample, Probe, SessionGuard, SessionStatus, Violation};
use crate::error::{BranchFailure, DocumentError, ScanError};
use crate::frontier::{EnqueueOutcome, Frontier, FrontierItem, VisitedSet};
use crate::identity::{CanonicalId, NavigableResource, ResourceIdentity};
use crate::ledger::{ActionKind, ActionLedger};
use crate::locator::ElementQuery;
use crate::mapper::{CandidateItem, DiscoveredFeature, FeatureKind, Region, SectionMapper, is_followable};
use crate::resolver::{ElementResolver, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

const LINK_QUERY: &str = "a[href], button, [role=link], [role=button]";
const NAV_QUERY: &str = "nav a[href], nav button, [role=navigation] a[href], \
                         [role=navigation] button, aside a[href], .sidebar a[href], \
                         .menu a[href], .nav a[href]";
const WIDGET_QUERY: &str = "[class*=widget], [class*=card], [class*=panel], [class*=stat], \
                            [class*=metric], [class*=dashboard-item]";
const BREADCRUMB_QUERY: &str = ".breadcrumb, [aria-label=breadcrumb], [aria-label=Breadcrumb]";

#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub max_depth: usize,
    pub max_breadth: usize,
    pub action_timeout: Duration,
    pub same_origin_only: bool,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_breadth: 25,
            action_timeout: Duration::from_secs(30),
            same_origin_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub resource: NavigableResource,
    pub title: Option<String>,
    pub breadcrumb: Option<String>,
    pub depth: usize,
    pub section: Option<String>,
    /// Intent that reached this page; `None` for the entry point.
    pub via: Option<String>,
    pub violations: Vec<Violation>,
    pub perf: Option<PerfSample>,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEdge {
    pub from: CanonicalId,
    pub to: CanonicalId,
    pub via: String,
}

/// Everything a run accumulates. Owned by the caller, lent to the explorer.
#[derive(Debug)]
pub struct ExplorationState {
    pub visited: VisitedSet,
    pub frontier: Frontier,
    pub ledger: ActionLedger,
    pub pages: Vec<PageRecord>,
    pub edges: Vec<NavigationEdge>,
    pub features: Vec<DiscoveredFeature>,
    pub expansions: usize,
}

impl ExplorationState {
    pub fn new(settings: &ExplorerSettings, ledger: ActionLedger) -> Self {
        Self {
            visited: VisitedSet::new(),
            frontier: Frontier::new(settings.max_depth, settings.max_breadth),
            ledger,
            pages: Vec::new(),
            edges: Vec::new(),
            features: Vec::new(),
            expansions: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub entry: Option<CanonicalId>,
    pub visited: usize,
    pub expansions: usize,
    pub ledger_entries: usize,
    pub errors: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn from_state(state: &ExplorationState, entry: Option<CanonicalId>, cancelled: bool) -> Self {
        Self {
            entry,
            visited: state.visited.len(),
            expansions: state.expansions,
            ledger_entries: state.ledger.len(),
            errors: state.ledger.count(ActionKind::Error),
            cancelled,
        }
    }
}

/// How a branch's activation step ended.
enum Arrival {
    Reached { location: String },
    Failed(BranchFailure),
}

/// Depth- and breadth-bounded exploration over a single live document.
pub struct Explorer {
    settings: ExplorerSettings,
    identity: ResourceIdentity,
    resolver: ElementResolver,
    probe: Option<Arc<dyn Probe>>,
    session_guard: Option<Arc<dyn SessionGuard>>,
    progress_callback: Option<ProgressCallback>,
    cancel: CancellationToken,
    time_budget: Option<Duration>,
}

impl Explorer {
    pub fn new(settings: ExplorerSettings) -> Self {
        let resolver = ElementResolver::new(settings.action_timeout);
        Self {
            settings,
            identity: ResourceIdentity::new(),
            resolver,
            probe: None,
            session_guard: None,
            progress_callback: None,
            cancel: CancellationToken::new(),
            time_budget: None,
        }
    }

    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_session_guard(mut self, guard: Arc<dyn SessionGuard>) -> Self {
        self.session_guard = Some(guard);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn settings(&self) -> &ExplorerSettings {
        &self.settings
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn resolver(&self) -> &ElementResolver {
        &self.resolver
    }

    /// Runs until the frontier is empty, the run is cancelled, or the session expires.
    ///
    /// Per-branch failures are recorded in the ledger and never returned. Only
    /// `SessionExpired`, `Configuration` and ledger write failures end the run early.
    pub async fn explore(
        &self,
        document: &mut dyn Document,
        entry_points: &[String],
        mapper: &SectionMapper,
        state: &mut ExplorationState,
    ) -> Result<RunSummary, ScanError> {
        if entry_points.is_empty() {
            return Err(ScanError::Configuration("no entry points provided".to_string()));
        }
        let started = Instant::now();
        info!(
            "Starting exploration (max depth {}, max breadth {})",
            self.settings.max_depth, self.settings.max_breadth
        );

        let Some(location) = self.enter(document, entry_points, state).await? else {
            warn!("No entry point was reachable");
            return Ok(RunSummary::from_state(state, None, false));
        };

        let entry = self.identity.observe(&location, None);
        let entry_id = entry.canonical_id.clone();
        let base_host = Url::parse(&location)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()));
        state.visited.mark_visited(entry.clone());
        self.record_page(document, state, entry, 0, None, None).await;

        let items = self.collect_candidates(document, &location, base_host.as_deref()).await;
        let features = mapper.map_sections(&items);
        state.features.extend(features.iter().cloned());
        state.features.extend(mapper.classify_operations(None, &items));

        if self.settings.max_depth > 0 {
            state.expansions += 1;
            let mut queued = 0;
            for feature in features
                .iter()
                .filter(|f| matches!(f.kind, FeatureKind::Section | FeatureKind::Navigation))
            {
                let mut item = FrontierItem::new(feature.intent.clone(), 1, entry_id.clone());
                if let Some(target) = &feature.target {
                    let target_id = self.identity.canonicalize(target, Some(&location));
                    item = item.with_target(target.clone(), target_id);
                }
                if let Some(section) = &feature.section {
                    item = item.with_section(section.clone());
                }
                if state.frontier.enqueue(item, &state.visited) == EnqueueOutcome::Queued {
                    queued += 1;
                }
            }
            info!("Seeded frontier with {} of {} features", queued, features.len());
        }

        let mut cancelled = false;
        while let Some(item) = state.frontier.dequeue() {
            if self.should_stop(started) {
                info!("Exploration cancelled with {} items pending", state.frontier.len() + 1);
                cancelled = true;
                break;
            }
            if let Some(id) = &item.target_id
                && state.visited.is_visited(id)
            {
                debug!("Skipping '{}': {} already visited", item.intent.name, id);
                continue;
            }
            self.run_branch(document, mapper, state, item, base_host.as_deref())
                .await?;
        }

        let summary = RunSummary::from_state(state, Some(entry_id), cancelled);
        info!(
            "Exploration finished: {} visited, {} ledger entries, {} errors in {:.2}s",
            summary.visited,
            summary.ledger_entries,
            summary.errors,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    fn should_stop(&self, started: Instant) -> bool {
        self.cancel.is_cancelled() || self.time_budget.is_some_and(|b| started.elapsed() >= b)
    }

    /// Tries entry points in order. A sign-in landing is skipped; if every entry
    /// point lands on one the session is gone.
    async fn enter(
        &self,
        document: &mut dyn Document,
        entry_points: &[String],
        state: &mut ExplorationState,
    ) -> Result<Option<String>, ScanError> {
        let mut expired_at = None;
        let mut expired = 0;

        for entry in entry_points {
            let location = match self.goto(document, entry).await {
                Ok(location) => location,
                Err(failure) => {
                    warn!("Entry point {} unreachable: {}", entry, failure);
                    state.ledger.append(
                        ActionKind::Error,
                        entry.clone(),
                        None,
                        false,
                        Some(failure.to_string()),
                    )?;
                    continue;
                }
            };

            if let SessionStatus::Expired { reason } = self.session_status(document).await {
                warn!("Entry point {} landed on sign-in ({})", entry, reason);
                state.ledger.append(
                    ActionKind::Error,
                    entry.clone(),
                    Some(location.clone()),
                    false,
                    Some(format!("session expired: {}", reason)),
                )?;
                expired += 1;
                expired_at = Some(location);
                continue;
            }

            state.ledger.append(
                ActionKind::Navigate,
                entry.clone(),
                Some(location.clone()),
                true,
                None,
            )?;
            return Ok(Some(location));
        }

        if expired == entry_points.len()
            && let Some(location) = expired_at
        {
            return Err(ScanError::SessionExpired { location });
        }
        Ok(None)
    }

    async fn run_branch(
        &self,
        document: &mut dyn Document,
        mapper: &SectionMapper,
        state: &mut ExplorationState,
        item: FrontierItem,
        base_host: Option<&str>,
    ) -> Result<(), ScanError> {
        // AtAnchor
        let Some(anchor) = state.visited.get(&item.origin).map(|r| r.raw_location.clone()) else {
            let failure = BranchFailure::AnchorRecoveryFailure {
                anchor: item.origin.to_string(),
                reason: "origin was never visited".to_string(),
            };
            state.ledger.append(
                ActionKind::Error,
                item.intent.name.clone(),
                None,
                false,
                Some(failure.to_string()),
            )?;
            return Ok(());
        };
        if !self.ensure_at(document, &item.origin, &anchor, state).await? {
            return Ok(());
        }

        // Navigating
        let location = match self.activate(document, &item, state).await? {
            Arrival::Reached { location } => location,
            Arrival::Failed(failure) => {
                warn!("Branch '{}' failed: {}", item.intent.name, failure);
                let here = document.current_location().await.ok();
                state.ledger.append(
                    ActionKind::Error,
                    item.intent.name.clone(),
                    here,
                    false,
                    Some(failure.to_string()),
                )?;
                if let SessionStatus::Expired { reason } = self.session_status(document).await {
                    let location = document.current_location().await.unwrap_or_else(|_| anchor.clone());
                    warn!("Session expired at {} ({})", location, reason);
                    return Err(ScanError::SessionExpired { location });
                }
                self.ensure_at(document, &item.origin, &anchor, state).await?;
                return Ok(());
            }
        };

        if let SessionStatus::Expired { reason } = self.session_status(document).await {
            warn!("Session expired at {} ({})", location, reason);
            return Err(ScanError::SessionExpired { location });
        }

        // AtResource
        let resource = self.identity.observe(&location, Some(&anchor));
        if state.visited.is_visited(&resource.canonical_id) {
            debug!("Re-arrived at {}, not expanding", resource.canonical_id);
        } else {
            let resource_id = resource.canonical_id.clone();
            state.visited.mark_visited(resource.clone());
            state.edges.push(NavigationEdge {
                from: item.origin.clone(),
                to: resource_id.clone(),
                via: item.intent.name.clone(),
            });
            self.record_page(
                document,
                state,
                resource,
                item.depth,
                item.section.clone(),
                Some(item.intent.name.clone()),
            )
            .await;

            // Expanding
            let items = self.collect_candidates(document, &location, base_host).await;
            state
                .features
                .extend(mapper.classify_operations(item.section.as_deref(), &items));
            if item.depth < self.settings.max_depth {
                state.expansions += 1;
                self.expand(state, mapper, &item, &resource_id, &location, &items);
            }
        }

        // ReturnedToAnchor
        self.ensure_at(document, &item.origin, &anchor, state).await?;
        Ok(())
    }

    fn expand(
        &self,
        state: &mut ExplorationState,
        mapper: &SectionMapper,
        parent: &FrontierItem,
        resource_id: &CanonicalId,
        location: &str,
        items: &[CandidateItem],
    ) {
        let mut queued = 0;
        for candidate in items.iter().filter(|c| c.region != Region::Widget) {
            let mut child = FrontierItem::new(candidate.intent.clone(), parent.depth + 1, resource_id.clone());
            if let (Some(target), Some(target_id)) = (&candidate.target, &candidate.target_id) {
                child = child.with_target(target.clone(), target_id.clone());
            }
            if let Some(section) = parent.section.clone().or_else(|| mapper.classify(candidate)) {
                child = child.with_section(section);
            }
            match state.frontier.enqueue(child, &state.visited) {
                EnqueueOutcome::Queued => queued += 1,
                EnqueueOutcome::BreadthExceeded | EnqueueOutcome::TooDeep => break,
                _ => {}
            }
        }
        debug!("Expanded {}: {} children queued", location, queued);
    }

    /// Makes sure the document is showing `anchor`. Records the navigation if one was needed.
    async fn ensure_at(
        &self,
        document: &mut dyn Document,
        anchor_id: &CanonicalId,
        anchor: &str,
        state: &mut ExplorationState,
    ) -> Result<bool, ScanError> {
        if let Ok(here) = document.current_location().await
            && self.identity.canonicalize(&here, Some(anchor)) == *anchor_id
        {
            return Ok(true);
        }

        match self.goto(document, anchor).await {
            Ok(location) => {
                if let SessionStatus::Expired { reason } = self.session_status(document).await {
                    warn!("Session expired returning to {} ({})", anchor, reason);
                    state.ledger.append(
                        ActionKind::Error,
                        anchor.to_string(),
                        Some(location.clone()),
                        false,
                        Some(format!("session expired: {}", reason)),
                    )?;
                    return Err(ScanError::SessionExpired { location });
                }

                let landed = self.identity.canonicalize(&location, Some(anchor));
                if landed != *anchor_id {
                    let failure = BranchFailure::AnchorRecoveryFailure {
                        anchor: anchor.to_string(),
                        reason: format!("landed on {}", landed),
                    };
                    warn!("{}", failure);
                    state.ledger.append(
                        ActionKind::Error,
                        anchor.to_string(),
                        Some(location),
                        false,
                        Some(failure.to_string()),
                    )?;
                    return Ok(false);
                }

                state.ledger.append(ActionKind::Navigate, anchor.to_string(), Some(location), true, None)?;
                Ok(true)
            }
            Err(e) => {
                let failure = BranchFailure::AnchorRecoveryFailure {
                    anchor: anchor.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", failure);
                let here = document.current_location().await.ok();
                state.ledger.append(
                    ActionKind::Error,
                    anchor.to_string(),
                    here,
                    false,
                    Some(failure.to_string()),
                )?;
                Ok(false)
            }
        }
    }

    /// Resolve and click; fall back to loading the known target directly.
    async fn activate(
        &self,
        document: &mut dyn Document,
        item: &FrontierItem,
        state: &mut ExplorationState,
    ) -> Result<Arrival, ScanError> {
        let timeout_ms = self.settings.action_timeout.as_millis() as u64;
        let label = item.target.clone().unwrap_or_else(|| item.intent.name.clone());

        match self.resolver.resolve(document, &item.intent).await {
            Resolution::Found { element, locator } => {
                let clicked = timeout(self.settings.action_timeout, document.click(&element)).await;
                let outcome = match clicked {
                    Ok(Ok(())) => self.settle(document, &label).await,
                    Ok(Err(DocumentError::Timeout)) | Err(_) => Err(BranchFailure::NavigationTimeout {
                        target: label.clone(),
                        timeout_ms,
                    }),
                    Ok(Err(e)) => Err(BranchFailure::Activation {
                        target: label.clone(),
                        reason: e.to_string(),
                    }),
                };
                match outcome {
                    Ok(location) => {
                        state.ledger.append(
                            ActionKind::Click,
                            locator.query.to_string(),
                            Some(location.clone()),
                            true,
                            Some(format!("{} ({})", item.intent.name, locator.description)),
                        )?;
                        Ok(Arrival::Reached { location })
                    }
                    Err(failure) => Ok(Arrival::Failed(failure)),
                }
            }
            Resolution::NotFound { attempts } => {
                let Some(target) = &item.target else {
                    return Ok(Arrival::Failed(BranchFailure::ResolutionFailure {
                        intent: item.intent.name.clone(),
                    }));
                };
                debug!(
                    "'{}' not resolved after {} attempts, loading {} directly",
                    item.intent.name, attempts, target
                );
                match self.goto(document, target).await {
                    Ok(location) => {
                        state.ledger.append(
                            ActionKind::Navigate,
                            target.clone(),
                            Some(location.clone()),
                            true,
                            Some(item.intent.name.clone()),
                        )?;
                        Ok(Arrival::Reached { location })
                    }
                    Err(failure) => Ok(Arrival::Failed(failure)),
                }
            }
        }
    }

    async fn goto(&self, document: &mut dyn Document, location: &str) -> Result<String, BranchFailure> {
        let timeout_ms = self.settings.action_timeout.as_millis() as u64;
        match timeout(self.settings.action_timeout, document.navigate(location)).await {
            Ok(Ok(())) => self.settle(document, location).await,
            Ok(Err(DocumentError::Timeout)) | Err(_) => Err(BranchFailure::NavigationTimeout {
                target: location.to_string(),
                timeout_ms,
            }),
            Ok(Err(e)) => Err(BranchFailure::Activation {
                target: location.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn settle(&self, document: &mut dyn Document, target: &str) -> Result<String, BranchFailure> {
        let limit = self.settings.action_timeout;
        let timeout_ms = limit.as_millis() as u64;
        match timeout(limit, document.wait_for_settled(limit)).await {
            Ok(Ok(())) => {}
            Ok(Err(DocumentError::Timeout)) | Err(_) => {
                return Err(BranchFailure::NavigationTimeout {
                    target: target.to_string(),
                    timeout_ms,
                });
            }
            Ok(Err(e)) => {
                return Err(BranchFailure::Activation {
                    target: target.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        document
            .current_location()
            .await
            .map_err(|e| BranchFailure::Activation {
                target: target.to_string(),
                reason: e.to_string(),
            })
    }

    async fn session_status(&self, document: &mut dyn Document) -> SessionStatus {
        let Some(guard) = &self.session_guard else {
            return SessionStatus::Active;
        };
        match document.snapshot().await {
            Ok(snapshot) => guard.check(&snapshot),
            Err(e) => {
                debug!("Snapshot for session check failed: {}", e);
                SessionStatus::Active
            }
        }
    }

    async fn record_page(
        &self,
        document: &mut dyn Document,
        state: &mut ExplorationState,
        resource: NavigableResource,
        depth: usize,
        section: Option<String>,
        via: Option<String>,
    ) {
        let snapshot = document.snapshot().await.ok();
        let breadcrumb = self.breadcrumb(document).await;

        let (violations, perf) = match (&self.probe, &snapshot) {
            (Some(probe), Some(snapshot)) => {
                let (audit, metrics) = futures::join!(probe.audit(snapshot), probe.metrics(snapshot));
                let violations = audit.unwrap_or_else(|e| {
                    warn!("Audit of {} failed: {}", snapshot.location, e);
                    Vec::new()
                });
                let perf = metrics
                    .map_err(|e| warn!("Metrics for {} failed: {}", snapshot.location, e))
                    .ok();
                (violations, perf)
            }
            _ => (Vec::new(), None),
        };

        let location = resource.raw_location.clone();
        state.pages.push(PageRecord {
            resource,
            title: snapshot.and_then(|s| s.title),
            breadcrumb,
            depth,
            section,
            via,
            violations,
            perf,
            visited_at: Utc::now(),
        });

        if let Some(cb) = &self.progress_callback {
            cb(state.visited.len(), location);
        }
    }

    async fn breadcrumb(&self, document: &mut dyn Document) -> Option<String> {
        let query = ElementQuery::parse(BREADCRUMB_QUERY);
        document
            .query(&query)
            .await
            .ok()?
            .into_iter()
            .find(|el| el.visible && !el.text.is_empty())
            .map(|el| el.text)
    }

    /// Visible links and buttons on the current page, in document order, with
    /// submit buttons, dead links and (optionally) other origins removed.
    async fn collect_candidates(
        &self,
        document: &mut dyn Document,
        location: &str,
        base_host: Option<&str>,
    ) -> Vec<CandidateItem> {
        let nav: HashSet<usize> = self
            .query_quietly(document, NAV_QUERY)
            .await
            .into_iter()
            .map(|el| el.index)
            .collect();

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for element in self.query_quietly(document, LINK_QUERY).await {
            if !element.visible || element.is_disabled() || element.is_submit() {
                continue;
            }
            if !seen.insert(element.index) {
                continue;
            }
            if let Some(href) = element.href()
                && !is_followable(href)
            {
                continue;
            }
            let region = if nav.contains(&element.index) {
                Region::Navigation
            } else {
                Region::Content
            };
            let item = CandidateItem::from_element(&element, region, &self.identity, location);
            if self.settings.same_origin_only
                && let Some(target) = &item.target
                && !same_origin(target, base_host)
            {
                debug!("Skipping cross-origin link {}", target);
                continue;
            }
            items.push(item);
        }

        for element in self.query_quietly(document, WIDGET_QUERY).await {
            if element.visible && seen.insert(element.index) {
                items.push(CandidateItem::from_element(
                    &element,
                    Region::Widget,
                    &self.identity,
                    location,
                ));
            }
        }
        items
    }

    async fn query_quietly(&self, document: &mut dyn Document, selector: &str) -> Vec<ElementHandle> {
        let query = ElementQuery::parse(selector);
        match timeout(self.settings.action_timeout, document.query(&query)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                debug!("Query '{}' failed: {}", selector, e);
                Vec::new()
            }
            Err(_) => {
                debug!("Query '{}' timed out", selector);
                Vec::new()
            }
        }
    }
}

/// Exact host or a subdomain of it.
fn same_origin(target: &str, base_host: Option<&str>) -> bool {
    let Some(base) = base_host else {
        return true;
    };
    match Url::parse(target).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase())) {
        Some(host) => host == base || host.ends_with(&format!(".{}", base)),
        None => true,
    }
}
