// Tests for the bounded explorer

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wayfinder_scanner::document::{DocumentResult, Impact, PerfSample, PageSnapshot, Violation};
use wayfinder_scanner::error::ProbeError;
use wayfinder_scanner::frontier::FrontierItem;
use wayfinder_scanner::html::{FetchedPage, FormMethod, PageSource};
use wayfinder_scanner::{
    ActionKind, ActionLedger, Document, DocumentError, ElementHandle, ElementQuery, ExplorationState,
    Explorer, ExplorerSettings, Intent, MemorySource, Probe, ScanError, SectionMapper, SignInDetector,
    StaticDocument,
};

const BASE: &str = "https://app.test";

fn settings(max_depth: usize, max_breadth: usize) -> ExplorerSettings {
    ExplorerSettings {
        max_depth,
        max_breadth,
        action_timeout: Duration::from_secs(5),
        same_origin_only: true,
    }
}

fn page_with_links(links: &[(String, String)]) -> String {
    let mut html = String::from("<html><head><title>Page</title></head><body><main>");
    for (href, text) in links {
        html.push_str(&format!(r#"<a href="{}">{}</a>"#, href, text));
    }
    html.push_str("</main></body></html>");
    html
}

fn no_vocabulary() -> SectionMapper {
    SectionMapper::new(Vec::new())
}

fn entry() -> Vec<String> {
    vec![format!("{}/", BASE)]
}

/// Entry page links to `/p0..pN`; every `/pI` links to `/pI/c0..c9`.
fn wide_site(top: usize) -> MemorySource {
    let top_links: Vec<(String, String)> = (0..top)
        .map(|i| (format!("/p{}", i), format!("Page {}", i)))
        .collect();
    let mut source = MemorySource::new().page(&format!("{}/", BASE), page_with_links(&top_links));

    for i in 0..top {
        let children: Vec<(String, String)> = (0..10)
            .map(|j| (format!("/p{}/c{}", i, j), format!("Child {}-{}", i, j)))
            .collect();
        source = source.page(&format!("{}/p{}", BASE, i), page_with_links(&children));
        for j in 0..10 {
            source = source.page(
                &format!("{}/p{}/c{}", BASE, i, j),
                page_with_links(&[("/".to_string(), "Home".to_string())]),
            );
        }
    }
    source
}

/// Serves `before` until `trigger` has been fetched, then `after` for everything.
struct SwitchingSource {
    before: MemorySource,
    after: MemorySource,
    trigger: String,
    switched: AtomicBool,
}

impl SwitchingSource {
    fn new(before: MemorySource, after: MemorySource, trigger: &str) -> Self {
        Self {
            before,
            after,
            trigger: trigger.to_string(),
            switched: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageSource for SwitchingSource {
    async fn fetch(&self, url: &str) -> DocumentResult<FetchedPage> {
        if self.switched.load(Ordering::SeqCst) {
            return self.after.fetch(url).await;
        }
        let page = self.before.fetch(url).await;
        if url == self.trigger {
            self.switched.store(true, Ordering::SeqCst);
        }
        page
    }

    async fn submit(
        &self,
        url: &str,
        method: FormMethod,
        fields: &[(String, String)],
    ) -> DocumentResult<FetchedPage> {
        self.before.submit(url, method, fields).await
    }
}

/// A document that never settles once it shows a sign-in page.
struct StallsOnSignIn {
    inner: StaticDocument<MemorySource>,
}

#[async_trait]
impl Document for StallsOnSignIn {
    async fn query(&mut self, query: &ElementQuery) -> DocumentResult<Vec<ElementHandle>> {
        self.inner.query(query).await
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DocumentResult<bool> {
        self.inner.is_visible(element).await
    }

    async fn click(&mut self, element: &ElementHandle) -> DocumentResult<()> {
        self.inner.click(element).await
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DocumentResult<()> {
        self.inner.fill(element, value).await
    }

    async fn current_location(&mut self) -> DocumentResult<String> {
        self.inner.current_location().await
    }

    async fn navigate(&mut self, location: &str) -> DocumentResult<()> {
        self.inner.navigate(location).await
    }

    async fn wait_for_settled(&mut self, timeout: Duration) -> DocumentResult<()> {
        if self.inner.current_location().await?.contains("sign-in") {
            return Err(DocumentError::Timeout);
        }
        self.inner.wait_for_settled(timeout).await
    }

    async fn snapshot(&mut self) -> DocumentResult<PageSnapshot> {
        self.inner.snapshot().await
    }
}

// ============================================================================
// Bounds
// ============================================================================

#[tokio::test]
async fn test_fifty_seeds_breadth_five_depth_two_visits_thirty_one() {
    let settings = settings(2, 5);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(50));

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.visited, 31);
    assert_eq!(summary.errors, 0);
    // sum of 5^d for d in 0..2
    assert!(summary.expansions <= 6);
    assert_eq!(summary.expansions, 6);
    assert_eq!(state.pages.len(), 31);
    assert_eq!(state.pages.iter().filter(|p| p.depth == 2).count(), 25);
}

#[tokio::test]
async fn test_no_duplicate_visits_and_every_visit_has_an_action() {
    let settings = settings(2, 5);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(8));

    explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    let ids: HashSet<_> = state
        .visited
        .resources()
        .iter()
        .map(|r| r.canonical_id.clone())
        .collect();
    assert_eq!(ids.len(), state.visited.len());

    let actions = state.ledger.count(ActionKind::Navigate) + state.ledger.count(ActionKind::Click);
    assert!(actions >= state.visited.len() - 1);

    let sequences: Vec<u64> = state.ledger.entries().iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_depth_zero_only_visits_entry() {
    let settings = settings(0, 5);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(3));

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.visited, 1);
    assert_eq!(summary.expansions, 0);
}

// ============================================================================
// Branch failures
// ============================================================================

#[tokio::test]
async fn test_timeout_on_third_item_is_recorded_and_fourth_still_runs() {
    let links: Vec<(String, String)> = (1..=5)
        .map(|i| (format!("/item{}", i), format!("Item {}", i)))
        .collect();
    let mut source = MemorySource::new().page(&format!("{}/", BASE), page_with_links(&links));
    for i in 1..=5 {
        source = source.page(&format!("{}/item{}", BASE, i), page_with_links(&[]));
    }
    let source = source.timeout(&format!("{}/item3", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    let errors: Vec<_> = state
        .ledger
        .entries()
        .iter()
        .filter(|e| e.kind == ActionKind::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].target.contains("Item 3"));
    assert!(!errors[0].success);
    assert!(errors[0].detail.as_deref().unwrap_or_default().contains("did not settle"));

    let visited: Vec<&str> = state
        .visited
        .resources()
        .iter()
        .map(|r| r.canonical_id.as_str())
        .collect();
    assert!(visited.contains(&"https://app.test/item4"));
    assert!(visited.contains(&"https://app.test/item5"));
    assert!(!visited.contains(&"https://app.test/item3"));
    assert_eq!(summary.visited, 5);
}

#[tokio::test]
async fn test_unresolvable_intent_is_a_resolution_failure() {
    let source = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&[("/a".into(), "A".into())]))
        .page(&format!("{}/a", BASE), page_with_links(&[]));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());

    let ghost = FrontierItem::new(
        Intent::from_selectors("open archive", &[".archive-link", "text=/archive/i"]),
        1,
        explorer.identity().canonicalize(&format!("{}/", BASE), None),
    );
    let visited = wayfinder_scanner::frontier::VisitedSet::new();
    state.frontier.enqueue(ghost, &visited);

    let mut document = StaticDocument::new(source);
    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    let error = state
        .ledger
        .entries()
        .iter()
        .find(|e| e.kind == ActionKind::Error)
        .unwrap();
    assert_eq!(error.target, "open archive");
    assert!(error.detail.as_deref().unwrap_or_default().contains("no locator matched"));
    assert_eq!(summary.visited, 2);
}

#[tokio::test]
async fn test_missing_page_does_not_abort_run() {
    let links = vec![
        ("/gone".to_string(), "Gone".to_string()),
        ("/here".to_string(), "Here".to_string()),
    ];
    let source = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&links))
        .page(&format!("{}/here", BASE), page_with_links(&[]));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.visited, 2);
}

#[tokio::test]
async fn test_anchor_redirecting_elsewhere_is_an_anchor_failure() {
    let links = vec![
        ("/a".to_string(), "A".to_string()),
        ("/b".to_string(), "B".to_string()),
    ];
    let before = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&links))
        .page(&format!("{}/a", BASE), page_with_links(&[]));
    let after = MemorySource::new()
        .page(&format!("{}/elsewhere", BASE), page_with_links(&[]))
        .page(&format!("{}/b", BASE), page_with_links(&[]))
        .redirect(&format!("{}/", BASE), &format!("{}/elsewhere", BASE));
    let source = SwitchingSource::new(before, after, &format!("{}/a", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    // Both returns to the anchor land on /elsewhere, so /b is never opened.
    assert_eq!(summary.visited, 2);
    assert_eq!(summary.errors, 2);
    for error in state.ledger.entries().iter().filter(|e| e.kind == ActionKind::Error) {
        assert_eq!(error.target, "https://app.test/");
        assert!(!error.success);
        assert!(error.detail.as_deref().unwrap_or_default().contains("landed on"));
        assert!(error.result_location.as_deref().unwrap_or_default().contains("elsewhere"));
    }
    assert!(!state.ledger.entries().iter().any(|e| {
        e.kind == ActionKind::Navigate
            && e.result_location.as_deref().unwrap_or_default().contains("elsewhere")
    }));
}

// ============================================================================
// Session expiry
// ============================================================================

#[tokio::test]
async fn test_session_expiry_halts_run_and_keeps_ledger() {
    let links = vec![
        ("/a".to_string(), "A".to_string()),
        ("/b".to_string(), "B".to_string()),
        ("/c".to_string(), "C".to_string()),
    ];
    let source = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&links))
        .page(&format!("{}/a", BASE), page_with_links(&[]))
        .page(&format!("{}/c", BASE), page_with_links(&[]))
        .page(&format!("{}/sign-in", BASE), "<html><body><form></form></body></html>")
        .redirect(&format!("{}/b", BASE), &format!("{}/sign-in", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone()).with_session_guard(Arc::new(SignInDetector::default()));
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let result = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await;

    match result {
        Err(ScanError::SessionExpired { location }) => assert!(location.contains("sign-in")),
        other => panic!("expected SessionExpired, got {:?}", other.map(|s| s.visited)),
    }

    let last = state.ledger.entries().last().unwrap();
    assert_eq!(last.kind, ActionKind::Click);
    assert!(last.result_location.as_deref().unwrap_or_default().contains("sign-in"));

    let visited: Vec<&str> = state
        .visited
        .resources()
        .iter()
        .map(|r| r.canonical_id.as_str())
        .collect();
    assert_eq!(visited, vec!["https://app.test/", "https://app.test/a"]);
}

#[tokio::test]
async fn test_all_entry_points_expired_is_fatal() {
    let source = MemorySource::new()
        .page(&format!("{}/login", BASE), "<html><body>Log in</body></html>")
        .redirect(&format!("{}/", BASE), &format!("{}/login", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone()).with_session_guard(Arc::new(SignInDetector::default()));
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let result = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await;

    assert!(matches!(result, Err(ScanError::SessionExpired { .. })));
    assert_eq!(state.ledger.count(ActionKind::Error), 1);
}

#[tokio::test]
async fn test_next_entry_point_used_when_first_is_unreachable() {
    let source = MemorySource::new().page(
        &format!("{}/dashboard", BASE),
        page_with_links(&[]),
    );

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let entries = vec![format!("{}/missing", BASE), format!("{}/dashboard", BASE)];
    let summary = explorer
        .explore(&mut document, &entries, &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.entry.unwrap().as_str(), "https://app.test/dashboard");
    assert_eq!(state.ledger.entries()[0].kind, ActionKind::Error);
    assert_eq!(state.ledger.entries()[1].kind, ActionKind::Navigate);
}

#[tokio::test]
async fn test_no_entry_points_is_configuration_error() {
    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(MemorySource::new());

    let result = explorer
        .explore(&mut document, &[], &no_vocabulary(), &mut state)
        .await;
    assert!(matches!(result, Err(ScanError::Configuration(_))));
    assert!(state.ledger.is_empty());
}

#[tokio::test]
async fn test_session_expiry_on_anchor_return_is_fatal() {
    let links = vec![
        ("/a".to_string(), "Item A".to_string()),
        ("/b".to_string(), "Item B".to_string()),
    ];
    let before = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&links))
        .page(&format!("{}/a", BASE), page_with_links(&[]))
        .page(&format!("{}/b", BASE), page_with_links(&[]));
    let after = MemorySource::new()
        .page(&format!("{}/sign-in", BASE), "<html><body><form></form></body></html>")
        .redirect(&format!("{}/", BASE), &format!("{}/sign-in", BASE))
        .redirect(&format!("{}/b", BASE), &format!("{}/sign-in", BASE));
    let source = SwitchingSource::new(before, after, &format!("{}/a", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone()).with_session_guard(Arc::new(SignInDetector::default()));
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let result = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await;

    match result {
        Err(ScanError::SessionExpired { location }) => assert!(location.contains("sign-in")),
        other => panic!("expected SessionExpired, got {:?}", other.map(|s| s.visited)),
    }

    // The return to the anchor is never recorded as a successful navigation.
    assert!(!state.ledger.entries().iter().any(|e| {
        e.kind == ActionKind::Navigate
            && e.success
            && e.result_location.as_deref().unwrap_or_default().contains("sign-in")
    }));
    let last = state.ledger.entries().last().unwrap();
    assert_eq!(last.kind, ActionKind::Error);
    assert!(last.detail.as_deref().unwrap_or_default().contains("session expired"));

    let visited: Vec<&str> = state
        .visited
        .resources()
        .iter()
        .map(|r| r.canonical_id.as_str())
        .collect();
    assert_eq!(visited, vec!["https://app.test/", "https://app.test/a"]);
}

#[tokio::test]
async fn test_session_expiry_on_failed_activation_is_fatal() {
    let source = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&[("/b".into(), "B".into())]))
        .page(&format!("{}/sign-in", BASE), "<html><body><form></form></body></html>")
        .redirect(&format!("{}/b", BASE), &format!("{}/sign-in", BASE));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone()).with_session_guard(Arc::new(SignInDetector::default()));
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StallsOnSignIn {
        inner: StaticDocument::new(source),
    };

    let result = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await;

    match result {
        Err(ScanError::SessionExpired { location }) => assert!(location.contains("sign-in")),
        other => panic!("expected SessionExpired, got {:?}", other.map(|s| s.visited)),
    }

    // The timed-out branch is recorded, and the explorer never tries to go back.
    let last = state.ledger.entries().last().unwrap();
    assert_eq!(last.kind, ActionKind::Error);
    assert!(last.result_location.as_deref().unwrap_or_default().contains("sign-in"));
    assert_eq!(state.visited.len(), 1);
}

// ============================================================================
// Route fragments
// ============================================================================

#[tokio::test]
async fn test_fragment_routes_are_deduplicated() {
    let app = r##"<html><body><nav>
        <a href="#/clients">Clients</a>
        <a href="#/clients?ts=99">Clients (refresh)</a>
        <a href="#/tasks">Tasks</a>
        <a href="#top">Top</a>
    </nav></body></html>"##;
    let source = MemorySource::new().page(&format!("{}/app", BASE), app);

    let settings = settings(2, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    let summary = explorer
        .explore(
            &mut document,
            &[format!("{}/app#/dashboard", BASE)],
            &SectionMapper::default(),
            &mut state,
        )
        .await
        .unwrap();

    let visited: Vec<&str> = state
        .visited
        .resources()
        .iter()
        .map(|r| r.canonical_id.as_str())
        .collect();
    assert_eq!(
        visited,
        vec![
            "https://app.test/app#/dashboard",
            "https://app.test/app#/clients",
            "https://app.test/app#/tasks",
        ]
    );
    assert_eq!(summary.errors, 0);
    assert_eq!(document.source().fetch_log().len(), 1);
}

// ============================================================================
// Cancellation and callbacks
// ============================================================================

#[tokio::test]
async fn test_cancelled_run_stops_before_next_branch() {
    let token = CancellationToken::new();
    token.cancel();

    let settings = settings(2, 5);
    let explorer = Explorer::new(settings.clone()).with_cancellation(token);
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(5));

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.visited, 1);
    assert_eq!(state.ledger.len(), 1);
}

#[tokio::test]
async fn test_exhausted_time_budget_cancels() {
    let settings = settings(2, 5);
    let explorer = Explorer::new(settings.clone()).with_time_budget(Duration::ZERO);
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(5));

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();
    assert!(summary.cancelled);
}

struct CountingProbe {
    audits: AtomicUsize,
}

#[async_trait]
impl Probe for CountingProbe {
    async fn audit(&self, page: &PageSnapshot) -> Result<Vec<Violation>, ProbeError> {
        self.audits.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Violation {
            rule: "document-title".into(),
            impact: Impact::Serious,
            description: format!("checked {}", page.location),
            help: "Give the page a title".into(),
            target: None,
        }])
    }

    async fn metrics(&self, _page: &PageSnapshot) -> Result<PerfSample, ProbeError> {
        Err(ProbeError("metrics unavailable".into()))
    }
}

#[tokio::test]
async fn test_probe_and_progress_run_once_per_visit() {
    let probe = Arc::new(CountingProbe {
        audits: AtomicUsize::new(0),
    });
    let progress = Arc::new(AtomicUsize::new(0));
    let progress_clone = progress.clone();

    let settings = settings(1, 3);
    let explorer = Explorer::new(settings.clone())
        .with_probe(probe.clone())
        .with_progress_callback(Arc::new(move |_visited, _url| {
            progress_clone.fetch_add(1, Ordering::SeqCst);
        }));
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(wide_site(6));

    let summary = explorer
        .explore(&mut document, &entry(), &no_vocabulary(), &mut state)
        .await
        .unwrap();

    assert_eq!(summary.visited, 4);
    assert_eq!(probe.audits.load(Ordering::SeqCst), 4);
    assert_eq!(progress.load(Ordering::SeqCst), 4);
    assert!(state.pages.iter().all(|p| p.violations.len() == 1 && p.perf.is_none()));
}

#[tokio::test]
async fn test_sections_seed_before_plain_navigation() {
    let links = vec![
        ("/help".to_string(), "Help".to_string()),
        ("/tasks".to_string(), "Tasks".to_string()),
        ("/clients".to_string(), "Clients".to_string()),
    ];
    let source = MemorySource::new()
        .page(&format!("{}/", BASE), page_with_links(&links))
        .page(&format!("{}/help", BASE), page_with_links(&[]))
        .page(&format!("{}/tasks", BASE), page_with_links(&[]))
        .page(&format!("{}/clients", BASE), page_with_links(&[]));

    let settings = settings(1, 25);
    let explorer = Explorer::new(settings.clone());
    let mut state = ExplorationState::new(&settings, ActionLedger::new());
    let mut document = StaticDocument::new(source);

    explorer
        .explore(&mut document, &entry(), &SectionMapper::default(), &mut state)
        .await
        .unwrap();

    let order: Vec<(&str, Option<&str>)> = state
        .pages
        .iter()
        .skip(1)
        .map(|p| (p.resource.canonical_id.as_str(), p.section.as_deref()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("https://app.test/clients", Some("Client")),
            ("https://app.test/tasks", Some("Task")),
            ("https://app.test/help", None),
        ]
    );
    assert_eq!(state.edges.len(), 3);
}
