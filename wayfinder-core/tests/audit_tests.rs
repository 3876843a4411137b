// Tests for the static accessibility and performance probe

use std::time::Duration;
use wayfinder_core::audit::{StaticAuditProbe, analyze_page, measure_page};
use wayfinder_scanner::Probe;
use wayfinder_scanner::document::{Impact, PageSnapshot};

const CLEAN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Clients</title></head>
<body>
  <nav><a href="/clients">Clients</a><a href="/tasks" aria-label="Tasks"><svg></svg></a></nav>
  <img src="/logo.png" alt="Acme">
  <img src="/divider.png" alt="">
  <form>
    <label for="name">Name</label><input id="name" name="name">
    <label>Email <input name="email" type="email"></label>
    <input type="hidden" name="csrf" value="x">
    <button type="submit">Save</button>
  </form>
</body>
</html>"#;

fn rules(html: &str) -> Vec<String> {
    analyze_page(html).into_iter().map(|v| v.rule).collect()
}

// ============================================================================
// Accessibility Checks
// ============================================================================

#[test]
fn test_clean_page_has_no_violations() {
    assert!(analyze_page(CLEAN_PAGE).is_empty(), "{:?}", analyze_page(CLEAN_PAGE));
}

#[test]
fn test_missing_lang_and_title() {
    let found = rules("<html><head></head><body><p>Hi</p></body></html>");
    assert!(found.contains(&"html-has-lang".to_string()));
    assert!(found.contains(&"document-title".to_string()));
}

#[test]
fn test_image_without_alt() {
    let html = r#"<html lang="en"><head><title>x</title></head><body>
        <img src="a.png" class="hero">
        <img src="b.png" role="presentation">
    </body></html>"#;
    let violations = analyze_page(html);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule, "image-alt");
    assert_eq!(violations[0].impact, Impact::Critical);
    assert_eq!(violations[0].target.as_deref(), Some("img.hero"));
}

#[test]
fn test_unnamed_button_and_link() {
    let html = r#"<html lang="en"><head><title>x</title></head><body>
        <button id="close"><span class="icon"></span></button>
        <a href="/edit"><i class="fa fa-pencil"></i></a>
        <input type="submit" value="Go">
    </body></html>"#;
    let found = rules(html);
    assert_eq!(
        found,
        vec!["button-name".to_string(), "link-name".to_string()]
    );
}

#[test]
fn test_unlabeled_fields() {
    let html = r#"<html lang="en"><head><title>x</title></head><body>
        <input name="search">
        <input name="q" placeholder="Query" aria-label="Query">
        <select name="status"><option>Open</option></select>
        <textarea name="notes" title="Notes"></textarea>
    </body></html>"#;
    let violations = analyze_page(html);
    let targets: Vec<String> = violations
        .iter()
        .filter(|v| v.rule == "label")
        .filter_map(|v| v.target.clone())
        .collect();
    assert_eq!(targets, vec!["input".to_string(), "select".to_string()]);
}

// ============================================================================
// Performance Sample
// ============================================================================

#[test]
fn test_measure_page_counts() {
    let snapshot = PageSnapshot {
        location: "https://app.test/".to_string(),
        html: r#"<html><head><script></script><script></script></head>
            <body><form></form><form></form><form></form></body></html>"#
            .to_string(),
        load_time: Duration::from_millis(1234),
        ..PageSnapshot::default()
    };
    let sample = measure_page(&snapshot);

    assert_eq!(sample.load_time_ms, 1234);
    assert_eq!(sample.transfer_bytes, snapshot.html.len());
    assert_eq!(sample.script_count, 2);
    assert_eq!(sample.form_count, 3);
    assert!(sample.element_count >= 8);
}

#[tokio::test]
async fn test_probe_uses_snapshot_only() {
    let probe = StaticAuditProbe::new();
    let snapshot = PageSnapshot {
        location: "https://app.test/".to_string(),
        html: "<html><body><img src=x></body></html>".to_string(),
        ..PageSnapshot::default()
    };

    let violations = probe.audit(&snapshot).await.unwrap();
    let metrics = probe.metrics(&snapshot).await.unwrap();

    assert!(violations.iter().any(|v| v.rule == "image-alt"));
    assert_eq!(metrics.transfer_bytes, snapshot.html.len());
}
