// Report generation from a finished run or the run store

use crate::crawl::ExplorationReport;
use crate::data::Database;
use crate::map::NavigationMap;
use chrono::{DateTime, Utc};
use rusqlite::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use wayfinder_scanner::document::Impact;
use wayfinder_scanner::explorer::{NavigationEdge, PageRecord};
use wayfinder_scanner::journey::JourneyReport;
use wayfinder_scanner::{ActionKind, DiscoveredFeature, FeatureKind, LedgerEntry};

/// Pages slower than this are reported.
pub const SLOW_PAGE_MS: u64 = 5_000;
/// Pages slower than this are reported as high severity.
pub const VERY_SLOW_PAGE_MS: u64 = 10_000;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────────────────────────\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
            ReportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    High,
    Medium,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::High => "HIGH",
            IssueSeverity::Medium => "MEDIUM",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: String,
    pub kind: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_pages: Vec<String>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub run_id: Option<String>,
    pub status: String,
    pub start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub entry_points: Vec<String>,
    pub pages: Vec<PageRecord>,
    pub edges: Vec<NavigationEdge>,
    pub features: Vec<DiscoveredFeature>,
    pub ledger: Vec<LedgerEntry>,
    pub journeys: Vec<JourneyReport>,
    pub issues: Vec<Issue>,
}

impl ReportData {
    pub fn from_run(report: &ExplorationReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            status: report.status.to_string(),
            start_time: report.started_at.timestamp(),
            end_time: Some(report.finished_at.timestamp()),
            entry_points: report.entry_points.clone(),
            pages: report.pages.clone(),
            edges: report.edges.clone(),
            features: report.features.clone(),
            ledger: report.ledger.clone(),
            journeys: report.journeys.clone(),
            issues: collect_issues(&report.pages),
        }
    }

    fn count(&self, kind: ActionKind) -> usize {
        self.ledger.iter().filter(|e| e.kind == kind).count()
    }

    fn status_to_string(&self) -> &str {
        match self.status.as_str() {
            "completed" => "Completed",
            "cancelled" => "Cancelled",
            "session_expired" => "Session expired",
            "failed" => "Failed",
            "running" => "Running",
            _ => "Unknown",
        }
    }

    fn format_targets(&self) -> String {
        match self.entry_points.len() {
            0 => "Unknown".to_string(),
            1 => self.entry_points[0].clone(),
            n => format!("{} entry points", n),
        }
    }
}

/// Loads a stored run. Journey results are not kept in the store.
pub fn gather_report_data(db: &Database, run_id: &str) -> Result<ReportData> {
    let run = db
        .get_run(run_id)?
        .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    let pages = db.get_resources(run_id)?;
    let issues = collect_issues(&pages);

    Ok(ReportData {
        run_id: Some(run.id),
        status: run.status.to_string(),
        start_time: run.start_time,
        end_time: run.end_time,
        entry_points: run.entry_points,
        pages,
        edges: db.get_edges(run_id)?,
        features: db.get_features(run_id)?,
        ledger: db.get_ledger_entries(run_id)?,
        journeys: Vec::new(),
        issues,
    })
}

/// Accessibility violations grouped by rule, then slow pages.
pub fn collect_issues(pages: &[PageRecord]) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut by_rule: BTreeMap<&str, Vec<(&PageRecord, &wayfinder_scanner::document::Violation)>> =
        BTreeMap::new();
    for page in pages {
        for violation in &page.violations {
            by_rule.entry(violation.rule.as_str()).or_default().push((page, violation));
        }
    }

    for (rule, hits) in by_rule {
        let Some((_, first)) = hits.first() else {
            continue;
        };
        let severity = match first.impact {
            Impact::Critical | Impact::Serious => IssueSeverity::High,
            Impact::Moderate | Impact::Minor => IssueSeverity::Medium,
        };
        let mut affected: Vec<String> = Vec::new();
        for (page, _) in &hits {
            let location = &page.resource.raw_location;
            if !affected.contains(location) && affected.len() < 5 {
                affected.push(location.clone());
            }
        }
        issues.push(Issue {
            severity,
            category: "Accessibility".to_string(),
            kind: "WCAG Violation".to_string(),
            description: first.description.clone(),
            rule: Some(rule.to_string()),
            help: Some(first.help.clone()),
            url: None,
            affected_pages: affected,
            count: hits.len(),
            load_time_ms: None,
            recommendation: None,
        });
    }

    for page in pages {
        let Some(perf) = &page.perf else {
            continue;
        };
        if perf.load_time_ms > SLOW_PAGE_MS {
            let severity = if perf.load_time_ms > VERY_SLOW_PAGE_MS {
                IssueSeverity::High
            } else {
                IssueSeverity::Medium
            };
            issues.push(Issue {
                severity,
                category: "Performance".to_string(),
                kind: "Slow Page Load".to_string(),
                description: format!(
                    "Page load time is {:.2}s, exceeding the recommended 3s",
                    perf.load_time_ms as f64 / 1000.0
                ),
                rule: None,
                help: None,
                url: Some(page.resource.raw_location.clone()),
                affected_pages: Vec::new(),
                count: 1,
                load_time_ms: Some(perf.load_time_ms),
                recommendation: Some(
                    "Optimize assets, reduce bundle size, implement lazy loading".to_string(),
                ),
            });
        }
    }

    issues.sort_by_key(|i| i.severity);
    issues
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    // Header
    report.push_str(RULE);
    report.push_str("                         WAYFINDER EXPLORATION REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    if let Some(run_id) = &data.run_id {
        report.push_str(&format!("Run ID:       {}\n", run_id));
    }
    report.push_str(&format!("Status:       {}\n", data.status_to_string()));
    report.push_str(&format!("Started:      {}\n", format_timestamp(data.start_time)));
    if let Some(end_time) = data.end_time {
        report.push_str(&format!("Duration:     {} seconds\n", end_time - data.start_time));
    }
    report.push_str(&format!("Targets:      {}\n", data.format_targets()));
    report.push_str(&format!("Resources:    {}\n", data.pages.len()));
    report.push_str(&format!(
        "Actions:      {} navigate, {} click, {} fill, {} submit, {} error\n",
        data.count(ActionKind::Navigate),
        data.count(ActionKind::Click),
        data.count(ActionKind::Fill),
        data.count(ActionKind::Submit),
        data.count(ActionKind::Error)
    ));
    report.push('\n');

    // Navigation map
    report.push_str(RULE);
    report.push_str("NAVIGATION MAP\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&NavigationMap::build(&data.pages, &data.edges).render_tree());
    report.push('\n');

    // Sections
    let sections: Vec<&DiscoveredFeature> = data
        .features
        .iter()
        .filter(|f| f.kind == FeatureKind::Section)
        .collect();
    if !sections.is_empty() {
        report.push_str(RULE);
        report.push_str("SECTIONS\n");
        report.push_str(RULE);
        report.push('\n');
        for section in sections {
            let members = data
                .features
                .iter()
                .filter(|f| f.kind != FeatureKind::Section && f.section.as_deref() == Some(section.name.as_str()))
                .count();
            report.push_str(&format!(
                "  {:<20} {}  ({} related)\n",
                section.name,
                section.target.as_deref().unwrap_or("-"),
                members
            ));
        }
        report.push('\n');
    }

    // Issues
    report.push_str(RULE);
    report.push_str("ISSUES\n");
    report.push_str(RULE);
    report.push('\n');
    let high = data.issues.iter().filter(|i| i.severity == IssueSeverity::High).count();
    report.push_str(&format!("Total Issues: {}\n", data.issues.len()));
    report.push_str(&format!("  [HIGH]     {}\n", high));
    report.push_str(&format!("  [MEDIUM]   {}\n\n", data.issues.len() - high));

    for (idx, issue) in data.issues.iter().enumerate() {
        report.push_str(&format!("[{}] {} - {}\n", idx + 1, issue.category, issue.kind));
        report.push_str(&format!("Severity:     {}\n", issue.severity.as_str()));
        if let Some(rule) = &issue.rule {
            report.push_str(&format!("Rule:         {}\n", rule));
        }
        if let Some(url) = &issue.url {
            report.push_str(&format!("URL:          {}\n", url));
        }
        report.push_str(&format!("Occurrences:  {}\n", issue.count));
        report.push_str("\nDescription:\n");
        report.push_str(&wrap_text(&issue.description, 80, "  "));
        if let Some(help) = issue.help.as_ref().or(issue.recommendation.as_ref()) {
            report.push_str("\nRemediation:\n");
            report.push_str(&wrap_text(help, 80, "  "));
        }
        for page in &issue.affected_pages {
            report.push_str(&format!("  - {}\n", page));
        }
        report.push('\n');
        report.push_str(THIN_RULE);
        report.push('\n');
    }

    // Journeys
    if !data.journeys.is_empty() {
        report.push_str(RULE);
        report.push_str("JOURNEYS\n");
        report.push_str(RULE);
        report.push('\n');
        for journey in &data.journeys {
            let verdict = if journey.passed() { "PASS" } else { "FAIL" };
            report.push_str(&format!(
                "  [{}] {} ({}/{} steps)\n",
                verdict, journey.name, journey.steps_completed, journey.steps_total
            ));
            if let Some(failure) = &journey.failure {
                report.push_str(&format!("         {}\n", failure));
            }
        }
        report.push('\n');
    }

    // Footer
    report.push_str(RULE);
    report.push_str("                                End of Report\n");
    report.push_str(RULE);
    report.push_str("\nGenerated by Wayfinder - adaptive navigation discovery\n\n");

    report
}

pub fn generate_json_report(data: &ReportData) -> std::result::Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Wayfinder",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": data.run_id,
                "status": data.status,
                "start_time": format_iso8601_timestamp(data.start_time),
                "end_time": data.end_time.map(format_iso8601_timestamp),
                "duration_seconds": data.end_time.map(|end| end - data.start_time),
                "entry_points": data.entry_points
            },
            "summary": {
                "resources": data.pages.len(),
                "features": data.features.len(),
                "ledger_entries": data.ledger.len(),
                "errors": data.count(ActionKind::Error),
                "issues": data.issues.len()
            },
            "inventory": data.pages,
            "edges": data.edges,
            "features": data.features,
            "issues": data.issues,
            "journeys": data.journeys,
            "ledger": data.ledger
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut md = String::new();
    md.push_str("# Wayfinder Exploration Report\n\n");
    md.push_str(&format!("Generated: {}\n\n", Utc::now().to_rfc3339()));
    if let Some(run_id) = &data.run_id {
        md.push_str(&format!("- Run: `{}`\n", run_id));
    }
    md.push_str(&format!("- Status: {}\n", data.status_to_string()));
    md.push_str(&format!("- Targets: {}\n", data.format_targets()));
    md.push_str(&format!("- Resources: {}\n\n", data.pages.len()));

    md.push_str("## Summary\n\n");
    let high = data.issues.iter().filter(|i| i.severity == IssueSeverity::High).count();
    md.push_str(&format!("- Total Issues: {}\n", data.issues.len()));
    md.push_str(&format!("- High Severity: {}\n", high));
    md.push_str(&format!("- Medium Severity: {}\n\n", data.issues.len() - high));

    md.push_str("## Inventory\n\n");
    md.push_str("| URL | Title | Section | Depth |\n");
    md.push_str("|-----|-------|---------|-------|\n");
    for page in &data.pages {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            page.resource.raw_location,
            page.title.as_deref().unwrap_or("").replace('|', "\\|"),
            page.section.as_deref().unwrap_or(""),
            page.depth
        ));
    }
    md.push('\n');

    // Issues grouped by category
    let mut by_category: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
    for issue in &data.issues {
        by_category.entry(issue.category.as_str()).or_default().push(issue);
    }
    for (category, issues) in by_category {
        md.push_str(&format!("## {} Issues\n\n", category));
        for (idx, issue) in issues.iter().enumerate() {
            md.push_str(&format!("### {}. {}\n\n", idx + 1, issue.kind));
            md.push_str(&format!("**Severity:** {}\n\n", issue.severity.as_str()));
            md.push_str(&format!("**Description:** {}\n\n", issue.description));
            if let Some(rule) = &issue.rule {
                md.push_str(&format!("**Rule:** {}\n\n", rule));
            }
            if let Some(help) = &issue.help {
                md.push_str(&format!("**Help:** {}\n\n", help));
            }
            if let Some(url) = &issue.url {
                md.push_str(&format!("**Affected URL:** {}\n\n", url));
            }
            if !issue.affected_pages.is_empty() {
                md.push_str("**Affected Pages:**\n");
                for page in &issue.affected_pages {
                    md.push_str(&format!("- {}\n", page));
                }
                md.push('\n');
            }
            if let Some(recommendation) = &issue.recommendation {
                md.push_str(&format!("**Recommendation:** {}\n\n", recommendation));
            }
            md.push_str(&format!("**Occurrences:** {}\n\n", issue.count));
            md.push_str("---\n\n");
        }
    }

    if !data.journeys.is_empty() {
        md.push_str("## Journeys\n\n");
        for journey in &data.journeys {
            let verdict = if journey.passed() { "✅" } else { "❌" };
            md.push_str(&format!(
                "- {} **{}** ({}/{} steps)\n",
                verdict, journey.name, journey.steps_completed, journey.steps_total
            ));
        }
        md.push('\n');
    }

    md.push_str("## Navigation Map\n\n```\n");
    md.push_str(&NavigationMap::build(&data.pages, &data.edges).render_tree());
    md.push_str("```\n");
    md
}

/// Inventory as CSV: URL, Title, Breadcrumb, Section, Timestamp.
pub fn generate_csv_report(data: &ReportData) -> String {
    let mut csv = String::from("URL,Title,Breadcrumb,Section,Timestamp\n");
    for page in &data.pages {
        let row = [
            csv_field(&page.resource.raw_location),
            csv_field(page.title.as_deref().unwrap_or("")),
            csv_field(page.breadcrumb.as_deref().unwrap_or("")),
            csv_field(page.section.as_deref().unwrap_or("")),
            csv_field(&page.visited_at.to_rfc3339()),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> std::result::Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
        ReportFormat::Csv => Ok(generate_csv_report(data)),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() + 1 > width - indent.len() && !current_line.is_empty() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
