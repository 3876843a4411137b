use crate::error::{DocumentError, ProbeError};
use crate::locator::ElementQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

/// A live element reference. Only valid for the document generation it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub generation: u64,
    /// Position in document order within that generation.
    pub index: usize,
    pub tag: String,
    pub text: String,
    /// Accessible name: aria-label, title, text, then image alt.
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub visible: bool,
}

impl ElementHandle {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href")
    }

    pub fn is_disabled(&self) -> bool {
        self.attributes.contains_key("disabled")
            || self
                .attr("aria-disabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn is_submit(&self) -> bool {
        match self.tag.as_str() {
            "input" => self
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("submit")),
            "button" => self
                .attr("type")
                .is_none_or(|t| t.eq_ignore_ascii_case("submit")),
            _ => false,
        }
    }
}

/// Read-only copy of a settled page, safe to hand to probes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub location: String,
    pub title: Option<String>,
    pub html: String,
    pub text: String,
    pub load_time: Duration,
    pub status: Option<u16>,
}

/// The automation surface the engine drives. Everything takes `&mut self`: one
/// caller touches the document at a time.
#[async_trait]
pub trait Document: Send {
    async fn query(&mut self, query: &ElementQuery) -> DocumentResult<Vec<ElementHandle>>;

    async fn is_visible(&mut self, element: &ElementHandle) -> DocumentResult<bool>;

    async fn click(&mut self, element: &ElementHandle) -> DocumentResult<()>;

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> DocumentResult<()>;

    async fn current_location(&mut self) -> DocumentResult<String>;

    async fn navigate(&mut self, location: &str) -> DocumentResult<()>;

    async fn wait_for_settled(&mut self, timeout: Duration) -> DocumentResult<()>;

    async fn snapshot(&mut self) -> DocumentResult<PageSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub impact: Impact,
    pub description: String,
    pub help: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfSample {
    pub load_time_ms: u64,
    pub transfer_bytes: usize,
    pub element_count: usize,
    pub script_count: usize,
    pub form_count: usize,
}

/// Accessibility and performance annotations for a settled page.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn audit(&self, page: &PageSnapshot) -> Result<Vec<Violation>, ProbeError>;

    async fn metrics(&self, page: &PageSnapshot) -> Result<PerfSample, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired { reason: String },
}

pub trait SessionGuard: Send + Sync {
    fn check(&self, page: &PageSnapshot) -> SessionStatus;
}

/// Treats landing on a sign-in screen as an expired session.
#[derive(Debug, Clone)]
pub struct SignInDetector {
    location_markers: Vec<String>,
    text_markers: Vec<String>,
}

impl SignInDetector {
    pub fn new(location_markers: Vec<String>, text_markers: Vec<String>) -> Self {
        Self {
            location_markers: location_markers.into_iter().map(|m| m.to_lowercase()).collect(),
            text_markers: text_markers.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

impl Default for SignInDetector {
    fn default() -> Self {
        Self::new(vec!["sign-in".to_string(), "login".to_string()], Vec::new())
    }
}

impl SessionGuard for SignInDetector {
    fn check(&self, page: &PageSnapshot) -> SessionStatus {
        let location = page.location.to_lowercase();
        if let Some(marker) = self.location_markers.iter().find(|m| location.contains(m.as_str())) {
            return SessionStatus::Expired {
                reason: format!("location contains '{}'", marker),
            };
        }

        if !self.text_markers.is_empty() {
            let text = page.text.to_lowercase();
            if let Some(marker) = self.text_markers.iter().find(|m| text.contains(m.as_str())) {
                return SessionStatus::Expired {
                    reason: format!("page text contains '{}'", marker),
                };
            }
        }

        SessionStatus::Active
    }
}
