// Scripted journeys: fixed sequences of open/click/fill/submit steps whose
// elements are found through the same resolver the explorer uses.

use crate::document::Document;
use crate::error::{BranchFailure, DocumentError, ScanError};
use crate::ledger::{ActionKind, ActionLedger};
use crate::locator::Intent;
use crate::resolver::{ElementResolver, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum JourneyStep {
    Open {
        url: String,
    },
    Click {
        locators: Vec<String>,
    },
    /// `value` may contain `{prefix}`, replaced with the run's test-data prefix.
    Fill {
        locators: Vec<String>,
        value: String,
    },
    Submit {
        locators: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub name: String,
    pub steps: Vec<JourneyStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Succeeded(String),
    Failed(String),
    Unknown,
}

/// Decides what a form submission achieved by looking at the page afterwards.
#[async_trait]
pub trait SuccessSignal: Send + Sync {
    async fn observe(
        &self,
        document: &mut dyn Document,
        resolver: &ElementResolver,
    ) -> SubmissionOutcome;
}

/// Looks for alert-style feedback. Error indicators are checked before success
/// indicators, so a page showing both counts as failed. The location is never
/// consulted.
#[derive(Debug, Clone)]
pub struct AlertSignal {
    errors: Intent,
    successes: Intent,
    success_words: Vec<String>,
}

impl AlertSignal {
    pub fn new(errors: Intent, successes: Intent, success_words: Vec<String>) -> Self {
        Self {
            errors,
            successes,
            success_words,
        }
    }
}

impl Default for AlertSignal {
    fn default() -> Self {
        Self::new(
            Intent::from_selectors(
                "error indicator",
                &[
                    "[class*=\"alert-danger\"]",
                    "[class*=\"alert-error\"]",
                    ".error-message",
                    ".invalid-feedback",
                    "[role=\"alert\"]:has-text(\"error\")",
                ],
            ),
            Intent::from_selectors(
                "success indicator",
                &[
                    "text=/success/i",
                    "text=/created/i",
                    "text=/saved/i",
                    "[class*=\"success\"]",
                    "[class*=\"alert-success\"]",
                    "[role=\"alert\"]",
                ],
            ),
            vec!["success".to_string(), "created".to_string(), "saved".to_string()],
        )
    }
}

#[async_trait]
impl SuccessSignal for AlertSignal {
    async fn observe(
        &self,
        document: &mut dyn Document,
        resolver: &ElementResolver,
    ) -> SubmissionOutcome {
        if let Resolution::Found { element, .. } = resolver.resolve(document, &self.errors).await {
            let message = if element.text.is_empty() {
                element.name
            } else {
                element.text
            };
            return SubmissionOutcome::Failed(message);
        }

        if let Resolution::Found { element, .. } = resolver.resolve(document, &self.successes).await {
            let text = element.text.to_lowercase();
            if self.success_words.iter().any(|w| text.contains(w.as_str())) {
                return SubmissionOutcome::Succeeded(element.text);
            }
        }

        SubmissionOutcome::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyReport {
    pub name: String,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub submission: Option<SubmissionOutcome>,
    pub failure: Option<String>,
}

impl JourneyReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
            && self.steps_completed == self.steps_total
            && !matches!(self.submission, Some(SubmissionOutcome::Failed(_)))
    }
}

pub struct JourneyRunner {
    resolver: ElementResolver,
    signal: Arc<dyn SuccessSignal>,
    prefix: String,
}

impl JourneyRunner {
    pub fn new(resolver: ElementResolver, prefix: impl Into<String>) -> Self {
        Self {
            resolver,
            signal: Arc::new(AlertSignal::default()),
            prefix: prefix.into(),
        }
    }

    pub fn with_signal(mut self, signal: Arc<dyn SuccessSignal>) -> Self {
        self.signal = signal;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Runs the steps in order. A failing step ends this journey and is
    /// recorded; only ledger write failures are returned as errors.
    pub async fn run(
        &self,
        document: &mut dyn Document,
        journey: &Journey,
        ledger: &mut ActionLedger,
    ) -> Result<JourneyReport, ScanError> {
        info!("Running journey '{}' ({} steps)", journey.name, journey.steps.len());
        let mut report = JourneyReport {
            name: journey.name.clone(),
            steps_completed: 0,
            steps_total: journey.steps.len(),
            submission: None,
            failure: None,
        };

        for (n, step) in journey.steps.iter().enumerate() {
            let label = format!("{} step {}", journey.name, n + 1);
            match self.step(document, &label, step, ledger).await? {
                Ok(submission) => {
                    if submission.is_some() {
                        report.submission = submission;
                    }
                    report.steps_completed += 1;
                }
                Err(failure) => {
                    warn!("Journey '{}' stopped: {}", journey.name, failure);
                    let here = document.current_location().await.ok();
                    ledger.append(ActionKind::Error, label, here, false, Some(failure.to_string()))?;
                    report.failure = Some(failure.to_string());
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn step(
        &self,
        document: &mut dyn Document,
        label: &str,
        step: &JourneyStep,
        ledger: &mut ActionLedger,
    ) -> Result<Result<Option<SubmissionOutcome>, BranchFailure>, ScanError> {
        let limit = self.resolver.timeout();
        let timeout_ms = limit.as_millis() as u64;
        let failure = |target: &str, e: Option<DocumentError>| match e {
            None | Some(DocumentError::Timeout) => BranchFailure::NavigationTimeout {
                target: target.to_string(),
                timeout_ms,
            },
            Some(e) => BranchFailure::Activation {
                target: target.to_string(),
                reason: e.to_string(),
            },
        };

        match step {
            JourneyStep::Open { url } => {
                let url = url.replace("{prefix}", &self.prefix);
                match timeout(limit, document.navigate(&url)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Ok(Err(failure(&url, Some(e)))),
                    Err(_) => return Ok(Err(failure(&url, None))),
                }
                if let Err(e) = self.settle(document).await {
                    return Ok(Err(failure(&url, e)));
                }
                let here = document.current_location().await.ok();
                ledger.append(ActionKind::Navigate, url, here, true, None)?;
                Ok(Ok(None))
            }
            JourneyStep::Click { locators } | JourneyStep::Submit { locators } => {
                let intent = Intent::from_selectors(label, locators);
                let Resolution::Found { element, locator } = self.resolver.resolve(document, &intent).await
                else {
                    return Ok(Err(BranchFailure::ResolutionFailure {
                        intent: label.to_string(),
                    }));
                };
                let target = locator.query.to_string();
                match timeout(limit, document.click(&element)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Ok(Err(failure(&target, Some(e)))),
                    Err(_) => return Ok(Err(failure(&target, None))),
                }
                if let Err(e) = self.settle(document).await {
                    return Ok(Err(failure(&target, e)));
                }
                let here = document.current_location().await.ok();

                if matches!(step, JourneyStep::Submit { .. }) {
                    let outcome = self.signal.observe(document, &self.resolver).await;
                    debug!("Submission outcome for '{}': {:?}", label, outcome);
                    let success = !matches!(outcome, SubmissionOutcome::Failed(_));
                    let detail = match &outcome {
                        SubmissionOutcome::Succeeded(m) => format!("succeeded: {}", m),
                        SubmissionOutcome::Failed(m) => format!("failed: {}", m),
                        SubmissionOutcome::Unknown => "outcome unknown".to_string(),
                    };
                    ledger.append(ActionKind::Submit, target, here, success, Some(detail))?;
                    Ok(Ok(Some(outcome)))
                } else {
                    ledger.append(ActionKind::Click, target, here, true, None)?;
                    Ok(Ok(None))
                }
            }
            JourneyStep::Fill { locators, value } => {
                let intent = Intent::from_selectors(label, locators);
                let Resolution::Found { element, locator } = self.resolver.resolve(document, &intent).await
                else {
                    return Ok(Err(BranchFailure::ResolutionFailure {
                        intent: label.to_string(),
                    }));
                };
                let value = value.replace("{prefix}", &self.prefix);
                let target = locator.query.to_string();
                match timeout(limit, document.fill(&element, &value)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Ok(Err(failure(&target, Some(e)))),
                    Err(_) => return Ok(Err(failure(&target, None))),
                }
                let here = document.current_location().await.ok();
                ledger.append(ActionKind::Fill, target, here, true, Some(value))?;
                Ok(Ok(None))
            }
        }
    }

    async fn settle(&self, document: &mut dyn Document) -> Result<(), Option<DocumentError>> {
        let limit = self.resolver.timeout();
        match timeout(limit, document.wait_for_settled(limit)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Some(e)),
            Err(_) => Err(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_deserialize_from_toml_shape() {
        let json = r##"{
            "name": "create client",
            "steps": [
                {"action": "open", "url": "https://app.test/clients/new"},
                {"action": "fill", "locators": ["input[name=name]", "#name"], "value": "{prefix}_client"},
                {"action": "submit", "locators": ["button:has-text(\"Save\")"]}
            ]
        }"##;
        let journey: Journey = serde_json::from_str(json).unwrap();
        assert_eq!(journey.steps.len(), 3);
        assert!(matches!(&journey.steps[1], JourneyStep::Fill { value, .. } if value == "{prefix}_client"));
    }

    #[test]
    fn test_report_passed() {
        let mut report = JourneyReport {
            name: "j".into(),
            steps_completed: 2,
            steps_total: 2,
            submission: Some(SubmissionOutcome::Unknown),
            failure: None,
        };
        assert!(report.passed());
        report.submission = Some(SubmissionOutcome::Failed("Name is required".into()));
        assert!(!report.passed());
    }
}
