use crate::document::{Document, ElementHandle};
use crate::locator::{CandidateLocator, Intent};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Outcome of a resolution. `NotFound` is an ordinary answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        element: ElementHandle,
        locator: CandidateLocator,
    },
    NotFound {
        attempts: usize,
    },
}

impl Resolution {
    pub fn element(&self) -> Option<&ElementHandle> {
        match self {
            Resolution::Found { element, .. } => Some(element),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found { .. })
    }
}

/// Walks an intent's locators in priority order and returns the first visible,
/// enabled match. Within one priority the element earliest in the document wins.
#[derive(Debug, Clone)]
pub struct ElementResolver {
    timeout: Duration,
}

impl ElementResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn resolve(&self, document: &mut dyn Document, intent: &Intent) -> Resolution {
        let mut locators: Vec<&CandidateLocator> = intent.locators.iter().collect();
        locators.sort_by_key(|l| l.priority);

        let mut attempts = 0;
        let mut i = 0;
        while i < locators.len() {
            let priority = locators[i].priority;
            let group_end = locators[i..]
                .iter()
                .position(|l| l.priority != priority)
                .map_or(locators.len(), |p| i + p);

            let mut best: Option<(ElementHandle, &CandidateLocator)> = None;
            for locator in &locators[i..group_end] {
                attempts += 1;
                if let Some(element) = self.first_eligible(document, locator).await
                    && best.as_ref().is_none_or(|(b, _)| element.index < b.index)
                {
                    best = Some((element, *locator));
                }
            }

            if let Some((element, locator)) = best {
                debug!(
                    "Resolved '{}' via {} ({})",
                    intent.name, locator.description, locator.query
                );
                return Resolution::Found {
                    element,
                    locator: locator.clone(),
                };
            }
            i = group_end;
        }

        debug!("No locator matched '{}' after {} attempts", intent.name, attempts);
        Resolution::NotFound { attempts }
    }

    async fn first_eligible(
        &self,
        document: &mut dyn Document,
        locator: &CandidateLocator,
    ) -> Option<ElementHandle> {
        let candidates = match timeout(self.timeout, document.query(&locator.query)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                debug!("Locator '{}' failed: {}", locator.query, e);
                return None;
            }
            Err(_) => {
                debug!("Locator '{}' timed out", locator.query);
                return None;
            }
        };

        for element in candidates {
            if element.is_disabled() {
                continue;
            }
            match timeout(self.timeout, document.is_visible(&element)).await {
                Ok(Ok(true)) => return Some(element),
                Ok(Ok(false)) => continue,
                Ok(Err(e)) => debug!("Visibility check failed for '{}': {}", locator.query, e),
                Err(_) => debug!("Visibility check timed out for '{}'", locator.query),
            }
        }
        None
    }
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
