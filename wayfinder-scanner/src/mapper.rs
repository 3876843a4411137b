use crate::document::ElementHandle;
use crate::identity::{CanonicalId, ResourceIdentity};
use crate::locator::{Intent, normalize_whitespace, section_locators};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

pub const DEFAULT_VOCABULARY: &[&str] = &[
    "client",
    "task",
    "deadline",
    "staff",
    "workflow",
    "document",
    "report",
    "setting",
    "dashboard",
    "calendar",
    "notification",
    "search",
    "filter",
    "export",
    "import",
];

const CREATE_WORDS: &[&str] = &["add", "new", "create", "insert"];
const READ_WORDS: &[&str] = &["view", "show", "details", "open", "see"];
const UPDATE_WORDS: &[&str] = &["edit", "update", "modify", "change"];
const DELETE_WORDS: &[&str] = &["delete", "remove", "trash", "destroy"];

/// Priority offset for the keyword cascade behind an item's own locators.
const CASCADE_PRIORITY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Navigation,
    Content,
    Widget,
}

/// An interactive element found on a page, before classification.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub text: String,
    pub tag: String,
    pub href: Option<String>,
    pub region: Region,
    pub target: Option<String>,
    pub target_id: Option<CanonicalId>,
    pub intent: Intent,
}

impl CandidateItem {
    pub fn from_element(
        element: &ElementHandle,
        region: Region,
        identity: &ResourceIdentity,
        anchor: &str,
    ) -> Self {
        let href = element.href().map(|h| h.trim().to_string());
        let target = href
            .as_deref()
            .filter(|h| is_followable(h))
            .and_then(|h| Url::parse(anchor).ok()?.join(h).ok())
            .map(|u| u.to_string());
        let target_id = target.as_deref().map(|t| identity.canonicalize(t, Some(anchor)));

        Self {
            text: if element.name.is_empty() {
                normalize_whitespace(&element.text)
            } else {
                element.name.clone()
            },
            tag: element.tag.clone(),
            href,
            region,
            target,
            target_id,
            intent: Intent::for_element(element),
        }
    }
}

/// Links that lead nowhere a crawler can follow.
pub fn is_followable(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href == "#"
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Section,
    Navigation,
    Widget,
    Operation,
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeatureKind::Section => "section",
            FeatureKind::Navigation => "navigation",
            FeatureKind::Widget => "widget",
            FeatureKind::Operation => "operation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    fn classify(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let hit = |set: &[&str]| words.iter().any(|w| set.contains(w));

        if hit(CREATE_WORDS) {
            Some(Operation::Create)
        } else if hit(UPDATE_WORDS) {
            Some(Operation::Update)
        } else if hit(DELETE_WORDS) {
            Some(Operation::Delete)
        } else if hit(READ_WORDS) {
            Some(Operation::Read)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredFeature {
    pub name: String,
    pub kind: FeatureKind,
    pub intent: Intent,
    pub related_resources: Vec<CanonicalId>,
    pub target: Option<String>,
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

/// Groups discovered elements into named sections by keyword.
#[derive(Debug, Clone)]
pub struct SectionMapper {
    vocabulary: Vec<String>,
}

impl SectionMapper {
    pub fn new(vocabulary: Vec<String>) -> Self {
        Self {
            vocabulary: vocabulary
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// First vocabulary keyword found in the item's text or link.
    pub fn classify(&self, item: &CandidateItem) -> Option<String> {
        let text = item.text.to_lowercase();
        let href = item.href.as_deref().unwrap_or_default().to_lowercase();
        self.vocabulary
            .iter()
            .find(|k| text.contains(k.as_str()) || href.contains(k.as_str()))
            .map(|k| section_name(k))
    }

    /// Sections in vocabulary order, then unmatched items as navigation, then widgets.
    /// Nothing is dropped: every non-widget item appears in exactly one feature.
    pub fn map_sections(&self, items: &[CandidateItem]) -> Vec<DiscoveredFeature> {
        let mut features = Vec::new();
        let mut claimed = vec![false; items.len()];
        let links: Vec<(usize, &CandidateItem)> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.region != Region::Widget)
            .collect();

        for keyword in &self.vocabulary {
            let name = section_name(keyword);
            let members: Vec<(usize, &CandidateItem)> = links
                .iter()
                .filter(|(i, item)| !claimed[*i] && self.classify(item).as_deref() == Some(name.as_str()))
                .copied()
                .collect();
            let Some(&(_, primary)) = members.first() else {
                continue;
            };

            let intent = Intent::new(
                format!("open section {}", name),
                primary.intent.locators.clone(),
            )
            .extend(section_locators(keyword, CASCADE_PRIORITY));

            features.push(DiscoveredFeature {
                name: name.clone(),
                kind: FeatureKind::Section,
                intent,
                related_resources: members.iter().filter_map(|(_, m)| m.target_id.clone()).collect(),
                target: primary.target.clone(),
                section: Some(name.clone()),
                operation: None,
            });

            for (i, member) in &members {
                claimed[*i] = true;
                if std::ptr::eq(*member, primary) {
                    continue;
                }
                features.push(navigation_feature(member, Some(name.clone())));
            }
        }

        for (i, item) in &links {
            if !claimed[*i] {
                features.push(navigation_feature(item, None));
            }
        }

        for (n, item) in items.iter().filter(|i| i.region == Region::Widget).enumerate() {
            let name = if item.text.is_empty() {
                format!("Widget {}", n + 1)
            } else {
                truncate(&item.text, 60)
            };
            features.push(DiscoveredFeature {
                name,
                kind: FeatureKind::Widget,
                intent: item.intent.clone(),
                related_resources: Vec::new(),
                target: None,
                section: None,
                operation: None,
            });
        }

        features
    }

    /// CRUD controls on a page, classified by their visible wording.
    pub fn classify_operations(
        &self,
        section: Option<&str>,
        items: &[CandidateItem],
    ) -> Vec<DiscoveredFeature> {
        let mut seen = HashSet::new();
        items
            .iter()
            .filter(|item| item.region != Region::Widget && !item.text.is_empty())
            .filter_map(|item| {
                let op = Operation::classify(&item.text)?;
                if !seen.insert((op, item.text.to_lowercase())) {
                    return None;
                }
                Some(DiscoveredFeature {
                    name: truncate(&item.text, 60),
                    kind: FeatureKind::Operation,
                    intent: item.intent.clone(),
                    related_resources: item.target_id.iter().cloned().collect(),
                    target: item.target.clone(),
                    section: section.map(str::to_string),
                    operation: Some(op),
                })
            })
            .collect()
    }
}

impl Default for SectionMapper {
    fn default() -> Self {
        Self::new(DEFAULT_VOCABULARY.iter().map(|k| k.to_string()).collect())
    }
}

fn navigation_feature(item: &CandidateItem, section: Option<String>) -> DiscoveredFeature {
    DiscoveredFeature {
        name: if item.text.is_empty() {
            item.target.clone().unwrap_or_else(|| item.tag.clone())
        } else {
            truncate(&item.text, 60)
        },
        kind: FeatureKind::Navigation,
        intent: item.intent.clone(),
        related_resources: item.target_id.iter().cloned().collect(),
        target: item.target.clone(),
        section,
        operation: None,
    }
}

fn section_name(keyword: &str) -> String {
    let mut chars = keyword.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect::<String>() + "..."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn link(text: &str, href: &str, index: usize) -> CandidateItem {
        let mut attributes = BTreeMap::new();
        attributes.insert("href".to_string(), href.to_string());
        let element = ElementHandle {
            generation: 1,
            index,
            tag: "a".to_string(),
            text: text.to_string(),
            name: text.to_string(),
            attributes,
            visible: true,
        };
        CandidateItem::from_element(
            &element,
            Region::Navigation,
            &ResourceIdentity::new(),
            "https://app.test/",
        )
    }

    fn button(text: &str, region: Region) -> CandidateItem {
        let element = ElementHandle {
            generation: 1,
            index: 0,
            tag: "button".to_string(),
            text: text.to_string(),
            name: text.to_string(),
            attributes: BTreeMap::new(),
            visible: true,
        };
        CandidateItem::from_element(&element, region, &ResourceIdentity::new(), "https://app.test/")
    }

    #[test]
    fn test_sections_follow_vocabulary_order() {
        let mapper = SectionMapper::new(vec!["client".into(), "task".into()]);
        let items = vec![
            link("My Tasks", "/tasks", 0),
            link("Clients", "/clients", 1),
            link("Help", "/help", 2),
        ];
        let features = mapper.map_sections(&items);

        let summary: Vec<(FeatureKind, &str)> =
            features.iter().map(|f| (f.kind, f.name.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (FeatureKind::Section, "Client"),
                (FeatureKind::Section, "Task"),
                (FeatureKind::Navigation, "Help"),
            ]
        );
        assert_eq!(features[0].target.as_deref(), Some("https://app.test/clients"));
    }

    #[test]
    fn test_unmatched_items_are_kept() {
        let mapper = SectionMapper::new(vec!["invoice".into()]);
        let items = vec![link("Home", "/", 0), link("About", "/about", 1)];
        let features = mapper.map_sections(&items);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.kind == FeatureKind::Navigation));
    }

    #[test]
    fn test_section_members_become_navigation_under_section() {
        let mapper = SectionMapper::default();
        let items = vec![
            link("Clients", "/clients", 0),
            link("Client groups", "/clients/groups", 1),
        ];
        let features = mapper.map_sections(&items);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].kind, FeatureKind::Section);
        assert_eq!(features[0].related_resources.len(), 2);
        assert_eq!(features[1].kind, FeatureKind::Navigation);
        assert_eq!(features[1].section.as_deref(), Some("Client"));
    }

    #[test]
    fn test_section_intent_falls_back_to_keyword_cascade() {
        let mapper = SectionMapper::default();
        let features = mapper.map_sections(&[link("Reports", "/reports", 0)]);
        let intent = &features[0].intent;
        assert!(intent.locators[0].priority < CASCADE_PRIORITY);
        assert!(
            intent
                .locators
                .iter()
                .any(|l| l.query.as_str() == "text=/report/i")
        );
    }

    #[test]
    fn test_href_keyword_classifies() {
        let mapper = SectionMapper::default();
        let item = link("People", "/staff/list", 0);
        assert_eq!(mapper.classify(&item).as_deref(), Some("Staff"));
    }

    #[test]
    fn test_widgets_listed_after_links() {
        let mapper = SectionMapper::default();
        let items = vec![button("Open tasks 12", Region::Widget), link("Home", "/", 0)];
        let features = mapper.map_sections(&items);
        assert_eq!(features.last().map(|f| f.kind), Some(FeatureKind::Widget));
    }

    #[test]
    fn test_crud_operations() {
        let mapper = SectionMapper::default();
        let items = vec![
            button("Add Client", Region::Content),
            button("Edit", Region::Content),
            button("Remove", Region::Content),
            button("View details", Region::Content),
            button("Add Client", Region::Content),
            button("Refresh", Region::Content),
        ];
        let ops = mapper.classify_operations(Some("Client"), &items);
        let kinds: Vec<Operation> = ops.iter().filter_map(|f| f.operation).collect();
        assert_eq!(
            kinds,
            vec![
                Operation::Create,
                Operation::Update,
                Operation::Delete,
                Operation::Read
            ]
        );
        assert!(ops.iter().all(|f| f.section.as_deref() == Some("Client")));
    }

    #[test]
    fn test_unfollowable_links() {
        assert!(!is_followable("javascript:void(0)"));
        assert!(!is_followable("mailto:a@b.c"));
        assert!(!is_followable("#"));
        assert!(is_followable("#/clients"));
        assert!(is_followable("/reports"));
    }
}
