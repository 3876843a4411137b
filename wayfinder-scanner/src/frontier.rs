use crate::identity::{CanonicalId, NavigableResource};
use crate::locator::Intent;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Every resource reached during a run. Membership only grows.
#[derive(Debug, Default)]
pub struct VisitedSet {
    ids: HashMap<CanonicalId, usize>,
    documents: HashSet<CanonicalId>,
    resources: Vec<NavigableResource>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the resource was already present.
    pub fn mark_visited(&mut self, resource: NavigableResource) -> bool {
        if self.ids.contains_key(&resource.canonical_id) {
            return false;
        }
        self.ids.insert(resource.canonical_id.clone(), self.resources.len());
        self.documents.insert(resource.document_id.clone());
        self.resources.push(resource);
        true
    }

    /// Known under either its full identity or its fragment-stripped form.
    pub fn is_visited(&self, id: &CanonicalId) -> bool {
        self.ids.contains_key(id) || self.documents.contains(id)
    }

    pub fn get(&self, id: &CanonicalId) -> Option<&NavigableResource> {
        self.ids.get(id).map(|&i| &self.resources[i])
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// In visit order.
    pub fn resources(&self) -> &[NavigableResource] {
        &self.resources
    }
}

#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub intent: Intent,
    pub depth: usize,
    pub origin: CanonicalId,
    /// Where the item's link points, when that is knowable before activation.
    pub target: Option<String>,
    pub target_id: Option<CanonicalId>,
    /// Section the item was classified under.
    pub section: Option<String>,
}

impl FrontierItem {
    pub fn new(intent: Intent, depth: usize, origin: CanonicalId) -> Self {
        Self {
            intent,
            depth,
            origin,
            target: None,
            target_id: None,
            section: None,
        }
    }

    pub fn with_target(mut self, target: String, target_id: CanonicalId) -> Self {
        self.target = Some(target);
        self.target_id = Some(target_id);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    fn key(&self) -> String {
        match &self.target_id {
            Some(id) => id.to_string(),
            None => format!("{}::{}", self.origin, self.intent.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyVisited,
    AlreadyQueued,
    BreadthExceeded,
    TooDeep,
}

/// FIFO work queue bounded per origin (breadth) and overall (depth).
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierItem>,
    ever_queued: HashSet<String>,
    children: HashMap<CanonicalId, usize>,
    max_depth: usize,
    max_breadth: usize,
}

impl Frontier {
    pub fn new(max_depth: usize, max_breadth: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            ever_queued: HashSet::new(),
            children: HashMap::new(),
            max_depth,
            max_breadth,
        }
    }

    pub fn enqueue(&mut self, item: FrontierItem, visited: &VisitedSet) -> EnqueueOutcome {
        if item.depth > self.max_depth {
            debug!("Discarding '{}' at depth {}", item.intent.name, item.depth);
            return EnqueueOutcome::TooDeep;
        }
        if let Some(id) = &item.target_id
            && visited.is_visited(id)
        {
            return EnqueueOutcome::AlreadyVisited;
        }
        let key = item.key();
        if self.ever_queued.contains(&key) {
            return EnqueueOutcome::AlreadyQueued;
        }
        let count = self.children.entry(item.origin.clone()).or_insert(0);
        if *count >= self.max_breadth {
            return EnqueueOutcome::BreadthExceeded;
        }

        *count += 1;
        self.ever_queued.insert(key);
        self.queue.push_back(item);
        EnqueueOutcome::Queued
    }

    pub fn dequeue(&mut self) -> Option<FrontierItem> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn max_breadth(&self) -> usize {
        self.max_breadth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ResourceIdentity;

    fn item(name: &str, depth: usize, origin: &str) -> FrontierItem {
        FrontierItem::new(
            Intent::from_selectors(name, &[format!("text={}", name)]),
            depth,
            CanonicalId::new(origin),
        )
    }

    #[test]
    fn test_fifo_order() {
        let visited = VisitedSet::new();
        let mut frontier = Frontier::new(3, 10);
        frontier.enqueue(item("a", 1, "root"), &visited);
        frontier.enqueue(item("b", 1, "root"), &visited);
        frontier.enqueue(item("c", 2, "a"), &visited);

        let order: Vec<String> = std::iter::from_fn(|| frontier.dequeue())
            .map(|i| i.intent.name)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let visited = VisitedSet::new();
        let mut frontier = Frontier::new(3, 10);
        let target = CanonicalId::new("https://x/clients");

        let first = item("clients", 1, "root").with_target("https://x/clients".into(), target.clone());
        let again = item("Clients link", 1, "other").with_target("https://x/clients".into(), target);

        assert_eq!(frontier.enqueue(first, &visited), EnqueueOutcome::Queued);
        assert_eq!(frontier.enqueue(again, &visited), EnqueueOutcome::AlreadyQueued);
        assert_eq!(frontier.len(), 1);

        // Dequeued keys stay known.
        frontier.dequeue();
        let third = item("x", 1, "root").with_target("https://x/clients".into(), CanonicalId::new("https://x/clients"));
        assert_eq!(frontier.enqueue(third, &visited), EnqueueOutcome::AlreadyQueued);
    }

    #[test]
    fn test_visited_targets_are_not_queued() {
        let identity = ResourceIdentity::new();
        let mut visited = VisitedSet::new();
        visited.mark_visited(identity.observe("https://x/app#/tasks", None));

        let mut frontier = Frontier::new(3, 10);
        let id = identity.canonicalize("https://x/app#/tasks?ts=4", None);
        let outcome = frontier.enqueue(
            item("tasks", 1, "root").with_target("https://x/app#/tasks?ts=4".into(), id),
            &visited,
        );
        assert_eq!(outcome, EnqueueOutcome::AlreadyVisited);
    }

    #[test]
    fn test_breadth_cap_per_origin() {
        let visited = VisitedSet::new();
        let mut frontier = Frontier::new(3, 2);
        assert_eq!(frontier.enqueue(item("a", 1, "root"), &visited), EnqueueOutcome::Queued);
        assert_eq!(frontier.enqueue(item("b", 1, "root"), &visited), EnqueueOutcome::Queued);
        assert_eq!(
            frontier.enqueue(item("c", 1, "root"), &visited),
            EnqueueOutcome::BreadthExceeded
        );
        assert_eq!(frontier.enqueue(item("c", 2, "a"), &visited), EnqueueOutcome::Queued);
    }

    #[test]
    fn test_depth_cap_is_hard() {
        let visited = VisitedSet::new();
        let mut frontier = Frontier::new(2, 10);
        assert_eq!(frontier.enqueue(item("deep", 3, "root"), &visited), EnqueueOutcome::TooDeep);
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_visited_set_keys_on_both_forms() {
        let identity = ResourceIdentity::new();
        let mut visited = VisitedSet::new();
        assert!(visited.mark_visited(identity.observe("https://x/app#/clients", None)));
        assert!(!visited.mark_visited(identity.observe("https://x/app#/clients?ts=9", None)));

        assert!(visited.is_visited(&CanonicalId::new("https://x/app#/clients")));
        assert!(visited.is_visited(&CanonicalId::new("https://x/app")));
        assert!(!visited.is_visited(&CanonicalId::new("https://x/app#/tasks")));
        assert_eq!(visited.len(), 1);
        assert_eq!(
            visited
                .get(&CanonicalId::new("https://x/app#/clients"))
                .map(|r| r.raw_location.as_str()),
            Some("https://x/app#/clients")
        );
    }
}
