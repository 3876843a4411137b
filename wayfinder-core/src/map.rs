// Navigation map: which resource was reached from which

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use wayfinder_scanner::CanonicalId;
use wayfinder_scanner::explorer::{NavigationEdge, PageRecord};

use crate::crawl::extract_url_path;

#[derive(Debug, Clone)]
pub struct MapNode {
    pub id: CanonicalId,
    pub location: String,
    pub title: Option<String>,
    pub section: Option<String>,
}

impl MapNode {
    fn label(&self) -> String {
        let path = extract_url_path(&self.location);
        let mut label = match &self.title {
            Some(title) if !title.trim().is_empty() => format!("{} ({})", title.trim(), path),
            _ => path,
        };
        if let Some(section) = &self.section {
            label.push_str(&format!(" [{}]", section));
        }
        label
    }
}

#[derive(Debug, Default)]
pub struct NavigationMap {
    graph: DiGraph<MapNode, String>,
    index: HashMap<CanonicalId, NodeIndex>,
}

impl NavigationMap {
    pub fn build(pages: &[PageRecord], edges: &[NavigationEdge]) -> Self {
        let mut map = Self::default();
        for page in pages {
            map.insert_node(MapNode {
                id: page.resource.canonical_id.clone(),
                location: page.resource.raw_location.clone(),
                title: page.title.clone(),
                section: page.section.clone(),
            });
        }
        for edge in edges {
            let from = map.node_for(&edge.from);
            let to = map.node_for(&edge.to);
            if from != to {
                map.graph.add_edge(from, to, edge.via.clone());
            }
        }
        map
    }

    fn insert_node(&mut self, node: MapNode) -> NodeIndex {
        if let Some(idx) = self.index.get(&node.id) {
            return *idx;
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        idx
    }

    /// Edges may mention resources that were never recorded as pages.
    fn node_for(&mut self, id: &CanonicalId) -> NodeIndex {
        self.insert_node(MapNode {
            id: id.clone(),
            location: id.to_string(),
            title: None,
            section: None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes nothing links to, in insertion order.
    pub fn roots(&self) -> Vec<&MapNode> {
        self.graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| &self.graph[idx])
            .collect()
    }

    fn child_edges(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut children: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        children.sort_by_key(|(edge, _)| edge.index());
        children
    }

    /// Resources reached from `id`, with the intent that reached them.
    pub fn children(&self, id: &CanonicalId) -> Vec<(&MapNode, &str)> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.child_edges(*idx)
            .into_iter()
            .map(|(edge, target)| (&self.graph[target], self.graph[edge].as_str()))
            .collect()
    }

    /// The chain of resources from a root to `id`.
    pub fn path_to(&self, id: &CanonicalId) -> Option<Vec<&MapNode>> {
        let mut current = *self.index.get(id)?;
        let mut path = vec![&self.graph[current]];
        let mut seen = HashSet::from([current]);
        while let Some(parent) = self
            .graph
            .neighbors_directed(current, Direction::Incoming)
            .find(|p| !seen.contains(p))
        {
            seen.insert(parent);
            path.push(&self.graph[parent]);
            current = parent;
        }
        path.reverse();
        Some(path)
    }

    pub fn render_tree(&self) -> String {
        if self.graph.node_count() == 0 {
            return "  (empty)\n".to_string();
        }

        let mut result = String::new();
        let mut seen = HashSet::new();
        for root in self.graph.node_indices().filter(|idx| {
            self.graph
                .neighbors_directed(*idx, Direction::Incoming)
                .next()
                .is_none()
        }) {
            seen.insert(root);
            result.push_str(&self.graph[root].label());
            result.push('\n');
            self.render_children(root, "", &mut seen, &mut result);
        }
        result
    }

    fn render_children(
        &self,
        idx: NodeIndex,
        indent: &str,
        seen: &mut HashSet<NodeIndex>,
        out: &mut String,
    ) {
        let children: Vec<(EdgeIndex, NodeIndex)> = self
            .child_edges(idx)
            .into_iter()
            .filter(|(_, target)| !seen.contains(target))
            .collect();

        for (i, (_, target)) in children.iter().enumerate() {
            if !seen.insert(*target) {
                continue;
            }
            let is_last = i == children.len() - 1;
            let branch = if is_last { "└── " } else { "├── " };
            out.push_str(&format!("{}{}{}\n", indent, branch, self.graph[*target].label()));
            let next_indent = format!("{}{}", indent, if is_last { "    " } else { "│   " });
            self.render_children(*target, &next_indent, seen, out);
        }
    }
}
