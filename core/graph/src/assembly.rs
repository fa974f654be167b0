use provenance_schemas::{Fragment, FragmentLink, GraphData, GraphEdge, GraphNode};
use std::collections::{HashMap, HashSet};

/// Assemble a node/edge view from a fragment snapshot and the link set.
///
/// Only edges whose source AND target are both in the snapshot survive, so
/// the rendered view never contains dangling edges. Each node's
/// `connections` is its degree within that surviving edge set — a different
/// filter upstream changes which edges count, so this is recomputed on
/// every call and never cached. Pure function: same inputs, same output.
pub fn build_graph(fragments: &[Fragment], links: &[FragmentLink]) -> GraphData {
    let fragment_ids: HashSet<&str> = fragments.iter().map(|f| f.id.0.as_str()).collect();

    let edges: Vec<GraphEdge> = links
        .iter()
        .filter(|link| {
            fragment_ids.contains(link.source_id.0.as_str())
                && fragment_ids.contains(link.target_id.0.as_str())
        })
        .map(|link| GraphEdge {
            id: link.id.clone(),
            source: link.source_id.clone(),
            target: link.target_id.clone(),
            link_type: link.link_type,
            strength: link.strength,
        })
        .collect();

    // Degree restricted to the kept edges. Parallel edges each count; the
    // edge direction is irrelevant for connection counting.
    let mut connections: HashMap<&str, usize> = HashMap::new();
    for edge in &edges {
        *connections.entry(edge.source.0.as_str()).or_default() += 1;
        *connections.entry(edge.target.0.as_str()).or_default() += 1;
    }

    let nodes = fragments
        .iter()
        .map(|fragment| GraphNode {
            id: fragment.id.clone(),
            // Full content; shortening for display is a presentation concern.
            label: fragment.content.clone(),
            source_type: fragment.source_type,
            project: fragment.project.clone(),
            captured_at: fragment.captured_at.clone(),
            topics: fragment.topics.clone(),
            connections: connections
                .get(fragment.id.0.as_str())
                .copied()
                .unwrap_or(0),
        })
        .collect();

    GraphData { nodes, edges }
}
