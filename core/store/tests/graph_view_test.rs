use anyhow::Result;
use provenance_graph::build_graph;
use provenance_schemas::{LinkType, NewFragment};
use provenance_store::{FragmentFilter, Store};
use std::collections::BTreeSet;
use tempfile::TempDir;

/// End-to-end graph view: filtered snapshot in, induced subgraph out.
#[test]
fn test_project_graph_from_store() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Store::new(dir.path().join("provenance.db"))?;

    let a = store.create_fragment(&NewFragment {
        project: Some("payments".into()),
        captured_at: Some("2024-01-01T09:00:00".into()),
        ..NewFragment::quick_capture("switch to usage-based billing")
    })?;
    let b = store.create_fragment(&NewFragment {
        project: Some("payments".into()),
        captured_at: Some("2024-01-05T09:00:00".into()),
        ..NewFragment::quick_capture("bill in arrears, not upfront")
    })?;
    let outside = store.create_fragment(&NewFragment {
        project: Some("platform".into()),
        captured_at: Some("2024-01-03T09:00:00".into()),
        ..NewFragment::quick_capture("unrelated platform note")
    })?;

    store.add_link(&a.id, &b.id, Some(LinkType::RelatesTo), Some(0.8))?;
    // This edge leaves the filtered set and must not surface in the view.
    store.add_link(&a.id, &outside.id, Some(LinkType::References), Some(0.9))?;

    let filter = FragmentFilter::new().project("payments");
    let fragments = store.list_fragments(&filter, 10, 0)?;
    let links = store.list_links(5000)?;

    let graph = build_graph(&fragments, &links);

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    for node in &graph.nodes {
        // The cross-project edge does not count toward connections.
        assert_eq!(node.connections, 1);
    }
    assert_eq!(graph.edges[0].source, a.id);
    assert_eq!(graph.edges[0].target, b.id);

    // Global degree still sees both links on fragment A.
    assert_eq!(store.degree(&a.id)?, 2);

    Ok(())
}

#[test]
fn test_graph_view_is_deterministic() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Store::new(dir.path().join("provenance.db"))?;

    let mut ids = Vec::new();
    for i in 0..5 {
        let fragment = store.create_fragment(&NewFragment {
            captured_at: Some(format!("2024-02-0{}T12:00:00", i + 1)),
            ..NewFragment::quick_capture(format!("note {i}"))
        })?;
        ids.push(fragment.id);
    }
    store.add_link(&ids[0], &ids[1], None, Some(0.9))?;
    store.add_link(&ids[1], &ids[2], None, Some(0.4))?;
    store.add_link(&ids[3], &ids[4], Some(LinkType::Follows), Some(0.6))?;

    let filter = FragmentFilter::new();
    let first = build_graph(
        &store.list_fragments(&filter, 10, 0)?,
        &store.list_links(5000)?,
    );
    let second = build_graph(
        &store.list_fragments(&filter, 10, 0)?,
        &store.list_links(5000)?,
    );

    let nodes = |graph: &provenance_schemas::GraphData| -> BTreeSet<String> {
        graph.nodes.iter().map(|n| n.id.0.clone()).collect()
    };
    let edges = |graph: &provenance_schemas::GraphData| -> BTreeSet<String> {
        graph.edges.iter().map(|e| e.id.0.clone()).collect()
    };

    assert_eq!(nodes(&first), nodes(&second));
    assert_eq!(edges(&first), edges(&second));
    assert_eq!(first.nodes.len(), 5);
    assert_eq!(first.edges.len(), 3);

    Ok(())
}
