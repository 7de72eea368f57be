mod common;

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use common::{open_graph, temp_working_dir};
use kg_runtime::{
    IngestError,
    graph::{
        Consolidator, DocumentMeta, EntityNode, GraphStore, GraphWriter, RelationType,
        RelationshipEdge, ReviewStatus,
    },
    triplets::Polarity,
};

fn legacy_entity(id: &str, name: &str, entity_type: &str, age_minutes: i64) -> EntityNode {
    EntityNode {
        id: id.to_string(),
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        significance: None,
        created_by: None,
        created_at: Utc::now() - Duration::minutes(age_minutes),
        sources: vec![format!("doc-{id}")],
        embedding: None,
    }
}

fn legacy_edge(id: &str, subject: &str, object: &str, source: &str, confidence: f64) -> RelationshipEdge {
    RelationshipEdge {
        id: id.to_string(),
        subject_id: subject.to_string(),
        object_id: object.to_string(),
        relation_type: RelationType::parse("TARGETS").unwrap(),
        sources: vec![source.to_string()],
        confidence: Some(confidence),
        original_text: None,
        polarity: Polarity::Positive,
        status: ReviewStatus::Unverified,
        significance: None,
        page_number: None,
        extracted_by: None,
        created_at: Utc::now(),
        reviewed_by: None,
        reviewed_at: None,
        flag_reason: None,
    }
}

fn typed_edge(id: &str, subject: &str, relation: &str, object: &str, source: &str) -> RelationshipEdge {
    RelationshipEdge {
        relation_type: RelationType::parse(relation).unwrap(),
        ..legacy_edge(id, subject, object, source, 0.7)
    }
}

/// Two legacy "Vemurafenib" drug nodes, each with its own TARGETS edge to
/// the same gene.
async fn seed_duplicates(store: &Arc<dyn GraphStore>) -> anyhow::Result<()> {
    store
        .import_raw(
            vec![
                legacy_entity("ent-old", "Vemurafenib", "Drug", 60),
                legacy_entity("ent-new", "Vemurafenib", "Drug", 5),
                legacy_entity("ent-braf", "BRAF V600E", "Gene", 60),
            ],
            vec![
                legacy_edge("rel-1", "ent-old", "ent-braf", "doc-1", 0.6),
                legacy_edge("rel-2", "ent-new", "ent-braf", "doc-2", 0.8),
            ],
        )
        .await
}

#[tokio::test]
async fn identical_entities_merge_into_the_oldest() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    seed_duplicates(&store).await?;
    let consolidator = Consolidator::new(store.clone());

    let groups = consolidator.find_duplicate_entities().await?;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].entity_ids, vec!["ent-old".to_string(), "ent-new".to_string()]);

    let summary = consolidator.consolidate_identical_entities().await?;
    assert_eq!(summary.groups_merged, 1);
    assert_eq!(summary.entities_removed, 1);
    assert_eq!(summary.relationships_combined, 1);

    let entities = store.entities().await?;
    assert_eq!(entities.len(), 2);
    let survivor = entities.iter().find(|e| e.id == "ent-old").expect("survivor kept");
    let sources: HashSet<&str> = survivor.sources.iter().map(String::as_str).collect();
    assert_eq!(sources, HashSet::from(["doc-ent-old", "doc-ent-new"]));

    let edges = store.relationships().await?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].subject_id, "ent-old");
    assert_eq!(edges[0].confidence, Some(0.8));
    let edge_sources: HashSet<&str> = edges[0].sources.iter().map(String::as_str).collect();
    assert_eq!(edge_sources, HashSet::from(["doc-1", "doc-2"]));

    let again = consolidator.consolidate_identical_entities().await?;
    assert_eq!(again.groups_merged, 0);
    Ok(())
}

#[tokio::test]
async fn later_writes_resolve_to_the_surviving_node() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    seed_duplicates(&store).await?;
    Consolidator::new(store.clone())
        .consolidate_identical_entities()
        .await?;

    let writer = kg_runtime::graph::GraphWriter::new(store.clone(), std::time::Duration::from_secs(5));
    let mut triplet = common::vemurafenib();
    triplet.subject_types = vec!["Drug".into()];
    triplet.object_types = vec!["Gene".into()];
    let summary = writer
        .write_triplets(
            &[triplet],
            &kg_runtime::graph::DocumentMeta {
                id: "doc-3".into(),
                title: None,
            },
            None,
        )
        .await?;

    assert_eq!(summary.relationships_merged, 1);
    assert_eq!(store.entities().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn manual_merge_requires_two_existing_ids() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    seed_duplicates(&store).await?;
    let consolidator = Consolidator::new(store.clone());

    let single = consolidator
        .merge_specific_entities(&["ent-old".to_string(), "ent-old".to_string()])
        .await;
    assert!(matches!(single, Err(IngestError::InvalidRequest(_))));

    let missing = consolidator
        .merge_specific_entities(&["ent-old".to_string(), "ent-ghost".to_string()])
        .await;
    assert!(matches!(missing, Err(IngestError::NotFound { kind: "entity", .. })));
    assert_eq!(store.entities().await?.len(), 3);

    let summary = consolidator
        .merge_specific_entities(&["ent-new".to_string(), "ent-old".to_string()])
        .await?;
    assert_eq!(summary.entities_removed, 1);
    let ids: HashSet<String> = store.entities().await?.into_iter().map(|e| e.id).collect();
    assert_eq!(ids, HashSet::from(["ent-new".to_string(), "ent-braf".to_string()]));
    Ok(())
}

#[tokio::test]
async fn review_state_survives_edge_combination() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    let mut reviewed = legacy_edge("rel-2", "ent-new", "ent-braf", "doc-2", 0.8);
    reviewed.status = ReviewStatus::Verified;
    reviewed.reviewed_by = Some("carol".into());
    store
        .import_raw(
            vec![
                legacy_entity("ent-old", "Vemurafenib", "Drug", 60),
                legacy_entity("ent-new", "Vemurafenib", "Drug", 5),
                legacy_entity("ent-braf", "BRAF V600E", "Gene", 60),
            ],
            vec![legacy_edge("rel-1", "ent-old", "ent-braf", "doc-1", 0.6), reviewed],
        )
        .await?;

    Consolidator::new(store.clone())
        .consolidate_identical_entities()
        .await?;

    let edges = store.relationships().await?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].status, ReviewStatus::Verified);
    assert_eq!(edges[0].reviewed_by.as_deref(), Some("carol"));
    Ok(())
}

#[tokio::test]
async fn import_rejects_dangling_edges() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    let result = store
        .import_raw(
            vec![legacy_entity("ent-a", "A", "Concept", 1)],
            vec![legacy_edge("rel-1", "ent-a", "ent-missing", "doc-1", 0.5)],
        )
        .await;
    assert!(result.is_err());
    assert!(store.entities().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicates_with_distinct_edges_keep_every_edge() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    store
        .import_raw(
            vec![
                legacy_entity("ent-p", "Dabrafenib", "Drug", 60),
                legacy_entity("ent-q", "Dabrafenib", "Drug", 5),
                legacy_entity("ent-a1", "BRAF", "Gene", 60),
                legacy_entity("ent-a2", "HSP90", "Protein", 60),
            ],
            vec![
                typed_edge("rel-1", "ent-p", "INHIBITS", "ent-a1", "doc-1"),
                typed_edge("rel-2", "ent-q", "ACTIVATES", "ent-a1", "doc-2"),
                typed_edge("rel-3", "ent-a2", "BINDS", "ent-q", "doc-2"),
            ],
        )
        .await?;

    let summary = Consolidator::new(store.clone())
        .consolidate_identical_entities()
        .await?;
    assert_eq!(summary.entities_removed, 1);
    assert_eq!(summary.relationships_combined, 0);

    let names: Vec<String> = store
        .entities()
        .await?
        .into_iter()
        .filter(|e| e.name == "Dabrafenib")
        .map(|e| e.id)
        .collect();
    assert_eq!(names, vec!["ent-p".to_string()]);

    let mut edges: Vec<(String, String, String)> = store
        .relationships()
        .await?
        .into_iter()
        .map(|e| (e.subject_id, e.relation_type.as_str().to_string(), e.object_id))
        .collect();
    edges.sort();
    let expected: Vec<(String, String, String)> = [
        ("ent-a2", "BINDS", "ent-p"),
        ("ent-p", "ACTIVATES", "ent-a1"),
        ("ent-p", "INHIBITS", "ent-a1"),
    ]
    .into_iter()
    .map(|(s, r, o)| (s.to_string(), r.to_string(), o.to_string()))
    .collect();
    assert_eq!(edges, expected);
    Ok(())
}

#[tokio::test]
async fn document_links_follow_the_surviving_entity() -> anyhow::Result<()> {
    let dir = temp_working_dir();
    let store: Arc<dyn GraphStore> = open_graph(&dir).await?;
    GraphWriter::new(store.clone(), std::time::Duration::from_secs(5))
        .write_triplets(
            &[common::vemurafenib()],
            &DocumentMeta {
                id: "doc-melanoma".into(),
                title: None,
            },
            None,
        )
        .await?;
    let fresh_id = store
        .entities()
        .await?
        .into_iter()
        .find(|e| e.name == "Vemurafenib")
        .map(|e| e.id)
        .expect("written entity");

    store
        .import_raw(vec![legacy_entity("ent-legacy", "Vemurafenib", "Drug", 120)], vec![])
        .await?;
    Consolidator::new(store.clone())
        .consolidate_identical_entities()
        .await?;

    let graph = store
        .document_graph("doc-melanoma")
        .await?
        .expect("document kept");
    let ids: HashSet<&str> = graph.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("ent-legacy"));
    assert!(!ids.contains(fresh_id.as_str()));
    assert_eq!(graph.relationships.len(), 1);
    assert_eq!(graph.relationships[0].subject_id, "ent-legacy");
    Ok(())
}
