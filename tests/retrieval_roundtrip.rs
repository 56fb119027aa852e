// tests/retrieval_roundtrip.rs
//
// Index -> retrieve -> query with the local embedder and the mock generator.

use std::sync::Arc;

use urban_watch::config::{Mode, MonitorConfig};
use urban_watch::event::{payload, Location};
use urban_watch::retrieval::{build_prompt, HashingEmbedder, MockGenerator, RetryPolicy};
use urban_watch::{EventRecord, RagSystem, Source};

fn records() -> Vec<EventRecord> {
    vec![
        EventRecord::new(
            "2025-06-01T08:30:00Z",
            Source::Traffic,
            payload([("congestion_level", 0.85), ("average_speed", 12.0)]),
            Location::new(40.758, -73.985),
        ),
        EventRecord::new(
            "2025-06-01T08:30:01Z",
            Source::Environment,
            payload([("air_quality_index", 142.0), ("temperature", 29.0)]),
            Location::new(40.73, -73.99),
        ),
        EventRecord::new(
            "2025-06-01T08:30:02Z",
            Source::SocialMedia,
            payload([("text", "Emergency near downtown: protest")]),
            Location::new(40.71, -74.0),
        ),
    ]
}

#[tokio::test]
async fn each_record_is_its_own_top_hit() {
    let rag = RagSystem::new(
        Arc::new(HashingEmbedder::new(512)),
        Arc::new(MockGenerator::default()),
        RetryPolicy::default(),
        5,
    );
    let recs = records();
    for r in &recs {
        assert!(rag.add(r).await.unwrap());
    }
    for r in &recs {
        let hits = rag.retrieve(&r.document_text(), 1).await.unwrap();
        assert_eq!(&hits[0].record, r);
    }
    assert_eq!(rag.documents().await.len(), 3);
}

#[tokio::test]
async fn from_config_defaults_answer_offline() {
    let cfg = MonitorConfig::for_mode(Mode::UrbanPlanning);
    let rag = RagSystem::from_config(&cfg);
    assert_eq!(rag.embedder_name(), "hashing");
    assert_eq!(rag.generator_name(), "mock");
    for r in records() {
        rag.add(&r).await.unwrap();
    }
    let answer = rag.query("Where is air quality poor?", 2).await.unwrap();
    assert_eq!(answer, "Mock answer (2 context documents)");
}

#[test]
fn prompt_lists_every_document_then_the_question() {
    let docs: Vec<_> = records()
        .into_iter()
        .enumerate()
        .map(|(i, r)| urban_watch::retrieval::Document {
            id: i as u64,
            text: r.document_text(),
            record: r,
            embedding: vec![],
            indexed_at: chrono::Utc::now(),
        })
        .collect();
    let p = build_prompt("What is happening?", &docs);
    assert!(p.starts_with("Based on the following real-time data, answer the question.\n\nContext:\nSource: traffic\n"));
    assert_eq!(p.matches("\n\nSource: ").count(), 2);
    assert!(p.ends_with("\n\nQuestion: What is happening?\n\nAnswer:"));
}
