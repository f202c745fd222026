//! Integration tests for clinrag.
//!
//! Drives the full pipeline (ingest -> query -> evidence gate -> eval)
//! over a small fixture corpus with the deterministic embedder.

#![allow(clippy::expect_used)]

use clinrag::core::{Dataset, QueryCase};
use clinrag::eval::{HarnessConfig, run_eval};
use clinrag::router::QueryType;
use clinrag::search::QueryState;
use clinrag::store::with_store;
use clinrag::{CANONICAL_REFUSAL, Services, Settings};
use std::path::Path;
use tempfile::TempDir;

const NEWEST_FACTSHEET: &str = "Newest\u{ae} Factsheet\n\
Newest is an injectable gel combining polynucleotides and hyaluronic acid for \
bio-restructuring of the skin.\n\
Treatment Areas\n\
Indicated for the face and neck where elasticity and hydration are reduced. \
Newest is not indicated for the periorbital region; Plinest Eye is the \
dedicated periocular product.\n\
Composition\n\
Polynucleotides 20 mg/ml and hyaluronic acid 20 mg/ml in a 2 ml syringe.\n\
Mechanism\n\
Polynucleotides stimulate fibroblast activity while hyaluronic acid provides \
deep hydration.\n";

const PLINEST_HAIR_PROTOCOL: &str = "Plinest Hair\n\
Polynucleotide treatment for thinning hair and scalp quality.\n\
Treatment Protocol\n\
The recommended course for Plinest Hair is 4 sessions administered every \
2 weeks, injecting 2 ml per session into the scalp. Maintenance continues \
over 6 months.\n";

const PLINEST_EYE_FACTSHEET: &str = "Plinest Eye Factsheet\n\
Plinest Eye is a polynucleotide gel for the periocular area.\n\
Treatment Areas\n\
Indicated for the periorbital region, crow's feet, and tear trough.\n\
Composition\n\
Polynucleotides 7.5 mg/ml in a 1 ml syringe for delicate eye-area skin.\n";

const PN_FACE_STUDY: &str = "Efficacy of polynucleotide injections in facial rejuvenation\n\
Abstract\n\
This study evaluated skin hydration and elasticity after polynucleotide \
treatment in 40 patients. Methods involved three treatment sessions. Results \
showed hydration improved by 30 percent at week twelve, and elasticity scores \
improved across all facial zones. The treated cohort reported high \
satisfaction. No serious adverse events were recorded during follow-up. \
Further studies should examine longer maintenance intervals for the facial \
area and compare dosing schedules across age groups. The conclusion supports \
polynucleotide therapy as an effective facial rejuvenation approach.\n";

/// Writes the fixture corpus under category directories.
fn write_corpus(root: &Path) {
    let product = root.join("product");
    let protocol = root.join("protocol");
    let papers = root.join("clinical_paper");
    std::fs::create_dir_all(&product).expect("create product dir");
    std::fs::create_dir_all(&protocol).expect("create protocol dir");
    std::fs::create_dir_all(&papers).expect("create papers dir");

    std::fs::write(product.join("newest-factsheet.txt"), NEWEST_FACTSHEET).expect("write newest");
    std::fs::write(product.join("plinest-eye-factsheet.txt"), PLINEST_EYE_FACTSHEET)
        .expect("write plinest eye");
    std::fs::write(protocol.join("plinest-hair-protocol.txt"), PLINEST_HAIR_PROTOCOL)
        .expect("write plinest hair");
    std::fs::write(papers.join("pn-face-study.txt"), PN_FACE_STUDY).expect("write study");
}

/// Builds an ingested service container over the fixture corpus.
fn seeded_services() -> (Services, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus);

    let settings = Settings {
        index_dir: dir.path().join("index"),
        judge_cache_dir: dir.path().join("judge-cache"),
        ..Settings::for_tests()
    };
    let services = Services::in_memory(settings).expect("build services");
    let report = services.ingest_path(&corpus, false).expect("ingest corpus");
    assert!(report.is_clean(), "fixture ingest failed: {:?}", report.failures);
    (services, dir)
}

#[test]
fn test_product_identity_query() {
    let (services, _dir) = seeded_services();
    let response = services.query("What is Newest?", None).expect("query failed");

    assert_eq!(response.query_type, QueryType::ProductInfo);
    assert_eq!(response.state, QueryState::Answered);
    assert!(response.evidence.sufficient);
    let top = &response.retrieved.chunks[0];
    assert_eq!(top.chunk.doc_id, "newest-factsheet");
    assert!(top.display_score() >= 0.7);
}

#[test]
fn test_protocol_sessions_query() {
    let (services, _dir) = seeded_services();
    let response = services
        .query("How many sessions are needed for Plinest Hair?", None)
        .expect("query failed");

    assert_eq!(response.query_type, QueryType::Protocol);
    assert!(response.evidence.sufficient);
    let with_protocol = response
        .retrieved
        .chunks
        .iter()
        .find(|c| c.chunk.metadata.protocol_sessions.is_some())
        .expect("a retrieved chunk carries protocol sessions");
    assert_eq!(
        with_protocol.chunk.metadata.protocol_sessions.as_deref(),
        Some("4 sessions")
    );
    assert!(with_protocol.chunk.metadata.protocol_frequency.is_some());
    assert!(with_protocol.chunk.metadata.protocol_dosage.is_some());
}

#[test]
fn test_comparison_query_retrieves_both_products() {
    let (services, _dir) = seeded_services();
    let question = "What is the difference between Plinest Hair and Plinest Eye?";
    let response = services.query(question, None).expect("query failed");

    assert_eq!(response.query_type, QueryType::Comparison);
    let doc_ids: Vec<&str> = response
        .retrieved
        .chunks
        .iter()
        .map(|c| c.chunk.doc_id.as_str())
        .collect();
    assert!(doc_ids.contains(&"plinest-hair-protocol"), "retrieved: {doc_ids:?}");
    assert!(doc_ids.contains(&"plinest-eye-factsheet"), "retrieved: {doc_ids:?}");
}

#[test]
fn test_off_indication_query_finds_counter_evidence() {
    let (services, _dir) = seeded_services();
    let response = services
        .query("Can Newest be used for the periorbital area?", None)
        .expect("query failed");

    // Evidence exists AGAINST the use: the factsheet names the periorbital
    // exclusion and points at Plinest Eye
    assert!(response.evidence.sufficient);
    let context: String = response
        .retrieved
        .chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(context.contains("not indicated for the periorbital"));
    assert!(context.contains("Plinest Eye"));
}

#[test]
fn test_missing_information_refuses() {
    let (services, _dir) = seeded_services();
    // Nothing in the corpus covers storage conditions
    let response = services
        .query("What are the refrigeration requirements for storage in the warehouse?", None)
        .expect("query failed");

    assert!(!response.evidence.sufficient);
    assert_eq!(response.state, QueryState::Refused);
    assert_eq!(response.refusal.as_deref(), Some(CANONICAL_REFUSAL));
}

#[test]
fn test_idempotent_reingest() {
    let (services, dir) = seeded_services();
    let corpus = dir.path().join("corpus");

    let before = with_store(&services.store, |s| s.chunk_count()).expect("count");
    let report = services.ingest_path(&corpus, false).expect("re-ingest");
    assert_eq!(report.documents_processed, 0);
    assert_eq!(report.skipped.len(), 4);
    let after = with_store(&services.store, |s| s.chunk_count()).expect("count");
    assert_eq!(before, after);

    // Forced re-ingest also keeps the chunk-id set stable
    let ids_before = with_store(&services.store, |s| s.chunk_ids()).expect("ids");
    services.ingest_path(&corpus, true).expect("forced re-ingest");
    let ids_after = with_store(&services.store, |s| s.chunk_ids()).expect("ids");
    assert_eq!(ids_before, ids_after);
}

#[test]
fn test_store_invariants_after_ingest() {
    let (services, _dir) = seeded_services();
    with_store(&services.store, |s| {
        // Vector store and lexical index hold the same chunk-id set, every
        // child resolves to a same-document parent
        assert!(s.verify_integrity()?.is_empty());

        // Offsets are within bounds and spans are well-formed
        for chunk in s.all_chunks()? {
            assert!(chunk.char_start < chunk.char_end);
            assert!(!chunk.text.is_empty());
        }
        Ok(())
    })
    .expect("integrity check");
}

#[test]
fn test_hierarchical_chunks_for_paper() {
    let (services, _dir) = seeded_services();
    with_store(&services.store, |s| {
        let chunks = s.chunks_for_doc("pn-face-study")?;
        assert!(!chunks.is_empty());
        let parents = chunks
            .iter()
            .filter(|c| c.kind == clinrag::ChunkKind::Parent)
            .count();
        assert!(parents >= 1, "paper must produce parent chunks");
        Ok(())
    })
    .expect("paper chunks");
}

#[test]
fn test_frequency_tagging_on_corpus() {
    let (services, _dir) = seeded_services();
    with_store(&services.store, |s| {
        let chunks = s.chunks_for_doc("plinest-hair-protocol")?;
        for chunk in &chunks {
            assert_eq!(chunk.metadata.anatomy.as_deref(), Some("scalp"));
            assert_eq!(chunk.metadata.product.as_deref(), Some("plinest hair"));
        }
        Ok(())
    })
    .expect("tagging check");
}

#[test]
fn test_eval_harness_end_to_end() {
    let (services, _dir) = seeded_services();
    let dataset = Dataset {
        version: "2025-06-01".to_string(),
        cases: vec![
            QueryCase {
                id: "e2e-1".to_string(),
                question: "What is Newest?".to_string(),
                expected_doc_ids: vec!["newest-factsheet".to_string()],
                expected_keywords: vec!["polynucleotide".to_string(), "hyaluronic".to_string()],
                should_refuse: false,
                max_chunks: 5,
            },
            QueryCase {
                id: "e2e-2".to_string(),
                question: "What is the capital of France?".to_string(),
                expected_doc_ids: vec![],
                expected_keywords: vec![],
                should_refuse: true,
                max_chunks: 5,
            },
        ],
    };

    let report = run_eval(&services, &dataset, Some("2025-06-01"), &HarnessConfig::default())
        .expect("eval run");
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.passed, 2, "cases: {:#?}", report.cases);
    assert!(report.gate_passed);
}

#[test]
fn test_eval_version_mismatch_fails() {
    let (services, _dir) = seeded_services();
    let dataset = Dataset {
        version: "2025-06-01".to_string(),
        cases: vec![QueryCase {
            id: "v-1".to_string(),
            question: "What is Newest?".to_string(),
            expected_doc_ids: vec![],
            expected_keywords: vec![],
            should_refuse: false,
            max_chunks: 5,
        }],
    };
    let result = run_eval(&services, &dataset, Some("2020-01-01"), &HarnessConfig::default());
    assert!(result.is_err());
}

#[test]
fn test_gate_safety_contract() {
    let (services, _dir) = seeded_services();
    let response = services
        .query("What are the refrigeration requirements for storage in the warehouse?", None)
        .expect("query failed");

    if !response.evidence.sufficient {
        // No retrieved chunk may sit above the strong-match threshold
        for chunk in &response.retrieved.chunks {
            assert!(chunk.score < services.settings.strong_match_threshold);
        }
    }
}
