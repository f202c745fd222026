//! Query routing: classification and retrieval policy.
//!
//! A question is classified into one of nine types by deterministic
//! keyword/regex rules over the lowercased text; each type emits a
//! retrieval policy (candidate budget, fusion weights, additive boosts,
//! and query expansions) consumed by the retrieval orchestrator.

use crate::config::Settings;
use crate::core::{Chunk, DocType};
use crate::enrich::PRODUCT;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// The nine query classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// Product identity and composition questions.
    ProductInfo,
    /// Session counts, frequency, dosage.
    Protocol,
    /// Contraindications, side effects, warnings.
    Safety,
    /// Injection technique and administration.
    Technique,
    /// "Difference between X and Y" questions.
    Comparison,
    /// What a product is indicated for.
    Indication,
    /// How a product works.
    Mechanism,
    /// In-domain question matching no specific class.
    GenericFactual,
    /// Question with no domain vocabulary at all.
    RefusalCandidate,
}

impl QueryType {
    /// Canonical label (upper snake case, as serialized).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductInfo => "PRODUCT_INFO",
            Self::Protocol => "PROTOCOL",
            Self::Safety => "SAFETY",
            Self::Technique => "TECHNIQUE",
            Self::Comparison => "COMPARISON",
            Self::Indication => "INDICATION",
            Self::Mechanism => "MECHANISM",
            Self::GenericFactual => "GENERIC_FACTUAL",
            Self::RefusalCandidate => "REFUSAL_CANDIDATE",
        }
    }
}

#[allow(clippy::unwrap_used)]
static CAN_BE_USED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"can\s+\w[\w\s®]*\s+be\s+used").unwrap()
});

/// Domain vocabulary used to separate generic-factual questions from
/// refusal candidates.
const DOMAIN_TERMS: &[&str] = &[
    "treatment", "skin", "inject", "gel", "dose", "dosage", "session", "clinical", "patient",
    "facial", "face", "dermal", "polynucleotide", "hyaluronic", "scalp", "wrinkle",
    "rejuvenation", "aesthetic", "filler", "neck", "hand", "eye", "product",
];

/// Products mentioned in a question, as canonical labels.
///
/// Longer labels win over their prefixes ("plinest hair" over "plinest").
#[must_use]
pub fn detect_products(question: &str) -> Vec<String> {
    let tallies = crate::enrich::tally_family(question, &PRODUCT);
    tallies
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, _)| label.to_string())
        .collect()
}

/// Classifies a question into a [`QueryType`].
///
/// Rules are ordered; the first match wins and anything unmatched with
/// domain vocabulary falls back to `GenericFactual`.
#[must_use]
pub fn classify(question: &str) -> QueryType {
    let q = question.to_lowercase();
    let contains_any =
        |terms: &[&str]| terms.iter().any(|t| q.contains(t));

    if contains_any(&["difference between", " vs ", " vs.", "versus", "compare"]) {
        return QueryType::Comparison;
    }
    if contains_any(&[
        "how many sessions",
        "session",
        "how often",
        "frequency",
        "interval between",
        "treatment schedule",
        "protocol",
    ]) {
        return QueryType::Protocol;
    }
    if contains_any(&[
        "contraindication",
        "side effect",
        "adverse",
        "safety",
        "safe",
        "pregnan",
        "allerg",
        "warning",
        "risk",
    ]) {
        return QueryType::Safety;
    }
    if contains_any(&["inject", "needle", "cannula", "technique", "depth", "administer"]) {
        return QueryType::Technique;
    }
    if contains_any(&["mechanism", "mode of action"]) || (q.contains("how does") && q.contains("work"))
    {
        return QueryType::Mechanism;
    }
    if contains_any(&["indicat", "used for", "suitable for", "treat "])
        || q.contains("treats")
        || CAN_BE_USED_RE.is_match(&q)
    {
        return QueryType::Indication;
    }
    if !detect_products(question).is_empty() {
        return QueryType::ProductInfo;
    }
    if contains_any(DOMAIN_TERMS) {
        return QueryType::GenericFactual;
    }
    QueryType::RefusalCandidate
}

/// A predicate over candidate chunks, declared as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoostPredicate {
    /// Chunk's document type is one of these.
    DocTypeIn(Vec<DocType>),
    /// Chunk's document ID contains this substring.
    DocIdContains(String),
    /// Chunk metadata carries protocol info.
    HasProtocolInfo,
    /// Chunk metadata names this canonical product.
    ProductIs(String),
}

/// An additive score boost with its predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    /// Human-readable label recorded in retrieval details.
    pub label: String,
    /// Additive amount applied when the predicate holds.
    pub amount: f32,
    /// The predicate.
    pub predicate: BoostPredicate,
}

impl Boost {
    /// Whether the boost applies to a chunk.
    #[must_use]
    pub fn applies(&self, chunk: &Chunk) -> bool {
        match &self.predicate {
            BoostPredicate::DocTypeIn(types) => types.contains(&chunk.doc_type),
            BoostPredicate::DocIdContains(needle) => chunk.doc_id.contains(needle.as_str()),
            BoostPredicate::HasProtocolInfo => chunk.metadata.has_protocol_info,
            BoostPredicate::ProductIs(product) => {
                chunk.metadata.product.as_deref() == Some(product.as_str())
            }
        }
    }
}

/// Retrieval policy emitted by the router for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPolicy {
    /// The classified query type.
    pub query_type: QueryType,
    /// Candidate budget multiplier applied to the final k before fusion
    /// and reranking.
    pub retrieval_multiplier: usize,
    /// Weight of the semantic branch in fusion.
    pub vector_weight: f32,
    /// Weight of the lexical branch in fusion.
    pub lexical_weight: f32,
    /// Additive boosts applied after fusion.
    pub boosts: Vec<Boost>,
    /// Terms appended to the query before both branches run.
    pub query_expansions: Vec<String>,
}

/// Builds the retrieval policy for a question.
#[must_use]
pub fn policy_for(question: &str, settings: &Settings) -> RetrievalPolicy {
    let query_type = classify(question);
    let products = detect_products(question);

    let mut policy = RetrievalPolicy {
        query_type,
        retrieval_multiplier: 3,
        vector_weight: settings.hybrid_vector_weight,
        lexical_weight: settings.hybrid_bm25_weight,
        boosts: Vec::new(),
        query_expansions: Vec::new(),
    };

    match query_type {
        QueryType::Comparison => {
            policy.retrieval_multiplier = 5;
            policy.boosts.push(Boost {
                label: "comparison: factsheet or brochure".to_string(),
                amount: 0.25,
                predicate: BoostPredicate::DocTypeIn(vec![DocType::Factsheet, DocType::Brochure]),
            });
            for product in &products {
                policy.boosts.push(Boost {
                    label: format!("comparison: doc mentions {product}"),
                    amount: 0.15,
                    predicate: BoostPredicate::DocIdContains(product.replace(' ', "-")),
                });
            }
            policy.query_expansions.extend(products.iter().cloned());
            policy
                .query_expansions
                .push("factsheet comparison".to_string());
        }
        QueryType::Protocol => {
            policy.boosts.push(Boost {
                label: "protocol: chunk carries protocol info".to_string(),
                amount: 0.20,
                predicate: BoostPredicate::HasProtocolInfo,
            });
            policy.boosts.push(Boost {
                label: "protocol: protocol document".to_string(),
                amount: 0.10,
                predicate: BoostPredicate::DocTypeIn(vec![DocType::Protocol]),
            });
            policy
                .query_expansions
                .push("sessions frequency dosage".to_string());
        }
        QueryType::Safety => {
            policy.vector_weight = 0.6;
            policy.lexical_weight = 0.4;
            policy.boosts.push(Boost {
                label: "safety: factsheet".to_string(),
                amount: 0.10,
                predicate: BoostPredicate::DocTypeIn(vec![DocType::Factsheet]),
            });
            policy
                .query_expansions
                .push("contraindications warnings".to_string());
        }
        QueryType::ProductInfo => {
            policy.boosts.push(Boost {
                label: "product info: factsheet".to_string(),
                amount: 0.15,
                predicate: BoostPredicate::DocTypeIn(vec![DocType::Factsheet]),
            });
            for product in &products {
                policy.boosts.push(Boost {
                    label: format!("product info: tagged {product}"),
                    amount: 0.10,
                    predicate: BoostPredicate::ProductIs(product.clone()),
                });
            }
            policy.query_expansions.extend(products.iter().cloned());
        }
        QueryType::Indication => {
            policy.boosts.push(Boost {
                label: "indication: factsheet or brochure".to_string(),
                amount: 0.10,
                predicate: BoostPredicate::DocTypeIn(vec![DocType::Factsheet, DocType::Brochure]),
            });
            policy.query_expansions.push("indications".to_string());
        }
        QueryType::Technique => {
            policy.boosts.push(Boost {
                label: "technique: protocol or paper".to_string(),
                amount: 0.10,
                predicate: BoostPredicate::DocTypeIn(vec![
                    DocType::Protocol,
                    DocType::ClinicalPaper,
                ]),
            });
        }
        QueryType::Mechanism => {
            policy
                .query_expansions
                .push("mechanism of action".to_string());
        }
        QueryType::GenericFactual | QueryType::RefusalCandidate => {}
    }

    policy
}

/// Applies the policy's expansions to the query text.
#[must_use]
pub fn expand_query(question: &str, policy: &RetrievalPolicy) -> String {
    if policy.query_expansions.is_empty() {
        return question.to_string();
    }
    let mut expanded = question.to_string();
    for expansion in &policy.query_expansions {
        if !expanded.to_lowercase().contains(&expansion.to_lowercase()) {
            expanded.push(' ');
            expanded.push_str(expansion);
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("What is the difference between Plinest Hair and Plinest Eye?", QueryType::Comparison; "comparison")]
    #[test_case("Newest vs Plinest for the face", QueryType::Comparison; "versus")]
    #[test_case("How many sessions are needed for Plinest Hair?", QueryType::Protocol; "protocol sessions")]
    #[test_case("How often should treatment be repeated?", QueryType::Protocol; "protocol frequency")]
    #[test_case("What are the contraindications for Newest?", QueryType::Safety; "safety contraindications")]
    #[test_case("Is Plinest safe during pregnancy?", QueryType::Safety; "safety pregnancy")]
    #[test_case("What needle depth is recommended?", QueryType::Technique; "technique")]
    #[test_case("How does Newest work?", QueryType::Mechanism; "mechanism")]
    #[test_case("What is the mode of action of polynucleotides?", QueryType::Mechanism; "mode of action")]
    #[test_case("Can Newest be used for the periorbital area?", QueryType::Indication; "indication can be used")]
    #[test_case("What is Plinest indicated for?", QueryType::Indication; "indication")]
    #[test_case("What is Newest?", QueryType::ProductInfo; "product info")]
    #[test_case("Tell me about skin treatment options", QueryType::GenericFactual; "generic")]
    #[test_case("What is the capital of France?", QueryType::RefusalCandidate; "refusal")]
    fn test_classify(question: &str, expected: QueryType) {
        assert_eq!(classify(question), expected);
    }

    #[test]
    fn test_detect_products() {
        let products = detect_products("Compare Plinest Hair with Newest please");
        assert!(products.contains(&"plinest hair".to_string()));
        assert!(products.contains(&"newest".to_string()));
        assert!(!products.contains(&"plinest".to_string()));
    }

    #[test]
    fn test_comparison_policy() {
        let settings = Settings::default();
        let policy = policy_for(
            "What is the difference between Plinest Hair and Plinest Eye?",
            &settings,
        );
        assert_eq!(policy.query_type, QueryType::Comparison);
        assert_eq!(policy.retrieval_multiplier, 5);
        assert!(policy
            .boosts
            .iter()
            .any(|b| matches!(&b.predicate, BoostPredicate::DocTypeIn(t) if t.contains(&DocType::Factsheet)) && (b.amount - 0.25).abs() < 1e-6));
        assert!(policy
            .query_expansions
            .contains(&"factsheet comparison".to_string()));
    }

    #[test]
    fn test_default_policy_weights() {
        let settings = Settings::default();
        let policy = policy_for("Tell me about skin treatment options", &settings);
        assert_eq!(policy.retrieval_multiplier, 3);
        assert!((policy.vector_weight - 0.7).abs() < 1e-6);
        assert!((policy.lexical_weight - 0.3).abs() < 1e-6);
        assert!(policy.boosts.is_empty());
    }

    #[test]
    fn test_safety_policy_shifts_weights() {
        let settings = Settings::default();
        let policy = policy_for("What are the side effects of Newest?", &settings);
        assert_eq!(policy.query_type, QueryType::Safety);
        assert!((policy.vector_weight - 0.6).abs() < 1e-6);
        assert!((policy.lexical_weight - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_protocol_policy_boosts_protocol_info() {
        let settings = Settings::default();
        let policy = policy_for("How many sessions does the treatment take?", &settings);
        assert!(policy
            .boosts
            .iter()
            .any(|b| b.predicate == BoostPredicate::HasProtocolInfo));
    }

    #[test]
    fn test_boost_applies() {
        use crate::core::Chunk;

        let mut chunk = Chunk::flat("plinest-hair-protocol", DocType::Protocol, 0, "text".into(), 0, 4);
        chunk.metadata.has_protocol_info = true;
        chunk.metadata.product = Some("plinest hair".into());

        assert!(Boost {
            label: String::new(),
            amount: 0.1,
            predicate: BoostPredicate::DocTypeIn(vec![DocType::Protocol]),
        }
        .applies(&chunk));
        assert!(Boost {
            label: String::new(),
            amount: 0.1,
            predicate: BoostPredicate::DocIdContains("plinest-hair".into()),
        }
        .applies(&chunk));
        assert!(Boost {
            label: String::new(),
            amount: 0.1,
            predicate: BoostPredicate::HasProtocolInfo,
        }
        .applies(&chunk));
        assert!(Boost {
            label: String::new(),
            amount: 0.1,
            predicate: BoostPredicate::ProductIs("plinest hair".into()),
        }
        .applies(&chunk));
        assert!(!Boost {
            label: String::new(),
            amount: 0.1,
            predicate: BoostPredicate::ProductIs("newest".into()),
        }
        .applies(&chunk));
    }

    #[test]
    fn test_expand_query() {
        let settings = Settings::default();
        let policy = policy_for("How many sessions for Plinest Hair?", &settings);
        let expanded = expand_query("How many sessions for Plinest Hair?", &policy);
        assert!(expanded.contains("sessions frequency dosage"));
        assert!(expanded.starts_with("How many sessions"));
    }

    #[test]
    fn test_expand_query_no_duplicates() {
        let policy = RetrievalPolicy {
            query_type: QueryType::GenericFactual,
            retrieval_multiplier: 3,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            boosts: vec![],
            query_expansions: vec!["newest".to_string()],
        };
        let expanded = expand_query("What is Newest?", &policy);
        assert_eq!(expanded, "What is Newest?");
    }

    #[test]
    fn test_query_type_serde() {
        let json = serde_json::to_string(&QueryType::ProductInfo).unwrap();
        assert_eq!(json, "\"PRODUCT_INFO\"");
    }

    #[test]
    fn test_query_type_as_str() {
        assert_eq!(QueryType::RefusalCandidate.as_str(), "REFUSAL_CANDIDATE");
        assert_eq!(QueryType::Comparison.as_str(), "COMPARISON");
    }
}
