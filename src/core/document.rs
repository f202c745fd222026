//! Source document representation.
//!
//! A document is an ingested clinical source (factsheet, protocol sheet,
//! paper, case study, or brochure). The document type drives chunking
//! strategy selection and retrieval boosting.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Document categories recognized by the ingestion pipeline.
///
/// The type is inferred from the containing directory name first and from
/// content patterns as a fallback; anything unrecognized is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Product factsheet (indications, composition, dosage sections).
    Factsheet,
    /// Treatment protocol sheet (sessions, frequency, dosage).
    Protocol,
    /// Peer-reviewed clinical paper.
    ClinicalPaper,
    /// Single-patient or small-cohort case study.
    CaseStudy,
    /// Marketing brochure.
    Brochure,
    /// Unclassified document.
    Unknown,
}

impl DocType {
    /// All concrete document types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Factsheet,
        Self::Protocol,
        Self::ClinicalPaper,
        Self::CaseStudy,
        Self::Brochure,
        Self::Unknown,
    ];

    /// Canonical lower-case label used in storage and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Factsheet => "factsheet",
            Self::Protocol => "protocol",
            Self::ClinicalPaper => "clinical_paper",
            Self::CaseStudy => "case_study",
            Self::Brochure => "brochure",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a canonical label; unknown labels become `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "factsheet" | "factsheets" | "product" | "products" => Self::Factsheet,
            "protocol" | "protocols" => Self::Protocol,
            "clinical_paper" | "clinical-paper" | "clinical_papers" | "paper" | "papers"
            | "study" | "studies" => Self::ClinicalPaper,
            "case_study" | "case-study" | "case_studies" | "cases" => Self::CaseStudy,
            "brochure" | "brochures" | "marketing" => Self::Brochure,
            _ => Self::Unknown,
        }
    }

    /// Infers the type from the name of the directory containing the source
    /// file (e.g. `product/`, `protocol/`).
    #[must_use]
    pub fn from_directory(path: &Path) -> Self {
        path.parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map_or(Self::Unknown, Self::parse)
    }

    /// Content-pattern fallback for documents placed outside category
    /// directories.
    ///
    /// Looks for strong signals in the first few thousand characters.
    #[must_use]
    pub fn from_content(text: &str) -> Self {
        let head: String = text.chars().take(4000).collect::<String>().to_lowercase();
        if head.contains("treatment protocol") || head.contains("dosage and administration") {
            Self::Protocol
        } else if head.contains("case report") || head.contains("case study") {
            Self::CaseStudy
        } else if head.contains("abstract") && (head.contains("methods") || head.contains("results"))
        {
            Self::ClinicalPaper
        } else if head.contains("factsheet")
            || (head.contains("composition") && head.contains("indications"))
        {
            Self::Factsheet
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the source filename.
    pub doc_id: String,
    /// Inferred document category.
    pub doc_type: DocType,
    /// Path the document was ingested from.
    pub source_path: PathBuf,
    /// SHA-256 hex digest of the normalized content.
    pub content_hash: String,
}

impl Document {
    /// Creates a document record.
    #[must_use]
    pub fn new(doc_id: String, doc_type: DocType, source_path: PathBuf, content_hash: String) -> Self {
        Self {
            doc_id,
            doc_type,
            source_path,
            content_hash,
        }
    }

    /// Derives a stable `doc_id` from a source path.
    ///
    /// The file stem is lowercased and every run of non-alphanumeric
    /// characters collapses to a single `-`, so `Newest Factsheet (v2).pdf`
    /// becomes `newest-factsheet-v2`.
    #[must_use]
    pub fn doc_id_from_path(path: &Path) -> String {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");

        let mut id = String::with_capacity(stem.len());
        let mut last_dash = true;
        for c in stem.chars() {
            if c.is_alphanumeric() {
                id.extend(c.to_lowercase());
                last_dash = false;
            } else if !last_dash {
                id.push('-');
                last_dash = true;
            }
        }
        while id.ends_with('-') {
            id.pop();
        }
        if id.is_empty() {
            id.push_str("document");
        }
        id
    }
}
