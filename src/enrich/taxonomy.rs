//! Controlled taxonomies for metadata tagging.
//!
//! Taxonomies are declared data, not code: each family lists canonical
//! labels with their synonyms. Labels are canonical lower-case strings;
//! free-form values never enter taxonomy fields.

/// A canonical label and the synonyms that count toward it.
#[derive(Debug, Clone, Copy)]
pub struct TaxonomyLabel {
    /// Canonical lower-case label.
    pub label: &'static str,
    /// Phrases counted as mentions of this label (lowercased, whole-word).
    pub synonyms: &'static [&'static str],
}

/// A taxonomy family (anatomy, product, treatment).
#[derive(Debug, Clone, Copy)]
pub struct TaxonomyFamily {
    /// Family name.
    pub name: &'static str,
    /// The labels in this family.
    pub labels: &'static [TaxonomyLabel],
}

/// Anatomical regions addressed by the product range.
pub const ANATOMY: TaxonomyFamily = TaxonomyFamily {
    name: "anatomy",
    labels: &[
        TaxonomyLabel {
            label: "perioral",
            synonyms: &["perioral", "around the mouth", "lip area", "barcode lines"],
        },
        TaxonomyLabel {
            label: "periocular",
            synonyms: &[
                "periocular",
                "periorbital",
                "eye area",
                "around the eyes",
                "crow's feet",
                "tear trough",
            ],
        },
        TaxonomyLabel {
            label: "face",
            synonyms: &["face", "facial", "cheek", "cheeks", "forehead", "chin"],
        },
        TaxonomyLabel {
            label: "neck",
            synonyms: &["neck", "jawline", "submental"],
        },
        TaxonomyLabel {
            label: "hand",
            synonyms: &["hand", "hands", "dorsal hand", "back of the hand"],
        },
        TaxonomyLabel {
            label: "scalp",
            synonyms: &["scalp", "hairline", "follicle", "follicles"],
        },
        TaxonomyLabel {
            label: "vulvovaginal",
            synonyms: &["vulvovaginal", "vulvar", "vaginal", "intimate area"],
        },
    ],
};

/// Product controlled vocabulary.
///
/// Multi-word labels are matched before their single-word prefixes, so a
/// "plinest hair" mention never also counts toward "plinest".
pub const PRODUCT: TaxonomyFamily = TaxonomyFamily {
    name: "product",
    labels: &[
        TaxonomyLabel {
            label: "newest",
            synonyms: &["newest"],
        },
        TaxonomyLabel {
            label: "plinest",
            synonyms: &["plinest"],
        },
        TaxonomyLabel {
            label: "plinest eye",
            synonyms: &["plinest eye"],
        },
        TaxonomyLabel {
            label: "plinest hair",
            synonyms: &["plinest hair"],
        },
        TaxonomyLabel {
            label: "plinest fast",
            synonyms: &["plinest fast"],
        },
        TaxonomyLabel {
            label: "plenhyage",
            synonyms: &["plenhyage", "plenhyage xl"],
        },
    ],
};

/// Treatment categories.
pub const TREATMENT: TaxonomyFamily = TaxonomyFamily {
    name: "treatment",
    labels: &[
        TaxonomyLabel {
            label: "rejuvenation",
            synonyms: &["rejuvenation", "anti-ageing", "anti-aging", "skin quality"],
        },
        TaxonomyLabel {
            label: "hydration",
            synonyms: &["hydration", "hydrating", "moisturising", "moisturizing"],
        },
        TaxonomyLabel {
            label: "hair restoration",
            synonyms: &["hair restoration", "hair loss", "alopecia", "thinning hair"],
        },
        TaxonomyLabel {
            label: "scar treatment",
            synonyms: &["scar", "scars", "scarring", "acne scars"],
        },
        TaxonomyLabel {
            label: "biostimulation",
            synonyms: &["biostimulation", "bio-stimulation", "regeneration", "regenerative"],
        },
    ],
};

/// All taxonomy families.
pub const FAMILIES: &[TaxonomyFamily] = &[ANATOMY, PRODUCT, TREATMENT];

/// Looks up a family by name.
#[must_use]
pub fn family(name: &str) -> Option<&'static TaxonomyFamily> {
    FAMILIES.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_canonical_lowercase() {
        for fam in FAMILIES {
            for label in fam.labels {
                assert_eq!(label.label, label.label.to_lowercase());
                for syn in label.synonyms {
                    assert_eq!(*syn, syn.to_lowercase());
                }
            }
        }
    }

    #[test]
    fn test_family_lookup() {
        assert_eq!(family("anatomy").map(|f| f.name), Some("anatomy"));
        assert_eq!(family("product").map(|f| f.name), Some("product"));
        assert!(family("bogus").is_none());
    }

    #[test]
    fn test_anatomy_labels_complete() {
        let labels: Vec<&str> = ANATOMY.labels.iter().map(|l| l.label).collect();
        for expected in [
            "perioral",
            "periocular",
            "face",
            "neck",
            "hand",
            "scalp",
            "vulvovaginal",
        ] {
            assert!(labels.contains(&expected), "missing anatomy label {expected}");
        }
    }

    #[test]
    fn test_every_label_has_synonyms() {
        for fam in FAMILIES {
            for label in fam.labels {
                assert!(!label.synonyms.is_empty(), "{} has no synonyms", label.label);
            }
        }
    }
}
