//! Category Normalizer
//!
//! Maps free-text survey answers and display labels onto the closed
//! vocabularies used at training time. Unmapped values fall back to a
//! documented default per column; every fallback is logged and counted so
//! drift in upstream survey instruments stays visible.

use crate::columns;
use crate::error::FeatureError;
use crate::schema::{ColumnKind, FeatureSchema};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Lookup key: trimmed, lowercase, dashes unified, whitespace collapsed
pub fn canonical_key(text: &str) -> String {
    let unified: String = text
        .chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' => '-',
            _ => c,
        })
        .collect();
    unified
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A categorical input that matched no known mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedCategory {
    /// Schema column
    pub column: String,
    /// Value as received
    pub raw: String,
    /// Category used instead
    pub fallback: String,
}

/// Result of normalizing one value
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<'a> {
    /// Category from the closed set
    pub label: &'a str,
    /// Present when the default was substituted
    pub unmapped: Option<UnmappedCategory>,
}

/// Closed vocabulary for one categorical column
#[derive(Debug, Clone)]
pub struct Vocabulary {
    column: String,
    categories: Vec<String>,
    aliases: HashMap<String, String>,
    default: String,
}

impl Vocabulary {
    /// Build a vocabulary; every alias target and the default must be categories
    pub fn new(
        column: &str,
        categories: &[&str],
        default: &str,
        aliases: &[(&str, &str)],
    ) -> Result<Self, FeatureError> {
        let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
        let mismatch = |reason: String| FeatureError::VocabularyMismatch {
            column: column.to_string(),
            reason,
        };

        if !categories.iter().any(|c| c == default) {
            return Err(mismatch(format!("default {:?} is not a category", default)));
        }

        let mut table = HashMap::new();
        for label in &categories {
            table.insert(canonical_key(label), label.clone());
        }
        for (alias, target) in aliases {
            if !categories.iter().any(|c| c == target) {
                return Err(mismatch(format!("alias {:?} targets unknown {:?}", alias, target)));
            }
            table.insert(canonical_key(alias), target.to_string());
        }

        Ok(Self {
            column: column.to_string(),
            categories,
            aliases: table,
            default: default.to_string(),
        })
    }

    /// Schema column this vocabulary feeds
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Ordered closed set
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Category substituted for unmapped input
    pub fn default_label(&self) -> &str {
        &self.default
    }

    /// Exact alias lookup without fallback
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.aliases.get(&canonical_key(raw)).map(String::as_str)
    }

    /// Map a raw value into the closed set, falling back to the default
    pub fn normalize(&self, raw: &str) -> Normalized<'_> {
        match self.lookup(raw) {
            Some(label) => Normalized { label, unmapped: None },
            None => Normalized {
                label: &self.default,
                unmapped: Some(UnmappedCategory {
                    column: self.column.clone(),
                    raw: raw.to_string(),
                    fallback: self.default.clone(),
                }),
            },
        }
    }

    /// Adopt the schema's category order; the label sets must be equal
    fn align_to(&mut self, order: &[String]) -> Result<(), FeatureError> {
        let missing: Vec<&String> = self.categories.iter().filter(|c| !order.contains(c)).collect();
        let extra: Vec<&String> = order.iter().filter(|c| !self.categories.contains(c)).collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(FeatureError::VocabularyMismatch {
                column: self.column.clone(),
                reason: format!("not in schema: {:?}; only in schema: {:?}", missing, extra),
            });
        }
        self.categories = order.to_vec();
        Ok(())
    }
}

const YES_NO: [&str; 2] = ["No", "Yes"];
const YES_NO_ALIASES: [(&str, &str); 8] = [
    ("y", "Yes"),
    ("1", "Yes"),
    ("true", "Yes"),
    ("n", "No"),
    ("0", "No"),
    ("false", "No"),
    ("never", "No"),
    ("currently", "Yes"),
];

/// Per-column normalizer over the built-in vocabularies
#[derive(Debug, Clone)]
pub struct CategoryNormalizer {
    vocabularies: HashMap<String, Vocabulary>,
}

impl CategoryNormalizer {
    /// Normalizer holding the given vocabularies
    pub fn new(vocabularies: Vec<Vocabulary>) -> Self {
        Self {
            vocabularies: vocabularies
                .into_iter()
                .map(|v| (v.column.clone(), v))
                .collect(),
        }
    }

    /// Vocabularies used by the LBW screening form
    pub fn standard() -> Result<Self, FeatureError> {
        let mut vocabularies = Vec::new();

        for column in [
            columns::CONSUME_TOBACCO,
            columns::CHEWING_TOBACCO,
            columns::CONSUME_ALCOHOL,
            columns::JSY_REGISTERED,
            columns::RAJHSRI_REGISTERED,
        ] {
            vocabularies.push(Vocabulary::new(column, &YES_NO, "No", &YES_NO_ALIASES)?);
        }

        let mut tt_aliases = YES_NO_ALIASES.to_vec();
        tt_aliases.extend([
            ("9999", "Don't Know"),
            ("dont know", "Don't Know"),
            ("do not know", "Don't Know"),
            ("unknown", "Don't Know"),
            ("dk", "Don't Know"),
        ]);
        vocabularies.push(Vocabulary::new(
            columns::TT_INJECTION,
            &["No", "Yes", "Don't Know"],
            "Don't Know",
            &tt_aliases,
        )?);

        vocabularies.push(Vocabulary::new(
            columns::TOILET_TYPE,
            &[
                "Improved toilet",
                "Pit latrine (basic)",
                "Unimproved / unknown",
                "No facility / open defecation",
            ],
            "Unimproved / unknown",
            &[
                ("yes", "Improved toilet"),
                ("improved", "Improved toilet"),
                ("flush toilet", "Improved toilet"),
                ("flush to piped sewer system", "Improved toilet"),
                ("flush to septic tank", "Improved toilet"),
                ("pour flush", "Improved toilet"),
                ("twin pit / composting toilet", "Improved toilet"),
                ("pit latrine", "Pit latrine (basic)"),
                ("pit latrine with slab", "Pit latrine (basic)"),
                ("ventilated improved pit latrine", "Pit latrine (basic)"),
                ("vip latrine", "Pit latrine (basic)"),
                ("no", "Unimproved / unknown"),
                ("pit latrine without slab", "Unimproved / unknown"),
                ("unknown", "Unimproved / unknown"),
                ("open defecation", "No facility / open defecation"),
                ("no facility", "No facility / open defecation"),
                ("no facility / bush / field", "No facility / open defecation"),
                ("open field", "No facility / open defecation"),
            ],
        )?);

        vocabularies.push(Vocabulary::new(
            columns::WATER_SOURCE,
            &[
                "Piped supply (home/yard/stand)",
                "Groundwater – handpump/borewell",
                "Protected well",
                "Surface/Unprotected source",
                "Delivered / other",
            ],
            "Delivered / other",
            &[
                ("piped", "Piped supply (home/yard/stand)"),
                ("piped water", "Piped supply (home/yard/stand)"),
                ("piped into dwelling", "Piped supply (home/yard/stand)"),
                ("piped to yard/plot", "Piped supply (home/yard/stand)"),
                ("public tap/standpipe", "Piped supply (home/yard/stand)"),
                ("tap", "Piped supply (home/yard/stand)"),
                ("handpump", "Groundwater – handpump/borewell"),
                ("hand pump", "Groundwater – handpump/borewell"),
                ("borewell", "Groundwater – handpump/borewell"),
                ("tube well", "Groundwater – handpump/borewell"),
                ("tubewell", "Groundwater – handpump/borewell"),
                ("tube well or borehole", "Groundwater – handpump/borewell"),
                ("protected dug well", "Protected well"),
                ("protected spring", "Protected well"),
                ("no", "Surface/Unprotected source"),
                ("unprotected well", "Surface/Unprotected source"),
                ("unprotected dug well", "Surface/Unprotected source"),
                ("unprotected spring", "Surface/Unprotected source"),
                ("surface water", "Surface/Unprotected source"),
                ("river", "Surface/Unprotected source"),
                ("pond", "Surface/Unprotected source"),
                ("river/dam/lake/ponds/stream/canal", "Surface/Unprotected source"),
                ("tanker truck", "Delivered / other"),
                ("cart with small tank", "Delivered / other"),
                ("bottled water", "Delivered / other"),
            ],
        )?);

        vocabularies.push(Vocabulary::new(
            columns::EDUCATION,
            &[
                "No schooling",
                "Primary (1–5)",
                "Middle (6–8)",
                "Secondary (9–12)",
                "Graduate & above",
            ],
            "No schooling",
            &[
                ("illiterate", "No schooling"),
                ("none", "No schooling"),
                ("no education", "No schooling"),
                ("primary", "Primary (1–5)"),
                ("upper primary", "Middle (6–8)"),
                ("middle", "Middle (6–8)"),
                ("secondary", "Secondary (9–12)"),
                ("senior secondary", "Secondary (9–12)"),
                ("higher secondary", "Secondary (9–12)"),
                ("high school", "Secondary (9–12)"),
                ("graduate", "Graduate & above"),
                ("graduate and above", "Graduate & above"),
                ("post graduate", "Graduate & above"),
                ("postgraduate", "Graduate & above"),
            ],
        )?);

        vocabularies.push(Vocabulary::new(
            columns::SOCIAL_MEDIA,
            &["None", "Low", "Medium", "High"],
            "None",
            &[("no", "None"), ("nil", "None"), ("moderate", "Medium")],
        )?);

        Ok(Self::new(vocabularies))
    }

    /// Reconcile with the frozen schema: adopt its category order and fail on
    /// any label-set or kind disagreement. Vocabularies for columns the
    /// schema does not carry are dropped.
    pub fn aligned_with(mut self, schema: &FeatureSchema) -> Result<Self, FeatureError> {
        let mut aligned = HashMap::with_capacity(self.vocabularies.len());
        for (column, mut vocabulary) in self.vocabularies.drain() {
            match schema.column(&column).map(|c| &c.kind) {
                Some(ColumnKind::Categorical(order)) => {
                    vocabulary.align_to(order)?;
                    aligned.insert(column, vocabulary);
                }
                Some(other) => {
                    return Err(FeatureError::VocabularyMismatch {
                        column,
                        reason: format!("schema declares {:?}, not a categorical", other),
                    });
                }
                None => debug!("Schema has no column {:?}; vocabulary unused", column),
            }
        }
        info!("Category normalizer aligned: {} vocabularies", aligned.len());
        Ok(Self { vocabularies: aligned })
    }

    /// Vocabulary for a column
    pub fn vocabulary(&self, column: &str) -> Option<&Vocabulary> {
        self.vocabularies.get(column)
    }

    /// Normalize a value for a column; `None` when the column has no vocabulary.
    ///
    /// Fallbacks are logged and counted here.
    pub fn normalize(&self, column: &str, raw: &str) -> Option<Normalized<'_>> {
        let normalized = self.vocabularies.get(column)?.normalize(raw);
        if let Some(unmapped) = &normalized.unmapped {
            warn!(
                "Unmapped value {:?} for {:?}; using {:?}",
                unmapped.raw, unmapped.column, unmapped.fallback
            );
            metrics::counter!("category_fallback_total", "column" => unmapped.column.clone()).increment(1);
        }
        Some(normalized)
    }
}
