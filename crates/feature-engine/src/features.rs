//! Feature Record and Vector Assembly

use crate::columns;
use crate::derivation::{derive_attributes, DerivationConfig, DerivedAttributes, HbRiskBin, TimingBucket};
use crate::error::FeatureError;
use crate::normalizer::{CategoryNormalizer, UnmappedCategory};
use crate::schema::{ColumnKind, FeatureSchema};
use chrono::Month;
use data_validator::{Observation, ValidationReport};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

/// Loosely typed value produced by the assembler, before schema enforcement
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Numeric value
    Number(f64),
    /// Label already normalized into a closed vocabulary
    Label(String),
    /// Free text that has not been normalized
    Text(String),
    /// Explicit missing marker
    Missing,
}

impl FeatureValue {
    /// Number, or missing when absent
    pub fn number(value: Option<f64>) -> Self {
        value.map_or(FeatureValue::Missing, FeatureValue::Number)
    }

    /// Label, or missing when absent
    pub fn label(value: Option<&str>) -> Self {
        value.map_or(FeatureValue::Missing, |l| FeatureValue::Label(l.to_string()))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeatureValue::Number(n) => serializer.serialize_f64(*n),
            FeatureValue::Label(s) | FeatureValue::Text(s) => serializer.serialize_str(s),
            FeatureValue::Missing => serializer.serialize_none(),
        }
    }
}

/// Unordered column → value record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureRecord {
    values: HashMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value
    pub fn insert(&mut self, column: impl Into<String>, value: FeatureValue) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.values.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Value typed against the schema
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    /// Position in the column's closed set, plus its label
    Category { code: u32, label: String },
    Missing,
}

impl TypedValue {
    /// Numeric form fed to the model; categories use their code
    pub fn as_model_input(&self) -> Option<f64> {
        match self {
            TypedValue::Int(v) => Some(*v as f64),
            TypedValue::Float(v) => Some(*v),
            TypedValue::Category { code, .. } => Some(f64::from(*code)),
            TypedValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TypedValue::Missing)
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TypedValue::Int(v) => serializer.serialize_i64(*v),
            TypedValue::Float(v) => serializer.serialize_f64(*v),
            TypedValue::Category { label, .. } => serializer.serialize_str(label),
            TypedValue::Missing => serializer.serialize_none(),
        }
    }
}

/// Schema-ordered typed feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, TypedValue)>,
}

impl FeatureVector {
    pub(crate) fn from_entries(entries: Vec<(String, TypedValue)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Value for a column
    pub fn get(&self, column: &str) -> Option<&TypedValue> {
        self.entries.iter().find(|(n, _)| n == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of missing entries
    pub fn missing_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_missing()).count()
    }

    /// Model inputs in schema order
    pub fn model_inputs(&self) -> Vec<Option<f64>> {
        self.entries.iter().map(|(_, v)| v.as_model_input()).collect()
    }

    /// Back to an untyped record; enforcing it again yields this vector
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for (name, value) in &self.entries {
            let value = match value {
                TypedValue::Int(v) => FeatureValue::Number(*v as f64),
                TypedValue::Float(v) => FeatureValue::Number(*v),
                TypedValue::Category { label, .. } => FeatureValue::Label(label.clone()),
                TypedValue::Missing => FeatureValue::Missing,
            };
            record.insert(name.clone(), value);
        }
        record
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Record assembled from one observation
#[derive(Debug, Clone)]
pub struct AssembledFeatures {
    pub record: FeatureRecord,
    pub derived: DerivedAttributes,
    /// Categorical inputs that fell back to a column default
    pub fallbacks: Vec<UnmappedCategory>,
}

/// Builds the training-time feature record from a validated observation
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    normalizer: CategoryNormalizer,
    config: DerivationConfig,
}

impl FeatureAssembler {
    pub fn new(normalizer: CategoryNormalizer, config: DerivationConfig) -> Self {
        Self { normalizer, config }
    }

    pub fn normalizer(&self) -> &CategoryNormalizer {
        &self.normalizer
    }

    pub fn config(&self) -> &DerivationConfig {
        &self.config
    }

    /// Every label the derivations can write into each categorical column
    fn derived_labels() -> Vec<(&'static str, Vec<&'static str>)> {
        let hb = HbRiskBin::ALL.iter().map(|b| b.as_str()).collect();
        let timing: Vec<&'static str> = TimingBucket::ALL.iter().map(|b| b.as_str()).collect();
        let months = (1..=12u8)
            .filter_map(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .collect();
        vec![
            (columns::HB_RISK_BIN, hb),
            (columns::REGISTRATION_BUCKET, timing.clone()),
            (columns::ANC_BUCKET, timing),
            (columns::MONTH_CONCEPTION, months),
        ]
    }

    /// Refuse a schema whose closed sets cannot hold every derived label
    pub fn check_derived_labels(schema: &FeatureSchema) -> Result<(), FeatureError> {
        for (column, labels) in Self::derived_labels() {
            let Some(ColumnKind::Categorical(set)) = schema.column(column).map(|c| &c.kind) else {
                continue;
            };
            let absent: Vec<&str> = labels
                .into_iter()
                .filter(|label| !set.iter().any(|s| s == label))
                .collect();
            if !absent.is_empty() {
                return Err(FeatureError::VocabularyMismatch {
                    column: column.to_string(),
                    reason: format!("derived labels {:?} are not in the schema's set {:?}", absent, set),
                });
            }
        }
        Ok(())
    }

    /// Derive, normalize and name every model column
    pub fn assemble(&self, obs: &Observation) -> Result<AssembledFeatures, ValidationReport> {
        let derived = derive_attributes(obs, &self.config)?;
        let mut record = FeatureRecord::new();
        let mut fallbacks = Vec::new();

        record.insert(columns::BENEFICIARY_AGE, FeatureValue::number(obs.beneficiary_age));
        record.insert(
            columns::HB_RISK_BIN,
            FeatureValue::label(derived.hb_risk_bin.map(|b| b.as_str())),
        );
        record.insert(columns::PARITY, FeatureValue::number(obs.parity));
        record.insert(columns::LIVING_CHILDREN, FeatureValue::number(obs.living_children));
        record.insert(
            columns::MONTH_CONCEPTION,
            FeatureValue::Label(derived.month_conception.to_string()),
        );
        for (column, value) in columns::BMI.iter().zip(derived.bmi) {
            record.insert(*column, FeatureValue::number(value));
        }

        record.insert(
            columns::REGISTRATION_BUCKET,
            FeatureValue::Label(derived.registration_bucket.as_str().to_string()),
        );
        record.insert(
            columns::COUNSELLING_GAP,
            FeatureValue::number(derived.counselling_gap_days.map(|d| d as f64)),
        );
        record.insert(
            columns::ANC_BUCKET,
            FeatureValue::label(derived.anc_bucket.map(|b| b.as_str())),
        );
        for (column, days) in columns::LMP_TO_INSTALLMENT.iter().zip(derived.lmp_to_installment_days) {
            record.insert(*column, FeatureValue::number(days.map(|d| d as f64)));
        }

        record.insert(columns::ANC_COMPLETED, FeatureValue::number(obs.anc_completed));
        record.insert(columns::IFA_TABLETS_LOG, FeatureValue::number(derived.ifa_tablets_log1p));
        record.insert(
            columns::CALCIUM_TABLETS_LOG,
            FeatureValue::number(derived.calcium_tablets_log1p),
        );
        record.insert(columns::FOOD_GROUPS, FeatureValue::number(obs.food_group));
        record.insert(
            columns::ASSETS_SCORE_LOG,
            FeatureValue::number(derived.household_asset_score_log1p),
        );
        record.insert(columns::PMMVY_INSTALLMENTS, FeatureValue::number(obs.pmmvy_installments));
        record.insert(columns::JSY_INSTALLMENTS, FeatureValue::number(obs.jsy_installments));

        let categorical = [
            (columns::TT_INJECTION, &obs.tt_injection),
            (columns::CONSUME_TOBACCO, &obs.consume_tobacco),
            (columns::CHEWING_TOBACCO, &obs.chewing_tobacco),
            (columns::CONSUME_ALCOHOL, &obs.consume_alcohol),
            (columns::TOILET_TYPE, &obs.toilet_type),
            (columns::WATER_SOURCE, &obs.water_source),
            (columns::EDUCATION, &obs.education),
            (columns::SOCIAL_MEDIA, &obs.social_media),
            (columns::JSY_REGISTERED, &obs.jsy_registered),
            (columns::RAJHSRI_REGISTERED, &obs.rajhshri_registered),
        ];
        for (column, raw) in categorical {
            let value = match raw.as_deref() {
                None => FeatureValue::Missing,
                Some(text) => match self.normalizer.normalize(column, text) {
                    Some(normalized) => {
                        fallbacks.extend(normalized.unmapped);
                        FeatureValue::Label(normalized.label.to_string())
                    }
                    // No vocabulary for this column; the enforcer decides
                    None => FeatureValue::Text(text.to_string()),
                },
            };
            record.insert(column, value);
        }

        debug!(
            "Assembled {} columns ({} category fallbacks)",
            record.len(),
            fallbacks.len()
        );

        Ok(AssembledFeatures { record, derived, fallbacks })
    }
}
