//! Feature Engineering Engine
//!
//! Turns a validated observation into the schema-aligned feature vector the
//! LBW risk model was trained on: derivation rules, category normalization
//! and schema enforcement.

pub mod columns;
mod derivation;
mod enforcer;
mod error;
mod features;
mod normalizer;
mod schema;

pub use derivation::{
    bmi, counselling_gap, derive_attributes, hb_risk_bin, household_asset_score,
    log1p_safe, month_of_conception, parse_month, registration_bucket, timing_bucket, AssetItem,
    AssetScore, DerivationConfig, DerivedAttributes, HbRiskBin, HbThresholds, TimingBucket,
    TimingThresholds, ASSET_CATALOGUE,
};
pub use enforcer::SchemaEnforcer;
pub use error::FeatureError;
pub use features::{
    AssembledFeatures, FeatureAssembler, FeatureRecord, FeatureValue, FeatureVector, TypedValue,
};
pub use normalizer::{canonical_key, CategoryNormalizer, Normalized, UnmappedCategory, Vocabulary};
pub use schema::{
    read_json, ColumnKind, ColumnSpec, DtypeSpec, FeatureSchema, CATEGORIES_FILE, DTYPES_FILE,
    FEATURES_FILE,
};
