//! Schema Enforcer
//!
//! Selects, reorders and types an assembled record against the frozen
//! training schema. Output columns are exactly the schema's, in its order.

use crate::error::FeatureError;
use crate::features::{FeatureRecord, FeatureValue, FeatureVector, TypedValue};
use crate::schema::{ColumnKind, ColumnSpec, FeatureSchema};
use std::sync::Arc;
use tracing::{debug, warn};

/// Types records against a shared, immutable schema
#[derive(Debug, Clone)]
pub struct SchemaEnforcer {
    schema: Arc<FeatureSchema>,
}

impl SchemaEnforcer {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Produce the schema-ordered vector for a record
    pub fn enforce(&self, record: &FeatureRecord) -> Result<FeatureVector, FeatureError> {
        let mut entries = Vec::with_capacity(self.schema.len());
        let missing = FeatureValue::Missing;

        for column in self.schema.columns() {
            let value = record.get(&column.name).unwrap_or(&missing);
            let typed = match &column.kind {
                ColumnKind::Int | ColumnKind::Float => numeric(column, value)?,
                ColumnKind::Categorical(set) => categorical(column, set, value)?,
                ColumnKind::Untyped(dtype) => {
                    return Err(violation(column, format!("declared dtype {:?} is not model-typed", dtype)));
                }
            };
            entries.push((column.name.clone(), typed));
        }

        for (name, _) in record.iter() {
            if self.schema.position(name).is_none() {
                debug!("Dropping column {:?} not in schema", name);
            }
        }

        Ok(FeatureVector::from_entries(entries))
    }
}

fn violation(column: &ColumnSpec, reason: String) -> FeatureError {
    FeatureError::SchemaViolation {
        column: column.name.clone(),
        reason,
    }
}

fn numeric(column: &ColumnSpec, value: &FeatureValue) -> Result<TypedValue, FeatureError> {
    let number = match value {
        FeatureValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
        FeatureValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        FeatureValue::Label(label) => {
            return Err(violation(column, format!("categorical label {:?} in numeric column", label)));
        }
        FeatureValue::Missing => None,
    };

    let Some(number) = number.or(column.fill) else {
        return Ok(TypedValue::Missing);
    };

    match column.kind {
        ColumnKind::Int if number.fract() != 0.0 => {
            Err(violation(column, format!("non-integral value {} in integer column", number)))
        }
        ColumnKind::Int => Ok(TypedValue::Int(number as i64)),
        _ => Ok(TypedValue::Float(number)),
    }
}

fn categorical(
    column: &ColumnSpec,
    set: &[String],
    value: &FeatureValue,
) -> Result<TypedValue, FeatureError> {
    let label = match value {
        FeatureValue::Label(label) => label.clone(),
        FeatureValue::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{}", *n as i64),
        FeatureValue::Number(n) => {
            return Err(violation(column, format!("non-integral code {} in categorical column", n)));
        }
        FeatureValue::Text(text) => {
            return Err(violation(column, format!("un-normalized text {:?} in categorical column", text)));
        }
        FeatureValue::Missing => return Ok(TypedValue::Missing),
    };

    match set.iter().position(|c| *c == label) {
        Some(code) => Ok(TypedValue::Category {
            code: code as u32,
            label,
        }),
        None => {
            warn!("Value {:?} outside closed set of {:?}; treating as missing", label, column.name);
            metrics::counter!("category_out_of_set_total", "column" => column.name.clone()).increment(1);
            Ok(TypedValue::Missing)
        }
    }
}
