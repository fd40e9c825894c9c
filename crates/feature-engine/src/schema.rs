//! Frozen Training Schema
//!
//! Column order, dtypes and categorical closed sets exported alongside the
//! trained model. The schema is read once at startup and never modified.

use crate::error::FeatureError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ordered column names
pub const FEATURES_FILE: &str = "features.json";
/// Column → dtype
pub const DTYPES_FILE: &str = "dtypes.json";
/// Column → ordered closed category set
pub const CATEGORIES_FILE: &str = "categories.json";

/// Declared kind of a column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// Value from a closed, ordered set
    Categorical(Vec<String>),
    /// Dtype the model cannot accept (e.g. `object`) or no dtype declared
    Untyped(String),
}

impl ColumnKind {
    /// Whether values are numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Int | ColumnKind::Float)
    }

    /// Closed set for categorical columns
    pub fn categories(&self) -> Option<&[String]> {
        match self {
            ColumnKind::Categorical(set) => Some(set),
            _ => None,
        }
    }
}

/// One schema column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    /// Replacement for a missing numeric value
    pub fill: Option<f64>,
}

/// dtype entry as written in `dtypes.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DtypeSpec {
    Name(String),
    Detailed {
        kind: String,
        #[serde(default)]
        fill: Option<f64>,
    },
}

impl DtypeSpec {
    fn parts(&self) -> (&str, Option<f64>) {
        match self {
            DtypeSpec::Name(kind) => (kind, None),
            DtypeSpec::Detailed { kind, fill } => (kind, *fill),
        }
    }
}

/// The frozen feature schema
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    columns: Vec<ColumnSpec>,
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Build and validate a schema from its three artifact tables
    pub fn from_parts(
        features: Vec<String>,
        dtypes: HashMap<String, DtypeSpec>,
        mut categories: HashMap<String, Vec<String>>,
    ) -> Result<Self, FeatureError> {
        if features.is_empty() {
            return Err(invalid(FEATURES_FILE, "feature list is empty".to_string()));
        }

        let mut columns = Vec::with_capacity(features.len());
        let mut index = HashMap::with_capacity(features.len());

        for name in features {
            if index.contains_key(&name) {
                return Err(invalid(FEATURES_FILE, format!("duplicate column {:?}", name)));
            }

            let (kind_name, fill) = match dtypes.get(&name) {
                Some(spec) => spec.parts(),
                None => ("<undeclared>", None),
            };

            let kind = match kind_name.to_ascii_lowercase().as_str() {
                "int" | "int32" | "int64" | "integer" => ColumnKind::Int,
                "float" | "float32" | "float64" | "double" | "number" => ColumnKind::Float,
                "category" | "categorical" => {
                    let set = categories.remove(&name).unwrap_or_default();
                    check_closed_set(&name, &set)?;
                    ColumnKind::Categorical(set)
                }
                other => {
                    warn!("Column {:?} has non-model dtype {:?}", name, other);
                    ColumnKind::Untyped(other.to_string())
                }
            };

            if let Some(fill) = fill {
                let ok = match &kind {
                    ColumnKind::Int => fill.is_finite() && fill.fract() == 0.0,
                    ColumnKind::Float => fill.is_finite(),
                    _ => false,
                };
                if !ok {
                    return Err(invalid(
                        DTYPES_FILE,
                        format!("fill {} is not valid for column {:?}", fill, name),
                    ));
                }
            }

            index.insert(name.clone(), columns.len());
            columns.push(ColumnSpec { name, kind, fill });
        }

        for name in categories.keys() {
            debug!("Ignoring category set for non-categorical column {:?}", name);
        }

        Ok(Self { columns, index })
    }

    /// Load `features.json`, `dtypes.json` and `categories.json` from a directory
    pub fn load(dir: &Path) -> Result<Self, FeatureError> {
        let features: Vec<String> = read_json(&dir.join(FEATURES_FILE))?;
        let dtypes: HashMap<String, DtypeSpec> = read_json(&dir.join(DTYPES_FILE))?;
        let categories: HashMap<String, Vec<String>> = read_json(&dir.join(CATEGORIES_FILE))?;

        let schema = Self::from_parts(features, dtypes, categories)?;
        info!(
            "Loaded feature schema from {}: {} columns",
            dir.display(),
            schema.len()
        );
        Ok(schema)
    }

    /// Columns in model order
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in model order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Position of a column in model order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Names of columns whose kind the model cannot accept
    pub fn untyped_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| matches!(c.kind, ColumnKind::Untyped(_)))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn check_closed_set(column: &str, set: &[String]) -> Result<(), FeatureError> {
    if set.is_empty() {
        return Err(invalid(
            CATEGORIES_FILE,
            format!("categorical column {:?} has no category set", column),
        ));
    }
    for (i, label) in set.iter().enumerate() {
        if set[..i].contains(label) {
            return Err(invalid(
                CATEGORIES_FILE,
                format!("duplicate category {:?} in column {:?}", label, column),
            ));
        }
    }
    Ok(())
}

fn invalid(artifact: &str, reason: String) -> FeatureError {
    FeatureError::InvalidArtifact {
        artifact: artifact.to_string(),
        reason,
    }
}

/// Read a JSON artifact; the file handle is released on return
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FeatureError> {
    let file = File::open(path).map_err(|source| FeatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| FeatureError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn dtypes(entries: &[(&str, &str)]) -> HashMap<String, DtypeSpec> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), DtypeSpec::Name(v.to_string())))
            .collect()
    }

    #[test]
    fn test_schema_preserves_order_and_kinds() {
        let schema = FeatureSchema::from_parts(
            strings(&["b", "a", "c"]),
            dtypes(&[("a", "float64"), ("b", "int"), ("c", "category")]),
            HashMap::from([("c".to_string(), strings(&["z", "y"]))]),
        )
        .unwrap();

        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(schema.column("b").unwrap().kind, ColumnKind::Int);
        assert_eq!(schema.column("a").unwrap().kind, ColumnKind::Float);
        assert_eq!(
            schema.column("c").unwrap().kind.categories(),
            Some(&strings(&["z", "y"])[..])
        );
        assert_eq!(schema.position("c"), Some(2));
        assert!(schema.untyped_columns().is_empty());
    }

    #[test]
    fn test_undeclared_and_object_dtypes_are_untyped() {
        let schema = FeatureSchema::from_parts(
            strings(&["a", "b"]),
            dtypes(&[("a", "object")]),
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(schema.untyped_columns(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = FeatureSchema::from_parts(
            strings(&["a", "a"]),
            dtypes(&[("a", "int")]),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidArtifact { .. }));
    }

    #[test]
    fn test_categorical_without_set_rejected() {
        let err = FeatureSchema::from_parts(
            strings(&["c"]),
            dtypes(&[("c", "category")]),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidArtifact { .. }));
    }

    #[test]
    fn test_detailed_dtype_with_fill() {
        let raw = r#"{"a": {"kind": "int", "fill": 0}, "b": "float"}"#;
        let parsed: HashMap<String, DtypeSpec> = serde_json::from_str(raw).unwrap();
        let schema = FeatureSchema::from_parts(strings(&["a", "b"]), parsed, HashMap::new()).unwrap();
        assert_eq!(schema.column("a").unwrap().fill, Some(0.0));

        let bad: HashMap<String, DtypeSpec> =
            serde_json::from_str(r#"{"a": {"kind": "int", "fill": 0.5}}"#).unwrap();
        assert!(FeatureSchema::from_parts(strings(&["a"]), bad, HashMap::new()).is_err());
    }

    #[test]
    fn test_load_missing_directory() {
        let err = FeatureSchema::load(Path::new("/nonexistent/artifacts")).unwrap_err();
        assert!(matches!(err, FeatureError::Io { .. }));
    }
}
