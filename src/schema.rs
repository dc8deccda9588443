//! Ordered feature schema shared by training and serving.

use crate::error::{LoadError, LoadResult};
use indexmap::IndexSet;
use std::fs;
use std::path::Path;

/// Marker that turns a column into a percentage column.
pub const PERCENT_MARKER: char = '%';

/// Ordered set of feature column names.
///
/// The scaler and every regressor are positional, so this order is the
/// contract between training and serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: IndexSet<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty, blank or duplicate column names.
    pub fn new<I, S>(columns: I) -> LoadResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = IndexSet::new();
        for column in columns {
            let column = column.into();
            if column.trim().is_empty() {
                return Err(LoadError::InvalidSchema("blank column name".to_string()));
            }
            if !set.insert(column.clone()) {
                return Err(LoadError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    column
                )));
            }
        }

        if set.is_empty() {
            return Err(LoadError::InvalidSchema("no columns".to_string()));
        }

        Ok(Self { columns: set })
    }

    /// Load a schema from a JSON array of column names
    pub fn from_file<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let columns: Vec<String> =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(columns)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Column names in schema order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.columns.iter().cloned().collect()
    }

    /// Whether values of this column are percentages.
    pub fn is_percentage(column: &str) -> bool {
        column.contains(PERCENT_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keeps_order() {
        let schema = FeatureSchema::new(["z", "a", "% de parafraseo"]).unwrap();
        assert_eq!(
            schema.columns().collect::<Vec<_>>(),
            vec!["z", "a", "% de parafraseo"]
        );
        assert_eq!(schema.len(), 3);
        assert!(schema.contains("a"));
        assert!(!schema.contains("b"));
    }

    #[test]
    fn test_schema_rejects_bad_columns() {
        assert!(matches!(
            FeatureSchema::new(["a", "a"]),
            Err(LoadError::InvalidSchema(_))
        ));
        assert!(matches!(
            FeatureSchema::new(["a", " "]),
            Err(LoadError::InvalidSchema(_))
        ));
        assert!(matches!(
            FeatureSchema::new(Vec::<String>::new()),
            Err(LoadError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_percentage_marker() {
        assert!(FeatureSchema::is_percentage("% de citas textuales"));
        assert!(!FeatureSchema::is_percentage("Encuestas"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_columns.json");
        fs::write(&path, r#"["Encuestas", "% de parafraseo"]"#).unwrap();

        let schema = FeatureSchema::from_file(&path).unwrap();
        assert_eq!(schema.to_vec(), vec!["Encuestas", "% de parafraseo"]);

        let missing = FeatureSchema::from_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(LoadError::Io { .. })));
    }
}
