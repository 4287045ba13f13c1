//! Embedded store for file records and the analysis cache
//!
//! CozoDB over its SQLite backend for persistence, the in-memory backend
//! for tests. All queries go through the typed wrappers in `queries`,
//! which generate CozoScript internally.

mod queries;
mod schema;

pub use queries::{AnalysisQuery, FileQuery};

use std::collections::BTreeMap;
use std::path::Path;

use cozo::{DataValue, DbInstance, NamedRows};

/// Database connection wrapper
pub struct NomenDb {
    db: DbInstance,
}

impl NomenDb {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DbError::Open(e.to_string()))?;
        }
        let db = DbInstance::new("sqlite", path, "")
            .map_err(|e| DbError::Open(e.to_string()))?;

        let nomen_db = Self { db };
        nomen_db.ensure_schema()?;
        Ok(nomen_db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, DbError> {
        let db = DbInstance::new("mem", "", "").map_err(|e| DbError::Open(e.to_string()))?;
        let nomen_db = Self { db };
        nomen_db.ensure_schema()?;
        Ok(nomen_db)
    }

    /// Ensure all required relations exist
    fn ensure_schema(&self) -> Result<(), DbError> {
        schema::create_all_relations(&self.db)
    }

    /// Run a mutating CozoScript query
    pub fn run_script(
        &self,
        script: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows, DbError> {
        self.db
            .run_script(script, params, cozo::ScriptMutability::Mutable)
            .map_err(|e| DbError::Query(e.to_string()))
    }

    /// Get the underlying DbInstance for advanced usage
    pub fn inner(&self) -> &DbInstance {
        &self.db
    }

    /// Run a read-only query
    pub fn run_query(
        &self,
        script: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows, DbError> {
        self.db
            .run_script(script, params, cozo::ScriptMutability::Immutable)
            .map_err(|e| DbError::Query(e.to_string()))
    }
}

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Row decode error: {0}")]
    Decode(String),
}

/// Helper macro for creating parameter maps
#[macro_export]
macro_rules! params {
    () => {
        std::collections::BTreeMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::BTreeMap::new();
        $(
            map.insert($key.to_string(), cozo::DataValue::from($value));
        )+
        map
    }};
}
