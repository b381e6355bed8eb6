use std::fmt;

use crate::error::{AppError, Result};

/// Address inside the record store: a whole collection or one record in it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPath {
    collection: String,
    id: Option<String>,
}

impl RecordPath {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: None,
        }
    }

    pub fn record(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: Some(id.into()),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Id of a record path, or an error for a collection path
    pub fn record_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| AppError::BadRequest(format!("'{}' is not a record path", self)))
    }

    /// Whether a change at `changed` is visible from this path
    pub fn observes(&self, changed: &RecordPath) -> bool {
        if self.collection != changed.collection {
            return false;
        }
        match (&self.id, &changed.id) {
            (None, _) => true,
            (Some(mine), Some(theirs)) => mine == theirs,
            (Some(_), None) => true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Nested collections such as `admin/Dealoftehday` are allowed
        if self.collection.split('/').any(str::is_empty) {
            return Err(AppError::BadRequest(format!(
                "Invalid collection name: {:?}",
                self.collection
            )));
        }
        if let Some(id) = &self.id {
            if id.is_empty() || id.contains('/') {
                return Err(AppError::BadRequest(format!("Invalid record id: {:?}", id)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.collection, id),
            None => write!(f, "{}", self.collection),
        }
    }
}
