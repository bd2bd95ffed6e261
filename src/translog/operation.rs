use crate::error::UnsupportedOperationError;
use crate::index::api::{DocumentWriter, Searcher};
use crate::index::types::Document;
use crate::translog::record::{LogRecord, Put};
use std::io;

/// One document of a bulk update
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub key: String,
    pub document: Document,
}

/// A domain mutation executed against the index
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Index { key: String, document: Document },
    Delete { key: String },
    BulkUpdate { updates: Vec<Update> },
    DeleteAll,
}

impl Operation {
    pub fn index(key: impl Into<String>, document: Document) -> Self {
        Operation::Index {
            key: key.into(),
            document,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete { key: key.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Index { .. } => "index",
            Operation::Delete { .. } => "delete",
            Operation::BulkUpdate { .. } => "bulk_update",
            Operation::DeleteAll => "delete_all",
        }
    }

    /// Apply to the index. None of the built-in operations read through the
    /// searcher; it is handed over for operations that need to.
    pub fn execute<W, S>(&self, writer: &mut W, _searcher: &S) -> io::Result<()>
    where
        W: DocumentWriter + ?Sized,
        S: Searcher + ?Sized,
    {
        match self {
            Operation::Index { key, document } => writer.update_document(key, document.clone()),
            Operation::Delete { key } => writer.delete_documents(key),
            Operation::BulkUpdate { updates } => updates
                .iter()
                .try_for_each(|u| writer.update_document(&u.key, u.document.clone())),
            Operation::DeleteAll => writer.delete_all(),
        }
    }

    /// The records that make this operation replayable
    pub fn to_translog_operation(&self) -> Result<Vec<LogRecord>, UnsupportedOperationError> {
        match self {
            Operation::Index { key, document } => Ok(vec![LogRecord::put(key.clone(), document.clone())]),
            Operation::Delete { key } => Ok(vec![LogRecord::delete(key.clone())]),
            Operation::BulkUpdate { updates } => Ok(updates
                .iter()
                .map(|u| LogRecord::put(u.key.clone(), u.document.clone()))
                .collect()),
            Operation::DeleteAll => Err(UnsupportedOperationError(self.name())),
        }
    }
}

/// Free-function form of [`Operation::to_translog_operation`]
pub fn to_translog_operation(operation: &Operation) -> Result<Vec<LogRecord>, UnsupportedOperationError> {
    operation.to_translog_operation()
}

impl LogRecord {
    /// Operations that replay this record, in order
    pub fn into_operations(self) -> Vec<Operation> {
        let index = |put: Put| Operation::Index {
            key: put.key,
            document: put.payload,
        };
        match self {
            LogRecord::Put(put) => vec![index(put)],
            LogRecord::Delete { key } => vec![Operation::Delete { key }],
            LogRecord::BulkPut { puts } => puts.into_iter().map(index).collect(),
        }
    }
}
