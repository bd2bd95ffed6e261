use crate::error::LogError;
use crate::index::types::Document;
use crate::translog::record::LogRecord;
use std::collections::BTreeSet;

/// Document types a store accepts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings {
    types: BTreeSet<String>,
}

impl Mappings {
    /// Accept any document type
    pub fn dynamic() -> Self {
        Self::default()
    }

    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }

    pub fn accepts(&self, doc_type: &str) -> bool {
        self.is_dynamic() || self.types.contains(doc_type)
    }

    pub fn check(&self, document: &Document) -> Result<(), LogError> {
        if self.accepts(&document.doc_type) {
            Ok(())
        } else {
            Err(LogError::UnmappedType(document.doc_type.clone()))
        }
    }

    pub fn check_record(&self, record: &LogRecord) -> Result<(), LogError> {
        record.documents().try_for_each(|doc| self.check(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_accepts_everything() {
        let mappings = Mappings::dynamic();
        assert!(mappings.check(&Document::new("anything")).is_ok());
    }

    #[test]
    fn test_unmapped_type_rejected() {
        let mappings = Mappings::new(["concept", "description"]);
        assert!(mappings.check(&Document::new("concept")).is_ok());

        let record = LogRecord::put("r1", Document::new("relationship"));
        match mappings.check_record(&record) {
            Err(LogError::UnmappedType(t)) => assert_eq!(t, "relationship"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(mappings.check_record(&LogRecord::delete("r1")).is_ok());
    }
}
