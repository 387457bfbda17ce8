use std::collections::BTreeMap;

/// Document format capability used by the template handler.
///
/// `prepare` runs once per loaded document before any substitution.
pub trait DocumentEngine {
    type Document;

    fn load_document(&self, bytes: &[u8]) -> Result<Self::Document, String>;

    fn prepare(&self, document: &mut Self::Document) -> Result<(), String>;

    fn substitute(
        &self,
        document: &mut Self::Document,
        substitutions: &BTreeMap<String, String>,
    ) -> Result<(), String>;

    fn serialize(&self, document: Self::Document) -> Result<Vec<u8>, String>;
}
