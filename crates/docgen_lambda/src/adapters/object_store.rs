use docgen_core::config::WritePolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub key: String,
    pub size: u64,
}

pub trait ContentStore {
    /// Lists entries under `prefix` without descending past `delimiter`, in
    /// the order the store returns them.
    fn list_entries(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<StoreEntry>, String>;

    fn read_entry(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;

    fn write_entry(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        policy: WritePolicy,
    ) -> Result<(), String>;
}
