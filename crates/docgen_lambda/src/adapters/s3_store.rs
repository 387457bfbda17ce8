use std::future::Future;

use aws_sdk_s3::primitives::ByteStream;
use docgen_core::config::WritePolicy;

use crate::adapters::object_store::{ContentStore, StoreEntry};

/// S3-backed content store.
///
/// SDK calls are async; the handler pipeline is synchronous, so every call is
/// driven to completion on the current multi-threaded runtime.
#[derive(Clone)]
pub struct S3ContentStore {
    s3_client: aws_sdk_s3::Client,
}

impl S3ContentStore {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

impl ContentStore for S3ContentStore {
    fn list_entries(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<StoreEntry>, String> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        let client = self.s3_client.clone();

        block_on(async move {
            let mut entries = Vec::new();
            let mut continuation_token: Option<String> = None;
            loop {
                let response = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .delimiter(&delimiter)
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|error| format!("failed to list objects in s3: {error}"))?;

                for object in response.contents() {
                    if let Some(key) = object.key() {
                        entries.push(StoreEntry {
                            key: key.to_string(),
                            size: object.size().unwrap_or_default().max(0) as u64,
                        });
                    }
                }

                match response.next_continuation_token() {
                    Some(token) if response.is_truncated().unwrap_or(false) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }
            Ok::<_, String>(entries)
        })
    }

    fn read_entry(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        block_on(async move {
            let response = client
                .get_object()
                .bucket(bucket)
                .key(object_key)
                .send()
                .await
                .map_err(|error| format!("failed to read object from s3: {error}"))?;
            response
                .body
                .collect()
                .await
                .map(|data| data.into_bytes().to_vec())
                .map_err(|error| format!("failed to read object body from s3: {error}"))
        })
    }

    fn write_entry(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        policy: WritePolicy,
    ) -> Result<(), String> {
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let client = self.s3_client.clone();

        block_on(async move {
            let request = client
                .put_object()
                .bucket(bucket)
                .key(object_key)
                .body(ByteStream::from(body_bytes));
            let request = match policy {
                WritePolicy::Overwrite => request,
                WritePolicy::FailIfExists => request.if_none_match("*"),
            };
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to write object to s3: {error}"))
        })
    }
}
