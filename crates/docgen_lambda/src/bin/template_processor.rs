use chrono::Utc;
use docgen_core::decode::EventDecoder;
use docgen_lambda::adapters::docx::DocxEngine;
use docgen_lambda::adapters::s3_store::S3ContentStore;
use docgen_lambda::handlers::template::handle_event;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct RuntimeDependencies {
    store: S3ContentStore,
    decoder: EventDecoder,
    engine: DocxEngine,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<Value, Error> {
    let outcomes = handle_event(
        event.payload,
        |key| std::env::var(key).ok(),
        Utc::now().timestamp_millis(),
        &deps.decoder,
        &deps.store,
        &deps.engine,
    )
    .map_err(|error| Error::from(error.to_string()))?;

    Ok(json!({
        "status": "ok",
        "request_id": event.context.request_id,
        "outcomes": outcomes,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_current_span(false)
        .with_target(false)
        .init();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        store: S3ContentStore::new(aws_sdk_s3::Client::new(&aws_config)),
        decoder: EventDecoder::new(),
        engine: DocxEngine::new()?,
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = deps.clone();
        async move { handle_request(event, &deps).await }
    }))
    .await
}
