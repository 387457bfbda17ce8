use std::fmt;

use docgen_core::config::{ConfigError, Configuration};
use docgen_core::contract::{PubSubMessage, ResolvedParameters, SkipReason, LISTING_DELIMITER};
use docgen_core::decode::{DecodeError, DecodeOutcome, EventDecoder};
use docgen_core::resolve::resolve_parameters;
use docgen_core::template_match::select_template;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::adapters::document_engine::DocumentEngine;
use crate::adapters::object_store::{ContentStore, StoreEntry};
use crate::handlers::envelope::extract_messages;

const COMPONENT: &str = "template_handler";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    Decoded,
    Resolved,
    Located,
    Substituted,
    Persisted,
    Done,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Decoded => "decoded",
            Self::Resolved => "resolved",
            Self::Located => "located",
            Self::Substituted => "substituted",
            Self::Persisted => "persisted",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStep {
    Load,
    Prepare,
    Substitute,
    Serialize,
}

impl fmt::Display for DocumentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Prepare => "prepare",
            Self::Substitute => "substitute",
            Self::Serialize => "serialize",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    List,
    Read,
    Write,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Fatal failures of one invocation. Nothing is retried here; redelivery is
/// up to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid event envelope: {0}")]
    Envelope(String),
    #[error("failed to decode request: {0}")]
    Decode(#[from] DecodeError),
    #[error("content store {operation} failed for '{key}': {message}")]
    Store {
        operation: StoreOperation,
        key: String,
        message: String,
    },
    #[error("document {step} failed for template '{template_key}': {message}")]
    Document {
        step: DocumentStep,
        template_key: String,
        message: String,
    },
}

impl PipelineError {
    /// Configuration errors are deployment mistakes; everything else is a
    /// processing error of this particular event.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Last stage reached before the failure.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Config(_) | Self::Envelope(_) | Self::Decode(_) => PipelineStage::Start,
            Self::Store {
                operation: StoreOperation::List,
                ..
            } => PipelineStage::Resolved,
            Self::Store {
                operation: StoreOperation::Read,
                ..
            }
            | Self::Document { .. } => PipelineStage::Located,
            Self::Store {
                operation: StoreOperation::Write,
                ..
            } => PipelineStage::Substituted,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Skipped {
        reason: SkipReason,
    },
    NoTemplateMatch {
        template_name: Option<String>,
    },
    Generated {
        template_key: String,
        target_path: String,
        bytes_written: usize,
    },
}

/// Full invocation: configuration is read first, then the event envelope is
/// split into messages which are handled in order. The first failure aborts
/// the remaining messages.
pub fn handle_event(
    event: Value,
    lookup: impl Fn(&str) -> Option<String>,
    now_millis: i64,
    decoder: &EventDecoder,
    store: &impl ContentStore,
    engine: &impl DocumentEngine,
) -> Result<Vec<InvocationOutcome>, PipelineError> {
    let config = Configuration::from_lookup(lookup).inspect_err(|error| {
        error!(
            component = COMPONENT,
            event = "invocation_failed",
            stage = %PipelineStage::Start,
            error = %error,
            "configuration is incomplete"
        );
    })?;
    let messages = extract_messages(event).map_err(PipelineError::Envelope)?;

    messages
        .iter()
        .map(|message| handle_message(message, &config, now_millis, decoder, store, engine))
        .collect()
}

pub fn handle_message(
    message: &PubSubMessage,
    config: &Configuration,
    now_millis: i64,
    decoder: &EventDecoder,
    store: &impl ContentStore,
    engine: &impl DocumentEngine,
) -> Result<InvocationOutcome, PipelineError> {
    let message_id = message.message_id.as_deref().unwrap_or("-");
    run_pipeline(message, config, now_millis, decoder, store, engine).inspect_err(|failure| {
        error!(
            component = COMPONENT,
            event = "invocation_failed",
            message_id,
            stage = %failure.stage(),
            config_error = failure.is_config_error(),
            error = %failure,
            "document generation failed"
        );
    })
}

fn run_pipeline(
    message: &PubSubMessage,
    config: &Configuration,
    now_millis: i64,
    decoder: &EventDecoder,
    store: &impl ContentStore,
    engine: &impl DocumentEngine,
) -> Result<InvocationOutcome, PipelineError> {
    let request = match decoder.decode_message(message)? {
        DecodeOutcome::Request(request) => request,
        DecodeOutcome::Skip(reason) => {
            warn!(
                component = COMPONENT,
                event = reason.event_name(),
                "nothing to generate, exiting"
            );
            return Ok(InvocationOutcome::Skipped { reason });
        }
    };
    debug!(component = COMPONENT, stage = %PipelineStage::Decoded);

    let parameters = resolve_parameters(&request, config, now_millis);
    info!(
        component = COMPONENT,
        event = "parameters_resolved",
        stage = %PipelineStage::Resolved,
        template_name = parameters.template_name.as_deref(),
        template_source = ?parameters.template_source,
        target_path = %parameters.target_path,
        target_source = ?parameters.target_source,
        substitutions = parameters.substitutions.len()
    );

    let Some(template) = locate_template(store, config, &parameters)? else {
        warn!(
            component = COMPONENT,
            event = "template_not_found",
            template_name = parameters.template_name.as_deref(),
            template_folder = %config.template_folder,
            "no template matched, nothing written"
        );
        return Ok(InvocationOutcome::NoTemplateMatch {
            template_name: parameters.template_name,
        });
    };
    debug!(component = COMPONENT, stage = %PipelineStage::Located, template_key = %template.key);

    let content = store
        .read_entry(&config.bucket, &template.key)
        .map_err(|message| PipelineError::Store {
            operation: StoreOperation::Read,
            key: template.key.clone(),
            message,
        })?;
    let rendered = render_document(engine, &template.key, &content, &parameters)?;
    debug!(component = COMPONENT, stage = %PipelineStage::Substituted, bytes = rendered.len());

    persist(store, config, &parameters.target_path, &rendered)?;
    info!(
        component = COMPONENT,
        event = "document_generated",
        stage = %PipelineStage::Done,
        bucket = %config.bucket,
        template_key = %template.key,
        target_path = %parameters.target_path,
        bytes_written = rendered.len()
    );

    Ok(InvocationOutcome::Generated {
        template_key: template.key,
        target_path: parameters.target_path,
        bytes_written: rendered.len(),
    })
}

/// Lists the template folder one level deep and picks the first entry that
/// matches. An absent template name never lists.
pub fn locate_template(
    store: &impl ContentStore,
    config: &Configuration,
    parameters: &ResolvedParameters,
) -> Result<Option<StoreEntry>, PipelineError> {
    let Some(template_name) = parameters.template_name.as_deref() else {
        return Ok(None);
    };

    let entries = store
        .list_entries(&config.bucket, &config.template_folder, LISTING_DELIMITER)
        .map_err(|message| PipelineError::Store {
            operation: StoreOperation::List,
            key: config.template_folder.clone(),
            message,
        })?;

    Ok(select_template(
        entries,
        |entry| entry.key.as_str(),
        template_name,
        &config.template_folder,
    ))
}

pub fn render_document<E: DocumentEngine>(
    engine: &E,
    template_key: &str,
    content: &[u8],
    parameters: &ResolvedParameters,
) -> Result<Vec<u8>, PipelineError> {
    let failed = |step: DocumentStep| {
        move |message: String| PipelineError::Document {
            step,
            template_key: template_key.to_string(),
            message,
        }
    };

    let mut document = engine
        .load_document(content)
        .map_err(failed(DocumentStep::Load))?;
    engine
        .prepare(&mut document)
        .map_err(failed(DocumentStep::Prepare))?;
    engine
        .substitute(&mut document, &parameters.substitutions)
        .map_err(failed(DocumentStep::Substitute))?;
    engine
        .serialize(document)
        .map_err(failed(DocumentStep::Serialize))
}

pub fn persist(
    store: &impl ContentStore,
    config: &Configuration,
    target_path: &str,
    body: &[u8],
) -> Result<(), PipelineError> {
    store
        .write_entry(&config.bucket, target_path, body, config.write_policy)
        .map_err(|message| PipelineError::Store {
            operation: StoreOperation::Write,
            key: target_path.to_string(),
            message,
        })?;
    debug!(component = COMPONENT, stage = %PipelineStage::Persisted, target_path);
    Ok(())
}
