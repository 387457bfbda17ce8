use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;

use crate::contract::{DocumentRequest, PubSubMessage, SkipReason, WireDocumentRequest};

/// Standard alphabet; encodes with padding, decodes with or without it.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not a valid request document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload decoded to a null request document")]
    NullRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Request(DocumentRequest),
    Skip(SkipReason),
}

/// Turns a transport message into a [`DocumentRequest`].
///
/// Constructed explicitly and passed to the handler; it holds no state
/// beyond the configured base64 alphabet.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    engine: GeneralPurpose,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            engine: PAYLOAD_ENGINE,
        }
    }

    pub fn decode_message(&self, message: &PubSubMessage) -> Result<DecodeOutcome, DecodeError> {
        self.decode(message.data.as_deref())
    }

    /// An absent or blank payload is a soft skip, not an error.
    pub fn decode(&self, data: Option<&str>) -> Result<DecodeOutcome, DecodeError> {
        let Some(data) = data.map(str::trim).filter(|data| !data.is_empty()) else {
            return Ok(DecodeOutcome::Skip(SkipReason::MissingPayload));
        };

        let bytes = self.engine.decode(data)?;
        let text = String::from_utf8(bytes)?;
        let wire: Option<WireDocumentRequest> = serde_json::from_str(&text)?;
        let wire = wire.ok_or(DecodeError::NullRequest)?;

        Ok(match DocumentRequest::from_wire(wire) {
            Some(request) => DecodeOutcome::Request(request),
            None => DecodeOutcome::Skip(SkipReason::MissingAttributes),
        })
    }

    /// Encodes a request document the way the transport expects it.
    pub fn encode(&self, request_json: &str) -> String {
        self.engine.encode(request_json)
    }
}
