use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DOCUMENT_EXTENSION: &str = ".docx";
pub const GENERATED_TARGET_PREFIX: &str = "new_file_";
pub const LIST_SEPARATOR: &str = ", ";
pub const TEMPLATE_FILE_ATTRIBUTE: &str = "templateFile";
pub const TARGET_FILE_ATTRIBUTE: &str = "targetFile";
pub const LISTING_DELIMITER: &str = "/";

/// Message delivered by the event transport. `data` carries the base64
/// encoded request document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl PubSubMessage {
    pub fn with_data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            message_id: None,
        }
    }
}

/// Request document as it appears on the wire, before null attributes are
/// dropped and the absent-attributes case is split off.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireDocumentRequest {
    #[serde(default)]
    pub template_file: Option<String>,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, Value>>,
}

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub template_file: Option<String>,
    pub target_file: Option<String>,
    pub attributes: Attributes,
}

impl DocumentRequest {
    /// Returns `None` when the wire request carries no attribute map.
    pub fn from_wire(wire: WireDocumentRequest) -> Option<Self> {
        let attributes = wire
            .attributes?
            .into_iter()
            .filter_map(|(name, value)| AttributeValue::from_json(value).map(|value| (name, value)))
            .collect();

        Some(Self {
            template_file: wire.template_file,
            target_file: wire.target_file,
            attributes,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Converts a JSON attribute value. `null` maps to `None` so that it
    /// behaves exactly like a missing key.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(Self::List(
                items.into_iter().filter_map(scalar_text).collect(),
            )),
            other => scalar_text(other).map(Self::Scalar),
        }
    }

    /// Substitution-ready text: list elements are joined with `", "`.
    pub fn to_substitution(&self) -> String {
        match self {
            Self::Scalar(text) => text.clone(),
            Self::List(items) => items.join(LIST_SEPARATOR),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingPayload,
    MissingAttributes,
}

impl SkipReason {
    pub fn event_name(self) -> &'static str {
        match self {
            Self::MissingPayload => "payload_missing",
            Self::MissingAttributes => "attributes_missing",
        }
    }
}

/// Where a resolved value came from, in fallback priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    RequestField,
    Attribute,
    GeneratedDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameters {
    pub template_name: Option<String>,
    pub template_source: Option<ValueSource>,
    pub target_path: String,
    pub target_source: ValueSource,
    pub substitutions: BTreeMap<String, String>,
}
