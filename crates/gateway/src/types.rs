use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RecordError;
use crate::secret::Secret;

/// Caller-assigned record identifier. Indexers send strings, query-time
/// vectorizers frequently send integers; either form is echoed back as it
/// arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Integer(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Integer(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

/// Location of an image in blob storage plus its optional capability token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub url: String,
    pub access_token: Option<Secret>,
}

impl ImageReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<Secret>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Query text for the text-embedding path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    pub text: String,
}

impl TextQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// What a record asks to have embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Image(ImageReference),
    Text(TextQuery),
}

impl Payload {
    pub fn modality(&self) -> Modality {
        match self {
            Payload::Image(_) => Modality::Image,
            Payload::Text(_) => Modality::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Image,
    Text,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Image => "image",
            Modality::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub record_id: RecordId,
    pub payload: Payload,
}

impl InputRecord {
    pub fn image(record_id: impl Into<RecordId>, image: ImageReference) -> Self {
        Self {
            record_id: record_id.into(),
            payload: Payload::Image(image),
        }
    }

    pub fn text(record_id: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            payload: Payload::Text(TextQuery::new(text)),
        }
    }
}

/// Ordered records submitted in one `embed` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub records: Vec<InputRecord>,
}

impl BatchRequest {
    pub fn new(records: Vec<InputRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Exactly one of a vector or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordResult {
    Vector(Vec<f32>),
    Error(RecordError),
}

impl RecordResult {
    pub fn is_vector(&self) -> bool {
        matches!(self, RecordResult::Vector(_))
    }

    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            RecordResult::Vector(v) => Some(v),
            RecordResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RecordError> {
        match self {
            RecordResult::Vector(_) => None,
            RecordResult::Error(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub record_id: RecordId,
    pub result: RecordResult,
}

impl OutputRecord {
    pub fn failed(record_id: RecordId, error: RecordError) -> Self {
        Self {
            record_id,
            result: RecordResult::Error(error),
        }
    }
}

/// Results for every input record. Callers correlate by `record_id`; the
/// gateway happens to emit input order but does not promise it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    pub records: Vec<OutputRecord>,
}

impl BatchResponse {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look a result up by the id the caller assigned.
    pub fn get(&self, record_id: &RecordId) -> Option<&RecordResult> {
        self.records
            .iter()
            .find(|r| &r.record_id == record_id)
            .map(|r| &r.result)
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.result.is_vector()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// Per-record lifecycle inside one `embed` call. Stages only move forward
/// and every record ends in exactly one terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStage {
    Pending,
    Resolving,
    Invoking,
    Succeeded,
    Failed,
}

impl RecordStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStage::Succeeded | RecordStage::Failed)
    }

    /// Whether `next` is a legal successor. Text records skip `Resolving`;
    /// any non-terminal stage may fail.
    pub fn can_advance_to(&self, next: RecordStage) -> bool {
        use RecordStage::*;
        match (self, next) {
            (Pending, Resolving) | (Pending, Invoking) | (Resolving, Invoking) => true,
            (Invoking, Succeeded) => true,
            (Pending | Resolving | Invoking, Failed) => true,
            _ => false,
        }
    }
}
