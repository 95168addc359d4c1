//! JSON contract shared by the indexer's custom-skill callout and the
//! query-time vectorizer.
//!
//! ```json
//! { "values": [ { "recordId": 0, "data": { "imageUrl": "https://...", "sasToken": "?sv=..." } },
//!               { "recordId": 1, "data": { "text": "green apple" } } ] }
//! ```
//!
//! Responses carry either `data.vector` or `errors[]` per record; the error
//! message is the error code string.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::secret::Secret;
use crate::types::{
    BatchResponse, ImageReference, OutputRecord, Payload, RecordId, RecordResult, TextQuery,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRequest {
    pub values: Vec<SkillInputRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInputRecord {
    #[serde(rename = "recordId")]
    pub record_id: RecordId,
    #[serde(default)]
    pub data: SkillInputData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillInputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SkillInputData {
    /// Pick the payload variant. A record naming both an image and a text,
    /// or neither, cannot be dispatched and fails on its own.
    pub fn into_payload(self) -> Result<Payload, RecordError> {
        match (self.image_url, self.text) {
            (Some(_), Some(_)) => Err(RecordError::invalid_input(
                "record carries both imageUrl and text",
            )),
            (Some(url), None) => Ok(Payload::Image(ImageReference {
                url,
                access_token: self.sas_token.filter(|t| !t.is_empty()),
            })),
            (None, Some(text)) => Ok(Payload::Text(TextQuery { text })),
            (None, None) => Err(RecordError::invalid_input(
                "record carries neither imageUrl nor text",
            )),
        }
    }
}

impl SkillRequest {
    /// Split the wire batch into per-record payloads, keeping undispatchable
    /// records so they can be reported back against their id.
    pub fn into_records(self) -> Vec<(RecordId, Result<Payload, RecordError>)> {
        self.values
            .into_iter()
            .map(|record| (record.record_id, record.data.into_payload()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkillResponse {
    pub values: Vec<SkillOutputRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillOutputRecord {
    #[serde(rename = "recordId")]
    pub record_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SkillOutputData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SkillMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillOutputData {
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillMessage {
    pub message: String,
}

impl From<OutputRecord> for SkillOutputRecord {
    fn from(record: OutputRecord) -> Self {
        match record.result {
            RecordResult::Vector(vector) => SkillOutputRecord {
                record_id: record.record_id,
                data: Some(SkillOutputData { vector }),
                errors: Vec::new(),
            },
            RecordResult::Error(err) => SkillOutputRecord {
                record_id: record.record_id,
                data: None,
                errors: vec![SkillMessage {
                    message: err.code.as_str().to_owned(),
                }],
            },
        }
    }
}

impl From<BatchResponse> for SkillResponse {
    fn from(response: BatchResponse) -> Self {
        SkillResponse {
            values: response.records.into_iter().map(Into::into).collect(),
        }
    }
}
