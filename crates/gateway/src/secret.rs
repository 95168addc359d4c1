//! Opaque credentials.
//!
//! Blob access tokens are time-limited capabilities and provider API keys are
//! long-lived credentials. Neither may show up in logs, error messages or
//! `Debug` output, so both live inside [`Secret`], which only hands out the
//! raw value through an explicit [`Secret::expose`] call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A string that never prints itself.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value. Call sites are limited to building outbound requests.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Strip the query string and fragment from a URL before it is logged.
/// Signed blob URLs carry their token in the query.
pub fn redact_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Redact every URL-looking word in free text, e.g. an upstream error body
/// that echoes the image URL back.
pub fn scrub_urls(text: &str) -> String {
    text.split(' ')
        .map(|word| if word.contains("://") { redact_url(word) } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}
