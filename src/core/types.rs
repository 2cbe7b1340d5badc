//! # Core Types
//!
//! Payloads exchanged with the origin document API.
//!
//! The proxy treats documents as opaque as far as caching goes: cache tiers
//! store the raw response bytes and only the gateway decodes them into these
//! types. Decoding is lenient about the shapes different origin builds emit
//! (numeric or string ids, bare arrays or envelope objects for listings,
//! timestamps with or without an offset).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{ProxyError, ProxyResult};

/// Largest page size the proxy forwards
pub const MAX_PER_PAGE: u32 = 100;

/// A document as returned by the origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub content: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,

    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default, deserialize_with = "lenient_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    pub content: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DocumentDraft {
    pub fn new<T: Into<String>, C: Into<String>>(title: T, content: C) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            content: content.into(),
            keywords: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn validate(&self) -> ProxyResult<()> {
        if self.title.trim().is_empty() {
            return Err(ProxyError::invalid_request("title", "must not be empty"));
        }
        Ok(())
    }
}

/// Body of an update call; fields left as `None` are not sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.content.is_none()
            && self.keywords.is_none()
            && self.metadata.is_none()
    }
}

/// Page selection for listing and search calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

impl Pagination {
    /// Build a validated pagination
    pub fn new(page: u32, per_page: u32) -> ProxyResult<Self> {
        let pagination = Self { page, per_page };
        pagination.validate()?;
        Ok(pagination)
    }

    pub fn validate(&self) -> ProxyResult<()> {
        if self.page == 0 {
            return Err(ProxyError::invalid_request("page", "must be at least 1"));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ProxyError::invalid_request(
                "per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }
        Ok(())
    }
}

/// Which document field a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Keyword,
    Title,
    Subtitle,
}

impl SearchField {
    /// Origin path serving this search
    pub fn path(&self) -> &'static str {
        match self {
            Self::Keyword => "/search/keywords",
            Self::Title => "/search/title",
            Self::Subtitle => "/search/subtitle",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Title => "title",
            Self::Subtitle => "subtitle",
        }
    }
}

/// One page of documents from a listing or search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody {
    Bare(Vec<Document>),
    Envelope {
        #[serde(default)]
        documents: Vec<Document>,
        #[serde(default)]
        total: Option<usize>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        per_page: Option<u32>,
    },
}

impl DocumentPage {
    /// Decode a listing payload, filling pagination the origin left out
    pub fn decode(bytes: &[u8], requested: Pagination) -> ProxyResult<Self> {
        let page = match serde_json::from_slice::<PageBody>(bytes)? {
            PageBody::Envelope { documents, total, page, per_page } => Self {
                total: total.unwrap_or(documents.len()),
                page: page.unwrap_or(requested.page),
                per_page: per_page.unwrap_or(requested.per_page),
                documents,
            },
            PageBody::Bare(documents) => Self {
                total: documents.len(),
                page: requested.page,
                per_page: requested.per_page,
                documents,
            },
        };
        Ok(page)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {}",
            other
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
    }
}
