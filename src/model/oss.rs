use std::{fmt, sync::Arc};

use time::OffsetDateTime;

/// Receives transfer progress as a fraction in `0.0..=1.0`.
pub type FractionFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Receives transfer progress as a percentage in `0.0..=100.0`.
pub type PercentFn = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<OffsetDateTime>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
}

#[derive(Clone, Default)]
pub struct PutRequest {
    pub headers: Vec<(String, String)>,
    pub progress: Option<FractionFn>,
}

impl PutRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutRequest")
            .field("headers", &self.headers)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOutput {
    pub url: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadOutput {
    pub status: u16,
    pub size: i64,
    pub etag: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub max_keys: i32,
    pub delimiter: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyRequest {
    pub source_bucket: Option<String>,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyOutput {
    pub etag: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignMethod {
    #[default]
    Get,
    Put,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignRequest {
    pub expires_secs: u64,
    pub method: SignMethod,
    pub content_type: Option<String>,
}
