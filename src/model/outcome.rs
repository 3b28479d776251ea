use std::path::PathBuf;

use crate::model::oss::ObjectSummary;

/// Result envelope returned by every store operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub error: String,
    pub path: Option<String>,
    pub target: Option<String>,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            path: None,
            target: None,
        }
    }

    pub fn at(error: impl Into<String>, path: &str) -> Self {
        Self {
            error: error.into(),
            path: Some(path.to_string()),
            target: None,
        }
    }
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: String,
    pub name: String,
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub content: Vec<u8>,
    pub path: String,
    pub destination: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deleted {
    pub path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<ObjectSummary>,
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Copied {
    pub source: String,
    pub target: String,
    pub etag: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let ok: Outcome<Deleted> = Outcome::Success(Deleted {
            path: "a".to_string(),
        });
        assert!(ok.is_success());
        assert_eq!(ok.success().map(|d| d.path.as_str()), Some("a"));
        assert!(ok.failure().is_none());

        let failed: Outcome<Deleted> = Outcome::Failure(Failure::at("boom", "a"));
        assert!(!failed.is_success());
        assert!(failed.success().is_none());
        assert_eq!(
            failed.into_result(),
            Err(Failure {
                error: "boom".to_string(),
                path: Some("a".to_string()),
                target: None,
            })
        );
    }
}
