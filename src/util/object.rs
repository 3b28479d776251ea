use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::model::error::StorageError;

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const KEY_PATH: &AsciiSet = &URI_COMPONENT.remove(b'/');

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    OSS,
    AWS,
    GCS,
    Mock,
}

impl Provider {
    pub fn is_mock(&self) -> bool {
        matches!(self, Provider::Mock)
    }

    /// Prefix of the vendor specific request headers.
    pub fn header_prefix(&self) -> &'static str {
        match self {
            Provider::OSS | Provider::Mock => "x-oss-",
            Provider::AWS => "x-amz-",
            Provider::GCS => "x-goog-",
        }
    }

    pub fn default_storage_class(&self) -> &'static str {
        match self {
            Provider::OSS | Provider::Mock => "Standard",
            Provider::AWS | Provider::GCS => "STANDARD",
        }
    }

    pub fn acl_header(&self) -> String {
        match self {
            Provider::OSS | Provider::Mock => format!("{}object-acl", self.header_prefix()),
            Provider::AWS | Provider::GCS => format!("{}acl", self.header_prefix()),
        }
    }

    pub fn storage_class_header(&self) -> String {
        format!("{}storage-class", self.header_prefix())
    }

    pub fn tagging_header(&self) -> String {
        format!("{}tagging", self.header_prefix())
    }

    /// Conditional header that makes a put fail when the key already exists.
    pub fn forbid_overwrite_header(&self) -> (&'static str, &'static str) {
        match self {
            Provider::OSS | Provider::Mock => ("x-oss-forbid-overwrite", "true"),
            Provider::AWS => ("If-None-Match", "*"),
            Provider::GCS => ("x-goog-if-generation-match", "0"),
        }
    }

    /// Endpoint used when none is configured. `None` lets the SDK resolve it.
    pub fn default_endpoint(&self, region: &str, secure: bool) -> Option<String> {
        let scheme = if secure { "https" } else { "http" };
        match self {
            Provider::OSS => Some(format!("{}://{}.aliyuncs.com", scheme, oss_region(region))),
            Provider::GCS => Some(format!("{}://storage.googleapis.com", scheme)),
            Provider::AWS => None,
            Provider::Mock => Some(format!("mock://{}", region)),
        }
    }

    /// Public URL of `key`, virtual-hosted unless a custom endpoint forces path style.
    pub fn object_url(
        &self,
        endpoint: Option<&str>,
        region: &str,
        bucket: &str,
        key: &str,
        secure: bool,
    ) -> String {
        let scheme = if secure { "https" } else { "http" };
        let key = encode_key(key);
        match (self, endpoint) {
            (Provider::OSS, None) => {
                format!("{}://{}.{}.aliyuncs.com/{}", scheme, bucket, oss_region(region), key)
            }
            (Provider::AWS, None) => {
                format!("{}://{}.s3.{}.amazonaws.com/{}", scheme, bucket, region, key)
            }
            (Provider::GCS, None) => {
                format!("{}://storage.googleapis.com/{}/{}", scheme, bucket, key)
            }
            (Provider::Mock, None) => format!("mock://{}/{}", bucket, key),
            (_, Some(endpoint)) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
            }
        }
    }
}

pub fn oss_region(region: &str) -> String {
    if region.starts_with("oss-") {
        region.to_string()
    } else {
        format!("oss-{}", region)
    }
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, StorageError> {
    return if bucket_uri.starts_with("oss://") {
        Ok(Provider::OSS)
    } else if bucket_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if bucket_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else if bucket_uri.starts_with("mock://") {
        Ok(Provider::Mock)
    } else {
        Err(StorageError::Configuration(format!(
            "failed to parse provider of: {}",
            bucket_uri
        )))
    };
}

pub fn parse_bucket_from_uri(bucket_uri: &str) -> &str {
    bucket_uri
        .split_once("://")
        .map(|(_, rest)| rest.trim_end_matches('/'))
        .unwrap_or("")
}

/// Same output as javascript's `encodeURIComponent`.
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_PATH).to_string()
}
