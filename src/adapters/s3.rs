use std::time::Duration;

use aws_sdk_s3::{
    config::{timeout::TimeoutConfig, BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    adapters::{Connector, ObjectTransport, TransportFuture},
    config::ConnectionSettings,
    model::{
        error::{StorageError, TransportError, NOT_FOUND_CODE},
        oss::{
            CopyOutput, CopyRequest, HeadOutput, ListPage, ListRequest, ObjectSummary, PutOutput,
            PutRequest, SignMethod, SignRequest,
        },
    },
    util::{
        self,
        object::{encode_key, Provider},
    },
};

const PRESIGN_MAX_POLLS: usize = 1_000;

pub struct S3Connector;

impl Connector for S3Connector {
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ObjectTransport>, StorageError> {
        Ok(Box::new(S3Transport::new(settings)))
    }
}

pub struct S3Transport {
    client: aws_sdk_s3::Client,
    settings: ConnectionSettings,
}

impl S3Transport {
    pub fn new(settings: &ConnectionSettings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.expose(),
            settings.access_key_secret.expose(),
            None,
            None,
            "ossctl",
        );

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_millis(settings.timeout_ms))
            .build();

        let region = match settings.provider {
            Provider::GCS => "auto".to_string(),
            _ => settings.region.clone(),
        };

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .timeout_config(timeouts);

        if let Some(endpoint) = settings.endpoint_url() {
            builder = builder.endpoint_url(endpoint);
        }
        // custom endpoints rarely have wildcard DNS for virtual-hosted buckets
        if settings.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            settings: settings.clone(),
        }
    }

    fn bucket(&self) -> &str {
        &self.settings.bucket
    }
}

fn transport_error<E>(operation: &str, key: &str, err: SdkError<E>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    let code = err
        .as_service_error()
        .and_then(|svc| svc.code())
        .map(str::to_string)
        .unwrap_or_else(|| match status {
            Some(404) => NOT_FOUND_CODE.to_string(),
            Some(code) => format!("Http{}", code),
            None => "RequestFailure".to_string(),
        });
    let message = err
        .as_service_error()
        .and_then(|svc| svc.message())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!("failed to {}: {}, {}", operation, key, DisplayErrorContext(&err))
        });
    let not_found = status == Some(404) || code == NOT_FOUND_CODE || code == "NotFound";

    TransportError {
        code,
        message,
        status,
        not_found,
    }
}

fn to_offset_date_time(dt: &aws_sdk_s3::primitives::DateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(dt.secs())
        .ok()
        .map(|t| t.replace_nanosecond(dt.subsec_nanos()).unwrap_or(t))
}

impl ObjectTransport for S3Transport {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        request: PutRequest,
    ) -> TransportFuture<'a, PutOutput> {
        Box::pin(async move {
            if let Some(progress) = &request.progress {
                progress(0.0);
            }

            let headers = request.headers.clone();
            let po = self
                .client
                .put_object()
                .bucket(self.bucket())
                .key(key)
                .body(ByteStream::from(body))
                .customize()
                .mutate_request(move |req| {
                    for (name, value) in &headers {
                        let res = req.headers_mut().try_insert(name.clone(), value.clone());
                        if let Err(err) = res {
                            warn!(error_message=%err, header=%name, "skipped header");
                        }
                    }
                })
                .send()
                .await
                .map_err(|err| transport_error("put_object", key, err))?;

            if let Some(progress) = &request.progress {
                progress(1.0);
            }

            Ok(PutOutput {
                url: self.settings.object_url(key),
                etag: po.e_tag().map(str::to_string),
                version_id: po.version_id().map(str::to_string),
            })
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> TransportFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let o = self
                .client
                .get_object()
                .bucket(self.bucket())
                .key(key)
                .send()
                .await
                .map_err(|err| transport_error("get_object", key, err))?;

            let bytes = o.body.collect().await.map_err(|err| {
                TransportError::new(
                    "BodyReadFailure",
                    format!("failed to collect body: {}, {}", key, err),
                )
            })?;

            Ok(bytes.into_bytes().to_vec())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_object()
                .bucket(self.bucket())
                .key(key)
                .send()
                .await
                .map_err(|err| transport_error("delete_object", key, err))?;

            Ok(())
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> TransportFuture<'a, HeadOutput> {
        Box::pin(async move {
            let ho = self
                .client
                .head_object()
                .bucket(self.bucket())
                .key(key)
                .send()
                .await
                .map_err(|err| {
                    let not_found = err
                        .as_service_error()
                        .map(|svc| svc.is_not_found())
                        .unwrap_or(false);
                    let mut err = transport_error("head_object", key, err);
                    if not_found {
                        err.code = NOT_FOUND_CODE.to_string();
                        err.not_found = true;
                    }
                    err
                })?;

            Ok(HeadOutput {
                status: 200,
                size: ho.content_length().unwrap_or(0),
                etag: ho.e_tag().map(str::to_string),
            })
        })
    }

    fn list<'a>(&'a self, request: ListRequest) -> TransportFuture<'a, ListPage> {
        Box::pin(async move {
            let mut req = self
                .client
                .list_objects()
                .bucket(self.bucket())
                .max_keys(request.max_keys);

            if let Some(prefix) = &request.prefix {
                req = req.prefix(prefix);
            }
            if let Some(marker) = &request.marker {
                req = req.marker(marker);
            }
            if let Some(delimiter) = &request.delimiter {
                req = req.delimiter(delimiter);
            }

            let prefix = request.prefix.clone().unwrap_or_default();
            let lo = req
                .send()
                .await
                .map_err(|err| transport_error("list_objects", &prefix, err))?;

            let objects: Vec<ObjectSummary> = lo
                .contents()
                .iter()
                .map(|o| ObjectSummary {
                    key: o.key().unwrap_or("").to_string(),
                    size: o.size().unwrap_or(0),
                    last_modified: o.last_modified().and_then(to_offset_date_time),
                    etag: o.e_tag().map(str::to_string),
                    storage_class: o.storage_class().map(|sc| sc.as_str().to_string()),
                })
                .collect();

            let prefixes: Vec<String> = lo
                .common_prefixes()
                .iter()
                .filter_map(|cp| cp.prefix().map(str::to_string))
                .collect();

            let is_truncated = lo.is_truncated().unwrap_or(false);

            // NextMarker is only returned when a delimiter is set
            let next_marker = lo.next_marker().map(str::to_string).or_else(|| {
                if !is_truncated {
                    return None;
                }
                let last_key = objects.last().map(|o| o.key.clone());
                let last_prefix = prefixes.last().cloned();
                last_key.max(last_prefix)
            });

            Ok(ListPage {
                objects,
                prefixes,
                next_marker,
                is_truncated,
            })
        })
    }

    fn copy<'a>(
        &'a self,
        target: &'a str,
        source: &'a str,
        request: CopyRequest,
    ) -> TransportFuture<'a, CopyOutput> {
        Box::pin(async move {
            let source_bucket = request
                .source_bucket
                .clone()
                .unwrap_or_else(|| self.bucket().to_string());
            let headers = request.headers.clone();

            let co = self
                .client
                .copy_object()
                .bucket(self.bucket())
                .key(target)
                .copy_source(format!("{}/{}", source_bucket, encode_key(source)))
                .customize()
                .mutate_request(move |req| {
                    for (name, value) in &headers {
                        let res = req.headers_mut().try_insert(name.clone(), value.clone());
                        if let Err(err) = res {
                            warn!(error_message=%err, header=%name, "skipped header");
                        }
                    }
                })
                .send()
                .await
                .map_err(|err| transport_error("copy_object", source, err))?;

            Ok(CopyOutput {
                etag: co
                    .copy_object_result()
                    .and_then(|r| r.e_tag())
                    .map(str::to_string),
            })
        })
    }

    fn signature_url(&self, key: &str, request: &SignRequest) -> Result<String, TransportError> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(request.expires_secs))
            .map_err(|err| TransportError::new("InvalidArgument", err.to_string()))?;

        let presigned = match request.method {
            SignMethod::Get => util::poll::resolve_local(
                self.client
                    .get_object()
                    .bucket(self.bucket())
                    .key(key)
                    .presigned(presigning),
                PRESIGN_MAX_POLLS,
            )
            .map(|res| res.map_err(|err| transport_error("presign_get", key, err))),
            SignMethod::Put => {
                let mut req = self.client.put_object().bucket(self.bucket()).key(key);
                if let Some(content_type) = &request.content_type {
                    req = req.content_type(content_type);
                }
                util::poll::resolve_local(req.presigned(presigning), PRESIGN_MAX_POLLS)
                    .map(|res| res.map_err(|err| transport_error("presign_put", key, err)))
            }
        };

        match presigned {
            None => Err(TransportError::new(
                "PresignTimeout",
                format!("presigning did not complete: {}", key),
            )),
            Some(res) => Ok(res?.uri().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn settings(provider: Provider, endpoint: Option<&str>) -> ConnectionSettings {
        ConnectionSettings {
            provider,
            region: "us-east-1".to_string(),
            endpoint: endpoint.map(str::to_string),
            access_key_id: Secret::new("AKIDEXAMPLE"),
            access_key_secret: Secret::new("secret"),
            bucket: "b1".to_string(),
            secure: true,
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_to_offset_date_time() {
        let dt = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        let converted = to_offset_date_time(&dt).expect("valid timestamp");
        assert_eq!(converted.unix_timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_presigned_get_url() {
        let transport = S3Transport::new(&settings(Provider::AWS, Some("http://localhost:9000")));
        let request = SignRequest {
            expires_secs: 600,
            method: SignMethod::Get,
            content_type: None,
        };

        let url = transport
            .signature_url("a/b.txt", &request)
            .expect("presigning with static credentials should succeed");

        assert!(url.starts_with("http://localhost:9000/b1/a/b.txt?"), "unexpected url: {}", url);
        assert!(url.contains("X-Amz-Expires=600"), "unexpected url: {}", url);
        assert!(url.contains("AKIDEXAMPLE"), "unexpected url: {}", url);
    }

    #[test]
    fn test_presign_rejects_long_expiry() {
        let transport = S3Transport::new(&settings(Provider::AWS, None));
        let request = SignRequest {
            expires_secs: 60 * 60 * 24 * 30,
            method: SignMethod::Get,
            content_type: None,
        };

        let err = transport
            .signature_url("a", &request)
            .expect_err("expiry above one week is invalid");
        assert_eq!(err.code, "InvalidArgument");
    }
}
