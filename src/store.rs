use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use tracing::{error, info, instrument, span, Level};

use crate::{
    adapters::{Connector, ObjectTransport},
    config::{ConfigPatch, OssConfig, SecretProvider},
    model::{
        error::StorageError,
        oss::{CopyRequest, ListRequest, SignMethod, SignRequest},
        outcome::{Copied, Deleted, Download, Failure, Listing, Outcome, SignedUrl, UploadReceipt},
    },
    util::headers::{build_put_request, UploadOptions},
};

pub const DEFAULT_MAX_KEYS: i32 = 100;
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    /// Pagination cursor, the `next_marker` of the previous page.
    pub marker: Option<String>,
    pub max_keys: Option<i32>,
    pub delimiter: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyOptions {
    pub source_bucket: Option<String>,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignOptions {
    pub method: SignMethod,
    pub content_type: Option<String>,
}

/// Snapshot of the store status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientState {
    pub ready: bool,
    pub busy_upload: bool,
    pub busy_download: bool,
    pub last_error: Option<StorageError>,
    pub last_operation: Option<String>,
}

fn not_initialized<T>() -> Outcome<T> {
    Outcome::Failure(Failure::new(StorageError::NotInitialized.to_string()))
}

/// Counts a transfer as in flight until dropped.
struct BusyGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> BusyGuard<'a> {
    fn raise(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Object storage façade owning a single transport client.
///
/// Lifecycle changes (`initialize`, `teardown`) take `&mut self`, so they can
/// never overlap with an operation in flight. Operations take `&self` and may
/// run concurrently; with `exclusive_transfers` set, uploads and downloads are
/// each limited to one in flight.
pub struct OssStore {
    connector: Box<dyn Connector>,
    secrets: Box<dyn SecretProvider>,
    config: OssConfig,
    client: Option<Box<dyn ObjectTransport>>,
    ready: bool,
    uploading: AtomicUsize,
    downloading: AtomicUsize,
    upload_lock: tokio::sync::Mutex<()>,
    download_lock: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<StorageError>>,
    last_operation: Mutex<Option<String>>,
}

impl OssStore {
    pub fn new(connector: Box<dyn Connector>, secrets: Box<dyn SecretProvider>) -> Self {
        Self {
            connector,
            secrets,
            config: OssConfig::default(),
            client: None,
            ready: false,
            uploading: AtomicUsize::new(0),
            downloading: AtomicUsize::new(0),
            upload_lock: tokio::sync::Mutex::new(()),
            download_lock: tokio::sync::Mutex::new(()),
            last_error: Mutex::new(None),
            last_operation: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OssConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        ClientState {
            ready: self.ready,
            busy_upload: self.uploading.load(Ordering::SeqCst) > 0,
            busy_download: self.downloading.load(Ordering::SeqCst) > 0,
            last_error: self.last_error(),
            last_operation: self
                .last_operation
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default(),
        }
    }

    pub fn last_error(&self) -> Option<StorageError> {
        self.last_error
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn set_last_error(&self, err: Option<StorageError>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = err;
        }
    }

    fn set_last_operation(&self, operation: String) {
        if let Ok(mut guard) = self.last_operation.lock() {
            *guard = Some(operation);
        }
    }

    /// Merges `patch` into the configuration and connects a new transport.
    pub fn initialize(&mut self, patch: ConfigPatch) -> bool {
        let span = span!(Level::INFO, "initialize", context = "initialize");
        let _e = span.enter();
        info!("called");

        if let Some(previous) = self.client.take() {
            info!("releasing previous client");
            drop(previous);
        }
        self.ready = false;

        self.config.merge(patch);

        let res = self
            .config
            .resolve(self.secrets.as_ref())
            .and_then(|settings| self.connector.connect(&settings));

        match res {
            Err(err) => {
                error!(error_message=%err, error_group="initialize");
                self.set_last_error(Some(err));
                false
            }
            Ok(client) => {
                self.client = Some(client);
                self.ready = true;
                self.set_last_error(None);
                info!(
                    provider=?self.config.provider,
                    region=%self.config.region,
                    bucket=%self.config.bucket,
                    "client initialized"
                );
                true
            }
        }
    }

    pub fn ensure_ready(&self) -> bool {
        if self.client.is_none() || !self.ready {
            error!(
                error_message = "client not initialized",
                error_group = "not_initialized"
            );
            return false;
        }
        true
    }

    pub fn teardown(&mut self) {
        let span = span!(Level::INFO, "teardown", context = "teardown");
        let _e = span.enter();
        info!("called");

        self.client = None;
        self.ready = false;
        self.uploading.store(0, Ordering::SeqCst);
        self.downloading.store(0, Ordering::SeqCst);
        self.set_last_error(None);
        if let Ok(mut guard) = self.last_operation.lock() {
            *guard = None;
        }
    }

    fn client(&self) -> Option<&dyn ObjectTransport> {
        if !self.ensure_ready() {
            return None;
        }
        self.client.as_deref()
    }

    fn fail(&self, err: StorageError, group: &str) -> String {
        error!(error_message=%err, error_group=group);
        let message = err.user_message();
        self.set_last_error(Some(err));
        message
    }

    #[instrument(skip_all, fields(context = "upload", path = %path))]
    pub async fn upload(
        &self,
        path: &str,
        payload: Vec<u8>,
        options: UploadOptions,
    ) -> Outcome<UploadReceipt> {
        info!(path = path, size = payload.len(), "called");

        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };

        let _token = if self.config.exclusive_transfers {
            Some(self.upload_lock.lock().await)
        } else {
            None
        };
        let _busy = BusyGuard::raise(&self.uploading);
        self.set_last_operation(format!("upload: {}", path));

        let request = build_put_request(self.config.provider, &options);
        match client.put(path, payload, request).await {
            Err(err) => {
                let message = self.fail(err.into(), "put_object");
                Outcome::Failure(Failure::at(message, path))
            }
            Ok(po) => {
                info!(path = path, "uploaded");
                self.set_last_error(None);
                Outcome::Success(UploadReceipt {
                    url: po.url,
                    name: path.to_string(),
                    etag: po.etag,
                    version_id: po.version_id,
                })
            }
        }
    }

    #[instrument(skip_all, fields(context = "download", path = %path))]
    pub async fn download(&self, path: &str, destination: Option<&Path>) -> Outcome<Download> {
        info!(path = path, destination = ?destination, "called");

        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };

        let _token = if self.config.exclusive_transfers {
            Some(self.download_lock.lock().await)
        } else {
            None
        };
        let _busy = BusyGuard::raise(&self.downloading);
        self.set_last_operation(format!("download: {}", path));

        let content = match client.get(path).await {
            Err(err) => {
                let message = self.fail(err.into(), "get_object");
                return Outcome::Failure(Failure::at(message, path));
            }
            Ok(content) => content,
        };

        if let Some(destination) = destination {
            if let Err(err) = tokio::fs::write(destination, &content).await {
                let err = StorageError::Io {
                    path: destination.display().to_string(),
                    message: err.to_string(),
                };
                let message = self.fail(err, "write_destination");
                return Outcome::Failure(Failure::at(message, path));
            }
        }

        info!(path = path, size = content.len(), "downloaded");
        self.set_last_error(None);
        Outcome::Success(Download {
            content,
            path: path.to_string(),
            destination: destination.map(PathBuf::from),
        })
    }

    #[instrument(skip_all, fields(context = "delete_object", path = %path))]
    pub async fn delete_object(&self, path: &str) -> Outcome<Deleted> {
        info!(path = path, "called");

        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };
        self.set_last_operation(format!("delete: {}", path));

        match client.delete(path).await {
            Err(err) => {
                let message = self.fail(err.into(), "delete_object");
                Outcome::Failure(Failure::at(message, path))
            }
            Ok(()) => {
                self.set_last_error(None);
                Outcome::Success(Deleted {
                    path: path.to_string(),
                })
            }
        }
    }

    /// `false` both for missing objects and for failed checks; only the latter
    /// records `last_error`.
    #[instrument(skip_all, fields(context = "exists", path = %path))]
    pub async fn exists(&self, path: &str) -> bool {
        info!(path = path, "called");

        let client = match self.client() {
            None => return false,
            Some(client) => client,
        };

        match client.head(path).await {
            Err(err) if err.not_found => false,
            Err(err) => {
                self.fail(err.into(), "head_object");
                false
            }
            Ok(ho) => ho.status == 200,
        }
    }

    #[instrument(skip_all, fields(context = "list_objects"))]
    pub async fn list_objects(&self, options: ListOptions) -> Outcome<Listing> {
        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };
        self.set_last_operation("list".to_string());

        let request = ListRequest {
            prefix: options.prefix.filter(|s| !s.is_empty()),
            marker: options.marker.filter(|s| !s.is_empty()),
            max_keys: options.max_keys.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_KEYS),
            delimiter: options.delimiter.filter(|s| !s.is_empty()),
        };
        info!(request = ?request, "called");

        match client.list(request.clone()).await {
            Err(err) => {
                let message = self.fail(err.into(), "list_objects");
                let mut failure = Failure::new(message);
                failure.path = request.prefix;
                Outcome::Failure(failure)
            }
            Ok(page) => {
                self.set_last_error(None);
                Outcome::Success(Listing {
                    files: page.objects,
                    prefixes: page.prefixes,
                    next_marker: page.next_marker,
                    is_truncated: page.is_truncated,
                })
            }
        }
    }

    #[instrument(skip_all, fields(context = "copy_object", source = %source, target = %target))]
    pub async fn copy_object(
        &self,
        source: &str,
        target: &str,
        options: CopyOptions,
    ) -> Outcome<Copied> {
        info!(source = source, target = target, "called");

        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };
        self.set_last_operation(format!("copy: {} -> {}", source, target));

        let request = CopyRequest {
            source_bucket: options.source_bucket,
            headers: options.headers,
        };

        match client.copy(target, source, request).await {
            Err(err) => {
                let message = self.fail(err.into(), "copy_object");
                Outcome::Failure(Failure {
                    error: message,
                    path: Some(source.to_string()),
                    target: Some(target.to_string()),
                })
            }
            Ok(co) => {
                self.set_last_error(None);
                Outcome::Success(Copied {
                    source: source.to_string(),
                    target: target.to_string(),
                    etag: co.etag,
                })
            }
        }
    }

    pub fn get_signed_url(
        &self,
        path: &str,
        expires: Duration,
        options: SignOptions,
    ) -> Outcome<SignedUrl> {
        let span = span!(Level::INFO, "get_signed_url", context = "get_signed_url");
        let _e = span.enter();
        info!(path = path, expires_secs = expires.as_secs(), "called");

        let client = match self.client() {
            None => return not_initialized(),
            Some(client) => client,
        };

        let request = SignRequest {
            expires_secs: expires.as_secs(),
            method: options.method,
            content_type: options.content_type,
        };

        match client.signature_url(path, &request) {
            Err(err) => {
                let message = self.fail(err.into(), "signature_url");
                Outcome::Failure(Failure::at(message, path))
            }
            Ok(url) => Outcome::Success(SignedUrl {
                url,
                expires_secs: request.expires_secs,
            }),
        }
    }
}
