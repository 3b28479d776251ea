use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use time::OffsetDateTime;
use tokio::sync::Notify;

use crate::{
    adapters::{Connector, ObjectTransport, TransportFuture},
    config::ConnectionSettings,
    model::{
        error::{StorageError, TransportError},
        oss::{
            CopyOutput, CopyRequest, HeadOutput, ListPage, ListRequest, ObjectSummary, PutOutput,
            PutRequest, SignMethod, SignRequest,
        },
    },
    util::object::Provider,
};

const CHUNK_SIZE: usize = 4;

#[derive(Clone, Debug)]
struct MockObject {
    body: Vec<u8>,
    etag: String,
    storage_class: Option<String>,
    last_modified: OffsetDateTime,
}

/// In-memory bucket shared between every transport a `MockConnector` hands out,
/// so its contents outlive re-initialization like a remote service would.
#[derive(Clone, Default)]
pub struct MockBackend {
    objects: Arc<Mutex<BTreeMap<String, MockObject>>>,
    calls: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    fail_with: Arc<Mutex<Option<TransportError>>>,
    puts_in_flight: Arc<AtomicUsize>,
    max_puts_in_flight: Arc<AtomicUsize>,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transport calls performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of transports that have been dropped.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Makes every following call fail with `err` until cleared with `None`.
    pub fn fail_with(&self, err: Option<TransportError>) {
        if let Ok(mut guard) = self.fail_with.lock() {
            *guard = err;
        }
    }

    /// Highest number of puts observed running at the same time.
    pub fn max_puts_in_flight(&self) -> usize {
        self.max_puts_in_flight.load(Ordering::SeqCst)
    }

    /// Parks the next put of `key` until the returned gate is notified.
    pub fn hold(&self, key: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(key.to_string(), gate.clone());
        }
        gate
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), mock_object(body.to_vec(), None));
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn begin(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with.lock() {
            Err(_) => Err(TransportError::new("InternalError", "mock state poisoned")),
            Ok(guard) => match guard.as_ref() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
        }
    }

    fn gate(&self, key: &str) -> Option<Arc<Notify>> {
        self.gates.lock().ok().and_then(|mut gates| gates.remove(key))
    }

    fn objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, MockObject>>, TransportError> {
        self.objects
            .lock()
            .map_err(|_| TransportError::new("InternalError", "mock state poisoned"))
    }
}

struct PutInFlight<'a> {
    backend: &'a MockBackend,
}

impl<'a> PutInFlight<'a> {
    fn enter(backend: &'a MockBackend) -> Self {
        let now = backend.puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        backend.max_puts_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { backend }
    }
}

impl Drop for PutInFlight<'_> {
    fn drop(&mut self) {
        self.backend.puts_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn mock_object(body: Vec<u8>, storage_class: Option<String>) -> MockObject {
    let etag = format!("\"{:08x}-{}\"", checksum(&body), body.len());
    MockObject {
        body,
        etag,
        storage_class,
        last_modified: OffsetDateTime::now_utc(),
    }
}

fn checksum(body: &[u8]) -> u32 {
    body.iter()
        .fold(2166136261u32, |acc, b| (acc ^ *b as u32).wrapping_mul(16777619))
}

pub struct MockConnector {
    pub backend: MockBackend,
}

impl MockConnector {
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ObjectTransport>, StorageError> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            backend: self.backend.clone(),
            settings: settings.clone(),
        }))
    }
}

pub struct MockTransport {
    backend: MockBackend,
    settings: ConnectionSettings,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.backend.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    fn provider(&self) -> Provider {
        self.settings.provider
    }

    fn put_now(
        &self,
        key: &str,
        body: Vec<u8>,
        request: &PutRequest,
    ) -> Result<PutOutput, TransportError> {
        self.backend.begin()?;

        let (forbid_name, forbid_value) = self.provider().forbid_overwrite_header();
        let forbid_overwrite = request.header(forbid_name) == Some(forbid_value);
        let storage_class = request
            .header(&self.provider().storage_class_header())
            .map(str::to_string);

        if let Some(progress) = &request.progress {
            progress(0.0);
            let total = body.len().max(1);
            let mut sent = 0;
            for chunk in body.chunks(CHUNK_SIZE) {
                sent += chunk.len();
                progress(sent as f64 / total as f64);
            }
            if body.is_empty() {
                progress(1.0);
            }
        }

        let mut objects = self.backend.objects()?;
        if forbid_overwrite && objects.contains_key(key) {
            return Err(TransportError::new(
                "FileAlreadyExists",
                format!("the object already exists: {}", key),
            )
            .with_status(409));
        }

        let object = mock_object(body, storage_class);
        let etag = object.etag.clone();
        objects.insert(key.to_string(), object);

        Ok(PutOutput {
            url: self.settings.object_url(key),
            etag: Some(etag),
            version_id: None,
        })
    }

    fn list_now(&self, request: &ListRequest) -> Result<ListPage, TransportError> {
        self.backend.begin()?;

        let prefix = request.prefix.clone().unwrap_or_default();
        let marker = request.marker.clone().unwrap_or_default();
        let delimiter = request.delimiter.clone().filter(|d| !d.is_empty());
        let max_keys = request.max_keys.max(1) as usize;

        let objects = self.backend.objects()?;
        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last = None;

        for (key, object) in objects.range(marker.clone()..) {
            if key.as_str() <= marker.as_str() || !key.starts_with(&prefix) {
                continue;
            }

            let common_prefix = delimiter.as_ref().and_then(|d| {
                key[prefix.len()..]
                    .find(d.as_str())
                    .map(|pos| key[..prefix.len() + pos + d.len()].to_string())
            });

            if let Some(common_prefix) = &common_prefix {
                if page.prefixes.last() == Some(common_prefix) {
                    continue;
                }
                if common_prefix.as_str() <= marker.as_str() {
                    continue;
                }
            }

            if emitted == max_keys {
                page.is_truncated = true;
                break;
            }

            match common_prefix {
                Some(common_prefix) => {
                    last = Some(common_prefix.clone());
                    page.prefixes.push(common_prefix);
                }
                None => {
                    last = Some(key.clone());
                    page.objects.push(ObjectSummary {
                        key: key.clone(),
                        size: object.body.len() as i64,
                        last_modified: Some(object.last_modified),
                        etag: Some(object.etag.clone()),
                        storage_class: object.storage_class.clone(),
                    });
                }
            }
            emitted += 1;
        }

        if page.is_truncated {
            page.next_marker = last;
        }

        Ok(page)
    }
}

impl ObjectTransport for MockTransport {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        request: PutRequest,
    ) -> TransportFuture<'a, PutOutput> {
        Box::pin(async move {
            let _in_flight = PutInFlight::enter(&self.backend);
            if let Some(gate) = self.backend.gate(key) {
                gate.notified().await;
            }
            // a real upload is never a single poll
            tokio::task::yield_now().await;
            self.put_now(key, body, &request)
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> TransportFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.backend.begin()?;
            let objects = self.backend.objects()?;
            objects
                .get(key)
                .map(|object| object.body.clone())
                .ok_or_else(|| TransportError::not_found(key))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.backend.begin()?;
            self.backend.objects()?.remove(key);
            Ok(())
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> TransportFuture<'a, HeadOutput> {
        Box::pin(async move {
            self.backend.begin()?;
            let objects = self.backend.objects()?;
            objects
                .get(key)
                .map(|object| HeadOutput {
                    status: 200,
                    size: object.body.len() as i64,
                    etag: Some(object.etag.clone()),
                })
                .ok_or_else(|| TransportError::not_found(key))
        })
    }

    fn list<'a>(&'a self, request: ListRequest) -> TransportFuture<'a, ListPage> {
        Box::pin(async move { self.list_now(&request) })
    }

    fn copy<'a>(
        &'a self,
        target: &'a str,
        source: &'a str,
        request: CopyRequest,
    ) -> TransportFuture<'a, CopyOutput> {
        Box::pin(async move {
            self.backend.begin()?;

            if let Some(bucket) = request.source_bucket.filter(|b| b != &self.settings.bucket) {
                return Err(TransportError::new(
                    "NoSuchBucket",
                    format!("the specified bucket does not exist: {}", bucket),
                )
                .with_status(404));
            }

            let mut objects = self.backend.objects()?;
            let object = objects
                .get(source)
                .cloned()
                .ok_or_else(|| TransportError::not_found(source))?;
            let copied = mock_object(object.body, object.storage_class);
            let etag = copied.etag.clone();
            objects.insert(target.to_string(), copied);

            Ok(CopyOutput { etag: Some(etag) })
        })
    }

    fn signature_url(&self, key: &str, request: &SignRequest) -> Result<String, TransportError> {
        self.backend.begin()?;

        let method = match request.method {
            SignMethod::Get => "GET",
            SignMethod::Put => "PUT",
        };

        Ok(format!(
            "{}?method={}&expires={}&access-key-id={}",
            self.settings.object_url(key),
            method,
            request.expires_secs,
            self.settings.access_key_id.expose()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn transport(backend: &MockBackend) -> Box<dyn ObjectTransport> {
        let settings = ConnectionSettings {
            provider: Provider::Mock,
            region: "r1".to_string(),
            endpoint: None,
            access_key_id: Secret::new("k"),
            access_key_secret: Secret::new("s"),
            bucket: "b1".to_string(),
            secure: true,
            timeout_ms: 1_000,
        };
        MockConnector::new(backend.clone())
            .connect(&settings)
            .expect("mock connect never fails")
    }

    fn list_request(prefix: &str, marker: &str, max_keys: i32, delimiter: &str) -> ListRequest {
        ListRequest {
            prefix: Some(prefix.to_string()).filter(|s| !s.is_empty()),
            marker: Some(marker.to_string()).filter(|s| !s.is_empty()),
            max_keys,
            delimiter: Some(delimiter.to_string()).filter(|s| !s.is_empty()),
        }
    }

    #[tokio::test]
    async fn test_list_pages() {
        let backend = MockBackend::new();
        for key in ["a/1", "a/2", "a/3", "b/1", "c"] {
            backend.insert(key, b"x");
        }
        let client = transport(&backend);

        let cases = vec![
            (list_request("", "", 10, ""), vec!["a/1", "a/2", "a/3", "b/1", "c"], vec![], None),
            (list_request("a/", "", 2, ""), vec!["a/1", "a/2"], vec![], Some("a/2")),
            (list_request("a/", "a/2", 2, ""), vec!["a/3"], vec![], None),
            (list_request("", "", 10, "/"), vec!["c"], vec!["a/", "b/"], None),
            (list_request("", "", 1, "/"), vec![], vec!["a/"], Some("a/")),
            (list_request("", "a/", 1, "/"), vec![], vec!["b/"], Some("b/")),
        ];

        for (req, keys, prefixes, next_marker) in cases {
            let page = client.list(req.clone()).await.expect("list should succeed");
            let got: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();

            assert_eq!(got, keys, "failed on keys for case: {:?}", req);
            assert_eq!(page.prefixes, prefixes, "failed on prefixes for case: {:?}", req);
            assert_eq!(
                page.next_marker.as_deref(),
                next_marker,
                "failed on next_marker for case: {:?}",
                req
            );
            assert_eq!(page.is_truncated, next_marker.is_some(), "failed for case: {:?}", req);
        }
    }

    #[tokio::test]
    async fn test_forbid_overwrite() {
        let backend = MockBackend::new();
        let client = transport(&backend);
        let request = PutRequest {
            headers: vec![("x-oss-forbid-overwrite".to_string(), "true".to_string())],
            progress: None,
        };

        assert!(client.put("k", b"1".to_vec(), request.clone()).await.is_ok());
        let err = client
            .put("k", b"2".to_vec(), request)
            .await
            .expect_err("second put should be refused");

        assert_eq!(err.code, "FileAlreadyExists");
        assert_eq!(client.get("k").await, Ok(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_failure_injection_and_release() {
        let backend = MockBackend::new();
        let client = transport(&backend);

        backend.fail_with(Some(TransportError::new("AccessDenied", "denied")));
        assert_eq!(client.delete("k").await.map_err(|e| e.code), Err("AccessDenied".to_string()));
        backend.fail_with(None);
        assert!(client.delete("k").await.is_ok());
        assert_eq!(backend.calls(), 2);

        drop(client);
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.releases(), 1);
    }

    #[tokio::test]
    async fn test_puts_in_flight() {
        let backend = MockBackend::new();
        let client = transport(&backend);
        let gate = backend.hold("slow");

        let (slow, fast) = tokio::join!(
            client.put("slow", b"1".to_vec(), PutRequest::default()),
            async {
                let res = client
                    .put("fast", b"2".to_vec(), PutRequest::default())
                    .await;
                assert_eq!(backend.keys(), vec!["fast".to_string()]);
                gate.notify_one();
                res
            },
        );

        assert!(slow.is_ok() && fast.is_ok());
        assert_eq!(backend.max_puts_in_flight(), 2);
        assert_eq!(backend.keys(), vec!["fast".to_string(), "slow".to_string()]);
    }
}
