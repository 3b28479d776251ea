use std::{future::Future, pin::Pin};

use crate::{
    config::ConnectionSettings,
    model::{
        error::{StorageError, TransportError},
        oss::{
            CopyOutput, CopyRequest, HeadOutput, ListPage, ListRequest, PutOutput, PutRequest,
            SignRequest,
        },
    },
};

pub mod mock;
pub mod s3;

pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Client performing the actual calls against the object storage service.
pub trait ObjectTransport: Send + Sync {
    fn put<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        request: PutRequest,
    ) -> TransportFuture<'a, PutOutput>;

    fn get<'a>(&'a self, key: &'a str) -> TransportFuture<'a, Vec<u8>>;

    fn delete<'a>(&'a self, key: &'a str) -> TransportFuture<'a, ()>;

    fn head<'a>(&'a self, key: &'a str) -> TransportFuture<'a, HeadOutput>;

    fn list<'a>(&'a self, request: ListRequest) -> TransportFuture<'a, ListPage>;

    fn copy<'a>(
        &'a self,
        target: &'a str,
        source: &'a str,
        request: CopyRequest,
    ) -> TransportFuture<'a, CopyOutput>;

    fn signature_url(&self, key: &str, request: &SignRequest) -> Result<String, TransportError>;
}

/// Builds a transport client for validated settings.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn ObjectTransport>, StorageError>;
}
