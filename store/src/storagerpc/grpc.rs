use std::future::Future;
use std::time::Duration;

use bstr::ByteSlice;
use bytes::Bytes;
use tonic::transport::Channel;
use tonic::{async_trait, Status};
use tracing::instrument;

use super::{ConditionalGet, StorageRpc};
use crate::digests::Md5Digest;
use crate::proto::{self, ObjectMeta};
use crate::Error;

/// Default bound on a single call into the cluster.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to a (remote) storage cluster over gRPC.
#[derive(Clone)]
pub struct GRPCStorageRpc {
    /// The internal reference to a gRPC client.
    /// Cloning it is cheap, and it internally handles concurrent requests.
    grpc_client: proto::storage_service_client::StorageServiceClient<Channel>,

    timeout: Duration,
}

impl GRPCStorageRpc {
    /// construct a [GRPCStorageRpc] from a [proto::storage_service_client::StorageServiceClient].
    pub fn from_client(
        grpc_client: proto::storage_service_client::StorageServiceClient<Channel>,
    ) -> Self {
        Self {
            grpc_client,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds a client call by the configured timeout; an elapsed timer
    /// surfaces as [Error::Timeout].
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<tonic::Response<T>, Status>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(resp)) => Ok(resp.into_inner()),
            Ok(Err(status)) => Err(status.into()),
            Err(_) => Err(Error::Timeout),
        }
    }
}

fn decode_meta(meta: Option<ObjectMeta>) -> Result<ObjectMeta, Error> {
    meta.ok_or_else(|| Error::StorageError("response without metadata".to_string()))
}

fn decode_etag(etag: Bytes) -> Result<Md5Digest, Error> {
    let len = etag.len();
    Md5Digest::try_from(etag)
        .map_err(|_| Error::StorageError(format!("invalid etag length {} in response", len)))
}

#[async_trait]
impl StorageRpc for GRPCStorageRpc {
    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn get(&self, key: &[u8]) -> Result<(ObjectMeta, Bytes), Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::GetObjectRequest {
            key: Bytes::copy_from_slice(key),
            ..Default::default()
        };

        let resp = self.call(async move { grpc_client.get(request).await }).await?;
        Ok((decode_meta(resp.meta)?, resp.body))
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn get_with_etag(
        &self,
        key: &[u8],
        etag_hint: &Md5Digest,
    ) -> Result<ConditionalGet, Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::GetObjectRequest {
            key: Bytes::copy_from_slice(key),
            etag_hint: etag_hint.clone().into(),
            ..Default::default()
        };

        let resp = self.call(async move { grpc_client.get(request).await }).await?;
        if resp.not_modified {
            Ok(ConditionalGet::NotModified)
        } else {
            Ok(ConditionalGet::Modified {
                meta: decode_meta(resp.meta)?,
                body: resp.body,
            })
        }
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), range.start=start, range.end=end))]
    async fn get_range(
        &self,
        key: &[u8],
        start: u64,
        end: u64,
    ) -> Result<(ObjectMeta, Bytes), Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::GetObjectRequest {
            key: Bytes::copy_from_slice(key),
            range_start: Some(start),
            range_end: Some(end),
            ..Default::default()
        };

        let resp = self.call(async move { grpc_client.get(request).await }).await?;
        Ok((decode_meta(resp.meta)?, resp.body))
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn head(&self, key: &[u8]) -> Result<ObjectMeta, Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::HeadObjectRequest {
            key: Bytes::copy_from_slice(key),
        };

        self.call(async move { grpc_client.head(request).await }).await
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), chunk.index=chunk_index))]
    async fn put(
        &self,
        key: &[u8],
        body: Bytes,
        size: u64,
        chunk_index: u64,
    ) -> Result<Md5Digest, Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::PutObjectRequest {
            key: Bytes::copy_from_slice(key),
            body,
            size,
            chunk_index,
            ..Default::default()
        };

        let resp = self.call(async move { grpc_client.put(request).await }).await?;
        decode_etag(resp.etag)
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr(), chunk.total=total_chunks))]
    async fn put_manifest(
        &self,
        key: &[u8],
        total_size: u64,
        chunk_size: u64,
        total_chunks: u64,
        digest: &Md5Digest,
    ) -> Result<Md5Digest, Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::PutObjectRequest {
            key: Bytes::copy_from_slice(key),
            size: total_size,
            chunk_size,
            total_chunks,
            digest: digest.clone().into(),
            ..Default::default()
        };

        let resp = self.call(async move { grpc_client.put(request).await }).await?;
        decode_etag(resp.etag)
    }

    #[instrument(skip_all, err, fields(object.key=%key.as_bstr()))]
    async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let mut grpc_client = self.grpc_client.clone();
        let request = proto::DeleteObjectRequest {
            key: Bytes::copy_from_slice(key),
        };

        self.call(async move { grpc_client.delete(request).await })
            .await?;
        Ok(())
    }
}
