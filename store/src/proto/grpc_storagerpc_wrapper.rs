use std::sync::Arc;

use tonic::{async_trait, Request, Response, Status};
use tracing::instrument;

use crate::digests::Md5Digest;
use crate::storagerpc::{ConditionalGet, StorageRpc};

/// Serves any [StorageRpc] implementation over the wire contract.
pub struct GRPCStorageWrapper {
    storage: Arc<dyn StorageRpc>,
}

impl From<Arc<dyn StorageRpc>> for GRPCStorageWrapper {
    fn from(value: Arc<dyn StorageRpc>) -> Self {
        Self { storage: value }
    }
}

#[async_trait]
impl super::storage_service_server::StorageService for GRPCStorageWrapper {
    #[instrument(skip(self))]
    async fn get(
        &self,
        request: Request<super::GetObjectRequest>,
    ) -> Result<Response<super::GetObjectResponse>, Status> {
        let rq = request.into_inner();

        if let (Some(start), Some(end)) = (rq.range_start, rq.range_end) {
            let (meta, body) = self.storage.get_range(&rq.key, start, end).await?;
            return Ok(Response::new(super::GetObjectResponse {
                not_modified: false,
                meta: Some(meta),
                body,
            }));
        }

        if !rq.etag_hint.is_empty() {
            let etag_hint = Md5Digest::try_from(rq.etag_hint)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;

            let resp = match self.storage.get_with_etag(&rq.key, &etag_hint).await? {
                ConditionalGet::NotModified => super::GetObjectResponse {
                    not_modified: true,
                    ..Default::default()
                },
                ConditionalGet::Modified { meta, body } => super::GetObjectResponse {
                    not_modified: false,
                    meta: Some(meta),
                    body,
                },
            };
            return Ok(Response::new(resp));
        }

        let (meta, body) = self.storage.get(&rq.key).await?;
        Ok(Response::new(super::GetObjectResponse {
            not_modified: false,
            meta: Some(meta),
            body,
        }))
    }

    #[instrument(skip(self))]
    async fn head(
        &self,
        request: Request<super::HeadObjectRequest>,
    ) -> Result<Response<super::ObjectMeta>, Status> {
        let rq = request.into_inner();
        let meta = self.storage.head(&rq.key).await?;
        Ok(Response::new(meta))
    }

    #[instrument(skip(self, request))]
    async fn put(
        &self,
        request: Request<super::PutObjectRequest>,
    ) -> Result<Response<super::PutObjectResponse>, Status> {
        let rq = request.into_inner();

        let etag = if rq.total_chunks > 0 {
            let digest = Md5Digest::try_from(rq.digest)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            self.storage
                .put_manifest(&rq.key, rq.size, rq.chunk_size, rq.total_chunks, &digest)
                .await?
        } else {
            self.storage.put(&rq.key, rq.body, rq.size, rq.chunk_index).await?
        };

        Ok(Response::new(super::PutObjectResponse { etag: etag.into() }))
    }

    #[instrument(skip(self))]
    async fn delete(
        &self,
        request: Request<super::DeleteObjectRequest>,
    ) -> Result<Response<super::DeleteObjectResponse>, Status> {
        let rq = request.into_inner();
        self.storage.delete(&rq.key).await?;
        Ok(Response::new(super::DeleteObjectResponse {}))
    }
}
