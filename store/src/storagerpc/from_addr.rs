use std::sync::Arc;
use url::Url;

use super::{GRPCStorageRpc, MemoryStorage, StorageRpc};
use crate::proto::storage_service_client::StorageServiceClient;
use crate::Error;

/// Constructs a new instance of a [StorageRpc] from an URI.
///
/// The following schemes are supported by the following services:
/// - `memory://` ([MemoryStorage])
/// - `grpc+*://` ([GRPCStorageRpc])
pub async fn from_addr(uri: &str) -> Result<Arc<dyn StorageRpc>, Error> {
    let url = Url::parse(uri)
        .map_err(|e| Error::StorageError(format!("unable to parse url: {}", e)))?;

    Ok(if url.scheme() == "memory" {
        // memory doesn't support host or path in the URL.
        if url.has_host() || !url.path().is_empty() {
            return Err(Error::StorageError("invalid url".to_string()));
        }
        Arc::new(MemoryStorage::default())
    } else if url.scheme().starts_with("grpc+") {
        // schemes starting with grpc+ go to the GRPCStorageRpc.
        //   That's normally grpc+unix for unix sockets, and grpc+http(s) for the HTTP counterparts.
        // - In the case of unix sockets, there must be a path, but may not be a host.
        // - In the case of non-unix sockets, there must be a host, but no path.
        let client = StorageServiceClient::new(crate::tonic::channel_from_url(&url).await?);
        Arc::new(GRPCStorageRpc::from_client(client))
    } else {
        Err(Error::StorageError(format!(
            "unknown scheme: {}",
            url.scheme()
        )))?
    })
}
