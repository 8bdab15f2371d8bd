//! Typed client for the SPDK JSON-RPC target service.
//!
//! The target runs as an external process and listens on a unix domain
//! socket; every operation here is one `bdev_*` rpc call. The `SpdkOps`
//! trait is the seam the pool engine consumes, with `SpdkRpcClient` as the
//! production implementation.

use async_trait::async_trait;
use jsonrpc::error::RpcCode;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::sync::Arc;

/// Default rpc socket of the SPDK target.
pub const DEFAULT_SOCK: &str = "/var/tmp/spdk.sock";

/// Errors which can be encountered whilst talking to the SPDK target.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{method} rpc failed: {source}"))]
    Rpc {
        method: String,
        source: jsonrpc::error::Error,
    },
    #[snafu(display("Lvol store {name} not found"))]
    LvsNotFound { name: String },
}

/// Metadata of one SPDK logical volume store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LvStoreInfo {
    pub name: String,
    pub uuid: String,
    pub base_bdev: String,
    pub block_size: u64,
    pub cluster_size: u64,
    pub total_data_clusters: u64,
    pub free_clusters: u64,
}

/// A block device as listed by bdev_get_bdevs.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Bdev {
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    pub block_size: u64,
    pub num_blocks: u64,
}

impl Bdev {
    /// Size of the device in bytes.
    pub fn size_byte(&self) -> u64 {
        self.block_size * self.num_blocks
    }
}

#[derive(Debug, Serialize)]
struct GetLvstoresArgs<'a> {
    lvs_name: &'a str,
}

#[derive(Debug, Serialize)]
struct GetBdevsArgs<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateLvolArgs<'a> {
    lvs_name: &'a str,
    lvol_name: &'a str,
    size_in_bytes: u64,
}

#[derive(Debug, Serialize)]
struct DeleteLvolArgs<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct ResizeLvolArgs<'a> {
    name: &'a str,
    size_in_bytes: u64,
}

#[derive(Debug, Serialize)]
struct SnapshotLvolArgs<'a> {
    lvol_name: &'a str,
    snapshot_name: &'a str,
}

#[derive(Debug, Serialize)]
struct SetReadOnlyArgs<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct Version {
    #[allow(dead_code)]
    version: String,
}

/// The SPDK target operations consumed by the pool engine and the pool
/// service health watcher.
#[async_trait]
pub trait SpdkOps: Send + Sync {
    /// Fetch lvstore metadata by name.
    async fn get_lvstore(&self, name: &str) -> Result<LvStoreInfo, Error>;
    /// List bdevs by name. An unknown name yields an empty list, not an
    /// error, so existence probes stay cheap for callers.
    async fn get_bdevs(&self, name: &str) -> Result<Vec<Bdev>, Error>;
    /// Create an lvol and return its uuid.
    async fn create_lvol(
        &self,
        lvs: &str,
        name: &str,
        size_byte: u64,
    ) -> Result<String, Error>;
    async fn delete_lvol(&self, lvs: &str, name: &str) -> Result<(), Error>;
    /// Resize `<lvs>/<lvol>` to the given absolute size.
    async fn resize_lvol(
        &self,
        full_name: &str,
        size_byte: u64,
    ) -> Result<(), Error>;
    /// Snapshot `<lvs>/<lvol>` and return the snapshot uuid.
    async fn snapshot_lvol(
        &self,
        full_name: &str,
        snapshot_name: &str,
    ) -> Result<String, Error>;
    /// Mark `<lvs>/<lvol>` read-only, for exposure to read-only consumers.
    async fn set_lvol_read_only(&self, full_name: &str) -> Result<(), Error>;
    /// Liveness probe against the target.
    async fn is_alive(&self) -> bool;
}

// the pool service shares one client between the engine and the health
// watcher, so Arc'd handles must remain SpdkOps themselves
#[async_trait]
impl<T: SpdkOps + ?Sized> SpdkOps for Arc<T> {
    async fn get_lvstore(&self, name: &str) -> Result<LvStoreInfo, Error> {
        (**self).get_lvstore(name).await
    }

    async fn get_bdevs(&self, name: &str) -> Result<Vec<Bdev>, Error> {
        (**self).get_bdevs(name).await
    }

    async fn create_lvol(
        &self,
        lvs: &str,
        name: &str,
        size_byte: u64,
    ) -> Result<String, Error> {
        (**self).create_lvol(lvs, name, size_byte).await
    }

    async fn delete_lvol(&self, lvs: &str, name: &str) -> Result<(), Error> {
        (**self).delete_lvol(lvs, name).await
    }

    async fn resize_lvol(
        &self,
        full_name: &str,
        size_byte: u64,
    ) -> Result<(), Error> {
        (**self).resize_lvol(full_name, size_byte).await
    }

    async fn snapshot_lvol(
        &self,
        full_name: &str,
        snapshot_name: &str,
    ) -> Result<String, Error> {
        (**self).snapshot_lvol(full_name, snapshot_name).await
    }

    async fn set_lvol_read_only(&self, full_name: &str) -> Result<(), Error> {
        (**self).set_lvol_read_only(full_name).await
    }

    async fn is_alive(&self) -> bool {
        (**self).is_alive().await
    }
}

/// `SpdkOps` over the jsonrpc unix domain socket transport.
#[derive(Debug, Clone)]
pub struct SpdkRpcClient {
    sock: String,
}

impl SpdkRpcClient {
    pub fn new(sock: impl Into<String>) -> Self {
        Self {
            sock: sock.into(),
        }
    }

    pub fn sock(&self) -> &str {
        &self.sock
    }

    async fn call<A, R>(&self, method: &str, args: Option<A>) -> Result<R, Error>
    where
        A: Serialize,
        R: 'static + serde::de::DeserializeOwned + Send,
    {
        jsonrpc::call(&self.sock, method, args).await.map_err(|source| {
            Error::Rpc {
                method: method.to_string(),
                source,
            }
        })
    }
}

impl Default for SpdkRpcClient {
    fn default() -> Self {
        Self::new(DEFAULT_SOCK)
    }
}

#[async_trait]
impl SpdkOps for SpdkRpcClient {
    async fn get_lvstore(&self, name: &str) -> Result<LvStoreInfo, Error> {
        let stores: Vec<LvStoreInfo> = self
            .call(
                "bdev_lvol_get_lvstores",
                Some(GetLvstoresArgs {
                    lvs_name: name,
                }),
            )
            .await?;
        stores.into_iter().next().ok_or(Error::LvsNotFound {
            name: name.to_string(),
        })
    }

    async fn get_bdevs(&self, name: &str) -> Result<Vec<Bdev>, Error> {
        let result: Result<Vec<Bdev>, Error> = self
            .call(
                "bdev_get_bdevs",
                Some(GetBdevsArgs {
                    name,
                }),
            )
            .await;
        match result {
            Ok(bdevs) => Ok(bdevs),
            // the target answers an unknown bdev name with -ENODEV
            Err(error) if is_not_found(&error) => Ok(vec![]),
            Err(error) => Err(error),
        }
    }

    async fn create_lvol(
        &self,
        lvs: &str,
        name: &str,
        size_byte: u64,
    ) -> Result<String, Error> {
        self.call(
            "bdev_lvol_create",
            Some(CreateLvolArgs {
                lvs_name: lvs,
                lvol_name: name,
                size_in_bytes: size_byte,
            }),
        )
        .await
    }

    async fn delete_lvol(&self, lvs: &str, name: &str) -> Result<(), Error> {
        let full = format!("{lvs}/{name}");
        self.call(
            "bdev_lvol_delete",
            Some(DeleteLvolArgs {
                name: &full,
            }),
        )
        .await
    }

    async fn resize_lvol(
        &self,
        full_name: &str,
        size_byte: u64,
    ) -> Result<(), Error> {
        self.call(
            "bdev_lvol_resize",
            Some(ResizeLvolArgs {
                name: full_name,
                size_in_bytes: size_byte,
            }),
        )
        .await
    }

    async fn snapshot_lvol(
        &self,
        full_name: &str,
        snapshot_name: &str,
    ) -> Result<String, Error> {
        self.call(
            "bdev_lvol_snapshot",
            Some(SnapshotLvolArgs {
                lvol_name: full_name,
                snapshot_name,
            }),
        )
        .await
    }

    async fn set_lvol_read_only(&self, full_name: &str) -> Result<(), Error> {
        self.call(
            "bdev_lvol_set_read_only",
            Some(SetReadOnlyArgs {
                name: full_name,
            }),
        )
        .await
    }

    async fn is_alive(&self) -> bool {
        self.call::<(), Version>("spdk_get_version", None).await.is_ok()
    }
}

/// Whether an rpc error means "no such entry" rather than a transport or
/// server failure.
pub fn is_not_found(error: &Error) -> bool {
    match error {
        Error::LvsNotFound {
            ..
        } => true,
        Error::Rpc {
            source, ..
        } => match source {
            jsonrpc::error::Error::RpcError {
                code, msg
            } => {
                *code == RpcCode::NotFound
                    || msg.contains("No such device")
            }
            _ => false,
        },
    }
}
