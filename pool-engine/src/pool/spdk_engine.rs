use api::{SpdkLvStore, SpdkLvol};
use async_trait::async_trait;
use snafu::ResultExt;

use super::engine::{
    Capacity,
    CreateSnapshotRequest,
    CreateVolumeRequest,
    CreateVolumeResponse,
    Error,
    ExpandVolumeRequest,
    PoolEngine,
    SpdkSnafu,
    StaticInfo,
    VolumeInfo,
};
use crate::spdk::SpdkOps;

/// Pool engine over an SPDK logical volume store.
pub struct SpdkLvsPoolEngine<S: SpdkOps> {
    lvs_name: String,
    spdk: S,
}

impl<S: SpdkOps> SpdkLvsPoolEngine<S> {
    pub fn new(lvs_name: impl Into<String>, spdk: S) -> Self {
        Self {
            lvs_name: lvs_name.into(),
            spdk,
        }
    }

    /// Lvols carry their store name: `<lvs>/<lvol>`.
    fn full_name(&self, lvol: &str) -> String {
        format!("{}/{}", self.lvs_name, lvol)
    }

    async fn find_lvol(
        &self,
        name: &str,
    ) -> Result<Option<crate::spdk::Bdev>, Error> {
        let bdevs = self
            .spdk
            .get_bdevs(&self.full_name(name))
            .await
            .context(SpdkSnafu)?;
        Ok(bdevs.into_iter().next())
    }
}

#[async_trait]
impl<S: SpdkOps> PoolEngine for SpdkLvsPoolEngine<S> {
    async fn pool_info(&self, name: &str) -> Result<StaticInfo, Error> {
        let lvs = match self.spdk.get_lvstore(name).await {
            Ok(lvs) => lvs,
            Err(error) if crate::spdk::is_not_found(&error) => {
                return Err(Error::PoolNotFound {
                    pool: name.to_string(),
                });
            }
            Err(error) => return Err(Error::Spdk { source: error }),
        };

        info!(
            "found lvstore {} as StoragePool. clusters: {}/{}",
            lvs.name, lvs.free_clusters, lvs.total_data_clusters
        );
        Ok(StaticInfo {
            lvm: None,
            lvs: Some(SpdkLvStore {
                name: lvs.name,
                uuid: lvs.uuid,
                base_bdev: lvs.base_bdev,
                cluster_size: lvs.cluster_size,
                total_data_cluster: lvs.total_data_clusters,
                block_size: lvs.block_size,
                bytes: lvs.cluster_size * lvs.total_data_clusters,
            }),
        })
    }

    async fn total_and_free_size(&self) -> Result<Capacity, Error> {
        let lvs = match self.spdk.get_lvstore(&self.lvs_name).await {
            Ok(lvs) => lvs,
            Err(error) if crate::spdk::is_not_found(&error) => {
                return Err(Error::PoolNotFound {
                    pool: self.lvs_name.clone(),
                });
            }
            Err(error) => return Err(Error::Spdk { source: error }),
        };

        let free = lvs.cluster_size * lvs.free_clusters;
        Ok(Capacity {
            total: lvs.cluster_size * lvs.total_data_clusters,
            free,
            // no thin accounting on lvstores yet, virtual space tracks
            // physical space
            virtual_free: free,
            ..Default::default()
        })
    }

    async fn create_volume(
        &self,
        request: CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse, Error> {
        info!("creating spdk lvol {:?}", request);

        if let Some(existing) = self.find_lvol(&request.name).await? {
            info!("lvol {} already exists", request.name);
            if existing.size_byte() != request.size_byte {
                return Err(Error::SizeMismatch {
                    name: request.name,
                    actual: existing.size_byte(),
                    requested: request.size_byte,
                });
            }
            return Ok(CreateVolumeResponse {
                uuid: existing.uuid,
                ..Default::default()
            });
        }

        let uuid = self
            .spdk
            .create_lvol(&self.lvs_name, &request.name, request.size_byte)
            .await
            .context(SpdkSnafu)?;
        info!("created lvol {} uuid {}", request.name, uuid);

        Ok(CreateVolumeResponse {
            uuid,
            ..Default::default()
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), Error> {
        info!("Removing lvol {}", name);
        if self.find_lvol(name).await?.is_none() {
            info!("lvol {} not exists, consider removing successfully", name);
            return Ok(());
        }

        self.spdk
            .delete_lvol(&self.lvs_name, name)
            .await
            .context(SpdkSnafu)
    }

    async fn get_volume(
        &self,
        name: &str,
    ) -> Result<Option<VolumeInfo>, Error> {
        Ok(self.find_lvol(name).await?.map(|bdev| {
            let size_byte = bdev.size_byte();
            VolumeInfo::Spdk {
                lvol: SpdkLvol {
                    name: name.to_string(),
                    lvs_name: self.lvs_name.clone(),
                    thin: false,
                },
                size_byte,
            }
        }))
    }

    async fn create_snapshot(
        &self,
        request: CreateSnapshotRequest,
    ) -> Result<(), Error> {
        info!("creating snapshot of spdk lvol {:?}", request);

        if let Some(existing) = self.find_lvol(&request.snapshot_name).await? {
            info!("snapshot {} already exists", request.snapshot_name);
            if existing.size_byte() != request.size_byte {
                return Err(Error::SizeMismatch {
                    name: request.snapshot_name,
                    actual: existing.size_byte(),
                    requested: request.size_byte,
                });
            }
            return Ok(());
        }

        let uuid = self
            .spdk
            .snapshot_lvol(
                &self.full_name(&request.origin_name),
                &request.snapshot_name,
            )
            .await
            .context(SpdkSnafu)?;
        info!("created snapshot {} uuid {}", request.snapshot_name, uuid);
        Ok(())
    }

    async fn restore_snapshot(&self, _snapshot_name: &str) -> Result<(), Error> {
        // lvol snapshots cannot be merged back into their origin
        Err(Error::Unsupported {
            operation: "RestoreSnapshot".to_string(),
        })
    }

    async fn expand_volume(
        &self,
        request: ExpandVolumeRequest,
    ) -> Result<(), Error> {
        let vol = self.get_volume(&request.name).await?.ok_or(
            Error::VolumeNotFound {
                name: request.name.clone(),
            },
        )?;

        info!(
            "expanding spdk lvol, req: {:?}, allocated: {}",
            request,
            vol.size_byte()
        );
        if vol.size_byte() >= request.target_size {
            return Ok(());
        }

        self.spdk
            .resize_lvol(&self.full_name(&request.name), request.target_size)
            .await
            .context(SpdkSnafu)
    }
}
