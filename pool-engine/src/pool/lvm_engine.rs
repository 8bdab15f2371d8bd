use api::{KernelLvm, KernelLvol, LvLayout};
use async_trait::async_trait;
use parking_lot::Mutex;
use snafu::ResultExt;
use std::collections::HashSet;

use super::engine::{
    Capacity,
    CreateSnapshotRequest,
    CreateVolumeRequest,
    CreateVolumeResponse,
    Error,
    ExpandVolumeRequest,
    LvmSnafu,
    PoolEngine,
    StaticInfo,
    VolumeInfo,
};
use crate::{
    config::Pooling,
    lvm::{LogicalVolume, LvmOps},
};

/// Name prefix of reserved logical volumes. Reserved volumes are excluded
/// from allocatable capacity but still count towards the total.
pub const RESERVED_LVOL_PREFIX: &str = "reserved-";

/// Pool engine over a kernel LVM volume group.
pub struct LvmPoolEngine<L: LvmOps> {
    vg_name: String,
    is_thin: bool,
    thin_pool_name: String,
    overprovision_ratio: f64,
    /// Last probed VG metadata, refreshed by pool_info.
    vg_cache: Mutex<KernelLvm>,
    lvm: L,
}

/// Result of a single scan over all LVs in the pool: whether the target
/// exists, its record, and whether any linear LV lives in the pool (the
/// layout-default heuristic for new volumes and snapshots).
struct LvProbe {
    target: Option<LogicalVolume>,
    has_linear_lv: bool,
}

impl<L: LvmOps> LvmPoolEngine<L> {
    pub fn new(pooling: &Pooling, lvm: L) -> Self {
        Self {
            vg_name: pooling.name.clone(),
            is_thin: pooling.is_thin,
            thin_pool_name: pooling.thin_pool_name.clone(),
            overprovision_ratio: pooling.ratio(),
            vg_cache: Mutex::new(KernelLvm::default()),
            lvm,
        }
    }

    /// Scan the LVs in the pool once, looking for the given name.
    async fn probe(&self, lv_name: &str) -> Result<LvProbe, Error> {
        let lvs =
            self.lvm.list_lvs(&self.vg_name).await.context(LvmSnafu)?;

        let mut probe = LvProbe {
            target: None,
            has_linear_lv: false,
        };
        for lv in lvs {
            if lv.lv_layout() == LvLayout::Linear {
                probe.has_linear_lv = true;
            }
            if probe.target.is_none() && lv.name == lv_name {
                probe.target = Some(lv);
            }
        }
        Ok(probe)
    }

    /// Reserved volume discovery. The lvs command on some nodes outputs
    /// duplicated lvol rows, so entries are de-duplicated by name.
    async fn reserved_lvols(&self) -> Result<Vec<KernelLvol>, Error> {
        let lvs =
            self.lvm.list_lvs(&self.vg_name).await.context(LvmSnafu)?;

        let mut seen = HashSet::new();
        let mut reserved = vec![];
        for lv in lvs {
            if lv.name.starts_with(RESERVED_LVOL_PREFIX)
                && seen.insert(lv.name.clone())
            {
                info!("Found reserved lvol: {:?}", lv);
                reserved.push(KernelLvol {
                    name: lv.name.clone(),
                    vg_name: lv.vg_name.clone(),
                    dev_path: lv.dev_path.clone(),
                    size_byte: lv.size,
                    lv_layout: lv.lv_layout(),
                });
            }
        }
        Ok(reserved)
    }

    /// The cached VG metadata, refreshed from the backend when still empty.
    async fn cached_vg(&self) -> Result<KernelLvm, Error> {
        if self.vg_cache.lock().name.is_empty() {
            self.pool_info(&self.vg_name).await?;
        }
        Ok(self.vg_cache.lock().clone())
    }

    fn dev_path(&self, lv_name: &str) -> String {
        format!("/dev/{}/{}", self.vg_name, lv_name)
    }

    async fn allocate(
        &self,
        name: &str,
        size_byte: u64,
        layout: LvLayout,
    ) -> Result<(), Error> {
        let probe = self.probe(name).await?;

        let mut layout = match layout {
            LvLayout::Unspecified => {
                // historical compatibility: once a pool holds any linear
                // volume, new volumes stay linear
                if probe.has_linear_lv {
                    LvLayout::Linear
                } else {
                    LvLayout::Striped
                }
            }
            other => other,
        };
        if self.is_thin {
            layout = LvLayout::ThinPool;
        }

        if let Some(existing) = probe.target {
            info!("LV {} already exists", name);
            if existing.size != size_byte {
                return Err(Error::SizeMismatch {
                    name: name.to_string(),
                    actual: existing.size,
                    requested: size_byte,
                });
            }
            return Ok(());
        }

        match layout {
            LvLayout::Linear => {
                info!("create linear lv {} {}", name, size_byte);
                self.lvm
                    .create_linear_lv(&self.vg_name, name, size_byte)
                    .await
                    .context(LvmSnafu)?;
            }
            LvLayout::Striped => {
                // the stripe width is the PV count, so the volume size must
                // be a multiple of pv_count * extent_size; round it down
                let vg = self.cached_vg().await?;
                let mut size = size_byte;
                if vg.pv_count > 0 {
                    let unit = u64::from(vg.pv_count) * vg.extent_size;
                    if unit > 0 {
                        size = (size / unit) * unit;
                    }
                }
                info!("create striped lv {} {}", name, size);
                self.lvm
                    .create_striped_lv(
                        &self.vg_name,
                        name,
                        size,
                        vg.pv_count.max(1),
                    )
                    .await
                    .context(LvmSnafu)?;
            }
            LvLayout::ThinPool => {
                self.lvm
                    .create_thin_lv(
                        &self.vg_name,
                        &self.thin_pool_name,
                        name,
                        size_byte,
                    )
                    .await
                    .context(LvmSnafu)?;
            }
            other => {
                return Err(Error::UnknownLayout {
                    layout: other.to_string(),
                });
            }
        }

        info!("Created LV {} size {}", name, size_byte);
        Ok(())
    }
}

#[async_trait]
impl<L: LvmOps> PoolEngine for LvmPoolEngine<L> {
    async fn pool_info(&self, name: &str) -> Result<StaticInfo, Error> {
        let vgs = self.lvm.list_vgs().await.context(LvmSnafu)?;
        let vg = vgs.into_iter().find(|vg| vg.name == name).ok_or(
            Error::PoolNotFound {
                pool: name.to_string(),
            },
        )?;

        info!(
            "found VG {} as StoragePool. TotalSpace: {}, FreeSpace: {}",
            vg.name, vg.size, vg.free
        );
        let lvm = KernelLvm {
            name: vg.name,
            vg_uuid: vg.uuid,
            bytes: vg.size,
            pv_count: vg.pv_count,
            extent_size: vg.extent_size,
            extent_count: vg.extent_count,
            reserved_lvol: self.reserved_lvols().await?,
        };
        *self.vg_cache.lock() = lvm.clone();

        Ok(StaticInfo {
            lvm: Some(lvm),
            lvs: None,
        })
    }

    async fn total_and_free_size(&self) -> Result<Capacity, Error> {
        let vgs = self.lvm.list_vgs().await.context(LvmSnafu)?;
        let vg = vgs
            .into_iter()
            .find(|vg| vg.name == self.vg_name)
            .ok_or(Error::PoolNotFound {
                pool: self.vg_name.clone(),
            })?;

        let mut capacity = Capacity {
            total: vg.size,
            free: vg.free,
            virtual_free: vg.free,
            ..Default::default()
        };

        if self.is_thin {
            let probe = self.probe(&self.thin_pool_name).await?;
            if let Some(thin_pool) = probe.target {
                let used_rate = thin_pool.data_used_rate();
                capacity.total = thin_pool.size;
                capacity.data_used_pct = used_rate;
                capacity.metadata_used_pct = thin_pool.metadata_used_rate();
                capacity.free =
                    (capacity.total as f64 * (1.0 - used_rate)) as u64;

                let lvs = self
                    .lvm
                    .list_lvs(&self.vg_name)
                    .await
                    .context(LvmSnafu)?;
                let committed: u64 = lvs
                    .iter()
                    .filter(|lv| lv.lv_layout() == LvLayout::ThinSparse)
                    .map(|lv| lv.size)
                    .sum();

                // clamp with signed arithmetic so overcommit exhaustion can
                // never wrap around
                let virtual_free = capacity.total as f64
                    * self.overprovision_ratio
                    - committed as f64;
                capacity.virtual_free = virtual_free.max(0.0) as u64;
            }
        }

        Ok(capacity)
    }

    async fn create_volume(
        &self,
        request: CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse, Error> {
        info!("creating lvm vol {:?}", request);
        self.allocate(&request.name, request.size_byte, request.layout)
            .await?;

        Ok(CreateVolumeResponse {
            dev_path: self.dev_path(&request.name),
            ..Default::default()
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), Error> {
        info!("Removing LV {}", name);
        let probe = self.probe(name).await?;

        if probe.target.is_some() {
            self.lvm
                .remove_lv(&self.vg_name, name)
                .await
                .context(LvmSnafu)?;
        } else {
            info!("Vol {} not exists, consider removing successfully", name);
        }
        Ok(())
    }

    async fn get_volume(
        &self,
        name: &str,
    ) -> Result<Option<VolumeInfo>, Error> {
        let probe = self.probe(name).await?;
        Ok(probe.target.map(|lv| {
            VolumeInfo::Lvm(KernelLvol {
                name: lv.name.clone(),
                vg_name: lv.vg_name.clone(),
                dev_path: lv.dev_path.clone(),
                size_byte: lv.size,
                lv_layout: lv.lv_layout(),
            })
        }))
    }

    async fn create_snapshot(
        &self,
        request: CreateSnapshotRequest,
    ) -> Result<(), Error> {
        info!("creating snapshot of LVM vol {:?}", request);
        let probe = self.probe(&request.snapshot_name).await?;

        if let Some(existing) = probe.target {
            info!("snapshot {} already exists", request.snapshot_name);
            if existing.size != request.size_byte {
                return Err(Error::SizeMismatch {
                    name: request.snapshot_name,
                    actual: existing.size,
                    requested: request.size_byte,
                });
            }
            return Ok(());
        }

        // snapshot layout mirrors the pool's volume layout heuristic
        if probe.has_linear_lv {
            info!(
                "create linear snap {} {}",
                request.snapshot_name, request.size_byte
            );
            self.lvm
                .create_linear_snapshot(
                    &self.vg_name,
                    &request.snapshot_name,
                    &request.origin_name,
                    request.size_byte,
                )
                .await
                .context(LvmSnafu)?;
        } else {
            info!(
                "create striped snap {} {}",
                request.snapshot_name, request.size_byte
            );
            let vg = self.cached_vg().await?;
            self.lvm
                .create_striped_snapshot(
                    &self.vg_name,
                    &request.snapshot_name,
                    &request.origin_name,
                    request.size_byte,
                    vg.pv_count.max(1),
                )
                .await
                .context(LvmSnafu)?;
        }

        info!(
            "created snap {} size {}",
            request.snapshot_name, request.size_byte
        );
        Ok(())
    }

    async fn restore_snapshot(&self, snapshot_name: &str) -> Result<(), Error> {
        info!("restoring snapshot of LVM {}", snapshot_name);

        let probe = self.probe(snapshot_name).await?;
        let snapshot = probe.target.ok_or(Error::VolumeNotFound {
            name: snapshot_name.to_string(),
        })?;

        // a mergeable snapshot always references an origin
        if snapshot.origin.is_empty() {
            return Err(Error::NotASnapshot {
                name: snapshot_name.to_string(),
            });
        }

        let origin_probe = self.probe(&snapshot.origin).await?;
        let origin = origin_probe.target.ok_or(Error::VolumeNotFound {
            name: snapshot.origin.clone(),
        })?;
        if origin.is_open() {
            return Err(Error::OriginOpen {
                snapshot: snapshot_name.to_string(),
                origin: snapshot.origin,
            });
        }

        info!("start merging snap {}", snapshot_name);
        self.lvm
            .merge_snapshot(&self.vg_name, snapshot_name)
            .await
            .context(LvmSnafu)
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
            "expanding Logic Volume of LVM, req: {:?}, allocated: {}",
            request,
            vol.size_byte()
        );
        if vol.size_byte() >= request.target_size {
            return Ok(());
        }

        let delta = request.target_size as i64 - request.origin_size as i64;
        self.lvm
            .resize_lv(&self.vg_name, &request.name, delta)
            .await
            .context(LvmSnafu)
    }
}
