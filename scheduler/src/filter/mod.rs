//! The filter predicate chain. Each predicate judges one aspect of a
//! candidate node against the cycle's volume demands and answers with a
//! rejection reason code; the chain runs every configured predicate and
//! merges the rejections.

use crate::state::Node;
use api::PoolMode;
use std::collections::HashMap;

mod error;

pub use error::{
    is_no_storage_pool_available,
    MergedError,
    NO_STORAGE_POOL_AVAILABLE,
    REASON_DATA_CONFLICT,
    REASON_NODE_AFFINITY,
    REASON_POOL_FREE_SIZE,
    REASON_POOL_UNSCHEDULABLE,
    REASON_POSITION_NOT_MATCH,
    REASON_REMOTE_VOL_MAX_COUNT,
    REASON_RESERVATION_TOO_SMALL,
    REASON_SPDK_UNHEALTHY,
    REASON_THIN_PROVISION,
};

/// One volume the pod needs allocated, distilled from its claim and the
/// claim's storage class.
#[derive(Debug, Default, Clone)]
pub struct VolumeDemand {
    pub name: String,
    pub size_byte: u64,
    pub is_thin: bool,
    /// Volume and pod must share a node.
    pub must_local: bool,
    /// Extra bytes reserved for future snapshots.
    pub snapshot_reserved_size: u64,
    /// Node the volume already lives on, for bound claims.
    pub required_node: Option<String>,
    /// Node labels the volume requires.
    pub node_affinity: HashMap<String, String>,
    /// Volumes this one must not share a pool with.
    pub conflict_volumes: Vec<String>,
    /// Pod and claim annotations in our namespace, carried onto the
    /// provisioned volume.
    pub annotations: HashMap<String, String>,
}

/// Everything one filter pass judges: the demands and the candidate node.
pub struct FilterContext<'a> {
    pub demands: &'a [VolumeDemand],
    pub node: &'a Node,
    pub max_remote_volume_count: u32,
}

impl FilterContext<'_> {
    /// Only must-be-local volumes gate the candidate node's capacity; the
    /// others may land on any pool in the cluster later.
    fn must_local(&self) -> impl Iterator<Item = &VolumeDemand> {
        self.demands.iter().filter(|demand| demand.must_local)
    }

    fn thick_demand(&self) -> i64 {
        self.must_local()
            .filter(|demand| !demand.is_thin)
            .map(|demand| demand.size_byte as i64)
            .sum()
    }

    fn thin_demand(&self) -> i64 {
        self.must_local()
            .filter(|demand| demand.is_thin)
            .map(|demand| demand.size_byte as i64)
            .sum()
    }

    fn reserved_demand(&self) -> i64 {
        self.must_local()
            .map(|demand| demand.snapshot_reserved_size as i64)
            .sum()
    }
}

type Predicate = fn(&FilterContext) -> Result<(), &'static str>;

fn pool_unschedulable(ctx: &FilterContext) -> Result<(), &'static str> {
    if !ctx.node.pool.is_schedulable() {
        return Err(REASON_POOL_UNSCHEDULABLE);
    }
    Ok(())
}

fn pool_free_size(ctx: &FilterContext) -> Result<(), &'static str> {
    if ctx.thick_demand() > ctx.node.pool.free_bytes() {
        return Err(REASON_POOL_FREE_SIZE);
    }
    Ok(())
}

/// Thin volumes consume the overcommit budget rather than physical space.
fn thin_provision(ctx: &FilterContext) -> Result<(), &'static str> {
    if ctx.thin_demand() > ctx.node.pool.vg_virtual_free_bytes() {
        return Err(REASON_THIN_PROVISION);
    }
    Ok(())
}

fn spdk_health(ctx: &FilterContext) -> Result<(), &'static str> {
    if ctx.node.pool.mode() == PoolMode::SpdkLvStore && !ctx.node.spdk_healthy
    {
        return Err(REASON_SPDK_UNHEALTHY);
    }
    Ok(())
}

/// A node serving too many remote volumes takes no new allocations; its
/// target bandwidth is already spoken for.
fn remote_volume_count(ctx: &FilterContext) -> Result<(), &'static str> {
    if ctx.node.remote_volume_count >= ctx.max_remote_volume_count {
        return Err(REASON_REMOTE_VOL_MAX_COUNT);
    }
    Ok(())
}

fn position(ctx: &FilterContext) -> Result<(), &'static str> {
    // only must-be-local volumes pin the pod to their node
    for demand in ctx.must_local() {
        if let Some(required) = &demand.required_node {
            if required != &ctx.node.info.name {
                return Err(REASON_POSITION_NOT_MATCH);
            }
        }
    }
    Ok(())
}

fn affinity(ctx: &FilterContext) -> Result<(), &'static str> {
    for demand in ctx.demands {
        for (key, value) in &demand.node_affinity {
            if ctx.node.info.labels.get(key) != Some(value) {
                return Err(REASON_NODE_AFFINITY);
            }
        }
    }
    Ok(())
}

fn data_conflict(ctx: &FilterContext) -> Result<(), &'static str> {
    for demand in ctx.demands {
        for conflict in &demand.conflict_volumes {
            if ctx.node.hosted_volumes.contains(conflict) {
                return Err(REASON_DATA_CONFLICT);
            }
        }
    }
    Ok(())
}

/// The snapshot reservation must fit next to the volumes themselves.
fn reservation_size(ctx: &FilterContext) -> Result<(), &'static str> {
    let reserved = ctx.reserved_demand();
    if reserved > 0
        && ctx.thick_demand() + reserved > ctx.node.pool.free_bytes()
    {
        return Err(REASON_RESERVATION_TOO_SMALL);
    }
    Ok(())
}

const ALL_PREDICATES: &[(&str, Predicate)] = &[
    ("PoolUnschedulable", pool_unschedulable),
    ("Position", position),
    ("Affinity", affinity),
    ("DataConflict", data_conflict),
    ("SpdkHealth", spdk_health),
    ("RemoteVolumeCount", remote_volume_count),
    ("PoolFreeSize", pool_free_size),
    ("ThinProvision", thin_provision),
    ("ReservationSize", reservation_size),
];

/// An ordered, configurable selection of predicates.
pub struct FilterChain {
    predicates: Vec<(&'static str, Predicate)>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self {
            predicates: ALL_PREDICATES.to_vec(),
        }
    }
}

impl FilterChain {
    /// Build a chain from predicate names, keeping the canonical order.
    /// Unknown names are ignored with a warning; an empty selection means
    /// the full chain.
    pub fn named(names: &[String]) -> Self {
        if names.is_empty() {
            return Self::default();
        }
        for name in names {
            if !ALL_PREDICATES.iter().any(|(known, _)| known == name) {
                warn!("unknown filter predicate {name}, ignoring");
            }
        }
        Self {
            predicates: ALL_PREDICATES
                .iter()
                .filter(|(name, _)| names.iter().any(|n| n == name))
                .copied()
                .collect(),
        }
    }

    /// Run every predicate, merging all rejections rather than stopping at
    /// the first, so the final failure message names every shortfall.
    pub fn match_all(&self, ctx: &FilterContext) -> Result<(), MergedError> {
        let merged = MergedError::default();
        for (name, predicate) in &self.predicates {
            if let Err(reason) = predicate(ctx) {
                debug!(
                    "node {} rejected by {}: {}",
                    ctx.node.info.name, name, reason
                );
                merged.add_reason(reason);
            }
        }
        if merged.is_empty() {
            Ok(())
        } else {
            Err(merged)
        }
    }
}
