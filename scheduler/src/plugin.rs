//! The scheduler plugin itself: PreFilter resolves the pod's claims into
//! volume demands once, Filter judges every candidate node against them.

use crate::{
    cluster::{Pod, PvcLister, StorageClass, StorageClassLister},
    cycle::CycleData,
    filter::{FilterChain, FilterContext, VolumeDemand},
    state::ClusterState,
};
use api::ANNOTATION_PREFIX;
use std::sync::Arc;

/// Pod annotation naming node labels the pod's volumes require, as
/// `key=value` pairs separated by commas.
pub const ANNOTATION_NODE_AFFINITY: &str = "local.storage/node-affinity";
/// Pod annotation naming volumes the pod's volumes must not share a pool
/// with, separated by commas.
pub const ANNOTATION_CONFLICT_VOLUMES: &str = "local.storage/conflict-volumes";

/// Outcome of one plugin phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The node cannot take the pod this cycle.
    Unschedulable(String),
    /// The node can never take the pod, retries are pointless.
    UnschedulableAndUnresolvable(String),
    /// Infrastructure failure while judging, not a placement verdict.
    Error(String),
}

impl Status {
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Names of the filter predicates to run; empty means all of them.
    pub filters: Vec<String>,
    /// Remote volumes one node may serve before it stops taking new pods.
    pub max_remote_volume_count: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            filters: vec![],
            max_remote_volume_count: 3,
        }
    }
}

pub struct SchedulerPlugin {
    pvcs: Arc<dyn PvcLister>,
    classes: Arc<dyn StorageClassLister>,
    state: Arc<ClusterState>,
    chain: FilterChain,
    config: SchedulerConfig,
}

impl SchedulerPlugin {
    pub fn new(
        pvcs: Arc<dyn PvcLister>,
        classes: Arc<dyn StorageClassLister>,
        state: Arc<ClusterState>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pvcs,
            classes,
            state,
            chain: FilterChain::named(&config.filters),
            config,
        }
    }

    /// Resolve the pod's claims into volume demands, once per cycle. Pods
    /// mounting none of our volumes mark the cycle skipped and pass every
    /// node untouched.
    pub fn pre_filter(&self, pod: &Pod) -> (CycleData, Status) {
        let cycle = CycleData::default();
        let mut demands = vec![];

        for claim_name in &pod.claim_names {
            let claim = match self.pvcs.get(&pod.namespace, claim_name) {
                Ok(claim) => claim,
                Err(error) => return (cycle, Status::Error(error.to_string())),
            };
            let class = match self.classes.get(&claim.storage_class) {
                Ok(class) => class,
                Err(error) => return (cycle, Status::Error(error.to_string())),
            };
            if !class.is_local_storage() {
                continue;
            }
            demands.push(self.demand_of(pod, &claim, &class));
        }

        if demands.is_empty() {
            debug!(
                "pod {}/{} mounts no local storage volumes, skipping",
                pod.namespace, pod.name
            );
            cycle.set_skip();
            return (cycle, Status::Success);
        }

        info!(
            "pod {}/{} demands {} volume(s)",
            pod.namespace,
            pod.name,
            demands.len()
        );
        cycle.set_demands(demands);
        (cycle, Status::Success)
    }

    fn demand_of(
        &self,
        pod: &Pod,
        claim: &crate::cluster::PersistentVolumeClaim,
        class: &StorageClass,
    ) -> VolumeDemand {
        let mut demand = VolumeDemand {
            name: claim.name.clone(),
            size_byte: claim.request_bytes,
            is_thin: class.is_thin(),
            must_local: class.is_must_local(),
            snapshot_reserved_size: claim.snapshot_reserved_size(),
            required_node: claim.bound_node.clone(),
            ..Default::default()
        };

        // every annotation in our namespace rides along to the provisioned
        // volume; claim annotations override the pod's
        for annotations in [&pod.annotations, &claim.annotations] {
            for (key, value) in annotations {
                if key.starts_with(ANNOTATION_PREFIX) {
                    demand
                        .annotations
                        .insert(key.clone(), value.clone());
                }
            }
        }

        if let Some(value) = demand.annotations.get(ANNOTATION_NODE_AFFINITY) {
            demand.node_affinity = value
                .split(',')
                .filter_map(|pair| {
                    pair.split_once('=').map(|(key, value)| {
                        (key.trim().to_string(), value.trim().to_string())
                    })
                })
                .collect();
        }
        if let Some(value) = demand.annotations.get(ANNOTATION_CONFLICT_VOLUMES)
        {
            demand.conflict_volumes = value
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
        demand
    }

    /// Judge one candidate node against the cycle's demands.
    pub fn filter(&self, cycle: &CycleData, pod: &Pod, node_name: &str) -> Status {
        if cycle.is_skip() {
            return Status::Success;
        }

        let node = match self.state.get(node_name) {
            Some(node) => node,
            None => {
                return Status::UnschedulableAndUnresolvable(format!(
                    "node {node_name} has no storage pool"
                ));
            }
        };

        let demands = cycle.demands();
        let ctx = FilterContext {
            demands: &demands,
            node: &node,
            max_remote_volume_count: self.config.max_remote_volume_count,
        };
        match self.chain.match_all(&ctx) {
            Ok(()) => Status::Success,
            Err(merged) => {
                debug!(
                    "pod {}/{} does not fit node {}: {}",
                    pod.namespace, pod.name, node_name, merged
                );
                Status::Unschedulable(merged.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::{
            InMemoryPvcs,
            InMemoryStorageClasses,
            PersistentVolumeClaim,
            StorageClass,
        },
        filter::NO_STORAGE_POOL_AVAILABLE,
        state::{Node, NodeInfo},
    };
    use api::{
        KernelLvm,
        PoolStatus,
        StoragePool,
        StoragePoolSpec,
        StoragePoolStatus,
        PROVISIONER_NAME,
    };

    const GIB: u64 = 1024 * 1024 * 1024;

    struct Fixture {
        pvcs: Arc<InMemoryPvcs>,
        classes: Arc<InMemoryStorageClasses>,
        state: Arc<ClusterState>,
        plugin: SchedulerPlugin,
    }

    fn fixture() -> Fixture {
        let pvcs = Arc::new(InMemoryPvcs::default());
        let classes = Arc::new(InMemoryStorageClasses::default());
        let state = Arc::new(ClusterState::default());
        classes.insert(StorageClass {
            name: "local".into(),
            provisioner: PROVISIONER_NAME.into(),
            parameters: [(
                api::SC_PARAM_POSITION_ADVICE.to_string(),
                api::POSITION_ADVICE_MUST_LOCAL.to_string(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        });
        // ours, but placeable on any pool in the cluster
        classes.insert(StorageClass {
            name: "local-any".into(),
            provisioner: PROVISIONER_NAME.into(),
            ..Default::default()
        });
        classes.insert(StorageClass {
            name: "foreign".into(),
            provisioner: "kubernetes.io/no-provisioner".into(),
            ..Default::default()
        });
        let plugin = SchedulerPlugin::new(
            pvcs.clone(),
            classes.clone(),
            state.clone(),
            SchedulerConfig::default(),
        );
        Fixture {
            pvcs,
            classes,
            state,
            plugin,
        }
    }

    fn claim(name: &str, class: &str, size: u64) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            name: name.into(),
            namespace: "default".into(),
            storage_class: class.into(),
            request_bytes: size,
            ..Default::default()
        }
    }

    fn pod(claims: &[&str]) -> Pod {
        Pod {
            name: "pod-1".into(),
            namespace: "default".into(),
            claim_names: claims.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn node(name: &str, free: u64) -> Node {
        Node {
            info: NodeInfo {
                name: name.into(),
                ..Default::default()
            },
            pool: StoragePool {
                name: name.into(),
                overprovision_ratio: 1.0,
                spec: StoragePoolSpec {
                    kernel_lvm: KernelLvm {
                        name: "vg0".into(),
                        bytes: 100 * GIB,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                status: StoragePoolStatus {
                    status: PoolStatus::Ready,
                    capacity_bytes: (100 * GIB) as i64,
                    vg_free_size: free as i64,
                    vg_virtual_free_size: free as i64,
                },
                ..Default::default()
            },
            spdk_healthy: true,
            ..Default::default()
        }
    }

    #[test]
    fn pods_without_local_volumes_skip_the_cycle() {
        let fx = fixture();
        fx.pvcs.insert(claim("data", "foreign", GIB));

        let (cycle, status) = fx.plugin.pre_filter(&pod(&["data"]));
        assert!(status.is_success());
        assert!(cycle.is_skip());

        // skipped cycles pass unknown nodes too
        let status = fx.plugin.filter(&cycle, &pod(&["data"]), "nowhere");
        assert!(status.is_success());
    }

    #[test]
    fn missing_claims_abort_the_cycle() {
        let fx = fixture();
        let (_, status) = fx.plugin.pre_filter(&pod(&["ghost"]));
        assert!(matches!(status, Status::Error(_)));
    }

    #[test]
    fn demands_are_filtered_against_node_capacity() {
        let fx = fixture();
        fx.pvcs.insert(claim("data-a", "local", 5 * GIB));
        fx.pvcs.insert(claim("data-b", "local", 3 * GIB));
        fx.state.upsert(node("node-small", 6 * GIB));
        fx.state.upsert(node("node-large", 20 * GIB));

        let pod = pod(&["data-a", "data-b"]);
        let (cycle, status) = fx.plugin.pre_filter(&pod);
        assert!(status.is_success());
        assert!(!cycle.is_skip());

        match fx.plugin.filter(&cycle, &pod, "node-small") {
            Status::Unschedulable(message) => {
                assert!(message.starts_with(NO_STORAGE_POOL_AVAILABLE));
                assert!(message.contains("PoolFreeSize"));
            }
            other => panic!("expected Unschedulable, got {:?}", other),
        }
        assert!(fx.plugin.filter(&cycle, &pod, "node-large").is_success());
    }

    #[test]
    fn relocatable_claims_do_not_reject_small_nodes() {
        let fx = fixture();
        fx.pvcs.insert(claim("data", "local-any", 50 * GIB));
        fx.state.upsert(node("node-small", 10 * GIB));

        let pod = pod(&["data"]);
        let (cycle, status) = fx.plugin.pre_filter(&pod);
        assert!(status.is_success());
        // still our volume: the cycle is not skipped
        assert!(!cycle.is_skip());

        // the volume may be provisioned on any pool, so the pod fits
        assert!(fx.plugin.filter(&cycle, &pod, "node-small").is_success());
    }

    #[test]
    fn bound_claims_pin_the_pod_to_their_node() {
        let fx = fixture();
        let mut bound = claim("data", "local", GIB);
        bound.bound_node = Some("node-2".into());
        fx.pvcs.insert(bound);
        fx.state.upsert(node("node-1", 50 * GIB));
        fx.state.upsert(node("node-2", 50 * GIB));

        let pod = pod(&["data"]);
        let (cycle, _) = fx.plugin.pre_filter(&pod);
        assert!(matches!(
            fx.plugin.filter(&cycle, &pod, "node-1"),
            Status::Unschedulable(_)
        ));
        assert!(fx.plugin.filter(&cycle, &pod, "node-2").is_success());
    }

    #[test]
    fn nodes_without_pools_are_unresolvable() {
        let fx = fixture();
        fx.pvcs.insert(claim("data", "local", GIB));
        let pod = pod(&["data"]);
        let (cycle, _) = fx.plugin.pre_filter(&pod);
        assert!(matches!(
            fx.plugin.filter(&cycle, &pod, "node-1"),
            Status::UnschedulableAndUnresolvable(_)
        ));
    }

    #[test]
    fn filter_reads_the_cycle_concurrently() {
        let fx = fixture();
        fx.pvcs.insert(claim("data", "local", GIB));
        for idx in 0..8 {
            fx.state.upsert(node(&format!("node-{idx}"), 50 * GIB));
        }

        let pod = pod(&["data"]);
        let (cycle, status) = fx.plugin.pre_filter(&pod);
        assert!(status.is_success());

        let plugin = &fx.plugin;
        std::thread::scope(|scope| {
            for idx in 0..8 {
                let cycle = cycle.clone();
                let pod = pod.clone();
                let name = format!("node-{idx}");
                scope.spawn(move || {
                    assert!(plugin.filter(&cycle, &pod, &name).is_success());
                });
            }
        });
    }

    #[test]
    fn annotations_feed_affinity_and_conflicts() {
        let fx = fixture();
        fx.pvcs.insert(claim("data", "local", GIB));
        let mut pod = pod(&["data"]);
        pod.annotations.insert(
            ANNOTATION_NODE_AFFINITY.into(),
            "zone=a, disk=nvme".into(),
        );
        pod.annotations
            .insert(ANNOTATION_CONFLICT_VOLUMES.into(), "replica-1".into());

        let (cycle, _) = fx.plugin.pre_filter(&pod);
        let demands = cycle.demands();
        assert_eq!(demands.len(), 1);
        assert_eq!(
            demands[0].node_affinity.get("zone"),
            Some(&"a".to_string())
        );
        assert_eq!(
            demands[0].node_affinity.get("disk"),
            Some(&"nvme".to_string())
        );
        assert_eq!(demands[0].conflict_volumes, vec!["replica-1".to_string()]);
    }

    #[test]
    fn namespaced_annotations_ride_along_claim_over_pod() {
        let fx = fixture();
        let mut pvc = claim("data", "local", GIB);
        pvc.annotations
            .insert("local.storage/tier".into(), "gold".into());
        fx.pvcs.insert(pvc);

        let mut pod = pod(&["data"]);
        pod.annotations
            .insert("local.storage/tier".into(), "silver".into());
        pod.annotations
            .insert("local.storage/owner".into(), "team-a".into());
        pod.annotations
            .insert("unrelated/owner".into(), "team-b".into());

        let (cycle, _) = fx.plugin.pre_filter(&pod);
        let demands = cycle.demands();
        assert_eq!(
            demands[0].annotations.get("local.storage/tier"),
            Some(&"gold".to_string())
        );
        assert_eq!(
            demands[0].annotations.get("local.storage/owner"),
            Some(&"team-a".to_string())
        );
        // foreign namespaces stay behind
        assert!(!demands[0].annotations.contains_key("unrelated/owner"));
    }
}
