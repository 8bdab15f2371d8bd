//! Per-scheduling-cycle state. PreFilter writes it once, the Filter calls
//! for every candidate node read it concurrently.

use crate::filter::VolumeDemand;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct CycleInner {
    skip: bool,
    demands: Vec<VolumeDemand>,
}

/// Shared cycle state. Cloning is shallow, all clones observe the same
/// cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleData {
    inner: Arc<RwLock<CycleInner>>,
}

impl CycleData {
    /// Mark the cycle as irrelevant to this scheduler: the pod mounts none
    /// of our volumes and every node passes.
    pub fn set_skip(&self) {
        self.inner.write().skip = true;
    }

    pub fn is_skip(&self) -> bool {
        self.inner.read().skip
    }

    pub fn set_demands(&self, demands: Vec<VolumeDemand>) {
        self.inner.write().demands = demands;
    }

    pub fn demands(&self) -> Vec<VolumeDemand> {
        self.inner.read().demands.clone()
    }
}
