//! The slice of the cluster model the scheduler consumes: pods, claims and
//! storage classes, behind lister traits so tests can feed in-memory data.

use api::{
    POSITION_ADVICE_MUST_LOCAL,
    PROVISIONER_NAME,
    PVC_ANNOTATION_SNAPSHOT_RESERVED_SIZE,
    SC_PARAM_POSITION_ADVICE,
    SC_PARAM_THIN_PROVISION,
};
use parking_lot::RwLock;
use snafu::Snafu;
use std::collections::HashMap;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("PersistentVolumeClaim {namespace}/{name} not found"))]
    PvcNotFound { namespace: String, name: String },
    #[snafu(display("StorageClass {name} not found"))]
    StorageClassNotFound { name: String },
}

/// A pod as seen by the scheduler: its identity and the claims it mounts.
#[derive(Debug, Default, Clone)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub annotations: HashMap<String, String>,
    /// Names of the PersistentVolumeClaims mounted by the pod.
    pub claim_names: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct PersistentVolumeClaim {
    pub name: String,
    pub namespace: String,
    pub storage_class: String,
    pub request_bytes: u64,
    pub annotations: HashMap<String, String>,
    /// Node the claim's volume already lives on, once provisioned.
    pub bound_node: Option<String>,
}

impl PersistentVolumeClaim {
    /// Extra bytes to reserve for future snapshots of this volume. An
    /// unparsable annotation counts as no reservation.
    pub fn snapshot_reserved_size(&self) -> u64 {
        self.annotations
            .get(PVC_ANNOTATION_SNAPSHOT_RESERVED_SIZE)
            .and_then(|val| val.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Clone)]
pub struct StorageClass {
    pub name: String,
    pub provisioner: String,
    pub parameters: HashMap<String, String>,
}

impl StorageClass {
    /// Whether volumes of this class are provisioned by this stack.
    pub fn is_local_storage(&self) -> bool {
        self.provisioner == PROVISIONER_NAME
    }

    /// Whether volumes of this class must share a node with their pod.
    pub fn is_must_local(&self) -> bool {
        self.parameters
            .get(SC_PARAM_POSITION_ADVICE)
            .map(|val| val == POSITION_ADVICE_MUST_LOCAL)
            .unwrap_or(false)
    }

    pub fn is_thin(&self) -> bool {
        self.parameters
            .get(SC_PARAM_THIN_PROVISION)
            .map(|val| val == "true")
            .unwrap_or(false)
    }
}

pub trait PvcLister: Send + Sync {
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, Error>;
}

pub trait StorageClassLister: Send + Sync {
    fn get(&self, name: &str) -> Result<StorageClass, Error>;
}

/// In-memory `PvcLister`, fed by tests and by the informer plumbing.
#[derive(Debug, Default)]
pub struct InMemoryPvcs {
    claims: RwLock<HashMap<(String, String), PersistentVolumeClaim>>,
}

impl InMemoryPvcs {
    pub fn insert(&self, claim: PersistentVolumeClaim) {
        self.claims
            .write()
            .insert((claim.namespace.clone(), claim.name.clone()), claim);
    }
}

impl PvcLister for InMemoryPvcs {
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, Error> {
        self.claims
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::PvcNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// In-memory `StorageClassLister`.
#[derive(Debug, Default)]
pub struct InMemoryStorageClasses {
    classes: RwLock<HashMap<String, StorageClass>>,
}

impl InMemoryStorageClasses {
    pub fn insert(&self, class: StorageClass) {
        self.classes.write().insert(class.name.clone(), class);
    }
}

impl StorageClassLister for InMemoryStorageClasses {
    fn get(&self, name: &str) -> Result<StorageClass, Error> {
        self.classes.read().get(name).cloned().ok_or_else(|| {
            Error::StorageClassNotFound {
                name: name.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_class_matchers() {
        let mut class = StorageClass {
            name: "local".into(),
            provisioner: PROVISIONER_NAME.into(),
            ..Default::default()
        };
        assert!(class.is_local_storage());
        assert!(!class.is_must_local());
        assert!(!class.is_thin());

        class
            .parameters
            .insert(SC_PARAM_POSITION_ADVICE.into(), "MustLocal".into());
        class
            .parameters
            .insert(SC_PARAM_THIN_PROVISION.into(), "true".into());
        assert!(class.is_must_local());
        assert!(class.is_thin());

        class.provisioner = "kubernetes.io/no-provisioner".into();
        assert!(!class.is_local_storage());
    }

    #[test]
    fn snapshot_reservation_tolerates_garbage() {
        let mut claim = PersistentVolumeClaim::default();
        assert_eq!(claim.snapshot_reserved_size(), 0);

        claim.annotations.insert(
            PVC_ANNOTATION_SNAPSHOT_RESERVED_SIZE.into(),
            "1073741824".into(),
        );
        assert_eq!(claim.snapshot_reserved_size(), 1073741824);

        claim.annotations.insert(
            PVC_ANNOTATION_SNAPSHOT_RESERVED_SIZE.into(),
            "a-lot".into(),
        );
        assert_eq!(claim.snapshot_reserved_size(), 0);
    }
}
