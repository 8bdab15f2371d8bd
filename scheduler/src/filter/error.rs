//! Aggregated filter rejections. One scheduling cycle can reject a node
//! for several reasons at once, and the same reason across many nodes;
//! the merged error keeps a histogram instead of a flat list so the
//! failure message stays readable on large clusters.

use parking_lot::Mutex;
use std::{collections::HashMap, fmt};

/// Prefix of every merged rejection message; callers match on it to tell
/// capacity rejections from infrastructure errors.
pub const NO_STORAGE_POOL_AVAILABLE: &str = "NoStoragePoolAvailable";

/// Whether a failure message came from the filter chain rather than from
/// infrastructure.
pub fn is_no_storage_pool_available(message: &str) -> bool {
    message.starts_with(NO_STORAGE_POOL_AVAILABLE)
}

pub const REASON_POOL_UNSCHEDULABLE: &str = "PoolUnschedulable";
pub const REASON_POOL_FREE_SIZE: &str = "PoolFreeSize";
pub const REASON_SPDK_UNHEALTHY: &str = "SpdkUnhealthy";
pub const REASON_REMOTE_VOL_MAX_COUNT: &str = "RemoteVolMaxCount";
pub const REASON_POSITION_NOT_MATCH: &str = "PositionNotMatch";
pub const REASON_NODE_AFFINITY: &str = "NodeAffinity";
pub const REASON_DATA_CONFLICT: &str = "DataConflict";
pub const REASON_RESERVATION_TOO_SMALL: &str = "ReservationTooSmall";
pub const REASON_THIN_PROVISION: &str = "ThinProvision";

/// Histogram of rejection reasons gathered over one filter pass.
#[derive(Debug, Default)]
pub struct MergedError {
    reasons: Mutex<HashMap<String, usize>>,
}

impl MergedError {
    pub fn add_reason(&self, reason: &str) {
        *self
            .reasons
            .lock()
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.lock().is_empty()
    }

    /// Count recorded for one reason.
    pub fn count(&self, reason: &str) -> usize {
        self.reasons.lock().get(reason).copied().unwrap_or(0)
    }
}

impl fmt::Display for MergedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // sorted for a stable message
        let mut entries: Vec<(String, usize)> = self
            .reasons
            .lock()
            .iter()
            .map(|(reason, count)| (reason.clone(), *count))
            .collect();
        entries.sort();

        write!(f, "{NO_STORAGE_POOL_AVAILABLE}: ")?;
        for (idx, (reason, count)) in entries.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{reason}x{count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_prefixed_and_sorted() {
        let merged = MergedError::default();
        merged.add_reason(REASON_POOL_FREE_SIZE);
        merged.add_reason(REASON_POOL_FREE_SIZE);
        merged.add_reason(REASON_DATA_CONFLICT);

        assert!(!merged.is_empty());
        assert_eq!(merged.count(REASON_POOL_FREE_SIZE), 2);
        assert_eq!(
            merged.to_string(),
            "NoStoragePoolAvailable: DataConflictx1, PoolFreeSizex2"
        );
        assert!(is_no_storage_pool_available(&merged.to_string()));
        assert!(!is_no_storage_pool_available("connection refused"));
    }
}
