//! Node scoring. Placement consolidates: the more utilized a pool already
//! is, the higher its score, so empty pools stay empty and drainable.

use crate::state::Node;

pub const MAX_SCORE: i64 = 100;
pub const MIN_SCORE: i64 = 0;

/// Score a node by pool utilization, `(total - free) / total` scaled to
/// `[0, 100]`. Thin pools are judged against their overcommitted budget,
/// total scaled by the overprovision ratio against the virtual free
/// space, so an exhausted budget scores as full.
pub fn least_free_score(node: &Node) -> i64 {
    let mut total = node.pool.vg_total_bytes();
    let mut free = node.pool.free_bytes();
    if node.pool.is_thin {
        let ratio = node.pool.overprovision_ratio.max(1.0);
        total = (total as f64 * ratio) as i64;
        free = node.pool.vg_virtual_free_bytes();
    }
    if total <= 0 {
        return MIN_SCORE;
    }

    let used = (total - free.clamp(0, total)) as f64;
    let score = (used / total as f64 * MAX_SCORE as f64).round() as i64;
    score.clamp(MIN_SCORE, MAX_SCORE)
}
