//! Container id allocation.

use rocked_common::types::ContainerId;

/// Returns the smallest non-negative id not in `existing`.
///
/// A `-1` sentinel is added before scanning so that a free `0` is found by
/// the same gap search as any other hole.
#[must_use]
pub fn allocate_id(existing: &[ContainerId]) -> ContainerId {
    let mut ids: Vec<i64> = existing.iter().map(|id| i64::from(id.value())).collect();
    ids.push(-1);
    ids.sort_unstable();

    let gap = ids
        .windows(2)
        .find(|pair| pair[1] - pair[0] > 1)
        .map(|pair| pair[0] + 1);
    let candidate = gap.unwrap_or_else(|| ids.last().map_or(0, |max| max + 1));
    ContainerId::new(u32::try_from(candidate).unwrap_or(u32::MAX))
}
