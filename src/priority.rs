//! Priority cascading.
//!
//! Priorities are kept unique among a user's pending tasks. Saving a task at
//! a priority that another pending task already holds pushes that task up by
//! one, which may in turn collide with the next one, and so on until a gap is
//! reached.

use crate::error::ApiError;
use crate::types::{PRIORITY_MAX, Priority};
use std::collections::{BTreeMap, HashSet};

/// Compute the priority shifts needed to free `new_priority`.
///
/// `pending` lists `(task_id, priority)` for the user's other pending tasks.
/// Returns `(task_id, shifted_priority)` pairs in the order they were found.
/// When legacy data holds duplicate priorities, the lowest task id moves.
/// Fails when a shift would push a task past [`PRIORITY_MAX`].
pub fn plan_cascade(
    pending: &[(i64, Priority)],
    new_priority: Priority,
) -> Result<Vec<(i64, Priority)>, ApiError> {
    let mut by_priority: BTreeMap<Priority, Vec<i64>> = BTreeMap::new();
    for &(id, priority) in pending {
        by_priority.entry(priority).or_default().push(id);
    }
    for ids in by_priority.values_mut() {
        ids.sort_unstable();
    }

    let mut shifts = Vec::new();
    let mut moved = HashSet::new();
    let mut current = new_priority;

    loop {
        let candidate = by_priority
            .get(&current)
            .and_then(|ids| ids.iter().copied().find(|id| !moved.contains(id)));

        let Some(id) = candidate else {
            break;
        };
        let next = current
            .checked_add(1)
            .filter(|next| *next <= PRIORITY_MAX)
            .ok_or_else(|| {
                ApiError::invalid_value(
                    "priority",
                    format!("No free priority above {}", current),
                )
            })?;

        moved.insert(id);
        shifts.push((id, next));
        current = next;
    }

    Ok(shifts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_collision_means_no_shift() {
        let pending = [(1, 1), (2, 3)];
        assert!(plan_cascade(&pending, 2).unwrap().is_empty());
        assert!(plan_cascade(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn single_collision_shifts_one_task() {
        let pending = [(1, 1), (2, 3)];
        assert_eq!(plan_cascade(&pending, 1).unwrap(), vec![(1, 2)]);
    }

    #[test]
    fn contiguous_run_shifts_until_gap() {
        let pending = [(10, 1), (11, 2), (12, 3), (13, 5)];
        assert_eq!(plan_cascade(&pending, 1).unwrap(), vec![(10, 2), (11, 3), (12, 4)]);
    }

    #[test]
    fn run_reaching_next_block_continues_through_it() {
        let pending = [(1, 1), (2, 2), (3, 3), (4, 4)];
        assert_eq!(plan_cascade(&pending, 2).unwrap(), vec![(2, 3), (3, 4), (4, 5)]);
    }

    #[test]
    fn duplicate_priorities_move_lowest_id_first() {
        let pending = [(7, 2), (3, 2)];
        assert_eq!(plan_cascade(&pending, 2).unwrap(), vec![(3, 3)]);
    }

    #[test]
    fn result_keeps_priorities_unique() {
        let pending = [(1, 0), (2, 1), (3, 2), (4, 4), (5, 5)];
        let shifts = plan_cascade(&pending, 0).unwrap();

        let mut after: Vec<Priority> = pending
            .iter()
            .map(|&(id, p)| {
                shifts
                    .iter()
                    .find(|(sid, _)| *sid == id)
                    .map(|&(_, np)| np)
                    .unwrap_or(p)
            })
            .collect();
        after.push(0);
        let unique: HashSet<_> = after.iter().collect();
        assert_eq!(unique.len(), after.len());
    }

    #[test]
    fn shifting_past_the_ceiling_is_rejected() {
        let pending = [(1, PRIORITY_MAX - 1), (2, PRIORITY_MAX)];
        let err = plan_cascade(&pending, PRIORITY_MAX - 1).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("priority"));

        // A gap below the ceiling is still usable
        let pending = [(1, PRIORITY_MAX - 1)];
        assert_eq!(
            plan_cascade(&pending, PRIORITY_MAX - 1).unwrap(),
            vec![(1, PRIORITY_MAX)]
        );
    }
}
