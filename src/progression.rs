//! The unlock-order state machine.
//!
//! A session's `unlocked_order` is the highest plan-node position the learner
//! may currently attempt (0 = nothing unlocked). It never decreases within a
//! plan's lifetime; the only reset is a full plan regeneration, which runs
//! [`initial_unlock`] again. All transitions are pure functions — persistence
//! is the session store's concern.

use crate::error::ProgressionError;

/// Unlock state after a plan is created or regenerated.
///
/// A non-empty plan unlocks its first node; an empty plan unlocks nothing.
/// Regeneration discards any prior unlock progress.
pub fn initial_unlock(node_count: usize) -> u32 {
    if node_count > 0 { 1 } else { 0 }
}

/// Reject submissions against nodes the learner has not reached yet.
pub fn check_unlocked(order: u32, unlocked: u32) -> Result<(), ProgressionError> {
    if order > unlocked {
        Err(ProgressionError::LockedNode { order, unlocked })
    } else {
        Ok(())
    }
}

/// Unlock state after a graded attempt at `order`.
///
/// A pass unlocks the next node (`max(unlocked, order + 1)`); a fail leaves
/// the state unchanged — the learner may retry without limit.
pub fn advance(unlocked: u32, order: u32, passed: bool) -> u32 {
    if passed {
        unlocked.max(order + 1)
    } else {
        unlocked
    }
}

/// Whether the plan is finished: the unlock order has moved past every node.
pub fn finished(unlocked: u32, max_order: u32) -> bool {
    max_order > 0 && unlocked > max_order
}
