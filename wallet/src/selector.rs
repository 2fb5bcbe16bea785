//! # Unit Selection
//!
//! Decides which fungible units pay for a transfer, and which units are
//! worth folding together during dust collection.
//!
//! ## Transfer selection
//!
//! Only spendable (unlocked, unburned) fungible units of the requested type
//! are candidates. If their saturating sum is below the target, selection
//! fails with [`SelectionError::InsufficientTokens`]. Otherwise:
//!
//! 1. Find the *closest match*: the unit whose amount is nearest to the
//!    target without going below it. The running comparison keeps the first
//!    of equally good units and stops early on an exact match.
//! 2. If the closest match covers the target on its own, emit
//!    [`Selection::Transfer`] (exact amount) or [`Selection::Split`].
//! 3. Otherwise emit [`Selection::Accumulate`]: candidates in order until
//!    their sum reaches the target.
//!
//! Everything here is pure. The selector reads a snapshot of units and
//! never talks to the partition.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::unit::{LockReason, TokenUnit, TypeId};

/// Errors that can occur during unit selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("insufficient tokens: {available} available, {required} required")]
    InsufficientTokens { available: u64, required: u64 },

    #[error("target amount must be positive")]
    ZeroAmount,
}

/// How a fungible transfer will be paid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One unit holds exactly the target amount; hand it over whole.
    Transfer(TokenUnit),
    /// One unit holds more than the target; split the target off it.
    Split(TokenUnit),
    /// No single unit covers the target. These units together do.
    Accumulate(Vec<TokenUnit>),
}

/// Selection over a snapshot of an account's (or several accounts') units.
#[derive(Debug, Clone, Copy)]
pub struct UnitSelector<'a> {
    units: &'a [TokenUnit],
}

impl<'a> UnitSelector<'a> {
    pub fn new(units: &'a [TokenUnit]) -> Self {
        Self { units }
    }

    /// Spendable fungible units of `type_id`, in snapshot order.
    pub fn candidates(&self, type_id: &TypeId) -> Vec<&'a TokenUnit> {
        self.units
            .iter()
            .filter(|u| u.is_fungible() && u.is_spendable() && &u.type_id == type_id)
            .collect()
    }

    /// Picks the units that pay `target` of `type_id`.
    pub fn select(&self, type_id: &TypeId, target: u64) -> Result<Selection, SelectionError> {
        if target == 0 {
            return Err(SelectionError::ZeroAmount);
        }

        let candidates = self.candidates(type_id);
        let available = candidates
            .iter()
            .fold(0u64, |sum, u| sum.saturating_add(u.amount));
        if available < target {
            return Err(SelectionError::InsufficientTokens {
                available,
                required: target,
            });
        }

        // `available >= target > 0`, so there is at least one candidate.
        let mut closest = candidates[0];
        for &unit in &candidates[1..] {
            if closest.amount == target {
                break;
            }
            let prev_diff = i128::from(closest.amount) - i128::from(target);
            let curr_diff = i128::from(unit.amount) - i128::from(target);
            if (curr_diff >= 0 && curr_diff < prev_diff) || (prev_diff < 0 && curr_diff > prev_diff)
            {
                closest = unit;
            }
        }

        if closest.amount == target {
            debug!(unit_id = %closest.id, target, "selected exact unit");
            return Ok(Selection::Transfer(closest.clone()));
        }
        if closest.amount > target {
            debug!(
                unit_id = %closest.id,
                amount = closest.amount,
                target,
                "selected unit to split"
            );
            return Ok(Selection::Split(closest.clone()));
        }

        let mut accumulated = 0u64;
        let mut selected = Vec::new();
        for unit in candidates {
            if accumulated >= target {
                break;
            }
            accumulated = accumulated.saturating_add(unit.amount);
            selected.push(unit.clone());
        }
        debug!(units = selected.len(), accumulated, target, "accumulating units");
        Ok(Selection::Accumulate(selected))
    }

    /// Groups of fungible units worth joining, per type, at most `max_units`
    /// each. The first unit of a group is the join target, the rest are the
    /// spendable units to burn into it, largest first.
    ///
    /// A unit still locked by an interrupted dust collection is the target of
    /// its type and forms a group even on its own. Otherwise a group needs
    /// two spendable units and the largest is the target.
    pub fn dust_groups(&self, max_units: usize) -> BTreeMap<TypeId, Vec<TokenUnit>> {
        let mut spendable: BTreeMap<TypeId, Vec<TokenUnit>> = BTreeMap::new();
        let mut resumed: BTreeMap<TypeId, TokenUnit> = BTreeMap::new();
        for unit in self.units.iter().filter(|u| u.is_fungible() && !u.burned) {
            if unit.is_spendable() {
                spendable.entry(unit.type_id.clone()).or_default().push(unit.clone());
            } else if unit.lock_status == LockReason::CollectDust.code() {
                let target = resumed.entry(unit.type_id.clone()).or_insert_with(|| unit.clone());
                if unit.amount > target.amount {
                    *target = unit.clone();
                }
            }
        }
        for units in spendable.values_mut() {
            units.sort_by(|a, b| b.amount.cmp(&a.amount));
        }

        let mut groups = BTreeMap::new();
        for (type_id, target) in resumed {
            let mut group = vec![target];
            group.extend(spendable.remove(&type_id).unwrap_or_default());
            group.truncate(max_units.max(1));
            groups.insert(type_id, group);
        }
        for (type_id, mut units) in spendable {
            if units.len() >= 2 {
                units.truncate(max_units);
                groups.insert(type_id, units);
            }
        }
        groups
    }
}
