//! Allocator for unused IDs
//!
//! The [`IdSpace`] is recomputed once per synchronization pass as the full
//! configured range minus every ID already known to the format table or the
//! location table. IDs are handed out in policy order and never reused within
//! the pass.
//!
//! Only the used IDs are stored. The free IDs are the still unvisited part of
//! the range, walked by a cursor from the policy's end, so a 32-bit range
//! costs no more than a small one.

use crate::id::table::{FormatTable, LocationTable};
use crate::types::{IdRange, TriceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Order in which fresh IDs are handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdPolicy {
    /// Smallest free ID first
    #[default]
    Upward,
    /// Largest free ID first
    Downward,
}

impl std::fmt::Display for IdPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdPolicy::Upward => write!(f, "upward"),
            IdPolicy::Downward => write!(f, "downward"),
        }
    }
}

impl std::str::FromStr for IdPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "upward" => Ok(IdPolicy::Upward),
            "downward" => Ok(IdPolicy::Downward),
            other => Err(format!("unknown ID policy `{}`", other)),
        }
    }
}

/// Drift between the two persisted tables found while building the space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDrift {
    /// IDs present in the format table only
    pub only_in_formats: Vec<TriceId>,
    /// IDs present in the location table only
    pub only_in_locations: Vec<TriceId>,
}

impl TableDrift {
    /// Whether both tables agree on their key sets
    pub fn is_empty(&self) -> bool {
        self.only_in_formats.is_empty() && self.only_in_locations.is_empty()
    }
}

/// Ordered pool of unused IDs
#[derive(Debug, Clone)]
pub struct IdSpace {
    /// Unvisited part of the range, `None` once exhausted
    window: Option<(u32, u32)>,
    /// IDs inside the range that must not be handed out
    used: BTreeSet<TriceId>,
    policy: IdPolicy,
}

impl IdSpace {
    /// Compute the free IDs of `range` and report table drift
    pub fn compute(
        range: IdRange,
        policy: IdPolicy,
        formats: &FormatTable,
        locations: &LocationTable,
    ) -> (Self, TableDrift) {
        let used_fmt: BTreeSet<TriceId> = formats.ids().collect();
        let used_loc: BTreeSet<TriceId> = locations.ids().collect();

        let mut drift = TableDrift::default();
        for id in used_fmt.difference(&used_loc) {
            tracing::info!("ID {} only inside the ID list", id);
            drift.only_in_formats.push(*id);
        }
        for id in used_loc.difference(&used_fmt) {
            tracing::info!("ID {} only inside the location list", id);
            drift.only_in_locations.push(*id);
        }

        let lo = range.min.max(1);
        let window = (lo <= range.max).then_some((lo, range.max));
        let used = used_fmt
            .union(&used_loc)
            .copied()
            .filter(|id| window.is_some_and(|(lo, hi)| (lo..=hi).contains(&id.value())))
            .collect();

        (
            Self {
                window,
                used,
                policy,
            },
            drift,
        )
    }

    /// Take the next free ID, `None` once the range is exhausted
    pub fn next_id(&mut self) -> Option<TriceId> {
        while let Some((lo, hi)) = self.window {
            let value = match self.policy {
                IdPolicy::Upward => lo,
                IdPolicy::Downward => hi,
            };
            self.window = match (lo == hi, self.policy) {
                (true, _) => None,
                (false, IdPolicy::Upward) => Some((lo + 1, hi)),
                (false, IdPolicy::Downward) => Some((lo, hi - 1)),
            };
            let id = TriceId(value);
            if !self.used.remove(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Withdraw an ID that is already in use somewhere
    pub fn reserve(&mut self, id: TriceId) -> bool {
        self.in_window(id) && self.used.insert(id)
    }

    /// Number of IDs left
    pub fn remaining(&self) -> usize {
        let Some((lo, hi)) = self.window else {
            return 0;
        };
        let span = u64::from(hi - lo) + 1;
        let taken = self.used.range(TriceId(lo)..=TriceId(hi)).count() as u64;
        usize::try_from(span - taken).unwrap_or(usize::MAX)
    }

    /// Whether a specific ID is still free
    pub fn is_free(&self, id: TriceId) -> bool {
        self.in_window(id) && !self.used.contains(&id)
    }

    fn in_window(&self, id: TriceId) -> bool {
        self.window.is_some_and(|(lo, hi)| (lo..=hi).contains(&id.value()))
    }
}
