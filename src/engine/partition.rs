//! De-duplication and batch partitioning.
//!
//! Everything here is pure: the caller reads a Progress Store snapshot, and these
//! functions decide what remains to be done and how to slice it.

use crate::types::{ContactItem, RemoteUserRecord};
use rand::Rng;
use std::collections::HashSet;

/// Ordered batches of pending work, built fresh for every run and never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan<T> {
    batches: Vec<Vec<T>>,
}

impl<T: Clone> BatchPlan<T> {
    /// Slice `items` into batches of `batch_size`, preserving order
    ///
    /// Every batch holds exactly `batch_size` items except possibly the last.
    /// A `batch_size` of zero is treated as one.
    pub fn new(items: &[T], batch_size: usize) -> Self {
        Self {
            batches: items
                .chunks(batch_size.max(1))
                .map(|chunk| chunk.to_vec())
                .collect(),
        }
    }
}

impl<T> BatchPlan<T> {
    /// Number of batches
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Number of items across all batches
    pub fn item_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Size of each batch, in order
    pub fn sizes(&self) -> Vec<usize> {
        self.batches.iter().map(Vec::len).collect()
    }

    /// Borrow the batches
    pub fn batches(&self) -> &[Vec<T>] {
        &self.batches
    }

    /// Take ownership of the batches
    pub fn into_batches(self) -> Vec<Vec<T>> {
        self.batches
    }
}

/// Contacts that still need importing
///
/// Drops contacts whose phone is already imported and collapses duplicate phones
/// within `items` to their first occurrence. Input order is preserved.
pub fn pending_contacts(items: &[ContactItem], imported: &HashSet<String>) -> Vec<ContactItem> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| !imported.contains(&item.phone) && seen.insert(item.phone.as_str()))
        .cloned()
        .collect()
}

/// Users that may still be invited
///
/// Drops already-invited ids and duplicate ids, preserving pool order.
pub fn eligible_invitees(
    pool: &[RemoteUserRecord],
    invited: &HashSet<i64>,
) -> Vec<RemoteUserRecord> {
    let mut seen: HashSet<i64> = HashSet::with_capacity(pool.len());
    pool.iter()
        .filter(|user| !invited.contains(&user.remote_id) && seen.insert(user.remote_id))
        .cloned()
        .collect()
}

/// Draw a uniform random subset of `min(count, eligible.len())` users
///
/// The subset is returned in pool order so that batch contents do not depend on
/// sampling order.
pub fn select_invite_candidates<R: Rng + ?Sized>(
    eligible: &[RemoteUserRecord],
    count: usize,
    rng: &mut R,
) -> Vec<RemoteUserRecord> {
    let amount = count.min(eligible.len());
    let mut indices = rand::seq::index::sample(rng, eligible.len(), amount).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| eligible[i].clone()).collect()
}
