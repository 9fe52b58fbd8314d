//! Pruning of stored history for activities that are no longer known.
use crate::SampleStorage;
use crate::constants::LOG_TARGET;
use crate::registry::KnownKeys;
use crate::store::{PersistentStore, Store};

/// Remove every entry whose key is not known, then persist the result.
///
/// Returns the number of removed entries.
pub fn prune<S: SampleStorage>(
    store: &mut Store,
    known: &KnownKeys,
    persistence: &PersistentStore<S>,
) -> usize {
    let removed = store.retain_keys(|key| known.contains(key));
    for key in &removed {
        log::debug!(target: LOG_TARGET, "pruned stale history for {key}");
    }
    persistence.save(store);
    removed.len()
}
