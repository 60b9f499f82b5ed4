use crate::error::Result;
use crate::store::Store;
use crate::util::depth;
use std::collections::HashSet;

/// Deletes every node whose path is not in `snapshot`, together with its metrics.
///
/// This is a hard delete: history on removed paths is no longer visible in the tree.
/// Returns the number of nodes removed.
pub fn reconcile(store: &mut Store, snapshot: &HashSet<String>) -> Result<usize> {
    let mut stale: Vec<(i64, String)> = store
        .file_paths()?
        .into_iter()
        .filter(|(_, path)| !snapshot.contains(path))
        .collect();
    if stale.is_empty() {
        return Ok(0);
    }

    // children before parents
    stale.sort_by(|a, b| depth(&b.1).cmp(&depth(&a.1)));
    let stale: Vec<i64> = stale.into_iter().map(|(id, _)| id).collect();
    let removed = store.delete_files(&stale)?;
    log::info!("Removed {} paths no longer in the working tree", removed);
    Ok(removed)
}
