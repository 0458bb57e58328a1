//! Hand-off between the loader thread and the thread owning the scene graph
//!
//! The loader stages loaded tiles (merges) and tiles to remove (unhooks),
//! plus notices of child loads it started or gave up on. The graph owner
//! drains everything once per frame and hands the subtrees it removed back
//! as deletes, which the loader releases on its next cycle.
//! Every drain swaps the list out under the lock, so neither side holds the
//! lock while doing real work.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::scene::DetachedSubtree;
use crate::tile::{TileContent, TileKey};

use super::managed_tile::TileRequest;

/// A loaded tile waiting to join the graph.
#[derive(Debug)]
pub struct MergeItem {
    pub key: TileKey,
    pub parent: Option<TileKey>,
    pub content: TileContent,
}

#[derive(Debug, Default)]
struct ChangeLists {
    to_merge: Vec<MergeItem>,
    to_unhook: Vec<TileKey>,
    to_delete: Vec<DetachedSubtree>,
    requested: Vec<TileRequest>,
    abandoned: Vec<TileRequest>,
}

/// Everything staged for the graph owner, drained in one go.
#[derive(Debug, Default)]
pub struct PendingChanges {
    pub unhooks: Vec<TileKey>,
    pub merges: Vec<MergeItem>,
    /// Child loads the loader started.
    pub requested: Vec<TileRequest>,
    /// Child loads that ended without a merge.
    pub abandoned: Vec<TileRequest>,
}

#[derive(Debug, Default)]
pub struct ChangeQueue {
    lists: Mutex<ChangeLists>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChangeLists> {
        // the lists stay consistent even if a holder panicked
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_merge(&self, item: MergeItem) {
        self.lock().to_merge.push(item);
    }

    /// Note a child load in flight. Root loads have no parent to mark.
    pub fn push_requested(&self, request: TileRequest) {
        if request.parent.is_some() {
            self.lock().requested.push(request);
        }
    }

    /// Note a child load that will never be merged.
    pub fn push_abandoned(&self, request: TileRequest) {
        if request.parent.is_some() {
            self.lock().abandoned.push(request);
        }
    }

    /// Stage tiles for removal from the graph.
    ///
    /// A tile whose merge is still pending never reached the graph: its
    /// merge, and pending merges of tiles under it, are cancelled instead.
    pub fn push_unhooks(&self, keys: impl IntoIterator<Item = TileKey>) {
        let mut lists = self.lock();
        for key in keys {
            match cancel_merges(&mut lists.to_merge, key) {
                Some(parent @ Some(_)) => lists.abandoned.push(TileRequest { key, parent }),
                Some(None) => {}
                None => lists.to_unhook.push(key),
            }
        }
    }

    /// Take every staged unhook, merge and request notice.
    pub fn take_changes(&self) -> PendingChanges {
        let mut lists = self.lock();
        PendingChanges {
            unhooks: std::mem::take(&mut lists.to_unhook),
            merges: std::mem::take(&mut lists.to_merge),
            requested: std::mem::take(&mut lists.requested),
            abandoned: std::mem::take(&mut lists.abandoned),
        }
    }

    /// Hand removed subtrees back for release on the loader thread.
    pub fn push_deleted(&self, detached: impl IntoIterator<Item = DetachedSubtree>) {
        self.lock().to_delete.extend(detached);
    }

    pub fn take_deleted(&self) -> Vec<DetachedSubtree> {
        std::mem::take(&mut self.lock().to_delete)
    }

    pub fn pending_merges(&self) -> usize {
        self.lock().to_merge.len()
    }

    pub fn pending_unhooks(&self) -> usize {
        self.lock().to_unhook.len()
    }

    pub fn pending_deletes(&self) -> usize {
        self.lock().to_delete.len()
    }
}

/// Drop the pending merge of `key` and of every tile staged under it.
/// Returns the parent of `key`'s own cancelled merge, if it had one.
fn cancel_merges(merges: &mut Vec<MergeItem>, key: TileKey) -> Option<Option<TileKey>> {
    let mut found = None;
    let mut doomed = vec![key];
    while let Some(current) = doomed.pop() {
        merges.retain(|item| {
            if item.key == current {
                if current == key {
                    found = Some(item.parent);
                }
                false
            } else if item.parent == Some(current) {
                doomed.push(item.key);
                false
            } else {
                true
            }
        });
    }
    if found.is_some() {
        log::trace!("tile {key} unloaded before it was merged");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use crate::tile::{GridDatabaseConfig, GridTileSource, TileSource};

    fn item(source: &GridTileSource, key: TileKey) -> MergeItem {
        MergeItem {
            key,
            parent: key.quadtree_parent(),
            content: source.load_tile(key).unwrap(),
        }
    }

    #[test]
    fn test_drain_swaps_lists_out() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let queue = ChangeQueue::new();
        queue.push_merge(item(&source, TileKey::new(0, 0, 0)));
        queue.push_unhooks([TileKey::new(5, 5, 0)]);

        let changes = queue.take_changes();
        assert_eq!(changes.merges.len(), 1);
        assert_eq!(changes.unhooks, vec![TileKey::new(5, 5, 0)]);
        assert_eq!(queue.pending_merges(), 0);
        assert_eq!(queue.pending_unhooks(), 0);
        assert!(queue.take_changes().merges.is_empty());
    }

    #[test]
    fn test_unhook_cancels_pending_merge_and_descendants() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let queue = ChangeQueue::new();
        let parent = TileKey::new(0, 0, 0);
        let child = TileKey::new(1, 1, 1);
        let grandchild = TileKey::new(2, 3, 2);
        let other = TileKey::new(1, 0, 0);
        for key in [parent, child, grandchild, other] {
            queue.push_merge(item(&source, key));
        }

        queue.push_unhooks([parent]);
        assert_eq!(queue.pending_unhooks(), 0);
        let changes = queue.take_changes();
        assert_eq!(changes.merges.iter().map(|m| m.key).collect::<Vec<_>>(), vec![other]);
    }

    #[test]
    fn test_cancelled_child_merge_is_abandoned() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let queue = ChangeQueue::new();
        let parent = TileKey::new(0, 0, 0);
        let child = TileKey::new(1, 0, 1);
        queue.push_requested(TileRequest { key: parent, parent: None });
        queue.push_requested(TileRequest { key: child, parent: Some(parent) });
        queue.push_merge(item(&source, child));

        queue.push_unhooks([child]);
        let changes = queue.take_changes();
        assert!(changes.merges.is_empty());
        assert!(changes.unhooks.is_empty());
        let notice = TileRequest { key: child, parent: Some(parent) };
        assert_eq!(changes.requested, vec![notice]);
        assert_eq!(changes.abandoned, vec![notice]);
    }

    #[test]
    fn test_unhook_of_merged_tile_cancels_staged_children() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let queue = ChangeQueue::new();
        let parent = TileKey::new(0, 0, 0);
        queue.push_merge(item(&source, TileKey::new(0, 1, 1)));

        // parent already in the graph, only its child is staged
        queue.push_unhooks([parent]);
        let changes = queue.take_changes();
        assert!(changes.merges.is_empty());
        assert_eq!(changes.unhooks, vec![parent]);
    }

    #[test]
    fn test_deletes_round_trip() {
        let source = GridTileSource::new(GridDatabaseConfig::default());
        let mut graph = SceneGraph::new();
        let key = TileKey::new(0, 0, 0);
        graph.merge_tile(key, None, source.load_tile(key).unwrap());

        let queue = ChangeQueue::new();
        queue.push_deleted(graph.unhook_tile(key));
        assert_eq!(queue.pending_deletes(), 1);

        let deleted = queue.take_deleted();
        assert_eq!(deleted[0].key, key);
        assert_eq!(queue.pending_deletes(), 0);
    }
}
