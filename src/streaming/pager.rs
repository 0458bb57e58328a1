//! Tile pager
//!
//! Front end for embedders. Without a loader thread, [`TilePager::update_no_thread`]
//! pages synchronously straight into the graph. With one, the embedder
//! publishes positions with [`TilePager::update_position`] and applies the
//! staged changes once per frame with [`TilePager::merge_updates`].

use std::sync::Arc;

use crate::core::types::DVec2;
use crate::core::{Error, Result};
use crate::scene::{DetachedSubtree, MergeOutcome, SceneGraph, SceneNodeId};
use crate::tile::{TileKey, TileSource};

use super::change_queue::ChangeQueue;
use super::config::{PagerConfig, ThreadMode};
use super::loader::{fetch_tile, BackgroundLoader};
use super::managed_tile::LoadOutcome;
use super::page_manager::PageManager;
use super::status::PageManagerStatus;

/// What one synchronous update did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateReport {
    pub unloaded: Vec<TileKey>,
    pub loaded: Vec<TileKey>,
    pub failed: Vec<TileKey>,
    /// Level-0 tiles merged detached; attach them with [`SceneGraph::attach`].
    pub new_roots: Vec<SceneNodeId>,
}

/// What one [`TilePager::merge_updates`] call applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeReport {
    pub unhooked: Vec<TileKey>,
    pub merged: Vec<TileKey>,
    /// Tiles whose parent was gone by the time they arrived.
    pub dropped: Vec<TileKey>,
    pub new_roots: Vec<SceneNodeId>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.unhooked.is_empty() && self.merged.is_empty() && self.dropped.is_empty()
    }
}

pub struct TilePager {
    source: Arc<dyn TileSource>,
    config: PagerConfig,
    origin: DVec2,
    /// `None` while the loader thread owns it.
    manager: Option<PageManager>,
    loader: Option<BackgroundLoader>,
    queue: Arc<ChangeQueue>,
    /// Subtrees unhooked by the last synchronous update.
    released: Vec<DetachedSubtree>,
}

impl TilePager {
    pub fn new(source: Arc<dyn TileSource>, config: PagerConfig) -> Result<Self> {
        config.validate()?;
        let manager = PageManager::new(source.clone(), config.page_distance_scale)?;
        let origin = source.header().origin;
        Ok(Self {
            source,
            config,
            origin,
            manager: Some(manager),
            loader: None,
            queue: Arc::new(ChangeQueue::new()),
            released: Vec::new(),
        })
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn is_thread_running(&self) -> bool {
        self.loader.is_some()
    }

    fn idle_manager(&mut self) -> Result<&mut PageManager> {
        if self.loader.is_some() {
            return Err(Error::ThreadState("the loader thread owns the page manager".into()));
        }
        self.manager
            .as_mut()
            .ok_or_else(|| Error::ThreadState("page manager lost".into()))
    }

    /// Page synchronously around `position`.
    ///
    /// Releases the subtrees unhooked by the previous call, processes every
    /// pending unload, then loads up to `max_tiles_per_update` tiles
    /// (all of them when that is 0).
    pub fn update_no_thread(&mut self, graph: &mut SceneGraph, position: DVec2) -> Result<UpdateReport> {
        let origin = self.origin;
        let max_loads = self.config.max_tiles_per_update;
        let source = self.source.clone();
        drop(std::mem::take(&mut self.released));

        let manager = self.idle_manager()?;
        manager.set_location(position - origin);

        let mut report = UpdateReport::default();
        let mut released = Vec::new();
        while let Some(request) = manager.next_unload() {
            manager.ack_unload();
            released.extend(graph.unhook_tile(request.key));
            report.unloaded.push(request.key);
        }

        while max_loads == 0 || report.loaded.len() + report.failed.len() < max_loads {
            let Some(request) = manager.next_load() else {
                break;
            };
            if let Some(parent) = request.parent {
                graph.mark_requested(request.key, parent);
            }
            match fetch_tile(source.as_ref(), request.key) {
                Ok(content) => {
                    manager.ack_load(LoadOutcome::Loaded { children: content.children.clone() });
                    if let MergeOutcome::Root(id) = graph.merge_tile(request.key, request.parent, content) {
                        report.new_roots.push(id);
                    }
                    report.loaded.push(request.key);
                }
                Err(err) => {
                    log::warn!("{err}");
                    manager.ack_load(LoadOutcome::Unavailable);
                    if let Some(parent) = request.parent {
                        graph.clear_requested(request.key, parent);
                    }
                    report.failed.push(request.key);
                }
            }
        }

        self.released = released;
        Ok(report)
    }

    /// Hand the page manager to a loader thread running in the configured mode.
    pub fn start_thread(&mut self) -> Result<()> {
        if self.loader.is_some() {
            return Err(Error::ThreadState("loader thread already running".into()));
        }
        if self.config.thread_mode == ThreadMode::None {
            return Err(Error::ThreadState("thread mode `none` has no loader thread".into()));
        }
        let manager = self
            .manager
            .take()
            .ok_or_else(|| Error::ThreadState("page manager lost".into()))?;

        // the last synchronous update's subtrees now go out with the next drain
        self.queue.push_deleted(std::mem::take(&mut self.released));

        match BackgroundLoader::spawn(manager, self.source.clone(), self.queue.clone(), self.config.thread_mode) {
            Ok(loader) => {
                self.loader = Some(loader);
                Ok(())
            }
            Err(err) => {
                // the manager was moved into the failed spawn
                self.manager = Some(PageManager::new(self.source.clone(), self.config.page_distance_scale)?);
                Err(err)
            }
        }
    }

    /// Stop and join the loader thread, taking the page manager back.
    pub fn end_thread(&mut self) -> Result<()> {
        let Some(loader) = self.loader.take() else {
            return Ok(());
        };
        match loader.end() {
            Ok(manager) => {
                self.manager = Some(manager);
                Ok(())
            }
            Err(err) => {
                log::error!("{err}; restarting paging from scratch");
                self.manager = Some(PageManager::new(self.source.clone(), self.config.page_distance_scale)?);
                Err(err)
            }
        }
    }

    /// Publish the viewer position to the loader thread.
    pub fn update_position(&self, position: DVec2) -> Result<()> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::ThreadState("no loader thread running".into()))?;
        loader.set_position(position - self.origin);
        Ok(())
    }

    /// Apply what the loader staged: unhooks first, then merges.
    ///
    /// Unhooked subtrees go back to the loader, which releases them on its
    /// next cycle.
    pub fn merge_updates(&mut self, graph: &mut SceneGraph) -> MergeReport {
        let changes = self.queue.take_changes();
        let mut report = MergeReport::default();

        let mut detached = Vec::with_capacity(changes.unhooks.len());
        for key in changes.unhooks {
            detached.extend(graph.unhook_tile(key));
            report.unhooked.push(key);
        }
        if !detached.is_empty() {
            self.queue.push_deleted(detached);
        }

        for item in changes.merges {
            match graph.merge_tile(item.key, item.parent, item.content) {
                MergeOutcome::Root(id) => {
                    report.new_roots.push(id);
                    report.merged.push(item.key);
                }
                MergeOutcome::Child(_) => report.merged.push(item.key),
                MergeOutcome::Dropped => report.dropped.push(item.key),
            }
        }

        // after merges, so a load that finished within this drain is not re-marked
        for request in changes.requested {
            if let Some(parent) = request.parent {
                graph.mark_requested(request.key, parent);
            }
        }
        for request in changes.abandoned {
            if let Some(parent) = request.parent {
                graph.clear_requested(request.key, parent);
            }
        }
        report
    }

    /// One frame of paging in whichever mode is configured.
    ///
    /// Starts the loader thread on first use in a threaded mode.
    pub fn update(&mut self, graph: &mut SceneGraph, position: DVec2) -> Result<MergeReport> {
        if self.config.thread_mode == ThreadMode::None {
            let report = self.update_no_thread(graph, position)?;
            return Ok(MergeReport {
                unhooked: report.unloaded,
                merged: report.loaded,
                dropped: Vec::new(),
                new_roots: report.new_roots,
            });
        }
        if self.loader.is_none() {
            self.start_thread()?;
        }
        self.update_position(position)?;
        Ok(self.merge_updates(graph))
    }

    /// Unload everything, synchronously. Stops the loader thread first.
    pub fn unload_all(&mut self, graph: &mut SceneGraph) -> Result<Vec<TileKey>> {
        self.end_thread()?;
        // whatever the thread staged last
        self.merge_updates(graph);
        drop(self.queue.take_deleted());
        drop(std::mem::take(&mut self.released));

        let manager = self.idle_manager()?;
        manager.stop();
        let mut unloaded = Vec::new();
        while let Some(request) = manager.next_unload() {
            manager.ack_unload();
            graph.unhook_tile(request.key);
            unloaded.push(request.key);
        }
        Ok(unloaded)
    }

    /// Paging state, available while no loader thread runs.
    pub fn status(&self) -> Result<PageManagerStatus> {
        match (&self.loader, &self.manager) {
            (None, Some(manager)) => Ok(manager.status()),
            _ => Err(Error::ThreadState("the loader thread owns the page manager".into())),
        }
    }

    pub fn pending_releases(&self) -> usize {
        self.released.len() + self.queue.pending_deletes()
    }
}

impl Drop for TilePager {
    fn drop(&mut self) {
        if let Err(err) = self.end_thread() {
            log::error!("stopping tile loader: {err}");
        }
    }
}
