//! Background tile loader thread
//!
//! The thread owns the [`PageManager`] while it runs. Each cycle it picks up
//! the latest viewer position, stages every unload as an unhook, releases
//! the subtrees the graph owner handed back, and performs one blocking load,
//! noting the request before it starts and any failure after.
//! Cancellation is cooperative and checked between those steps.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::core::types::DVec2;
use crate::core::{Error, Result};
use crate::tile::{TileContent, TileKey, TileSource, TileUnavailable};

use super::change_queue::{ChangeQueue, MergeItem};
use super::config::ThreadMode;
use super::managed_tile::{LoadOutcome, TileRequest};
use super::page_manager::PageManager;

/// Load one tile, turning a panicking source into an unavailable tile.
pub(crate) fn fetch_tile(source: &dyn TileSource, key: TileKey) -> std::result::Result<TileContent, TileUnavailable> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.load_tile(key))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("tile source panicked loading {key}: {reason}");
            Err(TileUnavailable::new(key, format!("source panicked: {reason}")))
        }
    }
}

struct Shared {
    /// Latest position not yet picked up by the thread.
    position: Mutex<Option<DVec2>>,
    wake: Condvar,
    cancel: AtomicBool,
}

impl Shared {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Handle to a running loader thread.
pub struct BackgroundLoader {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<PageManager>>,
}

impl BackgroundLoader {
    /// Start the loader. `mode` must be `Synchronous` or `Background`.
    pub fn spawn(
        manager: PageManager,
        source: Arc<dyn TileSource>,
        queue: Arc<ChangeQueue>,
        mode: ThreadMode,
    ) -> Result<Self> {
        if mode == ThreadMode::None {
            return Err(Error::ThreadState("thread mode `none` has no loader thread".into()));
        }

        let shared = Arc::new(Shared {
            position: Mutex::new(None),
            wake: Condvar::new(),
            cancel: AtomicBool::new(false),
        });
        let worker = LoaderWorker {
            manager,
            source,
            queue,
            shared: shared.clone(),
            mode,
        };
        let handle = thread::Builder::new()
            .name("tile-loader".into())
            .spawn(move || worker.run())?;

        log::info!("tile loader started ({mode:?})");
        Ok(Self { shared, handle: Some(handle) })
    }

    /// Publish a new viewer position; only the latest one is kept.
    pub fn set_position(&self, position: DVec2) {
        *self.shared.position.lock().unwrap_or_else(PoisonError::into_inner) = Some(position);
        self.shared.wake.notify_one();
    }

    /// Ask the thread to stop after its current unit of work.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
        // lock so the flag cannot slip between the thread's check and its wait
        let _guard = self.shared.position.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.wake.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the thread to exit and take back its page manager.
    pub fn join(mut self) -> Result<PageManager> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::ThreadState("loader already joined".into()))?;
        let manager = handle
            .join()
            .map_err(|_| Error::ThreadState("loader thread panicked".into()))?;
        log::info!("tile loader stopped");
        Ok(manager)
    }

    /// Cancel, wake and join.
    pub fn end(self) -> Result<PageManager> {
        self.cancel();
        self.join()
    }
}

impl Drop for BackgroundLoader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel();
            if handle.join().is_err() {
                log::error!("tile loader thread panicked");
            }
        }
    }
}

struct LoaderWorker {
    manager: PageManager,
    source: Arc<dyn TileSource>,
    queue: Arc<ChangeQueue>,
    shared: Arc<Shared>,
    mode: ThreadMode,
}

impl LoaderWorker {
    fn run(mut self) -> PageManager {
        while let Some(position) = self.wait_for_work() {
            if let Some(position) = position {
                self.manager.set_location(position);
            }

            let mut unhooks = Vec::new();
            while let Some(request) = self.manager.next_unload() {
                self.manager.ack_unload();
                unhooks.push(request.key);
            }
            if !unhooks.is_empty() {
                log::trace!("staging {} unhooks", unhooks.len());
                self.queue.push_unhooks(unhooks);
            }

            drop(self.queue.take_deleted());

            if self.shared.cancelled() {
                break;
            }

            if let Some(request) = self.manager.next_load() {
                self.queue.push_requested(request);
                self.load(request);
            }
        }
        self.manager
    }

    /// Block until there is something to do. `None` means cancelled;
    /// `Some(None)` means keep paging without a new position.
    fn wait_for_work(&self) -> Option<Option<DVec2>> {
        let mut slot = self.shared.position.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.shared.cancelled() {
                return None;
            }
            if let Some(position) = slot.take() {
                return Some(Some(position));
            }
            if self.mode == ThreadMode::Background && self.manager.has_pending_work() {
                return Some(None);
            }
            slot = self.shared.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn load(&mut self, request: TileRequest) {
        let result = fetch_tile(self.source.as_ref(), request.key);

        if self.shared.cancelled() {
            self.manager.ack_load(LoadOutcome::Cancelled);
            self.queue.push_abandoned(request);
            return;
        }

        match result {
            Ok(content) => {
                self.manager.ack_load(LoadOutcome::Loaded { children: content.children.clone() });
                self.queue.push_merge(MergeItem {
                    key: request.key,
                    parent: request.parent,
                    content,
                });
            }
            Err(err) => {
                log::warn!("{err}");
                self.manager.ack_load(LoadOutcome::Unavailable);
                self.queue.push_abandoned(request);
            }
        }
    }
}
