//! Filesystem watching for directory catalogs
//!
//! The OS watcher pushes [`FsEvent`]s into a bounded channel; a single
//! pump thread drains it, waits for the debounce window to go quiet and
//! then calls [`DirectoryCatalog::refresh`] once for the whole burst.
//!
//! When the channel is full new events are dropped and the pump is flagged
//! as overflowed. An overflow forces one rescan after the burst, whatever
//! the events that did get through were about; a rescan looks at the whole
//! directory rather than at individual events.

use crate::directory::DirectoryCatalog;
use mosaic_core::{MosaicError, MosaicResult};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// File created
    Created,
    /// File contents or metadata changed
    Modified,
    /// File deleted
    Removed,
    /// File renamed (either side of the rename)
    Renamed,
}

/// One filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Affected path
    pub path: PathBuf,
    /// What happened
    pub kind: FsEventKind,
}

impl FsEvent {
    /// Event for `path`
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Translate a notify event; access and unclassified events are ignored
fn translate(event: notify::Event) -> Vec<FsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Remove(_) => FsEventKind::Removed,
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Renamed,
        EventKind::Modify(_) => FsEventKind::Modified,
        _ => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .map(|path| FsEvent { path, kind })
        .collect()
}

/// Pump counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Events accepted into the channel
    pub received: u64,
    /// Events dropped because the channel was full
    pub dropped: u64,
    /// Rescans performed
    pub refreshes: u64,
    /// Rescans that failed
    pub failures: u64,
}

#[derive(Default)]
struct PumpCounters {
    received: AtomicU64,
    dropped: AtomicU64,
    refreshes: AtomicU64,
    failures: AtomicU64,
    /// Set when an event is dropped, cleared by the pump
    overflowed: AtomicBool,
}

/// Cloneable producer side of a [`WatchPump`]
#[derive(Clone)]
pub struct EventSender {
    sender: SyncSender<FsEvent>,
    counters: Arc<PumpCounters>,
}

impl EventSender {
    /// Offer an event without blocking
    ///
    /// Returns `false` once the pump has shut down. A full channel drops the
    /// event and still returns `true`.
    pub fn submit(&self, event: FsEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.counters.overflowed.store(true, Ordering::Release);
                debug!(target: "mosaic::watch", path = %event.path.display(), "Event channel full, dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Debouncing consumer that turns event bursts into catalog refreshes
pub struct WatchPump {
    sender: EventSender,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WatchPump {
    /// Start the pump thread for `catalog`
    ///
    /// Debounce window and channel capacity come from the catalog's options.
    pub fn spawn(catalog: Arc<DirectoryCatalog>) -> MosaicResult<Self> {
        let (sender, receiver) = mpsc::sync_channel(catalog.options().channel_capacity.max(1));
        let counters = Arc::new(PumpCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let counters = Arc::clone(&counters);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("mosaic-watch".to_string())
                .spawn(move || pump_loop(catalog, receiver, counters, shutdown))?
        };

        Ok(Self {
            sender: EventSender { sender, counters },
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Producer handle for feeding events
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Offer one event
    pub fn submit(&self, event: FsEvent) -> bool {
        self.sender.submit(event)
    }

    /// Current counters
    pub fn stats(&self) -> WatchStats {
        let c = &self.sender.counters;
        WatchStats {
            received: c.received.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// Stop the pump thread and wait for it; idempotent
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!(target: "mosaic::watch", "Watch pump thread panicked");
            }
        }
    }
}

impl Drop for WatchPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump_loop(
    catalog: Arc<DirectoryCatalog>,
    receiver: Receiver<FsEvent>,
    counters: Arc<PumpCounters>,
    shutdown: Arc<AtomicBool>,
) {
    let debounce = catalog.options().debounce;
    let mut relevant = false;
    let mut dirty = false;

    while !shutdown.load(Ordering::Acquire) {
        // A dropped event may have been the only relevant one
        if counters.overflowed.swap(false, Ordering::AcqRel) {
            relevant = true;
            dirty = true;
        }
        let wait = if dirty { debounce } else { SHUTDOWN_POLL };
        match receiver.recv_timeout(wait) {
            Ok(event) => {
                // Directories matter too: removing one removes its sources
                relevant |= catalog.options().matches(&event.path)
                    || event.path.extension().is_none();
                dirty = true;
            }
            Err(RecvTimeoutError::Timeout) => {
                if dirty && relevant {
                    counters.refreshes.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = catalog.refresh() {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "mosaic::watch", error = %e, "Catalog refresh failed");
                    }
                }
                dirty = false;
                relevant = false;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(target: "mosaic::watch", path = %catalog.path().display(), "Watch pump stopped");
}

/// Keeps an OS watcher and its pump alive for one directory catalog
pub struct CatalogWatcher {
    // Dropped first so the OS stops producing before the pump stops
    watcher: Option<RecommendedWatcher>,
    pump: WatchPump,
}

impl CatalogWatcher {
    /// Watch `catalog`'s directory and refresh it on change
    pub fn start(catalog: Arc<DirectoryCatalog>) -> MosaicResult<Self> {
        let path = catalog.path().to_path_buf();
        let mode = if catalog.options().recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        let pump = WatchPump::spawn(catalog)?;
        let sender = pump.sender();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for fs_event in translate(event) {
                        sender.submit(fs_event);
                    }
                }
                Err(e) => warn!(target: "mosaic::watch", error = %e, "Watcher error"),
            },
        )
        .map_err(watch_error)?;
        watcher.watch(&path, mode).map_err(watch_error)?;

        info!(target: "mosaic::watch", path = %path.display(), "Watching catalog directory");
        Ok(Self {
            watcher: Some(watcher),
            pump,
        })
    }

    /// The pump behind this watcher
    pub fn pump(&self) -> &WatchPump {
        &self.pump
    }

    /// Current pump counters
    pub fn stats(&self) -> WatchStats {
        self.pump.stats()
    }
}

impl Drop for CatalogWatcher {
    fn drop(&mut self) {
        self.watcher.take();
        self.pump.shutdown();
    }
}

fn watch_error(e: notify::Error) -> MosaicError {
    MosaicError::Watch {
        message: e.to_string(),
    }
}
