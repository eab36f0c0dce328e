// SPDX-License-Identifier: GPL-3.0-only

//! Device discovery and session registry
//!
//! The discovery provides:
//! - Periodic rescans of the device namespace in a background thread
//! - A session per capture-capable device, removed when the device vanishes
//! - Thread-safe registry access
//!
//! The registry lock is held only to look up, add or remove entries; device
//! checks and session creation happen outside it. A registered session stays
//! until its path stops enumerating.

use super::frame_loop::{LoopAction, LoopController};
use super::session::{DeviceSession, SessionOptions, SharedSession};
use super::v4l2_device::V4l2Provider;
use super::{DeviceProvider, FeedEvents, NoopEvents, SharedDevice};
use crate::config::CaptureConfig;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives registry changes
///
/// Callbacks run on the discovery thread without the registry lock held.
pub trait DiscoveryListener: Send + Sync {
    /// A session was created for a newly appeared device
    fn feed_added(&self, _session: &SharedSession) {}

    /// A session was removed; it has already been deactivated
    fn feed_removed(&self, _session: &SharedSession) {}

    /// Events sink for the session about to be created for `path`
    fn feed_events(&self, _path: &str) -> Arc<dyn FeedEvents> {
        Arc::new(NoopEvents)
    }
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl DiscoveryListener for NoopListener {}

/// Outcome of one rescan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

type Registry = Arc<Mutex<HashMap<String, SharedSession>>>;

/// State shared between the handle and the discovery thread
struct DiscoveryContext {
    provider: Arc<dyn DeviceProvider>,
    registry: Registry,
    listener: Arc<dyn DiscoveryListener>,
    options: SessionOptions,
}

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<String, SharedSession>> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl DiscoveryContext {
    /// Open a new candidate and check it can stream captured frames
    fn qualify(&self, path: &str) -> Option<SharedDevice> {
        let device = match self.provider.open(path) {
            Ok(device) => device,
            Err(e) => {
                debug!(device = %path, error = %e, "Candidate could not be opened");
                return None;
            }
        };

        match device.query_capability() {
            Ok(capability) if !capability.is_video_capture() => {
                debug!(device = %path, "Candidate is not a video capture device");
                return None;
            }
            Ok(capability) if !capability.supports_streaming() => {
                debug!(device = %path, "Candidate has no streaming I/O");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(device = %path, error = %e, "Capability query failed");
                return None;
            }
        }

        if let Err(e) = device.get_format() {
            debug!(device = %path, error = %e, "Current format cannot be queried");
            return None;
        }

        Some(device)
    }

    fn rescan(&self) -> RescanSummary {
        let known: HashSet<String> = lock_registry(&self.registry).keys().cloned().collect();
        let present: HashSet<String> = self.provider.scan().into_iter().collect();

        // Registered devices are not reopened; a busy node must not look unplugged
        let mut fresh = Vec::new();
        for path in present.iter().filter(|path| !known.contains(*path)) {
            if let Some(device) = self.qualify(path) {
                fresh.push((path.clone(), device));
            }
        }
        fresh.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summary = RescanSummary::default();

        for (path, device) in fresh {
            let events = self.listener.feed_events(&path);
            let session = Arc::new(Mutex::new(DeviceSession::new(device, self.options, events)));

            let inserted = {
                let mut registry = lock_registry(&self.registry);
                if registry.contains_key(&path) {
                    false
                } else {
                    registry.insert(path.clone(), Arc::clone(&session));
                    true
                }
            };

            if inserted {
                info!(device = %path, "Capture device added");
                self.listener.feed_added(&session);
                summary.added.push(path);
            }
        }

        let removed: Vec<(String, SharedSession)> = {
            let mut registry = lock_registry(&self.registry);
            let gone: Vec<String> = registry
                .keys()
                .filter(|path| !present.contains(*path))
                .cloned()
                .collect();
            gone.into_iter()
                .filter_map(|path| registry.remove(&path).map(|session| (path, session)))
                .collect()
        };

        for (path, session) in removed {
            {
                let mut session = match session.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if session.is_active()
                    && let Err(e) = session.deactivate()
                {
                    warn!(device = %path, error = %e, "Failed to deactivate removed device");
                }
            }
            info!(device = %path, "Capture device removed");
            self.listener.feed_removed(&session);
            summary.removed.push(path);
        }

        summary
    }
}

/// Discovers capture devices and keeps one session per device
pub struct DeviceDiscovery {
    context: Arc<DiscoveryContext>,
    interval: Duration,
    worker: Option<LoopController<Arc<DiscoveryContext>>>,
}

impl DeviceDiscovery {
    /// Create a discovery over any device provider
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        options: SessionOptions,
        interval: Duration,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Self {
        Self {
            context: Arc::new(DiscoveryContext {
                provider,
                registry: Arc::new(Mutex::new(HashMap::new())),
                listener,
                options,
            }),
            interval,
            worker: None,
        }
    }

    /// Create a discovery over V4L2 nodes as configured
    pub fn from_config(config: &CaptureConfig, listener: Arc<dyn DiscoveryListener>) -> Self {
        let provider = V4l2Provider::new(config.device_dir.clone(), config.device_prefix.clone());
        Self::new(
            Arc::new(provider),
            SessionOptions::from(config),
            config.discovery_interval(),
            listener,
        )
    }

    /// Run one rescan synchronously
    pub fn rescan(&self) -> RescanSummary {
        self.context.rescan()
    }

    /// Start periodic rescans in a background thread
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let interval = self.interval;
        let worker = LoopController::start(
            "device-discovery",
            Arc::clone(&self.context),
            move |context: &mut Arc<DiscoveryContext>| {
                let summary = context.rescan();
                if !summary.added.is_empty() || !summary.removed.is_empty() {
                    debug!(
                        added = summary.added.len(),
                        removed = summary.removed.len(),
                        "Rescan changed the registry"
                    );
                }
                LoopAction::Wait(interval)
            },
        )?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the background thread; registered sessions stay in place
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.is_running())
    }

    /// Registered sessions, ordered by device path
    pub fn sessions(&self) -> Vec<SharedSession> {
        let registry = lock_registry(&self.context.registry);
        let mut entries: Vec<_> = registry.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, session)| Arc::clone(session))
            .collect()
    }

    pub fn session(&self, path: &str) -> Option<SharedSession> {
        lock_registry(&self.context.registry).get(path).cloned()
    }

    /// Registered device paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock_registry(&self.context.registry)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        lock_registry(&self.context.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DeviceDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}
