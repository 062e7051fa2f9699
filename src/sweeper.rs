//! Retention sweeper: periodic TTL-based artifact removal
//!
//! Runs as a background tokio task on the server's runtime, scanning
//! both storage directories on a fixed interval and deleting entries
//! whose mtime is older than the retention TTL. Errors on individual
//! files are logged and skipped — one unreadable entry never aborts
//! the rest of the pass. Deletion deliberately races in-flight
//! fetches: a reader that loses the race sees `NotFound`, never
//! partial bytes.

use crate::store::{ArtifactKind, ArtifactStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters from a single sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Whether an entry with the given mtime has outlived the TTL
fn is_expired(modified: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > ttl,
        // mtime in the future (clock skew): leave it alone
        Err(_) => false,
    }
}

/// Periodic artifact expiry task
pub struct RetentionSweeper {
    store: Arc<ArtifactStore>,
    ttl: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<ArtifactStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            ttl,
            interval,
        }
    }

    /// Spawn the sweep loop; it exits between passes when `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Retention sweeper started (interval {:?}, TTL {:?})",
                self.interval, self.ttl
            );
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick of a tokio interval fires immediately;
            // consume it so passes run on the interval, not at startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Retention sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = self.sweep_once().await;
                        if stats.removed > 0 || stats.failed > 0 {
                            info!(
                                "Sweep pass: {} scanned, {} removed, {} failed",
                                stats.scanned, stats.removed, stats.failed
                            );
                        } else {
                            debug!("Sweep pass: {} scanned, nothing expired", stats.scanned);
                        }
                    }
                }
            }
        })
    }

    /// Run one sweep pass over both directories
    pub async fn sweep_once(&self) -> SweepStats {
        let now = SystemTime::now();
        let mut stats = SweepStats::default();
        for kind in [ArtifactKind::Original, ArtifactKind::Derived] {
            self.sweep_dir(kind, now, &mut stats).await;
        }
        stats
    }

    async fn sweep_dir(&self, kind: ArtifactKind, now: SystemTime, stats: &mut SweepStats) {
        let dir = self.store.dir(kind);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Sweep cannot list {}: {}", dir.display(), e);
                stats.failed += 1;
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Sweep cannot read entry in {}: {}", dir.display(), e);
                    stats.failed += 1;
                    break;
                }
            };
            stats.scanned += 1;

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    // Already deleted by a racing pass, or unreadable
                    warn!("Sweep cannot stat {:?}: {}", entry.file_name(), e);
                    stats.failed += 1;
                    continue;
                }
            };

            if !is_expired(modified, now, self.ttl) {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!("Sweep removed expired artifact {:?}", entry.file_name());
                    stats.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Lost a delete race; the goal is met either way
                }
                Err(e) => {
                    warn!("Sweep failed to remove {:?}: {}", entry.file_name(), e);
                    stats.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary() {
        let ttl = Duration::from_secs(3600);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100_000);

        // 59 minutes old: survives
        let fresh = now - Duration::from_secs(59 * 60);
        assert!(!is_expired(fresh, now, ttl));

        // 61 minutes old: expired
        let stale = now - Duration::from_secs(61 * 60);
        assert!(is_expired(stale, now, ttl));

        // Exactly at the TTL: survives (strictly-older-than semantics)
        let edge = now - ttl;
        assert!(!is_expired(edge, now, ttl));
    }

    #[test]
    fn future_mtime_is_not_expired() {
        let ttl = Duration::from_secs(1);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100_000);
        let future = now + Duration::from_secs(60);
        assert!(!is_expired(future, now, ttl));
    }
}
