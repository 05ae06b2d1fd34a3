// src/lease.rs

//! Single-run lease.
//!
//! The OS scheduler, an operator and the hotfolder watcher can all start a
//! chain. A lock file created with create-new semantics makes sure only one
//! chain instance touches the staging directories at a time. A lease older
//! than the configured TTL is treated as abandoned and taken over.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::errors::{FlowchainError, Result};
use crate::fs::FileSystem;
use crate::runlog::Clock;

const SINCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Holder information stored in the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseInfo {
    pub pid: u32,
    pub since: NaiveDateTime,
}

impl LeaseInfo {
    fn render(&self) -> String {
        format!("pid={}\nsince={}\n", self.pid, self.since.format(SINCE_FORMAT))
    }

    fn parse(contents: &str) -> Option<Self> {
        let mut pid = None;
        let mut since = None;
        for line in contents.lines() {
            match line.trim().split_once('=') {
                Some(("pid", v)) => pid = v.trim().parse().ok(),
                Some(("since", v)) => {
                    since = NaiveDateTime::parse_from_str(v.trim(), SINCE_FORMAT).ok()
                }
                _ => {}
            }
        }
        Some(Self {
            pid: pid?,
            since: since?,
        })
    }
}

#[derive(Debug)]
pub struct RunLease {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    info: LeaseInfo,
    held: bool,
}

impl RunLease {
    /// Take the lease at `path`, reclaiming it if the current holder's lease
    /// is older than `ttl`.
    pub fn acquire(
        fs: Arc<dyn FileSystem>,
        path: impl Into<PathBuf>,
        ttl: Duration,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs.create_dir_all(dir)
                .with_context(|| format!("creating lease directory {:?}", dir))?;
        }

        let now = clock.now();
        let info = LeaseInfo {
            pid: std::process::id(),
            since: now,
        };

        // One retry after removing a stale lease.
        for _ in 0..2 {
            if fs.create_new(&path, info.render().as_bytes())? {
                debug!(lease = ?path, pid = info.pid, "lease acquired");
                return Ok(Self {
                    fs,
                    path,
                    info,
                    held: true,
                });
            }

            let existing = fs.read_to_string(&path).unwrap_or_default();
            match LeaseInfo::parse(&existing) {
                Some(holder) if now - holder.since > ttl => {
                    warn!(
                        lease = ?path,
                        pid = holder.pid,
                        since = %holder.since,
                        "reclaiming stale lease"
                    );
                    fs.remove_file(&path)
                        .with_context(|| format!("removing stale lease {:?}", path))?;
                }
                Some(holder) => {
                    return Err(FlowchainError::LeaseHeld {
                        path,
                        pid: holder.pid,
                        since: holder.since.format(SINCE_FORMAT).to_string(),
                    });
                }
                None => {
                    return Err(FlowchainError::LeaseHeld {
                        path,
                        pid: 0,
                        since: "unknown (unreadable lease file)".to_string(),
                    });
                }
            }
        }

        Err(FlowchainError::LeaseHeld {
            path,
            pid: 0,
            since: "unknown (lease re-created concurrently)".to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> LeaseInfo {
        self.info
    }

    /// Release explicitly, surfacing any error. Dropping the lease releases
    /// it too, logging failures instead.
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.fs
            .remove_file(&self.path)
            .with_context(|| format!("removing lease {:?}", self.path))?;
        info!(lease = ?self.path, "lease released");
        Ok(())
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Err(err) = self.fs.remove_file(&self.path) {
            warn!(lease = ?self.path, error = %format!("{err:#}"), "failed to release lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[derive(Debug)]
    struct Fixed(NaiveDateTime);

    impl Clock for Fixed {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn at(hour: u32) -> Fixed {
        Fixed(
            NaiveDate::from_ymd_opt(2026, 10, 17)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    fn setup() -> (MockFileSystem, Arc<dyn FileSystem>) {
        let fs = MockFileSystem::new();
        let handle: Arc<dyn FileSystem> = Arc::new(fs.clone());
        (fs, handle)
    }

    #[test]
    fn second_acquire_is_refused_until_release() {
        let (fs, handle) = setup();
        let ttl = Duration::hours(24);

        let lease = RunLease::acquire(handle.clone(), "/logs/.lock", ttl, &at(9)).unwrap();
        assert!(fs.contents("/logs/.lock").unwrap().contains("since=2026-10-17T09:00:00"));

        let err = RunLease::acquire(handle.clone(), "/logs/.lock", ttl, &at(10)).unwrap_err();
        assert!(matches!(err, FlowchainError::LeaseHeld { .. }));

        lease.release().unwrap();
        assert!(!fs.exists(Path::new("/logs/.lock")));
        RunLease::acquire(handle, "/logs/.lock", ttl, &at(10)).unwrap();
    }

    #[test]
    fn drop_releases() {
        let (fs, handle) = setup();
        {
            let _lease =
                RunLease::acquire(handle, "/logs/.lock", Duration::hours(1), &at(9)).unwrap();
            assert!(fs.exists(Path::new("/logs/.lock")));
        }
        assert!(!fs.exists(Path::new("/logs/.lock")));
    }

    #[test]
    fn stale_lease_is_reclaimed() {
        let (fs, handle) = setup();
        fs.add_file("/logs/.lock", "pid=4242\nsince=2026-10-16T08:00:00\n");

        let lease = RunLease::acquire(handle, "/logs/.lock", Duration::hours(24), &at(9)).unwrap();
        assert_eq!(lease.info().pid, std::process::id());
        assert!(fs.contents("/logs/.lock").unwrap().contains("since=2026-10-17T09:00:00"));
    }

    #[test]
    fn unreadable_lease_counts_as_held() {
        let (fs, handle) = setup();
        fs.add_file("/logs/.lock", "garbage");
        let err = RunLease::acquire(handle, "/logs/.lock", Duration::hours(1), &at(9)).unwrap_err();
        assert!(matches!(err, FlowchainError::LeaseHeld { pid: 0, .. }));
        assert_eq!(fs.contents("/logs/.lock").as_deref(), Some("garbage"));
    }
}
