//! Retention engine.
//!
//! Keeps one bounded queue of archives per granularity. A run first decides
//! which granularities are due (no archive yet in the current calendar
//! bucket), then evicts the oldest archives so that each queue has room for
//! the archive about to be written.

pub mod archive;
pub mod granularity;
pub mod policy;

pub use archive::{archive_filename, list_archives, BackupArchive};
pub use granularity::Granularity;
pub use policy::RetentionPolicy;

use crate::utils::{BackupError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Existing archives grouped by granularity, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSet {
    by_granularity: BTreeMap<Granularity, Vec<BackupArchive>>,
}

impl ArchiveSet {
    pub fn new(archives: Vec<BackupArchive>) -> Self {
        let mut by_granularity: BTreeMap<Granularity, Vec<BackupArchive>> = BTreeMap::new();
        for archive in archives {
            by_granularity
                .entry(archive.granularity)
                .or_default()
                .push(archive);
        }
        // Equal timestamps fall back to filename so eviction order is stable.
        for list in by_granularity.values_mut() {
            list.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.filename.cmp(&b.filename))
            });
        }
        Self { by_granularity }
    }

    /// Archives of one granularity, oldest first.
    pub fn get(&self, granularity: Granularity) -> &[BackupArchive] {
        self.by_granularity
            .get(&granularity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, granularity: Granularity) -> usize {
        self.get(granularity).len()
    }

    pub fn len(&self) -> usize {
        self.by_granularity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Granularities due this run, finest first.
///
/// A granularity is due when its cap is non-zero and none of its archives
/// falls in the same bucket as `now`.
pub fn compute_pending(
    now: &NaiveDateTime,
    policy: &RetentionPolicy,
    backups: &ArchiveSet,
) -> Vec<Granularity> {
    Granularity::ALL
        .into_iter()
        .filter(|g| policy.is_enabled(*g))
        .filter(|g| {
            let current = g.bucket_key(now);
            !backups
                .get(*g)
                .iter()
                .any(|archive| g.bucket_key(&archive.created_at) == current)
        })
        .collect()
}

/// Delete the oldest archives of each granularity until it fits its
/// effective cap: `max_count`, minus one reserved slot when the granularity
/// is pending. Returns the evicted archives.
pub fn evict(
    policy: &RetentionPolicy,
    backups: &mut ArchiveSet,
    pending: &[Granularity],
) -> Result<Vec<BackupArchive>> {
    let mut evicted = Vec::new();

    for granularity in Granularity::ALL {
        let reserved = usize::from(pending.contains(&granularity));
        let cap = policy.max_count(granularity).saturating_sub(reserved);

        let Some(list) = backups.by_granularity.get_mut(&granularity) else {
            continue;
        };

        while list.len() > cap {
            let oldest = list.remove(0);
            match std::fs::remove_file(&oldest.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(file = %oldest.filename, "Archive already gone");
                }
                Err(e) => return Err(BackupError::fs(&oldest.path, e)),
            }
            info!(tag = %granularity, file = %oldest.filename, "Deleted old backup");
            evicted.push(oldest);
        }
    }

    Ok(evicted)
}

/// Retention state of one target for one run, computed once up front and
/// passed through the rest of the run.
#[derive(Debug, Clone)]
pub struct RetentionPlan {
    /// Archives retained after eviction
    pub archives: ArchiveSet,

    /// Granularities to create an archive for this run
    pub pending: Vec<Granularity>,

    /// Archives deleted to make room
    pub evicted: Vec<BackupArchive>,
}

impl RetentionPlan {
    /// List `archive_dir`, compute the pending set from the pre-run state,
    /// then evict.
    pub fn prepare(
        archive_dir: &Path,
        hostname: &str,
        policy: &RetentionPolicy,
        now: &NaiveDateTime,
    ) -> Result<Self> {
        let mut archives = ArchiveSet::new(list_archives(archive_dir, hostname)?);
        let pending = compute_pending(now, policy, &archives);
        let evicted = evict(policy, &mut archives, &pending)?;

        Ok(Self {
            archives,
            pending,
            evicted,
        })
    }

    pub fn is_due(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HOST: &str = "www.example.com";

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    fn touch(dir: &Path, granularity: Granularity, at: NaiveDateTime) -> PathBuf {
        let path = dir.join(archive_filename(granularity, &at, HOST));
        fs::write(&path, b"archive").unwrap();
        path
    }

    fn descriptor(granularity: Granularity, at: NaiveDateTime, filename: &str) -> BackupArchive {
        BackupArchive {
            granularity,
            created_at: at,
            filename: filename.to_string(),
            hostname: HOST.to_string(),
            path: PathBuf::from(filename),
        }
    }

    #[test]
    fn test_daily_scenario_reserves_slot() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = t0();
        let oldest = touch(dir, Granularity::Daily, now - Duration::hours(50));
        let newer = touch(dir, Granularity::Daily, now - Duration::hours(26));
        let policy = RetentionPolicy::disabled().with(Granularity::Daily, 2);

        let plan = RetentionPlan::prepare(dir, HOST, &policy, &now)?;

        assert_eq!(plan.pending, vec![Granularity::Daily]);
        assert_eq!(plan.evicted.len(), 1);
        assert!(!oldest.exists());
        assert!(newer.exists());
        assert_eq!(plan.archives.count(Granularity::Daily), 1);
        Ok(())
    }

    #[test]
    fn test_same_bucket_is_not_pending() {
        let now = t0();
        let policy = RetentionPolicy::disabled()
            .with(Granularity::Hourly, 5)
            .with(Granularity::Daily, 5);
        let set = ArchiveSet::new(vec![
            descriptor(Granularity::Daily, now - Duration::hours(13), "d"),
            descriptor(Granularity::Hourly, now - Duration::minutes(61), "h"),
        ]);

        // Daily already has an archive from 01:00 today; hourly is from 12:59.
        assert_eq!(compute_pending(&now, &policy, &set), vec![Granularity::Hourly]);
    }

    #[test]
    fn test_disabled_granularity_is_never_pending_and_drains() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = t0();
        touch(dir, Granularity::Monthly, now - Duration::days(40));
        touch(dir, Granularity::Monthly, now - Duration::days(70));
        let policy = RetentionPolicy::disabled();

        let plan = RetentionPlan::prepare(dir, HOST, &policy, &now)?;

        assert!(!plan.is_due());
        assert_eq!(plan.evicted.len(), 2);
        assert!(plan.archives.is_empty());
        Ok(())
    }

    #[test]
    fn test_not_pending_keeps_full_cap() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = t0();
        touch(dir, Granularity::Daily, now - Duration::hours(1));
        touch(dir, Granularity::Daily, now - Duration::hours(30));
        let policy = RetentionPolicy::disabled().with(Granularity::Daily, 2);

        let plan = RetentionPlan::prepare(dir, HOST, &policy, &now)?;

        assert!(plan.pending.is_empty());
        assert!(plan.evicted.is_empty());
        assert_eq!(plan.archives.count(Granularity::Daily), 2);
        Ok(())
    }

    #[test]
    fn test_equal_timestamps_evict_by_filename() -> Result<()> {
        let now = t0();
        let mut set = ArchiveSet::new(vec![
            descriptor(Granularity::Yearly, now, "yearly_b"),
            descriptor(Granularity::Yearly, now, "yearly_a"),
        ]);
        let policy = RetentionPolicy::disabled().with(Granularity::Yearly, 1);

        let evicted = evict(&policy, &mut set, &[])?;

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].filename, "yearly_a");
        assert_eq!(set.get(Granularity::Yearly)[0].filename, "yearly_b");
        Ok(())
    }

    #[test]
    fn test_cap_holds_across_many_runs() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let policy = RetentionPolicy::disabled()
            .with(Granularity::Hourly, 3)
            .with(Granularity::Daily, 2)
            .with(Granularity::Weekly, 1);

        let mut now = t0();
        for _ in 0..(4 * 24 * 2) {
            let plan = RetentionPlan::prepare(dir, HOST, &policy, &now)?;
            for g in Granularity::ALL {
                let reserved = usize::from(plan.pending.contains(&g));
                assert!(plan.archives.count(g) + reserved <= policy.max_count(g));
            }
            for g in &plan.pending {
                touch(dir, *g, now);
            }

            let after = ArchiveSet::new(list_archives(dir, HOST)?);
            for g in Granularity::ALL {
                assert!(after.count(g) <= policy.max_count(g));
            }
            now += Duration::minutes(30);
        }

        let after = ArchiveSet::new(list_archives(dir, HOST)?);
        assert_eq!(after.count(Granularity::Hourly), 3);
        assert_eq!(after.count(Granularity::Daily), 2);
        assert_eq!(after.count(Granularity::Weekly), 1);
        Ok(())
    }
}
