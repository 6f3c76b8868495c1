//! Snapshot lifecycle
//!
//! Layout under the storage root:
//!
//! ```text
//! daily/20250601_120000_000/
//!     marketplaces.json.gz
//!     ...
//!     manifest.toml      # BackupSnapshot
//!     manifest.sha256    # checksum of manifest.toml
//! weekly/...
//! monthly/...
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::retention::{RetentionPolicy, Tier};
use super::store::BackupStorage;
use crate::aggregate::{ARTIFACT_FILES, MARKETPLACES_FILE, PLUGINS_FILE};
use crate::error::{Result, ScoutError};

const MANIFEST_FILE: &str = "manifest.toml";
const CHECKSUM_FILE: &str = "manifest.sha256";
const GZ_SUFFIX: &str = ".gz";

/// Compute content hash
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// What caused a snapshot to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupTrigger {
    /// End of a successful pipeline run
    Run,
    /// `backup create`
    Manual,
    /// Taken automatically before a restore
    PreRestore,
}

impl BackupTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Manual => "manual",
            Self::PreRestore => "pre-restore",
        }
    }

    /// Whether a snapshot with this trigger may be promoted
    pub fn is_promotable(&self) -> bool {
        !matches!(self, Self::PreRestore)
    }
}

impl std::fmt::Display for BackupTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub marketplaces: u64,
    pub plugins: u64,
}

/// One artifact inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Artifact file name
    pub name: String,
    /// Name inside the snapshot (with `.gz` when compressed)
    pub stored_as: String,
    /// Checksum of the original (uncompressed) bytes
    pub checksum: String,
    pub size: u64,
}

/// A snapshot manifest. Never rewritten once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub id: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub trigger: BackupTrigger,
    pub compressed: bool,
    pub source: String,
    pub counts: SnapshotCounts,
    pub files: Vec<SnapshotFile>,
    /// Checksum of the stored manifest, read from the sidecar
    #[serde(skip)]
    pub manifest_checksum: String,
}

impl BackupSnapshot {
    pub fn display_time(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub snapshot: BackupSnapshot,
    pub restored: usize,
    /// Artifacts the snapshot does not contain, deleted from the target
    pub removed: Vec<String>,
    /// Snapshot of the state that was overwritten, if there was any
    pub pre_restore: Option<BackupSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// `(tier, id)` of promoted copies
    pub promoted: Vec<(Tier, String)>,
    /// `(tier, id)` of deleted snapshots
    pub pruned: Vec<(Tier, String)>,
}

/// Creates, verifies, restores and rotates snapshots
pub struct BackupManager {
    storage: Box<dyn BackupStorage>,
    policy: RetentionPolicy,
    compress: bool,
}

fn key(tier: Tier, id: &str, file: &str) -> String {
    format!("{}/{}/{}", tier.as_str(), id, file)
}

fn snapshot_key(tier: Tier, id: &str) -> String {
    format!("{}/{}", tier.as_str(), id)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

fn count_in(source: &Path, file: &str) -> u64 {
    fs::read_to_string(source.join(file))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|doc| doc["total"].as_u64())
        .unwrap_or(0)
}

impl BackupManager {
    pub fn new(storage: Box<dyn BackupStorage>, policy: RetentionPolicy, compress: bool) -> Self {
        Self {
            storage,
            policy,
            compress,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Snapshot `source` into the daily tier, then promote and prune
    pub fn create(&self, source: &Path, trigger: BackupTrigger) -> Result<BackupSnapshot> {
        self.create_at(source, trigger, Utc::now())
    }

    pub fn create_at(
        &self,
        source: &Path,
        trigger: BackupTrigger,
        now: DateTime<Utc>,
    ) -> Result<BackupSnapshot> {
        let snapshot = self.write_snapshot(source, trigger, now)?;
        let report = self.maintain(now)?;
        for (tier, id) in &report.promoted {
            tracing::info!("Promoted snapshot {} into {}", id, tier);
        }
        for (tier, id) in &report.pruned {
            tracing::info!("Pruned {} snapshot {}", tier, id);
        }
        Ok(snapshot)
    }

    fn write_snapshot(
        &self,
        source: &Path,
        trigger: BackupTrigger,
        now: DateTime<Utc>,
    ) -> Result<BackupSnapshot> {
        if !source.is_dir() {
            return Err(ScoutError::OutputNotFound {
                path: source.to_path_buf(),
            });
        }

        let base_id = now.format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut id = base_id.clone();
        let mut n = 1;
        while self.storage.exists(&snapshot_key(Tier::Daily, &id)) {
            id = format!("{}_{}", base_id, n);
            n += 1;
        }

        let mut files = Vec::new();
        for name in ARTIFACT_FILES {
            let path = source.join(name);
            if !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path)?;
            let (stored_as, stored) = if self.compress {
                (format!("{}{}", name, GZ_SUFFIX), gzip(&bytes)?)
            } else {
                (name.to_string(), bytes.clone())
            };
            self.storage
                .put(&key(Tier::Daily, &id, &stored_as), &stored)?;
            files.push(SnapshotFile {
                name: name.to_string(),
                stored_as,
                checksum: compute_hash(&bytes),
                size: bytes.len() as u64,
            });
        }

        if files.is_empty() {
            self.storage.delete(&snapshot_key(Tier::Daily, &id))?;
            return Err(ScoutError::OutputNotFound {
                path: source.to_path_buf(),
            });
        }

        let mut snapshot = BackupSnapshot {
            id,
            tier: Tier::Daily,
            created_at: now,
            trigger,
            compressed: self.compress,
            source: source.to_string_lossy().to_string(),
            counts: SnapshotCounts {
                marketplaces: count_in(source, MARKETPLACES_FILE),
                plugins: count_in(source, PLUGINS_FILE),
            },
            files,
            manifest_checksum: String::new(),
        };
        snapshot.manifest_checksum = self.store_manifest(&snapshot)?;

        tracing::info!(
            "Created snapshot {} ({} files, trigger {})",
            snapshot.id,
            snapshot.files.len(),
            snapshot.trigger
        );
        Ok(snapshot)
    }

    fn store_manifest(&self, snapshot: &BackupSnapshot) -> Result<String> {
        let content = toml::to_string_pretty(snapshot)?;
        let checksum = compute_hash(content.as_bytes());
        self.storage
            .put(&key(snapshot.tier, &snapshot.id, MANIFEST_FILE), content.as_bytes())?;
        self.storage
            .put(&key(snapshot.tier, &snapshot.id, CHECKSUM_FILE), checksum.as_bytes())?;
        Ok(checksum)
    }

    fn load_manifest(&self, tier: Tier, id: &str) -> Result<BackupSnapshot> {
        let bytes = self.storage.get(&key(tier, id, MANIFEST_FILE))?;
        let content = String::from_utf8_lossy(&bytes);
        let mut snapshot: BackupSnapshot = toml::from_str(&content)?;
        snapshot.manifest_checksum = String::from_utf8_lossy(
            &self.storage.get(&key(tier, id, CHECKSUM_FILE)).unwrap_or_default(),
        )
        .trim()
        .to_string();
        Ok(snapshot)
    }

    /// Snapshots of one tier, oldest first; unreadable ones are skipped
    pub fn list_tier(&self, tier: Tier) -> Result<Vec<BackupSnapshot>> {
        let mut snapshots = Vec::new();
        for id in self.storage.list(tier.as_str())? {
            match self.load_manifest(tier, &id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => tracing::warn!("Skipping unreadable snapshot {}/{}: {}", tier, id, e),
            }
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    /// Every snapshot in every tier, newest first
    pub fn list(&self) -> Result<Vec<BackupSnapshot>> {
        let mut all = Vec::new();
        for tier in Tier::ALL {
            all.extend(self.list_tier(tier)?);
        }
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.tier.cmp(&b.tier))
        });
        Ok(all)
    }

    /// Locate a snapshot by id, lowest tier first
    pub fn find(&self, id: &str) -> Result<BackupSnapshot> {
        for tier in Tier::ALL {
            if self.storage.exists(&key(tier, id, MANIFEST_FILE)) {
                return self.load_manifest(tier, id);
            }
        }
        Err(ScoutError::SnapshotNotFound { id: id.to_string() })
    }

    /// Check the manifest checksum, then every file; returns the decoded files
    fn verified_contents(&self, id: &str) -> Result<(BackupSnapshot, Vec<(String, Vec<u8>)>)> {
        let snapshot = self.find(id)?;
        let mismatch = |detail: String| ScoutError::ChecksumMismatch {
            id: id.to_string(),
            detail,
        };

        let manifest = self
            .storage
            .get(&key(snapshot.tier, id, MANIFEST_FILE))?;
        if compute_hash(&manifest) != snapshot.manifest_checksum {
            return Err(mismatch("manifest checksum does not match".to_string()));
        }

        let mut contents = Vec::with_capacity(snapshot.files.len());
        for file in &snapshot.files {
            let stored = self
                .storage
                .get(&key(snapshot.tier, id, &file.stored_as))
                .map_err(|e| mismatch(format!("{} unreadable: {}", file.stored_as, e)))?;
            let bytes = if snapshot.compressed {
                gunzip(&stored).map_err(|e| mismatch(format!("{} corrupt: {}", file.stored_as, e)))?
            } else {
                stored
            };
            if compute_hash(&bytes) != file.checksum {
                return Err(mismatch(format!("{} checksum does not match", file.name)));
            }
            contents.push((file.name.clone(), bytes));
        }
        Ok((snapshot, contents))
    }

    /// Verify a snapshot without restoring it
    pub fn verify(&self, id: &str) -> Result<BackupSnapshot> {
        let (snapshot, _) = self.verified_contents(id)?;
        Ok(snapshot)
    }

    /// Restore a snapshot into `target`.
    ///
    /// Refuses on any checksum mismatch. The current contents of `target`
    /// are snapshotted first.
    pub fn restore(&self, id: &str, target: &Path) -> Result<RestoreOutcome> {
        self.restore_at(id, target, Utc::now())
    }

    pub fn restore_at(&self, id: &str, target: &Path, now: DateTime<Utc>) -> Result<RestoreOutcome> {
        let (snapshot, contents) = self.verified_contents(id)?;

        let has_current = ARTIFACT_FILES.iter().any(|f| target.join(f).is_file());
        let pre_restore = if has_current {
            Some(self.write_snapshot(target, BackupTrigger::PreRestore, now)?)
        } else {
            None
        };

        fs::create_dir_all(target)?;
        for (name, bytes) in &contents {
            let tmp = target.join(format!(".{}.restore", name));
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, target.join(name))?;
        }

        // the target holds exactly one generation afterwards
        let mut removed = Vec::new();
        for name in ARTIFACT_FILES {
            let path = target.join(name);
            if path.is_file() && !contents.iter().any(|(restored, _)| restored.as_str() == *name) {
                fs::remove_file(&path)?;
                tracing::debug!("Removed {} (not in snapshot {})", name, snapshot.id);
                removed.push(name.to_string());
            }
        }

        tracing::info!(
            "Restored {} files from snapshot {} into {}",
            contents.len(),
            snapshot.id,
            target.display()
        );
        Ok(RestoreOutcome {
            snapshot,
            restored: contents.len(),
            removed,
            pre_restore,
        })
    }

    /// Promote into higher tiers where a period has elapsed, then prune
    pub fn maintain(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport {
            promoted: self.promote(now)?,
            ..MaintenanceReport::default()
        };
        report.pruned = self.prune()?;
        Ok(report)
    }

    /// Copy the latest eligible snapshot of each tier into the next tier
    /// when that tier's latest is older than its period
    pub fn promote(&self, now: DateTime<Utc>) -> Result<Vec<(Tier, String)>> {
        let mut promoted = Vec::new();
        for tier in [Tier::Daily, Tier::Weekly] {
            let Some(next) = tier.next() else {
                continue;
            };
            let latest_next = self.list_tier(next)?.last().map(|s| s.created_at);
            if !self.policy.promotion_due(next, latest_next, now) {
                continue;
            }
            let Some(candidate) = self
                .list_tier(tier)?
                .into_iter()
                .filter(|s| s.trigger.is_promotable())
                .last()
            else {
                continue;
            };
            if self.storage.exists(&snapshot_key(next, &candidate.id)) {
                continue;
            }
            if let Some(latest) = latest_next {
                if candidate.created_at <= latest {
                    continue;
                }
            }

            self.storage.copy(
                &snapshot_key(tier, &candidate.id),
                &snapshot_key(next, &candidate.id),
            )?;
            let copy = BackupSnapshot {
                tier: next,
                ..candidate
            };
            self.store_manifest(&copy)?;
            promoted.push((next, copy.id));
        }
        Ok(promoted)
    }

    /// Delete the oldest snapshots beyond each tier's retention count
    pub fn prune(&self) -> Result<Vec<(Tier, String)>> {
        let mut pruned = Vec::new();
        for tier in Tier::ALL {
            let entries: Vec<(String, DateTime<Utc>)> = self
                .list_tier(tier)?
                .into_iter()
                .map(|s| (s.id, s.created_at))
                .collect();
            for id in self.policy.prune_candidates(tier, &entries) {
                self.storage.delete(&snapshot_key(tier, &id))?;
                pruned.push((tier, id));
            }
        }
        Ok(pruned)
    }
}
