//! Retention tiers
//!
//! Pure policy: which tier a snapshot is promoted into and which snapshots
//! fall out of a tier. Storage is not touched here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackupConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Daily, Tier::Weekly, Tier::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Tier a snapshot is promoted into from this one
    pub fn next(&self) -> Option<Tier> {
        match self {
            Self::Daily => Some(Self::Weekly),
            Self::Weekly => Some(Self::Monthly),
            Self::Monthly => None,
        }
    }

    /// Minimum spacing between two snapshots of this tier
    pub fn period(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown backup tier '{}'", other)),
        }
    }
}

/// Per-tier retention counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&BackupConfig::default())
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            daily: config.daily_retention,
            weekly: config.weekly_retention,
            monthly: config.monthly_retention,
        }
    }

    pub fn keep(&self, tier: Tier) -> usize {
        match tier {
            Tier::Daily => self.daily,
            Tier::Weekly => self.weekly,
            Tier::Monthly => self.monthly,
        }
    }

    /// Whether `tier` should receive a new snapshot, given its latest one
    pub fn promotion_due(
        &self,
        tier: Tier,
        latest: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.keep(tier) == 0 {
            return false;
        }
        match latest {
            None => true,
            Some(latest) => now - latest >= tier.period(),
        }
    }

    /// Ids to delete from `tier`, given `(id, created_at)` pairs in any order.
    /// Oldest go first.
    pub fn prune_candidates(&self, tier: Tier, snapshots: &[(String, DateTime<Utc>)]) -> Vec<String> {
        let keep = self.keep(tier);
        if snapshots.len() <= keep {
            return Vec::new();
        }
        let mut sorted: Vec<&(String, DateTime<Utc>)> = snapshots.iter().collect();
        sorted.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        sorted
            .into_iter()
            .take(snapshots.len() - keep)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
