//! Quality scoring
//!
//! A repository's score is the sum of independently capped signal
//! contributions, rounded and clamped to 0..=100. The signal table is data,
//! evaluated in order by one loop.

use chrono::{DateTime, Utc};

use crate::types::RepositoryStats;

/// Highest possible score
pub const MAX_SCORE: u8 = 100;

/// Input signal read from a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Stars,
    Forks,
    PluginCount,
    Recency,
    License,
    Topics,
}

/// How a signal turns into points
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    /// `value * factor`
    Linear(f64),
    /// Points by age in days: first tier whose bound exceeds the age wins
    Tiered(&'static [(i64, f64)]),
    /// Fixed points when the signal is present
    Flag(f64),
}

/// One row of the scoring table
#[derive(Debug, Clone, Copy)]
pub struct SignalWeight {
    pub signal: Signal,
    pub cap: f64,
    pub weighting: Weighting,
}

/// Recency tiers: under 30 days full credit, under 90 partial, under 365 minor
pub const RECENCY_TIERS: &[(i64, f64)] = &[(30, 15.0), (90, 10.0), (365, 5.0)];

/// Default scoring table; caps sum to 100
pub const DEFAULT_WEIGHTS: &[SignalWeight] = &[
    SignalWeight {
        signal: Signal::Stars,
        cap: 30.0,
        weighting: Weighting::Linear(0.01),
    },
    SignalWeight {
        signal: Signal::Forks,
        cap: 15.0,
        weighting: Weighting::Linear(0.05),
    },
    SignalWeight {
        signal: Signal::PluginCount,
        cap: 20.0,
        weighting: Weighting::Linear(3.0),
    },
    SignalWeight {
        signal: Signal::Recency,
        cap: 15.0,
        weighting: Weighting::Tiered(RECENCY_TIERS),
    },
    SignalWeight {
        signal: Signal::License,
        cap: 10.0,
        weighting: Weighting::Flag(10.0),
    },
    SignalWeight {
        signal: Signal::Topics,
        cap: 10.0,
        weighting: Weighting::Linear(2.0),
    },
];

/// Deterministic scorer anchored at a fixed reference instant
#[derive(Debug, Clone)]
pub struct QualityScorer {
    as_of: DateTime<Utc>,
    weights: &'static [SignalWeight],
}

impl QualityScorer {
    /// `as_of` is the instant recency is measured from
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            weights: DEFAULT_WEIGHTS,
        }
    }

    pub fn with_weights(mut self, weights: &'static [SignalWeight]) -> Self {
        self.weights = weights;
        self
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Score a repository with `plugin_count` declared plugins
    pub fn score(&self, stats: &RepositoryStats, plugin_count: usize) -> u8 {
        let total: f64 = self
            .weights
            .iter()
            .map(|w| self.contribution(w, stats, plugin_count))
            .sum();
        total.round().clamp(0.0, MAX_SCORE as f64) as u8
    }

    /// Points one row contributes, already clamped to its cap
    pub fn contribution(
        &self,
        weight: &SignalWeight,
        stats: &RepositoryStats,
        plugin_count: usize,
    ) -> f64 {
        let raw = match (weight.signal, weight.weighting) {
            (Signal::Recency, Weighting::Tiered(tiers)) => match stats.updated_at {
                Some(updated) => {
                    let age_days = (self.as_of - updated).num_days().max(0);
                    tiers
                        .iter()
                        .find(|(bound, _)| age_days < *bound)
                        .map(|(_, points)| *points)
                        .unwrap_or(0.0)
                }
                None => 0.0,
            },
            (signal, Weighting::Linear(factor)) => {
                self.magnitude(signal, stats, plugin_count) * factor
            }
            (signal, Weighting::Flag(points)) => {
                if self.magnitude(signal, stats, plugin_count) > 0.0 {
                    points
                } else {
                    0.0
                }
            }
            (_, Weighting::Tiered(_)) => 0.0,
        };
        raw.clamp(0.0, weight.cap)
    }

    fn magnitude(&self, signal: Signal, stats: &RepositoryStats, plugin_count: usize) -> f64 {
        match signal {
            Signal::Stars => stats.stars as f64,
            Signal::Forks => stats.forks as f64,
            Signal::PluginCount => plugin_count as f64,
            Signal::License => match stats.license.as_deref() {
                Some(l) if !l.trim().is_empty() => 1.0,
                _ => 0.0,
            },
            Signal::Topics => stats.topics.len() as f64,
            Signal::Recency => 0.0,
        }
    }
}

/// Plugin score: its marketplace's score, reduced for validation problems
pub fn plugin_score(marketplace_score: u8, errors: usize, warnings: usize) -> u8 {
    let penalty = errors as i64 * 10 + warnings as i64 * 2;
    (marketplace_score as i64 - penalty).clamp(0, MAX_SCORE as i64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn stats(
        stars: u64,
        forks: u64,
        days_ago: Option<i64>,
        license: bool,
        topics: usize,
    ) -> RepositoryStats {
        RepositoryStats {
            url: "https://github.com/a/b".into(),
            stars,
            forks,
            license: license.then(|| "MIT".to_string()),
            topics: (0..topics).map(|i| format!("topic-{}", i)).collect(),
            default_branch: "main".into(),
            updated_at: days_ago.map(|d| now() - Duration::days(d)),
            ..RepositoryStats::default()
        }
    }

    #[test]
    fn test_saturated_repository_scores_100() {
        let scorer = QualityScorer::new(now());
        let s = stats(5000, 500, Some(1), true, 8);
        assert_eq!(scorer.score(&s, 10), 100);
    }

    #[test]
    fn test_empty_repository_scores_0() {
        let scorer = QualityScorer::new(now());
        let s = stats(0, 0, None, false, 0);
        assert_eq!(scorer.score(&s, 0), 0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let scorer = QualityScorer::new(now());
        let s = stats(321, 17, Some(45), true, 3);
        let first = scorer.score(&s, 4);
        let second = scorer.score(&s, 4);
        assert_eq!(first, second);
        assert_eq!(first, QualityScorer::new(now()).score(&s, 4));
    }

    #[test]
    fn test_partial_scores() {
        let scorer = QualityScorer::new(now());
        // stars 3.21 + forks 0.85 + plugins 12 + recency 10 + license 10 + topics 6
        let s = stats(321, 17, Some(45), true, 3);
        assert_eq!(scorer.score(&s, 4), 42);
    }

    #[test]
    fn test_recency_tiers() {
        let scorer = QualityScorer::new(now());
        let recency = DEFAULT_WEIGHTS
            .iter()
            .find(|w| w.signal == Signal::Recency)
            .unwrap();

        let points = |days| scorer.contribution(recency, &stats(0, 0, Some(days), false, 0), 0);
        assert_eq!(points(0), 15.0);
        assert_eq!(points(29), 15.0);
        assert_eq!(points(30), 10.0);
        assert_eq!(points(89), 10.0);
        assert_eq!(points(200), 5.0);
        assert_eq!(points(365), 0.0);
        assert_eq!(points(2000), 0.0);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let scorer = QualityScorer::new(now());
        let recency = &DEFAULT_WEIGHTS[3];
        let s = stats(0, 0, Some(-3), false, 0);
        assert_eq!(scorer.contribution(recency, &s, 0), 15.0);
    }

    #[test]
    fn test_each_contribution_is_capped_before_summing() {
        let scorer = QualityScorer::new(now());
        // only stars, far beyond the cap
        let s = stats(1_000_000, 0, None, false, 0);
        assert_eq!(scorer.score(&s, 0), 30);
    }

    #[test]
    fn test_blank_license_is_absent() {
        let scorer = QualityScorer::new(now());
        let mut s = stats(0, 0, None, false, 0);
        s.license = Some("  ".into());
        assert_eq!(scorer.score(&s, 0), 0);
    }

    #[test]
    fn test_score_always_in_range() {
        let scorer = QualityScorer::new(now());
        for stars in [0, 10, 999, 100_000] {
            for plugins in [0, 1, 50] {
                for days in [None, Some(0), Some(100), Some(10_000)] {
                    let s = stats(stars, stars / 3, days, stars > 10, 20);
                    let score = scorer.score(&s, plugins);
                    assert!(score <= MAX_SCORE);
                }
            }
        }
    }

    #[test]
    fn test_plugin_score_penalties() {
        assert_eq!(plugin_score(80, 0, 0), 80);
        assert_eq!(plugin_score(80, 1, 2), 66);
        assert_eq!(plugin_score(5, 3, 0), 0);
    }
}
