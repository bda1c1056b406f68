//! Thompson Sampling over catalog items for sessions without enough signal.
//!
//! Every item is an arm with a `Beta(alpha, beta)` posterior over its click rate,
//! starting from the uniform prior `Beta(1, 1)`. Selection draws one sample per arm
//! and keeps the best; exploration comes from the draw itself.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum BanditError {
    #[error("Bandit state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bandit state format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Posterior shape parameters of one arm
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BetaArm {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaArm {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl BetaArm {
    /// Feedback events observed for this arm
    pub fn impressions(&self) -> f64 {
        self.alpha + self.beta - 2.0
    }

    pub fn estimated_ctr(&self) -> f64 {
        let impressions = self.impressions();
        if impressions > 0.0 {
            (self.alpha - 1.0) / impressions
        } else {
            0.0
        }
    }
}

/// Per-arm statistics for inspection
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArmStats {
    pub item_id: String,
    pub alpha: f64,
    pub beta: f64,
    pub estimated_ctr: f64,
    pub impressions: f64,
}

/// Serializable posterior state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BanditSnapshot {
    pub arms: Vec<(String, BetaArm)>,
}

struct BanditState {
    item_ids: Vec<String>,
    positions: HashMap<String, usize>,
    arms: Vec<BetaArm>,
    rng: StdRng,
}

/// Thread-safe Thompson Sampling bandit
///
/// All mutation happens under one mutex, so concurrent feedback never loses an
/// increment. Critical sections are pure arithmetic and never await.
pub struct ThompsonBandit {
    state: Mutex<BanditState>,
}

impl ThompsonBandit {
    pub fn new<I, S>(item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(item_ids, StdRng::from_entropy())
    }

    /// Deterministic sampling, for tests and reproducible simulations
    pub fn with_seed<I, S>(item_ids: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_rng(item_ids, StdRng::seed_from_u64(seed))
    }

    fn with_rng<I, S>(item_ids: I, rng: StdRng) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = BanditState {
            item_ids: Vec::new(),
            positions: HashMap::new(),
            arms: Vec::new(),
            rng,
        };

        for item_id in item_ids {
            let item_id = item_id.into();
            if state.positions.contains_key(&item_id) {
                continue;
            }
            state.positions.insert(item_id.clone(), state.item_ids.len());
            state.item_ids.push(item_id);
            state.arms.push(BetaArm::default());
        }

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks `min(k, catalog_size)` distinct items by Thompson Sampling, best first
    pub fn select(&self, k: usize) -> Vec<String> {
        if k == 0 {
            return Vec::new();
        }

        let mut state = self.state.lock();
        let BanditState {
            item_ids,
            arms,
            rng,
            ..
        } = &mut *state;

        let mut samples: Vec<(usize, f64)> = arms
            .iter()
            .enumerate()
            .map(|(pos, arm)| (pos, sample_arm(arm, rng)))
            .collect();

        // Stable: equal draws keep catalog order
        samples.sort_by(|a, b| b.1.total_cmp(&a.1));

        samples
            .into_iter()
            .take(k)
            .map(|(pos, _)| item_ids[pos].clone())
            .collect()
    }

    /// Applies feedback for one recommendation set
    ///
    /// The clicked arm (if it was recommended) gains one success, every other
    /// recommended arm one failure. Unknown items are ignored and duplicates count once.
    pub fn update(&self, recommended: &[String], clicked: Option<&str>) {
        let mut state = self.state.lock();
        let mut seen = HashSet::with_capacity(recommended.len());

        for item_id in recommended {
            if !seen.insert(item_id.as_str()) {
                continue;
            }
            let Some(&pos) = state.positions.get(item_id) else {
                tracing::debug!(item_id = %item_id, "Feedback for item outside the catalog");
                continue;
            };

            let arm = &mut state.arms[pos];
            if clicked == Some(item_id.as_str()) {
                arm.alpha += 1.0;
            } else {
                arm.beta += 1.0;
            }
        }
    }

    pub fn arm(&self, item_id: &str) -> Option<BetaArm> {
        let state = self.state.lock();
        state.positions.get(item_id).map(|&pos| state.arms[pos])
    }

    /// Statistics for every arm, in catalog order
    pub fn stats(&self) -> Vec<ArmStats> {
        let state = self.state.lock();
        state
            .item_ids
            .iter()
            .zip(&state.arms)
            .map(|(item_id, arm)| ArmStats {
                item_id: item_id.clone(),
                alpha: arm.alpha,
                beta: arm.beta,
                estimated_ctr: arm.estimated_ctr(),
                impressions: arm.impressions(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> BanditSnapshot {
        let state = self.state.lock();
        BanditSnapshot {
            arms: state
                .item_ids
                .iter()
                .cloned()
                .zip(state.arms.iter().copied())
                .collect(),
        }
    }

    /// Restores posteriors for arms present in both the snapshot and the catalog.
    /// Returns the number of arms restored.
    pub fn restore(&self, snapshot: &BanditSnapshot) -> usize {
        let mut state = self.state.lock();
        let mut restored = 0;

        for (item_id, arm) in &snapshot.arms {
            // Reject corrupt parameters instead of poisoning the sampler
            if !(arm.alpha > 0.0 && arm.beta > 0.0 && arm.alpha.is_finite() && arm.beta.is_finite()) {
                tracing::warn!(item_id = %item_id, "Skipping invalid arm in bandit snapshot");
                continue;
            }
            if let Some(&pos) = state.positions.get(item_id) {
                state.arms[pos] = *arm;
                restored += 1;
            }
        }

        restored
    }

    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<(), BanditError> {
        let json = serde_json::to_string(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_state(&self, path: impl AsRef<Path>) -> Result<usize, BanditError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: BanditSnapshot = serde_json::from_str(&raw)?;
        Ok(self.restore(&snapshot))
    }
}

fn sample_arm(arm: &BetaArm, rng: &mut StdRng) -> f64 {
    match Beta::new(arm.alpha, arm.beta) {
        Ok(dist) => dist.sample(rng),
        // Unreachable for arms built here; fall back to the posterior mean
        Err(_) => arm.alpha / (arm.alpha + arm.beta),
    }
}
