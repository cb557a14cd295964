//! Fallback controller.
//!
//! Runs alternative strategies in order until one both applies and succeeds.
//! Strategies are kept sorted by static priority (higher first); the adaptive
//! variant re-ranks them before every chain by
//! `success_rate * cooldown_penalty`, falling back to static order on ties.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::models::{FallbackConfig, FallbackHistory, FallbackOutcome, MetricsSnapshot};
use crate::domain::ports::FallbackStrategy;

struct Candidate {
    strategy: Arc<dyn FallbackStrategy>,
    history: FallbackHistory,
}

pub struct FallbackController {
    candidates: Vec<Candidate>,
    config: FallbackConfig,
}

impl FallbackController {
    pub const fn new(config: FallbackConfig) -> Self {
        Self {
            candidates: Vec::new(),
            config,
        }
    }

    pub fn with_strategies(
        config: FallbackConfig,
        strategies: impl IntoIterator<Item = Arc<dyn FallbackStrategy>>,
    ) -> Self {
        let mut controller = Self::new(config);
        for strategy in strategies {
            controller.register(strategy);
        }
        controller
    }

    /// Add a strategy, keeping the list sorted by static priority.
    ///
    /// Strategies of equal priority keep their registration order.
    pub fn register(&mut self, strategy: Arc<dyn FallbackStrategy>) {
        debug!(strategy = %strategy.name(), priority = strategy.priority(), "Fallback registered");
        self.candidates.push(Candidate {
            strategy,
            history: FallbackHistory::default(),
        });
        self.candidates
            .sort_by_key(|c| std::cmp::Reverse(c.strategy.priority()));
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn history(&self, name: &str) -> Option<&FallbackHistory> {
        self.candidates
            .iter()
            .find(|c| c.strategy.name() == name)
            .map(|c| &c.history)
    }

    /// Histories of all strategies keyed by name.
    pub fn histories(&self) -> HashMap<String, FallbackHistory> {
        self.candidates
            .iter()
            .map(|c| (c.strategy.name().to_string(), c.history.clone()))
            .collect()
    }

    /// Replace a strategy's history, e.g. when restoring saved state.
    /// Returns `false` for an unknown strategy.
    pub fn seed_history(&mut self, name: &str, history: FallbackHistory) -> bool {
        match self.candidates.iter_mut().find(|c| c.strategy.name() == name) {
            Some(candidate) => {
                candidate.history = history;
                true
            }
            None => false,
        }
    }

    fn score(&self, history: &FallbackHistory, now: DateTime<Utc>) -> f64 {
        let cooldown = i64::try_from(self.config.cooldown_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let penalty = if history.in_cooldown(now, cooldown) {
            self.config.cooldown_penalty
        } else {
            1.0
        };
        history.success_rate() * penalty
    }

    /// Candidate indices in the order they would be tried at `now`.
    fn ranking(&self, now: DateTime<Utc>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.candidates.len()).collect();
        if self.config.adaptive {
            let scores: Vec<f64> = self
                .candidates
                .iter()
                .map(|c| self.score(&c.history, now))
                .collect();
            // Stable sort: ties keep static priority order.
            order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        }
        order
    }

    /// Strategy names in the order they would be tried at `now`.
    pub fn ordered_names(&self, now: DateTime<Utc>) -> Vec<String> {
        self.ranking(now)
            .into_iter()
            .map(|i| self.candidates[i].strategy.name().to_string())
            .collect()
    }

    /// Run the chain against the current metrics.
    pub async fn execute_chain(&mut self, metrics: &MetricsSnapshot) -> FallbackOutcome {
        self.execute_chain_at(metrics, Utc::now()).await
    }

    /// Run the chain, ranking and recording failures as of `now`.
    ///
    /// Individual failures are logged and the chain moves on; exhausting the
    /// chain is an ordinary outcome.
    pub async fn execute_chain_at(
        &mut self,
        metrics: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> FallbackOutcome {
        let mut attempted = Vec::new();

        for index in self.ranking(now) {
            let strategy = Arc::clone(&self.candidates[index].strategy);
            let name = strategy.name().to_string();

            if !strategy.evaluate(metrics) {
                debug!(strategy = %name, "Fallback not applicable");
                continue;
            }

            attempted.push(name.clone());
            match strategy.execute(metrics).await {
                Ok(output) => {
                    self.candidates[index].history.record_success();
                    info!(strategy = %name, "Fallback recovered");
                    return FallbackOutcome::Recovered {
                        strategy: name,
                        output,
                    };
                }
                Err(e) => {
                    self.candidates[index].history.record_failure(now);
                    warn!(strategy = %name, error = %e, "Fallback strategy failed");
                }
            }
        }

        warn!(attempted = ?attempted, "All fallbacks exhausted");
        FallbackOutcome::Exhausted { attempted }
    }
}
