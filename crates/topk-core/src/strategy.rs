use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::continuation;
use crate::evaluator::{ExpressionEvaluator, OrderCondition};
use crate::ranking::{BoundedRanking, RankingKey, SYNTHETIC_KEY_PREFIX};
use crate::term::unquote_plain_literal;
use crate::{Solution, TopKError};

/// Strategy names accepted by [`StrategyKind::from_name`], with the benchmark aliases last.
pub const STRATEGY_NAMES: [&str; 8] = [
    "client-merge",
    "server-computed",
    "collaborative-threshold",
    "periodic-refresh",
    "sage",
    "sage-topk",
    "sage-partial-topk",
    "sage-topk-collab",
];

/// Where ranking and truncation happen for one execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyKind {
    /// Service streams every solution; the client keeps the best K.
    ClientMerge,
    /// Service returns the final top-K; the client concatenates pages.
    ServerComputed,
    /// Service returns partial top-K pages; the client merges them and pushes its K-th value
    /// back through the continuation token.
    CollaborativeThreshold,
    /// As [`StrategyKind::CollaborativeThreshold`], with the service refreshing its partial
    /// top-K at `refresh_rate`.
    PeriodicRefresh { refresh_rate: f64 },
}

impl StrategyKind {
    /// # Errors
    /// Returns [`TopKError::Configuration`] for an unknown name, an invalid refresh rate, or a
    /// refresh rate given to a strategy that does not use one.
    pub fn from_name(name: &str, refresh_rate: Option<f64>) -> Result<Self, TopKError> {
        let kind = match name {
            "client-merge" | "sage" => Self::ClientMerge,
            "server-computed" | "sage-topk" => Self::ServerComputed,
            "collaborative-threshold" | "sage-partial-topk" => Self::CollaborativeThreshold,
            "periodic-refresh" | "sage-topk-collab" => {
                let refresh_rate = refresh_rate.unwrap_or(0.0);
                if !refresh_rate.is_finite() || refresh_rate < 0.0 {
                    return Err(TopKError::Configuration(format!(
                        "refresh rate MUST be a finite non-negative number, got {refresh_rate}"
                    )));
                }
                return Ok(Self::PeriodicRefresh { refresh_rate });
            }
            other => {
                return Err(TopKError::Configuration(format!(
                    "unknown strategy `{other}`; expected one of: {}",
                    STRATEGY_NAMES.join(", ")
                )))
            }
        };

        if refresh_rate.is_some() {
            return Err(TopKError::Configuration(format!(
                "strategy `{name}` does not accept a refresh rate"
            )));
        }
        Ok(kind)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientMerge => "client-merge",
            Self::ServerComputed => "server-computed",
            Self::CollaborativeThreshold => "collaborative-threshold",
            Self::PeriodicRefresh { .. } => "periodic-refresh",
        }
    }

    #[must_use]
    pub fn selector(self) -> Option<TopkSelector> {
        match self {
            Self::ClientMerge => None,
            Self::ServerComputed => Some(TopkSelector::TopkServer),
            Self::CollaborativeThreshold => Some(TopkSelector::PartialTopk),
            Self::PeriodicRefresh { refresh_rate } => Some(TopkSelector::ClientServer(refresh_rate)),
        }
    }

    #[must_use]
    pub fn ranks_on_client(self) -> bool {
        !matches!(self, Self::ServerComputed)
    }

    #[must_use]
    pub fn pushes_threshold(self) -> bool {
        matches!(self, Self::CollaborativeThreshold | Self::PeriodicRefresh { .. })
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of the request's `topkStrategy` field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopkSelector {
    TopkServer,
    PartialTopk,
    ClientServer(f64),
}

impl TopkSelector {
    #[must_use]
    pub fn to_wire(self) -> String {
        match self {
            Self::TopkServer => "topk_server".to_string(),
            Self::PartialTopk => "partial_topk".to_string(),
            Self::ClientServer(rate) => format!("ClientServer-{rate:?}"),
        }
    }

    /// # Errors
    /// Returns [`TopKError::Configuration`] when `value` is not a known selector.
    pub fn parse(value: &str) -> Result<Self, TopKError> {
        match value {
            "topk_server" => Ok(Self::TopkServer),
            "partial_topk" => Ok(Self::PartialTopk),
            other => other
                .strip_prefix("ClientServer-")
                .and_then(|rate| rate.parse::<f64>().ok())
                .filter(|rate| rate.is_finite() && *rate >= 0.0)
                .map(Self::ClientServer)
                .ok_or_else(|| TopKError::Configuration(format!("unknown topkStrategy `{other}`"))),
        }
    }
}

/// Per-execution parameters forwarded to the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyConfig {
    pub default_graph: String,
    pub limit: Option<usize>,
    pub quota: Option<u64>,
    pub max_limit: Option<u64>,
    pub stateless: bool,
    pub early_pruning: bool,
    pub force_order: bool,
}

impl StrategyConfig {
    #[must_use]
    pub fn new(default_graph: impl Into<String>) -> Self {
        Self {
            default_graph: default_graph.into(),
            limit: None,
            quota: None,
            max_limit: None,
            stateless: true,
            early_pruning: false,
            force_order: false,
        }
    }
}

/// Per-execution strategy state: the client ranking (or the concatenated server pages) and
/// the order conditions used to fill synthetic ranking keys.
#[derive(Debug, Clone)]
pub struct Strategy {
    kind: StrategyKind,
    ranking: BoundedRanking,
    conditions: Vec<OrderCondition>,
    pages: Vec<Solution>,
}

impl Strategy {
    /// Strategy ranking on fields already present in each solution.
    #[must_use]
    pub fn new(kind: StrategyKind, limit: usize, keys: Vec<RankingKey>) -> Self {
        Self { kind, ranking: BoundedRanking::new(limit, keys), conditions: Vec::new(), pages: Vec::new() }
    }

    /// Strategy ranking on `__order_condition_<i>` keys derived from `ORDER BY` conditions.
    #[must_use]
    pub fn from_conditions(kind: StrategyKind, limit: usize, conditions: Vec<OrderCondition>) -> Self {
        let keys = conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| RankingKey::synthetic(index, condition.direction))
            .collect();
        Self { kind, ranking: BoundedRanking::new(limit, keys), conditions, pages: Vec::new() }
    }

    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    #[must_use]
    pub fn ranking(&self) -> &BoundedRanking {
        &self.ranking
    }

    /// Merges one round of already-validated bindings.
    pub fn merge(&mut self, bindings: Vec<Solution>, evaluator: &dyn ExpressionEvaluator) {
        if !self.kind.ranks_on_client() {
            self.pages.extend(bindings);
            return;
        }

        for mut solution in bindings {
            for (condition, key) in self.conditions.iter().zip(self.ranking.keys()) {
                if solution.contains_key(&key.name) {
                    continue;
                }
                if let Some(value) = evaluator.evaluate(condition, &solution) {
                    solution.insert(key.name.clone(), value);
                }
            }
            self.ranking.insert(solution);
        }
    }

    /// Token to send with the next request, given the one the service just returned.
    ///
    /// Threshold-pushing strategies write the current lower bound into the token once the
    /// ranking holds K solutions; in every other case the token is forwarded unchanged.
    ///
    /// # Errors
    /// Returns [`TopKError::Protocol`] when the token has to be mutated but does not decode
    /// to the expected plan shape.
    pub fn next_token(&self, returned: Option<&str>) -> Result<Option<String>, TopKError> {
        let Some(token) = returned else {
            return Ok(None);
        };
        if !self.kind.pushes_threshold() {
            return Ok(Some(token.to_string()));
        }

        match self.ranking.lower_bound() {
            Some(threshold) => {
                tracing::debug!(strategy = %self.kind, ?threshold, "pushing threshold into continuation token");
                Ok(Some(continuation::with_threshold(token, &threshold)?))
            }
            None => Ok(Some(token.to_string())),
        }
    }

    /// Final ordered result, with plain literals unquoted and synthetic ranking keys removed.
    #[must_use]
    pub fn finish(self) -> Vec<Solution> {
        let solutions = if self.kind.ranks_on_client() { self.ranking.flatten() } else { self.pages };
        solutions
            .into_iter()
            .map(|solution| {
                solution
                    .into_iter()
                    .filter(|(name, _)| !name.starts_with(SYNTHETIC_KEY_PREFIX))
                    .map(|(name, value)| {
                        let value = unquote_plain_literal(&value).to_string();
                        (name, value)
                    })
                    .collect()
            })
            .collect()
    }
}
