use std::collections::BTreeMap;

pub mod continuation;
pub mod driver;
pub mod evaluator;
pub mod metrics;
pub mod protocol;
pub mod ranking;
pub mod rewrite;
pub mod strategy;
pub mod term;

pub use continuation::ContinuationError;
pub use driver::{ExecutionDriver, ExecutionOutcome};
pub use evaluator::{ExpressionEvaluator, OrderCondition, SparqlClauses};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use protocol::{QueryRequest, QueryResponse, ServiceStats, Transport};
pub use ranking::{BoundedRanking, Direction, RankingKey};
pub use strategy::{Strategy, StrategyConfig, StrategyKind, TopkSelector};

/// One row of query results: variable name to term string.
pub type Solution = BTreeMap<String, String>;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TopKError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed query: {0}")]
    QueryMalformed(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(String),
}
