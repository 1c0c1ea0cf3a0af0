use std::time::Instant;

use crate::evaluator::ExpressionEvaluator;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::protocol::{QueryRequest, QueryResponse, Transport};
use crate::rewrite::{resolve_limit, rewrite_for};
use crate::strategy::{Strategy, StrategyConfig, StrategyKind};
use crate::{Solution, TopKError};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub solutions: Vec<Solution>,
    pub metrics: MetricsSnapshot,
}

/// Runs the pagination loop of one query against the service.
///
/// The driver only borrows its collaborators; every call to [`ExecutionDriver::execute`] owns
/// its own strategy state, token and metrics.
pub struct ExecutionDriver<'a> {
    transport: &'a dyn Transport,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ExecutionDriver<'a> {
    #[must_use]
    pub fn new(transport: &'a dyn Transport, evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { transport, evaluator }
    }

    /// # Errors
    /// Returns [`TopKError::QueryMalformed`] before the first round when no limit is available or
    /// the query clauses cannot be read, and aborts with [`TopKError::Transport`] or
    /// [`TopKError::Protocol`] on the first failed round.
    pub fn execute(
        &self,
        query: &str,
        kind: StrategyKind,
        config: &StrategyConfig,
    ) -> Result<ExecutionOutcome, TopKError> {
        let limit = resolve_limit(self.evaluator, query, config.limit)?;
        // Only client ranking evaluates the conditions.
        let (conditions, ordered) = if kind.ranks_on_client() {
            let conditions = self.evaluator.order_conditions(query)?;
            let ordered = !conditions.is_empty();
            (conditions, ordered)
        } else {
            (Vec::new(), self.evaluator.has_order_by(query))
        };
        if !ordered {
            tracing::warn!(strategy = %kind, "query has no ORDER BY; results follow arrival order");
        }
        let rewritten = rewrite_for(kind, self.evaluator, query, limit)?;

        tracing::info!(
            strategy = %kind,
            limit,
            quota_ms = config.quota.unwrap_or(0),
            max_limit = ?config.max_limit,
            stateless = config.stateless,
            early_pruning = config.early_pruning,
            "query sent to the server:\n{rewritten}"
        );

        let mut strategy = Strategy::from_conditions(kind, limit, conditions);
        let mut metrics = MetricsCollector::new();
        let mut request = QueryRequest {
            query: rewritten,
            default_graph: config.default_graph.clone(),
            next: None,
            quota: config.quota,
            force_order: config.force_order,
            early_pruning: config.early_pruning,
            stateless: config.stateless,
            max_limit: config.max_limit,
            topk_strategy: kind.selector().map(|selector| selector.to_wire()),
        };

        let started = Instant::now();
        let mut round = 0_u64;
        loop {
            round += 1;
            let body = serde_json::to_string(&request)
                .map_err(|err| TopKError::Protocol(format!("request could not be encoded: {err}")))?;
            let raw = self.transport.post_json(&body)?;
            let response = QueryResponse::parse(&raw)?;
            metrics.record_round(body.len(), raw.len(), response.stats);

            tracing::debug!(
                round,
                bindings = response.bindings.len(),
                has_next = response.next.is_some(),
                "round completed"
            );

            strategy.merge(response.bindings, self.evaluator);
            match strategy.next_token(response.next.as_deref())? {
                Some(next) => request.next = Some(next),
                None => break,
            }
        }

        let solutions = strategy.finish();
        metrics.record_solutions(solutions.len());
        metrics.record_execution_time(started.elapsed());

        let metrics = metrics.snapshot();
        tracing::info!(
            strategy = %kind,
            rounds = metrics.http_calls,
            solutions = metrics.solutions,
            execution_time_ms = metrics.execution_time,
            "execution finished"
        );
        Ok(ExecutionOutcome { solutions, metrics })
    }
}
