//! Query rewriting shared by every strategy.

use crate::evaluator::ExpressionEvaluator;
use crate::strategy::StrategyKind;
use crate::TopKError;

/// K for one execution: the configured limit wins over the query's own `LIMIT`.
///
/// # Errors
/// Returns [`TopKError::QueryMalformed`] when neither source provides a limit, or the query's
/// `LIMIT` cannot be read.
pub fn resolve_limit(
    evaluator: &dyn ExpressionEvaluator,
    query: &str,
    configured: Option<usize>,
) -> Result<usize, TopKError> {
    if let Some(limit) = configured {
        return Ok(limit);
    }
    evaluator.limit(query)?.ok_or_else(|| {
        TopKError::QueryMalformed("no LIMIT in the query and none configured".to_string())
    })
}

/// Query text sent to the service for `kind`.
///
/// Every strategy asks for all bound variables so client-side ranking and result validation see
/// complete solutions. Strategies that rank on the client drop the solution modifiers; the
/// others keep `ORDER BY` and ask for exactly `limit` solutions.
///
/// # Errors
/// Returns [`TopKError::QueryMalformed`] when the projection cannot be rewritten.
pub fn rewrite_for(
    kind: StrategyKind,
    evaluator: &dyn ExpressionEvaluator,
    query: &str,
    limit: usize,
) -> Result<String, TopKError> {
    let query = evaluator.project_all(query)?;
    Ok(match kind {
        StrategyKind::ClientMerge | StrategyKind::CollaborativeThreshold => {
            evaluator.strip_ranking(&query)
        }
        StrategyKind::ServerComputed | StrategyKind::PeriodicRefresh { .. } => {
            evaluator.set_limit(&query, limit)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::SparqlClauses;

    const QUERY: &str = "SELECT ?s WHERE { ?s <http://example.org/p> ?x } ORDER BY DESC(?x) LIMIT 20";

    fn clauses() -> SparqlClauses {
        SparqlClauses::new().unwrap_or_else(|err| panic!("clause patterns must compile: {err}"))
    }

    fn rewrite(kind: StrategyKind, limit: usize) -> String {
        rewrite_for(kind, &clauses(), QUERY, limit).unwrap_or_else(|err| panic!("rewrite: {err}"))
    }

    #[test]
    fn configured_limit_overrides_query_limit() {
        assert_eq!(resolve_limit(&clauses(), QUERY, Some(3)), Ok(3));
        assert_eq!(resolve_limit(&clauses(), QUERY, None), Ok(20));
    }

    #[test]
    fn missing_limit_everywhere_is_malformed() {
        let result = resolve_limit(&clauses(), "SELECT ?s WHERE { ?s ?p ?o } ORDER BY ?s", None);
        assert!(matches!(result, Err(TopKError::QueryMalformed(_))));
    }

    #[test]
    fn client_ranking_strategies_strip_modifiers() {
        for kind in [StrategyKind::ClientMerge, StrategyKind::CollaborativeThreshold] {
            assert_eq!(rewrite(kind, 5), "SELECT * WHERE { ?s <http://example.org/p> ?x }");
        }
    }

    #[test]
    fn server_ranking_strategies_keep_order_and_set_limit() {
        for kind in [StrategyKind::ServerComputed, StrategyKind::PeriodicRefresh { refresh_rate: 0.5 }] {
            assert_eq!(
                rewrite(kind, 5),
                "SELECT * WHERE { ?s <http://example.org/p> ?x } ORDER BY DESC(?x) LIMIT 5"
            );
        }
    }
}
