use regex_lite::Regex;

use crate::ranking::Direction;
use crate::term::lexical_form;
use crate::{Solution, TopKError};

/// One `ORDER BY` condition: the expression text (without its `ASC`/`DESC` wrapper) and the
/// direction it sorts in.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OrderCondition {
    pub expression: String,
    pub direction: Direction,
}

/// Query-text operations the strategies need. Implementations work on the clause structure of
/// a SPARQL `SELECT` query; no full grammar is required.
pub trait ExpressionEvaluator {
    /// `ORDER BY` conditions, most significant first. Empty when the query has no `ORDER BY`.
    ///
    /// # Errors
    /// Returns [`TopKError::QueryMalformed`] when the clause cannot be parsed.
    fn order_conditions(&self, query: &str) -> Result<Vec<OrderCondition>, TopKError>;

    /// Whether the query has an `ORDER BY` clause, without parsing its conditions.
    fn has_order_by(&self, query: &str) -> bool {
        !matches!(self.order_conditions(query), Ok(conditions) if conditions.is_empty())
    }

    /// Value of the query's `LIMIT` clause, if any.
    ///
    /// # Errors
    /// Returns [`TopKError::QueryMalformed`] when the limit is not a non-negative integer.
    fn limit(&self, query: &str) -> Result<Option<usize>, TopKError>;

    /// Rewrites the projection so that every bound variable is returned.
    ///
    /// # Errors
    /// Returns [`TopKError::QueryMalformed`] when no `SELECT` clause is found.
    fn project_all(&self, query: &str) -> Result<String, TopKError>;

    /// Removes the `ORDER BY`, `LIMIT` and `OFFSET` solution modifiers.
    fn strip_ranking(&self, query: &str) -> String;

    /// Replaces (or adds) the `LIMIT` clause.
    fn set_limit(&self, query: &str, limit: usize) -> String;

    /// Evaluates one condition against a solution. `None` when the expression is unbound.
    fn evaluate(&self, condition: &OrderCondition, solution: &Solution) -> Option<String>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum OrderExpr {
    Variable(String),
    Str(Box<OrderExpr>),
}

/// Regex-driven [`ExpressionEvaluator`] for `SELECT` queries.
///
/// Solution modifiers are only searched after the closing brace of the outermost group
/// pattern, so `LIMIT`/`ORDER BY` inside sub-queries are never touched. Supported order
/// expressions are variables, `STR(..)` of a supported expression, and parenthesized forms.
#[derive(Debug, Clone)]
pub struct SparqlClauses {
    order_by: Regex,
    limit: Regex,
    modifier: Regex,
    select: Regex,
}

impl SparqlClauses {
    /// # Errors
    /// Returns [`TopKError::Configuration`] if a clause pattern fails to compile.
    pub fn new() -> Result<Self, TopKError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|err| {
                TopKError::Configuration(format!("invalid clause pattern `{pattern}`: {err}"))
            })
        };

        Ok(Self {
            order_by: compile(r"(?i)\bORDER\s+BY\b")?,
            limit: compile(r"(?i)(^|[^?$\w])LIMIT\s+([0-9]+)")?,
            modifier: compile(r"(?i)(?:^|[^?$\w])(ORDER\s+BY|LIMIT|OFFSET)\b")?,
            select: compile(r"(?is)\bSELECT\s+((?:DISTINCT|REDUCED)\s+)?(.*?)\s*(\bWHERE\b|\{)")?,
        })
    }
}

fn tail_start(query: &str) -> usize {
    query.rfind('}').map_or(0, |index| index + 1)
}

impl SparqlClauses {
    /// Offset of the first solution-modifier keyword in `text`. Variables such as `?limit`
    /// are not keywords.
    fn modifier_start(&self, text: &str) -> Option<usize> {
        self.modifier
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|keyword| keyword.start())
    }
}

impl ExpressionEvaluator for SparqlClauses {
    fn order_conditions(&self, query: &str) -> Result<Vec<OrderCondition>, TopKError> {
        let start = tail_start(query);
        let tail = &query[start..];
        let Some(order_by) = self.order_by.find(tail) else {
            return Ok(Vec::new());
        };

        let clause = &tail[order_by.end()..];
        let clause_end = self.modifier_start(clause).unwrap_or(clause.len());
        let conditions = split_conditions(&clause[..clause_end])?;
        if conditions.is_empty() {
            return Err(TopKError::QueryMalformed("ORDER BY clause has no conditions".to_string()));
        }
        Ok(conditions)
    }

    fn has_order_by(&self, query: &str) -> bool {
        self.order_by.is_match(&query[tail_start(query)..])
    }

    fn limit(&self, query: &str) -> Result<Option<usize>, TopKError> {
        let tail = &query[tail_start(query)..];
        let Some(captures) = self.limit.captures(tail) else {
            return Ok(None);
        };
        let digits = captures.get(2).map_or("", |group| group.as_str());
        digits
            .parse::<usize>()
            .map(Some)
            .map_err(|err| TopKError::QueryMalformed(format!("invalid LIMIT `{digits}`: {err}")))
    }

    fn project_all(&self, query: &str) -> Result<String, TopKError> {
        let projection = self
            .select
            .captures(query)
            .and_then(|captures| captures.get(2))
            .ok_or_else(|| TopKError::QueryMalformed("no SELECT clause found".to_string()))?;

        let mut rewritten = String::with_capacity(query.len());
        rewritten.push_str(&query[..projection.start()]);
        rewritten.push('*');
        rewritten.push_str(&query[projection.end()..]);
        Ok(rewritten)
    }

    fn strip_ranking(&self, query: &str) -> String {
        let start = tail_start(query);
        match self.modifier_start(&query[start..]) {
            Some(modifier) => query[..start + modifier].trim_end().to_string(),
            None => query.to_string(),
        }
    }

    fn set_limit(&self, query: &str, limit: usize) -> String {
        let start = tail_start(query);
        let mut head = query[..start].to_string();
        let tail = self.limit.replace(&query[start..], "${1}");
        head.push_str(tail.trim_end());
        format!("{} LIMIT {limit}", head.trim_end())
    }

    fn evaluate(&self, condition: &OrderCondition, solution: &Solution) -> Option<String> {
        let expr = parse_expression(&condition.expression).ok()?;
        evaluate_expr(&expr, solution)
    }
}

fn evaluate_expr(expr: &OrderExpr, solution: &Solution) -> Option<String> {
    match expr {
        OrderExpr::Variable(name) => solution
            .get(&format!("?{name}"))
            .or_else(|| solution.get(name))
            .cloned(),
        OrderExpr::Str(inner) => {
            let term = evaluate_expr(inner, solution)?;
            Some(format!("\"{}\"", lexical_form(&term)))
        }
    }
}

fn parse_expression(text: &str) -> Result<OrderExpr, TopKError> {
    let text = text.trim();
    let unsupported = || TopKError::QueryMalformed(format!("unsupported ORDER BY expression `{text}`"));

    if let Some(name) = text.strip_prefix('?').or_else(|| text.strip_prefix('$')) {
        if !name.is_empty() && name.chars().all(is_name_char) {
            return Ok(OrderExpr::Variable(name.to_string()));
        }
        return Err(unsupported());
    }

    if let Some(inner) = text.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        return parse_expression(inner);
    }

    let open = text.find('(').ok_or_else(unsupported)?;
    let function = text[..open].trim();
    let inner = text[open + 1..].strip_suffix(')').ok_or_else(unsupported)?;
    if function.eq_ignore_ascii_case("STR") {
        return Ok(OrderExpr::Str(Box::new(parse_expression(inner)?)));
    }
    Err(unsupported())
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Splits the body of an `ORDER BY` clause into its conditions.
fn split_conditions(clause: &str) -> Result<Vec<OrderCondition>, TopKError> {
    let chars = clause.char_indices().collect::<Vec<_>>();
    let mut conditions = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let (offset, ch) = chars[index];
        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        // Bare variable.
        if ch == '?' || ch == '$' {
            let mut end = index + 1;
            while end < chars.len() && is_name_char(chars[end].1) {
                end += 1;
            }
            let end_offset = chars.get(end).map_or(clause.len(), |(at, _)| *at);
            let expression = &clause[offset..end_offset];
            parse_expression(expression)?;
            conditions.push(OrderCondition {
                expression: expression.to_string(),
                direction: Direction::Asc,
            });
            index = end;
            continue;
        }

        // Optional keyword or function name followed by a parenthesized group.
        let mut name_end = index;
        while name_end < chars.len() && is_name_char(chars[name_end].1) {
            name_end += 1;
        }
        let name_end_offset = chars.get(name_end).map_or(clause.len(), |(at, _)| *at);
        let name = &clause[offset..name_end_offset];

        let mut open = name_end;
        while open < chars.len() && chars[open].1.is_whitespace() {
            open += 1;
        }
        if open >= chars.len() || chars[open].1 != '(' {
            return Err(TopKError::QueryMalformed(format!(
                "unexpected token in ORDER BY clause near `{}`",
                clause[offset..].trim()
            )));
        }

        let mut depth = 0_usize;
        let mut close = open;
        while close < chars.len() {
            match chars[close].1 {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            close += 1;
        }
        if close >= chars.len() {
            return Err(TopKError::QueryMalformed(
                "unbalanced parentheses in ORDER BY clause".to_string(),
            ));
        }

        let group_start = chars[open].0;
        let group_end = chars[close].0;
        let (expression, direction) = match Direction::parse(name) {
            Some(direction) => (clause[group_start + 1..group_end].trim(), direction),
            None => (clause[offset..=group_end].trim(), Direction::Asc),
        };
        parse_expression(expression)?;
        conditions.push(OrderCondition { expression: expression.to_string(), direction });
        index = close + 1;
    }

    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "PREFIX ex: <http://example.org/>\n\
        SELECT DISTINCT ?s ?name WHERE {\n  ?s ex:name ?name .\n  ?s ex:age ?age .\n}\n\
        ORDER BY DESC(?age) STR(?name) ?s\nLIMIT 10";

    fn clauses() -> SparqlClauses {
        SparqlClauses::new().unwrap_or_else(|err| panic!("clause patterns must compile: {err}"))
    }

    fn solution(pairs: &[(&str, &str)]) -> Solution {
        pairs.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect()
    }

    #[test]
    fn order_conditions_keep_clause_order_and_directions() {
        let conditions = clauses()
            .order_conditions(QUERY)
            .unwrap_or_else(|err| panic!("order_conditions failed: {err}"));

        assert_eq!(
            conditions,
            vec![
                OrderCondition { expression: "?age".to_string(), direction: Direction::Desc },
                OrderCondition { expression: "STR(?name)".to_string(), direction: Direction::Asc },
                OrderCondition { expression: "?s".to_string(), direction: Direction::Asc },
            ]
        );
    }

    #[test]
    fn query_without_order_by_has_no_conditions() {
        let conditions = clauses()
            .order_conditions("SELECT ?s WHERE { ?s ?p ?o } LIMIT 5")
            .unwrap_or_else(|err| panic!("order_conditions failed: {err}"));
        assert!(conditions.is_empty());
    }

    #[test]
    fn unsupported_order_expression_is_malformed() {
        let result = clauses().order_conditions("SELECT ?s WHERE { ?s ?p ?o } ORDER BY DESC(?o + 1)");
        assert!(matches!(result, Err(TopKError::QueryMalformed(_))));

        let result = clauses().order_conditions("SELECT ?s WHERE { ?s ?p ?o } ORDER BY ASC(?o");
        assert!(matches!(result, Err(TopKError::QueryMalformed(_))));
    }

    #[test]
    fn variables_named_like_modifiers_stay_in_the_order_clause() {
        let evaluator = clauses();
        let conditions = evaluator
            .order_conditions("SELECT ?s WHERE { ?s <http://ex/p> ?limit } ORDER BY DESC(?limit) LIMIT 10")
            .unwrap_or_else(|err| panic!("order_conditions failed: {err}"));
        assert_eq!(
            conditions,
            vec![OrderCondition { expression: "?limit".to_string(), direction: Direction::Desc }]
        );

        let query = "SELECT ?s WHERE { ?s <http://ex/p> ?offset } ORDER BY ?offset $order LIMIT 10";
        let conditions = evaluator
            .order_conditions(query)
            .unwrap_or_else(|err| panic!("order_conditions failed: {err}"));
        assert_eq!(
            conditions,
            vec![
                OrderCondition { expression: "?offset".to_string(), direction: Direction::Asc },
                OrderCondition { expression: "$order".to_string(), direction: Direction::Asc },
            ]
        );
        assert_eq!(evaluator.limit(query), Ok(Some(10)));
        assert_eq!(
            evaluator.strip_ranking(query),
            "SELECT ?s WHERE { ?s <http://ex/p> ?offset }"
        );
        assert_eq!(
            evaluator.set_limit(query, 3),
            "SELECT ?s WHERE { ?s <http://ex/p> ?offset } ORDER BY ?offset $order LIMIT 3"
        );
    }

    #[test]
    fn order_by_presence_does_not_parse_conditions() {
        let evaluator = clauses();
        assert!(evaluator.has_order_by("SELECT ?s WHERE { ?s ?p ?o } ORDER BY DESC(?o + 1)"));
        assert!(!evaluator.has_order_by("SELECT ?s WHERE { { SELECT ?s WHERE { ?s ?p ?o } ORDER BY ?o } }"));
    }

    #[test]
    fn limit_is_read_from_the_outer_query_only() {
        let evaluator = clauses();
        assert_eq!(evaluator.limit(QUERY), Ok(Some(10)));

        let nested = "SELECT * WHERE { { SELECT ?s WHERE { ?s ?p ?o } LIMIT 3 } }";
        assert_eq!(evaluator.limit(nested), Ok(None));
    }

    #[test]
    fn project_all_keeps_distinct_and_where() {
        let rewritten = clauses()
            .project_all(QUERY)
            .unwrap_or_else(|err| panic!("project_all failed: {err}"));
        assert!(rewritten.contains("SELECT DISTINCT * WHERE {"));
        assert!(rewritten.starts_with("PREFIX ex: <http://example.org/>"));

        assert!(matches!(
            clauses().project_all("ASK { ?s ?p ?o }"),
            Err(TopKError::QueryMalformed(_))
        ));
    }

    #[test]
    fn strip_ranking_drops_all_solution_modifiers() {
        let stripped = clauses().strip_ranking(QUERY);
        assert!(stripped.ends_with('}'));
        assert!(!stripped.contains("ORDER BY"));
        assert!(!stripped.contains("LIMIT"));

        let plain = "SELECT ?s WHERE { ?s ?p ?o }";
        assert_eq!(clauses().strip_ranking(plain), plain);
    }

    #[test]
    fn set_limit_replaces_or_appends() {
        let evaluator = clauses();
        let replaced = evaluator.set_limit(QUERY, 3);
        assert!(replaced.ends_with("ORDER BY DESC(?age) STR(?name) ?s LIMIT 3"));
        assert_eq!(replaced.matches("LIMIT").count(), 1);

        let appended = evaluator.set_limit("SELECT ?s WHERE { ?s ?p ?o } ORDER BY ?s", 7);
        assert_eq!(appended, "SELECT ?s WHERE { ?s ?p ?o } ORDER BY ?s LIMIT 7");
    }

    #[test]
    fn evaluate_reads_variables_with_or_without_marker() {
        let evaluator = clauses();
        let condition = OrderCondition { expression: "?x".to_string(), direction: Direction::Asc };

        assert_eq!(evaluator.evaluate(&condition, &solution(&[("?x", "5")])), Some("5".to_string()));
        assert_eq!(evaluator.evaluate(&condition, &solution(&[("x", "6")])), Some("6".to_string()));
        assert_eq!(evaluator.evaluate(&condition, &solution(&[("y", "6")])), None);
    }

    #[test]
    fn evaluate_str_yields_plain_literal() {
        let evaluator = clauses();
        let condition =
            OrderCondition { expression: "STR(?name)".to_string(), direction: Direction::Asc };

        assert_eq!(
            evaluator.evaluate(&condition, &solution(&[("?name", "\"Alice\"@en")])),
            Some("\"Alice\"".to_string())
        );
    }
}
