use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Solution, TopKError};

/// One round-trip request to the query service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub default_graph: String,
    pub next: Option<String>,
    pub quota: Option<u64>,
    pub force_order: bool,
    pub early_pruning: bool,
    pub stateless: bool,
    pub max_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topk_strategy: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceStats {
    pub resuming_time: f64,
    pub saving_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub bindings: Vec<Solution>,
    pub next: Option<String>,
    pub stats: ServiceStats,
}

impl QueryResponse {
    /// Parses and fully validates a response body.
    ///
    /// `bindings` and `next` are required (`next` may be `null`); every binding value must be a
    /// string. `stats` is optional and missing values count as zero.
    ///
    /// # Errors
    /// Returns [`TopKError::Protocol`] when the body violates the response shape.
    pub fn parse(body: &str) -> Result<Self, TopKError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|err| TopKError::Protocol(format!("response is not valid JSON: {err}")))?;
        let Value::Object(mut object) = value else {
            return Err(TopKError::Protocol("response MUST be a JSON object".to_string()));
        };

        let bindings = match object.remove("bindings") {
            Some(Value::Array(rows)) => rows
                .into_iter()
                .enumerate()
                .map(|(index, row)| parse_binding(index, row))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(TopKError::Protocol("`bindings` MUST be an array".to_string())),
            None => return Err(TopKError::Protocol("response is missing `bindings`".to_string())),
        };

        let next = match object.remove("next") {
            Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token),
            Some(_) => return Err(TopKError::Protocol("`next` MUST be a string or null".to_string())),
            None => return Err(TopKError::Protocol("response is missing `next`".to_string())),
        };

        let stats = match object.remove("stats") {
            None | Some(Value::Null) => ServiceStats::default(),
            Some(Value::Object(stats)) => ServiceStats {
                resuming_time: stat_value(&stats, "resuming_time")?,
                saving_time: stat_value(&stats, "saving_time")?,
            },
            Some(_) => return Err(TopKError::Protocol("`stats` MUST be an object".to_string())),
        };

        Ok(Self { bindings, next, stats })
    }
}

fn parse_binding(index: usize, row: Value) -> Result<Solution, TopKError> {
    let Value::Object(row) = row else {
        return Err(TopKError::Protocol(format!("binding {index} MUST be an object")));
    };
    row.into_iter()
        .map(|(name, term)| match term {
            Value::String(term) => Ok((name, term)),
            _ => Err(TopKError::Protocol(format!(
                "binding {index}: value of `{name}` MUST be a string"
            ))),
        })
        .collect()
}

fn stat_value(stats: &serde_json::Map<String, Value>, name: &str) -> Result<f64, TopKError> {
    match stats.get(name) {
        None | Some(Value::Null) => Ok(0.0),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| TopKError::Protocol(format!("`stats.{name}` MUST be a number"))),
    }
}

/// Blocking request/response channel to the query service.
pub trait Transport {
    /// Sends one JSON request body and returns the raw response body.
    ///
    /// # Errors
    /// Returns [`TopKError::Transport`] on network or HTTP failure.
    fn post_json(&self, body: &str) -> Result<String, TopKError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_wire_field_names() {
        let request = QueryRequest {
            query: "SELECT * WHERE { ?s ?p ?o }".to_string(),
            default_graph: "http://example.org/g".to_string(),
            next: None,
            quota: Some(75),
            force_order: false,
            early_pruning: true,
            stateless: true,
            max_limit: None,
            topk_strategy: Some("partial_topk".to_string()),
        };
        let value = serde_json::to_value(&request).unwrap_or_else(|err| panic!("serialize: {err}"));

        assert_eq!(value["defaultGraph"], "http://example.org/g");
        assert_eq!(value["next"], Value::Null);
        assert_eq!(value["quota"], 75);
        assert_eq!(value["earlyPruning"], true);
        assert_eq!(value["maxLimit"], Value::Null);
        assert_eq!(value["topkStrategy"], "partial_topk");
    }

    #[test]
    fn absent_selector_is_omitted() {
        let request = QueryRequest {
            query: String::new(),
            default_graph: String::new(),
            next: Some("abc".to_string()),
            quota: None,
            force_order: true,
            early_pruning: false,
            stateless: false,
            max_limit: Some(100),
            topk_strategy: None,
        };
        let value = serde_json::to_value(&request).unwrap_or_else(|err| panic!("serialize: {err}"));
        assert!(value.get("topkStrategy").is_none());
        assert_eq!(value["next"], "abc");
    }

    #[test]
    fn response_parses_bindings_next_and_stats() {
        let response = QueryResponse::parse(
            r#"{"bindings": [{"?x": "1"}, {"?x": "2", "?y": "b"}], "next": "tok",
                "stats": {"resuming_time": 1.5, "saving_time": 2}}"#,
        )
        .unwrap_or_else(|err| panic!("parse: {err}"));

        assert_eq!(response.bindings.len(), 2);
        assert_eq!(response.bindings[1].get("?y").map(String::as_str), Some("b"));
        assert_eq!(response.next.as_deref(), Some("tok"));
        assert_eq!(response.stats, ServiceStats { resuming_time: 1.5, saving_time: 2.0 });
    }

    #[test]
    fn missing_stats_count_as_zero() {
        let response = QueryResponse::parse(r#"{"bindings": [], "next": null}"#)
            .unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(response.next, None);
        assert_eq!(response.stats, ServiceStats::default());

        let response = QueryResponse::parse(r#"{"bindings": [], "next": null, "stats": {"saving_time": 3}}"#)
            .unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(response.stats, ServiceStats { resuming_time: 0.0, saving_time: 3.0 });
    }

    #[test]
    fn malformed_responses_are_protocol_errors() {
        for body in [
            r#"{"next": null}"#,
            r#"{"bindings": []}"#,
            r#"{"bindings": {}, "next": null}"#,
            r#"{"bindings": [], "next": 4}"#,
            r#"{"bindings": [{"?x": 1}], "next": null}"#,
            r#"{"bindings": ["row"], "next": null}"#,
            r#"{"bindings": [], "next": null, "stats": {"resuming_time": "slow"}}"#,
            "[]",
            "not json",
        ] {
            assert!(
                matches!(QueryResponse::parse(body), Err(TopKError::Protocol(_))),
                "expected protocol error for {body}"
            );
        }
    }
}
