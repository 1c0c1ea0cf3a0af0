//! Continuation-token codec.
//!
//! A token is the base64 form of a JSON plan tree describing the suspended execution on the
//! service side. The client only ever touches one thing in it: the threshold of the ranking
//! operator, reached through a chain of single-child wrapper nodes. Everything else is carried
//! through decode/encode untouched.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TopKError;

/// Upper bound on accepted token length, in base64 characters.
///
/// Plan fields are re-encoded through `serde_json::Value`: integers in the `i64`/`u64` range and
/// finite floats keep their text, while integers outside that range come back as floats.
pub const MAX_TOKEN_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ContinuationError {
    #[error("continuation token is empty")]
    Empty,

    #[error("continuation token exceeds max length: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("continuation token is not valid base64: {0}")]
    Base64(String),

    #[error("continuation token does not hold a plan tree: {0}")]
    Malformed(String),

    #[error("continuation token could not be encoded: {0}")]
    Encode(String),

    #[error("expected a ranking operator below the wrapper chain, found `{0}` node")]
    UnexpectedNode(&'static str),
}

impl From<ContinuationError> for TopKError {
    fn from(err: ContinuationError) -> Self {
        TopKError::Protocol(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTree {
    pub root: PlanNode,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
    Projection(WrapperNode),
    Filter(WrapperNode),
    Bind(WrapperNode),
    Limit(WrapperNode),
    TopK(RankingNode),
    PartialTopK(RankingNode),
    Scan(OpaqueNode),
    IndexJoin(OpaqueNode),
    Union(OpaqueNode),
}

impl PlanNode {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Projection(_) => "projection",
            Self::Filter(_) => "filter",
            Self::Bind(_) => "bind",
            Self::Limit(_) => "limit",
            Self::TopK(_) => "top_k",
            Self::PartialTopK(_) => "partial_top_k",
            Self::Scan(_) => "scan",
            Self::IndexJoin(_) => "index_join",
            Self::Union(_) => "union",
        }
    }
}

/// Single-child operator sitting above the ranking operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrapperNode {
    pub source: Box<PlanNode>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingNode {
    /// Ranking-key name to term string; the service prunes anything ranking worse.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub threshold: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<PlanNode>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpaqueNode {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// # Errors
/// Returns [`ContinuationError`] when the token is empty, too long, not base64, or not a
/// JSON plan tree.
pub fn decode(token: &str) -> Result<PlanTree, ContinuationError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ContinuationError::Empty);
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(ContinuationError::TooLong { len: token.len(), max: MAX_TOKEN_LEN });
    }

    let bytes = general_purpose::STANDARD
        .decode(token)
        .map_err(|err| ContinuationError::Base64(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| ContinuationError::Malformed(err.to_string()))
}

/// # Errors
/// Returns [`ContinuationError::Encode`] when the tree cannot be serialized.
pub fn encode(tree: &PlanTree) -> Result<String, ContinuationError> {
    let bytes = serde_json::to_vec(tree).map_err(|err| ContinuationError::Encode(err.to_string()))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

/// Follows the wrapper chain from the root down to the ranking operator.
///
/// # Errors
/// Returns [`ContinuationError::UnexpectedNode`] when the chain ends in anything other than a
/// `top_k` / `partial_top_k` node.
pub fn locate_ranking_node(tree: &mut PlanTree) -> Result<&mut RankingNode, ContinuationError> {
    locate_in(&mut tree.root)
}

fn locate_in(node: &mut PlanNode) -> Result<&mut RankingNode, ContinuationError> {
    match node {
        PlanNode::Projection(wrapper)
        | PlanNode::Filter(wrapper)
        | PlanNode::Bind(wrapper)
        | PlanNode::Limit(wrapper) => locate_in(&mut wrapper.source),
        PlanNode::TopK(ranking) | PlanNode::PartialTopK(ranking) => Ok(ranking),
        other => Err(ContinuationError::UnexpectedNode(other.kind())),
    }
}

/// Overwrites the named threshold fields; other threshold entries are left as they are.
pub fn set_threshold(node: &mut RankingNode, threshold: &BTreeMap<String, String>) {
    for (name, value) in threshold {
        node.threshold.insert(name.clone(), Value::String(value.clone()));
    }
}

/// Decodes `token`, sets `threshold` on its ranking operator and re-encodes it.
///
/// # Errors
/// Returns [`ContinuationError`] when the token does not decode or has no ranking operator.
pub fn with_threshold(
    token: &str,
    threshold: &BTreeMap<String, String>,
) -> Result<String, ContinuationError> {
    let mut tree = decode(token)?;
    set_threshold(locate_ranking_node(&mut tree)?, threshold);
    encode(&tree)
}
