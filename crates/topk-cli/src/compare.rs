use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub type SolutionObject = Map<String, Value>;

/// Result of checking an actual result set against a reference, as multisets.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Verdict {
    pub correct: bool,
    pub reference_solutions: usize,
    pub actual_solutions: usize,
    pub missing_solutions: usize,
    pub first_unexpected: Option<Value>,
    pub first_duplicated: Option<Value>,
}

pub fn load_solutions(path: &Path) -> Result<Vec<SolutionObject>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read result file {}", path.display()))?;
    let value: Value = serde_json::from_str(&body)
        .with_context(|| format!("result file is not valid JSON: {}", path.display()))?;
    let Value::Array(rows) = value else {
        return Err(anyhow!("result file {} must hold a JSON array of solutions", path.display()));
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(solution) => Ok(solution),
            _ => Err(anyhow!("solution {index} in {} is not an object", path.display())),
        })
        .collect()
}

/// SHA-256 of the solution with its variables in sorted order.
pub fn fingerprint(solution: &SolutionObject) -> Result<String> {
    let canonical = solution.iter().collect::<BTreeMap<_, _>>();
    let bytes = serde_json::to_vec(&canonical).context("failed to canonicalize solution")?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

fn canonical_value(solution: &SolutionObject) -> Value {
    let mut sorted = solution.iter().collect::<Vec<_>>();
    sorted.sort_by(|lhs, rhs| lhs.0.cmp(rhs.0));
    Value::Object(sorted.into_iter().map(|(name, value)| (name.clone(), value.clone())).collect())
}

pub fn compare(reference: &[SolutionObject], actual: &[SolutionObject]) -> Result<Verdict> {
    let mut remaining = HashMap::<String, i64>::new();
    for solution in reference {
        *remaining.entry(fingerprint(solution)?).or_insert(0) += 1;
    }

    let mut first_unexpected = None;
    let mut first_duplicated = None;
    for solution in actual {
        match remaining.get_mut(&fingerprint(solution)?) {
            None => {
                if first_unexpected.is_none() {
                    tracing::info!(solution = %canonical_value(solution), "incorrect solution");
                    first_unexpected = Some(canonical_value(solution));
                }
            }
            Some(count) => {
                *count -= 1;
                if *count < 0 && first_duplicated.is_none() {
                    tracing::info!(solution = %canonical_value(solution), "duplicated solution");
                    first_duplicated = Some(canonical_value(solution));
                }
            }
        }
    }

    let missing_solutions = remaining
        .values()
        .filter(|count| **count > 0)
        .map(|count| usize::try_from(*count).unwrap_or(usize::MAX))
        .sum::<usize>();
    let correct = first_unexpected.is_none() && remaining.values().all(|count| *count == 0);

    Ok(Verdict {
        correct,
        reference_solutions: reference.len(),
        actual_solutions: actual.len(),
        missing_solutions,
        first_unexpected,
        first_duplicated,
    })
}
