use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::term::RankValue;
use crate::Solution;

/// Prefix of ranking-key fields computed from `ORDER BY` expressions rather than bound by the
/// query itself. Such fields are removed from final results.
pub const SYNTHETIC_KEY_PREFIX: &str = "__order_condition_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct RankingKey {
    pub name: String,
    pub direction: Direction,
}

impl RankingKey {
    #[must_use]
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self { name: name.into(), direction }
    }

    /// Key for the `index`-th `ORDER BY` condition of a query.
    #[must_use]
    pub fn synthetic(index: usize, direction: Direction) -> Self {
        Self { name: format!("{SYNTHETIC_KEY_PREFIX}{index}"), direction }
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.name.starts_with(SYNTHETIC_KEY_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortSlot {
    Asc(RankValue),
    Desc(Reverse<RankValue>),
}

/// Position of one retained solution. Ties on every ranking key fall back to arrival order, so
/// an earlier arrival always ranks better than an equal later one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    slots: Vec<SortSlot>,
    arrival: u64,
}

/// The K best solutions seen so far, kept sorted best-to-worst.
///
/// Inserting is `O(K.log())`: the contents live in an ordered map whose last entry is the
/// current worst solution, which is also the eviction candidate.
#[derive(Debug, Clone)]
pub struct BoundedRanking {
    capacity: usize,
    keys: Vec<RankingKey>,
    entries: BTreeMap<SortKey, Solution>,
    arrivals: u64,
}

impl BoundedRanking {
    #[must_use]
    pub fn new(capacity: usize, keys: Vec<RankingKey>) -> Self {
        Self { capacity, keys, entries: BTreeMap::new(), arrivals: 0 }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn keys(&self) -> &[RankingKey] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Offer one solution. Returns `true` when the solution is retained, evicting the current
    /// worst solution if the ranking was already full.
    pub fn insert(&mut self, solution: Solution) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let key = self.sort_key(&solution);
        self.arrivals += 1;

        if self.entries.len() >= self.capacity {
            match self.entries.last_key_value() {
                Some((worst, _)) if key >= *worst => return false,
                _ => {}
            }
            self.entries.pop_last();
        }

        self.entries.insert(key, solution);
        true
    }

    /// Per-key values of the worst retained solution.
    ///
    /// Only defined once the ranking holds exactly `capacity` solutions; before that any
    /// solution could still enter, so no bound exists and `None` is returned. Keys that are
    /// unbound in the worst solution are left out of the map.
    #[must_use]
    pub fn lower_bound(&self) -> Option<BTreeMap<String, String>> {
        if self.capacity == 0 || self.entries.len() < self.capacity {
            return None;
        }

        let (_, worst) = self.entries.last_key_value()?;
        Some(
            self.keys
                .iter()
                .filter_map(|key| worst.get(&key.name).map(|value| (key.name.clone(), value.clone())))
                .collect(),
        )
    }

    /// Contents best-to-worst, without synthetic ranking-key fields.
    #[must_use]
    pub fn flatten(&self) -> Vec<Solution> {
        self.entries
            .values()
            .map(|solution| {
                let mut solution = solution.clone();
                for key in self.keys.iter().filter(|key| key.is_synthetic()) {
                    solution.remove(&key.name);
                }
                solution
            })
            .collect()
    }

    fn sort_key(&self, solution: &Solution) -> SortKey {
        let slots = self
            .keys
            .iter()
            .map(|key| {
                let value = RankValue::from_term(solution.get(&key.name).map(String::as_str));
                match key.direction {
                    Direction::Asc => SortSlot::Asc(value),
                    Direction::Desc => SortSlot::Desc(Reverse(value)),
                }
            })
            .collect();
        SortKey { slots, arrival: self.arrivals }
    }
}
