//! Denotation comparison.
//!
//! Decides whether two result sets denote the same relation under bag
//! semantics, tolerating column reordering and (unless order matters) row
//! reordering. Pure and side-effect free.

mod permutation;

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::db::{Row, Value};

use permutation::{admissible_columns, find_bijection, permute_row};

/// Default number of candidate rows sampled to prune column permutations.
///
/// This is a tuning knob for search cost, not a correctness bound: pruning
/// never removes a permutation that would make the results equal.
pub const DEFAULT_SAMPLE_ROWS: usize = 20;

/// Default column count up to which every permutation is tried unpruned.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 3;

/// Tuning parameters for the permutation search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Candidate rows sampled when pruning column permutations.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Column count up to which pruning is skipped.
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: usize,

    /// Seed for the sampling RNG. Thread-local randomness when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_sample_rows() -> usize {
    DEFAULT_SAMPLE_ROWS
}

fn default_prune_threshold() -> usize {
    DEFAULT_PRUNE_THRESHOLD
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_sample_rows(),
            prune_threshold: default_prune_threshold(),
            seed: None,
        }
    }
}

/// Compares result sets for denotation equivalence.
#[derive(Debug, Clone, Default)]
pub struct DenotationComparator {
    config: ComparatorConfig,
}

impl DenotationComparator {
    /// Creates a comparator with the given tuning parameters.
    pub fn new(config: ComparatorConfig) -> Self {
        Self { config }
    }

    /// Returns true if `gold` and `candidate` denote the same relation.
    pub fn equivalent(&self, gold: &[Row], candidate: &[Row], order_matters: bool) -> bool {
        match self.config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                self.equivalent_with_rng(gold, candidate, order_matters, &mut rng)
            }
            None => {
                let mut rng = rand::thread_rng();
                self.equivalent_with_rng(gold, candidate, order_matters, &mut rng)
            }
        }
    }

    /// Same as [`equivalent`](Self::equivalent) with an explicit sampling RNG.
    pub fn equivalent_with_rng<R: Rng + ?Sized>(
        &self,
        gold: &[Row],
        candidate: &[Row],
        order_matters: bool,
        rng: &mut R,
    ) -> bool {
        if gold.is_empty() && candidate.is_empty() {
            return true;
        }
        if gold.len() != candidate.len() {
            return false;
        }

        let num_cols = gold[0].len();
        if candidate[0].len() != num_cols {
            return false;
        }

        if !quick_accept(gold, candidate, order_matters) {
            return false;
        }

        if num_cols == 1 {
            return rows_match(gold, candidate, order_matters);
        }

        let gold_columns: Vec<HashSet<&Value>> = (0..num_cols)
            .map(|col| gold.iter().map(|row| &row[col]).collect())
            .collect();

        let admissible = admissible_columns(
            &gold_columns,
            candidate,
            self.config.sample_rows,
            self.config.prune_threshold,
            rng,
        );

        find_bijection(&admissible, |perm| {
            let permuted: Vec<Row> = candidate.iter().map(|row| permute_row(row, perm)).collect();
            rows_match(gold, &permuted, order_matters)
        })
    }
}

/// Returns true if two result sets are equivalent, using default tuning.
pub fn result_eq(gold: &[Row], candidate: &[Row], order_matters: bool) -> bool {
    DenotationComparator::default().equivalent(gold, candidate, order_matters)
}

/// Sorts a row's own values so that column order no longer matters.
fn unorder_row(row: &Row) -> Row {
    let mut sorted = row.clone();
    sorted.sort_by_cached_key(Value::sort_key);
    sorted
}

/// Cheap necessary condition for equivalence: with every row unordered, the
/// ordered sequences (or the sets of rows) must be equal.
fn quick_accept(gold: &[Row], candidate: &[Row], order_matters: bool) -> bool {
    let gold_rows: Vec<Row> = gold.iter().map(unorder_row).collect();
    let candidate_rows: Vec<Row> = candidate.iter().map(unorder_row).collect();
    if order_matters {
        gold_rows == candidate_rows
    } else {
        let gold_set: HashSet<&Row> = gold_rows.iter().collect();
        let candidate_set: HashSet<&Row> = candidate_rows.iter().collect();
        gold_set == candidate_set
    }
}

/// Full check for column-aligned rows.
///
/// Set equality is tested first as a fast filter; multiset equality is what
/// actually decides, since sets ignore duplicate counts.
fn rows_match(gold: &[Row], candidate: &[Row], order_matters: bool) -> bool {
    if order_matters {
        return gold == candidate;
    }
    let gold_set: HashSet<&Row> = gold.iter().collect();
    let candidate_set: HashSet<&Row> = candidate.iter().collect();
    gold_set == candidate_set && multiset_eq(gold, candidate)
}

/// Returns true if both slices hold the same rows with the same multiplicities.
fn multiset_eq(left: &[Row], right: &[Row]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut counts: HashMap<&Row, i64> = HashMap::new();
    for row in left {
        *counts.entry(row).or_insert(0) += 1;
    }
    for row in right {
        let count = counts.entry(row).or_insert(0);
        *count -= 1;
        if *count < 0 {
            return false;
        }
    }
    true
}
