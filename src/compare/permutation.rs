//! Column permutation search.
//!
//! Narrows, for every gold column, the set of candidate columns that could be
//! mapped onto it, then enumerates the bijections left over.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::db::{Row, Value};

/// Builds the admissible candidate columns for each gold column.
///
/// Up to `prune_threshold` columns every mapping is admissible. Above it,
/// `sample_rows` candidate rows are drawn (with replacement) and a candidate
/// column is eliminated for a gold column as soon as a sampled value is absent
/// from that gold column's value set. Elimination relies only on a necessary
/// condition, so a bijection that makes the results equal is never pruned.
pub fn admissible_columns<R: Rng + ?Sized>(
    gold_columns: &[HashSet<&Value>],
    candidate: &[Row],
    sample_rows: usize,
    prune_threshold: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let num_cols = gold_columns.len();
    let mut admissible: Vec<Vec<usize>> = vec![(0..num_cols).collect(); num_cols];
    if num_cols <= prune_threshold {
        return admissible;
    }

    for _ in 0..sample_rows {
        let Some(row) = candidate.choose(rng) else {
            break;
        };
        for (gold_col, targets) in admissible.iter_mut().enumerate() {
            targets.retain(|&cand_col| gold_columns[gold_col].contains(&row[cand_col]));
        }
    }

    admissible
}

/// Visits every bijection drawn from `admissible` until `visit` returns true.
///
/// `perm[i] = j` maps gold column `i` onto candidate column `j`. Returns true
/// if some visited permutation was accepted.
pub fn find_bijection<F>(admissible: &[Vec<usize>], mut visit: F) -> bool
where
    F: FnMut(&[usize]) -> bool,
{
    let mut perm = Vec::with_capacity(admissible.len());
    let mut used = vec![false; admissible.len()];
    extend(admissible, &mut perm, &mut used, &mut visit)
}

fn extend<F>(admissible: &[Vec<usize>], perm: &mut Vec<usize>, used: &mut [bool], visit: &mut F) -> bool
where
    F: FnMut(&[usize]) -> bool,
{
    let depth = perm.len();
    if depth == admissible.len() {
        return visit(perm);
    }

    for &target in &admissible[depth] {
        if used[target] {
            continue;
        }
        used[target] = true;
        perm.push(target);
        let accepted = extend(admissible, perm, used, visit);
        perm.pop();
        used[target] = false;
        if accepted {
            return true;
        }
    }
    false
}

/// Reorders a row's columns so that column `i` holds `row[perm[i]]`.
pub fn permute_row(row: &Row, perm: &[usize]) -> Row {
    perm.iter().map(|&i| row[i].clone()).collect()
}
