//! Dominance tests, Pareto front extraction and crowding distances.
use crate::trial::{Direction, Trial, TrialState};
use ordered_float::OrderedFloat;

/// Returns `true` if `a` dominates `b` under the given per-objective
/// directions.
///
/// `a` dominates `b` iff it is no worse in every objective and strictly
/// better in at least one; equal vectors dominate in neither direction.
/// All three slices must have the same length.
pub fn dominates(a: &[f64], b: &[f64], directions: &[Direction]) -> Result<bool, ParetoError> {
    if a.len() != directions.len() || b.len() != directions.len() {
        return Err(ParetoError::ObjectiveCountMismatch {
            expected: directions.len(),
            got: if a.len() != directions.len() {
                a.len()
            } else {
                b.len()
            },
        });
    }
    Ok(dominates_unchecked(a, b, directions))
}

fn dominates_unchecked(a: &[f64], b: &[f64], directions: &[Direction]) -> bool {
    let mut strictly_better = false;
    for ((&x, &y), &direction) in a.iter().zip(b).zip(directions) {
        let (x, y) = (direction.key(x), direction.key(y));
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Extracts the set of non-dominated Complete trials.
///
/// Only Complete trials whose objective vector has one finite entry per
/// direction participate. The result preserves insertion order of the
/// surviving trials.
pub fn pareto_front(trials: &[Trial], directions: &[Direction]) -> Vec<Trial> {
    let candidates = trials
        .iter()
        .filter(|t| t.state == TrialState::Complete && t.has_finite_values(directions.len()));

    let mut front: Vec<&Trial> = Vec::new();
    for candidate in candidates {
        let values = candidate.values.as_ref().expect("unreachable");
        let dominated = front.iter().any(|member| {
            dominates_unchecked(
                member.values.as_ref().expect("unreachable"),
                values,
                directions,
            )
        });
        if dominated {
            continue;
        }
        front.retain(|member| {
            !dominates_unchecked(
                values,
                member.values.as_ref().expect("unreachable"),
                directions,
            )
        });
        front.push(candidate);
    }
    front.into_iter().cloned().collect()
}

/// Computes the crowding distance of every front member.
///
/// The result is aligned with `front`. Fronts of at most two members get
/// infinite distance everywhere; per objective, the boundary members get
/// infinity and interior members accumulate the normalized gap between
/// their neighbors. Objectives with no spread are skipped.
pub fn crowding_distances(front: &[Trial], directions: &[Direction]) -> Vec<f64> {
    let n = front.len();
    if n <= 2 {
        return vec![std::f64::INFINITY; n];
    }

    let mut distances = vec![0.0; n];
    for m in 0..directions.len() {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| OrderedFloat(objective(&front[i], m)));

        let min = objective(&front[order[0]], m);
        let max = objective(&front[order[n - 1]], m);
        if max == min {
            continue;
        }

        distances[order[0]] = std::f64::INFINITY;
        distances[order[n - 1]] = std::f64::INFINITY;
        for w in order.windows(3) {
            let (prev, curr, next) = (w[0], w[1], w[2]);
            distances[curr] +=
                (objective(&front[next], m) - objective(&front[prev], m)) / (max - min);
        }
    }
    distances
}

fn objective(trial: &Trial, m: usize) -> f64 {
    trial.values.as_ref().expect("unreachable")[m]
}

/// Possible errors from the Pareto utilities.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParetoError {
    /// Objective vectors must match the directions vector in length.
    #[error("expected {expected} objective values, got {got}")]
    ObjectiveCountMismatch {
        /// Number of directions.
        expected: usize,
        /// Offending vector length.
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete(number: u64, values: Vec<f64>) -> Trial {
        let mut trial = Trial::new(number, HashMap::new());
        trial.state = TrialState::Complete;
        trial.value = values.first().copied();
        trial.values = Some(values);
        trial
    }

    const MIN2: [Direction; 2] = [Direction::Minimize, Direction::Minimize];

    #[test]
    fn dominance_basics() -> anyhow::Result<()> {
        assert!(dominates(&[1.0, 2.0], &[2.0, 2.0], &MIN2)?);
        assert!(!dominates(&[1.0, 2.0], &[2.0, 1.0], &MIN2)?);
        assert!(!dominates(&[1.0, 2.0], &[1.0, 2.0], &MIN2)?);
        assert!(dominates(
            &[3.0, 3.0],
            &[1.0, 3.0],
            &[Direction::Maximize, Direction::Maximize],
        )?);
        Ok(())
    }

    #[test]
    fn dominance_is_antisymmetric_and_irreflexive() -> anyhow::Result<()> {
        let a = [1.0, 3.0];
        let b = [0.5, 4.0];
        assert!(!(dominates(&a, &b, &MIN2)? && dominates(&b, &a, &MIN2)?));
        assert!(!dominates(&a, &a, &MIN2)?);
        Ok(())
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        assert!(dominates(&[1.0], &[1.0, 2.0], &MIN2).is_err());
        assert!(dominates(&[1.0, 2.0], &[1.0], &MIN2).is_err());
    }

    #[test]
    fn front_on_two_objectives() {
        let trials = vec![
            complete(0, vec![1.0, 2.0]),
            complete(1, vec![2.0, 1.0]),
            complete(2, vec![2.0, 2.0]),
            complete(3, vec![3.0, 3.0]),
        ];
        let front = pareto_front(&trials, &MIN2);
        let numbers: Vec<u64> = front.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![0, 1]);
    }

    #[test]
    fn front_ignores_non_finite_and_non_complete() {
        let mut running = complete(2, vec![0.0, 0.0]);
        running.state = TrialState::Running;
        let trials = vec![
            complete(0, vec![1.0, 1.0]),
            complete(1, vec![std::f64::NAN, 0.0]),
            running,
        ];
        let front = pareto_front(&trials, &MIN2);
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].number, 0);
    }

    #[test]
    fn front_members_are_mutually_non_dominated() -> anyhow::Result<()> {
        let trials: Vec<Trial> = (0..20)
            .map(|i| {
                let x = (i as f64 * 0.37).sin().abs();
                complete(i, vec![x, 1.0 - x * (i as f64 * 0.11).cos()])
            })
            .collect();
        let front = pareto_front(&trials, &MIN2);
        for candidate in &trials {
            for member in &front {
                assert!(!dominates(
                    candidate.values.as_ref().unwrap(),
                    member.values.as_ref().unwrap(),
                    &MIN2,
                )?);
            }
        }
        Ok(())
    }

    #[test]
    fn crowding_boundaries_are_infinite() {
        let front = vec![
            complete(0, vec![0.0, 3.0]),
            complete(1, vec![1.0, 2.0]),
            complete(2, vec![2.0, 1.0]),
            complete(3, vec![3.0, 0.0]),
        ];
        let distances = crowding_distances(&front, &MIN2);
        assert!(distances[0].is_infinite());
        assert!(distances[3].is_infinite());
        assert!(distances[1].is_finite() && distances[1] > 0.0);
        assert!(distances[2].is_finite() && distances[2] > 0.0);
    }

    #[test]
    fn tiny_fronts_are_all_infinite() {
        let front = vec![complete(0, vec![1.0, 2.0]), complete(1, vec![2.0, 1.0])];
        assert!(crowding_distances(&front, &MIN2)
            .iter()
            .all(|d| d.is_infinite()));
    }

    #[test]
    fn degenerate_objective_is_skipped() {
        let front = vec![
            complete(0, vec![0.0, 5.0]),
            complete(1, vec![1.0, 5.0]),
            complete(2, vec![2.0, 5.0]),
        ];
        let distances = crowding_distances(&front, &MIN2);
        assert!(distances[0].is_infinite());
        assert!(distances[2].is_infinite());
        assert!(distances[1].is_finite());
    }
}
