//! Post-ranking pipe operators.

use rand::seq::index;
use rand::Rng;

use crate::ast::{PipeKind, PipeOp};

/// Run `ops` in order over `items`. Each step sees the previous step's output.
///
/// An `n` at or above the current length keeps everything.
pub fn apply_pipes<T, R: Rng + ?Sized>(mut items: Vec<T>, ops: &[PipeOp], rng: &mut R) -> Vec<T> {
    for op in ops {
        if op.n >= items.len() {
            continue;
        }
        items = match op.kind {
            PipeKind::Head => {
                items.truncate(op.n);
                items
            }
            PipeKind::Tail => items.split_off(items.len() - op.n),
            PipeKind::Sample => sample(items, op.n, rng),
        };
    }
    items
}

/// Uniform sample without replacement, kept in input order.
fn sample<T, R: Rng + ?Sized>(items: Vec<T>, n: usize, rng: &mut R) -> Vec<T> {
    let mut keep = vec![false; items.len()];
    for i in index::sample(rng, items.len(), n).iter() {
        keep[i] = true;
    }
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, kept)| kept.then_some(item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn ranked(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn test_head_then_tail() {
        let out = apply_pipes(ranked(100), &[PipeOp::head(20), PipeOp::tail(5)], &mut rng());
        assert_eq!(out, vec![16, 17, 18, 19, 20]);
    }

    #[test]
    fn test_order_matters() {
        let a = apply_pipes(ranked(10), &[PipeOp::head(5), PipeOp::tail(2)], &mut rng());
        let b = apply_pipes(ranked(10), &[PipeOp::tail(2), PipeOp::head(5)], &mut rng());
        assert_eq!(a, vec![4, 5]);
        assert_eq!(b, vec![9, 10]);
    }

    #[test]
    fn test_oversized_n_is_noop() {
        let ops = [PipeOp::head(50), PipeOp::tail(50), PipeOp::sample(50)];
        assert_eq!(apply_pipes(ranked(10), &ops, &mut rng()), ranked(10));
        assert!(apply_pipes(Vec::<usize>::new(), &ops, &mut rng()).is_empty());
    }

    #[test]
    fn test_zero_empties() {
        assert!(apply_pipes(ranked(10), &[PipeOp::tail(0)], &mut rng()).is_empty());
    }

    #[test]
    fn test_sample_is_subset_in_rank_order() {
        let out = apply_pipes(ranked(50), &[PipeOp::sample(10)], &mut rng());
        assert_eq!(out.len(), 10);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
        assert!(out.iter().all(|x| (1..=50).contains(x)));
    }

    #[test]
    fn test_sample_is_reproducible_with_seed() {
        let a = apply_pipes(ranked(50), &[PipeOp::sample(5)], &mut rng());
        let b = apply_pipes(ranked(50), &[PipeOp::sample(5)], &mut rng());
        assert_eq!(a, b);
    }
}
