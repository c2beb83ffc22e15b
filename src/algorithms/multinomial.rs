use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;

use crate::algorithms::label_store::Label;

/// Multinomial distribution over the labels observed at one vertex.
///
/// Probabilities are the observed frequencies, stored as cumulative upper
/// bounds so a single uniform draw selects a label.
#[derive(Debug, Clone)]
pub struct MultinomialLabels {
    labels: Vec<Label>,
    bounds: Vec<f64>,
}

impl MultinomialLabels {
    /// Builds the distribution from `(label, count)` pairs.
    ///
    /// # Returns
    /// `None` if there is nothing to sample from (no labels, or all counts zero).
    pub fn new(observed: &[(Label, u32)]) -> Option<Self> {
        let total = observed.iter().map(|(_, count)| *count as f64).sum::<f64>();
        if total <= 0.0 {
            return None;
        }

        let mut labels = Vec::with_capacity(observed.len());
        let mut bounds = Vec::with_capacity(observed.len());
        let mut cumulative = 0.0;
        for (label, count) in observed {
            cumulative += *count as f64 / total;
            labels.push(*label);
            bounds.push(cumulative);
        }
        Some(Self { labels, bounds })
    }

    /// Draws one label.
    ///
    /// Returns the first label whose cumulative bound exceeds a uniform draw in
    /// `[0, 1)`; rounding can leave the last bound just below 1.0, in which case
    /// the last label is returned.
    pub fn sample<R>(&self, rng: &mut R) -> Label
    where
        R: Rng + ?Sized
    {
        let roll = rng.gen::<f64>();
        self.bounds
            .iter()
            .position(|bound| roll < *bound)
            .map(|slot| self.labels[slot])
            .unwrap_or(self.labels[self.labels.len() - 1])
    }
}

/// Picks the most frequent label of a tally, breaking ties uniformly at random.
///
/// Tied labels are sorted before the draw so the choice depends only on the
/// RNG state, not on map iteration order.
pub fn max_label<R>(tally: &FxHashMap<Label, u32>, rng: &mut R) -> Option<Label>
where
    R: Rng + ?Sized
{
    let best_count = tally.values().copied().max()?;
    let mut best_labels = tally
        .iter()
        .filter(|(_, count)| **count == best_count)
        .map(|(label, _)| *label)
        .collect::<Vec<_>>();
    best_labels.sort_unstable();
    best_labels.choose(rng).copied()
}

#[cfg(test)]
mod test_multinomial {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_empty_and_zero() {
        assert!(MultinomialLabels::new(&[]).is_none());
        assert!(MultinomialLabels::new(&[(3, 0)]).is_none());
    }

    #[test]
    fn test_single_label_always_sampled() {
        let dist = MultinomialLabels::new(&[(7, 4)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(dist.sample(&mut rng), 7);
        }
    }

    #[test]
    fn test_zero_count_label_never_sampled() {
        let dist = MultinomialLabels::new(&[(1, 0), (2, 5), (3, 0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            assert_eq!(dist.sample(&mut rng), 2);
        }
    }

    #[test]
    fn test_frequencies_follow_counts() {
        let dist = MultinomialLabels::new(&[(0, 1), (1, 3)]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 20_000;
        let ones = (0..draws).filter(|_| dist.sample(&mut rng) == 1).count();
        let share = ones as f64 / draws as f64;
        assert!((share - 0.75).abs() < 0.03, "share of label 1 was {}", share);
    }

    #[test]
    fn test_max_label_unique() {
        let tally = FxHashMap::from_iter([(1, 2), (4, 5), (9, 1)]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(max_label(&tally, &mut rng), Some(4));
        assert_eq!(max_label(&FxHashMap::default(), &mut rng), None);
    }

    #[test]
    fn test_max_label_ties_are_uniform() {
        // Two labels tied at the top, one below: the loser must never win.
        let tally = FxHashMap::from_iter([(1, 3), (2, 3), (5, 1)]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut wins = [0usize; 3];
        for _ in 0..4000 {
            match max_label(&tally, &mut rng) {
                Some(1) => wins[0] += 1,
                Some(2) => wins[1] += 1,
                _ => wins[2] += 1,
            }
        }
        assert_eq!(wins[2], 0);
        assert!(wins[0] > 1700 && wins[1] > 1700, "tie wins were {:?}", wins);
    }

    #[test]
    fn test_max_label_reproducible() {
        let tally = FxHashMap::from_iter([(10, 2), (20, 2), (30, 2)]);
        let picks = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16).map(|_| max_label(&tally, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(picks(77), picks(77));
    }
}
