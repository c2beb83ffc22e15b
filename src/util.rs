/// Derives an independent RNG seed for one worker from a user-supplied base seed.
///
/// Uses the SplitMix64 finalizer so that neighboring worker ids yield
/// well-separated seeds while staying fully reproducible.
///
/// # Returns
/// * `u64` - The seed for worker `worker_id`
pub fn derive_seed(base_seed: u64, worker_id: usize) -> u64 {
    let mut z = base_seed.wrapping_add((worker_id as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod test_util {
    use super::derive_seed;

    #[test]
    fn test_derive_seed_stable_and_distinct() {
        assert_eq!(derive_seed(3000, 0), derive_seed(3000, 0));
        assert_ne!(derive_seed(3000, 0), derive_seed(3000, 1));
        assert_ne!(derive_seed(3000, 0), derive_seed(3001, 0));
    }
}
