//! Mulberry32: a tiny, fast, seedable generator. Pure per call — the draw
//! depends only on the input seed, so parallel callers never share state and
//! a (seed, index) pair always reproduces the same value.

/// One uniform draw in `[0, 1)` derived from `seed`. The seed is truncated
/// to 32 bits; callers fold iteration indices into it before drawing.
pub fn draw(seed: u64) -> f64 {
    let mut t = seed.wrapping_add(0x6d2b_79f5) as u32;
    t = (t ^ (t >> 15)).wrapping_mul(t | 1);
    t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
    f64::from(t ^ (t >> 14)) / 4_294_967_296.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(draw(42), draw(42));
        assert_ne!(draw(42), draw(43));
    }

    #[test]
    fn test_unit_interval() {
        for seed in 0..10_000u64 {
            let v = draw(seed.wrapping_mul(2_654_435_761));
            assert!((0.0..1.0).contains(&v), "draw({seed}) = {v}");
        }
    }

    #[test]
    fn test_rough_uniformity() {
        let n = 100_000u64;
        let mean: f64 = (0..n).map(draw).sum::<f64>() / n as f64;
        assert!((mean - 0.5).abs() < 0.01, "mean = {mean}");
    }

    #[test]
    fn test_seed_truncation_wraps() {
        // Seeds that agree mod 2^32 draw the same value.
        assert_eq!(draw(7), draw(7 + (1u64 << 32)));
    }
}
