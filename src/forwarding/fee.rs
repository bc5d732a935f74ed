//! Sweep fee arithmetic.

/// `ceil(fee_per_kb * bytes / 1000)`, with 1 kB = 1000 bytes.
pub fn fee_for_size(fee_per_kb: u64, bytes: usize) -> u64 {
    let scaled = fee_per_kb.saturating_mul(bytes as u64);
    scaled.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_up() {
        assert_eq!(fee_for_size(15_000, 1000), 15_000);
        assert_eq!(fee_for_size(15_000, 192), 2_880);
        assert_eq!(fee_for_size(1_000, 1), 1);
        assert_eq!(fee_for_size(1, 1), 1);
        assert_eq!(fee_for_size(15_000, 0), 0);
    }

    #[test]
    fn test_scales_with_size() {
        let small = fee_for_size(15_000, 192);
        let large = fee_for_size(15_000, 192 + 148);
        assert!(large > small);
    }
}
