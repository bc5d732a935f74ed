//! Bonus pool split between the winner and the next draw.

use serde::Serialize;

/// An exact rational share in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BonusFraction {
    pub numerator: u64,
    pub denominator: u64,
}

impl BonusFraction {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        let denominator = denominator.max(1);
        Self {
            numerator: numerator.min(denominator),
            denominator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BonusSplit {
    pub winner_bonus: u64,
    pub carry: u64,
}

/// `winner = floor(pool · fraction)`; the carry takes the exact remainder so
/// no satoshi is created or lost.
pub fn split_pool(pool: u64, fraction: BonusFraction) -> BonusSplit {
    let winner_bonus =
        (pool as u128 * fraction.numerator as u128 / fraction.denominator as u128) as u64;
    BonusSplit {
        winner_bonus,
        carry: pool - winner_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_plus_sponsor_at_forty_percent() {
        let split = split_pool(100 + 50, BonusFraction::new(2, 5));
        assert_eq!(split, BonusSplit { winner_bonus: 60, carry: 90 });
    }

    #[test]
    fn test_remainder_goes_to_carry() {
        let split = split_pool(1001, BonusFraction::new(1, 1000));
        assert_eq!(split.winner_bonus, 1);
        assert_eq!(split.carry, 1000);
    }

    #[test]
    fn test_full_fraction_pays_everything() {
        let split = split_pool(u64::MAX, BonusFraction::new(1000, 1000));
        assert_eq!(split.winner_bonus, u64::MAX);
        assert_eq!(split.carry, 0);
    }

    #[test]
    fn test_fraction_clamped() {
        assert_eq!(BonusFraction::new(7, 5), BonusFraction::new(5, 5));
    }
}
