//! Numeric helpers shared across the scraper

use alloy::primitives::{I256, U256};

/// 2^64 as a float, the weight of one limb
const LIMB_BASE: f64 = 18_446_744_073_709_551_616.0;

/// Convert a `U256` to an `f64`, rounding to the nearest representable value
pub fn u256_to_f64(value: U256) -> f64 {
    value.as_limbs().iter().rev().fold(0.0, |acc, limb| acc * LIMB_BASE + *limb as f64)
}

/// Convert an `I256` to an `f64`
pub fn i256_to_f64(value: I256) -> f64 {
    let magnitude = u256_to_f64(value.unsigned_abs());
    if value.is_negative() { -magnitude } else { magnitude }
}

/// Convert a `U256` to a `u64`, saturating at `u64::MAX`
pub fn u256_to_u64_saturating(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_f64_small_values_are_exact() {
        assert_eq!(u256_to_f64(U256::ZERO), 0.0);
        assert_eq!(u256_to_f64(U256::from(12_345u64)), 12_345.0);
        assert_eq!(u256_to_f64(U256::from(u64::MAX)), u64::MAX as f64);
    }

    #[test]
    fn test_u256_to_f64_multi_limb() {
        // 10^30 spans two limbs
        let value = U256::from(10u64).pow(U256::from(30u64));
        let converted = u256_to_f64(value);
        assert!((converted - 1e30).abs() / 1e30 < 1e-12);
    }

    #[test]
    fn test_i256_to_f64_sign() {
        let negative = I256::try_from(-42i64).unwrap();
        assert_eq!(i256_to_f64(negative), -42.0);
        assert_eq!(i256_to_f64(I256::try_from(7i64).unwrap()), 7.0);
    }

    #[test]
    fn test_u256_to_u64_saturates() {
        assert_eq!(u256_to_u64_saturating(U256::from(9u64)), 9);
        assert_eq!(u256_to_u64_saturating(U256::MAX), u64::MAX);
    }
}
