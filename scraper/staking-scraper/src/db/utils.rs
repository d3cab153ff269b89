//! Conversions between domain integers and database numerics

use std::str::FromStr;

use alloy::primitives::{I256, U256};
use bigdecimal::BigDecimal;

use crate::db::error::DbError;

/// Convert a `U256` to a `BigDecimal`
pub fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    BigDecimal::from_str(&value.to_string()).unwrap_or_default()
}

/// Convert a `BigDecimal` to a `U256`
pub fn bigdecimal_to_u256(value: &BigDecimal) -> Result<U256, DbError> {
    let integer = value.with_scale(0).to_string();
    U256::from_str(&integer).map_err(|e| DbError::conversion(format!("{value} is not a u256: {e}")))
}

/// Convert an `I256` to a `BigDecimal`
pub fn i256_to_bigdecimal(value: I256) -> BigDecimal {
    BigDecimal::from_str(&value.to_string()).unwrap_or_default()
}

/// Convert a `BigDecimal` to an `I256`
pub fn bigdecimal_to_i256(value: &BigDecimal) -> Result<I256, DbError> {
    let integer = value.with_scale(0).to_string();
    I256::from_str(&integer).map_err(|e| DbError::conversion(format!("{value} is not an i256: {e}")))
}

/// Convert a `u64` to the `BIGINT` it is stored as
pub fn u64_to_i64(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(DbError::conversion)
}

/// Convert a stored `BIGINT` to a `u64`
pub fn i64_to_u64(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(DbError::conversion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_values_survive_numeric() {
        let value = U256::MAX;
        assert_eq!(bigdecimal_to_u256(&u256_to_bigdecimal(value)).unwrap(), value);

        let negative = I256::try_from(-12_345i64).unwrap();
        assert_eq!(bigdecimal_to_i256(&i256_to_bigdecimal(negative)).unwrap(), negative);
    }

    #[test]
    fn test_negative_numeric_is_not_a_u256() {
        let negative = BigDecimal::from(-1);
        assert!(matches!(bigdecimal_to_u256(&negative), Err(DbError::Conversion(_))));
        assert!(matches!(u64_to_i64(u64::MAX), Err(DbError::Conversion(_))));
    }
}
