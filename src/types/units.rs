//! Ether / wei unit conversion.
//!
//! `parse_ether` and `format_ether` round-trip for any finite decimal with
//! at most 18 fractional digits.

use super::{NumericError, U256};

/// Wei per ether (10^18).
pub fn wei_per_ether() -> U256 {
    U256::from_u128(1_000_000_000_000_000_000)
}

/// Parse a decimal ether amount (e.g. `"1.5"`) into wei.
///
/// Accepts an optional fractional part of up to 18 digits.
pub fn parse_ether(s: &str) -> Result<U256, NumericError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(NumericError::Empty);
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if frac_part.len() > 18 {
        return Err(NumericError::TooManyFractionalDigits);
    }

    let int_wei = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_dec_str(int_part)?
            .checked_mul(wei_per_ether())
            .ok_or(NumericError::Overflow)?
    };

    let frac_wei = if frac_part.is_empty() {
        U256::ZERO
    } else {
        // Scale the fractional digits up to 18 places.
        let scale = 10u128.pow(18 - frac_part.len() as u32);
        U256::from_dec_str(frac_part)?
            .checked_mul(U256::from_u128(scale))
            .ok_or(NumericError::Overflow)?
    };

    int_wei.checked_add(frac_wei).ok_or(NumericError::Overflow)
}

/// Format a wei amount as a decimal ether string.
///
/// Trailing fractional zeros are trimmed; whole amounts carry no point.
pub fn format_ether(wei: U256) -> String {
    let (whole, frac) = wei.div_rem(wei_per_ether());
    if frac.is_zero() {
        return whole.to_dec_string();
    }
    let frac_str = format!("{:0>18}", frac.to_dec_string());
    let frac_str = frac_str.trim_end_matches('0');
    format!("{}.{}", whole.to_dec_string(), frac_str)
}

/// Parse a decimal gwei amount into wei.
pub fn parse_gwei(s: &str) -> Result<U256, NumericError> {
    let gwei = U256::from_dec_str(s.trim())?;
    gwei.checked_mul(U256::from_u64(1_000_000_000))
        .ok_or(NumericError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_ether() {
        assert_eq!(
            parse_ether("1").unwrap(),
            U256::from_u128(1_000_000_000_000_000_000)
        );
        assert_eq!(
            parse_ether("1000").unwrap(),
            U256::from_u128(1_000_000_000_000_000_000_000)
        );
        assert_eq!(parse_ether("0").unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_fractional_ether() {
        assert_eq!(
            parse_ether("1.5").unwrap(),
            U256::from_u128(1_500_000_000_000_000_000)
        );
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), U256::ONE);
        assert_eq!(
            parse_ether(".5").unwrap(),
            U256::from_u128(500_000_000_000_000_000)
        );
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert_eq!(
            parse_ether("1.0000000000000000001"),
            Err(NumericError::TooManyFractionalDigits)
        );
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(
            format_ether(U256::from_u128(1_000_000_000_000_000_000)),
            "1"
        );
        assert_eq!(
            format_ether(U256::from_u128(1_500_000_000_000_000_000)),
            "1.5"
        );
        assert_eq!(format_ether(U256::ONE), "0.000000000000000001");
        assert_eq!(format_ether(U256::ZERO), "0");
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "0",
            "1",
            "1.5",
            "999.999999999999999999",
            "0.000000000000000001",
            "123456789.000000001",
        ] {
            let wei = parse_ether(s).unwrap();
            assert_eq!(parse_ether(&format_ether(wei)).unwrap(), wei, "case {s}");
        }
    }

    #[test]
    fn test_parse_gwei() {
        assert_eq!(parse_gwei("1").unwrap(), U256::from_u64(1_000_000_000));
        assert_eq!(parse_gwei("10").unwrap(), U256::from_u64(10_000_000_000));
    }
}
