// Number formatting shared by audit descriptions and the comparison grid

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half away from zero, the way analysts read disclosed figures
pub fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Thousands separators, at most `max_dp` decimals, trailing zeros dropped.
/// 61214.04 -> "61,214", -2306.35 -> "-2,306.4"
pub fn grouped(value: Decimal, max_dp: u32) -> String {
    let rounded = round(value, max_dp).normalize();
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text.clone(), None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut out = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }

    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{}", out)
    } else {
        out
    }
}

/// Exactly `dp` decimals, e.g. 1.6 -> "1.60"
pub fn fixed(value: Decimal, dp: u32) -> String {
    let mut v = round(value, dp);
    v.rescale(dp);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_grouped() {
        assert_eq!(grouped(d("61214.04"), 1), "61,214");
        assert_eq!(grouped(d("-2306.35"), 1), "-2,306.4");
        assert_eq!(grouped(d("999"), 1), "999");
        assert_eq!(grouped(d("1795084"), 1), "1,795,084");
        assert_eq!(grouped(d("0.04"), 1), "0");
        assert_eq!(grouped(d("-0.04"), 1), "0");
    }

    #[test]
    fn test_fixed() {
        assert_eq!(fixed(d("1.6"), 2), "1.60");
        assert_eq!(fixed(d("23.695"), 2), "23.70");
        assert_eq!(fixed(d("16"), 2), "16.00");
    }
}
