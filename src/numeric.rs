//! Numeric normalization for human-entered quantities.
//!
//! Form inputs arrive in mixed conventions: `"20.000,50"`, `"20.000.000"`,
//! `"123.45"`. [`parse_number`] turns any of them into an `f64` and never
//! fails; [`format_number`] renders values back with `.` thousands grouping and
//! `,` as the decimal separator, which [`parse_number`] reads back unchanged.

use serde::{Deserialize, Serialize};

/// A raw value as it appears in a form or a persisted step record.
///
/// Records store editable inputs as strings and derived values as numbers,
/// and clients may send `null` for a cleared input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
    #[default]
    Null,
}

impl NumberInput {
    /// Canonical numeric value of this input.
    pub fn value(&self) -> f64 {
        match self {
            Self::Number(n) if n.is_finite() => *n,
            Self::Number(_) | Self::Null => 0.0,
            Self::Text(s) => parse_number(s),
        }
    }

    /// The input as form text. Numbers use a decimal comma and no grouping so
    /// that [`parse_number`] reads them back exactly.
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) if n.is_finite() => n.to_string().replace('.', ","),
            Self::Number(_) | Self::Null => String::new(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for NumberInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for NumberInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for NumberInput {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Most fractional digits [`format_number`] renders; larger requests are clamped.
pub const MAX_DECIMALS: u32 = 20;

/// How a value is pre-rounded before formatting.
///
/// `Round` sends halves away from zero, so `2.5` becomes `3` and `-2.5`
/// becomes `-3`. Rounding is symmetric around zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    Round,
    Floor,
    Ceil,
    /// Leave rounding to the formatter.
    None,
}

impl RoundingMode {
    fn apply(&self, value: f64, decimals: u32) -> f64 {
        let factor = 10f64.powi(decimals as i32);
        let scaled = value * factor;
        if !scaled.is_finite() {
            return value;
        }
        let rounded = match self {
            Self::Round => scaled.round(),
            Self::Floor => scaled.floor(),
            Self::Ceil => scaled.ceil(),
            Self::None => return value,
        };
        rounded / factor
    }
}

/// Parse a human-entered number, resolving `.` and `,` separators.
///
/// Precedence:
/// 1. a comma is the decimal separator; periods are thousands separators;
/// 2. more than one period means every period groups thousands;
/// 3. a single period followed by at most two digits is a decimal point;
/// 4. otherwise periods group thousands.
///
/// Empty input, input without digits, and anything that does not start with a
/// decimal literal after normalization all yield `0`.
pub fn parse_number(input: &str) -> f64 {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.chars().any(|c| c.is_ascii_digit()) {
        return 0.0;
    }

    let normalized = if compact.contains(',') {
        compact.replace('.', "").replacen(',', ".", 1)
    } else {
        let periods = compact.matches('.').count();
        match compact.split_once('.') {
            Some((_, fraction)) if periods == 1 && fraction.len() <= 2 => compact,
            _ => compact.replace('.', ""),
        }
    };

    leading_decimal(&normalized)
        .and_then(|literal| literal.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Longest prefix of `s` shaped like `[+-]digits[.digits][e[+-]digits]`.
fn leading_decimal(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    Some(&s[..end])
}

/// Format `value` with grouped thousands and exactly `decimals` fractional digits.
///
/// Non-finite values render as `"0"`. `decimals` is clamped to [`MAX_DECIMALS`].
pub fn format_number(value: f64, decimals: u32, mode: RoundingMode) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let decimals = decimals.min(MAX_DECIMALS);

    let mut rounded = mode.apply(value, decimals);
    if rounded == 0.0 {
        // drop the sign of negative zero
        rounded = 0.0;
    }

    let digits = format!("{:.*}", decimals as usize, rounded.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + int_part.len() / 3 + 1);
    let negative = rounded < 0.0 && digits.bytes().any(|b| matches!(b, b'1'..=b'9'));
    if negative {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_non_numeric_inputs_are_zero() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("   "), 0.0);
        assert_eq!(parse_number("abc"), 0.0);
        assert_eq!(NumberInput::Null.value(), 0.0);
        assert_eq!(NumberInput::Number(f64::NAN).value(), 0.0);
    }

    #[test]
    fn comma_is_decimal_separator() {
        assert_eq!(parse_number("20.000,50"), 20000.5);
        assert_eq!(parse_number("0,5"), 0.5);
        assert_eq!(parse_number("-1.234,5"), -1234.5);
    }

    #[test]
    fn multiple_periods_group_thousands() {
        assert_eq!(parse_number("20.000.000"), 20_000_000.0);
    }

    #[test]
    fn single_period_with_short_fraction_is_decimal() {
        assert_eq!(parse_number("123.45"), 123.45);
        assert_eq!(parse_number("7.5"), 7.5);
    }

    #[test]
    fn single_period_with_long_fraction_groups_thousands() {
        assert_eq!(parse_number("20.000"), 20000.0);
        assert_eq!(parse_number("1.2345"), 12345.0);
    }

    #[test]
    fn numeric_inputs_render_as_parseable_text() {
        let input = NumberInput::Number(1234.567);
        assert_eq!(input.as_text(), "1234,567");
        assert_eq!(parse_number(&input.as_text()), 1234.567);
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(parse_number(" 20 000,5 "), 20000.5);
    }

    #[test]
    fn trailing_units_are_ignored() {
        assert_eq!(parse_number("12kg"), 12.0);
        assert_eq!(parse_number("kg12"), 0.0);
    }

    #[test]
    fn infinity_spellings_do_not_parse() {
        assert_eq!(parse_number("inf1"), 0.0);
        assert_eq!(parse_number("1e999"), 0.0);
    }

    #[test]
    fn formats_grouped_with_decimal_comma() {
        assert_eq!(format_number(20000.5, 2, RoundingMode::Round), "20.000,50");
        assert_eq!(format_number(1234567.0, 0, RoundingMode::Round), "1.234.567");
        assert_eq!(format_number(999.0, 0, RoundingMode::Round), "999");
        assert_eq!(format_number(-1234.5, 1, RoundingMode::Round), "-1.234,5");
    }

    #[test]
    fn rounding_modes() {
        assert_eq!(format_number(1.235, 1, RoundingMode::Floor), "1,2");
        assert_eq!(format_number(1.21, 1, RoundingMode::Ceil), "1,3");
        assert_eq!(format_number(2.5, 0, RoundingMode::Round), "3");
        assert_eq!(format_number(1.26, 1, RoundingMode::None), "1,3");
    }

    #[test]
    fn halves_round_away_from_zero() {
        assert_eq!(format_number(2.5, 0, RoundingMode::Round), "3");
        assert_eq!(format_number(-2.5, 0, RoundingMode::Round), "-3");
        assert_eq!(format_number(-0.5, 0, RoundingMode::Round), "-1");
    }

    #[test]
    fn decimals_are_clamped() {
        let text = format_number(1.5, u32::MAX, RoundingMode::Round);
        assert_eq!(text, format!("1,5{}", "0".repeat(MAX_DECIMALS as usize - 1)));
        assert_eq!(
            format_number(1.5, u32::MAX, RoundingMode::Floor),
            format_number(1.5, MAX_DECIMALS, RoundingMode::Floor)
        );
    }

    #[test]
    fn non_finite_formats_as_zero() {
        assert_eq!(format_number(f64::NAN, 0, RoundingMode::Round), "0");
        assert_eq!(format_number(f64::INFINITY, 2, RoundingMode::Round), "0");
    }

    #[test]
    fn negative_zero_has_no_sign() {
        assert_eq!(format_number(-0.001, 2, RoundingMode::Round), "0,00");
    }

    #[test]
    fn formatted_values_parse_back() {
        for x in [0.0, 0.004, 1.0, 12.345, -98765.4321, 1_000_000.0, 3.14159e7] {
            let text = format_number(x, 2, RoundingMode::Round);
            let expected = (x * 100.0).round() / 100.0;
            assert!(
                (parse_number(&text) - expected).abs() < 1e-9,
                "{x} -> {text}"
            );
        }
    }
}
