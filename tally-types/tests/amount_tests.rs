use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use tally_types::{Amount, Error, AMOUNT_SCALE};

// ── Parsing ───────────────────────────────────────────────────────

#[test]
fn parse_whole_and_fraction() {
    let a: Amount = "1234.56".parse().unwrap();
    assert_eq!(a.units(), 123_456_000_000);
}

#[test]
fn parse_negative() {
    let a: Amount = "-10.5".parse().unwrap();
    assert_eq!(a, -Amount::from_whole(10) - "0.5".parse().unwrap());
}

#[test]
fn parse_leading_dot_and_plus() {
    assert_eq!("+.25".parse::<Amount>().unwrap().to_string(), "0.25");
    assert_eq!("7.".parse::<Amount>().unwrap(), Amount::from_whole(7));
}

#[test]
fn parse_trims_whitespace() {
    assert_eq!(" 3.00 ".parse::<Amount>().unwrap(), Amount::from_whole(3));
}

#[test]
fn parse_rejects_garbage() {
    assert!(matches!("abc".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!("1.2.3".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!(".".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!("".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!("1e".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!("e5".parse::<Amount>(), Err(Error::InvalidAmount(_))));
    assert!(matches!("1e999".parse::<Amount>(), Err(Error::InvalidAmount(_))));
}

#[test]
fn parse_exponent_notation() {
    assert_eq!("1e5".parse::<Amount>().unwrap(), Amount::from_whole(100_000));
    assert_eq!("1.25E2".parse::<Amount>().unwrap().to_string(), "125.00");
    assert_eq!("-2.5e-3".parse::<Amount>().unwrap().to_string(), "-0.0025");
    assert_eq!("1e-7".parse::<Amount>().unwrap(), Amount::from_units(10));
    assert!(matches!("1e-9".parse::<Amount>(), Err(Error::InvalidAmount(_))));
}

#[test]
fn trailing_zeros_do_not_count_as_precision() {
    let padded = format!("1.{}", "0".repeat(AMOUNT_SCALE as usize + 4));
    assert_eq!(padded.parse::<Amount>().unwrap(), Amount::from_whole(1));
}

#[test]
fn parse_rejects_excess_precision() {
    let too_precise = format!("0.{}", "1".repeat(AMOUNT_SCALE as usize + 1));
    assert!(matches!(too_precise.parse::<Amount>(), Err(Error::InvalidAmount(_))));
}

#[test]
fn parse_overflow() {
    let huge = "9".repeat(60);
    assert!(matches!(huge.parse::<Amount>(), Err(Error::AmountOverflow)));
}

// ── Display ───────────────────────────────────────────────────────

#[test]
fn display_keeps_two_fraction_digits() {
    assert_eq!(Amount::ZERO.to_string(), "0.00");
    assert_eq!(Amount::from_whole(5).to_string(), "5.00");
    assert_eq!("0.3".parse::<Amount>().unwrap().to_string(), "0.30");
    assert_eq!("-0.5".parse::<Amount>().unwrap().to_string(), "-0.50");
    assert_eq!("1.2345".parse::<Amount>().unwrap().to_string(), "1.2345");
}

// ── Arithmetic ────────────────────────────────────────────────────

#[test]
fn decimal_sum_is_exact() {
    let a: Amount = "0.1".parse().unwrap();
    let b: Amount = "0.2".parse().unwrap();
    assert_eq!(a + b, "0.3".parse().unwrap());
    assert_ne!(0.1f64 + 0.2f64, 0.3f64);
}

#[test]
fn sum_iterator() {
    let parts: Vec<Amount> = ["10.10", "20.20", "-5.30"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let total: Amount = parts.iter().sum();
    assert_eq!(total.to_string(), "25.00");
}

#[test]
fn checked_add_overflow() {
    let max = Amount::from_units(i128::MAX);
    assert!(max.checked_add(Amount::from_units(1)).is_none());
}

#[test]
fn to_f64_is_close() {
    let a: Amount = "12.5".parse().unwrap();
    assert!((a.to_f64() - 12.5).abs() < f64::EPSILON);
}

// ── JSON ──────────────────────────────────────────────────────────

#[test]
fn from_json_accepts_strings_numbers_and_null() {
    assert_eq!(Amount::from_json(&json!("1.50")).unwrap().to_string(), "1.50");
    assert_eq!(Amount::from_json(&json!(0.1)).unwrap().to_string(), "0.10");
    assert_eq!(Amount::from_json(&json!(1e-7)).unwrap().to_string(), "0.0000001");
    assert_eq!(Amount::from_json(&json!(null)).unwrap(), Amount::ZERO);
    assert!(Amount::from_json(&json!([1])).is_err());
}

#[test]
fn serde_uses_decimal_strings() {
    let a: Amount = "99.99".parse().unwrap();
    assert_eq!(serde_json::to_value(a).unwrap(), json!("99.99"));
    let back: Amount = serde_json::from_value(json!("99.99")).unwrap();
    assert_eq!(back, a);
    let from_number: Amount = serde_json::from_value(json!(99.99)).unwrap();
    assert_eq!(from_number, a);
}

proptest! {
    #[test]
    fn display_parses_back(units in -1_000_000_000_000_000i128..1_000_000_000_000_000i128) {
        let a = Amount::from_units(units);
        let parsed: Amount = a.to_string().parse().unwrap();
        prop_assert_eq!(parsed, a);
    }

    #[test]
    fn sum_is_order_independent(values in prop::collection::vec(-1_000_000_000i128..1_000_000_000i128, 0..20)) {
        let forward: Amount = values.iter().map(|v| Amount::from_units(*v)).sum();
        let backward: Amount = values.iter().rev().map(|v| Amount::from_units(*v)).sum();
        prop_assert_eq!(forward, backward);
    }
}
