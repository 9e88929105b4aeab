use crate::{decode, Value};

/// Compare two values while ignoring encoding artifacts.
///
/// Null is only equal to null. Two strings are decoded as JSON documents
/// when both parse, so `"{\"a\":1}"` equals `"{ \"a\": 1 }"`; strings that are
/// not JSON compare as text. Everything else compares structurally, with
/// numbers compared by value (`1.0 == 1`, `1e2 == 100`).
pub fn semantically_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => {
            match (decode(a.as_bytes()), decode(b.as_bytes())) {
                (Ok(a), Ok(b)) => equivalent(&a, &b),
                _ => a == b,
            }
        }
        (a, b) => equivalent(a, b),
    }
}

/// The value to plan for a declared `config` given the stored `state`.
///
/// When both are present and [`semantically_equal`], the stored value is kept
/// verbatim so that reformatting a declaration does not register as a change.
pub fn planned_value(config: &Value, state: &Value) -> Value {
    if !config.is_null() && !state.is_null() && semantically_equal(config, state) {
        state.clone()
    } else {
        config.clone()
    }
}

fn equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            canonical_number(&a.to_string()) == canonical_number(&b.to_string())
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| equivalent(a, b))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, va)| b.get(k).is_some_and(|vb| equivalent(va, vb)))
        }
        (a, b) => a == b,
    }
}

/// Normal form of a JSON number literal: sign, significant digits without
/// leading or trailing zeros, and a decimal exponent. Literals that do not
/// parse are returned as-is.
fn canonical_number(text: &str) -> String {
    parse_decimal(text).unwrap_or_else(|| text.to_string())
}

fn parse_decimal(text: &str) -> Option<String> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(i) => (&unsigned[..i], unsigned[i + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = int_part
        .bytes()
        .chain(frac_part.bytes())
        .all(|c| c.is_ascii_digit());
    if int_part.is_empty() || !all_digits {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_part);
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some("0".to_string());
    }
    let trimmed = significant.trim_end_matches('0');
    let trailing = (significant.len() - trimmed.len()) as i64;
    let exponent = exponent
        .checked_sub(frac_part.len() as i64)?
        .checked_add(trailing)?;

    let sign = if negative { "-" } else { "" };
    Some(if exponent == 0 {
        format!("{}{}", sign, trimmed)
    } else {
        format!("{}{}e{}", sign, trimmed, exponent)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn ignores_key_order() {
        let a = decode(br#"{"a":1,"b":2}"#).unwrap();
        let b = decode(br#"{"b":2,"a":1}"#).unwrap();
        assert!(semantically_equal(&a, &b));
    }

    #[test]
    fn reflexive_and_symmetric() {
        let samples = [
            v(json!(null)),
            v(json!({"a": [1, {"b": "c"}]})),
            v(json!("{\"x\": 1}")),
            v(json!(1.5)),
            v(json!([])),
        ];
        for a in &samples {
            assert!(semantically_equal(a, a));
            for b in &samples {
                assert_eq!(semantically_equal(a, b), semantically_equal(b, a));
            }
        }
    }

    #[test]
    fn null_handling() {
        assert!(semantically_equal(&Value::Null, &Value::Null));
        assert!(!semantically_equal(&Value::Null, &v(json!({}))));
        assert!(!semantically_equal(&v(json!("")), &Value::Null));
    }

    #[test]
    fn json_strings_compare_decoded() {
        assert!(semantically_equal(
            &v(json!("{\"a\": 1, \"b\": [true]}")),
            &v(json!("{\"b\":[true],\"a\":1}"))
        ));
        assert!(!semantically_equal(
            &v(json!("{\"a\": 1}")),
            &v(json!("{\"a\": 2}"))
        ));
    }

    #[test]
    fn plain_strings_compare_as_text() {
        assert!(semantically_equal(&v(json!("g1")), &v(json!("g1"))));
        assert!(!semantically_equal(&v(json!("g1")), &v(json!("g2"))));
        assert!(!semantically_equal(&v(json!("g1")), &v(json!("{}"))));
    }

    #[test]
    fn numbers_compare_by_value() {
        let one = decode(b"1").unwrap();
        let one_point_zero = decode(b"1.0").unwrap();
        assert_ne!(one, one_point_zero);
        assert!(semantically_equal(&one, &one_point_zero));
        assert!(semantically_equal(&decode(b"1e2").unwrap(), &decode(b"100").unwrap()));
        assert!(semantically_equal(&decode(b"-0.0").unwrap(), &decode(b"0").unwrap()));
        assert!(!semantically_equal(&decode(b"10").unwrap(), &decode(b"1").unwrap()));
        assert!(!semantically_equal(
            &decode(b"12345678901234567890").unwrap(),
            &decode(b"12345678901234567891").unwrap()
        ));
    }

    #[test]
    fn canonical_numbers() {
        assert_eq!(canonical_number("0"), "0");
        assert_eq!(canonical_number("120"), "12e1");
        assert_eq!(canonical_number("1.20"), "12e-1");
        assert_eq!(canonical_number("-0.012E3"), "-12");
        assert_eq!(canonical_number("not a number"), "not a number");
    }

    #[test]
    fn different_kinds_are_not_equal() {
        assert!(!semantically_equal(&v(json!([1])), &v(json!({"0": 1}))));
        assert!(!semantically_equal(&v(json!(true)), &v(json!("true"))));
    }

    #[test]
    fn planned_value_keeps_state_when_equivalent() {
        let state = v(json!({"displayName": "g1", "mailEnabled": false}));
        let config = decode(br#"{ "mailEnabled": false, "displayName": "g1" }"#).unwrap();
        assert_eq!(planned_value(&config, &state), state);

        let changed = v(json!({"displayName": "g2", "mailEnabled": false}));
        assert_eq!(planned_value(&changed, &state), changed);

        assert_eq!(planned_value(&config, &Value::Null), config);
        assert_eq!(planned_value(&Value::Null, &state), Value::Null);
    }
}
