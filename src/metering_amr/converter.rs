use crate::config::MeterConfig;

/// Scales raw meter counts into the configured unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub multiplier: f64,
    /// Decimal places, negative means keep the full value
    pub precision: i32,
}

impl Default for Conversion {
    fn default() -> Self {
        Conversion { multiplier: 1.0, precision: -1 }
    }
}

impl Conversion {
    pub fn for_meter(meter: Option<&MeterConfig>) -> Self {
        match meter {
            Some(m) => Conversion { multiplier: m.multiplier, precision: m.precision },
            None => Conversion::default(),
        }
    }

    pub fn apply(&self, raw: i64) -> f64 {
        return convert(raw as f64, self.multiplier, self.precision);
    }

    pub fn apply_all(&self, raw: &[i64]) -> Vec<f64> {
        return raw.iter().map(|v| self.apply(*v)).collect();
    }
}

pub fn convert(raw: f64, multiplier: f64, precision: i32) -> f64 {
    let value = raw * multiplier;
    if precision < 0 {
        return value;
    }
    return round_half_even(value, precision as usize);
}

/* Every finite f64 has an exact decimal expansion with at most this many fractional digits */
const EXACT_FRACTION_DIGITS: usize = 1074;

/// Rounds the exact binary value to `places` decimals, ties go to the even digit
pub fn round_half_even(value: f64, places: usize) -> f64 {
    if !value.is_finite() || places >= EXACT_FRACTION_DIGITS {
        return value;
    }

    let exact = format!("{:.*}", EXACT_FRACTION_DIGITS, value.abs());
    let (whole, fraction) = match exact.split_once('.') {
        Some(parts) => parts,
        None => return value,
    };
    let (kept, dropped) = fraction.split_at(places);

    let mut digits: Vec<u8> = whole.bytes().chain(kept.bytes()).collect();
    let first_dropped = dropped.as_bytes()[0];
    let exact_tie = first_dropped == b'5' && dropped[1..].bytes().all(|d| d == b'0');
    let last_is_odd = digits.last().map(|d| (d - b'0') % 2 == 1).unwrap_or(false);

    if first_dropped > b'5' || (first_dropped == b'5' && (!exact_tie || last_is_odd)) {
        let mut pos = digits.len();
        loop {
            if pos == 0 {
                digits.insert(0, b'1');
                break;
            }
            pos -= 1;
            if digits[pos] == b'9' {
                digits[pos] = b'0';
            } else {
                digits[pos] += 1;
                break;
            }
        }
    }

    let split = digits.len() - places;
    let rounded = format!("{}.{}0",
        String::from_utf8_lossy(&digits[..split]), String::from_utf8_lossy(&digits[split..]));
    return match rounded.parse::<f64>() {
        Ok(r) => r.copysign(value),
        Err(_) => value,
    };
}

/// Whole numbers go out as JSON integers so unscaled counts stay `100` and not `100.0`
pub fn to_json_number(value: f64) -> serde_json::Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(value as i64);
    }
    return serde_json::Value::from(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AmrProtocol;

    #[test]
    fn convert_with_precision() {
        assert_eq!(convert(12345.0, 0.01, 1), 123.5);
        assert_eq!(convert(12345.0, 0.01, 0), 123.0);
        assert_eq!(convert(7.0, 2.5, 3), 17.5);
    }

    #[test]
    fn exact_ties_go_to_even() {
        assert_eq!(convert(5.0, 0.5, 0), 2.0);
        assert_eq!(convert(7.0, 0.5, 0), 4.0);
        assert_eq!(convert(125.0, 0.01, 1), 1.2);
        assert_eq!(convert(-5.0, 0.5, 0), -2.0);
        /* 123.45 is stored slightly above the tie, so it rounds up */
        assert_eq!(convert(12345.0, 0.01, 1), 123.5);
        assert_eq!(round_half_even(2.675, 2), 2.67);
        assert_eq!(round_half_even(9.96, 1), 10.0);
    }

    #[test]
    fn huge_precision_keeps_value() {
        assert_eq!(convert(1.0, 1.5, 400), 1.5);
        assert_eq!(convert(1.0, 0.1, 2000), 0.1);
        assert_eq!(to_json_number(convert(1.0, 1.5, 400)).to_string(), "1.5");
    }

    #[test]
    fn convert_without_precision() {
        assert_eq!(convert(100.0, 1.0, -1), 100.0);
        assert_eq!(convert(12345.0, 0.5, -1), 6172.5);
        assert_eq!(convert(3.0, 0.1, -1), 3.0 * 0.1);
    }

    #[test]
    fn intervals_use_same_rule() {
        let c = Conversion { multiplier: 0.01, precision: 1 };
        assert_eq!(c.apply_all(&[12345, 0, 44]), vec![123.5, 0.0, 0.4]);
        assert_eq!(c.apply(12345), c.apply_all(&[12345])[0]);
    }

    #[test]
    fn unconfigured_meter_is_unscaled() {
        let c = Conversion::for_meter(None);
        assert_eq!(c.apply(4242), 4242.0);

        let mut meter = MeterConfig::new(AmrProtocol::Scm);
        meter.multiplier = 10.0;
        meter.precision = 0;
        assert_eq!(Conversion::for_meter(Some(&meter)).apply(3), 30.0);
    }

    #[test]
    fn json_numbers() {
        assert_eq!(to_json_number(100.0).to_string(), "100");
        assert_eq!(to_json_number(123.5).to_string(), "123.5");
        assert_eq!(to_json_number(-2.0).to_string(), "-2");
    }
}
