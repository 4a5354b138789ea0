//! 128-bit decimal floating point number with a 96-bit mantissa and a base-10
//! scale in `0..=28`, matching the arithmetic rules of `System.Decimal`.

use std::cmp::Ordering;
use std::fmt;

pub const MAX_SCALE: u32 = 28;
const MANTISSA_LIMIT: u128 = (1u128 << 96) - 1;

#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    negative: bool,
    mantissa: u128,
    scale: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalError {
    Overflow,
    DivideByZero,
}

fn pow10(n: u32) -> u128 {
    10u128.pow(n)
}

/// Divides by ten and rounds half to even.
fn div10_round(m: u128) -> u128 {
    let q = m / 10;
    let r = m % 10;
    if r > 5 || (r == 5 && q % 2 == 1) {
        q + 1
    } else {
        q
    }
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        negative: false,
        mantissa: 0,
        scale: 0,
    };
    pub const ONE: Decimal = Decimal {
        negative: false,
        mantissa: 1,
        scale: 0,
    };
    pub const MAX: Decimal = Decimal {
        negative: false,
        mantissa: MANTISSA_LIMIT,
        scale: 0,
    };
    pub const MIN: Decimal = Decimal {
        negative: true,
        mantissa: MANTISSA_LIMIT,
        scale: 0,
    };

    /// Builds a value, rounding away excess scale and rejecting mantissas
    /// that do not fit 96 bits.
    pub fn from_parts(negative: bool, mut mantissa: u128, mut scale: u32) -> Result<Self, DecimalError> {
        while scale > MAX_SCALE || (mantissa > MANTISSA_LIMIT && scale > 0) {
            mantissa = div10_round(mantissa);
            scale -= 1;
        }
        if mantissa > MANTISSA_LIMIT {
            return Err(DecimalError::Overflow);
        }
        Ok(Decimal {
            negative: negative && mantissa != 0,
            mantissa,
            scale,
        })
    }

    pub fn from_i128(v: i128) -> Result<Self, DecimalError> {
        Self::from_parts(v < 0, v.unsigned_abs(), 0)
    }

    pub fn from_i64(v: i64) -> Self {
        Decimal {
            negative: v < 0,
            mantissa: v.unsigned_abs() as u128,
            scale: 0,
        }
    }

    pub fn from_u64(v: u64) -> Self {
        Decimal {
            negative: false,
            mantissa: v as u128,
            scale: 0,
        }
    }

    pub fn from_f64(v: f64) -> Result<Self, DecimalError> {
        if !v.is_finite() {
            return Err(DecimalError::Overflow);
        }
        // Fifteen significant digits, like the CLR conversion from double.
        Self::parse(&format!("{:.*e}", 14, v))
            .map(|d| d.normalize())
            .ok_or(DecimalError::Overflow)
    }

    /// Removes trailing fractional zeros.
    pub fn normalize(&self) -> Decimal {
        let mut m = self.mantissa;
        let mut s = self.scale;
        while s > 0 && m % 10 == 0 {
            m /= 10;
            s -= 1;
        }
        Decimal {
            negative: self.negative && m != 0,
            mantissa: m,
            scale: s,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn mantissa(&self) -> u128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// True when the value has no fractional part (trailing zeros allowed).
    pub fn is_integer(&self) -> bool {
        self.mantissa % pow10(self.scale) == 0
    }

    /// Integer part, truncated toward zero.
    pub fn trunc_i128(&self) -> i128 {
        let m = (self.mantissa / pow10(self.scale)) as i128;
        if self.negative {
            -m
        } else {
            m
        }
    }

    pub fn to_f64(&self) -> f64 {
        let m = self.mantissa as f64 / 10f64.powi(self.scale as i32);
        if self.negative {
            -m
        } else {
            m
        }
    }

    pub fn negate(&self) -> Self {
        Decimal {
            negative: !self.negative && self.mantissa != 0,
            ..*self
        }
    }

    fn rescale_to(&self, scale: u32) -> Option<u128> {
        self.mantissa.checked_mul(pow10(scale - self.scale))
    }

    fn signed_add(a_neg: bool, a: u128, b_neg: bool, b: u128) -> (bool, u128) {
        if a_neg == b_neg {
            (a_neg, a + b)
        } else if a >= b {
            (a_neg, a - b)
        } else {
            (b_neg, b - a)
        }
    }

    pub fn add(&self, other: &Decimal) -> Result<Decimal, DecimalError> {
        let scale = self.scale.max(other.scale);
        match (self.rescale_to(scale), other.rescale_to(scale)) {
            (Some(a), Some(b)) => {
                let (neg, m) = Self::signed_add(self.negative, a, other.negative, b);
                Self::from_parts(neg, m, scale)
            }
            _ => {
                // Aligning would overflow 128 bits; drop precision from the finer operand.
                let (fine, coarse) = if self.scale > other.scale {
                    (self, other)
                } else {
                    (other, self)
                };
                let mut m = fine.mantissa;
                let mut s = fine.scale;
                while s > coarse.scale {
                    m = div10_round(m);
                    s -= 1;
                }
                let (neg, sum) =
                    Self::signed_add(fine.negative, m, coarse.negative, coarse.mantissa);
                Self::from_parts(neg, sum, s)
            }
        }
    }

    pub fn sub(&self, other: &Decimal) -> Result<Decimal, DecimalError> {
        self.add(&other.negate())
    }

    pub fn mul(&self, other: &Decimal) -> Result<Decimal, DecimalError> {
        let negative = self.negative != other.negative;
        let mut a = self.mantissa;
        let mut b = other.mantissa;
        let mut scale = self.scale + other.scale;
        loop {
            if let Some(m) = a.checked_mul(b) {
                return Self::from_parts(negative, m, scale);
            }
            if scale == 0 {
                return Err(DecimalError::Overflow);
            }
            if a > b {
                a = div10_round(a);
            } else {
                b = div10_round(b);
            }
            scale -= 1;
        }
    }

    pub fn div(&self, other: &Decimal) -> Result<Decimal, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::DivideByZero);
        }
        let negative = self.negative != other.negative;
        let divisor = other.mantissa;
        let mut dividend = self.mantissa;
        let mut scale = self.scale as i64 - other.scale as i64;
        while scale < 0 {
            dividend = dividend.checked_mul(10).ok_or(DecimalError::Overflow)?;
            scale += 1;
        }
        let preferred = scale as u32;
        let mut q = dividend / divisor;
        let mut r = dividend % divisor;
        let mut scale = scale as u32;
        while r != 0 && scale < MAX_SCALE {
            let next = q * 10;
            if next > MANTISSA_LIMIT {
                break;
            }
            r *= 10;
            q = next + r / divisor;
            r %= divisor;
            scale += 1;
        }
        if r * 2 > divisor || (r * 2 == divisor && q % 2 == 1) {
            q += 1;
        }
        while scale > preferred && q % 10 == 0 && q != 0 {
            q /= 10;
            scale -= 1;
        }
        Self::from_parts(negative, q, scale)
    }

    pub fn rem(&self, other: &Decimal) -> Result<Decimal, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::DivideByZero);
        }
        let scale = self.scale.max(other.scale);
        let a = self.rescale_to(scale).ok_or(DecimalError::Overflow)?;
        let b = other.rescale_to(scale).ok_or(DecimalError::Overflow)?;
        Self::from_parts(self.negative, a % b, scale)
    }

    pub fn truncate(&self) -> Decimal {
        Decimal {
            negative: self.negative && self.trunc_i128() != 0,
            mantissa: self.mantissa / pow10(self.scale),
            scale: 0,
        }
    }

    /// Parses invariant decimal text with an optional exponent.
    pub fn parse(text: &str) -> Option<Decimal> {
        let text = text.trim();
        let (negative, body) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (number, exponent) = match body.find(['e', 'E']) {
            Some(i) => (&body[..i], body[i + 1..].parse::<i32>().ok()?),
            None => (body, 0),
        };
        let (int_part, frac_part) = match number.find('.') {
            Some(i) => (&number[..i], &number[i + 1..]),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let mut mantissa: u128 = 0;
        let mut scale: i32 = 0;
        for (i, c) in int_part.chars().chain(frac_part.chars()).enumerate() {
            let digit = c.to_digit(10)? as u128;
            let in_fraction = i >= int_part.len();
            match mantissa.checked_mul(10).and_then(|m| m.checked_add(digit)) {
                Some(m) if m <= MANTISSA_LIMIT * 10 => {
                    mantissa = m;
                    if in_fraction {
                        scale += 1;
                    }
                }
                _ => {
                    if !in_fraction {
                        scale -= 1;
                    }
                }
            }
        }
        scale -= exponent;
        while scale < 0 {
            mantissa = mantissa.checked_mul(10)?;
            scale += 1;
        }
        Decimal::from_parts(negative, mantissa, scale as u32).ok()
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.is_zero() && other.is_zero() {
            return Ordering::Equal;
        }
        match (self.negative, other.negative) {
            (false, true) => return Ordering::Greater,
            (true, false) => return Ordering::Less,
            _ => {}
        }
        let scale = self.scale.max(other.scale);
        let ordering = match (self.rescale_to(scale), other.rescale_to(scale)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self
                .trunc_i128()
                .abs()
                .cmp(&other.trunc_i128().abs())
                .then_with(|| self.to_f64().abs().total_cmp(&other.to_f64().abs())),
        };
        if self.negative {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl std::hash::Hash for Decimal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let n = self.normalize();
        n.negative.hash(state);
        n.mantissa.hash(state);
        n.scale.hash(state);
    }
}

impl fmt::Display for Decimal {
    /// Invariant text; trailing zeros implied by the scale are kept (`1.50`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        let sign = if self.negative { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        } else {
            write!(f, "{}0.{}{}", sign, "0".repeat(scale - digits.len()), digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::parse(s).unwrap()
    }

    #[test]
    fn keeps_trailing_zeros_from_scale() {
        assert_eq!(d("1.50").to_string(), "1.50");
        assert_eq!(d("1.5").add(&d("1.50")).unwrap().to_string(), "3.00");
        assert_eq!(d("-0.05").to_string(), "-0.05");
    }

    #[test]
    fn division_uses_minimal_exact_scale() {
        assert_eq!(d("1").div(&d("4")).unwrap().to_string(), "0.25");
        assert_eq!(d("10").div(&d("2")).unwrap().to_string(), "5");
        assert_eq!(
            d("1").div(&d("3")).unwrap().to_string(),
            "0.3333333333333333333333333333"
        );
        assert_eq!(d("1").div(&Decimal::ZERO), Err(DecimalError::DivideByZero));
    }

    #[test]
    fn max_value_overflows_on_growth() {
        assert_eq!(Decimal::MAX.to_string(), "79228162514264337593543950335");
        assert_eq!(Decimal::MAX.add(&Decimal::ONE), Err(DecimalError::Overflow));
        assert_eq!(Decimal::MAX.mul(&d("2")), Err(DecimalError::Overflow));
    }

    #[test]
    fn multiplication_and_comparison() {
        assert_eq!(d("1.1").mul(&d("1.1")).unwrap().to_string(), "1.21");
        assert!(d("2.0") == d("2"));
        assert!(d("-3") < d("0.1"));
        assert!(!d("2.5").is_integer());
        assert!(d("4.000").is_integer());
    }
}
