// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Unit conversion between native adapter units and MTConnect units.
//!
//! Conversions compose from a fixed from→to table. Unit names may carry a
//! `KILO` prefix, `CUBIC_`/`SQUARE_` power prefixes, a `^n` power suffix, a
//! `_3D` suffix (must appear on both sides), and a `/` separating numerator
//! and denominator. Offsets only come from direct table hits (temperature)
//! and do not compose.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A linear conversion `y = factor * x + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    factor: f64,
    offset: f64,
}

impl UnitConversion {
    pub const fn new(factor: f64, offset: f64) -> Self {
        Self { factor, offset }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn convert(&self, value: f64) -> f64 {
        (value + self.offset) * self.factor
    }

    /// Convert each element of a vector value (3-space, timeseries).
    pub fn convert_vector(&self, values: &mut [f64]) {
        for v in values.iter_mut() {
            *v = self.convert(*v);
        }
    }

    /// Scale only, ignoring the offset. Used for deltas and sample rates.
    pub fn scale(&self, value: f64) -> f64 {
        value * self.factor
    }

    /// Build a conversion from `from` units to `to` units. Returns `None`
    /// when the units are identical or no conversion can be derived.
    pub fn make(from: &str, to: &str) -> Option<UnitConversion> {
        if from == to {
            return None;
        }

        if let Some(conv) = conversions().get(format!("{}-{}", from, to).as_str()) {
            return Some(*conv);
        }

        let mut source = from;
        let mut target = to;

        // 3D units convert element-wise; both sides must agree.
        let s3d = source.ends_with("_3D");
        let t3d = target.ends_with("_3D");
        if s3d && t3d {
            source = &source[..source.len() - 3];
            target = &target[..target.len() - 3];
        } else if s3d || t3d {
            return None;
        }

        let sslash = source.find('/');
        let tslash = target.find('/');
        match (sslash, tslash) {
            (None, None) => Self::make_simple(source, target),
            (Some(s), Some(t)) => {
                let num = Self::make(&source[..s], &target[..t]);
                let den = Self::make(&source[s + 1..], &target[t + 1..]);
                let n = num.map_or(1.0, |c| c.factor);
                let d = den.map_or(1.0, |c| c.factor);
                if num.is_none() && den.is_none() {
                    return None;
                }
                Some(UnitConversion::new(n / d, 0.0))
            }
            _ => None,
        }
    }

    fn make_simple(source: &str, target: &str) -> Option<UnitConversion> {
        let (source, sscale, spower) = scale_and_power(source);
        let (target, tscale, tpower) = scale_and_power(target);

        if spower != tpower {
            return None;
        }

        let mut factor = sscale / tscale;
        let mut offset = 0.0;

        let sunits: Vec<&str> = source.split('_').collect();
        let tunits: Vec<&str> = target.split('_').collect();
        if sunits.len() == tunits.len() {
            for (su, tu) in sunits.iter().zip(tunits.iter()) {
                match conversions().get(format!("{}-{}", su, tu).as_str()) {
                    Some(conv) => {
                        factor *= conv.factor;
                        offset = conv.offset;
                    }
                    None if factor == 1.0 => return None,
                    None => {}
                }
            }
        }

        if tpower != 1.0 {
            factor = factor.powf(tpower);
        }

        Some(UnitConversion::new(factor, offset))
    }
}

/// Strip `KILO`/`CUBIC_`/`SQUARE_`/`^n` and report the resulting scale and
/// power for the remaining base unit.
fn scale_and_power(unit: &str) -> (&str, f64, f64) {
    if let Some(rest) = unit.strip_prefix("KILO") {
        (rest, 1000.0, 1.0)
    } else if let Some(rest) = unit.strip_prefix("CUBIC_") {
        (rest, 1.0, 3.0)
    } else if let Some(rest) = unit.strip_prefix("SQUARE_") {
        (rest, 1.0, 2.0)
    } else if let Some(pos) = unit.find('^') {
        let power = unit[pos + 1..].parse::<f64>().unwrap_or_else(|_| {
            log::error!("[unit_conversion] invalid power in unit: {} -- ignoring", unit);
            1.0
        });
        (&unit[..pos], 1.0, power)
    } else {
        (unit, 1.0, 1.0)
    }
}

/// Direct from→to conversion table.
fn conversions() -> &'static HashMap<&'static str, UnitConversion> {
    static TABLE: OnceLock<HashMap<&'static str, UnitConversion>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("INCH-MILLIMETER", UnitConversion::new(25.4, 0.0)),
            ("FOOT-MILLIMETER", UnitConversion::new(304.8, 0.0)),
            ("CENTIMETER-MILLIMETER", UnitConversion::new(10.0, 0.0)),
            ("DECIMETER-MILLIMETER", UnitConversion::new(100.0, 0.0)),
            ("GALLON-LITER", UnitConversion::new(3.785411784, 0.0)),
            ("PINT-LITER", UnitConversion::new(0.473176473, 0.0)),
            ("METER-MILLIMETER", UnitConversion::new(1000.0, 0.0)),
            ("FAHRENHEIT-CELSIUS", UnitConversion::new(5.0 / 9.0, -32.0)),
            ("POUND-GRAM", UnitConversion::new(453.59237, 0.0)),
            ("OUNCE-GRAM", UnitConversion::new(28.349523125, 0.0)),
            ("GRAM-KILOGRAM", UnitConversion::new(1.0 / 1000.0, 0.0)),
            ("RADIAN-DEGREE", UnitConversion::new(57.2957795, 0.0)),
            ("SECOND-MINUTE", UnitConversion::new(1.0 / 60.0, 0.0)),
            ("MINUTE-SECOND", UnitConversion::new(60.0, 0.0)),
            ("POUND/INCH^2-PASCAL", UnitConversion::new(6894.76, 0.0)),
            ("HOUR-SECOND", UnitConversion::new(3600.0, 0.0)),
        ])
    })
}
