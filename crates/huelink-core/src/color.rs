//! Color-space conversions between normalized hue/saturation and the
//! bridge's CIE 1931 xy chromaticity, plus Kelvin/mirek temperature math.
//!
//! The xy conversions reproduce the bridge integration's numeric contract
//! exactly: every intermediate division and gamma step is rounded to four
//! decimal places (half away from zero) in decimal arithmetic, while the
//! HSB/RGB steps run in single precision. Changing the order of those
//! roundings changes rendered colors.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CoreError;

/// Default mirek bounds used when rendering a color temperature.
pub const MIREK_MIN: u16 = 153;
pub const MIREK_MAX: u16 = 500;

const SCALE: u32 = 4;

// ── Color temperature ────────────────────────────────────────────────

/// `round(1_000_000 / kelvin)`, clamped to `[min, max]`.
pub fn kelvin_to_mirek(kelvin: u32, min: u16, max: u16) -> u16 {
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let mirek = round_half_up(1_000_000_f32 / kelvin as f32);
    let clamped = mirek.max(i64::from(min)).min(i64::from(max));
    u16::try_from(clamped).unwrap_or(max)
}

/// `round(1_000_000 / mirek)`. Zero is rejected.
pub fn mirek_to_kelvin(mirek: u16) -> Result<u32, CoreError> {
    if mirek == 0 {
        return Err(CoreError::ValidationFailed {
            message: "mirek must be positive".into(),
        });
    }
    let kelvin = round_half_up(1_000_000_f32 / f32::from(mirek));
    u32::try_from(kelvin).map_err(|_| CoreError::ValidationFailed {
        message: format!("mirek {mirek} out of range"),
    })
}

// ── HS → xy ──────────────────────────────────────────────────────────

/// Convert hue (degrees) and saturation (`0.0..=1.0`) at full brightness to
/// xy chromaticity, each rounded to four decimals.
pub fn xy_from_hue_saturation(hue: u16, saturation: f64) -> (f64, f64) {
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let [r, g, b] = hsb_to_rgb(f32::from(hue) / 360.0, saturation as f32, 1.0);

    let divisor = Decimal::from(255);
    let hundred = Decimal::ONE_HUNDRED;
    let [r, g, b] = [r, g, b].map(|c| gamma(div4(Decimal::from(c), divisor)) * hundred);

    let x = r * dec(0.4124) + g * dec(0.3576) + b * dec(0.1805);
    let y = r * dec(0.2126) + g * dec(0.7152) + b * dec(0.0722);
    let z = r * dec(0.0193) + g * dec(0.1192) + b * dec(0.9505);

    let sum = x + y + z;
    (to_f64(div4(x, sum)), to_f64(div4(y, sum)))
}

// ── xy → HS ──────────────────────────────────────────────────────────

/// Convert xy chromaticity to hue (`0..=359`) and saturation rounded to
/// the nearest 1/200. Returns `None` when `y` is not positive.
pub fn hue_saturation_from_xy(x: f64, y: f64) -> Option<(u16, f64)> {
    if y.is_nan() || y <= 0.0 {
        return None;
    }

    let luminance = Decimal::ONE_HUNDRED;
    let x = dec(x);
    let y = dec(y);
    let z = Decimal::ONE - x - y;

    let cap_x = div4(luminance, y) * x;
    let cap_z = div4(luminance, y) * z;

    let hundred = Decimal::ONE_HUNDRED;
    let cap_x = div4(cap_x, hundred);
    let cap_y = div4(luminance, hundred);
    let cap_z = div4(cap_z, hundred);

    let r = cap_x * dec(3.2406) + cap_y * dec(-1.5372) + cap_z * dec(-0.4986);
    let g = cap_x * dec(-0.9689) + cap_y * dec(1.8758) + cap_z * dec(0.0415);
    let b = cap_x * dec(0.0557) + cap_y * dec(-0.2040) + cap_z * dec(1.0570);

    let rgb = rescale([r, g, b]).map(reverse_gamma);
    let rgb = rescale(rgb).map(|c| round_channel(c * Decimal::from(255)));

    let (hue, saturation) = rgb_to_hs(rgb);

    let hue = to_f64(dec(f64::from(hue)) * Decimal::from(360));
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let hue = (hue + 0.5).floor().min(359.0).max(0.0) as u16;
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let saturation = round_half_up(saturation * 200.0) as f64 / 200.0;

    Some((hue, saturation))
}

// ── Gamma ────────────────────────────────────────────────────────────

fn gamma(c: Decimal) -> Decimal {
    let value = to_f64(c);
    if value > 0.04045 {
        scale4(dec(((value + 0.055) / (1.0 + 0.055)).powf(2.4)))
    } else {
        scale4(dec(value / 12.92))
    }
}

fn reverse_gamma(c: Decimal) -> Decimal {
    let value = to_f64(c);
    if value <= 0.003_130_8 {
        scale4(dec(12.92 * value))
    } else {
        scale4(dec(1.0 + 0.055) * dec(value.powf(1.0 / 2.4)) - dec(0.055))
    }
}

/// Pull an over-range channel back to 1.0, scaling the others by it.
/// Only a strictly dominant channel above 1.0 triggers the rescale.
fn rescale([r, g, b]: [Decimal; 3]) -> [Decimal; 3] {
    if r > b && r > g && r > Decimal::ONE {
        [Decimal::ONE, div4(g, r), div4(b, r)]
    } else if g > b && g > r && g > Decimal::ONE {
        [div4(r, g), Decimal::ONE, div4(b, g)]
    } else if b > r && b > g && b > Decimal::ONE {
        [div4(r, b), div4(g, b), Decimal::ONE]
    } else {
        [r, g, b]
    }
}

// ── HSB / RGB (single precision) ─────────────────────────────────────

#[allow(clippy::float_cmp)]
fn hsb_to_rgb(hue: f32, saturation: f32, brightness: f32) -> [i32; 3] {
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let channel = |v: f32| (v * 255.0 + 0.5) as i32;

    if saturation == 0.0 {
        let c = channel(brightness);
        return [c, c, c];
    }

    let h = (hue - hue.floor()) * 6.0;
    let f = h - h.floor();
    let p = brightness * (1.0 - saturation);
    let q = brightness * (1.0 - saturation * f);
    let t = brightness * (1.0 - saturation * (1.0 - f));

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let (r, g, b) = match h as i32 {
        0 => (brightness, t, p),
        1 => (q, brightness, p),
        2 => (p, brightness, t),
        3 => (p, q, brightness),
        4 => (t, p, brightness),
        _ => (brightness, p, q),
    };
    [channel(r), channel(g), channel(b)]
}

/// Hue as a fraction of a turn and saturation, both single precision.
#[allow(clippy::cast_precision_loss, clippy::as_conversions, clippy::float_cmp)]
fn rgb_to_hs([r, g, b]: [i32; 3]) -> (f32, f32) {
    let cmax = r.max(g).max(b);
    let cmin = r.min(g).min(b);

    let saturation = if cmax == 0 {
        0.0
    } else {
        (cmax - cmin) as f32 / cmax as f32
    };
    if saturation == 0.0 {
        return (0.0, saturation);
    }

    let span = (cmax - cmin) as f32;
    let rc = (cmax - r) as f32 / span;
    let gc = (cmax - g) as f32 / span;
    let bc = (cmax - b) as f32 / span;

    let mut hue = if r == cmax {
        bc - gc
    } else if g == cmax {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    hue /= 6.0;
    if hue < 0.0 {
        hue += 1.0;
    }
    (hue, saturation)
}

// ── Decimal helpers ──────────────────────────────────────────────────

/// Decimal from the shortest decimal representation of `value`.
fn dec(value: f64) -> Decimal {
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .unwrap_or_default()
}

/// Correctly rounded conversion back to `f64`.
fn to_f64(value: Decimal) -> f64 {
    value.to_string().parse().unwrap_or_default()
}

fn scale4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn div4(numerator: Decimal, denominator: Decimal) -> Decimal {
    numerator
        .checked_div(denominator)
        .map_or(Decimal::ZERO, scale4)
}

/// Round through single precision to the nearest integer, clamped at zero.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round_channel(value: Decimal) -> i32 {
    let single = to_f64(value) as f32;
    i32::try_from(round_half_up(single).max(0)).unwrap_or(i32::MAX)
}

/// `floor(v + 0.5)`, saturating at the integer range.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round_half_up(value: f32) -> i64 {
    (f64::from(value) + 0.5).floor() as i64
}
