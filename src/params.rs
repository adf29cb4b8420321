//! # Conversion Parameters Module
//!
//! Questo modulo definisce il set di parametri passati a pngquant.
//!
//! ## Responsabilità:
//! - Definisce `ConversionParameters`, value type immutabile e sempre valido
//! - Normalizza l'input libero (slider, campi numerici, file di config)
//! - Calcola la finestra di qualità `min-max` richiesta dal tool
//!
//! ## Range ammessi:
//! - `quality`: 10-90 (intero)
//! - `color_count`: 48-256 (intero)
//! - `dither_strength`: 0.0-1.0 (una cifra decimale)
//! - `speed`: 1-11 (intero, 1 = qualità migliore, 11 = più veloce)
//!
//! ## Politica di normalizzazione:
//! L'input fuori range viene riportato nel range (clamp) e i campi interi
//! vengono arrotondati all'intero più vicino. `NaN` torna al valore di
//! default del campo. Non viene mai restituito un errore.
//!
//! ## Esempio:
//! ```rust,ignore
//! let params = ConversionParameters::new(50.0, 128.0, 0.5, 7.0);
//! assert_eq!(params.quality_range_arg(), "50-55");
//!
//! let edited = params.with_quality(140.0); // clamp a 90
//! assert_eq!(edited.quality(), 90);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Accepted quality values.
pub const QUALITY_RANGE: RangeInclusive<u8> = 10..=90;
/// Accepted palette sizes.
pub const COLOR_COUNT_RANGE: RangeInclusive<u16> = 48..=256;
/// Accepted speed/quality trade-off values.
pub const SPEED_RANGE: RangeInclusive<u8> = 1..=11;
/// Width of the quality window handed to pngquant.
pub const QUALITY_WINDOW: u8 = 5;
/// Highest quality pngquant accepts.
pub const TOOL_MAX_QUALITY: u8 = 100;

const DITHER_STEPS: u8 = 10;

const DEFAULT_QUALITY: u8 = 50;
const DEFAULT_COLOR_COUNT: u16 = 128;
const DEFAULT_DITHER_TENTHS: u8 = 5;
const DEFAULT_SPEED: u8 = 7;

/// One complete, always-valid parameter set.
///
/// Dither strength is kept in tenths so that two parameter sets compare
/// exactly; equality decides whether a new conversion is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawParameters", into = "RawParameters")]
pub struct ConversionParameters {
    quality: u8,
    color_count: u16,
    dither_tenths: u8,
    speed: u8,
}

/// Free-form representation used at the serialization boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
struct RawParameters {
    quality: f64,
    color_count: f64,
    dither_strength: f64,
    speed: f64,
}

impl Default for RawParameters {
    fn default() -> Self {
        ConversionParameters::default().into()
    }
}

impl From<RawParameters> for ConversionParameters {
    fn from(raw: RawParameters) -> Self {
        Self::new(raw.quality, raw.color_count, raw.dither_strength, raw.speed)
    }
}

impl From<ConversionParameters> for RawParameters {
    fn from(params: ConversionParameters) -> Self {
        Self {
            quality: params.quality as f64,
            color_count: params.color_count as f64,
            dither_strength: params.dither_strength(),
            speed: params.speed as f64,
        }
    }
}

impl Default for ConversionParameters {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            color_count: DEFAULT_COLOR_COUNT,
            dither_tenths: DEFAULT_DITHER_TENTHS,
            speed: DEFAULT_SPEED,
        }
    }
}

impl ConversionParameters {
    /// Builds a parameter set from raw numeric input, normalizing every field.
    pub fn new(quality: f64, color_count: f64, dither_strength: f64, speed: f64) -> Self {
        Self {
            quality: normalize_quality(quality),
            color_count: normalize_color_count(color_count),
            dither_tenths: normalize_dither(dither_strength),
            speed: normalize_speed(speed),
        }
    }

    pub fn with_quality(self, quality: f64) -> Self {
        Self { quality: normalize_quality(quality), ..self }
    }

    pub fn with_color_count(self, color_count: f64) -> Self {
        Self { color_count: normalize_color_count(color_count), ..self }
    }

    pub fn with_dither_strength(self, dither_strength: f64) -> Self {
        Self { dither_tenths: normalize_dither(dither_strength), ..self }
    }

    pub fn with_speed(self, speed: f64) -> Self {
        Self { speed: normalize_speed(speed), ..self }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn color_count(&self) -> u16 {
        self.color_count
    }

    /// Dither strength in `[0.0, 1.0]` with one decimal of precision.
    pub fn dither_strength(&self) -> f64 {
        self.dither_tenths as f64 / DITHER_STEPS as f64
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Quality window `(min, max)`: the upper bound is quality + 5, capped at
    /// the tool maximum.
    pub fn quality_range(&self) -> (u8, u8) {
        let upper = self.quality.saturating_add(QUALITY_WINDOW).min(TOOL_MAX_QUALITY);
        (self.quality, upper)
    }

    /// Quality window formatted the way pngquant expects it (`"50-55"`).
    pub fn quality_range_arg(&self) -> String {
        let (min, max) = self.quality_range();
        format!("{}-{}", min, max)
    }

    /// Dither strength formatted with exactly one decimal (`"0.5"`).
    pub fn dither_arg(&self) -> String {
        format!("{:.1}", self.dither_strength())
    }
}

impl fmt::Display for ConversionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quality={} colors={} floyd={} speed={}",
            self.quality_range_arg(),
            self.color_count,
            self.dither_arg(),
            self.speed
        )
    }
}

fn normalize_integer(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    value.round().clamp(min, max)
}

fn normalize_quality(value: f64) -> u8 {
    normalize_integer(
        value,
        *QUALITY_RANGE.start() as f64,
        *QUALITY_RANGE.end() as f64,
        DEFAULT_QUALITY as f64,
    ) as u8
}

fn normalize_color_count(value: f64) -> u16 {
    normalize_integer(
        value,
        *COLOR_COUNT_RANGE.start() as f64,
        *COLOR_COUNT_RANGE.end() as f64,
        DEFAULT_COLOR_COUNT as f64,
    ) as u16
}

fn normalize_speed(value: f64) -> u8 {
    normalize_integer(
        value,
        *SPEED_RANGE.start() as f64,
        *SPEED_RANGE.end() as f64,
        DEFAULT_SPEED as f64,
    ) as u8
}

fn normalize_dither(value: f64) -> u8 {
    // in decimi: 0.46 -> 5, 1.7 -> 10
    normalize_integer(
        value * DITHER_STEPS as f64,
        0.0,
        DITHER_STEPS as f64,
        DEFAULT_DITHER_TENTHS as f64,
    ) as u8
}
