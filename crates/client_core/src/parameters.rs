//! Tunable generation parameters and the store that keeps them in range.

use std::{fmt, ops::RangeInclusive, str::FromStr};

use shared::protocol::fields;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterField {
    BrightenFactor,
    DarkenFactor,
    LowCutoffPercent,
    HighCutoffPercent,
    BorderCleanupPixels,
}

impl ParameterField {
    pub const ALL: [Self; 5] = [
        Self::BrightenFactor,
        Self::DarkenFactor,
        Self::LowCutoffPercent,
        Self::HighCutoffPercent,
        Self::BorderCleanupPixels,
    ];

    pub fn range(self) -> RangeInclusive<u8> {
        match self {
            Self::BorderCleanupPixels => 0..=10,
            _ => 0..=100,
        }
    }

    pub fn default_value(self) -> u8 {
        match self {
            Self::BrightenFactor => 50,
            Self::DarkenFactor => 50,
            Self::LowCutoffPercent => 30,
            Self::HighCutoffPercent => 20,
            Self::BorderCleanupPixels => 2,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::BrightenFactor => fields::BRIGHTEN_FACTOR,
            Self::DarkenFactor => fields::DARKEN_FACTOR,
            Self::LowCutoffPercent => fields::LOW_CUTOFF_PERCENT,
            Self::HighCutoffPercent => fields::HIGH_CUTOFF_PERCENT,
            Self::BorderCleanupPixels => fields::BORDER_CLEANUP_PIXELS,
        }
    }

    pub fn clamp(self, value: i64) -> u8 {
        let range = self.range();
        // Both bounds fit in u8, so the cast after clamping is lossless.
        value.clamp(i64::from(*range.start()), i64::from(*range.end())) as u8
    }
}

impl fmt::Display for ParameterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for ParameterField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "brighten_factor" | "brighten" => Ok(Self::BrightenFactor),
            "darken_factor" | "darken" => Ok(Self::DarkenFactor),
            "low_cutoff_percent" | "low_cutoff" | "low" => Ok(Self::LowCutoffPercent),
            "high_cutoff_percent" | "high_cutoff" | "high" => Ok(Self::HighCutoffPercent),
            "border_cleanup_pixels" | "border_cleanup" | "border" => {
                Ok(Self::BorderCleanupPixels)
            }
            other => Err(format!("unknown parameter '{other}'")),
        }
    }
}

/// A complete, in-range parameter set. Every request carries one of these by
/// value, so later edits never leak into a request that is already built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParameters {
    brighten_factor: u8,
    darken_factor: u8,
    low_cutoff_percent: u8,
    high_cutoff_percent: u8,
    border_cleanup_pixels: u8,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            brighten_factor: ParameterField::BrightenFactor.default_value(),
            darken_factor: ParameterField::DarkenFactor.default_value(),
            low_cutoff_percent: ParameterField::LowCutoffPercent.default_value(),
            high_cutoff_percent: ParameterField::HighCutoffPercent.default_value(),
            border_cleanup_pixels: ParameterField::BorderCleanupPixels.default_value(),
        }
    }
}

impl GenerationParameters {
    /// Returns a copy with `field` set to `value` clamped into range.
    pub fn with(mut self, field: ParameterField, value: i64) -> Self {
        *self.slot_mut(field) = field.clamp(value);
        self
    }

    pub fn get(&self, field: ParameterField) -> u8 {
        match field {
            ParameterField::BrightenFactor => self.brighten_factor,
            ParameterField::DarkenFactor => self.darken_factor,
            ParameterField::LowCutoffPercent => self.low_cutoff_percent,
            ParameterField::HighCutoffPercent => self.high_cutoff_percent,
            ParameterField::BorderCleanupPixels => self.border_cleanup_pixels,
        }
    }

    pub fn brighten_factor(&self) -> u8 {
        self.brighten_factor
    }

    pub fn darken_factor(&self) -> u8 {
        self.darken_factor
    }

    pub fn low_cutoff_percent(&self) -> u8 {
        self.low_cutoff_percent
    }

    pub fn high_cutoff_percent(&self) -> u8 {
        self.high_cutoff_percent
    }

    pub fn border_cleanup_pixels(&self) -> u8 {
        self.border_cleanup_pixels
    }

    /// All five fields in wire order.
    pub fn entries(&self) -> [(ParameterField, u8); 5] {
        ParameterField::ALL.map(|field| (field, self.get(field)))
    }

    fn slot_mut(&mut self, field: ParameterField) -> &mut u8 {
        match field {
            ParameterField::BrightenFactor => &mut self.brighten_factor,
            ParameterField::DarkenFactor => &mut self.darken_factor,
            ParameterField::LowCutoffPercent => &mut self.low_cutoff_percent,
            ParameterField::HighCutoffPercent => &mut self.high_cutoff_percent,
            ParameterField::BorderCleanupPixels => &mut self.border_cleanup_pixels,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ParameterStore {
    current: GenerationParameters,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` clamped into the field's range and returns what was stored.
    pub fn set(&mut self, field: ParameterField, value: i64) -> u8 {
        self.current = self.current.with(field, value);
        let stored = self.current.get(field);
        if i64::from(stored) != value {
            debug!(field = %field, requested = value, stored, "parameter clamped");
        }
        stored
    }

    pub fn get(&self, field: ParameterField) -> u8 {
        self.current.get(field)
    }

    pub fn snapshot(&self) -> GenerationParameters {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = GenerationParameters::default();
    }
}

#[cfg(test)]
#[path = "tests/parameters_tests.rs"]
mod tests;
