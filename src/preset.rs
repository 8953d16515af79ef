//! Value ranges and categorical pools the generators sample from.
//!
//! Presets are plain configuration. A JSON preset file may override any subset
//! of fields; everything missing falls back to the built-in values.

use std::{fs::File, io::BufReader, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::{FixtureError, Result};

/// Inclusive integer range.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl IntRange {
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        rng.random_range(self.min..=self.max)
    }

    #[must_use]
    pub const fn contains(&self, v: i64) -> bool {
        self.min <= v && v <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.min > self.max {
            return Err(FixtureError::Config(format!(
                "range `{name}` is empty ({} > {})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Inclusive real range. Samples are rounded to two decimals.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let raw = if self.min < self.max {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        };
        // Rounding may step past a bound that is not itself on the grid.
        round2(raw).clamp(self.min, self.max)
    }

    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        // Sampling needs a finite span, not just finite bounds.
        if !(self.max - self.min).is_finite() || self.min > self.max {
            return Err(FixtureError::Config(format!(
                "range `{name}` is invalid ({} .. {})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Picks one entry of a validated, non-empty pool.
pub fn pick<'a, R: Rng>(pool: &'a [String], rng: &mut R) -> &'a str {
    &pool[rng.random_range(0..pool.len())]
}

/// Longest timestamp window a preset may ask for, about a century.
pub const MAX_WINDOW_DAYS: i64 = 36_525;

fn validate_window(days: i64, name: &str) -> Result<()> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(FixtureError::Config(format!(
            "`{name}` must be between 1 and {MAX_WINDOW_DAYS} days, got {days}"
        )));
    }
    Ok(())
}

fn validate_pool(pool: &[String], name: &str) -> Result<()> {
    if pool.is_empty() || pool.iter().any(|entry| entry.trim().is_empty()) {
        return Err(FixtureError::Config(format!(
            "pool `{name}` must contain non-empty entries"
        )));
    }
    Ok(())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SensorPreset {
    pub buildings: Vec<String>,
    pub room_types: Vec<String>,
    pub floor_number: IntRange,
    pub capacity: IntRange,
    pub window_days: i64,
    pub temperature_celsius: FloatRange,
    pub humidity_percent: FloatRange,
    pub pressure_hpa: FloatRange,
    pub co2_ppm: IntRange,
    pub light_lux: FloatRange,
    pub noise_db: FloatRange,
    pub motion_probability: f64,
    pub air_quality_index: IntRange,
    pub occupancy_count: IntRange,
    pub voltage_v: FloatRange,
    pub power_consumption_w: FloatRange,
}

impl Default for SensorPreset {
    fn default() -> Self {
        Self {
            buildings: strings(&["Alpha", "Beta", "Gamma", "Delta", "Epsilon"]),
            room_types: strings(&["Office", "Laboratory", "Meeting", "Server", "Storage", "Lobby"]),
            floor_number: IntRange::new(1, 10),
            capacity: IntRange::new(5, 54),
            window_days: 30,
            // Wider than any real room, so extreme-value queries have something to find.
            temperature_celsius: FloatRange::new(10.0, 70.0),
            humidity_percent: FloatRange::new(20.0, 90.0),
            pressure_hpa: FloatRange::new(950.0, 1050.0),
            co2_ppm: IntRange::new(400, 1899),
            light_lux: FloatRange::new(0.0, 1000.0),
            noise_db: FloatRange::new(30.0, 100.0),
            motion_probability: 0.5,
            air_quality_index: IntRange::new(0, 300),
            occupancy_count: IntRange::new(0, 19),
            voltage_v: FloatRange::new(210.0, 250.0),
            power_consumption_w: FloatRange::new(0.0, 5000.0),
        }
    }
}

impl SensorPreset {
    /// # Errors
    ///
    /// On empty pools, inverted ranges or an out of bounds window.
    pub fn validate(&self) -> Result<()> {
        validate_pool(&self.buildings, "buildings")?;
        validate_pool(&self.room_types, "room_types")?;
        self.floor_number.validate("floor_number")?;
        self.capacity.validate("capacity")?;
        self.co2_ppm.validate("co2_ppm")?;
        self.air_quality_index.validate("air_quality_index")?;
        self.occupancy_count.validate("occupancy_count")?;
        self.temperature_celsius.validate("temperature_celsius")?;
        self.humidity_percent.validate("humidity_percent")?;
        self.pressure_hpa.validate("pressure_hpa")?;
        self.light_lux.validate("light_lux")?;
        self.noise_db.validate("noise_db")?;
        self.voltage_v.validate("voltage_v")?;
        self.power_consumption_w.validate("power_consumption_w")?;

        validate_window(self.window_days, "window_days")?;
        if !(0.0..=1.0).contains(&self.motion_probability) {
            return Err(FixtureError::Config(
                "motion_probability must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShopPreset {
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub statuses: Vec<String>,
    pub products_per_category: u64,
    pub max_items_per_order: i64,
    pub price: FloatRange,
    pub stock: IntRange,
    pub quantity: IntRange,
    pub signup_window_days: i64,
    pub order_window_days: i64,
}

impl Default for ShopPreset {
    fn default() -> Self {
        Self {
            categories: strings(&[
                "Electronics",
                "Books",
                "Clothing",
                "Home",
                "Garden",
                "Toys",
                "Sports",
                "Grocery",
            ]),
            countries: strings(&["DE", "FR", "HU", "NL", "PL", "SE", "UK", "US"]),
            statuses: strings(&["pending", "paid", "shipped", "delivered", "cancelled"]),
            products_per_category: 10,
            max_items_per_order: 4,
            price: FloatRange::new(1.0, 500.0),
            stock: IntRange::new(0, 500),
            quantity: IntRange::new(1, 5),
            signup_window_days: 365,
            order_window_days: 90,
        }
    }
}

impl ShopPreset {
    /// # Errors
    ///
    /// On empty pools or inverted ranges.
    pub fn validate(&self) -> Result<()> {
        validate_pool(&self.categories, "categories")?;
        validate_pool(&self.countries, "countries")?;
        validate_pool(&self.statuses, "statuses")?;
        self.price.validate("price")?;
        self.stock.validate("stock")?;
        self.quantity.validate("quantity")?;

        let mut seen = std::collections::HashSet::new();
        if !self.categories.iter().all(|category| seen.insert(category)) {
            return Err(FixtureError::Config("category names must be unique".into()));
        }
        if self.products_per_category == 0 {
            return Err(FixtureError::Config(
                "products_per_category must be positive".into(),
            ));
        }
        if self.max_items_per_order < 1 {
            return Err(FixtureError::Config(
                "max_items_per_order must be at least 1".into(),
            ));
        }
        if self.quantity.min < 1 {
            return Err(FixtureError::Config("quantity must be at least 1".into()));
        }
        validate_window(self.signup_window_days, "signup_window_days")?;
        validate_window(self.order_window_days, "order_window_days")?;
        Ok(())
    }
}

/// All presets, as stored in a preset file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Presets {
    pub sensors: SensorPreset,
    pub shop: ShopPreset,
}

impl Presets {
    /// # Errors
    ///
    /// On file operations and malformed JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let presets = serde_json::from_reader(BufReader::new(file))?;
        Ok(presets)
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn test_default_presets_are_valid() {
        assert!(SensorPreset::default().validate().is_ok());
        assert!(ShopPreset::default().validate().is_ok());
    }

    #[test]
    fn test_int_range_sample_stays_inclusive() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = IntRange::new(0, 2);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let v = range.sample(&mut rng);
            assert!(range.contains(v));
            seen[usize::try_from(v).unwrap()] = true;
        }
        assert_eq!([true, true, true], seen);
    }

    #[test]
    fn test_float_range_sample_rounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = FloatRange::new(10.0, 70.0);
        for _ in 0..500 {
            let v = range.sample(&mut rng);
            assert!(range.contains(v));
            assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6);
        }
        assert_eq!(5.5, FloatRange::new(5.5, 5.5).sample(&mut rng));
    }

    #[test]
    fn test_invalid_presets() {
        let mut preset = SensorPreset::default();
        preset.capacity = IntRange::new(10, 5);
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));

        let mut preset = SensorPreset::default();
        preset.buildings.clear();
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));

        let mut preset = ShopPreset::default();
        preset.categories.push("Books".into());
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_window_days_are_bounded() {
        let mut preset = SensorPreset::default();
        preset.window_days = 200_000_000;
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));
        preset.window_days = MAX_WINDOW_DAYS;
        assert!(preset.validate().is_ok());

        let mut preset = ShopPreset::default();
        preset.signup_window_days = i64::MAX;
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));

        let mut preset = ShopPreset::default();
        preset.order_window_days = 0;
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_float_range_span_must_be_finite() {
        let mut preset = SensorPreset::default();
        preset.noise_db = FloatRange::new(-1e308, 1e308);
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));

        let mut preset = ShopPreset::default();
        preset.price = FloatRange::new(f64::NAN, 1.0);
        assert!(matches!(preset.validate(), Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_partial_preset_json() {
        let presets: Presets =
            serde_json::from_str(r#"{"sensors": {"capacity": {"min": 10, "max": 59}}}"#).unwrap();

        assert_eq!(IntRange::new(10, 59), presets.sensors.capacity);
        assert_eq!(IntRange::new(1, 10), presets.sensors.floor_number);
        assert_eq!(ShopPreset::default(), presets.shop);
    }
}
