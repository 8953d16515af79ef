//! Rooms and sensor logs.
//!
//! The generator emits every room first (ids `1..=rooms`), then the logs of
//! room 1, room 2 and so on, so a log never precedes the room it references.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    preset::{pick, SensorPreset},
    schema::{FieldKind, FieldSchema, TableSchema},
    value::{Row, Value},
};

pub const ROOMS_TABLE: &str = "rooms";
pub const SENSOR_LOGS_TABLE: &str = "sensor_logs";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: i64,
    pub room_number: String,
    pub building_name: String,
    pub floor_number: i64,
    pub room_type: String,
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorLog {
    pub id: i64,
    pub room_id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub pressure_hpa: f64,
    pub co2_ppm: i64,
    pub light_lux: f64,
    pub noise_db: f64,
    pub motion_detected: bool,
    pub air_quality_index: i64,
    pub occupancy_count: i64,
    pub voltage_v: f64,
    pub power_consumption_w: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorRecord {
    Room(Room),
    Log(SensorLog),
}

impl From<SensorRecord> for Row {
    fn from(record: SensorRecord) -> Self {
        match record {
            SensorRecord::Room(room) => Self::new(
                ROOMS_TABLE,
                vec![
                    Value::Integer(room.id),
                    Value::Text(room.room_number),
                    Value::Text(room.building_name),
                    Value::Integer(room.floor_number),
                    Value::Text(room.room_type),
                    Value::Integer(room.capacity),
                ],
            ),
            SensorRecord::Log(log) => Self::new(
                SENSOR_LOGS_TABLE,
                vec![
                    Value::Integer(log.id),
                    Value::Integer(log.room_id),
                    Value::Text(log.timestamp.format(TIMESTAMP_FORMAT).to_string()),
                    Value::Real(log.temperature_celsius),
                    Value::Real(log.humidity_percent),
                    Value::Real(log.pressure_hpa),
                    Value::Integer(log.co2_ppm),
                    Value::Real(log.light_lux),
                    Value::Real(log.noise_db),
                    Value::from(log.motion_detected),
                    Value::Integer(log.air_quality_index),
                    Value::Integer(log.occupancy_count),
                    Value::Real(log.voltage_v),
                    Value::Real(log.power_consumption_w),
                ],
            ),
        }
    }
}

#[must_use]
pub fn rooms_table() -> TableSchema {
    TableSchema::new(ROOMS_TABLE)
        .field("id", FieldSchema::primary_key())
        .field("room_number", FieldSchema::new(FieldKind::Text).unique())
        .field("building_name", FieldSchema::new(FieldKind::Text))
        .field("floor_number", FieldSchema::new(FieldKind::Integer))
        .field("room_type", FieldSchema::new(FieldKind::Text))
        .field("capacity", FieldSchema::new(FieldKind::Integer))
        .index("building", &["building_name"])
        .index("building_floor", &["building_name", "floor_number"])
        .index("type", &["room_type"])
}

#[must_use]
pub fn sensor_logs_table() -> TableSchema {
    TableSchema::new(SENSOR_LOGS_TABLE)
        .field("id", FieldSchema::primary_key())
        .field("room_id", FieldSchema::references(ROOMS_TABLE))
        .field("timestamp", FieldSchema::new(FieldKind::Timestamp))
        .field("temperature_celsius", FieldSchema::new(FieldKind::Real))
        .field("humidity_percent", FieldSchema::new(FieldKind::Real))
        .field("pressure_hpa", FieldSchema::new(FieldKind::Real))
        .field("co2_ppm", FieldSchema::new(FieldKind::Integer))
        .field("light_lux", FieldSchema::new(FieldKind::Real))
        .field("noise_db", FieldSchema::new(FieldKind::Real))
        .field("motion_detected", FieldSchema::new(FieldKind::Boolean))
        .field("air_quality_index", FieldSchema::new(FieldKind::Integer))
        .field("occupancy_count", FieldSchema::new(FieldKind::Integer))
        .field("voltage_v", FieldSchema::new(FieldKind::Real))
        .field("power_consumption_w", FieldSchema::new(FieldKind::Real))
        .index("room", &["room_id"])
        .index("timestamp", &["timestamp"])
        .index("room_timestamp", &["room_id", "timestamp"])
        .index("temperature", &["temperature_celsius"])
        .index("co2", &["co2_ppm"])
}

/// `<building initial><floor>-<sequence>`, unique because the sequence is.
#[must_use]
pub fn room_number(building_name: &str, floor_number: i64, sequence: i64) -> String {
    let initial = building_name
        .chars()
        .next()
        .map_or('X', |c| c.to_ascii_uppercase());
    format!("{initial}{floor_number}-{sequence:04}")
}

/// Lazy, seeded producer of rooms followed by their logs.
pub struct SensorGenerator<'a> {
    preset: &'a SensorPreset,
    rooms: u64,
    logs_per_room: u64,
    anchor: DateTime<Utc>,
    rng: StdRng,
    next_room: u64,
    log_room: u64,
    logs_emitted_for_room: u64,
    next_log_id: i64,
}

impl<'a> SensorGenerator<'a> {
    /// The preset must already be validated.
    #[must_use]
    pub fn new(
        preset: &'a SensorPreset,
        rooms: u64,
        logs_per_room: u64,
        seed: u64,
        anchor: DateTime<Utc>,
    ) -> Self {
        Self {
            preset,
            rooms,
            logs_per_room,
            anchor,
            rng: StdRng::seed_from_u64(seed),
            next_room: 1,
            log_room: 1,
            logs_emitted_for_room: 0,
            next_log_id: 1,
        }
    }

    fn generate_room(&mut self, id: u64) -> Room {
        let id = to_i64(id);
        let building_name = pick(&self.preset.buildings, &mut self.rng).to_string();
        let floor_number = self.preset.floor_number.sample(&mut self.rng);
        let room_type = pick(&self.preset.room_types, &mut self.rng).to_string();
        let capacity = self.preset.capacity.sample(&mut self.rng);

        Room {
            id,
            room_number: room_number(&building_name, floor_number, id),
            building_name,
            floor_number,
            room_type,
            capacity,
        }
    }

    fn generate_log(&mut self, room_id: u64) -> SensorLog {
        let preset = self.preset;
        let rng = &mut self.rng;

        let window_seconds = preset.window_days * 24 * 60 * 60;
        let timestamp = self.anchor - Duration::seconds(rng.random_range(0..=window_seconds));

        let log = SensorLog {
            id: self.next_log_id,
            room_id: to_i64(room_id),
            timestamp,
            temperature_celsius: preset.temperature_celsius.sample(rng),
            humidity_percent: preset.humidity_percent.sample(rng),
            pressure_hpa: preset.pressure_hpa.sample(rng),
            co2_ppm: preset.co2_ppm.sample(rng),
            light_lux: preset.light_lux.sample(rng),
            noise_db: preset.noise_db.sample(rng),
            motion_detected: rng.random_bool(preset.motion_probability),
            air_quality_index: preset.air_quality_index.sample(rng),
            occupancy_count: preset.occupancy_count.sample(rng),
            voltage_v: preset.voltage_v.sample(rng),
            power_consumption_w: preset.power_consumption_w.sample(rng),
        };
        self.next_log_id += 1;
        log
    }

    fn remaining(&self) -> u64 {
        let rooms_left = self.rooms.saturating_sub(self.next_room - 1);
        let logs_left = if self.log_room > self.rooms {
            0
        } else {
            (self.rooms - self.log_room + 1) * self.logs_per_room - self.logs_emitted_for_room
        };
        rooms_left + logs_left
    }
}

impl Iterator for SensorGenerator<'_> {
    type Item = SensorRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_room <= self.rooms {
            let room = self.generate_room(self.next_room);
            self.next_room += 1;
            return Some(SensorRecord::Room(room));
        }

        if self.logs_per_room == 0 || self.log_room > self.rooms {
            return None;
        }

        let log = self.generate_log(self.log_room);
        self.logs_emitted_for_room += 1;
        if self.logs_emitted_for_room == self.logs_per_room {
            self.log_room += 1;
            self.logs_emitted_for_room = 0;
        }
        Some(SensorRecord::Log(log))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

// Counts are validated against `i64::MAX` when the configuration is built.
fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn collect(rooms: u64, logs: u64, seed: u64) -> Vec<SensorRecord> {
        let preset = SensorPreset::default();
        SensorGenerator::new(&preset, rooms, logs, seed, anchor()).collect()
    }

    #[test]
    fn test_counts_and_order() {
        let records = collect(3, 4, 1);
        assert_eq!(15, records.len());

        assert!(records[..3]
            .iter()
            .all(|r| matches!(r, SensorRecord::Room(_))));

        let room_ids: Vec<i64> = records[3..]
            .iter()
            .map(|r| match r {
                SensorRecord::Log(log) => log.room_id,
                SensorRecord::Room(_) => panic!("room after logs"),
            })
            .collect();
        assert_eq!(vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3], room_ids);
    }

    #[test]
    fn test_zero_rooms_yields_nothing() {
        assert!(collect(0, 1000, 1).is_empty());
    }

    #[test]
    fn test_zero_logs_yields_rooms_only() {
        let records = collect(5, 0, 1);
        assert_eq!(5, records.len());
        assert!(records.iter().all(|r| matches!(r, SensorRecord::Room(_))));
    }

    #[test]
    fn test_size_hint_is_exact() {
        let preset = SensorPreset::default();
        let mut generator = SensorGenerator::new(&preset, 2, 3, 9, anchor());
        assert_eq!((8, Some(8)), generator.size_hint());

        generator.next();
        generator.next();
        generator.next();
        assert_eq!((5, Some(5)), generator.size_hint());

        let rest = generator.by_ref().count();
        assert_eq!(5, rest);
        assert_eq!((0, Some(0)), generator.size_hint());
    }

    #[test]
    fn test_same_seed_restarts_same_sequence() {
        assert_eq!(collect(4, 25, 42), collect(4, 25, 42));
        assert_ne!(collect(4, 25, 42), collect(4, 25, 43));
    }

    #[test]
    fn test_room_numbers_unique() {
        let records = collect(2000, 0, 3);
        let numbers: HashSet<String> = records
            .into_iter()
            .filter_map(|r| match r {
                SensorRecord::Room(room) => Some(room.room_number),
                SensorRecord::Log(_) => None,
            })
            .collect();
        assert_eq!(2000, numbers.len());
    }

    #[test]
    fn test_values_within_ranges() {
        let preset = SensorPreset::default();
        let earliest = anchor() - Duration::days(30);

        for record in SensorGenerator::new(&preset, 5, 400, 11, anchor()) {
            match record {
                SensorRecord::Room(room) => {
                    assert!(preset.floor_number.contains(room.floor_number));
                    assert!(preset.capacity.contains(room.capacity));
                    assert!(preset.buildings.contains(&room.building_name));
                    assert!(preset.room_types.contains(&room.room_type));
                }
                SensorRecord::Log(log) => {
                    assert!(log.timestamp <= anchor() && log.timestamp >= earliest);
                    assert!((10.0..=70.0).contains(&log.temperature_celsius));
                    assert!((400..=1899).contains(&log.co2_ppm));
                    assert!((0..=19).contains(&log.occupancy_count));
                    assert!(preset.humidity_percent.contains(log.humidity_percent));
                    assert!(preset.pressure_hpa.contains(log.pressure_hpa));
                    assert!(preset.light_lux.contains(log.light_lux));
                    assert!(preset.noise_db.contains(log.noise_db));
                    assert!(preset.air_quality_index.contains(log.air_quality_index));
                    assert!(preset.voltage_v.contains(log.voltage_v));
                    assert!(preset.power_consumption_w.contains(log.power_consumption_w));
                }
            }
        }
    }

    #[test]
    fn test_room_number_format() {
        assert_eq!("A3-0007", room_number("Alpha", 3, 7));
        assert_eq!("G10-12345", room_number("gamma", 10, 12345));
    }

    #[test]
    fn test_row_conversion_matches_schema() {
        let records = collect(1, 1, 5);
        let rows: Vec<Row> = records.into_iter().map(Row::from).collect();

        assert_eq!(ROOMS_TABLE, rows[0].table);
        assert_eq!(rooms_table().column_count(), rows[0].values.len());
        assert_eq!(SENSOR_LOGS_TABLE, rows[1].table);
        assert_eq!(sensor_logs_table().column_count(), rows[1].values.len());
        assert_eq!(Value::Integer(1), rows[1].values[1]);
    }
}
