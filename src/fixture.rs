use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

use crate::{
    common::{FixtureError, Result},
    preset::{FloatRange, IntRange, SensorPreset, ShopPreset},
    schema::DatabaseSchema,
    sensor::{rooms_table, sensor_logs_table, SensorGenerator, TIMESTAMP_FORMAT},
    shop::{shop_tables, ShopGenerator},
    value::Row,
};

/// A read-only query whose single integer result must be zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityCheck {
    pub title: String,
    pub sql: String,
}

/// A canned query whose result is shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoQuery {
    pub title: &'static str,
    pub sql: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorFixture {
    pub rooms: u64,
    pub logs_per_room: u64,
    pub preset: SensorPreset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopFixture {
    pub users: u64,
    pub orders_per_user: u64,
    pub preset: ShopPreset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fixture {
    Sensors(SensorFixture),
    Shop(ShopFixture),
}

impl Fixture {
    #[must_use]
    pub fn sensors(rooms: u64, logs_per_room: u64) -> Self {
        Self::Sensors(SensorFixture {
            rooms,
            logs_per_room,
            preset: SensorPreset::default(),
        })
    }

    #[must_use]
    pub fn shop(users: u64, orders_per_user: u64) -> Self {
        Self::Shop(ShopFixture {
            users,
            orders_per_user,
            preset: ShopPreset::default(),
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sensors(_) => "sensors",
            Self::Shop(_) => "shop",
        }
    }

    /// # Errors
    ///
    /// On an unknown fixture name.
    pub fn parse_name(name: &str) -> Result<Self> {
        match name {
            "sensors" => Ok(Self::sensors(0, 0)),
            "shop" => Ok(Self::shop(0, 0)),
            other => Err(FixtureError::Config(format!(
                "unknown fixture `{other}` (expected sensors or shop)"
            ))),
        }
    }

    /// # Errors
    ///
    /// On an invalid preset or counts too large to be row ids.
    pub fn validate(&self) -> Result<()> {
        let (a, b) = match self {
            Self::Sensors(f) => {
                f.preset.validate()?;
                (f.rooms, f.logs_per_room)
            }
            Self::Shop(f) => {
                f.preset.validate()?;
                (f.users, f.orders_per_user)
            }
        };

        let fits = a
            .checked_mul(b.max(1))
            .and_then(|rows| i64::try_from(rows).ok())
            .is_some();
        if !fits {
            return Err(FixtureError::Config(format!(
                "{a} x {b} rows exceed the row id range"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn schema(&self) -> DatabaseSchema {
        match self {
            Self::Sensors(_) => DatabaseSchema::new(vec![rooms_table(), sensor_logs_table()]),
            Self::Shop(_) => DatabaseSchema::new(shop_tables()),
        }
    }

    /// Lazy row stream. The same seed and anchor always give the same rows.
    #[must_use]
    pub fn rows(&self, seed: u64, anchor: DateTime<Utc>) -> Box<dyn Iterator<Item = Row> + '_> {
        match self {
            Self::Sensors(f) => Box::new(
                SensorGenerator::new(&f.preset, f.rooms, f.logs_per_room, seed, anchor).map(Row::from),
            ),
            Self::Shop(f) => Box::new(
                ShopGenerator::new(&f.preset, f.users, f.orders_per_user, seed, anchor).map(Row::from),
            ),
        }
    }

    /// Row counts fully determined by the configuration. `None` where the
    /// count is itself random.
    #[must_use]
    pub fn expected_counts(&self) -> IndexMap<String, Option<u64>> {
        let pairs: Vec<(&str, Option<u64>)> = match self {
            Self::Sensors(f) => vec![
                ("rooms", Some(f.rooms)),
                ("sensor_logs", Some(f.rooms * f.logs_per_room)),
            ],
            Self::Shop(f) => {
                let categories = f.preset.categories.len() as u64;
                vec![
                    ("categories", Some(categories)),
                    ("users", Some(f.users)),
                    ("products", Some(categories * f.preset.products_per_category)),
                    ("orders", Some(f.users * f.orders_per_user)),
                    ("order_items", None),
                ]
            }
        };
        pairs
            .into_iter()
            .map(|(table, count)| (table.to_string(), count))
            .collect()
    }

    /// Referential, uniqueness and range checks. Time window checks need the
    /// anchor the data was generated against.
    #[must_use]
    pub fn integrity_checks(&self, anchor: Option<DateTime<Utc>>) -> Vec<IntegrityCheck> {
        let schema = self.schema();
        let mut checks = vec![];

        for table in schema.tables.values() {
            for (column, referenced) in table.foreign_keys() {
                checks.push(IntegrityCheck {
                    title: format!("{} rows with dangling {column}", table.name),
                    sql: format!(
                        "SELECT COUNT(*) FROM {t} LEFT JOIN {referenced} ON {referenced}.id = {t}.{column} WHERE {referenced}.id IS NULL",
                        t = table.name
                    ),
                });
            }
            for column in table.unique_fields() {
                checks.push(IntegrityCheck {
                    title: format!("duplicate {}.{column} values", table.name),
                    sql: format!(
                        "SELECT COUNT(*) - COUNT(DISTINCT {column}) FROM {}",
                        table.name
                    ),
                });
            }
        }

        match self {
            Self::Sensors(f) => checks.extend(sensor_range_checks(&f.preset, anchor)),
            Self::Shop(f) => checks.extend(shop_range_checks(&f.preset, anchor)),
        }
        checks
    }

    #[must_use]
    pub fn demo_queries(&self) -> Vec<DemoQuery> {
        match self {
            Self::Sensors(_) => SENSOR_DEMO_QUERIES.to_vec(),
            Self::Shop(_) => SHOP_DEMO_QUERIES.to_vec(),
        }
    }
}

fn int_outside(column: &str, range: &IntRange) -> String {
    format!("{column} NOT BETWEEN {} AND {}", range.min, range.max)
}

fn real_outside(column: &str, range: &FloatRange) -> String {
    format!("{column} NOT BETWEEN {:?} AND {:?}", range.min, range.max)
}

fn window_check(table: &str, column: &str, anchor: DateTime<Utc>, days: i64) -> IntegrityCheck {
    let earliest = anchor - Duration::days(days);
    IntegrityCheck {
        title: format!("{table}.{column} outside the {days} day window"),
        sql: format!(
            "SELECT COUNT(*) FROM {table} WHERE {column} NOT BETWEEN '{}' AND '{}'",
            earliest.format(TIMESTAMP_FORMAT),
            anchor.format(TIMESTAMP_FORMAT)
        ),
    }
}

fn sensor_range_checks(preset: &SensorPreset, anchor: Option<DateTime<Utc>>) -> Vec<IntegrityCheck> {
    let room_conditions = [
        int_outside("floor_number", &preset.floor_number),
        int_outside("capacity", &preset.capacity),
    ];
    let log_conditions = [
        real_outside("temperature_celsius", &preset.temperature_celsius),
        real_outside("humidity_percent", &preset.humidity_percent),
        real_outside("pressure_hpa", &preset.pressure_hpa),
        int_outside("co2_ppm", &preset.co2_ppm),
        real_outside("light_lux", &preset.light_lux),
        real_outside("noise_db", &preset.noise_db),
        "motion_detected NOT IN (0, 1)".to_string(),
        int_outside("air_quality_index", &preset.air_quality_index),
        int_outside("occupancy_count", &preset.occupancy_count),
        real_outside("voltage_v", &preset.voltage_v),
        real_outside("power_consumption_w", &preset.power_consumption_w),
    ];

    let mut checks = vec![
        IntegrityCheck {
            title: "rooms with values out of range".into(),
            sql: format!("SELECT COUNT(*) FROM rooms WHERE {}", room_conditions.join(" OR ")),
        },
        IntegrityCheck {
            title: "sensor logs with values out of range".into(),
            sql: format!(
                "SELECT COUNT(*) FROM sensor_logs WHERE {}",
                log_conditions.join(" OR ")
            ),
        },
    ];
    if let Some(anchor) = anchor {
        checks.push(window_check("sensor_logs", "timestamp", anchor, preset.window_days));
    }
    checks
}

fn shop_range_checks(preset: &ShopPreset, anchor: Option<DateTime<Utc>>) -> Vec<IntegrityCheck> {
    let mut checks = vec![
        IntegrityCheck {
            title: "products with values out of range".into(),
            sql: format!(
                "SELECT COUNT(*) FROM products WHERE {} OR {}",
                real_outside("price", &preset.price),
                int_outside("stock", &preset.stock)
            ),
        },
        IntegrityCheck {
            title: "order items with values out of range".into(),
            sql: format!(
                "SELECT COUNT(*) FROM order_items WHERE {} OR {}",
                int_outside("quantity", &preset.quantity),
                real_outside("unit_price", &preset.price)
            ),
        },
        IntegrityCheck {
            title: "orders without items".into(),
            sql: "SELECT COUNT(*) FROM orders WHERE id NOT IN (SELECT order_id FROM order_items)".into(),
        },
        IntegrityCheck {
            title: "orders whose total differs from their items".into(),
            sql: "SELECT COUNT(*) FROM orders o WHERE ABS(o.total - (SELECT COALESCE(SUM(i.quantity * i.unit_price), 0) FROM order_items i WHERE i.order_id = o.id)) > 0.01".into(),
        },
    ];
    if let Some(anchor) = anchor {
        checks.push(window_check("users", "created_at", anchor, preset.signup_window_days));
        checks.push(window_check("orders", "order_date", anchor, preset.order_window_days));
    }
    checks
}

const SENSOR_DEMO_QUERIES: [DemoQuery; 7] = [
    DemoQuery {
        title: "Temperature extremes",
        sql: "SELECT MIN(temperature_celsius) AS min_temp, MAX(temperature_celsius) AS max_temp, ROUND(AVG(temperature_celsius), 2) AS avg_temp FROM sensor_logs",
    },
    DemoQuery {
        title: "Hottest rooms by average temperature",
        sql: "SELECT r.room_number, r.building_name, ROUND(AVG(s.temperature_celsius), 2) AS avg_temp, COUNT(*) AS readings FROM sensor_logs s JOIN rooms r ON r.id = s.room_id GROUP BY r.id ORDER BY avg_temp DESC LIMIT 5",
    },
    DemoQuery {
        title: "Readings above 60 C",
        sql: "SELECT r.room_number, s.timestamp, s.temperature_celsius FROM sensor_logs s JOIN rooms r ON r.id = s.room_id WHERE s.temperature_celsius > 60 ORDER BY s.temperature_celsius DESC LIMIT 10",
    },
    DemoQuery {
        title: "CO2 alerts per building",
        sql: "SELECT r.building_name, COUNT(*) AS alerts, MAX(s.co2_ppm) AS peak_ppm FROM sensor_logs s JOIN rooms r ON r.id = s.room_id WHERE s.co2_ppm > 1500 GROUP BY r.building_name ORDER BY alerts DESC",
    },
    DemoQuery {
        title: "Power consumption by room type",
        sql: "SELECT r.room_type, ROUND(SUM(s.power_consumption_w) / 1000.0, 2) AS total_kw, ROUND(AVG(s.voltage_v), 2) AS avg_voltage FROM sensor_logs s JOIN rooms r ON r.id = s.room_id GROUP BY r.room_type ORDER BY total_kw DESC",
    },
    DemoQuery {
        title: "Busiest floors",
        sql: "SELECT r.building_name, r.floor_number, ROUND(AVG(s.occupancy_count), 2) AS avg_occupancy, SUM(s.motion_detected) AS motion_events FROM sensor_logs s JOIN rooms r ON r.id = s.room_id GROUP BY r.building_name, r.floor_number ORDER BY avg_occupancy DESC LIMIT 5",
    },
    DemoQuery {
        title: "Daily readings, last 7 days of data",
        sql: "SELECT date(timestamp) AS day, COUNT(*) AS readings, ROUND(AVG(air_quality_index), 1) AS avg_aqi FROM sensor_logs WHERE timestamp >= (SELECT datetime(MAX(timestamp), '-7 days') FROM sensor_logs) GROUP BY day ORDER BY day",
    },
];

const SHOP_DEMO_QUERIES: [DemoQuery; 5] = [
    DemoQuery {
        title: "Orders by status",
        sql: "SELECT status, COUNT(*) AS orders, ROUND(SUM(total), 2) AS revenue FROM orders GROUP BY status ORDER BY orders DESC",
    },
    DemoQuery {
        title: "Top products by revenue",
        sql: "SELECT p.name, SUM(i.quantity) AS units, ROUND(SUM(i.quantity * i.unit_price), 2) AS revenue FROM order_items i JOIN products p ON p.id = i.product_id GROUP BY p.id ORDER BY revenue DESC LIMIT 5",
    },
    DemoQuery {
        title: "Revenue per category",
        sql: "SELECT c.name AS category, ROUND(SUM(i.quantity * i.unit_price), 2) AS revenue FROM order_items i JOIN products p ON p.id = i.product_id JOIN categories c ON c.id = p.category_id GROUP BY c.id ORDER BY revenue DESC",
    },
    DemoQuery {
        title: "Top customers",
        sql: "SELECT u.username, u.country, COUNT(o.id) AS orders, ROUND(SUM(o.total), 2) AS spent FROM orders o JOIN users u ON u.id = o.user_id GROUP BY u.id ORDER BY spent DESC LIMIT 5",
    },
    DemoQuery {
        title: "Low stock products",
        sql: "SELECT p.name, c.name AS category, p.stock FROM products p JOIN categories c ON c.id = p.category_id WHERE p.stock < 20 ORDER BY p.stock LIMIT 10",
    },
];

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_sensor_expected_counts() {
        let counts = Fixture::sensors(2, 1000).expected_counts();
        assert_eq!(Some(2), counts["rooms"]);
        assert_eq!(Some(2000), counts["sensor_logs"]);
    }

    #[test]
    fn test_shop_expected_counts() {
        let counts = Fixture::shop(10, 3).expected_counts();
        assert_eq!(Some(8), counts["categories"]);
        assert_eq!(Some(80), counts["products"]);
        assert_eq!(Some(30), counts["orders"]);
        assert_eq!(None, counts["order_items"]);
    }

    #[test]
    fn test_schema_tables_match_expected_counts() {
        for fixture in [Fixture::sensors(1, 1), Fixture::shop(1, 1)] {
            let tables: Vec<String> = fixture.schema().tables.keys().cloned().collect();
            let counted: Vec<String> = fixture.expected_counts().keys().cloned().collect();
            assert_eq!(tables, counted);
        }
    }

    #[test]
    fn test_integrity_checks_cover_references_and_uniques() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let checks = Fixture::sensors(1, 1).integrity_checks(Some(anchor));
        let titles: Vec<&str> = checks.iter().map(|c| c.title.as_str()).collect();

        assert!(titles.contains(&"sensor_logs rows with dangling room_id"));
        assert!(titles.contains(&"duplicate rooms.room_number values"));
        assert!(checks
            .iter()
            .any(|c| c.sql.contains("'2024-01-31 12:00:00' AND '2024-03-01 12:00:00'")));
        assert!(checks
            .iter()
            .any(|c| c.sql.contains("temperature_celsius NOT BETWEEN 10.0 AND 70.0")));

        let without_anchor = Fixture::sensors(1, 1).integrity_checks(None);
        assert_eq!(checks.len() - 1, without_anchor.len());
    }

    #[test]
    fn test_validate_rejects_oversized_counts() {
        assert!(Fixture::sensors(u64::MAX, 2).validate().is_err());
        assert!(Fixture::sensors(0, u64::MAX).validate().is_ok());
        assert!(Fixture::sensors(2, 1000).validate().is_ok());
    }

    #[test]
    fn test_parse_name() {
        assert_eq!("shop", Fixture::parse_name("shop").unwrap().name());
        assert!(Fixture::parse_name("garden").is_err());
    }
}
