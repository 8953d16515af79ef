//! Users, categories, products, orders and order items.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    preset::{pick, ShopPreset},
    schema::{FieldKind, FieldSchema, TableSchema},
    sensor::TIMESTAMP_FORMAT,
    value::{Row, Value},
};

pub const CATEGORIES_TABLE: &str = "categories";
pub const USERS_TABLE: &str = "users";
pub const PRODUCTS_TABLE: &str = "products";
pub const ORDERS_TABLE: &str = "orders";
pub const ORDER_ITEMS_TABLE: &str = "order_items";

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub price: f64,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub order_date: DateTime<Utc>,
    pub status: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShopRecord {
    Category(Category),
    User(User),
    Product(Product),
    Order(Order),
    OrderItem(OrderItem),
}

impl From<ShopRecord> for Row {
    fn from(record: ShopRecord) -> Self {
        match record {
            ShopRecord::Category(c) => Self::new(
                CATEGORIES_TABLE,
                vec![Value::Integer(c.id), Value::Text(c.name)],
            ),
            ShopRecord::User(u) => Self::new(
                USERS_TABLE,
                vec![
                    Value::Integer(u.id),
                    Value::Text(u.username),
                    Value::Text(u.email),
                    Value::Text(u.country),
                    Value::Text(u.created_at.format(TIMESTAMP_FORMAT).to_string()),
                ],
            ),
            ShopRecord::Product(p) => Self::new(
                PRODUCTS_TABLE,
                vec![
                    Value::Integer(p.id),
                    Value::Integer(p.category_id),
                    Value::Text(p.name),
                    Value::Real(p.price),
                    Value::Integer(p.stock),
                ],
            ),
            ShopRecord::Order(o) => Self::new(
                ORDERS_TABLE,
                vec![
                    Value::Integer(o.id),
                    Value::Integer(o.user_id),
                    Value::Text(o.order_date.format(TIMESTAMP_FORMAT).to_string()),
                    Value::Text(o.status),
                    Value::Real(o.total),
                ],
            ),
            ShopRecord::OrderItem(i) => Self::new(
                ORDER_ITEMS_TABLE,
                vec![
                    Value::Integer(i.id),
                    Value::Integer(i.order_id),
                    Value::Integer(i.product_id),
                    Value::Integer(i.quantity),
                    Value::Real(i.unit_price),
                ],
            ),
        }
    }
}

#[must_use]
pub fn shop_tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new(CATEGORIES_TABLE)
            .field("id", FieldSchema::primary_key())
            .field("name", FieldSchema::new(FieldKind::Text).unique()),
        TableSchema::new(USERS_TABLE)
            .field("id", FieldSchema::primary_key())
            .field("username", FieldSchema::new(FieldKind::Text).unique())
            .field("email", FieldSchema::new(FieldKind::Text).unique())
            .field("country", FieldSchema::new(FieldKind::Text))
            .field("created_at", FieldSchema::new(FieldKind::Timestamp))
            .index("country", &["country"]),
        TableSchema::new(PRODUCTS_TABLE)
            .field("id", FieldSchema::primary_key())
            .field("category_id", FieldSchema::references(CATEGORIES_TABLE))
            .field("name", FieldSchema::new(FieldKind::Text))
            .field("price", FieldSchema::new(FieldKind::Real))
            .field("stock", FieldSchema::new(FieldKind::Integer))
            .index("category", &["category_id"])
            .index("price", &["price"]),
        TableSchema::new(ORDERS_TABLE)
            .field("id", FieldSchema::primary_key())
            .field("user_id", FieldSchema::references(USERS_TABLE))
            .field("order_date", FieldSchema::new(FieldKind::Timestamp))
            .field("status", FieldSchema::new(FieldKind::Text))
            .field("total", FieldSchema::new(FieldKind::Real))
            .index("user", &["user_id"])
            .index("date", &["order_date"])
            .index("status_date", &["status", "order_date"]),
        TableSchema::new(ORDER_ITEMS_TABLE)
            .field("id", FieldSchema::primary_key())
            .field("order_id", FieldSchema::references(ORDERS_TABLE))
            .field("product_id", FieldSchema::references(PRODUCTS_TABLE))
            .field("quantity", FieldSchema::new(FieldKind::Integer))
            .field("unit_price", FieldSchema::new(FieldKind::Real))
            .index("order", &["order_id"])
            .index("product", &["product_id"]),
    ]
}

enum Phase {
    Categories,
    Users,
    Products,
    Orders,
    Done,
}

/// Lazy, seeded producer of the shop tables in dependency order. Each order is
/// followed directly by its items.
pub struct ShopGenerator<'a> {
    preset: &'a ShopPreset,
    users: u64,
    orders_per_user: u64,
    anchor: DateTime<Utc>,
    rng: StdRng,
    phase: Phase,
    cursor: u64,
    product_prices: Vec<f64>,
    order_user: u64,
    orders_emitted_for_user: u64,
    next_order_id: i64,
    next_item_id: i64,
    pending: VecDeque<ShopRecord>,
}

impl<'a> ShopGenerator<'a> {
    /// The preset must already be validated.
    #[must_use]
    pub fn new(
        preset: &'a ShopPreset,
        users: u64,
        orders_per_user: u64,
        seed: u64,
        anchor: DateTime<Utc>,
    ) -> Self {
        Self {
            preset,
            users,
            orders_per_user,
            anchor,
            rng: StdRng::seed_from_u64(seed),
            phase: Phase::Categories,
            cursor: 0,
            product_prices: vec![],
            order_user: 1,
            orders_emitted_for_user: 0,
            next_order_id: 1,
            next_item_id: 1,
            pending: VecDeque::new(),
        }
    }

    fn product_count(&self) -> u64 {
        self.preset.categories.len() as u64 * self.preset.products_per_category
    }

    fn past(&mut self, window_days: i64) -> DateTime<Utc> {
        let window_seconds = window_days * 24 * 60 * 60;
        self.anchor - Duration::seconds(self.rng.random_range(0..=window_seconds))
    }

    fn generate_user(&mut self, id: i64) -> User {
        let country = pick(&self.preset.countries, &mut self.rng).to_string();
        User {
            id,
            username: format!("user{id:05}"),
            email: format!("user{id:05}@example.com"),
            country,
            created_at: self.past(self.preset.signup_window_days),
        }
    }

    fn generate_product(&mut self, index: u64) -> Product {
        let per_category = self.preset.products_per_category;
        let category_index = usize::try_from(index / per_category).unwrap_or(0);
        let category = &self.preset.categories[category_index];
        let price = self.preset.price.sample(&mut self.rng);
        self.product_prices.push(price);

        Product {
            id: to_i64(index + 1),
            category_id: to_i64(index / per_category + 1),
            name: format!("{category} item {}", index % per_category + 1),
            price,
            stock: self.preset.stock.sample(&mut self.rng),
        }
    }

    // Queues the order and its items; the order total is the sum of its items.
    fn generate_order(&mut self, user_id: u64) {
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let item_count = self.rng.random_range(1..=self.preset.max_items_per_order);
        let mut items = Vec::new();
        let mut total = 0.0;
        for _ in 0..item_count {
            let product_index = self.rng.random_range(0..self.product_prices.len());
            let unit_price = self.product_prices[product_index];
            let quantity = self.preset.quantity.sample(&mut self.rng);
            total += unit_price * quantity as f64;

            items.push(ShopRecord::OrderItem(OrderItem {
                id: self.next_item_id,
                order_id,
                product_id: to_i64(product_index as u64 + 1),
                quantity,
                unit_price,
            }));
            self.next_item_id += 1;
        }

        let order_date = self.past(self.preset.order_window_days);
        let status = pick(&self.preset.statuses, &mut self.rng).to_string();
        self.pending.push_back(ShopRecord::Order(Order {
            id: order_id,
            user_id: to_i64(user_id),
            order_date,
            status,
            total: (total * 100.0).round() / 100.0,
        }));
        self.pending.extend(items);
    }
}

impl Iterator for ShopGenerator<'_> {
    type Item = ShopRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }

            match self.phase {
                Phase::Categories => {
                    if let Some(name) = self.preset.categories.get(usize::try_from(self.cursor).ok()?) {
                        self.cursor += 1;
                        return Some(ShopRecord::Category(Category {
                            id: to_i64(self.cursor),
                            name: name.clone(),
                        }));
                    }
                    self.phase = Phase::Users;
                    self.cursor = 0;
                }
                Phase::Users => {
                    if self.cursor < self.users {
                        self.cursor += 1;
                        let user = self.generate_user(to_i64(self.cursor));
                        return Some(ShopRecord::User(user));
                    }
                    self.phase = Phase::Products;
                    self.cursor = 0;
                }
                Phase::Products => {
                    if self.cursor < self.product_count() {
                        let product = self.generate_product(self.cursor);
                        self.cursor += 1;
                        return Some(ShopRecord::Product(product));
                    }
                    self.phase = Phase::Orders;
                }
                Phase::Orders => {
                    if self.orders_per_user == 0 || self.order_user > self.users {
                        self.phase = Phase::Done;
                        continue;
                    }
                    self.generate_order(self.order_user);
                    self.orders_emitted_for_user += 1;
                    if self.orders_emitted_for_user == self.orders_per_user {
                        self.order_user += 1;
                        self.orders_emitted_for_user = 0;
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod test {
    use std::collections::{HashMap, HashSet};

    use chrono::TimeZone;

    use super::*;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn collect(users: u64, orders: u64, seed: u64) -> Vec<ShopRecord> {
        let preset = ShopPreset::default();
        ShopGenerator::new(&preset, users, orders, seed, anchor()).collect()
    }

    #[test]
    fn test_counts() {
        let records = collect(7, 3, 1);
        let categories = records.iter().filter(|r| matches!(r, ShopRecord::Category(_))).count();
        let users = records.iter().filter(|r| matches!(r, ShopRecord::User(_))).count();
        let products = records.iter().filter(|r| matches!(r, ShopRecord::Product(_))).count();
        let orders = records.iter().filter(|r| matches!(r, ShopRecord::Order(_))).count();
        let items = records.iter().filter(|r| matches!(r, ShopRecord::OrderItem(_))).count();

        assert_eq!(8, categories);
        assert_eq!(7, users);
        assert_eq!(80, products);
        assert_eq!(21, orders);
        assert!((21..=84).contains(&items));
    }

    #[test]
    fn test_zero_users_has_no_orders() {
        let records = collect(0, 5, 1);
        assert!(records
            .iter()
            .all(|r| matches!(r, ShopRecord::Category(_) | ShopRecord::Product(_))));
    }

    #[test]
    fn test_references_point_backwards() {
        let mut categories = HashSet::new();
        let mut users = HashSet::new();
        let mut products = HashMap::new();
        let mut orders = HashMap::new();
        let mut item_sums: HashMap<i64, f64> = HashMap::new();

        for record in collect(10, 4, 2) {
            match record {
                ShopRecord::Category(c) => {
                    categories.insert(c.id);
                }
                ShopRecord::User(u) => {
                    users.insert(u.id);
                }
                ShopRecord::Product(p) => {
                    assert!(categories.contains(&p.category_id));
                    products.insert(p.id, p.price);
                }
                ShopRecord::Order(o) => {
                    assert!(users.contains(&o.user_id));
                    orders.insert(o.id, o.total);
                }
                ShopRecord::OrderItem(i) => {
                    assert!(orders.contains_key(&i.order_id));
                    assert_eq!(Some(&i.unit_price), products.get(&i.product_id));
                    *item_sums.entry(i.order_id).or_default() += i.unit_price * i.quantity as f64;
                }
            }
        }

        for (order_id, total) in orders {
            assert!((item_sums[&order_id] - total).abs() < 0.01);
        }
    }

    #[test]
    fn test_same_seed_restarts_same_sequence() {
        assert_eq!(collect(3, 2, 5), collect(3, 2, 5));
    }

    #[test]
    fn test_row_conversion_matches_schema() {
        let tables = shop_tables();
        for record in collect(2, 1, 3) {
            let row = Row::from(record);
            let table = tables.iter().find(|t| t.name == row.table).unwrap();
            assert_eq!(table.column_count(), row.values.len());
        }
    }
}
