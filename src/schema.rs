use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
}

impl FieldKind {
    #[must_use]
    pub const fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub kind: FieldKind,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<String>,
}

impl FieldSchema {
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            primary_key: false,
            unique: false,
            references: None,
        }
    }

    #[must_use]
    pub const fn primary_key() -> Self {
        Self {
            kind: FieldKind::Integer,
            primary_key: true,
            unique: false,
            references: None,
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Foreign key to the `id` column of another table.
    #[must_use]
    pub fn references(table: &str) -> Self {
        Self {
            kind: FieldKind::Integer,
            primary_key: false,
            unique: false,
            references: Some(table.to_string()),
        }
    }

    fn column_definition(&self, name: &str) -> String {
        let mut out = format!("{name} {}", self.kind.sql_type());
        if self.primary_key {
            out.push_str(" PRIMARY KEY");
        } else {
            out.push_str(" NOT NULL");
        }
        if self.unique {
            out.push_str(" UNIQUE");
        }
        if let Some(table) = &self.references {
            out.push_str(&format!(" REFERENCES {table}(id)"));
        }
        out
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub fields: IndexMap<String, FieldSchema>,
    /// Index name -> indexed columns, in key order.
    pub indices: IndexMap<String, Vec<String>>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: IndexMap::new(),
            indices: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: &str, field: FieldSchema) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    #[must_use]
    pub fn index(mut self, name: &str, fields: &[&str]) -> Self {
        self.indices.insert(
            name.to_string(),
            fields.iter().map(ToString::to_string).collect(),
        );
        self
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn column_list(&self) -> String {
        self.fields.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|(name, field)| format!("    {}", field.column_definition(name)))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            self.name,
            columns.join(",\n")
        )
    }

    #[must_use]
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    #[must_use]
    pub fn index_name(&self, index_name: &str) -> String {
        format!("idx_{}_{}", self.name, index_name)
    }

    #[must_use]
    pub fn create_index_sqls(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|(index_name, fields)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({});",
                    self.index_name(index_name),
                    self.name,
                    fields.join(", ")
                )
            })
            .collect()
    }

    /// Parameterized insert with `rows` placeholder tuples.
    #[must_use]
    pub fn insert_sql(&self, rows: usize) -> String {
        let tuple = format!("({})", vec!["?"; self.column_count()].join(", "));
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.name,
            self.column_list(),
            vec![tuple.as_str(); rows.max(1)].join(", ")
        )
    }

    /// Columns referencing another table, with the referenced table name.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(name, field)| {
            field
                .references
                .as_deref()
                .map(|table| (name.as_str(), table))
        })
    }

    /// Columns carrying a unique constraint.
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, field)| field.unique)
            .map(|(name, _)| name.as_str())
    }
}

/// Tables of one fixture, in dependency (creation and load) order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub tables: IndexMap<String, TableSchema>,
}

impl DatabaseSchema {
    #[must_use]
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.clone(), table))
                .collect(),
        }
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Creation script. Tables are dropped first in reverse dependency order.
    #[must_use]
    pub fn create_sql(&self) -> String {
        let mut out = vec!["PRAGMA foreign_keys = ON;".to_string()];
        out.extend(self.tables.values().rev().map(TableSchema::drop_table_sql));
        out.extend(self.tables.values().map(TableSchema::create_table_sql));
        out.join("\n")
    }
}
