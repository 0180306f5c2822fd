//! Database schema description used for prompt hints.
//!
//! Only what helps a model write a query is kept: tables, columns,
//! primary keys and foreign-key edges.

use serde::{Deserialize, Serialize};

/// Tables and relationships of the public schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Groups `(table, column, data_type, is_nullable)` rows, already ordered
    /// by table and ordinal position, into tables.
    pub fn from_column_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String, bool)>,
    {
        let mut tables: Vec<Table> = Vec::new();
        for (table_name, column_name, data_type, is_nullable) in rows {
            let column = Column::new(column_name, data_type).nullable(is_nullable);
            match tables.last_mut() {
                Some(table) if table.name == table_name => table.columns.push(column),
                _ => {
                    let mut table = Table::new(table_name);
                    table.columns.push(column);
                    tables.push(table);
                }
            }
        }
        Self {
            tables,
            foreign_keys: Vec::new(),
        }
    }

    /// Marks `(table, column)` pairs as primary-key members.
    pub fn apply_primary_keys<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (table_name, column_name) in keys {
            if let Some(table) = self.tables.iter_mut().find(|t| t.name == table_name) {
                table.primary_key.push(column_name);
            }
        }
    }

    /// Renders the schema as the plain-text block embedded in prompts.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::new();

        for table in &self.tables {
            out.push_str(&format!("Table: {}\n", table.name));
            for column in &table.columns {
                out.push_str(&self.format_column(table, column));
            }
            out.push('\n');
        }

        if !self.foreign_keys.is_empty() {
            out.push_str("Foreign Keys:\n");
            for fk in &self.foreign_keys {
                out.push_str(&format!(
                    "  - {}.{} -> {}.{}\n",
                    fk.from_table,
                    fk.from_columns.join(", "),
                    fk.to_table,
                    fk.to_columns.join(", ")
                ));
            }
        }

        out.trim_end().to_string()
    }

    fn format_column(&self, table: &Table, column: &Column) -> String {
        let notes: Vec<&str> = [
            table.primary_key.contains(&column.name).then_some("PK"),
            (!column.is_nullable).then_some("NOT NULL"),
        ]
        .into_iter()
        .flatten()
        .collect();

        if notes.is_empty() {
            format!("  - {}: {}\n", column.name, column.data_type)
        } else {
            format!(
                "  - {}: {} ({})\n",
                column.name,
                column.data_type,
                notes.join(", ")
            )
        }
    }
}

/// A database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Column names that form the primary key.
    pub primary_key: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }
}

/// A column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Data type as reported by `information_schema` (e.g. "integer").
    pub data_type: String,
    pub is_nullable: bool,
}

impl Column {
    /// Creates a nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }
}

/// A foreign-key edge between two tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}
