//! DDL generation.
//!
//! Each dialect has a [`DdlGenerator`] that renders a [`SchemaOperation`]
//! into one or more statements. Type names come from one lookup table keyed
//! by column type with a template per dialect; adding a column type means
//! adding one row.
//!
//! Generation is fallible: an operation the engine cannot perform (adding a
//! foreign key to an existing SQLite table, for instance) is reported as
//! `Error::Unsupported` before any statement is executed.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDdlGenerator;
pub use postgres::PostgresDdlGenerator;
pub use sqlite::SqliteDdlGenerator;

use std::fmt::Write as _;

use forge_core::value::DATETIME_FORMAT;
use forge_core::{Dialect, Result, Value};

use crate::column::{Column, ColumnDefault, ColumnType};
use crate::foreign_key::{ForeignKey, ReferentialAction};
use crate::operation::{Index, SchemaOperation};

/// Renders schema operations for one dialect.
pub trait DdlGenerator {
    /// The dialect this generator targets.
    fn dialect(&self) -> Dialect;

    /// Statements for a single operation.
    fn generate(&self, op: &SchemaOperation) -> Result<Vec<String>>;

    /// Statements for a list of operations, in order.
    ///
    /// Fails on the first unsupported operation without returning a partial
    /// list.
    fn generate_all(&self, ops: &[SchemaOperation]) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for op in ops {
            statements.extend(self.generate(op)?);
        }
        Ok(statements)
    }
}

/// The generator for `dialect`.
pub fn generator_for(dialect: Dialect) -> &'static dyn DdlGenerator {
    match dialect {
        Dialect::Mysql => &MySqlDdlGenerator,
        Dialect::Postgres => &PostgresDdlGenerator,
        Dialect::Sqlite => &SqliteDdlGenerator,
    }
}

// ==================== Type table ====================

/// Data-free mirror of [`ColumnType`] used as the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKey {
    TinyInteger,
    SmallInteger,
    Integer,
    BigInteger,
    Char,
    String,
    Text,
    MediumText,
    LongText,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
    Decimal,
    Float,
    Double,
    Enum,
    Set,
    Json,
    Jsonb,
    Uuid,
    Binary,
    IpAddress,
    MacAddress,
}

fn type_key(column_type: &ColumnType) -> TypeKey {
    match column_type {
        ColumnType::TinyInteger => TypeKey::TinyInteger,
        ColumnType::SmallInteger => TypeKey::SmallInteger,
        ColumnType::Integer => TypeKey::Integer,
        ColumnType::BigInteger => TypeKey::BigInteger,
        ColumnType::Char { .. } => TypeKey::Char,
        ColumnType::String { .. } => TypeKey::String,
        ColumnType::Text => TypeKey::Text,
        ColumnType::MediumText => TypeKey::MediumText,
        ColumnType::LongText => TypeKey::LongText,
        ColumnType::Boolean => TypeKey::Boolean,
        ColumnType::Date => TypeKey::Date,
        ColumnType::Time => TypeKey::Time,
        ColumnType::DateTime => TypeKey::DateTime,
        ColumnType::Timestamp => TypeKey::Timestamp,
        ColumnType::Decimal { .. } => TypeKey::Decimal,
        ColumnType::Float => TypeKey::Float,
        ColumnType::Double => TypeKey::Double,
        ColumnType::Enum(_) => TypeKey::Enum,
        ColumnType::Set(_) => TypeKey::Set,
        ColumnType::Json => TypeKey::Json,
        ColumnType::Jsonb => TypeKey::Jsonb,
        ColumnType::Uuid => TypeKey::Uuid,
        ColumnType::Binary => TypeKey::Binary,
        ColumnType::IpAddress => TypeKey::IpAddress,
        ColumnType::MacAddress => TypeKey::MacAddress,
    }
}

/// `[mysql, pgsql, sqlite]` templates. Placeholders: `{length}`,
/// `{precision}`, `{scale}`, `{values}` (quoted list) and `{column}`.
/// SQLite's dynamic typing ignores lengths, so its templates omit them.
const TYPE_TABLE: &[(TypeKey, [&str; 3])] = &[
    (TypeKey::TinyInteger, ["TINYINT", "SMALLINT", "INTEGER"]),
    (TypeKey::SmallInteger, ["SMALLINT", "SMALLINT", "INTEGER"]),
    (TypeKey::Integer, ["INT", "INTEGER", "INTEGER"]),
    (TypeKey::BigInteger, ["BIGINT", "BIGINT", "INTEGER"]),
    (TypeKey::Char, ["CHAR({length})", "CHAR({length})", "VARCHAR"]),
    (TypeKey::String, ["VARCHAR({length})", "VARCHAR({length})", "VARCHAR"]),
    (TypeKey::Text, ["TEXT", "TEXT", "TEXT"]),
    (TypeKey::MediumText, ["MEDIUMTEXT", "TEXT", "TEXT"]),
    (TypeKey::LongText, ["LONGTEXT", "TEXT", "TEXT"]),
    (TypeKey::Boolean, ["TINYINT(1)", "BOOLEAN", "TINYINT(1)"]),
    (TypeKey::Date, ["DATE", "DATE", "DATE"]),
    (TypeKey::Time, ["TIME", "TIME(0) WITHOUT TIME ZONE", "TIME"]),
    (TypeKey::DateTime, ["DATETIME", "TIMESTAMP(0) WITHOUT TIME ZONE", "DATETIME"]),
    (TypeKey::Timestamp, ["TIMESTAMP", "TIMESTAMP(0) WITHOUT TIME ZONE", "DATETIME"]),
    (TypeKey::Decimal, ["DECIMAL({precision}, {scale})", "DECIMAL({precision}, {scale})", "NUMERIC"]),
    (TypeKey::Float, ["FLOAT", "REAL", "FLOAT"]),
    (TypeKey::Double, ["DOUBLE", "DOUBLE PRECISION", "DOUBLE"]),
    (
        TypeKey::Enum,
        [
            "ENUM({values})",
            "VARCHAR(255) CHECK ({column} IN ({values}))",
            "VARCHAR CHECK ({column} IN ({values}))",
        ],
    ),
    (TypeKey::Set, ["SET({values})", "VARCHAR(255)", "VARCHAR"]),
    (TypeKey::Json, ["JSON", "JSON", "JSON"]),
    (TypeKey::Jsonb, ["JSON", "JSONB", "JSON"]),
    (TypeKey::Uuid, ["CHAR(36)", "UUID", "VARCHAR"]),
    (TypeKey::Binary, ["BLOB", "BYTEA", "BLOB"]),
    (TypeKey::IpAddress, ["VARCHAR(45)", "INET", "VARCHAR"]),
    (TypeKey::MacAddress, ["VARCHAR(17)", "MACADDR", "VARCHAR"]),
];

/// Auto-increment replacements. MySQL keeps the base type and appends
/// `AUTO_INCREMENT` instead.
const SERIAL_TABLE: &[(TypeKey, Dialect, &str)] = &[
    (TypeKey::TinyInteger, Dialect::Postgres, "SMALLSERIAL"),
    (TypeKey::SmallInteger, Dialect::Postgres, "SMALLSERIAL"),
    (TypeKey::Integer, Dialect::Postgres, "SERIAL"),
    (TypeKey::BigInteger, Dialect::Postgres, "BIGSERIAL"),
    (TypeKey::TinyInteger, Dialect::Sqlite, "INTEGER"),
    (TypeKey::SmallInteger, Dialect::Sqlite, "INTEGER"),
    (TypeKey::Integer, Dialect::Sqlite, "INTEGER"),
    (TypeKey::BigInteger, Dialect::Sqlite, "INTEGER"),
];

const fn slot(dialect: Dialect) -> usize {
    match dialect {
        Dialect::Mysql => 0,
        Dialect::Postgres => 1,
        Dialect::Sqlite => 2,
    }
}

/// SQL type for `column`, including `UNSIGNED` on MySQL.
pub fn column_type_sql(dialect: Dialect, column: &Column) -> String {
    let key = type_key(&column.column_type);
    if column.auto_increment {
        let serial = SERIAL_TABLE
            .iter()
            .find(|(k, d, _)| *k == key && *d == dialect)
            .map(|(_, _, sql)| *sql);
        if let Some(serial) = serial {
            return serial.to_string();
        }
    }

    let template = TYPE_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map_or("TEXT", |(_, names)| names[slot(dialect)]);
    let mut sql = render_template(template, dialect, column);
    if dialect == Dialect::Mysql && column.unsigned && column.column_type.is_numeric() {
        sql.push_str(" UNSIGNED");
    }
    sql
}

fn render_template(template: &str, dialect: Dialect, column: &Column) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let mut sql = template.replace("{column}", &dialect.quote_identifier(&column.name));
    match &column.column_type {
        ColumnType::Char { length } | ColumnType::String { length } => {
            sql = sql.replace("{length}", &length.to_string());
        }
        ColumnType::Decimal { precision, scale } => {
            sql = sql
                .replace("{precision}", &precision.to_string())
                .replace("{scale}", &scale.to_string());
        }
        ColumnType::Enum(values) | ColumnType::Set(values) => {
            let quoted: Vec<String> = values.iter().map(|v| dialect.quote_string(v)).collect();
            sql = sql.replace("{values}", &quoted.join(", "));
        }
        _ => {}
    }
    sql
}

// ==================== Shared rendering ====================

/// `DEFAULT` value as SQL.
pub fn default_sql(dialect: Dialect, default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Raw(expression) => expression.clone(),
        ColumnDefault::Value(value) => literal_sql(dialect, value),
    }
}

fn literal_sql(dialect: Dialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => match (dialect, b) {
            (Dialect::Postgres, true) => "TRUE".to_string(),
            (Dialect::Postgres, false) => "FALSE".to_string(),
            (_, true) => "1".to_string(),
            (_, false) => "0".to_string(),
        },
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => dialect.quote_string(s),
        Value::Bytes(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2);
            for byte in bytes {
                let _ = write!(hex, "{byte:02x}");
            }
            match dialect {
                Dialect::Postgres => format!("'\\x{hex}'"),
                Dialect::Mysql | Dialect::Sqlite => format!("X'{hex}'"),
            }
        }
        Value::DateTime(dt) => dialect.quote_string(&dt.format(DATETIME_FORMAT).to_string()),
        Value::Json(json) => dialect.quote_string(&json.to_string()),
    }
}

/// Comma-separated quoted column list.
pub(crate) fn column_list(dialect: Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `FOREIGN KEY (..) REFERENCES t (..) [ON DELETE ..] [ON UPDATE ..]`.
pub(crate) fn foreign_key_clause(dialect: Dialect, foreign_key: &ForeignKey) -> String {
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        dialect.quote_identifier(&foreign_key.column),
        dialect.quote_identifier(&foreign_key.on),
        dialect.quote_identifier(&foreign_key.references),
    );
    if foreign_key.on_delete != ReferentialAction::NoAction {
        sql.push_str(" ON DELETE ");
        sql.push_str(foreign_key.on_delete.as_sql());
    }
    if foreign_key.on_update != ReferentialAction::NoAction {
        sql.push_str(" ON UPDATE ");
        sql.push_str(foreign_key.on_update.as_sql());
    }
    sql
}

/// `ALTER TABLE t ADD CONSTRAINT name FOREIGN KEY ...`.
pub(crate) fn add_foreign_key_sql(dialect: Dialect, table: &str, foreign_key: &ForeignKey) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {}",
        dialect.quote_identifier(table),
        dialect.quote_identifier(&foreign_key.constraint_name(table)),
        foreign_key_clause(dialect, foreign_key)
    )
}

/// `CREATE [UNIQUE] INDEX name ON t (cols)`.
pub(crate) fn create_index_sql(dialect: Dialect, table: &str, index: &Index, unique: bool) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        dialect.quote_identifier(&index.name),
        dialect.quote_identifier(table),
        column_list(dialect, &index.columns)
    )
}

/// `PRIMARY KEY (cols)` table constraint.
pub(crate) fn primary_key_clause(dialect: Dialect, index: &Index) -> String {
    format!("PRIMARY KEY ({})", column_list(dialect, &index.columns))
}

pub(crate) fn drop_table_sql(dialect: Dialect, table: &str, if_exists: bool) -> String {
    format!(
        "DROP TABLE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        dialect.quote_identifier(table)
    )
}

pub(crate) fn rename_column_sql(dialect: Dialect, table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        dialect.quote_identifier(table),
        dialect.quote_identifier(from),
        dialect.quote_identifier(to)
    )
}

pub(crate) fn drop_column_sql(dialect: Dialect, table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        dialect.quote_identifier(table),
        dialect.quote_identifier(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anvil::Anvil;

    fn column(name: &str, column_type: ColumnType) -> Column {
        Column::new(name, column_type)
    }

    #[test]
    fn test_every_type_has_a_row() {
        let all = [
            ColumnType::TinyInteger,
            ColumnType::SmallInteger,
            ColumnType::Integer,
            ColumnType::BigInteger,
            ColumnType::Char { length: 2 },
            ColumnType::String { length: 10 },
            ColumnType::Text,
            ColumnType::MediumText,
            ColumnType::LongText,
            ColumnType::Boolean,
            ColumnType::Date,
            ColumnType::Time,
            ColumnType::DateTime,
            ColumnType::Timestamp,
            ColumnType::Decimal { precision: 8, scale: 2 },
            ColumnType::Float,
            ColumnType::Double,
            ColumnType::Enum(vec!["a".to_string()]),
            ColumnType::Set(vec!["a".to_string()]),
            ColumnType::Json,
            ColumnType::Jsonb,
            ColumnType::Uuid,
            ColumnType::Binary,
            ColumnType::IpAddress,
            ColumnType::MacAddress,
        ];
        for column_type in all {
            let key = type_key(&column_type);
            assert!(TYPE_TABLE.iter().any(|(k, _)| *k == key), "{key:?} has no row");
        }
    }

    #[test]
    fn test_type_resolution_per_dialect() {
        let name = column("name", ColumnType::String { length: 100 });
        assert_eq!(column_type_sql(Dialect::Mysql, &name), "VARCHAR(100)");
        assert_eq!(column_type_sql(Dialect::Postgres, &name), "VARCHAR(100)");
        assert_eq!(column_type_sql(Dialect::Sqlite, &name), "VARCHAR");

        let price = column("price", ColumnType::Decimal { precision: 10, scale: 2 });
        assert_eq!(column_type_sql(Dialect::Mysql, &price), "DECIMAL(10, 2)");
        assert_eq!(column_type_sql(Dialect::Sqlite, &price), "NUMERIC");
    }

    #[test]
    fn test_auto_increment_types() {
        let mut t = Anvil::create("users");
        let id = t.id().clone();
        assert_eq!(column_type_sql(Dialect::Postgres, &id), "BIGSERIAL");
        assert_eq!(column_type_sql(Dialect::Sqlite, &id), "INTEGER");
        assert_eq!(column_type_sql(Dialect::Mysql, &id), "BIGINT UNSIGNED");
        let small = t.increments("n").clone();
        assert_eq!(column_type_sql(Dialect::Postgres, &small), "SERIAL");
    }

    #[test]
    fn test_enum_rendering() {
        let status = column(
            "status",
            ColumnType::Enum(vec!["draft".to_string(), "live".to_string()]),
        );
        assert_eq!(column_type_sql(Dialect::Mysql, &status), "ENUM('draft', 'live')");
        assert_eq!(
            column_type_sql(Dialect::Postgres, &status),
            r#"VARCHAR(255) CHECK ("status" IN ('draft', 'live'))"#
        );
    }

    #[test]
    fn test_unsigned_only_on_mysql_numeric() {
        let mut votes = column("votes", ColumnType::Integer);
        votes.unsigned();
        assert_eq!(column_type_sql(Dialect::Mysql, &votes), "INT UNSIGNED");
        assert_eq!(column_type_sql(Dialect::Postgres, &votes), "INTEGER");
    }

    #[test]
    fn test_default_literals() {
        let d = ColumnDefault::Value(Value::Bool(true));
        assert_eq!(default_sql(Dialect::Postgres, &d), "TRUE");
        assert_eq!(default_sql(Dialect::Mysql, &d), "1");
        let d = ColumnDefault::Value(Value::from("it's"));
        assert_eq!(default_sql(Dialect::Sqlite, &d), "'it''s'");
        let d = ColumnDefault::Raw("CURRENT_TIMESTAMP".to_string());
        assert_eq!(default_sql(Dialect::Mysql, &d), "CURRENT_TIMESTAMP");
        let d = ColumnDefault::Value(Value::Bytes(vec![0xde, 0xad]));
        assert_eq!(default_sql(Dialect::Sqlite, &d), "X'dead'");
    }

    #[test]
    fn test_foreign_key_clause() {
        let mut fk = ForeignKey::new("user_id");
        fk.on("users").cascade_on_delete();
        assert_eq!(
            foreign_key_clause(Dialect::Postgres, &fk),
            r#"FOREIGN KEY ("user_id") REFERENCES "users" ("id") ON DELETE CASCADE"#
        );
    }

    #[test]
    fn test_generator_for() {
        assert_eq!(generator_for(Dialect::Mysql).dialect(), Dialect::Mysql);
        assert_eq!(generator_for(Dialect::Postgres).dialect(), Dialect::Postgres);
        assert_eq!(generator_for(Dialect::Sqlite).dialect(), Dialect::Sqlite);
    }
}
