//! The `Anvil` table blueprint.
//!
//! An [`Anvil`] collects columns, indexes and foreign keys for one table,
//! then compiles them into [`SchemaOperation`]s. It is built fresh for every
//! `Schema::create` / `Schema::table` call and thrown away afterwards.
//!
//! ```ignore
//! schema.create("posts", |t| {
//!     t.id();
//!     t.foreign_id("user_id").constrained().cascade_on_delete();
//!     t.string("title");
//!     t.text("body").nullable();
//!     t.timestamps();
//! })?;
//! ```
//!
//! Column builders return `&mut Column`, so modifiers chain off the call.
//! Mistakes such as a repeated column name, an unknown referential action
//! or an alter-only call in a create blueprint are remembered and reported
//! as `Error::Configuration` by [`Anvil::to_operations`].

use forge_core::{Dialect, Error, Result};

use crate::column::{Column, ColumnType};
use crate::ddl;
use crate::foreign_key::ForeignKey;
use crate::operation::{Index, IndexKind, SchemaOperation, TableDefinition};

/// Default `VARCHAR` length.
pub const DEFAULT_STRING_LENGTH: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Alter,
}

/// A table blueprint.
#[derive(Debug, Clone)]
pub struct Anvil {
    table: String,
    mode: Mode,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    foreign_keys: Vec<ForeignKey>,
    dropped_columns: Vec<String>,
    renamed_columns: Vec<(String, String)>,
    dropped_indexes: Vec<String>,
    dropped_foreign_keys: Vec<String>,
    dropped_primary: Option<String>,
    engine: Option<String>,
    charset: Option<String>,
    problems: Vec<String>,
}

impl Anvil {
    /// Blueprint for a new table.
    pub fn create(table: impl Into<String>) -> Self {
        Self::with_mode(table.into(), Mode::Create)
    }

    /// Blueprint altering an existing table.
    pub fn alter(table: impl Into<String>) -> Self {
        Self::with_mode(table.into(), Mode::Alter)
    }

    fn with_mode(table: String, mode: Mode) -> Self {
        Self {
            table,
            mode,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            dropped_columns: Vec::new(),
            renamed_columns: Vec::new(),
            dropped_indexes: Vec::new(),
            dropped_foreign_keys: Vec::new(),
            dropped_primary: None,
            engine: None,
            charset: None,
            problems: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether this blueprint alters an existing table.
    pub fn is_alter(&self) -> bool {
        self.mode == Mode::Alter
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// MySQL storage engine (`InnoDB`, ...). Ignored elsewhere.
    pub fn engine(&mut self, engine: &str) -> &mut Self {
        self.engine = Some(engine.to_string());
        self
    }

    /// MySQL default character set. Ignored elsewhere.
    pub fn charset(&mut self, charset: &str) -> &mut Self {
        self.charset = Some(charset.to_string());
        self
    }

    // ==================== Columns ====================

    /// Add a column of any type. Names must be unique within the blueprint.
    pub fn add_column(&mut self, name: &str, column_type: ColumnType) -> &mut Column {
        let column = Column::new(name, column_type);
        if let Some(pos) = self.columns.iter().position(|c| c.name == name) {
            self.problems.push(format!(
                "column `{name}` is declared more than once on `{}`",
                self.table
            ));
            self.columns[pos] = column;
            return &mut self.columns[pos];
        }
        self.columns.push(column);
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing `UNSIGNED BIGINT` primary key named `id`.
    pub fn id(&mut self) -> &mut Column {
        self.big_increments("id")
    }

    /// Auto-incrementing `UNSIGNED INTEGER` primary key.
    pub fn increments(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Integer)
            .unsigned()
            .auto_increment()
    }

    /// Auto-incrementing `UNSIGNED BIGINT` primary key.
    pub fn big_increments(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::BigInteger)
            .unsigned()
            .auto_increment()
    }

    /// `UNSIGNED BIGINT` meant to hold another table's `id`.
    pub fn foreign_id(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::BigInteger).unsigned()
    }

    pub fn tiny_integer(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::TinyInteger)
    }

    pub fn small_integer(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::SmallInteger)
    }

    pub fn integer(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::BigInteger)
    }

    pub fn unsigned_integer(&mut self, name: &str) -> &mut Column {
        self.integer(name).unsigned()
    }

    pub fn unsigned_big_integer(&mut self, name: &str) -> &mut Column {
        self.big_integer(name).unsigned()
    }

    /// `VARCHAR(255)`.
    pub fn string(&mut self, name: &str) -> &mut Column {
        self.string_with_length(name, DEFAULT_STRING_LENGTH)
    }

    pub fn string_with_length(&mut self, name: &str, length: u32) -> &mut Column {
        self.add_column(name, ColumnType::String { length })
    }

    pub fn char(&mut self, name: &str, length: u32) -> &mut Column {
        self.add_column(name, ColumnType::Char { length })
    }

    pub fn text(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Text)
    }

    pub fn medium_text(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::MediumText)
    }

    pub fn long_text(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::LongText)
    }

    pub fn boolean(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Boolean)
    }

    pub fn date(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Date)
    }

    pub fn time(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Time)
    }

    pub fn date_time(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Timestamp)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut Column {
        self.add_column(name, ColumnType::Decimal { precision, scale })
    }

    pub fn float(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Float)
    }

    pub fn double(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Double)
    }

    /// Column restricted to `values`.
    pub fn enumeration(&mut self, name: &str, values: &[&str]) -> &mut Column {
        let values = values.iter().map(|v| (*v).to_string()).collect();
        self.add_column(name, ColumnType::Enum(values))
    }

    /// MySQL `SET`; a plain string column elsewhere.
    pub fn set(&mut self, name: &str, values: &[&str]) -> &mut Column {
        let values = values.iter().map(|v| (*v).to_string()).collect();
        self.add_column(name, ColumnType::Set(values))
    }

    pub fn json(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Json)
    }

    pub fn jsonb(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Jsonb)
    }

    pub fn uuid(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Uuid)
    }

    pub fn binary(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::Binary)
    }

    pub fn ip_address(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::IpAddress)
    }

    pub fn mac_address(&mut self, name: &str) -> &mut Column {
        self.add_column(name, ColumnType::MacAddress)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Same as [`timestamps`](Self::timestamps).
    pub fn nullable_timestamps(&mut self) {
        self.timestamps();
    }

    /// Nullable `deleted_at` timestamp.
    pub fn soft_deletes(&mut self) -> &mut Column {
        self.timestamp("deleted_at").nullable()
    }

    // ==================== Indexes & foreign keys ====================

    fn push_index(&mut self, kind: IndexKind, columns: &[&str]) -> &mut Index {
        self.indexes.push(Index::new(&self.table, kind, columns));
        let last = self.indexes.len() - 1;
        &mut self.indexes[last]
    }

    /// Table-level (possibly composite) primary key.
    pub fn primary(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(IndexKind::Primary, columns)
    }

    pub fn unique(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(IndexKind::Unique, columns)
    }

    pub fn index(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(IndexKind::Index, columns)
    }

    pub fn fulltext(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(IndexKind::Fulltext, columns)
    }

    pub fn spatial_index(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(IndexKind::Spatial, columns)
    }

    /// Foreign key on `column`; finish it with `references(..).on(..)`.
    pub fn foreign(&mut self, column: &str) -> &mut ForeignKey {
        self.foreign_keys.push(ForeignKey::new(column));
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    // ==================== Alter-only operations ====================

    fn require_alter(&mut self, what: &str) {
        if self.mode == Mode::Create {
            self.problems.push(format!(
                "{what} is only valid when altering `{}`",
                self.table
            ));
        }
    }

    pub fn drop_column(&mut self, name: &str) -> &mut Self {
        self.require_alter("drop_column");
        self.dropped_columns.push(name.to_string());
        self
    }

    pub fn drop_columns(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.drop_column(name);
        }
        self
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> &mut Self {
        self.require_alter("rename_column");
        self.renamed_columns.push((from.to_string(), to.to_string()));
        self
    }

    /// Drop an index (plain, unique, fulltext or spatial) by name.
    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.require_alter("drop_index");
        self.dropped_indexes.push(name.to_string());
        self
    }

    pub fn drop_unique(&mut self, name: &str) -> &mut Self {
        self.drop_index(name)
    }

    /// Drop the primary key constraint (`<table>_pkey` on PostgreSQL).
    pub fn drop_primary(&mut self) -> &mut Self {
        self.require_alter("drop_primary");
        self.dropped_primary = Some(format!("{}_pkey", self.table));
        self
    }

    /// Drop a foreign key constraint by name.
    pub fn drop_foreign(&mut self, name: &str) -> &mut Self {
        self.require_alter("drop_foreign");
        self.dropped_foreign_keys.push(name.to_string());
        self
    }

    pub fn drop_timestamps(&mut self) -> &mut Self {
        self.drop_columns(&["created_at", "updated_at"])
    }

    pub fn drop_soft_deletes(&mut self) -> &mut Self {
        self.drop_column("deleted_at")
    }

    // ==================== Compilation ====================

    fn validate(&self) -> Result<()> {
        let mut problems = self.problems.clone();
        for column in &self.columns {
            if let Some(fk) = &column.foreign {
                problems.extend(fk.problems());
            }
            if column.change && self.mode == Mode::Create {
                problems.push(format!(
                    "change() on `{}` is only valid when altering `{}`",
                    column.name, self.table
                ));
            }
            if column.auto_increment && !column.column_type.is_integer() {
                problems.push(format!(
                    "auto-increment column `{}` must be an integer",
                    column.name
                ));
            }
        }
        for fk in &self.foreign_keys {
            problems.extend(fk.problems());
        }
        if self.indexes.iter().filter(|i| i.kind == IndexKind::Primary).count() > 1 {
            problems.push(format!("`{}` declares more than one primary key", self.table));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "invalid blueprint for `{}`: {}",
                self.table,
                problems.join("; ")
            )))
        }
    }

    fn column_indexes(&self, columns: &[&Column]) -> Vec<Index> {
        let mut indexes = Vec::new();
        for column in columns {
            if column.unique {
                indexes.push(Index::new(&self.table, IndexKind::Unique, &[column.name.as_str()]));
            }
            if column.index {
                indexes.push(Index::new(&self.table, IndexKind::Index, &[column.name.as_str()]));
            }
        }
        indexes
    }

    fn all_foreign_keys(&self) -> Vec<ForeignKey> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign.clone())
            .chain(self.foreign_keys.iter().cloned())
            .collect()
    }

    /// Compile to dialect-independent operations.
    pub fn to_operations(&self) -> Result<Vec<SchemaOperation>> {
        self.validate()?;
        match self.mode {
            Mode::Create => self.create_operations().map(|def| vec![SchemaOperation::CreateTable(def)]),
            Mode::Alter => Ok(self.alter_operations()),
        }
    }

    fn create_operations(&self) -> Result<TableDefinition> {
        let mut columns = self.columns.clone();
        let explicit_primary = self
            .indexes
            .iter()
            .find(|i| i.kind == IndexKind::Primary)
            .cloned();
        let flagged: Vec<String> = columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.clone())
            .collect();

        let primary_key = match explicit_primary {
            Some(index) if !flagged.is_empty() => {
                return Err(Error::configuration(format!(
                    "`{}` declares primary key ({}) and primary column(s) {}",
                    self.table,
                    index.columns.join(", "),
                    flagged.join(", ")
                )));
            }
            Some(index) => Some(index),
            None if flagged.len() > 1 => {
                if columns.iter().any(|c| c.auto_increment) {
                    return Err(Error::configuration(format!(
                        "`{}` combines an auto-increment column with a composite primary key",
                        self.table
                    )));
                }
                for column in &mut columns {
                    column.primary = false;
                }
                let names: Vec<&str> = flagged.iter().map(String::as_str).collect();
                Some(Index::new(&self.table, IndexKind::Primary, &names))
            }
            None => None,
        };

        let refs: Vec<&Column> = self.columns.iter().collect();
        let mut indexes = self.column_indexes(&refs);
        indexes.extend(
            self.indexes
                .iter()
                .filter(|i| i.kind != IndexKind::Primary)
                .cloned(),
        );

        Ok(TableDefinition {
            name: self.table.clone(),
            columns,
            primary_key,
            indexes,
            foreign_keys: self.all_foreign_keys(),
            engine: self.engine.clone(),
            charset: self.charset.clone(),
        })
    }

    /// drop FKs, drop indexes, drop columns, rename, modify, add columns,
    /// add indexes, add FKs.
    fn alter_operations(&self) -> Vec<SchemaOperation> {
        let table = || self.table.clone();
        let mut ops = Vec::new();

        ops.extend(self.dropped_foreign_keys.iter().map(|name| SchemaOperation::DropForeignKey {
            table: table(),
            name: name.clone(),
        }));
        if let Some(name) = &self.dropped_primary {
            ops.push(SchemaOperation::DropPrimaryKey {
                table: table(),
                name: name.clone(),
            });
        }
        ops.extend(self.dropped_indexes.iter().map(|name| SchemaOperation::DropIndex {
            table: table(),
            name: name.clone(),
        }));
        ops.extend(self.dropped_columns.iter().map(|column| SchemaOperation::DropColumn {
            table: table(),
            column: column.clone(),
        }));
        ops.extend(self.renamed_columns.iter().map(|(from, to)| SchemaOperation::RenameColumn {
            table: table(),
            from: from.clone(),
            to: to.clone(),
        }));
        ops.extend(
            self.columns
                .iter()
                .filter(|c| c.change)
                .map(|column| SchemaOperation::ModifyColumn {
                    table: table(),
                    column: column.clone(),
                }),
        );
        ops.extend(
            self.columns
                .iter()
                .filter(|c| !c.change)
                .map(|column| SchemaOperation::AddColumn {
                    table: table(),
                    column: column.clone(),
                }),
        );

        let refs: Vec<&Column> = self.columns.iter().collect();
        let indexes = self
            .column_indexes(&refs)
            .into_iter()
            .chain(self.indexes.iter().cloned());
        ops.extend(indexes.map(|index| SchemaOperation::CreateIndex {
            table: table(),
            index,
        }));
        ops.extend(
            self.all_foreign_keys()
                .into_iter()
                .map(|foreign_key| SchemaOperation::AddForeignKey {
                    table: table(),
                    foreign_key,
                }),
        );
        ops
    }

    /// Compile straight to SQL for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> Result<Vec<String>> {
        let ops = self.to_operations()?;
        ddl::generator_for(dialect).generate_all(&ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_is_preserved() {
        let mut t = Anvil::create("users");
        t.id();
        t.string("name");
        t.timestamps();
        let names: Vec<&str> = t.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "created_at", "updated_at"]);
        assert!(t.columns()[0].auto_increment && t.columns()[0].unsigned);
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let mut t = Anvil::create("users");
        t.string("email");
        t.string("email").nullable();
        assert_eq!(t.columns().len(), 1);
        let err = t.to_operations().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("more than once")));
    }

    #[test]
    fn test_invalid_action_is_rejected_before_sql() {
        let mut t = Anvil::create("posts");
        t.foreign_id("user_id").constrained().on_delete("explode");
        assert!(matches!(t.to_sql(Dialect::Mysql), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_alter_only_calls_rejected_on_create() {
        let mut t = Anvil::create("users");
        t.id();
        t.drop_column("legacy");
        assert!(t.to_operations().is_err());

        let mut t = Anvil::create("users");
        t.string("name").change();
        assert!(t.to_operations().is_err());
    }

    #[test]
    fn test_create_collects_indexes_and_keys() {
        let mut t = Anvil::create("posts");
        t.id();
        t.foreign_id("user_id").constrained();
        t.string("slug").unique();
        t.index(&["user_id", "slug"]).name("posts_lookup");
        let ops = t.to_operations().unwrap();
        assert_eq!(ops.len(), 1);
        let SchemaOperation::CreateTable(def) = &ops[0] else {
            panic!("expected CreateTable");
        };
        assert!(def.primary_key.is_none());
        let names: Vec<&str> = def.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["posts_slug_unique", "posts_lookup"]);
        assert_eq!(def.foreign_keys.len(), 1);
        assert_eq!(def.foreign_keys[0].on, "users");
    }

    #[test]
    fn test_composite_primary_from_flags() {
        let mut t = Anvil::create("role_user");
        t.foreign_id("user_id").primary();
        t.foreign_id("role_id").primary();
        let ops = t.to_operations().unwrap();
        let SchemaOperation::CreateTable(def) = &ops[0] else {
            panic!("expected CreateTable");
        };
        let primary = def.primary_key.as_ref().unwrap();
        assert_eq!(primary.columns, vec!["user_id", "role_id"]);
        assert!(def.columns.iter().all(|c| !c.primary));
    }

    #[test]
    fn test_conflicting_primary_keys() {
        let mut t = Anvil::create("users");
        t.id();
        t.primary(&["email"]);
        assert!(t.to_operations().is_err());
    }

    #[test]
    fn test_alter_operation_order() {
        let mut t = Anvil::alter("users");
        t.string("nickname").nullable().unique();
        t.foreign_id("team_id").constrained();
        t.string("name").nullable().change();
        t.rename_column("mail", "email");
        t.drop_column("legacy");
        t.drop_index("users_old_index");
        t.drop_foreign("users_org_id_foreign");

        let kinds: Vec<&str> = t
            .to_operations()
            .unwrap()
            .iter()
            .map(|op| match op {
                SchemaOperation::DropForeignKey { .. } => "drop_fk",
                SchemaOperation::DropIndex { .. } => "drop_index",
                SchemaOperation::DropColumn { .. } => "drop_column",
                SchemaOperation::RenameColumn { .. } => "rename",
                SchemaOperation::ModifyColumn { .. } => "modify",
                SchemaOperation::AddColumn { .. } => "add",
                SchemaOperation::CreateIndex { .. } => "index",
                SchemaOperation::AddForeignKey { .. } => "fk",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["drop_fk", "drop_index", "drop_column", "rename", "modify", "add", "add", "index", "fk"]
        );
    }
}
