//! Dialect-independent schema operations.
//!
//! A blueprint compiles to an ordered list of [`SchemaOperation`]s; a
//! [`DdlGenerator`](crate::ddl::DdlGenerator) renders each one for a dialect.

use crate::column::Column;
use crate::foreign_key::ForeignKey;

/// Index flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
    Fulltext,
    Spatial,
}

impl IndexKind {
    /// Suffix used for generated index names.
    pub const fn suffix(self) -> &'static str {
        match self {
            IndexKind::Primary => "primary",
            IndexKind::Unique => "unique",
            IndexKind::Index => "index",
            IndexKind::Fulltext => "fulltext",
            IndexKind::Spatial => "spatialindex",
        }
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub kind: IndexKind,
    pub name: String,
    pub columns: Vec<String>,
}

impl Index {
    /// Index named `<table>_<col1>_<col2>_<suffix>`.
    pub fn new(table: &str, kind: IndexKind, columns: &[&str]) -> Self {
        let name = format!("{table}_{}_{}", columns.join("_"), kind.suffix())
            .replace(['-', '.'], "_")
            .to_lowercase();
        Self {
            kind,
            name,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Rename the index.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }
}

/// Everything `CREATE TABLE` needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<Column>,
    /// Table-level primary key (composite, or declared with `primary(&[..])`).
    pub primary_key: Option<Index>,
    /// Secondary indexes, created after the table.
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    /// MySQL storage engine.
    pub engine: Option<String>,
    /// MySQL default character set.
    pub charset: Option<String>,
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOperation {
    CreateTable(TableDefinition),
    DropTable { table: String, if_exists: bool },
    RenameTable { from: String, to: String },
    AddColumn { table: String, column: Column },
    ModifyColumn { table: String, column: Column },
    DropColumn { table: String, column: String },
    RenameColumn { table: String, from: String, to: String },
    CreateIndex { table: String, index: Index },
    DropIndex { table: String, name: String },
    DropPrimaryKey { table: String, name: String },
    AddForeignKey { table: String, foreign_key: ForeignKey },
    DropForeignKey { table: String, name: String },
}

impl SchemaOperation {
    /// Table the operation applies to.
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::CreateTable(def) => &def.name,
            SchemaOperation::RenameTable { from, .. } => from,
            SchemaOperation::DropTable { table, .. }
            | SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::ModifyColumn { table, .. }
            | SchemaOperation::DropColumn { table, .. }
            | SchemaOperation::RenameColumn { table, .. }
            | SchemaOperation::CreateIndex { table, .. }
            | SchemaOperation::DropIndex { table, .. }
            | SchemaOperation::DropPrimaryKey { table, .. }
            | SchemaOperation::AddForeignKey { table, .. }
            | SchemaOperation::DropForeignKey { table, .. } => table,
        }
    }
}
