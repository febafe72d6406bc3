//! SQLite DDL generator.
//!
//! SQLite cannot add or drop constraints on an existing table, so foreign
//! keys are written inline in `CREATE TABLE`. Operations that would need a
//! table rebuild (adding/dropping foreign keys or the primary key, changing a
//! column) are reported as unsupported instead of being skipped.

use forge_core::{Dialect, Error, Result};

use super::{
    DdlGenerator, column_list, column_type_sql, create_index_sql, default_sql, drop_column_sql,
    drop_table_sql, foreign_key_clause, primary_key_clause, rename_column_sql,
};
use crate::column::Column;
use crate::operation::{Index, IndexKind, SchemaOperation, TableDefinition};

const D: Dialect = Dialect::Sqlite;

/// DDL generator for SQLite.
pub struct SqliteDdlGenerator;

impl SqliteDdlGenerator {
    fn column_sql(column: &Column, inline_primary: bool) -> String {
        let mut sql = format!("{} {}", D.quote_identifier(&column.name), column_type_sql(D, column));
        if inline_primary && column.primary {
            sql.push_str(" PRIMARY KEY");
            if column.auto_increment {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql(D, default));
        }
        if column.comment.is_some() {
            tracing::debug!(column = %column.name, "sqlite has no column comments; comment not stored");
        }
        sql
    }

    fn create_table(def: &TableDefinition) -> Result<Vec<String>> {
        let mut parts: Vec<String> = def
            .columns
            .iter()
            .map(|c| Self::column_sql(c, def.primary_key.is_none()))
            .collect();
        if let Some(primary) = &def.primary_key {
            parts.push(primary_key_clause(D, primary));
        }
        for fk in &def.foreign_keys {
            parts.push(format!(
                "CONSTRAINT {} {}",
                D.quote_identifier(&fk.constraint_name(&def.name)),
                foreign_key_clause(D, fk)
            ));
        }

        let mut stmts = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            D.quote_identifier(&def.name),
            parts.join(", ")
        )];
        for index in &def.indexes {
            stmts.push(Self::create_index(&def.name, index)?);
        }
        Ok(stmts)
    }

    fn create_index(table: &str, index: &Index) -> Result<String> {
        match index.kind {
            IndexKind::Index => Ok(create_index_sql(D, table, index, false)),
            IndexKind::Unique => Ok(create_index_sql(D, table, index, true)),
            IndexKind::Primary => Err(Error::unsupported(
                "sqlite",
                format!("adding primary key ({}) to existing table `{table}`", column_list(D, &index.columns)),
            )),
            IndexKind::Fulltext => Err(Error::unsupported("sqlite", "fulltext indexes")),
            IndexKind::Spatial => Err(Error::unsupported("sqlite", "spatial indexes")),
        }
    }
}

impl DdlGenerator for SqliteDdlGenerator {
    fn dialect(&self) -> Dialect {
        D
    }

    fn generate(&self, op: &SchemaOperation) -> Result<Vec<String>> {
        tracing::debug!(dialect = "sqlite", op = ?op, "Generating DDL");

        let statements = match op {
            SchemaOperation::CreateTable(def) => Self::create_table(def)?,
            SchemaOperation::DropTable { table, if_exists } => {
                vec![drop_table_sql(D, table, *if_exists)]
            }
            SchemaOperation::RenameTable { from, to } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                D.quote_identifier(from),
                D.quote_identifier(to)
            )],
            SchemaOperation::AddColumn { table, column } => {
                if column.primary {
                    return Err(Error::unsupported(
                        "sqlite",
                        format!("adding primary key column `{}` to `{table}`", column.name),
                    ));
                }
                vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    D.quote_identifier(table),
                    Self::column_sql(column, false)
                )]
            }
            SchemaOperation::ModifyColumn { table, column } => {
                return Err(Error::unsupported(
                    "sqlite",
                    format!("modifying column `{}` on `{table}`", column.name),
                ));
            }
            SchemaOperation::DropColumn { table, column } => {
                vec![drop_column_sql(D, table, column)]
            }
            SchemaOperation::RenameColumn { table, from, to } => {
                vec![rename_column_sql(D, table, from, to)]
            }
            SchemaOperation::CreateIndex { table, index } => vec![Self::create_index(table, index)?],
            SchemaOperation::DropIndex { name, .. } => {
                vec![format!("DROP INDEX IF EXISTS {}", D.quote_identifier(name))]
            }
            SchemaOperation::DropPrimaryKey { table, .. } => {
                return Err(Error::unsupported(
                    "sqlite",
                    format!("dropping the primary key of `{table}`"),
                ));
            }
            SchemaOperation::AddForeignKey { table, foreign_key } => {
                return Err(Error::unsupported(
                    "sqlite",
                    format!(
                        "adding foreign key `{}` to existing table `{table}`",
                        foreign_key.constraint_name(table)
                    ),
                ));
            }
            SchemaOperation::DropForeignKey { table, name } => {
                return Err(Error::unsupported(
                    "sqlite",
                    format!("dropping foreign key `{name}` from `{table}`"),
                ));
            }
        };

        for stmt in &statements {
            tracing::trace!(sql = %stmt, "Generated SQLite DDL statement");
        }

        Ok(statements)
    }
}
