//! MySQL DDL generator.

use forge_core::{Dialect, Result};

use super::{
    DdlGenerator, add_foreign_key_sql, column_list, column_type_sql, create_index_sql,
    default_sql, drop_column_sql, drop_table_sql, primary_key_clause, rename_column_sql,
};
use crate::column::Column;
use crate::operation::{Index, IndexKind, SchemaOperation, TableDefinition};

const D: Dialect = Dialect::Mysql;

/// DDL generator for MySQL / MariaDB.
pub struct MySqlDdlGenerator;

impl MySqlDdlGenerator {
    fn column_sql(column: &Column, inline_primary: bool) -> String {
        let mut sql = format!("{} {}", D.quote_identifier(&column.name), column_type_sql(D, column));
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql(D, default));
        }
        if column.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        if inline_primary && column.primary {
            sql.push_str(" PRIMARY KEY");
        }
        if let Some(comment) = &column.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&D.quote_string(comment));
        }
        sql
    }

    fn create_table(def: &TableDefinition) -> Vec<String> {
        let mut parts: Vec<String> = def
            .columns
            .iter()
            .map(|c| Self::column_sql(c, def.primary_key.is_none()))
            .collect();
        if let Some(primary) = &def.primary_key {
            parts.push(primary_key_clause(D, primary));
        }

        let mut create = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            D.quote_identifier(&def.name),
            parts.join(", ")
        );
        if let Some(engine) = &def.engine {
            create.push_str(&format!(" ENGINE = {engine}"));
        }
        if let Some(charset) = &def.charset {
            create.push_str(&format!(" DEFAULT CHARACTER SET {charset}"));
        }

        let mut stmts = vec![create];
        stmts.extend(def.indexes.iter().map(|index| Self::create_index(&def.name, index)));
        stmts.extend(
            def.foreign_keys
                .iter()
                .map(|fk| add_foreign_key_sql(D, &def.name, fk)),
        );
        stmts
    }

    fn create_index(table: &str, index: &Index) -> String {
        match index.kind {
            IndexKind::Primary => format!(
                "ALTER TABLE {} ADD {}",
                D.quote_identifier(table),
                primary_key_clause(D, index)
            ),
            IndexKind::Unique => create_index_sql(D, table, index, true),
            IndexKind::Index => create_index_sql(D, table, index, false),
            IndexKind::Fulltext | IndexKind::Spatial => format!(
                "CREATE {} INDEX {} ON {} ({})",
                if index.kind == IndexKind::Fulltext { "FULLTEXT" } else { "SPATIAL" },
                D.quote_identifier(&index.name),
                D.quote_identifier(table),
                column_list(D, &index.columns)
            ),
        }
    }
}

impl DdlGenerator for MySqlDdlGenerator {
    fn dialect(&self) -> Dialect {
        D
    }

    fn generate(&self, op: &SchemaOperation) -> Result<Vec<String>> {
        tracing::debug!(dialect = "mysql", op = ?op, "Generating DDL");

        let table_of = |table: &str| D.quote_identifier(table);
        let statements = match op {
            SchemaOperation::CreateTable(def) => Self::create_table(def),
            SchemaOperation::DropTable { table, if_exists } => {
                vec![drop_table_sql(D, table, *if_exists)]
            }
            SchemaOperation::RenameTable { from, to } => {
                vec![format!("RENAME TABLE {} TO {}", table_of(from), table_of(to))]
            }
            SchemaOperation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table_of(table),
                Self::column_sql(column, true)
            )],
            SchemaOperation::ModifyColumn { table, column } => vec![format!(
                "ALTER TABLE {} MODIFY {}",
                table_of(table),
                Self::column_sql(column, false)
            )],
            SchemaOperation::DropColumn { table, column } => {
                vec![drop_column_sql(D, table, column)]
            }
            SchemaOperation::RenameColumn { table, from, to } => {
                vec![rename_column_sql(D, table, from, to)]
            }
            SchemaOperation::CreateIndex { table, index } => vec![Self::create_index(table, index)],
            SchemaOperation::DropIndex { table, name } => vec![format!(
                "DROP INDEX {} ON {}",
                D.quote_identifier(name),
                table_of(table)
            )],
            SchemaOperation::DropPrimaryKey { table, .. } => {
                vec![format!("ALTER TABLE {} DROP PRIMARY KEY", table_of(table))]
            }
            SchemaOperation::AddForeignKey { table, foreign_key } => {
                vec![add_foreign_key_sql(D, table, foreign_key)]
            }
            SchemaOperation::DropForeignKey { table, name } => vec![format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                table_of(table),
                D.quote_identifier(name)
            )],
        };

        for stmt in &statements {
            tracing::trace!(sql = %stmt, "Generated MySQL DDL statement");
        }

        Ok(statements)
    }
}
