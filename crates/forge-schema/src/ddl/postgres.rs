//! PostgreSQL DDL generator.
//!
//! Column comments are separate `COMMENT ON COLUMN` statements, and changing
//! a column is split into `ALTER COLUMN ... TYPE / SET NOT NULL / DEFAULT`
//! clauses of a single `ALTER TABLE`.

use forge_core::{Dialect, Result};

use super::{
    DdlGenerator, add_foreign_key_sql, column_list, column_type_sql, create_index_sql,
    default_sql, drop_column_sql, drop_table_sql, primary_key_clause, rename_column_sql,
};
use crate::column::Column;
use crate::operation::{Index, IndexKind, SchemaOperation, TableDefinition};

const D: Dialect = Dialect::Postgres;

/// DDL generator for PostgreSQL.
pub struct PostgresDdlGenerator;

impl PostgresDdlGenerator {
    fn column_sql(column: &Column, inline_primary: bool) -> String {
        let mut sql = format!("{} {}", D.quote_identifier(&column.name), column_type_sql(D, column));
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql(D, default));
        }
        if inline_primary && column.primary {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }

    fn comment_sql(table: &str, column: &Column) -> Option<String> {
        column.comment.as_ref().map(|comment| {
            format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                D.quote_identifier(table),
                D.quote_identifier(&column.name),
                D.quote_string(comment)
            )
        })
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

        let mut stmts = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            D.quote_identifier(&def.name),
            parts.join(", ")
        )];
        stmts.extend(def.columns.iter().filter_map(|c| Self::comment_sql(&def.name, c)));
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
            IndexKind::Fulltext => {
                let vectors: Vec<String> = index
                    .columns
                    .iter()
                    .map(|c| format!("to_tsvector('english', {})", D.quote_identifier(c)))
                    .collect();
                format!(
                    "CREATE INDEX {} ON {} USING gin (({}))",
                    D.quote_identifier(&index.name),
                    D.quote_identifier(table),
                    vectors.join(" || ")
                )
            }
            IndexKind::Spatial => format!(
                "CREATE INDEX {} ON {} USING gist ({})",
                D.quote_identifier(&index.name),
                D.quote_identifier(table),
                column_list(D, &index.columns)
            ),
        }
    }

    fn modify_column(table: &str, column: &Column) -> Vec<String> {
        let name = D.quote_identifier(&column.name);
        let mut clauses = vec![format!(
            "ALTER COLUMN {name} TYPE {}",
            column_type_sql(D, column)
        )];
        clauses.push(if column.nullable {
            format!("ALTER COLUMN {name} DROP NOT NULL")
        } else {
            format!("ALTER COLUMN {name} SET NOT NULL")
        });
        clauses.push(match &column.default {
            Some(default) => format!("ALTER COLUMN {name} SET DEFAULT {}", default_sql(D, default)),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        });
        let mut stmts = vec![format!(
            "ALTER TABLE {} {}",
            D.quote_identifier(table),
            clauses.join(", ")
        )];
        stmts.extend(Self::comment_sql(table, column));
        stmts
    }
}

impl DdlGenerator for PostgresDdlGenerator {
    fn dialect(&self) -> Dialect {
        D
    }

    fn generate(&self, op: &SchemaOperation) -> Result<Vec<String>> {
        tracing::debug!(dialect = "pgsql", op = ?op, "Generating DDL");

        let table_of = |table: &str| D.quote_identifier(table);
        let statements = match op {
            SchemaOperation::CreateTable(def) => Self::create_table(def),
            SchemaOperation::DropTable { table, if_exists } => {
                vec![drop_table_sql(D, table, *if_exists)]
            }
            SchemaOperation::RenameTable { from, to } => {
                vec![format!("ALTER TABLE {} RENAME TO {}", table_of(from), table_of(to))]
            }
            SchemaOperation::AddColumn { table, column } => {
                let mut stmts = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table_of(table),
                    Self::column_sql(column, true)
                )];
                stmts.extend(Self::comment_sql(table, column));
                stmts
            }
            SchemaOperation::ModifyColumn { table, column } => Self::modify_column(table, column),
            SchemaOperation::DropColumn { table, column } => {
                vec![drop_column_sql(D, table, column)]
            }
            SchemaOperation::RenameColumn { table, from, to } => {
                vec![rename_column_sql(D, table, from, to)]
            }
            SchemaOperation::CreateIndex { table, index } => vec![Self::create_index(table, index)],
            SchemaOperation::DropIndex { name, .. } => {
                vec![format!("DROP INDEX IF EXISTS {}", D.quote_identifier(name))]
            }
            SchemaOperation::DropPrimaryKey { table, name } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                table_of(table),
                D.quote_identifier(name)
            )],
            SchemaOperation::AddForeignKey { table, foreign_key } => {
                vec![add_foreign_key_sql(D, table, foreign_key)]
            }
            SchemaOperation::DropForeignKey { table, name } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                table_of(table),
                D.quote_identifier(name)
            )],
        };

        for stmt in &statements {
            tracing::trace!(sql = %stmt, "Generated PostgreSQL DDL statement");
        }

        Ok(statements)
    }
}
