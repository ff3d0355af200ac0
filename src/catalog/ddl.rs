//! SQL DDL metadata source (`CREATE TABLE`, `CREATE INDEX`).
//!
//! Only names, types and index membership are read. Constraint and index
//! column lists are taken from the rendered statement so the loader stays
//! independent of the exact AST shape of each `sqlparser` release.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::{ast::Statement, dialect::GenericDialect, parser::Parser};
use tracing::debug;

use super::{
    records::{ColumnRecord, IndexRecord, MetadataDocument, TableRecord},
    types::ValueType
};
use crate::error::{AppResult, metadata_parse_error};

/// Table-level key constraint: `[CONSTRAINT name] PRIMARY KEY (a, b)`,
/// `UNIQUE [KEY|INDEX] [name] (a)`, `KEY name (a)`, `INDEX name (a)`.
static KEY_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:CONSTRAINT\s+([`"\w]+)\s+)?(PRIMARY\s+KEY|UNIQUE(?:\s+(?:KEY|INDEX))?|KEY|INDEX)\s*([`"\w]+)?\s*\(([^)]*)\)"#
    )
    .expect("valid regex")
});

pub(super) fn parse_ddl(sql: &str) -> AppResult<MetadataDocument> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| metadata_parse_error(e.to_string()))?;
    let mut document = MetadataDocument::default();
    for stmt in statements {
        process_statement(stmt, &mut document);
    }
    Ok(document)
}

fn process_statement(stmt: Statement, document: &mut MetadataDocument) {
    match stmt {
        Statement::CreateTable(create) => {
            let table_name = unquote(&create.name.to_string());
            let mut record = TableRecord::new(table_name.clone());
            for column in &create.columns {
                let name = unquote(&column.name.to_string());
                let data_type = column.data_type.to_string();
                let value_type = ValueType::from_sql_type(&data_type).unwrap_or_else(|| {
                    debug!(table = %table_name, column = %name, %data_type, "unclassified column type, treating as string");
                    ValueType::String
                });
                for option in &column.options {
                    let rendered = option.option.to_string().to_ascii_uppercase();
                    if rendered.starts_with("PRIMARY KEY") || rendered.starts_with("UNIQUE") {
                        record.indexes.push(IndexRecord {
                            name:    Some(format!("{}_{}_key", table_name, name)),
                            columns: vec![name.clone()],
                            unique:  true
                        });
                    }
                }
                record.columns.push(ColumnRecord {
                    name,
                    value_type,
                    enum_repr: None
                });
            }
            for constraint in &create.constraints {
                if let Some(index) = key_constraint(&table_name, &constraint.to_string()) {
                    record.indexes.push(index);
                }
            }
            document.tables.push(record);
        }
        Statement::CreateIndex(create_index) => {
            let table_name = unquote(&create_index.table_name.to_string());
            let columns = create_index
                .columns
                .iter()
                .map(|c| index_column_name(&c.to_string()))
                .collect::<Vec<_>>();
            let mut record = TableRecord::new(table_name);
            record.indexes.push(IndexRecord {
                name: create_index.name.map(|n| unquote(&n.to_string())),
                columns,
                unique: create_index.unique
            });
            document.tables.push(record);
        }
        _ => {}
    }
}

fn key_constraint(table: &str, rendered: &str) -> Option<IndexRecord> {
    let caps = KEY_CONSTRAINT.captures(rendered)?;
    let kind = caps.get(2)?.as_str().to_ascii_uppercase();
    let columns = caps
        .get(4)?
        .as_str()
        .split(',')
        .map(index_column_name)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>();
    if columns.is_empty() {
        return None;
    }
    let name = caps
        .get(1)
        .or_else(|| caps.get(3))
        .map(|m| unquote(m.as_str()))
        .unwrap_or_else(|| format!("{}_{}_key", table, columns.join("_")));
    Some(IndexRecord {
        name: Some(name),
        columns,
        unique: kind.starts_with("PRIMARY") || kind.starts_with("UNIQUE")
    })
}

/// `"col" DESC` -> `col`
fn index_column_name(rendered: &str) -> String {
    unquote(rendered.split_whitespace().next().unwrap_or_default())
}

fn unquote(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_with_primary_key() {
        let doc = parse_ddl("CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(255))").unwrap();
        assert_eq!(doc.tables.len(), 1);
        let users = &doc.tables[0];
        assert_eq!(users.columns.len(), 2);
        assert_eq!(users.columns[0].value_type, ValueType::Numeric);
        assert_eq!(users.columns[1].value_type, ValueType::String);
        assert_eq!(users.indexes.len(), 1);
        assert_eq!(users.indexes[0].columns, vec!["id".to_string()]);
        assert!(users.indexes[0].unique);
    }

    #[test]
    fn test_parse_create_index() {
        let doc = parse_ddl(
            "CREATE TABLE orders (id INT, user_id INT, created_at TIMESTAMP);
             CREATE INDEX idx_user_created ON orders(user_id, created_at);"
        )
        .unwrap();
        assert_eq!(doc.tables.len(), 2);
        let index = &doc.tables[1].indexes[0];
        assert_eq!(doc.tables[1].name, "orders");
        assert_eq!(index.name.as_deref(), Some("idx_user_created"));
        assert_eq!(index.columns, vec!["user_id".to_string(), "created_at".to_string()]);
        assert!(!index.unique);
    }

    #[test]
    fn test_key_constraint_rendering() {
        let index = key_constraint("t", "PRIMARY KEY (a, b)").unwrap();
        assert_eq!(index.columns, vec!["a".to_string(), "b".to_string()]);
        assert!(index.unique);
        assert_eq!(index.name.as_deref(), Some("t_a_b_key"));

        let named = key_constraint("t", "CONSTRAINT uq_code UNIQUE (code)").unwrap();
        assert_eq!(named.name.as_deref(), Some("uq_code"));
        assert!(key_constraint("t", "CHECK (a > 0)").is_none());
    }

    #[test]
    fn test_invalid_ddl_is_an_error() {
        assert!(parse_ddl("CREATE TABLE (").is_err());
    }

    #[test]
    fn test_index_column_name_strips_order() {
        assert_eq!(index_column_name("\"created_at\" DESC"), "created_at");
    }
}
