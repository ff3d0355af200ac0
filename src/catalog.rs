//! Schema catalog: table → column → {type, index membership}.
//!
//! The catalog is built once per run from a metadata document (JSON, YAML,
//! TOML or SQL DDL) and is read-only afterwards, so it can be shared across
//! analysis workers by reference.
//!
//! # Example
//!
//! ```
//! use query_risk_analyzer::catalog::{ColumnLookup, SchemaCatalog, ValueType};
//!
//! let catalog = SchemaCatalog::parse_ddl(
//!     "CREATE TABLE orders (id INT, code VARCHAR(32));
//!      CREATE INDEX idx_code ON orders(code);"
//! )
//! .unwrap();
//!
//! let code = catalog.column_info("Orders", "CODE").found().unwrap();
//! assert!(code.indexed);
//! assert_eq!(code.declared_type, ValueType::String);
//! assert_eq!(catalog.column_info("Unknown", "x"), ColumnLookup::UnknownTable);
//! ```

mod ddl;
mod records;
mod types;

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path
};

use compact_str::{CompactString, ToCompactString};
pub use records::{ColumnRecord, IndexRecord, MetadataDocument, TableRecord};
use tracing::{debug, warn};
pub use types::{ColumnLookup, IndexDef, SchemaColumn, ValueType};

use crate::{
    document::{DocumentFormat, decode},
    error::{AppResult, file_read_error, metadata_parse_error}
};

/// Column every platform type carries implicitly.
pub const IMPLICIT_PK: &str = "pk";

/// All metadata known for one table.
#[derive(Debug, Clone)]
pub struct TableEntry {
    /// Declared name (original casing)
    pub name:    CompactString,
    /// Columns keyed by lowercase name
    pub columns: BTreeMap<CompactString, SchemaColumn>,
    pub indexes: Vec<IndexDef>
}

/// Read-only index of the supplied metadata.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: BTreeMap<CompactString, TableEntry>
}

impl SchemaCatalog {
    /// Index a decoded metadata document.
    ///
    /// Repeated table records merge; indexes referring to undeclared tables
    /// or columns are skipped with a warning.
    pub fn from_document(document: MetadataDocument) -> Self {
        let mut builder = CatalogBuilder::default();
        for table in &document.tables {
            builder.declare_table(table);
        }
        for table in &document.tables {
            for (position, index) in table.indexes.iter().enumerate() {
                builder.declare_index(&table.name, index, position);
            }
        }
        builder.finish()
    }

    /// Build the catalog from SQL DDL.
    pub fn parse_ddl(sql: &str) -> AppResult<Self> {
        ddl::parse_ddl(sql).map(Self::from_document)
    }

    /// Decode `content` in the given format and index it.
    pub fn parse(content: &str, format: DocumentFormat) -> AppResult<Self> {
        match format {
            DocumentFormat::Sql => Self::parse_ddl(content),
            other => decode::<MetadataDocument>(content, other)
                .map(Self::from_document)
                .map_err(metadata_parse_error)
        }
    }

    /// Case-insensitive column lookup.
    pub fn column_info(&self, table: &str, column: &str) -> ColumnLookup<'_> {
        let Some(entry) = self.table(table) else {
            return ColumnLookup::UnknownTable;
        };
        match entry.columns.get(&lower(column)) {
            Some(col) => ColumnLookup::Found(col),
            None => ColumnLookup::UnknownColumn
        }
    }

    pub fn table(&self, table: &str) -> Option<&TableEntry> {
        self.tables.get(&lower(table))
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.table(table).is_some()
    }

    /// Multi-column indexes declared on `table`.
    pub fn composite_indexes(&self, table: &str) -> impl Iterator<Item = &IndexDef> {
        self.table(table)
            .into_iter()
            .flat_map(|t| t.indexes.iter())
            .filter(|i| i.is_composite())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Compact human-readable listing of tables, columns and indexes.
    pub fn to_summary(&self) -> String {
        let mut out = String::new();
        for table in self.tables.values() {
            out.push_str(&format!("Table: {}\n", table.name));
            out.push_str("  Columns:\n");
            for col in table.columns.values() {
                let mut flags = Vec::new();
                if col.indexed {
                    flags.push("INDEXED".to_string());
                }
                if let Some(repr) = col.enum_repr {
                    flags.push(format!("REPR {}", repr));
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                out.push_str(&format!(
                    "    - {} {}{}\n",
                    col.column, col.declared_type, flags
                ));
            }
            let explicit = table
                .indexes
                .iter()
                .filter(|i| i.name != IMPLICIT_PK)
                .collect::<Vec<_>>();
            if !explicit.is_empty() {
                out.push_str("  Indexes:\n");
                for idx in explicit {
                    let unique = if idx.unique { "UNIQUE " } else { "" };
                    out.push_str(&format!(
                        "    - {}{} ({})\n",
                        unique,
                        idx.name,
                        idx.columns.join(", ")
                    ));
                }
            }
        }
        out
    }
}

/// Read a metadata file, picking the decoder from its extension.
pub fn load_catalog(path: &Path) -> AppResult<SchemaCatalog> {
    let content =
        fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
    let catalog = SchemaCatalog::parse(&content, DocumentFormat::from_path(path))?;
    debug!(path = %path.display(), tables = catalog.table_count(), "schema catalog loaded");
    Ok(catalog)
}

fn lower(name: &str) -> CompactString {
    name.trim().to_ascii_lowercase().to_compact_string()
}

#[derive(Default)]
struct CatalogBuilder {
    tables: BTreeMap<CompactString, TableEntry>
}

impl CatalogBuilder {
    fn declare_table(&mut self, record: &TableRecord) {
        let key = lower(&record.name);
        let entry = self.tables.entry(key).or_insert_with(|| TableEntry {
            name:    record.name.trim().to_compact_string(),
            columns: BTreeMap::new(),
            indexes: Vec::new()
        });
        for column in &record.columns {
            let col_key = lower(&column.name);
            if entry.columns.contains_key(&col_key) {
                debug!(table = %entry.name, column = %column.name, "column redeclared, keeping first declaration");
                continue;
            }
            entry.columns.insert(
                col_key,
                SchemaColumn {
                    table:         entry.name.clone(),
                    column:        column.name.trim().to_compact_string(),
                    declared_type: column.value_type,
                    enum_repr:     column.enum_repr,
                    indexed:       false,
                    index_names:   BTreeSet::new(),
                    composites:    BTreeSet::new()
                }
            );
        }
    }

    fn declare_index(&mut self, table: &str, record: &IndexRecord, position: usize) {
        let Some(entry) = self.tables.get_mut(&lower(table)) else {
            warn!(table, "index declared on unknown table, skipped");
            return;
        };
        if record.columns.is_empty() {
            warn!(table = %entry.name, "index without columns, skipped");
            return;
        }
        if let Some(missing) = record
            .columns
            .iter()
            .find(|c| !entry.columns.contains_key(&lower(c)) && !c.eq_ignore_ascii_case(IMPLICIT_PK))
        {
            warn!(table = %entry.name, column = %missing, "index references undeclared column, skipped");
            return;
        }
        let name = record
            .name
            .as_deref()
            .map(CompactString::from)
            .unwrap_or_else(|| format!("{}_idx{}", entry.name, position).to_compact_string());
        let index = IndexDef {
            name:    name.clone(),
            table:   entry.name.clone(),
            columns: record.columns.iter().map(|c| c.trim().to_compact_string()).collect(),
            unique:  record.unique
        };
        let composite = index.is_composite();
        for (ordinal, column) in index.columns.iter().enumerate() {
            let Some(col) = entry.columns.get_mut(&lower(column)) else {
                continue;
            };
            col.index_names.insert(name.clone());
            if ordinal == 0 {
                col.indexed = true;
            }
            if composite {
                col.composites.insert(name.clone());
            }
        }
        entry.indexes.push(index);
    }

    fn finish(mut self) -> SchemaCatalog {
        for entry in self.tables.values_mut() {
            if entry.columns.contains_key(IMPLICIT_PK) {
                continue;
            }
            let name = CompactString::const_new(IMPLICIT_PK);
            entry.columns.insert(
                name.clone(),
                SchemaColumn {
                    table:         entry.name.clone(),
                    column:        name.clone(),
                    declared_type: ValueType::Numeric,
                    enum_repr:     None,
                    indexed:       true,
                    index_names:   BTreeSet::from([name.clone()]),
                    composites:    BTreeSet::new()
                }
            );
            entry.indexes.push(IndexDef {
                name:    name.clone(),
                table:   entry.name.clone(),
                columns: vec![name],
                unique:  true
            });
        }
        SchemaCatalog {
            tables: self.tables
        }
    }
}
