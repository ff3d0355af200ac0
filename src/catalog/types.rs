use std::{collections::BTreeSet, fmt, str::FromStr, sync::LazyLock};

use compact_str::CompactString;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMERIC_SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:TINY|SMALL|MEDIUM|BIG)?INT(?:EGER)?\d*|NUMERIC|DECIMAL|NUMBER|REAL|FLOAT\d*|DOUBLE(?:\s+PRECISION)?|(?:BIG|SMALL)?SERIAL|MONEY|UNSIGNED)\b"
    )
    .expect("valid regex")
});

static STRING_SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:N?VARCHAR2?|N?CHAR(?:ACTER)?(?:\s+VARYING)?|(?:TINY|MEDIUM|LONG)?TEXT|N?CLOB|STRING|UUID|CITEXT)\b"
    )
    .expect("valid regex")
});

static BOOLEAN_SQL_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:BOOL(?:EAN)?|BIT)\b").expect("valid regex"));

static DATE_SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:DATE(?:TIME\d*)?|TIMESTAMP(?:TZ)?|TIME(?:TZ)?|INTERVAL)\b")
        .expect("valid regex")
});

static ENUM_SQL_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*ENUM\b").expect("valid regex"));

/// Declared type of a column or a bound parameter value.
///
/// Enumerations are compared through their underlying representation, see
/// [`SchemaColumn::effective_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Numeric,
    String,
    Boolean,
    Date,
    Enum
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Enum => "enum"
        }
    }

    /// Classify a SQL column type such as `VARCHAR(255)` or `BIGINT`.
    pub fn from_sql_type(data_type: &str) -> Option<Self> {
        if ENUM_SQL_TYPE.is_match(data_type) {
            Some(Self::Enum)
        } else if BOOLEAN_SQL_TYPE.is_match(data_type) {
            Some(Self::Boolean)
        } else if DATE_SQL_TYPE.is_match(data_type) {
            Some(Self::Date)
        } else if NUMERIC_SQL_TYPE.is_match(data_type) {
            Some(Self::Numeric)
        } else if STRING_SQL_TYPE.is_match(data_type) {
            Some(Self::String)
        } else {
            None
        }
    }

    /// Classify a JVM type name (`java.lang.Integer`, `long`, `Date`).
    pub fn from_jvm_type(type_name: &str) -> Option<Self> {
        let simple = type_name
            .trim()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match simple.as_str() {
            "int" | "integer" | "long" | "short" | "byte" | "double" | "float" | "bigdecimal"
            | "biginteger" | "number" | "pk" => Some(Self::Numeric),
            "string" | "char" | "character" | "charsequence" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "date" | "localdate" | "localdatetime" | "instant" | "zoneddatetime"
            | "offsetdatetime" | "timestamp" => Some(Self::Date),
            _ => None
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "NUMERIC"),
            Self::String => write!(f, "STRING"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Enum => write!(f, "ENUM")
        }
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" => Ok(Self::Numeric),
            "string" => Ok(Self::String),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "enum" | "enumeration" => Ok(Self::Enum),
            _ => Self::from_jvm_type(s)
                .or_else(|| Self::from_sql_type(s))
                .ok_or_else(|| format!("unknown value type '{}'", s))
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.as_str().to_string()
    }
}

/// Column metadata after catalog indexing. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaColumn {
    /// Declared table name (original casing)
    pub table:         CompactString,
    /// Declared column name (original casing)
    pub column:        CompactString,
    pub declared_type: ValueType,
    /// Underlying representation of an enum column (string codes by default)
    pub enum_repr:     Option<ValueType>,
    /// Whether any index leads with, or consists solely of, this column
    pub indexed:       bool,
    /// Names of every index containing this column
    pub index_names:   BTreeSet<CompactString>,
    /// Names of multi-column indexes containing this column
    pub composites:    BTreeSet<CompactString>
}

impl SchemaColumn {
    /// Type used for compatibility checks; enums collapse to their
    /// representation.
    pub fn effective_type(&self) -> ValueType {
        match self.declared_type {
            ValueType::Enum => self.enum_repr.unwrap_or(ValueType::String),
            other => other
        }
    }
}

/// Index declaration attached to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub name:    CompactString,
    pub table:   CompactString,
    /// Ordered index columns (original casing)
    pub columns: Vec<CompactString>,
    pub unique:  bool
}

impl IndexDef {
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    /// Number of leading index columns contained in `filtered`
    /// (case-insensitive).
    pub fn prefix_len(&self, filtered: &[CompactString]) -> usize {
        self.columns
            .iter()
            .take_while(|c| filtered.iter().any(|f| f.eq_ignore_ascii_case(c)))
            .count()
    }
}

/// Result of a catalog lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLookup<'a> {
    Found(&'a SchemaColumn),
    /// Table outside the supplied metadata (platform built-in or external)
    UnknownTable,
    /// Table is known but does not declare the column
    UnknownColumn
}

impl<'a> ColumnLookup<'a> {
    pub fn found(self) -> Option<&'a SchemaColumn> {
        match self {
            Self::Found(column) => Some(column),
            _ => None
        }
    }
}
