//! Structured input documents (metadata, corpus) and their on-disk formats.

use std::path::Path;

use serde::de::DeserializeOwned;

/// Encoding of an input document, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Toml,
    /// SQL DDL, only meaningful for schema metadata
    Sql
}

impl DocumentFormat {
    /// Detect format from extension; unknown extensions are treated as YAML,
    /// which also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            Some("sql") | Some("ddl") => Self::Sql,
            _ => Self::Yaml
        }
    }
}

/// Decode a structured document; the error string carries the decoder's
/// position information when available.
pub fn decode<T: DeserializeOwned>(content: &str, format: DocumentFormat) -> Result<T, String> {
    match format {
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        DocumentFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        DocumentFormat::Yaml | DocumentFormat::Sql => {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(DocumentFormat::from_path(Path::new("a.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("a.TOML")), DocumentFormat::Toml);
        assert_eq!(DocumentFormat::from_path(Path::new("schema.sql")), DocumentFormat::Sql);
        assert_eq!(DocumentFormat::from_path(Path::new("corpus.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), DocumentFormat::Yaml);
    }

    #[test]
    fn test_decode_formats() {
        let json: BTreeMap<String, u32> = decode(r#"{"a": 1}"#, DocumentFormat::Json).unwrap();
        let yaml: BTreeMap<String, u32> = decode("a: 1\n", DocumentFormat::Yaml).unwrap();
        let toml: BTreeMap<String, u32> = decode("a = 1\n", DocumentFormat::Toml).unwrap();
        assert_eq!(json, yaml);
        assert_eq!(yaml, toml);
    }

    #[test]
    fn test_decode_error_is_reported() {
        let result: Result<BTreeMap<String, u32>, _> = decode("{", DocumentFormat::Json);
        assert!(result.is_err());
    }
}
