//! Query definitions and their execution call sites.
//!
//! A [`Corpus`] is either decoded from a JSON/YAML/TOML document or produced
//! by the source scanner in [`crate::scan`].

use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    catalog::ValueType,
    document::{DocumentFormat, decode},
    error::{AppResult, corpus_parse_error, file_read_error},
    query::AliasMap
};

/// One templated query with its declared aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub id:       String,
    pub template: String,
    /// alias → type, as declared next to the template
    #[serde(default, skip_serializing_if = "AliasMap::is_empty")]
    pub aliases:  AliasMap
}

impl QueryDefinition {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id:       id.into(),
            template: template.into(),
            aliases:  AliasMap::new()
        }
    }
}

/// How the caller consumes the result rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerShape {
    /// Rows returned or iterated as-is
    #[default]
    #[serde(alias = "raw-rows")]
    RawRows,
    /// Rows grouped, summed, counted or de-duplicated by the caller
    Aggregated,
    /// At most one row expected
    #[serde(alias = "single-entity")]
    SingleEntity
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationContext {
    Loop,
    #[default]
    Single
}

/// Size facts about a collection-valued parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBinding {
    /// Observed or supplied element count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size:     Option<usize>,
    /// Cap enforced by the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>
}

/// A value bound to a `?name` placeholder with its declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamBinding {
    pub name:       String,
    #[serde(rename = "type", alias = "supplied_type")]
    pub value_type: ValueType,
    /// Present when the parameter carries a collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionBinding>
}

impl ParamBinding {
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            collection: None
        }
    }

    pub fn collection(
        name: impl Into<String>,
        value_type: ValueType,
        binding: CollectionBinding
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            collection: Some(binding)
        }
    }
}

/// Where and how a query is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSite {
    pub query_id:           String,
    /// Method executing the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller:             Option<String>,
    #[serde(default)]
    pub cap_applied:        bool,
    #[serde(default)]
    pub consumer_shape:     ConsumerShape,
    #[serde(default)]
    pub invocation_context: InvocationContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params:             Vec<ParamBinding>
}

impl CallSite {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id:           query_id.into(),
            caller:             None,
            cap_applied:        false,
            consumer_shape:     ConsumerShape::default(),
            invocation_context: InvocationContext::default(),
            params:             Vec::new()
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamBinding> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Query definitions plus call-site records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub queries:    Vec<QueryDefinition>,
    #[serde(default)]
    pub call_sites: Vec<CallSite>
}

impl Corpus {
    /// Decode a corpus document.
    ///
    /// # Errors
    ///
    /// Undecodable content, SQL input or duplicate query ids.
    pub fn parse(content: &str, format: DocumentFormat) -> AppResult<Self> {
        if format == DocumentFormat::Sql {
            return Err(corpus_parse_error(
                "query corpus must be JSON, YAML or TOML"
            ));
        }
        let corpus: Self = decode(content, format).map_err(corpus_parse_error)?;
        corpus.validate()?;
        Ok(corpus)
    }

    /// Append another corpus; call sites for unknown queries are reported.
    pub fn merge(&mut self, other: Corpus) -> AppResult<()> {
        self.queries.extend(other.queries);
        self.call_sites.extend(other.call_sites);
        self.validate()
    }

    pub fn call_sites_for<'a>(&'a self, query_id: &'a str) -> impl Iterator<Item = &'a CallSite> {
        self.call_sites
            .iter()
            .filter(move |c| c.query_id == query_id)
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn validate(&self) -> AppResult<()> {
        let mut ids = BTreeSet::new();
        for query in &self.queries {
            if !ids.insert(query.id.as_str()) {
                return Err(corpus_parse_error(format!(
                    "duplicate query id '{}'",
                    query.id
                )));
            }
        }
        for site in &self.call_sites {
            if !ids.contains(site.query_id.as_str()) {
                warn!(query = %site.query_id, "call site references unknown query");
            }
        }
        Ok(())
    }
}

/// Read and decode a corpus file.
pub fn load_corpus(path: &Path) -> AppResult<Corpus> {
    let content =
        fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
    let corpus = Corpus::parse(&content, DocumentFormat::from_path(path))?;
    debug!(
        path = %path.display(),
        queries = corpus.queries.len(),
        call_sites = corpus.call_sites.len(),
        "query corpus loaded"
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
queries:
  - id: PromotionDao.ELIGIBLE
    template: "SELECT {p.pk} FROM {Promotion AS p} WHERE {p.uid} IN (?uids)"
    aliases:
      p: Promotion
call_sites:
  - query_id: PromotionDao.ELIGIBLE
    caller: PromotionDao.findEligible
    consumer_shape: raw-rows
    invocation_context: loop
    params:
      - name: uids
        type: STRING
        collection:
          size: 1500
"#;

    #[test]
    fn test_parse_yaml_corpus() {
        let corpus = Corpus::parse(YAML, DocumentFormat::Yaml).unwrap();
        assert_eq!(corpus.queries.len(), 1);
        assert_eq!(corpus.queries[0].aliases.get("p").unwrap().as_str(), "Promotion");
        let site = &corpus.call_sites[0];
        assert_eq!(site.consumer_shape, ConsumerShape::RawRows);
        assert_eq!(site.invocation_context, InvocationContext::Loop);
        assert!(!site.cap_applied);
        let uids = site.param("uids").unwrap();
        assert_eq!(uids.value_type, ValueType::String);
        assert_eq!(uids.collection.unwrap().size, Some(1500));
    }

    #[test]
    fn test_call_site_defaults() {
        let corpus = Corpus::parse(
            r#"{"queries":[{"id":"q","template":"SELECT {pk} FROM {A}"}],"call_sites":[{"query_id":"q"}]}"#,
            DocumentFormat::Json
        )
        .unwrap();
        let site = &corpus.call_sites[0];
        assert_eq!(site.consumer_shape, ConsumerShape::RawRows);
        assert_eq!(site.invocation_context, InvocationContext::Single);
        assert!(site.params.is_empty());
        assert_eq!(corpus.call_sites_for("q").count(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"queries":[{"id":"q","template":"a"},{"id":"q","template":"b"}]}"#;
        assert!(Corpus::parse(json, DocumentFormat::Json).is_err());
    }

    #[test]
    fn test_sql_format_rejected() {
        assert!(Corpus::parse("SELECT 1", DocumentFormat::Sql).is_err());
    }

    #[test]
    fn test_merge() {
        let mut corpus = Corpus::default();
        corpus
            .merge(Corpus {
                queries:    vec![QueryDefinition::new("a", "SELECT {pk} FROM {A}")],
                call_sites: vec![CallSite::new("a")]
            })
            .unwrap();
        assert!(!corpus.is_empty());
        let duplicate = Corpus {
            queries:    vec![QueryDefinition::new("a", "x")],
            call_sites: Vec::new()
        };
        assert!(corpus.merge(duplicate).is_err());
    }
}
