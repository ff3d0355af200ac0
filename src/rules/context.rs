use std::sync::OnceLock;

use super::{
    index::coverage_table,
    types::{ColumnVerdict, Location}
};
use crate::{
    catalog::{SchemaCatalog, ValueType},
    config::AnalyzerSettings,
    corpus::{CallSite, ParamBinding, QueryDefinition},
    query::{ColumnRef, QueryModel}
};

/// Everything a rule may read while checking one query.
///
/// Built per query and dropped once its findings are extracted; the catalog
/// and settings are shared read-only across workers.
pub struct QueryContext<'a> {
    pub definition: &'a QueryDefinition,
    pub model:      &'a QueryModel,
    pub catalog:    &'a SchemaCatalog,
    pub settings:   &'a AnalyzerSettings,
    /// Call sites executing this query
    pub call_sites: Vec<&'a CallSite>,
    coverage:       OnceLock<Vec<ColumnVerdict>>
}

impl<'a> QueryContext<'a> {
    pub fn new(
        definition: &'a QueryDefinition,
        model: &'a QueryModel,
        catalog: &'a SchemaCatalog,
        settings: &'a AnalyzerSettings,
        call_sites: Vec<&'a CallSite>
    ) -> Self {
        Self {
            definition,
            model,
            catalog,
            settings,
            call_sites,
            coverage: OnceLock::new()
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn location(&self, offset: usize) -> Location {
        Location::in_template(&self.definition.template, offset)
    }

    /// Index verdict for every join and filter column, computed once.
    pub fn coverage(&self) -> &[ColumnVerdict] {
        self.coverage
            .get_or_init(|| coverage_table(self.model, self.catalog))
    }

    /// Watched tables this query (or any subquery) reads.
    pub fn watched_tables(&self) -> Vec<&'a str> {
        let mut tables: Vec<&str> = self
            .model
            .all_tables()
            .into_iter()
            .filter(|t| self.settings.is_watched(t))
            .collect();
        tables.sort_unstable();
        tables.dedup();
        tables
    }

    pub fn touches_watched(&self) -> bool {
        !self.watched_tables().is_empty()
    }

    /// Every binding supplied for `?name` across the call sites.
    pub fn bindings<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'a ParamBinding> + 's {
        self.call_sites
            .iter()
            .copied()
            .filter_map(move |site| site.param(name))
    }

    /// Declared type of a resolved column, enums collapsed to their
    /// representation.
    pub fn column_type(&self, column: &ColumnRef) -> Option<ValueType> {
        self.catalog
            .column_info(&column.table, &column.column)
            .found()
            .map(|c| c.effective_type())
    }

    /// Declared type before enum collapsing.
    pub fn declared_type(&self, column: &ColumnRef) -> Option<ValueType> {
        self.catalog
            .column_info(&column.table, &column.column)
            .found()
            .map(|c| c.declared_type)
    }
}
