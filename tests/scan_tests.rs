use std::fs;

use query_risk_analyzer::{
    catalog::SchemaCatalog,
    config::AnalyzerSettings,
    corpus::{ConsumerShape, InvocationContext},
    document::DocumentFormat,
    rules::{RuleId, RuleRunner, Severity},
    scan::{scan_source, scan_sources}
};

const ORDER_DAO: &str = r#"
public class DefaultOrderDao {

    private static final String BY_CODE = "SELECT {o." + OrderModel.PK + "} "
            + "FROM {" + OrderModel._TYPECODE + " AS o} "
            + "WHERE {o." + OrderModel.CODE + "} = ?code";

    private static final String WITH_ENTRIES = "SELECT {o.pk}, {e.pk}, {p.pk} FROM {Order AS o "
            + "JOIN OrderEntry AS e ON {e.owner} = {o.pk} "
            + "JOIN Product AS p ON {p.pk} = {e.product}} WHERE {o.user} = ?user";

    public OrderModel findByCode(final long code) {
        final FlexibleSearchQuery query = new FlexibleSearchQuery(BY_CODE);
        query.addQueryParameter("code", Long.valueOf(code));
        return getFlexibleSearchService().searchUnique(query);
    }

    public List<List<Object>> findAllWithEntries(final UserModel user) {
        final Map<String, Object> params = new HashMap<>();
        params.put("user", user);
        final FlexibleSearchQuery query = new FlexibleSearchQuery(WITH_ENTRIES, params);
        query.setResultClassList(Arrays.asList(PK.class, PK.class, PK.class));
        final SearchResult<List<Object>> result = getFlexibleSearchService().search(query);
        return result.getResult();
    }

    public void refresh(final List<String> codes) {
        for (final String code : codes) {
            final FlexibleSearchQuery query = new FlexibleSearchQuery(BY_CODE);
            query.addQueryParameter("code", code);
            getFlexibleSearchService().searchUnique(query);
        }
    }
}
"#;

const SCHEMA: &str = r#"
tables:
  - name: Order
    columns:
      - { name: code, type: string }
      - { name: user, type: numeric }
    indexes:
      - { name: idx_order_code, columns: [code], unique: true }
      - { name: idx_order_user, columns: [user] }
  - name: OrderEntry
    columns:
      - { name: owner, type: numeric }
      - { name: product, type: numeric }
    indexes:
      - { name: idx_entry_order, columns: [owner] }
      - { name: idx_entry_product, columns: [product] }
  - name: Product
    columns: []
"#;

#[test]
fn test_scanned_call_sites() {
    let corpus = scan_source(ORDER_DAO);
    assert_eq!(corpus.queries.len(), 2);
    assert_eq!(
        corpus.queries[0].template,
        "SELECT {o.pk} FROM {Order AS o} WHERE {o.code} = ?code"
    );
    let callers: Vec<_> = corpus
        .call_sites
        .iter()
        .filter_map(|s| s.caller.as_deref())
        .collect();
    assert_eq!(
        callers,
        vec![
            "DefaultOrderDao.findByCode",
            "DefaultOrderDao.findAllWithEntries",
            "DefaultOrderDao.refresh"
        ]
    );
    assert_eq!(corpus.call_sites[0].consumer_shape, ConsumerShape::SingleEntity);
    assert_eq!(corpus.call_sites[2].invocation_context, InvocationContext::Loop);
}

#[test]
fn test_scanned_corpus_analysis() {
    let corpus = scan_source(ORDER_DAO);
    let catalog = SchemaCatalog::parse(SCHEMA, DocumentFormat::Yaml).unwrap();
    let report = RuleRunner::new(&catalog, AnalyzerSettings::default()).analyze(&corpus);

    let of = |rule: RuleId| -> Vec<_> {
        report
            .findings
            .iter()
            .filter(|f| f.rule_id == rule)
            .collect()
    };

    let mismatch = of(RuleId::TypeMismatch);
    assert_eq!(mismatch.len(), 1);
    assert_eq!(mismatch[0].query_id, "DefaultOrderDao.BY_CODE");

    let unbounded = of(RuleId::UnboundedResult);
    assert_eq!(unbounded.len(), 1);
    assert_eq!(unbounded[0].severity, Severity::Critical);
    assert_eq!(unbounded[0].caller.as_deref(), Some("DefaultOrderDao.findAllWithEntries"));

    let in_loop = of(RuleId::QueryInLoop);
    assert_eq!(in_loop.len(), 1);
    assert_eq!(in_loop[0].caller.as_deref(), Some("DefaultOrderDao.refresh"));
}

#[test]
fn test_scan_sources_reads_groovy_and_skips_hidden() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("OrderDao.groovy"), ORDER_DAO).unwrap();
    let hidden = dir.path().join(".build");
    fs::create_dir(&hidden).unwrap();
    fs::write(hidden.join("Copy.java"), ORDER_DAO).unwrap();

    let corpus = scan_sources(dir.path()).unwrap();
    assert_eq!(corpus.queries.len(), 2);
    assert_eq!(corpus.call_sites.len(), 3);
}

#[test]
fn test_scan_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("OrderDao.java");
    fs::write(&file, ORDER_DAO).unwrap();
    let corpus = scan_sources(&file).unwrap();
    assert_eq!(corpus.queries.len(), 2);
}
