//! Source scanner for data-access classes.
//!
//! Builds a [`Corpus`] straight from JVM sources: `static final String`
//! query constants become [`QueryDefinition`]s and every
//! `new FlexibleSearchQuery(...)` inside a method becomes a [`CallSite`].
//!
//! # Query constants
//!
//! Concatenations are folded at scan time:
//!
//! | Operand              | Resolves to                       |
//! |----------------------|-----------------------------------|
//! | `"..."`              | literal text                      |
//! | `FooModel._TYPECODE` | `Foo`                             |
//! | `FooModel.PK`        | `pk`                              |
//! | `FooModel.CODE`      | `code` (matched case-insensitive) |
//! | `OTHER_CONSTANT`     | previously folded constant        |
//!
//! Constants with an operand that cannot be folded are skipped.
//!
//! # Call sites
//!
//! For each execution the enclosing method supplies:
//!
//! - parameter bindings from `params.put("name", value)` with the value's type
//!   taken from wrapper calls, literals, enum constants or the declared type of
//!   the variable
//! - `setCount` / `setLimit` as a caller-side cap
//! - an enclosing `for`, `while` or `.forEach(...)` as loop context
//! - stream reductions and collectors as caller-side aggregation
//! - `searchUnique`, `.get(0)` and scalar return types as single-entity use

mod lexical;

use std::{
    collections::HashMap,
    fs,
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock
};

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info, warn};

use self::lexical::{matching_close, split_top_level, statement_end, string_literal, strip_comments};
use crate::{
    catalog::ValueType,
    corpus::{
        CallSite, CollectionBinding, ConsumerShape, Corpus, InvocationContext, ParamBinding,
        QueryDefinition
    },
    error::{AppResult, file_read_error}
};

/// File extensions scanned for data-access code.
const SOURCE_EXTENSIONS: &[&str] = &["java", "groovy"];

static CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(\w+)").expect("valid regex"));

static STRING_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bstatic\s+final\s+String\s+(\w+)\s*=").expect("valid regex")
});

static INT_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bstatic\s+final\s+(?:int|long|Integer|Long)\s+(\w+)\s*=\s*(\d+)[lL]?\s*;")
        .expect("valid regex")
});

static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]\w*)\s*\.\s*([A-Za-z_]\w*)$").expect("valid regex")
});

static METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|protected|private|static|final|synchronized)\s+)+([\w<>\[\]?,. ]+?)\s+(\w+)\s*\("
    )
    .expect("valid regex")
});

static SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnew\s+FlexibleSearchQuery\s*\(").expect("valid regex"));

static PARAM_PUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.\s*(?:put|addQueryParameter)\s*\(\s*"(\w+)"\s*,"#).expect("valid regex")
});

static LOCAL_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[;{(,\s])((?:[A-Z][\w.]*|int|long|double|float|short|boolean)(?:\s*<[\w<>, ?.]*>)?(?:\[\])?)\s+(\w+)\s*[=:;]"
    )
    .expect("valid regex")
});

static LAMBDA_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\w+)\s*\.\s*forEach\s*\(\s*\(?\s*(\w+)\s*\)?\s*->").expect("valid regex")
});

static SIZE_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\w+)\s*\.\s*size\s*\(\s*\)\s*(>=?)\s*(\w+)").expect("valid regex")
});

static SUBLIST_BATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\w+)\s*=\s*\w+\s*\.\s*subList\s*\(\s*\w+\s*,\s*Math\s*\.\s*min\s*\(\s*\w+\s*\+\s*(\w+)"
    )
    .expect("valid regex")
});

static CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s*(?:setCount|setLimit)\s*\(").expect("valid regex"));

static LOOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:for|while)\s*\(|\.\s*forEach\s*\(").expect("valid regex")
});

static AGGREGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Collectors\s*\.\s*(?:groupingBy|partitioningBy|counting|summingInt|summingLong|summingDouble|averagingInt|averagingLong|averagingDouble|toSet)\b|\.\s*(?:distinct|sum|count|average)\s*\(\s*\)|\.\s*merge\s*\(|\bnew\s+(?:HashSet|TreeSet|LinkedHashSet)\b"
    )
    .expect("valid regex")
});

static SINGLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bsearchUnique\s*\(|getResult\s*\(\s*\)\s*\.\s*get\s*\(\s*0\s*\)|\.\s*findFirst\s*\(\s*\)"
    )
    .expect("valid regex")
});

static MULTI_ROW_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:void|(?:java\.util\.)?(?:List|Collection|Set|Map|Iterable|Stream|SearchResult|SearchPageData)\b|.*\[\]$)"
    )
    .expect("valid regex")
});

static COLLECTION_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:java\.util\.)?(?:List|Collection|Set|Iterable|ArrayList|LinkedList|HashSet|TreeSet|LinkedHashSet)\s*<\s*([\w.]+)\s*>$"
    )
    .expect("valid regex")
});

static NUMBER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?[lLdDfF]?$").expect("valid regex"));

static NUMERIC_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:Long|Integer|Double|Float|Short|Byte|BigDecimal|BigInteger)\s*\.\s*valueOf|new\s+(?:Long|Integer|Double|BigDecimal|BigInteger))\s*\("
    )
    .expect("valid regex")
});

static STRING_CONVERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^String\s*\.\s*valueOf\s*\(|\.\s*(?:toString|name)\s*\(\s*\)$").expect("valid regex")
});

static COLLECTION_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^(?:Arrays\s*\.\s*asList|List\s*\.\s*of|Set\s*\.\s*of|Collections\s*\.\s*singletonList|Collections\s*\.\s*singleton)\s*\((.*)\)$"
    )
    .expect("valid regex")
});

static ENUM_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]\w*\s*\.\s*[A-Z][A-Z0-9_]*$").expect("valid regex")
});

/// Scan a source file or a directory tree.
///
/// Files are visited in path order. A query id seen twice keeps its first
/// definition.
///
/// # Errors
///
/// Returns an error when a directory or file cannot be read.
pub fn scan_sources(root: &Path) -> AppResult<Corpus> {
    let mut files = Vec::new();
    collect_sources(root, &mut files)?;
    files.sort();

    let mut corpus = Corpus::default();
    for path in &files {
        let content =
            fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
        let scanned = scan_source(&content);
        debug!(
            path = %path.display(),
            queries = scanned.queries.len(),
            call_sites = scanned.call_sites.len(),
            "source scanned"
        );
        for query in scanned.queries {
            if corpus.queries.iter().any(|q| q.id == query.id) {
                warn!(query = %query.id, path = %path.display(), "duplicate query id skipped");
                continue;
            }
            corpus.queries.push(query);
        }
        corpus.call_sites.extend(scanned.call_sites);
    }
    info!(
        files = files.len(),
        queries = corpus.queries.len(),
        call_sites = corpus.call_sites.len(),
        "sources scanned"
    );
    Ok(corpus)
}

fn collect_sources(path: &Path, out: &mut Vec<PathBuf>) -> AppResult<()> {
    let display = || path.display().to_string();
    let metadata = fs::metadata(path).map_err(|e| file_read_error(&display(), e))?;
    if metadata.is_file() {
        if is_source_file(path) {
            out.push(path.to_path_buf());
        }
        return Ok(());
    }
    for entry in fs::read_dir(path).map_err(|e| file_read_error(&display(), e))? {
        let entry = entry.map_err(|e| file_read_error(&display(), e))?;
        let child = entry.path();
        let hidden = child
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if child.is_dir() {
            collect_sources(&child, out)?;
        } else if is_source_file(&child) {
            out.push(child);
        }
    }
    Ok(())
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
}

/// Scan one compilation unit.
///
/// Query ids are `Class.CONSTANT`; templates passed inline get
/// `Class.method` (suffixed `#n` after the first). Callers are
/// `Class.method`.
pub fn scan_source(content: &str) -> Corpus {
    let text = strip_comments(content);
    let Some(class) = CLASS.captures(&text).map(|c| c[1].to_string()) else {
        return Corpus::default();
    };
    let unit = Unit::new(class, &text);

    let mut corpus = Corpus {
        queries:    unit
            .strings
            .iter()
            .filter(|(_, value)| looks_like_query(value))
            .map(|(name, value)| QueryDefinition::new(unit.qualified(name), value.clone()))
            .collect(),
        call_sites: Vec::new()
    };

    for method in unit.methods(&text) {
        unit.scan_method(&method, &mut corpus);
    }
    corpus
}

fn looks_like_query(value: &str) -> bool {
    let upper = value.trim_start().to_ascii_uppercase();
    upper.starts_with("SELECT") && upper.contains("FROM") && value.contains('{')
}

/// Constants of one class.
struct Unit {
    class:   String,
    strings: IndexMap<String, String>,
    ints:    HashMap<String, usize>
}

struct Method<'t> {
    name:        &'t str,
    return_type: &'t str,
    params:      &'t str,
    body:        &'t str
}

impl Unit {
    fn new(class: String, text: &str) -> Self {
        let ints = INT_CONSTANT
            .captures_iter(text)
            .filter_map(|c| Some((c[1].to_string(), c[2].parse().ok()?)))
            .collect();
        let mut unit = Self {
            class,
            strings: IndexMap::new(),
            ints
        };
        for captures in STRING_CONSTANT.captures_iter(text) {
            let (Some(whole), name) = (captures.get(0), &captures[1]) else {
                continue;
            };
            let Some(end) = statement_end(text, whole.end()) else {
                continue;
            };
            match unit.fold(&text[whole.end()..end]) {
                Some(value) => {
                    unit.strings.insert(name.to_string(), value);
                }
                None => debug!(constant = name, "string constant not folded")
            }
        }
        unit
    }

    fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.class, name)
    }

    /// Fold a string concatenation into its value.
    fn fold(&self, expr: &str) -> Option<String> {
        let mut value = String::new();
        for operand in split_top_level(expr, '+') {
            value.push_str(&self.operand(operand)?);
        }
        Some(value)
    }

    fn operand(&self, operand: &str) -> Option<String> {
        let operand = strip_parens(operand);
        if operand.starts_with('"') {
            return string_literal(operand);
        }
        if let Some(value) = self.strings.get(operand) {
            return Some(value.clone());
        }
        let captures = MEMBER.captures(operand)?;
        let (owner, member) = (&captures[1], &captures[2]);
        if owner == self.class {
            return self.strings.get(member).cloned();
        }
        let type_name = owner.strip_suffix("Model")?;
        match member {
            "_TYPECODE" => Some(type_name.to_string()),
            "PK" => Some("pk".to_string()),
            attribute if is_constant_name(attribute) => Some(attribute.to_ascii_lowercase()),
            _ => None
        }
    }

    fn int_value(&self, token: &str) -> Option<usize> {
        token
            .parse()
            .ok()
            .or_else(|| self.ints.get(token).copied())
    }

    fn methods<'t>(&self, text: &'t str) -> Vec<Method<'t>> {
        let mut methods = Vec::new();
        let mut resume = 0;
        for captures in METHOD.captures_iter(text) {
            let (Some(whole), Some(return_type), Some(name)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            if whole.start() < resume {
                continue;
            }
            let open = whole.end() - 1;
            let Some(close) = matching_close(text, open) else {
                continue;
            };
            let after = &text[close + 1..];
            let Some(brace) = after.find(['{', ';']) else {
                continue;
            };
            if !after[brace..].starts_with('{') {
                continue;
            }
            let body_open = close + 1 + brace;
            let Some(body_close) = matching_close(text, body_open) else {
                continue;
            };
            methods.push(Method {
                name:        name.as_str(),
                return_type: return_type.as_str().trim(),
                params:      &text[open + 1..close],
                body:        &text[body_open..=body_close]
            });
            resume = body_close;
        }
        methods
    }

    fn scan_method(&self, method: &Method<'_>, corpus: &mut Corpus) {
        let caller = format!("{}.{}", self.class, method.name);
        let variables = variable_types(method);
        let batches = self.batch_caps(method.body);
        let loops = loop_ranges(method.body);
        let params = self.bindings(method.body, &variables, &batches);
        let cap_applied = CAP.is_match(method.body);
        let mut inline = 0;

        for search in SEARCH.find_iter(method.body) {
            let open = search.end() - 1;
            let Some(close) = matching_close(method.body, open) else {
                continue;
            };
            let args = split_top_level(&method.body[open + 1..close], ',');
            let Some(first) = args.first() else {
                continue;
            };
            let Some(query_id) = self.query_reference(first).or_else(|| {
                let template = self.fold(first).filter(|t| looks_like_query(t))?;
                let id = match inline {
                    0 => caller.clone(),
                    n => format!("{}#{}", caller, n + 1)
                };
                inline += 1;
                corpus.queries.push(QueryDefinition::new(id.clone(), template));
                Some(id)
            }) else {
                debug!(caller = %caller, "query argument not resolved");
                continue;
            };

            let after = &method.body[search.start()..];
            let consumer_shape = if AGGREGATION.is_match(after) {
                ConsumerShape::Aggregated
            } else if SINGLE_ROW.is_match(after) || !MULTI_ROW_TYPE.is_match(method.return_type) {
                ConsumerShape::SingleEntity
            } else {
                ConsumerShape::RawRows
            };
            let invocation_context = if loops.iter().any(|r| r.contains(&search.start())) {
                InvocationContext::Loop
            } else {
                InvocationContext::Single
            };

            corpus.call_sites.push(CallSite {
                query_id,
                caller: Some(caller.clone()),
                cap_applied,
                consumer_shape,
                invocation_context,
                params: params.clone()
            });
        }
    }

    /// Query id for a constant reference, `QUERY` or `Owner.QUERY`.
    fn query_reference(&self, expr: &str) -> Option<String> {
        let expr = strip_parens(expr);
        if self.strings.contains_key(expr) {
            return Some(self.qualified(expr));
        }
        let captures = MEMBER.captures(expr)?;
        let (owner, member) = (&captures[1], &captures[2]);
        if owner == self.class {
            return self.strings.contains_key(member).then(|| self.qualified(member));
        }
        (is_constant_name(member) && !owner.ends_with("Model"))
            .then(|| format!("{}.{}", owner, member))
    }

    /// Largest size a collection variable can have, from size guards and
    /// `subList` batching.
    fn batch_caps(&self, body: &str) -> HashMap<String, usize> {
        let mut caps = HashMap::new();
        for captures in SIZE_GUARD.captures_iter(body) {
            if let Some(limit) = self.int_value(&captures[3]) {
                let limit = if &captures[2] == ">=" { limit.saturating_sub(1) } else { limit };
                caps.insert(captures[1].to_string(), limit);
            }
        }
        for captures in SUBLIST_BATCH.captures_iter(body) {
            if let Some(limit) = self.int_value(&captures[2]) {
                caps.insert(captures[1].to_string(), limit);
            }
        }
        caps
    }

    fn bindings(
        &self,
        body: &str,
        variables: &HashMap<&str, &str>,
        caps: &HashMap<String, usize>
    ) -> Vec<ParamBinding> {
        let mut bindings: Vec<ParamBinding> = Vec::new();
        for captures in PARAM_PUT.captures_iter(body) {
            let (Some(whole), name) = (captures.get(0), &captures[1]) else {
                continue;
            };
            if bindings.iter().any(|b| b.name == name) {
                continue;
            }
            let Some(open) = body[..whole.end()].rfind('(') else {
                continue;
            };
            let Some(close) = matching_close(body, open) else {
                continue;
            };
            let args = split_top_level(&body[open + 1..close], ',');
            let Some(value) = args.get(1) else {
                continue;
            };
            match infer_binding(name, value, variables, caps) {
                Some(binding) => bindings.push(binding),
                None => debug!(param = name, value = *value, "parameter type not inferred")
            }
        }
        bindings
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn strip_parens(expr: &str) -> &str {
    let mut expr = expr.trim();
    while expr.starts_with('(') && matching_close(expr, 0) == Some(expr.len() - 1) {
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

/// Declared types of method parameters and locals.
fn variable_types<'t>(method: &Method<'t>) -> HashMap<&'t str, &'t str> {
    let mut variables = HashMap::new();
    for param in split_top_level(method.params, ',') {
        let param = param
            .split_whitespace()
            .filter(|w| *w != "final" && !w.starts_with('@'))
            .collect::<Vec<_>>();
        if let [.., type_name, name] = param.as_slice() {
            variables.insert(*name, *type_name);
        }
    }
    // generic parameter types with spaces keep their declared text
    for param in split_top_level(method.params, ',') {
        if let Some((type_name, name)) = param.trim().rsplit_once(char::is_whitespace) {
            let type_name = type_name.trim().trim_start_matches("final").trim();
            if type_name.contains('<') {
                variables.insert(name.trim(), type_name);
            }
        }
    }
    for captures in LOCAL_VARIABLE.captures_iter(method.body) {
        if let (Some(type_name), Some(name)) = (captures.get(1), captures.get(2)) {
            variables.entry(name.as_str()).or_insert(type_name.as_str());
        }
    }
    for captures in LAMBDA_ELEMENT.captures_iter(method.body) {
        let (Some(collection), Some(element)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let element_type = variables
            .get(collection.as_str())
            .copied()
            .and_then(|t| COLLECTION_TYPE.captures(t))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        if let Some(element_type) = element_type {
            variables.entry(element.as_str()).or_insert(element_type);
        }
    }
    variables
}

/// Body ranges of every loop in `body`.
fn loop_ranges(body: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    for found in LOOP.find_iter(body) {
        let open = found.end() - 1;
        let Some(close) = matching_close(body, open) else {
            continue;
        };
        if found.as_str().starts_with('.') {
            ranges.push(open..close);
            continue;
        }
        let rest = &body[close + 1..];
        let start = close + 1 + (rest.len() - rest.trim_start().len());
        let end = if body[start..].starts_with('{') {
            matching_close(body, start)
        } else {
            statement_end(body, start)
        };
        if let Some(end) = end {
            ranges.push(start..end);
        }
    }
    ranges
}

/// Binding for `params.put(name, value)`.
fn infer_binding(
    name: &str,
    value: &str,
    variables: &HashMap<&str, &str>,
    caps: &HashMap<String, usize>
) -> Option<ParamBinding> {
    let value = strip_parens(value);
    if let Some(items) = COLLECTION_LITERAL.captures(value) {
        let items = split_top_level(&items[1], ',');
        let element = items.first().and_then(|item| scalar_type(item, variables))?;
        return Some(ParamBinding::collection(
            name,
            element,
            CollectionBinding {
                size:     Some(items.len()),
                max_size: None
            }
        ));
    }
    if let Some(element) = value.strip_prefix("new ").and_then(collection_element) {
        return Some(ParamBinding::collection(name, element, CollectionBinding::default()));
    }
    if let Some(type_name) = variables.get(value)
        && let Some(element) = collection_element(type_name)
    {
        return Some(ParamBinding::collection(
            name,
            element,
            CollectionBinding {
                size:     None,
                max_size: caps.get(value).copied()
            }
        ));
    }
    scalar_type(value, variables).map(|t| ParamBinding::scalar(name, t))
}

fn scalar_type(value: &str, variables: &HashMap<&str, &str>) -> Option<ValueType> {
    let value = strip_parens(value);
    if value.starts_with('"') {
        Some(ValueType::String)
    } else if value == "true" || value == "false" || value.starts_with("Boolean.") {
        Some(ValueType::Boolean)
    } else if NUMBER_LITERAL.is_match(value) || NUMERIC_WRAPPER.is_match(value) {
        Some(ValueType::Numeric)
    } else if STRING_CONVERSION.is_match(value) {
        Some(ValueType::String)
    } else if value.starts_with("new Date(") || value.starts_with("new java.util.Date(") {
        Some(ValueType::Date)
    } else if ENUM_CONSTANT.is_match(value) {
        Some(ValueType::Enum)
    } else {
        variables.get(value).and_then(|t| element_type(t))
    }
}

/// Element type of a collection type such as `List<PK>` or `String[]`.
fn collection_element(type_name: &str) -> Option<ValueType> {
    let type_name = type_name.trim().trim_end_matches("()");
    if let Some(captures) = COLLECTION_TYPE.captures(type_name) {
        return element_type(&captures[1]);
    }
    type_name.strip_suffix("[]").and_then(element_type)
}

/// Value type of a declared JVM type. Model types bind by primary key and
/// other unknown capitalized types are taken as enumerations.
fn element_type(type_name: &str) -> Option<ValueType> {
    let type_name = type_name.trim();
    if let Some(known) = ValueType::from_jvm_type(type_name) {
        return Some(known);
    }
    let simple = type_name.rsplit('.').next().unwrap_or(type_name);
    if simple.ends_with("Model") {
        return Some(ValueType::Numeric);
    }
    let plain = simple.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let container = matches!(simple, "Object" | "Map" | "Optional" | "SearchResult");
    (plain && !container && simple.starts_with(|c: char| c.is_ascii_uppercase()))
        .then_some(ValueType::Enum)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_DAO: &str = r#"
package com.example.fulfillment.dao;

public class DefaultFulfillmentEntryDao implements FulfillmentEntryDao {

    private static final int MAX_IN_CLAUSE_SIZE = 1000;

    // entries of one order
    private static final String ENTRY_SELECT = "SELECT {fe." + FulfillmentEntryModel.PK + "} ";

    private static final String FIND_ENTRIES_BY_ORDER = ENTRY_SELECT
            + "FROM {" + FulfillmentEntryModel._TYPECODE + " AS fe} "
            + "WHERE {fe." + FulfillmentEntryModel.ORDERCODE + "} = ?orderCode";

    private static final String FIND_ENTRIES_BY_PKS = ENTRY_SELECT
            + "FROM {" + FulfillmentEntryModel._TYPECODE + " AS fe} "
            + "WHERE {fe." + FulfillmentEntryModel.PK + "} IN (?pks)";

    private static final String FIND_TOTAL = "SELECT {fe.quantity}, {fe.status} "
            + "FROM {FulfillmentEntry AS fe} WHERE {fe.warehouse} = ?warehouse";

    private static final String LABEL = "entries";

    @Override
    public List<FulfillmentEntryModel> findEntriesByOrder(final long orderCode) {
        final Map<String, Object> params = new HashMap<>();
        params.put("orderCode", String.valueOf(orderCode));
        final FlexibleSearchQuery query = new FlexibleSearchQuery(FIND_ENTRIES_BY_ORDER, params);
        final SearchResult<FulfillmentEntryModel> result = getFlexibleSearchService().search(query);
        return result.getResult();
    }

    @Override
    public List<FulfillmentEntryModel> findEntriesByPks(final List<PK> pks) {
        final List<FulfillmentEntryModel> entries = new ArrayList<>();
        for (int i = 0; i < pks.size(); i += MAX_IN_CLAUSE_SIZE) {
            final List<PK> batch = pks.subList(i, Math.min(i + MAX_IN_CLAUSE_SIZE, pks.size()));
            final Map<String, Object> params = new HashMap<>();
            params.put("pks", batch);
            final FlexibleSearchQuery query = new FlexibleSearchQuery(FIND_ENTRIES_BY_PKS, params);
            query.setCount(MAX_IN_CLAUSE_SIZE);
            entries.addAll(getFlexibleSearchService().<FulfillmentEntryModel> search(query).getResult());
        }
        return entries;
    }

    @Override
    public Map<String, Long> countByStatus(final String warehouse) {
        final Map<String, Object> params = new HashMap<>();
        params.put("warehouse", warehouse);
        final FlexibleSearchQuery query = new FlexibleSearchQuery(FIND_TOTAL, params);
        query.setResultClassList(Arrays.asList(Long.class, String.class));
        final SearchResult<List<Object>> result = getFlexibleSearchService().search(query);
        return result.getResult().stream()
                .collect(Collectors.groupingBy(row -> (String) row.get(1), Collectors.counting()));
    }
}
"#;

    const PROMOTION_DAO: &str = r#"
public class DefaultPromotionDao {

    private static final String FIND_ELIGIBLE = "SELECT {p.pk} FROM {Promotion AS p} "
            + "WHERE {p.status} = ?status AND {p.excluded} = ?excluded "
            + "AND {p.mode} = ?mode AND {p.startDate} <= ?now AND {p.pk} IN (?pkList)";

    public PromotionModel findEligible(final Date now, final List<PK> pkList, final RewardType type) {
        final Map<String, Object> params = new HashMap<>();
        params.put("status", PromotionStatus.ACTIVE);
        params.put("excluded", Boolean.FALSE);
        params.put("mode", "INCLUDE");
        params.put("now", now);
        params.put("pkList", pkList);
        params.put("type", type);
        params.put("limit", Integer.valueOf(10));
        final FlexibleSearchQuery query = new FlexibleSearchQuery(FIND_ELIGIBLE, params);
        final SearchResult<PromotionModel> result = getFlexibleSearchService().search(query);
        return result.getResult().isEmpty() ? null : result.getResult().get(0);
    }

    public void touchAll(final Collection<String> codes) {
        codes.forEach(code -> {
            final FlexibleSearchQuery query = new FlexibleSearchQuery(
                    "SELECT {pk} FROM {Promotion} WHERE {code} = ?code");
            query.addQueryParameter("code", code);
            getFlexibleSearchService().search(query);
        });
    }
}
"#;

    fn site<'a>(corpus: &'a Corpus, caller: &str) -> &'a CallSite {
        corpus
            .call_sites
            .iter()
            .find(|s| s.caller.as_deref() == Some(caller))
            .unwrap()
    }

    #[test]
    fn test_constants_are_folded() {
        let corpus = scan_source(ENTRY_DAO);
        let ids: Vec<_> = corpus.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "DefaultFulfillmentEntryDao.FIND_ENTRIES_BY_ORDER",
                "DefaultFulfillmentEntryDao.FIND_ENTRIES_BY_PKS",
                "DefaultFulfillmentEntryDao.FIND_TOTAL"
            ]
        );
        assert_eq!(
            corpus.queries[0].template,
            "SELECT {fe.pk} FROM {FulfillmentEntry AS fe} WHERE {fe.ordercode} = ?orderCode"
        );
    }

    #[test]
    fn test_commented_constant_ignored() {
        let source = "class A {\n// private static final String Q = \"SELECT {pk} FROM {T}\";\n}";
        assert!(scan_source(source).queries.is_empty());
    }

    #[test]
    fn test_raw_rows_call_site() {
        let corpus = scan_source(ENTRY_DAO);
        let site = site(&corpus, "DefaultFulfillmentEntryDao.findEntriesByOrder");
        assert_eq!(site.query_id, "DefaultFulfillmentEntryDao.FIND_ENTRIES_BY_ORDER");
        assert_eq!(site.consumer_shape, ConsumerShape::RawRows);
        assert_eq!(site.invocation_context, InvocationContext::Single);
        assert!(!site.cap_applied);
        assert_eq!(site.params, vec![ParamBinding::scalar("orderCode", ValueType::String)]);
    }

    #[test]
    fn test_batched_loop_call_site() {
        let corpus = scan_source(ENTRY_DAO);
        let site = site(&corpus, "DefaultFulfillmentEntryDao.findEntriesByPks");
        assert_eq!(site.invocation_context, InvocationContext::Loop);
        assert!(site.cap_applied);
        let pks = site.param("pks").unwrap();
        assert_eq!(pks.value_type, ValueType::Numeric);
        assert_eq!(pks.collection.unwrap().max_size, Some(1000));
    }

    #[test]
    fn test_caller_aggregation() {
        let corpus = scan_source(ENTRY_DAO);
        let site = site(&corpus, "DefaultFulfillmentEntryDao.countByStatus");
        assert_eq!(site.consumer_shape, ConsumerShape::Aggregated);
        assert_eq!(site.param("warehouse").unwrap().value_type, ValueType::String);
    }

    #[test]
    fn test_binding_types() {
        let corpus = scan_source(PROMOTION_DAO);
        let site = site(&corpus, "DefaultPromotionDao.findEligible");
        assert_eq!(site.consumer_shape, ConsumerShape::SingleEntity);
        let type_of = |name: &str| site.param(name).unwrap().value_type;
        assert_eq!(type_of("status"), ValueType::Enum);
        assert_eq!(type_of("excluded"), ValueType::Boolean);
        assert_eq!(type_of("mode"), ValueType::String);
        assert_eq!(type_of("now"), ValueType::Date);
        assert_eq!(type_of("type"), ValueType::Enum);
        assert_eq!(type_of("limit"), ValueType::Numeric);
        let pk_list = site.param("pkList").unwrap();
        assert_eq!(pk_list.value_type, ValueType::Numeric);
        assert_eq!(pk_list.collection, Some(CollectionBinding::default()));
    }

    #[test]
    fn test_inline_template_in_lambda() {
        let corpus = scan_source(PROMOTION_DAO);
        assert!(corpus.queries.iter().any(|q| q.id == "DefaultPromotionDao.touchAll"));
        let site = site(&corpus, "DefaultPromotionDao.touchAll");
        assert_eq!(site.query_id, "DefaultPromotionDao.touchAll");
        assert_eq!(site.invocation_context, InvocationContext::Loop);
        assert_eq!(site.consumer_shape, ConsumerShape::RawRows);
        assert_eq!(site.params, vec![ParamBinding::scalar("code", ValueType::String)]);
    }

    #[test]
    fn test_collection_literal_binding() {
        let variables = HashMap::new();
        let binding =
            infer_binding("codes", "Arrays.asList(\"a\", \"b\", \"c\")", &variables, &HashMap::new())
                .unwrap();
        assert_eq!(binding.value_type, ValueType::String);
        assert_eq!(binding.collection.unwrap().size, Some(3));
    }

    #[test]
    fn test_scan_sources_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("dao");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("EntryDao.java"), ENTRY_DAO).unwrap();
        fs::write(dir.path().join("PromotionDao.java"), PROMOTION_DAO).unwrap();
        fs::write(dir.path().join("notes.txt"), "class Ignored {}").unwrap();
        let corpus = scan_sources(dir.path()).unwrap();
        assert_eq!(corpus.queries.len(), 5);
        assert_eq!(corpus.call_sites.len(), 5);
    }

    #[test]
    fn test_scan_missing_path() {
        assert!(scan_sources(Path::new("/nonexistent/sources")).is_err());
    }
}
