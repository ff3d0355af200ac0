//! Alias resolution.
//!
//! A reference is looked up in its own FROM scope first, then in each
//! enclosing scope. An alias visible at two levels is ambiguous.

use super::{
    error::ParseError,
    types::{AliasMap, ColumnRef, QueryModel}
};

/// Resolve every column reference of `model` and its subqueries, then check
/// the top-level aliases against the ones declared with the definition.
pub(super) fn resolve(model: &mut QueryModel, declared: &AliasMap) -> Result<(), ParseError> {
    let mut scopes = Vec::new();
    resolve_scope(model, &mut scopes)?;
    for (alias, table) in declared {
        let key = alias.to_ascii_lowercase();
        let Some(found) = model.aliases.get(key.as_str()) else {
            continue;
        };
        if !found.eq_ignore_ascii_case(table) {
            let position = model
                .sources
                .iter()
                .find(|s| s.alias == key)
                .map(|s| s.position)
                .unwrap_or(0);
            return Err(ParseError::AliasMismatch {
                alias: alias.to_string(),
                declared: table.to_string(),
                found: found.to_string(),
                position
            });
        }
    }
    Ok(())
}

fn resolve_scope(model: &mut QueryModel, ancestors: &mut Vec<AliasMap>) -> Result<(), ParseError> {
    declare_aliases(model)?;
    let local = model.aliases.clone();
    {
        let outer: &[AliasMap] = ancestors;
        model.for_each_ref_mut(&mut |r| resolve_ref(r, &local, outer))?;
    }
    ancestors.push(local);
    for sub in &mut model.subqueries {
        resolve_scope(&mut sub.model, ancestors)?;
        sub.correlations = outer_references(&mut sub.model)?;
    }
    ancestors.pop();
    Ok(())
}

fn declare_aliases(model: &mut QueryModel) -> Result<(), ParseError> {
    let mut aliases = AliasMap::new();
    for source in &model.sources {
        if aliases
            .insert(source.alias.clone(), source.table.clone())
            .is_some()
        {
            return Err(ParseError::DuplicateAlias {
                alias:    source.alias.to_string(),
                position: source.position
            });
        }
    }
    model.aliases = aliases;
    Ok(())
}

fn resolve_ref(r: &mut ColumnRef, local: &AliasMap, outer: &[AliasMap]) -> Result<(), ParseError> {
    if r.alias.is_empty() {
        return match local.first() {
            Some((alias, table)) if local.len() == 1 => {
                r.alias = alias.clone();
                r.table = table.clone();
                Ok(())
            }
            _ => Err(ParseError::UnqualifiedColumn {
                column:   r.column.to_string(),
                sources:  local.len(),
                position: r.position
            })
        };
    }
    let outer_hits: Vec<_> = outer
        .iter()
        .filter_map(|scope| scope.get(&r.alias))
        .collect();
    match (local.get(&r.alias), outer_hits.as_slice()) {
        (Some(table), []) => {
            r.table = table.clone();
            Ok(())
        }
        (None, [table]) => {
            r.table = (*table).clone();
            r.correlated = true;
            Ok(())
        }
        (None, []) => Err(ParseError::UnknownAlias {
            alias:    r.alias.to_string(),
            position: r.position
        }),
        _ => Err(ParseError::AmbiguousAlias {
            alias:    r.alias.to_string(),
            position: r.position
        })
    }
}

/// References that leave the subquery's own scope, including those made by
/// deeper subqueries past this one.
fn outer_references(model: &mut QueryModel) -> Result<Vec<ColumnRef>, ParseError> {
    let mut refs = Vec::new();
    model.for_each_ref_mut(&mut |r| {
        if r.correlated {
            refs.push(r.clone());
        }
        Ok::<(), ParseError>(())
    })?;
    for nested in &model.subqueries {
        refs.extend(
            nested
                .correlations
                .iter()
                .filter(|c| !model.aliases.contains_key(&c.alias))
                .cloned()
        );
    }
    Ok(refs)
}
