use std::collections::BTreeMap;

use super::{
    QueryContext, Rule,
    types::{Finding, RuleId, RuleInfo, Severity}
};
use crate::{
    catalog::{SchemaColumn, ValueType},
    query::{ColumnRef, InOperand, Operand, Predicate}
};

/// Whether a parameter of type `supplied` can be compared with `column`
/// without coercion. Enums compare as their underlying representation.
pub fn is_compatible(supplied: ValueType, column: &SchemaColumn) -> bool {
    if supplied == ValueType::Enum && column.declared_type == ValueType::Enum {
        return true;
    }
    let supplied = match supplied {
        ValueType::Enum => ValueType::String,
        other => other
    };
    supplied == column.effective_type()
}

/// `(column, param)` pairs for every parameter compared with a column.
fn param_targets<'m>(predicate: &'m Predicate, out: &mut Vec<(&'m ColumnRef, &'m str)>) {
    for leaf in predicate.leaves() {
        match leaf {
            Predicate::Comparison {
                column,
                operand: Operand::Param(name),
                ..
            } => out.push((column, name.as_str())),
            Predicate::In {
                column,
                operand: operand @ InOperand::List(_),
                ..
            } => out.extend(operand.params().into_iter().map(|p| (column, p))),
            _ => {}
        }
    }
}

/// Bound parameter whose declared type differs from the column it is
/// compared with
pub struct TypeMismatch;

impl Rule for TypeMismatch {
    fn info(&self) -> RuleInfo {
        RuleId::TypeMismatch.info()
    }

    fn check(&self, ctx: &QueryContext<'_>) -> Vec<Finding> {
        let mut targets = Vec::new();
        for scope in ctx.model.scopes() {
            let predicates = scope
                .where_clause
                .iter()
                .chain(scope.join_filters.iter())
                .chain(scope.having.iter());
            for predicate in predicates {
                param_targets(predicate, &mut targets);
            }
        }

        // one finding per column, whatever the number of call sites
        let mut by_column: BTreeMap<(String, String), Finding> = BTreeMap::new();
        for (column_ref, param) in targets {
            let Some(column) = ctx
                .catalog
                .column_info(&column_ref.table, &column_ref.column)
                .found()
            else {
                continue;
            };
            let key = (
                column.table.as_str().to_ascii_lowercase(),
                column.column.as_str().to_ascii_lowercase()
            );
            if by_column.contains_key(&key) {
                continue;
            }
            let Some(binding) = ctx
                .bindings(param)
                .find(|b| !is_compatible(b.value_type, column))
            else {
                continue;
            };

            let mut finding = Finding::new(
                RuleId::TypeMismatch,
                ctx.id(),
                format!(
                    "?{} is bound as {} but {} is {}; the database coerces every row",
                    param,
                    binding.value_type,
                    column_ref,
                    column.effective_type()
                )
            )
            .at(ctx.location(column_ref.position))
            .with_tables([column.table.as_str()])
            .with_column(column.table.as_str(), column.column.as_str())
            .with_caller(
                ctx.call_sites
                    .iter()
                    .find(|s| s.param(param).is_some_and(|b| b.value_type == binding.value_type))
                    .and_then(|s| s.caller.as_deref())
            )
            .with_suggestion(format!(
                "Bind ?{} as {} (convert the value before binding)",
                param,
                column.effective_type()
            ));
            if !column.indexed && ctx.settings.is_watched(&column.table) {
                finding = finding.escalate_to(Severity::High);
            }
            by_column.insert(key, finding);
        }
        by_column.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn column(declared_type: ValueType, enum_repr: Option<ValueType>) -> SchemaColumn {
        SchemaColumn {
            table: "T".into(),
            column: "c".into(),
            declared_type,
            enum_repr,
            indexed: false,
            index_names: BTreeSet::new(),
            composites: BTreeSet::new()
        }
    }

    #[test]
    fn test_compatibility_table() {
        let string = column(ValueType::String, None);
        let numeric = column(ValueType::Numeric, None);
        let date = column(ValueType::Date, None);
        assert!(is_compatible(ValueType::Numeric, &numeric));
        assert!(is_compatible(ValueType::String, &string));
        assert!(!is_compatible(ValueType::Numeric, &string));
        assert!(!is_compatible(ValueType::String, &numeric));
        assert!(!is_compatible(ValueType::String, &date));
    }

    #[test]
    fn test_enum_uses_representation() {
        let coded = column(ValueType::Enum, None);
        let ordinal = column(ValueType::Enum, Some(ValueType::Numeric));
        assert!(is_compatible(ValueType::String, &coded));
        assert!(is_compatible(ValueType::Enum, &ordinal));
        assert!(is_compatible(ValueType::Numeric, &ordinal));
        assert!(!is_compatible(ValueType::String, &ordinal));
        assert!(is_compatible(ValueType::Enum, &column(ValueType::String, None)));
    }
}
