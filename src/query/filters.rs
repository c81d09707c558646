use crate::query::{get_path_values, ComparisonOperator, Expr, Filter};
use crate::util::bson_utils::{bson_eq, cmp_bson, type_rank};
use bson::{Bson, Document};
use std::cmp::Ordering;
use std::sync::Arc;

/// A predicate over the values a field path designates in a document. An empty slice means the
/// path is missing.
type ValueFilter = Box<dyn Fn(&[&Bson]) -> bool + Send + Sync>;

/// Checks whether `document_value` or, for arrays, one of its elements satisfies `matcher`.
fn any_value_or_element<F>(document_value: &Bson, matcher: F) -> bool
where
    F: Fn(&Bson) -> bool,
{
    if matcher(document_value) {
        return true;
    }
    if let Bson::Array(array) = document_value {
        array.iter().any(matcher)
    } else {
        false
    }
}

fn matches_equality(comparison_value: &Bson, document_values: &[&Bson]) -> bool {
    if document_values.is_empty() {
        return matches!(comparison_value, Bson::Null);
    }
    document_values
        .iter()
        .any(|v| any_value_or_element(v, |elem| bson_eq(elem, comparison_value)))
}

fn matches_range(operator: ComparisonOperator, comparison_value: &Bson, document_values: &[&Bson]) -> bool {
    let in_range = |elem: &Bson| {
        // Range comparisons only apply within a type bracket and never match null
        if matches!(elem, Bson::Null) || type_rank(elem) != type_rank(comparison_value) {
            return false;
        }
        let ordering = cmp_bson(elem, comparison_value);
        match operator {
            ComparisonOperator::Gt => ordering == Ordering::Greater,
            ComparisonOperator::Gte => ordering != Ordering::Less,
            ComparisonOperator::Lt => ordering == Ordering::Less,
            ComparisonOperator::Lte => ordering != Ordering::Greater,
            _ => false,
        }
    };
    document_values.iter().any(|v| any_value_or_element(v, &in_range))
}

fn matches_membership(candidates: &[Bson], document_values: &[&Bson]) -> bool {
    candidates.iter().any(|candidate| matches_equality(candidate, document_values))
}

/// Compares the values of a field against a value using the specified comparison operator.
fn compare_values(operator: ComparisonOperator, comparison_value: &Bson, document_values: &[&Bson]) -> bool {
    match operator {
        ComparisonOperator::Eq => matches_equality(comparison_value, document_values),
        ComparisonOperator::Ne => !matches_equality(comparison_value, document_values),
        ComparisonOperator::Gt
        | ComparisonOperator::Gte
        | ComparisonOperator::Lt
        | ComparisonOperator::Lte => matches_range(operator, comparison_value, document_values),
        ComparisonOperator::In => match comparison_value {
            Bson::Array(array) => matches_membership(array, document_values),
            _ => false,
        },
        ComparisonOperator::Nin => match comparison_value {
            Bson::Array(array) => !matches_membership(array, document_values),
            _ => true,
        },
    }
}

fn literal(expr: &Arc<Expr>) -> Bson {
    match expr.as_ref() {
        Expr::Literal(value) => value.clone(),
        _ => panic!("Expected a literal, got: {:?}", expr),
    }
}

/// Converts a value filter expression into a function that can be applied to field values.
fn to_value_filter(filter: Arc<Expr>) -> ValueFilter {
    match filter.as_ref() {
        Expr::Comparison { operator, value } => {
            let operator = *operator;
            let comparison_value = literal(value);
            Box::new(move |values| compare_values(operator, &comparison_value, values))
        }
        Expr::Exists(exists) => {
            let exists = *exists;
            Box::new(move |values| !values.is_empty() == exists)
        }
        Expr::Size(size) => {
            let size = *size;
            Box::new(move |values| {
                values.iter().any(|v| matches!(v, Bson::Array(array) if array.len() == size))
            })
        }
        // `$all` matches when every listed value is found in the field. An empty list never matches.
        Expr::All(value) => {
            let required = match literal(value) {
                Bson::Array(array) => array,
                other => vec![other],
            };
            Box::new(move |values| {
                !required.is_empty()
                    && values.iter().any(|v| {
                        required
                            .iter()
                            .all(|r| any_value_or_element(v, |elem| bson_eq(elem, r)))
                    })
            })
        }
        // `$elemMatch` matches when a single array element satisfies every condition.
        Expr::ElemMatch { filters, on_documents: true } => {
            let elem_filters = to_filters(filters);
            Box::new(move |values| {
                elem_match(values, |elem| match elem {
                    Bson::Document(sub_doc) => elem_filters.iter().all(|f| f(sub_doc)),
                    _ => false,
                })
            })
        }
        Expr::ElemMatch { filters, on_documents: false } => {
            let elem_filters = to_value_filters(filters);
            Box::new(move |values| {
                elem_match(values, |elem| elem_filters.iter().all(|f| f(std::slice::from_ref(&elem))))
            })
        }
        Expr::Not(child) => {
            let inner = to_value_filter(child.clone());
            Box::new(move |values| !inner(values))
        }
        Expr::And(children) => {
            let inner = to_value_filters(children);
            Box::new(move |values| inner.iter().all(|f| f(values)))
        }
        _ => panic!("Unsupported value filter: {:?}", filter),
    }
}

fn elem_match<F>(values: &[&Bson], matcher: F) -> bool
where
    F: Fn(&Bson) -> bool,
{
    values.iter().any(|v| match v {
        Bson::Array(array) => array.iter().any(&matcher),
        _ => false,
    })
}

/// Compiles an expression into a filter function that can be applied to documents.
pub fn to_filter(expr: Arc<Expr>) -> Filter {
    match expr.as_ref() {
        Expr::And(children) => {
            let children_filters = to_filters(children);
            Box::new(move |doc: &Document| children_filters.iter().all(|f| f(doc)))
        }
        Expr::Or(children) => {
            let children_filters = to_filters(children);
            Box::new(move |doc: &Document| children_filters.iter().any(|f| f(doc)))
        }
        Expr::Not(child) => {
            let child_filter = to_filter(child.clone());
            Box::new(move |doc: &Document| !child_filter(doc))
        }
        Expr::Nor(children) => {
            let children_filters = to_filters(children);
            Box::new(move |doc: &Document| !children_filters.iter().any(|f| f(doc)))
        }
        Expr::AlwaysTrue => Box::new(|_| true),
        Expr::AlwaysFalse => Box::new(|_| false),
        Expr::FieldFilters { path, filters } => {
            let path = path.clone();
            let value_filters = to_value_filters(filters);
            Box::new(move |doc: &Document| {
                let values = get_path_values(doc, &path);
                value_filters.iter().all(|f| f(values.as_slice()))
            })
        }
        _ => panic!("Unsupported top-level filter: {:?}", expr),
    }
}

fn to_value_filters(filters: &[Arc<Expr>]) -> Vec<ValueFilter> {
    filters.iter().map(|f| to_value_filter(f.clone())).collect()
}

fn to_filters(children: &[Arc<Expr>]) -> Vec<Filter> {
    children.iter().map(|c| to_filter(c.clone())).collect()
}
