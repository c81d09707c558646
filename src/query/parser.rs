use std::sync::Arc;
use bson::{Bson, Document};
use crate::error::{Error, Result};
use crate::query::{ComparisonOperator, ComparisonOperator::*, Expr};

/// Parses a BSON `Document` representing a query filter into an `Expr`.
///
/// Supported are the logical operators `$and`, `$or` and `$nor`, implicit equality on
/// dot-separated field paths and the field operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
/// `$in`, `$nin`, `$exists`, `$size`, `$all`, `$elemMatch` and `$not`.
pub fn parse_conditions(doc: &Document) -> Result<Arc<Expr>> {
    let mut conditions = Vec::new();

    for (key, value) in doc.iter() {
        match key.as_str() {
            // Logical Operators
            "$and" | "$or" | "$nor" => {
                conditions.push(Arc::new(parse_logical_operator(key, value)?));
            }
            _ if key.starts_with('$') => {
                return Err(Error::InvalidQuery(format!("Unknown top level operator: {}", key)));
            }
            _ => {
                conditions.push(Arc::new(Expr::FieldFilters {
                    path: parse_field_path(key)?,
                    filters: parse_predicates(value)?,
                }));
            }
        }
    }

    // Combine conditions into an `And` if there are multiple
    match conditions.len() {
        0 => Ok(Arc::new(Expr::AlwaysTrue)),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Arc::new(Expr::And(conditions))),
    }
}

/// Parses logical operators ($and, $or, $nor) into an `Expr`.
fn parse_logical_operator(operator: &str, value: &Bson) -> Result<Expr> {
    let Bson::Array(sub_docs) = value else {
        return Err(Error::InvalidQuery(format!(
            "Invalid format for {}; must be an array",
            operator
        )));
    };

    let mut parsed_conditions = Vec::with_capacity(sub_docs.len());
    for bson in sub_docs {
        if let Bson::Document(sub_doc) = bson {
            parsed_conditions.push(parse_conditions(sub_doc)?);
        } else {
            return Err(Error::InvalidQuery(format!(
                "Invalid format for {}; must be an array of documents",
                operator
            )));
        }
    }

    Ok(match (operator, parsed_conditions.is_empty()) {
        ("$and", true) | ("$nor", true) => Expr::AlwaysTrue,
        ("$or", true) => Expr::AlwaysFalse,
        ("$and", false) => Expr::And(parsed_conditions),
        ("$or", false) => Expr::Or(parsed_conditions),
        _ => Expr::Nor(parsed_conditions),
    })
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(doc) => doc.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Parses predicate conditions (e.g., `$eq`, `$gt`) for a specific field. A value that is not
/// an operator document is an implicit `$eq`.
fn parse_predicates(value: &Bson) -> Result<Vec<Arc<Expr>>> {
    let operators = match value {
        Bson::Document(doc) if is_operator_document(value) => doc,
        _ => return Ok(vec![new_predicate(Eq, value)]),
    };

    let mut predicates = Vec::with_capacity(operators.len());
    for (key, value) in operators.iter() {
        match key.as_str() {
            // Comparison Operators
            "$eq" => predicates.push(new_predicate(Eq, value)),
            "$ne" => predicates.push(new_predicate(Ne, value)),
            "$gt" => predicates.push(new_predicate(Gt, value)),
            "$gte" => predicates.push(new_predicate(Gte, value)),
            "$lt" => predicates.push(new_predicate(Lt, value)),
            "$lte" => predicates.push(new_predicate(Lte, value)),
            "$in" | "$nin" => {
                if !matches!(value, Bson::Array(_)) {
                    return Err(Error::InvalidQuery(format!("{} needs an array", key)));
                }
                let operator = if key == "$in" { In } else { Nin };
                predicates.push(new_predicate(operator, value));
            }
            "$exists" => {
                if let Bson::Boolean(exists) = value {
                    predicates.push(Arc::new(Expr::Exists(*exists)));
                } else {
                    return Err(Error::InvalidQuery("$exists must be a boolean".to_string()));
                }
            }
            "$size" => {
                let size = match value {
                    Bson::Int32(i) if *i >= 0 => *i as usize,
                    Bson::Int64(i) if *i >= 0 => *i as usize,
                    _ => {
                        return Err(Error::InvalidQuery(
                            "$size must be a non-negative integer".to_string(),
                        ))
                    }
                };
                predicates.push(Arc::new(Expr::Size(size)));
            }
            "$all" => {
                if !matches!(value, Bson::Array(_)) {
                    return Err(Error::InvalidQuery("$all needs an array".to_string()));
                }
                predicates.push(Arc::new(Expr::All(Arc::new(Expr::Literal(value.clone())))));
            }
            "$elemMatch" => predicates.push(Arc::new(parse_elem_match(value)?)),
            "$not" => {
                if !is_operator_document(value) {
                    return Err(Error::InvalidQuery(
                        "$not needs a document of operators".to_string(),
                    ));
                }
                let mut negated = parse_predicates(value)?;
                let child = if negated.len() == 1 {
                    negated.remove(0)
                } else {
                    Arc::new(Expr::And(negated))
                };
                predicates.push(Arc::new(Expr::Not(child)));
            }
            _ => {
                return Err(Error::InvalidQuery(format!("Unknown operator: {}", key)));
            }
        }
    }
    Ok(predicates)
}

fn parse_elem_match(value: &Bson) -> Result<Expr> {
    let Bson::Document(doc) = value else {
        return Err(Error::InvalidQuery("$elemMatch needs an Object".to_string()));
    };

    if is_operator_document(value) {
        Ok(Expr::ElemMatch { filters: parse_predicates(value)?, on_documents: false })
    } else {
        Ok(Expr::ElemMatch { filters: vec![parse_conditions(doc)?], on_documents: true })
    }
}

fn new_predicate(operator: ComparisonOperator, value: &Bson) -> Arc<Expr> {
    Arc::new(Expr::Comparison {
        operator,
        value: Arc::new(Expr::Literal(value.clone())),
    })
}

fn parse_field_path(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Err(Error::InvalidQuery("Field name cannot be empty".to_string()));
    }
    Ok(path.split('.').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn eq(value: impl Into<Bson>) -> Arc<Expr> {
        new_predicate(Eq, &value.into())
    }

    #[test]
    fn test_parse_implicit_equality() {
        let expr = parse_conditions(&doc! { "a.b": 1 }).unwrap();
        assert_eq!(
            expr.as_ref(),
            &Expr::FieldFilters {
                path: vec!["a".to_string(), "b".to_string()],
                filters: vec![eq(1)],
            }
        );
    }

    #[test]
    fn test_parse_document_literal_is_equality() {
        let expr = parse_conditions(&doc! { "a": { "b": 1 } }).unwrap();
        assert_eq!(
            expr.as_ref(),
            &Expr::FieldFilters {
                path: vec!["a".to_string()],
                filters: vec![eq(doc! { "b": 1 })],
            }
        );
    }

    #[test]
    fn test_parse_multiple_fields_and_operators() {
        let expr = parse_conditions(&doc! { "a": { "$gt": 1, "$lt": 5 }, "b": 2 }).unwrap();
        match expr.as_ref() {
            Expr::And(children) => {
                assert_eq!(children.len(), 2);
                match children[0].as_ref() {
                    Expr::FieldFilters { filters, .. } => assert_eq!(filters.len(), 2),
                    other => panic!("unexpected expression: {:?}", other),
                }
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_operators() {
        let expr = parse_conditions(&doc! { "$or": [ { "a": 1 }, { "b": 2 } ] }).unwrap();
        assert!(matches!(expr.as_ref(), Expr::Or(children) if children.len() == 2));

        let expr = parse_conditions(&doc! { "$or": [] }).unwrap();
        assert_eq!(expr.as_ref(), &Expr::AlwaysFalse);

        let expr = parse_conditions(&doc! {}).unwrap();
        assert_eq!(expr.as_ref(), &Expr::AlwaysTrue);
    }

    #[test]
    fn test_parse_elem_match() {
        let expr = parse_conditions(&doc! { "a": { "$elemMatch": { "b": 1 } } }).unwrap();
        match expr.as_ref() {
            Expr::FieldFilters { filters, .. } => {
                assert!(matches!(filters[0].as_ref(), Expr::ElemMatch { on_documents: true, .. }));
            }
            other => panic!("unexpected expression: {:?}", other),
        }

        let expr = parse_conditions(&doc! { "a": { "$elemMatch": { "$gte": 1 } } }).unwrap();
        match expr.as_ref() {
            Expr::FieldFilters { filters, .. } => {
                assert!(matches!(filters[0].as_ref(), Expr::ElemMatch { on_documents: false, .. }));
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_conditions(&doc! { "$where": "x" }).is_err());
        assert!(parse_conditions(&doc! { "a": { "$regex": "x" } }).is_err());
        assert!(parse_conditions(&doc! { "a": { "$in": 1 } }).is_err());
        assert!(parse_conditions(&doc! { "a": { "$exists": 1 } }).is_err());
        assert!(parse_conditions(&doc! { "a": { "$size": -1 } }).is_err());
        assert!(parse_conditions(&doc! { "$and": { "a": 1 } }).is_err());
        assert!(parse_conditions(&doc! { "a": { "$not": 1 } }).is_err());
    }
}
