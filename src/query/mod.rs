use std::sync::Arc;
use bson::{Bson, Document};
use crate::error::Result;

pub mod filters;
pub mod parser;

/// A compiled predicate over a document.
pub type Filter = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// Turns a query document into a [`Filter`].
///
/// Implementations must not mutate the query, and the filters they return must not mutate the
/// documents they are applied to.
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, query: &Document) -> Result<Filter>;
}

/// The default [`FilterCompiler`], understanding the MongoDB query operators listed in
/// [`parser::parse_conditions`].
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryFilterCompiler;

impl FilterCompiler for QueryFilterCompiler {
    fn compile(&self, query: &Document) -> Result<Filter> {
        let expr = parser::parse_conditions(query)?;
        Ok(filters::to_filter(expr))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal values
    Literal(Bson),
    /// Multiple filters on the same field (e.g., `{ "price": { "$ne": 1.99, "$exists": true } }`)
    FieldFilters {
        path: Vec<String>,
        filters: Vec<Arc<Expr>>, // List of filters on the same field
    },
    /// A single comparison (e.g., `$gt: 5`, `$eq: "Alice"`)
    Comparison {
        operator: ComparisonOperator,
        value: Arc<Expr>,
    },
    And(Vec<Arc<Expr>>),
    Or(Vec<Arc<Expr>>),
    Not(Arc<Expr>),
    Nor(Vec<Arc<Expr>>),
    /// Field existence
    Exists(bool),
    // Array-specific operations
    Size(usize),
    All(Arc<Expr>),
    /// `on_documents` is set when the filters are document conditions (`{ $elemMatch: { a: 1 } }`)
    /// rather than value predicates (`{ $elemMatch: { $gt: 1 } }`).
    ElemMatch {
        filters: Vec<Arc<Expr>>,
        on_documents: bool,
    },
    /// Represents an expression that is always true (e.g. $and: [])
    AlwaysTrue,
    /// Represents an expression that is always false (e.g. $or: [])
    AlwaysFalse,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

/// Collects every value a dot-separated path designates in `doc`.
///
/// Embedded documents are traversed by field name. When an array is met, a numeric component
/// selects an element by index, and each document element of the array is traversed as well,
/// so `items.sku` yields the `sku` of every document in `items`. A missing path yields nothing.
pub fn get_path_values<'a>(doc: &'a Document, path: &[String]) -> Vec<&'a Bson> {
    let mut values = Vec::new();
    if let Some((first, rest)) = path.split_first() {
        if let Some(value) = doc.get(first) {
            collect_path_values(value, rest, &mut values);
        }
    }
    values
}

fn collect_path_values<'a>(value: &'a Bson, path: &[String], out: &mut Vec<&'a Bson>) {
    let Some((component, rest)) = path.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(child) = doc.get(component) {
                collect_path_values(child, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = component.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect_path_values(item, rest, out);
                }
            }
            for item in items {
                if let Bson::Document(doc) = item {
                    if let Some(child) = doc.get(component) {
                        collect_path_values(child, rest, out);
                    }
                }
            }
        }
        _ => {}
    }
}
