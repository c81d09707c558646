use std::fmt;
use bson::Document;

#[derive(Debug)]
pub enum Error {
    /// More than one atomic update targets the same field in a single call.
    Conflict(String),
    /// A top-level update key starts with `$` but is not a known operator.
    UnsupportedOperator { update: Document },
    /// A dot-path walks through a value that is neither a document nor a positional array.
    TraversalTypeError { path: String, document: Document },
    /// A positional (`$`) segment has no matching field in the originating query.
    PositionalResolutionError { key: String, query: Document },
    /// An operand or a target value does not have the type the operator requires.
    OperandTypeError { label: String, expected: &'static str, found: String },
    /// `$bit` was given a sub-operator other than `and` or `or`.
    UnknownSubOperator { operator: String, sub_operator: String },
    /// A query document could not be compiled into a filter.
    InvalidQuery(String),
    BsonDeError(bson::de::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Conflict(path) => {
                write!(f, "attempting more than one atomic update on {}", path)
            }
            Error::UnsupportedOperator { update } => {
                write!(f, "unsupported update: {}", update)
            }
            Error::TraversalTypeError { path, document } => {
                write!(f, "subfield must be object. {} not in {}", path, document)
            }
            Error::PositionalResolutionError { key, query } => {
                write!(f, "positional operator {} must be used on query key {}", key, query)
            }
            Error::OperandTypeError { label, expected, found } => {
                write!(f, "Expected {} for {} but got {}", expected, label, found)
            }
            Error::UnknownSubOperator { operator, sub_operator } => {
                write!(f, "{}.{} is not valid", operator, sub_operator)
            }
            Error::InvalidQuery(reason) => write!(f, "{}", reason),
            Error::BsonDeError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::BsonDeError(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
