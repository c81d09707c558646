use bson::{Bson, Document};
use crate::error::{Error, Result};

/// A numeric BSON value. Only these three representations take part in arithmetic.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl Number {

    pub fn is_floating(&self) -> bool {
        matches!(self, Number::Double(_))
    }

    /// Narrows to 32 bits: integers are truncated (two's complement), doubles are truncated
    /// toward zero and saturate.
    pub fn as_i32(&self) -> i32 {
        match *self {
            Number::Int32(v) => v,
            Number::Int64(v) => v as i32,
            Number::Double(v) => v as i32,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Number::Int32(v) => v as i64,
            Number::Int64(v) => v,
            Number::Double(v) => v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Int32(v) => v as f64,
            Number::Int64(v) => v as f64,
            Number::Double(v) => v,
        }
    }
}

impl From<Number> for Bson {
    fn from(number: Number) -> Self {
        match number {
            Number::Int32(v) => Bson::Int32(v),
            Number::Int64(v) => Bson::Int64(v),
            Number::Double(v) => Bson::Double(v),
        }
    }
}

/// Casts `value` to a number. Absent and `null` values yield `None`.
pub fn as_number(label: &str, value: Option<&Bson>) -> Result<Option<Number>> {
    match value {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Int32(v)) => Ok(Some(Number::Int32(*v))),
        Some(Bson::Int64(v)) => Ok(Some(Number::Int64(*v))),
        Some(Bson::Double(v)) => Ok(Some(Number::Double(*v))),
        Some(other) => Err(type_error(label, "a number", other)),
    }
}

/// Casts `value` to an array. Absent and `null` values yield `None`.
pub fn as_array<'a>(label: &str, value: Option<&'a Bson>) -> Result<Option<&'a Vec<Bson>>> {
    match value {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Array(array)) => Ok(Some(array)),
        Some(other) => Err(type_error(label, "an array", other)),
    }
}

/// Casts `value` to a document. Absent and `null` values yield `None`.
pub fn as_document<'a>(label: &str, value: Option<&'a Bson>) -> Result<Option<&'a Document>> {
    match value {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Document(doc)) => Ok(Some(doc)),
        Some(other) => Err(type_error(label, "a document", other)),
    }
}

pub fn required_number(label: &str, value: &Bson) -> Result<Number> {
    as_number(label, Some(value))?.ok_or_else(|| type_error(label, "a number", value))
}

pub fn required_array<'a>(label: &str, value: &'a Bson) -> Result<&'a Vec<Bson>> {
    as_array(label, Some(value))?.ok_or_else(|| type_error(label, "an array", value))
}

pub fn required_document<'a>(label: &str, value: &'a Bson) -> Result<&'a Document> {
    as_document(label, Some(value))?.ok_or_else(|| type_error(label, "a document", value))
}

pub fn type_error(label: &str, expected: &'static str, found: &Bson) -> Error {
    Error::OperandTypeError {
        label: label.to_string(),
        expected,
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_as_number() {
        assert_eq!(as_number("x", Some(&Bson::Int32(3))).unwrap(), Some(Number::Int32(3)));
        assert_eq!(as_number("x", Some(&Bson::Int64(3))).unwrap(), Some(Number::Int64(3)));
        assert_eq!(as_number("x", Some(&Bson::Double(1.5))).unwrap(), Some(Number::Double(1.5)));
        assert_eq!(as_number("x", None).unwrap(), None);
        assert_eq!(as_number("x", Some(&Bson::Null)).unwrap(), None);
    }

    #[test]
    fn test_as_number_wrong_type_names_label() {
        let err = as_number("$inc value", Some(&Bson::String("a".to_string()))).unwrap_err();
        match err {
            Error::OperandTypeError { label, expected, .. } => {
                assert_eq!(label, "$inc value");
                assert_eq!(expected, "a number");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_as_array_and_document() {
        let array = Bson::Array(vec![Bson::Int32(1)]);
        assert_eq!(as_array("x", Some(&array)).unwrap().unwrap().len(), 1);
        assert!(as_array("x", Some(&Bson::Int32(1))).is_err());

        let doc = Bson::Document(doc! { "a": 1 });
        assert!(as_document("x", Some(&doc)).unwrap().unwrap().contains_key("a"));
        assert!(as_document("x", Some(&array)).is_err());
    }

    #[test]
    fn test_required_rejects_null() {
        assert!(required_number("x", &Bson::Null).is_err());
        assert!(required_array("x", &Bson::Null).is_err());
        assert!(required_document("x", &Bson::Null).is_err());
    }

    #[test]
    fn test_narrowing() {
        assert_eq!(Number::Int64(1 << 32).as_i32(), 0);
        assert_eq!(Number::Int64((1 << 32) + 7).as_i32(), 7);
        assert_eq!(Number::Double(2.9).as_i32(), 2);
        assert_eq!(Number::Double(-2.9).as_i64(), -2);
        assert_eq!(Number::Double(1e20).as_i32(), i32::MAX);
    }
}
