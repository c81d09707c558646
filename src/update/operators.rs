use std::collections::HashMap;
use bson::Bson;
use crate::error::{Error, Result};
use crate::update::path::Slot;
use crate::util::bson_utils::{add_numeric, bson_strict_eq, perform_bitwise_op, BitwiseOp};
use crate::util::typecast::{
    as_array, as_number, required_array, required_document, required_number, type_error,
};

type MergeFn = fn(&UpdateOperator, Slot<'_>, &Bson) -> Result<()>;

/// An update operator: its name, whether it creates the missing documents along a path, and
/// how it merges an operand into the targeted field.
pub struct UpdateOperator {
    pub name: &'static str,
    pub create_missing: bool,
    merge: MergeFn,
}

impl UpdateOperator {
    pub(crate) fn merge(&self, slot: Slot<'_>, operand: &Bson) -> Result<()> {
        (self.merge)(self, slot, operand)
    }
}

impl std::fmt::Debug for UpdateOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOperator")
            .field("name", &self.name)
            .field("create_missing", &self.create_missing)
            .finish()
    }
}

static OPERATORS: [UpdateOperator; 10] = [
    UpdateOperator { name: "$set", create_missing: true, merge: merge_set },
    UpdateOperator { name: "$inc", create_missing: true, merge: merge_inc },
    UpdateOperator { name: "$unset", create_missing: false, merge: merge_unset },
    UpdateOperator { name: "$push", create_missing: true, merge: merge_push },
    UpdateOperator { name: "$pushAll", create_missing: true, merge: merge_push_all },
    UpdateOperator { name: "$addToSet", create_missing: true, merge: merge_add_to_set },
    UpdateOperator { name: "$pop", create_missing: false, merge: merge_pop },
    UpdateOperator { name: "$pull", create_missing: false, merge: merge_pull },
    UpdateOperator { name: "$pullAll", create_missing: false, merge: merge_pull_all },
    UpdateOperator { name: "$bit", create_missing: false, merge: merge_bit },
];

/// Lookup of the update operators by name.
pub(crate) struct OperatorCatalog {
    operators: HashMap<&'static str, &'static UpdateOperator>,
}

impl OperatorCatalog {
    pub fn new() -> Self {
        let operators = OPERATORS.iter().map(|op| (op.name, op)).collect();
        Self { operators }
    }

    pub fn get(&self, name: &str) -> Option<&'static UpdateOperator> {
        self.operators.get(name).copied()
    }

    /// The operator names, in catalog order.
    pub fn names(&self) -> Vec<&'static str> {
        OPERATORS.iter().map(|op| op.name).collect()
    }
}

fn value_label(op: &UpdateOperator) -> String {
    format!("{} value", op.name)
}

fn merge_set(_op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    slot.set(operand.clone());
    Ok(())
}

fn merge_inc(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    let amount = required_number(&value_label(op), operand)?;
    let label = format!("{} value", slot.key());
    let result = match as_number(&label, slot.get())? {
        Some(current) => add_numeric(current, amount),
        None => amount,
    };
    slot.set(result.into());
    Ok(())
}

fn merge_unset(_op: &UpdateOperator, mut slot: Slot<'_>, _operand: &Bson) -> Result<()> {
    slot.remove();
    Ok(())
}

fn append(mut slot: Slot<'_>, values: &[Bson]) -> Result<()> {
    let label = slot.key();
    match slot.get_mut() {
        Some(Bson::Array(list)) => list.extend_from_slice(values),
        None | Some(Bson::Null) => slot.set(Bson::Array(values.to_vec())),
        Some(other) => return Err(type_error(&label, "an array", other)),
    }
    Ok(())
}

fn merge_push(_op: &UpdateOperator, slot: Slot<'_>, operand: &Bson) -> Result<()> {
    append(slot, std::slice::from_ref(operand))
}

fn merge_push_all(op: &UpdateOperator, slot: Slot<'_>, operand: &Bson) -> Result<()> {
    let values = required_array(&value_label(op), operand)?;
    append(slot, values)
}

fn merge_add_to_set(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    let label = slot.key();
    let mut list = as_array(&label, slot.get())?.cloned().unwrap_or_default();

    let values = match operand {
        Bson::Document(spec) if spec.contains_key("$each") => {
            let each = spec.get("$each").unwrap_or(&Bson::Null);
            required_array(&format!("{}.$each value", op.name), each)?.as_slice()
        }
        _ => std::slice::from_ref(operand),
    };

    for value in values {
        if !list.iter().any(|item| bson_strict_eq(item, value)) {
            list.push(value.clone());
        }
    }
    slot.set(Bson::Array(list));
    Ok(())
}

fn merge_pop(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    match as_array(op.name, slot.get())? {
        Some(list) if !list.is_empty() => {}
        _ => return Ok(()),
    }
    let direction = required_number(op.name, operand)?.as_i32();
    if let Some(Bson::Array(list)) = slot.get_mut() {
        if direction > 0 {
            list.pop();
        } else {
            list.remove(0);
        }
    }
    Ok(())
}

fn merge_pull(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    if let Bson::Document(_) = operand {
        return Err(type_error(op.name, "a non-document value", operand));
    }
    let label = format!("{} target", op.name);
    as_array(&label, slot.get())?;
    if let Some(Bson::Array(list)) = slot.get_mut() {
        list.retain(|item| !bson_strict_eq(item, operand));
    }
    Ok(())
}

fn merge_pull_all(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    let label = format!("{} target", op.name);
    match as_array(&label, slot.get())? {
        Some(list) if !list.is_empty() => {}
        _ => return Ok(()),
    }
    let values = required_array(op.name, operand)?;
    if let Some(Bson::Array(list)) = slot.get_mut() {
        list.retain(|item| !values.iter().any(|value| bson_strict_eq(item, value)));
    }
    Ok(())
}

fn merge_bit(op: &UpdateOperator, mut slot: Slot<'_>, operand: &Bson) -> Result<()> {
    let label = format!("{} target", op.name);
    let Some(mut current) = as_number(&label, slot.get())? else {
        return Ok(());
    };
    if current.is_floating() {
        return Err(type_error(&label, "an integer", &Bson::from(current)));
    }

    for (sub_operator, value) in required_document(op.name, operand)? {
        let value = required_number(&format!("{}.{}", op.name, sub_operator), value)?;
        let bitwise_op = match sub_operator.as_str() {
            "and" => BitwiseOp::And,
            "or" => BitwiseOp::Or,
            _ => {
                return Err(Error::UnknownSubOperator {
                    operator: op.name.to_string(),
                    sub_operator: sub_operator.clone(),
                })
            }
        };
        current = perform_bitwise_op(current, value, bitwise_op);
    }
    slot.set(current.into());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Document};

    fn merge(name: &str, document: &mut Document, field: &str, operand: Bson) -> Result<()> {
        let catalog = OperatorCatalog::new();
        let op = catalog.get(name).unwrap();
        op.merge(Slot::Field { owner: document, name: field }, &operand)
    }

    #[test]
    fn test_catalog() {
        let catalog = OperatorCatalog::new();
        assert_eq!(catalog.names().len(), 10);
        assert!(catalog.get("$set").unwrap().create_missing);
        assert!(!catalog.get("$unset").unwrap().create_missing);
        assert!(!catalog.get("$bit").unwrap().create_missing);
        assert!(catalog.get("$rename").is_none());
    }

    #[test]
    fn test_set() {
        let mut document = doc! { "a": 1 };
        merge("$set", &mut document, "a", Bson::String("x".to_string())).unwrap();
        merge("$set", &mut document, "b", Bson::Array(vec![])).unwrap();
        assert_eq!(document, doc! { "a": "x", "b": [] });
    }

    #[test]
    fn test_inc() {
        let mut document = doc! { "i": 1, "l": 10i64, "d": 1.5, "n": null };
        merge("$inc", &mut document, "i", Bson::Int32(2)).unwrap();
        merge("$inc", &mut document, "l", Bson::Int32(5)).unwrap();
        merge("$inc", &mut document, "d", Bson::Int32(1)).unwrap();
        merge("$inc", &mut document, "n", Bson::Int64(7)).unwrap();
        merge("$inc", &mut document, "new", Bson::Double(0.5)).unwrap();
        assert_eq!(document, doc! { "i": 3, "l": 15i64, "d": 2.5, "n": 7i64, "new": 0.5 });
    }

    #[test]
    fn test_inc_promotes_to_double() {
        let mut document = doc! { "i": 1 };
        merge("$inc", &mut document, "i", Bson::Double(0.5)).unwrap();
        assert_eq!(document, doc! { "i": 1.5 });
    }

    #[test]
    fn test_inc_narrows_int64_amount() {
        let mut document = doc! { "l": 1i64 };
        merge("$inc", &mut document, "l", Bson::Int64((1 << 32) + 1)).unwrap();
        assert_eq!(document, doc! { "l": 2i64 });
    }

    #[test]
    fn test_inc_type_errors() {
        let mut document = doc! { "s": "x" };
        let err = merge("$inc", &mut document, "s", Bson::Int32(1)).unwrap_err();
        assert!(matches!(err, Error::OperandTypeError { ref label, .. } if label == "s value"));
        let err = merge("$inc", &mut document, "n", Bson::String("1".to_string())).unwrap_err();
        assert!(matches!(err, Error::OperandTypeError { ref label, .. } if label == "$inc value"));
    }

    #[test]
    fn test_unset() {
        let mut document = doc! { "a": 1, "b": 2 };
        merge("$unset", &mut document, "a", Bson::Int32(1)).unwrap();
        merge("$unset", &mut document, "a", Bson::Int32(1)).unwrap();
        assert_eq!(document, doc! { "b": 2 });
    }

    #[test]
    fn test_push_and_push_all() {
        let mut document = doc! { "a": [1] };
        merge("$push", &mut document, "a", Bson::Int32(2)).unwrap();
        merge("$push", &mut document, "b", Bson::Array(vec![Bson::Int32(1)])).unwrap();
        merge("$pushAll", &mut document, "a", Bson::Array(vec![Bson::Int32(3), Bson::Int32(4)])).unwrap();
        merge("$pushAll", &mut document, "c", Bson::Array(vec![Bson::Int32(5)])).unwrap();
        assert_eq!(document, doc! { "a": [1, 2, 3, 4], "b": [[1]], "c": [5] });

        assert!(merge("$pushAll", &mut document, "a", Bson::Int32(1)).is_err());
        let mut document = doc! { "s": 1 };
        assert!(merge("$push", &mut document, "s", Bson::Int32(1)).is_err());
    }

    #[test]
    fn test_add_to_set() {
        let mut document = doc! { "a": [1, 2] };
        merge("$addToSet", &mut document, "a", Bson::Int32(2)).unwrap();
        merge("$addToSet", &mut document, "a", Bson::Int32(3)).unwrap();
        merge("$addToSet", &mut document, "b", Bson::String("x".to_string())).unwrap();
        assert_eq!(document, doc! { "a": [1, 2, 3], "b": ["x"] });
    }

    #[test]
    fn test_add_to_set_each() {
        let mut document = doc! { "a": [1] };
        let each = Bson::Document(doc! { "$each": [2, 1, 3, 2] });
        merge("$addToSet", &mut document, "a", each).unwrap();
        assert_eq!(document, doc! { "a": [1, 2, 3] });

        let err = merge("$addToSet", &mut document, "a", Bson::Document(doc! { "$each": null })).unwrap_err();
        assert!(matches!(err, Error::OperandTypeError { .. }));
        assert!(merge("$addToSet", &mut document, "a", Bson::Document(doc! { "$each": 1 })).is_err());

        merge("$addToSet", &mut document, "a", Bson::Document(doc! { "x": 1 })).unwrap();
        assert_eq!(document, doc! { "a": [1, 2, 3, { "x": 1 }] });
    }

    #[test]
    fn test_add_to_set_compares_exactly() {
        let mut document = doc! { "d": [1e-20], "n": [1] };
        merge("$addToSet", &mut document, "d", Bson::Double(2e-20)).unwrap();
        merge("$addToSet", &mut document, "n", Bson::Int64(1)).unwrap();
        merge("$addToSet", &mut document, "n", Bson::Int32(1)).unwrap();
        assert_eq!(document, doc! { "d": [1e-20, 2e-20], "n": [1, 1i64] });
    }

    #[test]
    fn test_pull_and_pull_all_compare_exactly() {
        let mut document = doc! { "d": [0.3, 1.0], "n": [1, 1i64, 1.0] };
        merge("$pull", &mut document, "d", Bson::Double(0.1 + 0.2)).unwrap();
        merge("$pullAll", &mut document, "n", Bson::Array(vec![Bson::Int64(1)])).unwrap();
        assert_eq!(document, doc! { "d": [0.3, 1.0], "n": [1, 1.0] });
    }

    #[test]
    fn test_pop() {
        let mut document = doc! { "a": [1, 2, 3], "e": [] };
        merge("$pop", &mut document, "a", Bson::Int32(1)).unwrap();
        assert_eq!(document.get_array("a").unwrap(), &vec![Bson::Int32(1), Bson::Int32(2)]);
        merge("$pop", &mut document, "a", Bson::Int32(-1)).unwrap();
        assert_eq!(document.get_array("a").unwrap(), &vec![Bson::Int32(2)]);

        // Nothing to pop, the operand is never looked at
        merge("$pop", &mut document, "e", Bson::String("x".to_string())).unwrap();
        merge("$pop", &mut document, "missing", Bson::Int32(1)).unwrap();
        assert!(merge("$pop", &mut document, "a", Bson::String("x".to_string())).is_err());
    }

    #[test]
    fn test_pull() {
        let mut document = doc! { "a": [1, 2, 1, 3i64] };
        merge("$pull", &mut document, "a", Bson::Int32(1)).unwrap();
        merge("$pull", &mut document, "a", Bson::Int32(3)).unwrap();
        assert_eq!(document, doc! { "a": [2, 3i64] });
        merge("$pull", &mut document, "a", Bson::Int64(3)).unwrap();
        assert_eq!(document, doc! { "a": [2] });

        merge("$pull", &mut document, "missing", Bson::Int32(1)).unwrap();
        assert!(merge("$pull", &mut document, "a", Bson::Document(doc! { "$gt": 1 })).is_err());
    }

    #[test]
    fn test_pull_all() {
        let mut document = doc! { "a": [1, 2, 3, 2] };
        merge("$pullAll", &mut document, "a", Bson::Array(vec![Bson::Int32(2), Bson::Int32(3)])).unwrap();
        assert_eq!(document, doc! { "a": [1] });
        assert!(merge("$pullAll", &mut document, "a", Bson::Int32(1)).is_err());
        merge("$pullAll", &mut document, "missing", Bson::Int32(1)).unwrap();
    }

    #[test]
    fn test_bit() {
        let mut document = doc! { "f": 5, "l": 5i64 };
        merge("$bit", &mut document, "f", Bson::Document(doc! { "and": 3 })).unwrap();
        assert_eq!(document.get("f"), Some(&Bson::Int32(1)));
        merge("$bit", &mut document, "f", Bson::Document(doc! { "or": 6, "and": 3 })).unwrap();
        assert_eq!(document.get("f"), Some(&Bson::Int32(3)));
        merge("$bit", &mut document, "l", Bson::Document(doc! { "or": 2 })).unwrap();
        assert_eq!(document.get("l"), Some(&Bson::Int64(7)));
    }

    #[test]
    fn test_bit_errors() {
        let mut document = doc! { "d": 1.5, "f": 1 };
        let err = merge("$bit", &mut document, "d", Bson::Document(doc! { "and": 1 })).unwrap_err();
        assert!(matches!(err, Error::OperandTypeError { .. }));

        let err = merge("$bit", &mut document, "f", Bson::Document(doc! { "xor": 1 })).unwrap_err();
        match err {
            Error::UnknownSubOperator { operator, sub_operator } => {
                assert_eq!(operator, "$bit");
                assert_eq!(sub_operator, "xor");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // The value is checked before the sub-operator name
        let err = merge("$bit", &mut document, "f", Bson::Document(doc! { "xor": "x" })).unwrap_err();
        assert!(matches!(err, Error::OperandTypeError { ref label, .. } if label == "$bit.xor"));

        // Absent target
        merge("$bit", &mut document, "missing", Bson::Document(doc! { "and": 1 })).unwrap();
        assert!(!document.contains_key("missing"));
    }
}
