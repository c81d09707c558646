use std::cmp::Ordering;
use std::collections::BTreeMap;
use bson::Bson;
use crate::util::typecast::Number;

/// Rank of a value's type in MongoDB's canonical sort order:
/// `MinKey < Null < Numbers < String < Document < Array < Binary < ObjectId`
/// `< Boolean < DateTime < Timestamp < RegularExpression < MaxKey`.
///
/// Deprecated variants (`Undefined`, `Symbol`, `DbPointer`, JavaScript code) share a rank just
/// below `MaxKey`.
pub fn type_rank(v: &Bson) -> u8 {
    use Bson::*;
    match v {
        MinKey                                    => 0,
        Null                                      => 1,
        Double(_) | Int32(_) | Int64(_) | Decimal128(_) => 2,
        String(_)                                 => 3,
        Document(_)                               => 4,
        Array(_)                                  => 5,
        Binary(_)                                 => 6,
        ObjectId(_)                               => 7,
        Boolean(_)                                => 8,
        DateTime(_)                               => 9,
        Timestamp(_)                              => 10,
        RegularExpression(_)                      => 11,
        MaxKey                                    => 13,
        _ /* legacy variants */                   => 12,
    }
}

/// Compare two [`Bson`] values using **MongoDB’s canonical sort order**.
///
/// MongoDB orders BSON values in two steps:
///
/// 1. **Type rank** – see [`type_rank`].
/// 2. **Within-type comparison** – numbers by numeric value (handling cross-family
///    comparisons), strings lexicographically, documents by key then by value (prefix wins),
///    arrays element-by-element (prefix wins), binary by subtype first then bytes, etc.
pub fn cmp_bson(a: &Bson, b: &Bson) -> Ordering {
    use Bson::*;

    // Different BSON kinds → compare by rank.
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    // Same kind → value-specific comparison.
    match (a, b) {
        // numeric family
        (Double(x), Double(y))           => x.partial_cmp(y).unwrap_or(Ordering::Greater),
        (Int32(x),  Int32(y))            => x.cmp(y),
        (Int64(x),  Int64(y))            => x.cmp(y),
        (Decimal128(x), Decimal128(y))   => x.to_string().cmp(&y.to_string()),

        // cross-numeric
        (Int32(x),  Double(y))           => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Less),
        (Int64(x),  Double(y))           => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Less),
        (Double(x), Int32(y))            => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Greater),
        (Double(x), Int64(y))            => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Greater),
        (Int32(x),  Int64(y))            => (*x as i64).cmp(y),
        (Int64(x),  Int32(y))            => x.cmp(&(*y as i64)),

        // simple scalars
        (String(x), String(y))           => x.cmp(y),
        (Boolean(x), Boolean(y))         => x.cmp(y),
        (DateTime(x), DateTime(y))       => x.cmp(y),
        (ObjectId(x), ObjectId(y))       => x.bytes().cmp(&y.bytes()),
        (Timestamp(x), Timestamp(y))     => (x.time, x.increment).cmp(&(y.time, y.increment)),

        // binary
        (Binary(x), Binary(y)) => match u8::from(x.subtype).cmp(&u8::from(y.subtype)) {
            Ordering::Equal => x.bytes.cmp(&y.bytes),
            other           => other,
        },

        // regex
        (RegularExpression(x), RegularExpression(y)) => match x.pattern.cmp(&y.pattern) {
            Ordering::Equal => x.options.cmp(&y.options),
            other           => other,
        },

        // compound types
        (Array(av), Array(bv)) => {
            for (ai, bi) in av.iter().zip(bv.iter()) {
                let ord = cmp_bson(ai, bi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            av.len().cmp(&bv.len())
        }
        (Document(ad), Document(bd)) => {
            for ((ak, av), (bk, bv)) in ad.iter().zip(bd.iter()) {
                match ak.cmp(bk) {
                    Ordering::Equal => {
                        let ord = cmp_bson(av, bv);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    other => return other,
                }
            }
            ad.len().cmp(&bd.len())
        }

        // identical MinKey / MaxKey / Null, etc.
        _ => Ordering::Equal,
    }
}

/// Value equality as used by the filters: numbers compare across representations, `NaN` equals
/// `NaN` and documents compare field-wise regardless of order.
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    values_equal(a, b, true)
}

/// Value equality as used by the array operators. Same as [`bson_eq`] except that numbers of
/// different types are never equal: `Int32(1)` and `Int64(1)` are distinct set members.
pub fn bson_strict_eq(a: &Bson, b: &Bson) -> bool {
    values_equal(a, b, false)
}

fn values_equal(a: &Bson, b: &Bson, across_numbers: bool) -> bool {
    match (a, b) {
        // NaN == NaN
        (Bson::Double(x), Bson::Double(y)) => x == y || (x.is_nan() && y.is_nan()),

        (Bson::Int32(x), Bson::Int64(y)) if across_numbers => *x as i64 == *y,
        (Bson::Int64(x), Bson::Int32(y)) if across_numbers => *x == *y as i64,
        (Bson::Int32(x), Bson::Double(y)) if across_numbers => *x as f64 == *y,
        (Bson::Double(x), Bson::Int32(y)) if across_numbers => *x == *y as f64,
        (Bson::Int64(x), Bson::Double(y)) if across_numbers => *x as f64 == *y,
        (Bson::Double(x), Bson::Int64(y)) if across_numbers => *x == *y as f64,

        (Bson::Document(a), Bson::Document(b)) => {
            let a_sorted: BTreeMap<_, _> = a.iter().collect();
            let b_sorted: BTreeMap<_, _> = b.iter().collect();
            a_sorted.len() == b_sorted.len()
                && a_sorted
                    .iter()
                    .zip(b_sorted.iter())
                    .all(|((ak, av), (bk, bv))| ak == bk && values_equal(av, bv, across_numbers))
        }

        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| values_equal(x, y, across_numbers))
        }

        _ => a == b,
    }
}

/// Adds `amount` to `current`.
///
/// If either side is a double the result is a double. Otherwise the result keeps the type of
/// `current` and `amount` is narrowed to 32 bits first, so an int64 amount added to an int64
/// field loses its upper bits. Integer sums wrap on overflow.
pub fn add_numeric(current: Number, amount: Number) -> Number {
    if current.is_floating() || amount.is_floating() {
        Number::Double(current.as_f64() + amount.as_f64())
    } else if let Number::Int32(current) = current {
        Number::Int32(current.wrapping_add(amount.as_i32()))
    } else {
        Number::Int64(current.as_i64().wrapping_add(amount.as_i32() as i64))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
}

/// Applies a bitwise operation, widening to 64 bits when either side is an int64.
pub fn perform_bitwise_op(current: Number, operand: Number, op: BitwiseOp) -> Number {
    let wide = matches!(current, Number::Int64(_)) || matches!(operand, Number::Int64(_));
    if wide {
        let (l, r) = (current.as_i64(), operand.as_i64());
        Number::Int64(match op {
            BitwiseOp::And => l & r,
            BitwiseOp::Or => l | r,
        })
    } else {
        let (l, r) = (current.as_i32(), operand.as_i32());
        Number::Int32(match op {
            BitwiseOp::And => l & r,
            BitwiseOp::Or => l | r,
        })
    }
}
