//! Operations on values: arithmetic, comparison, access and iteration

use std::cmp::Ordering;

use super::ast::BinaryOp;
use crate::error::EvalError;
use crate::value::{Function, Value};

/// Longest string (in bytes) or list an operator may build by default
pub const DEFAULT_MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Apply a binary operator to two evaluated operands
///
/// `max_len` bounds the strings and lists built by `+` and `*`.
pub fn binary(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    max_len: usize,
) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => add(lhs, rhs, max_len),
        BinaryOp::Sub => arithmetic(op, lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => multiply(lhs, rhs, max_len),
        BinaryOp::Div => {
            let (a, b) = float_operands(op, lhs, rhs)?;
            if b == 0.0 {
                return Err(EvalError::zero_division());
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::FloorDiv => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::zero_division()),
            (Value::Int(a), Value::Int(b)) => {
                let q = a.checked_div(*b).ok_or_else(overflow)?;
                Ok(Value::Int(if a % b != 0 && (*a < 0) != (*b < 0) { q - 1 } else { q }))
            }
            _ => {
                let (a, b) = float_operands(op, lhs, rhs)?;
                if b == 0.0 {
                    return Err(EvalError::zero_division());
                }
                Ok(Value::Float((a / b).floor()))
            }
        },
        BinaryOp::Mod => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(EvalError::zero_division()),
            (Value::Int(a), Value::Int(b)) => {
                let r = a.checked_rem(*b).ok_or_else(overflow)?;
                Ok(Value::Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
            }
            _ => {
                let (a, b) = float_operands(op, lhs, rhs)?;
                if b == 0.0 {
                    return Err(EvalError::zero_division());
                }
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        },
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!lhs.loose_eq(rhs))),
        BinaryOp::Less => ordered(op, lhs, rhs, Ordering::is_lt),
        BinaryOp::LessEq => ordered(op, lhs, rhs, Ordering::is_le),
        BinaryOp::Greater => ordered(op, lhs, rhs, Ordering::is_gt),
        BinaryOp::GreaterEq => ordered(op, lhs, rhs, Ordering::is_ge),
        BinaryOp::In => contains(rhs, lhs).map(Value::Bool),
        BinaryOp::NotIn => contains(rhs, lhs).map(|found| Value::Bool(!found)),
        BinaryOp::Is => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::IsNot => Ok(Value::Bool(lhs != rhs)),
    }
}

pub fn negate(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Float(x) => Ok(Value::Float(-x)),
        Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
        other => Err(EvalError::type_error(format!(
            "bad operand type for unary -: '{}'",
            other.type_name()
        ))),
    }
}

fn overflow() -> EvalError {
    EvalError::new("OverflowError", "integer overflow")
}

/// Fail unless a sequence of `len` items fits in `max_len`
pub fn check_len(len: Option<usize>, max_len: usize) -> Result<usize, EvalError> {
    match len {
        Some(len) if len <= max_len => Ok(len),
        _ => Err(EvalError::new(
            "MemoryError",
            format!("result would exceed the sequence limit of {}", max_len),
        )),
    }
}

fn unsupported(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

fn float_operands(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<(f64, f64), EvalError> {
    match (is_number(lhs), is_number(rhs)) {
        (true, true) => Ok((
            lhs.as_float().unwrap_or_default(),
            rhs.as_float().unwrap_or_default(),
        )),
        _ => Err(unsupported(op, lhs, rhs)),
    }
}

fn arithmetic(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(a), Some(b)) if !matches!(lhs, Value::Float(_)) && !matches!(rhs, Value::Float(_)) => {
            int_op(a, b).map(Value::Int).ok_or_else(overflow)
        }
        _ => {
            let (a, b) = float_operands(op, lhs, rhs)?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn add(lhs: &Value, rhs: &Value, max_len: usize) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => {
            check_len(a.len().checked_add(b.len()), max_len)?;
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        (Value::List(a), Value::List(b)) => {
            check_len(a.len().checked_add(b.len()), max_len)?;
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        _ => arithmetic(BinaryOp::Add, lhs, rhs, i64::checked_add, |a, b| a + b),
    }
}

fn multiply(lhs: &Value, rhs: &Value, max_len: usize) -> Result<Value, EvalError> {
    let repeat = |n: i64| usize::try_from(n).unwrap_or(0);
    match (lhs, rhs) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            let count = repeat(*n);
            check_len(s.len().checked_mul(count), max_len)?;
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let len = check_len(items.len().checked_mul(repeat(*n)), max_len)?;
            Ok(Value::List(items.iter().cycle().take(len).cloned().collect()))
        }
        _ => arithmetic(BinaryOp::Mul, lhs, rhs, i64::checked_mul, |a, b| a * b),
    }
}

fn ordered(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    test: fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    match lhs.compare(rhs) {
        Some(ordering) => Ok(Value::Bool(test(ordering))),
        None => Err(EvalError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

/// Membership test: `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::List(items) => Ok(items.iter().any(|v| v.loose_eq(item))),
        Value::Map(map) => Ok(item.as_str().is_some_and(|key| map.contains_key(key))),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Items produced by `for` over a value
pub fn iterate(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(EvalError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// `value[index]`, with negative list indexes counting from the end
pub fn index(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match (value, index) {
        (Value::List(items), Value::Int(i)) => position(*i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| EvalError::index_error("list index out of range")),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            position(*i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| EvalError::index_error("string index out of range"))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::key_error(key)),
        (Value::Map(_), other) => Err(EvalError::key_error(&other.to_string())),
        (container, index) => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable by '{}'",
            container.type_name(),
            index.type_name()
        ))),
    }
}

fn position(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then(|| index as usize)
}

/// `value.name`: map members first, then methods of the value's type
pub fn attribute(value: &Value, name: &str) -> Result<Value, EvalError> {
    if let Value::Map(map) = value {
        if let Some(member) = map.get(name) {
            return Ok(member.clone());
        }
    }
    method(value, name).ok_or_else(|| EvalError::attribute_error(value.type_name(), name))
}

fn method(receiver: &Value, name: &str) -> Option<Value> {
    let this = receiver.clone();
    let bound = move |call: fn(&Value, &[Value]) -> Result<Value, EvalError>| {
        let this = this.clone();
        Value::Function(Function::new(name, move |args| call(&this, args)))
    };

    let call: fn(&Value, &[Value]) -> Result<Value, EvalError> = match (receiver, name) {
        (Value::Str(_), "upper") => |this, _| Ok(Value::Str(text(this).to_uppercase())),
        (Value::Str(_), "lower") => |this, _| Ok(Value::Str(text(this).to_lowercase())),
        (Value::Str(_), "strip") => |this, _| Ok(Value::Str(text(this).trim().to_string())),
        (Value::Str(_), "startswith") => |this, args| {
            Ok(Value::Bool(text(this).starts_with(str_arg("startswith", args, 0)?)))
        },
        (Value::Str(_), "endswith") => |this, args| {
            Ok(Value::Bool(text(this).ends_with(str_arg("endswith", args, 0)?)))
        },
        (Value::Str(_), "replace") => |this, args| {
            let from = str_arg("replace", args, 0)?;
            let to = str_arg("replace", args, 1)?;
            Ok(Value::Str(text(this).replace(from, to)))
        },
        (Value::Str(_), "split") => |this, args| {
            let parts: Vec<Value> = match args.first() {
                Some(sep) => {
                    let sep = sep.as_str().ok_or_else(|| {
                        EvalError::type_error("split() separator must be a string")
                    })?;
                    text(this).split(sep).map(Value::from).collect()
                }
                None => text(this).split_whitespace().map(Value::from).collect(),
            };
            Ok(Value::List(parts))
        },
        (Value::Str(_), "join") => |this, args| {
            let items = iterate(args.first().unwrap_or(&Value::None))?;
            let parts: Vec<String> = items.iter().map(Value::to_string).collect();
            Ok(Value::Str(parts.join(text(this))))
        },
        (Value::Map(_), "keys") => |this, _| Ok(Value::List(iterate(this)?)),
        (Value::Map(_), "values") => |this, _| match this {
            Value::Map(map) => Ok(Value::List(map.values().cloned().collect())),
            _ => Ok(Value::List(Vec::new())),
        },
        (Value::Map(_), "items") => |this, _| match this {
            Value::Map(map) => Ok(Value::List(
                map.iter()
                    .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            )),
            _ => Ok(Value::List(Vec::new())),
        },
        (Value::Map(_), "get") => |this, args| {
            let key = str_arg("get", args, 0)?;
            let fallback = args.get(1).cloned().unwrap_or_default();
            Ok(match this {
                Value::Map(map) => map.get(key).cloned().unwrap_or(fallback),
                _ => fallback,
            })
        },
        _ => return None,
    };
    Some(bound(call))
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn str_arg<'v>(method: &str, args: &'v [Value], at: usize) -> Result<&'v str, EvalError> {
    args.get(at).and_then(Value::as_str).ok_or_else(|| {
        EvalError::type_error(format!("{}() argument {} must be a string", method, at + 1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        binary(op, lhs, rhs, DEFAULT_MAX_SEQUENCE_LEN)
    }

    #[test]
    fn test_int_and_float_arithmetic() {
        assert_eq!(
            apply(BinaryOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            apply(BinaryOp::Add, &Value::Int(2), &Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            apply(BinaryOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_floor_division_and_modulo_round_down() {
        assert_eq!(
            apply(BinaryOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(),
            Value::Int(-4)
        );
        assert_eq!(
            apply(BinaryOp::Mod, &Value::Int(-7), &Value::Int(2)).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = apply(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, "ZeroDivisionError");
    }

    #[test]
    fn test_string_concat_and_repeat() {
        assert_eq!(
            apply(BinaryOp::Add, &Value::from("ab"), &Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(
            apply(BinaryOp::Mul, &Value::from("ab"), &Value::Int(2)).unwrap(),
            Value::from("abab")
        );
        let err = apply(BinaryOp::Add, &Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, "TypeError");
    }

    #[test]
    fn test_repeat_beyond_limit_is_memory_error() {
        let err = binary(BinaryOp::Mul, &Value::from("-"), &Value::Int(i64::MAX), 64).unwrap_err();
        assert_eq!(err.kind, "MemoryError");

        let list = Value::from(vec![1, 2, 3]);
        let err = binary(BinaryOp::Mul, &Value::Int(i64::MAX), &list, 64).unwrap_err();
        assert_eq!(err.kind, "MemoryError");

        let err = binary(BinaryOp::Add, &Value::from("abc"), &Value::from("de"), 4).unwrap_err();
        assert_eq!(err.kind, "MemoryError");
        assert_eq!(
            binary(BinaryOp::Mul, &Value::from("ab"), &Value::Int(2), 4).unwrap(),
            Value::from("abab")
        );
    }

    #[test]
    fn test_membership() {
        let list = Value::from(vec![1, 2]);
        assert_eq!(
            apply(BinaryOp::In, &Value::Float(2.0), &list).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            apply(BinaryOp::NotIn, &Value::from("z"), &Value::from("abc")).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_negative_index() {
        let list = Value::from(vec!["a", "b", "c"]);
        assert_eq!(index(&list, &Value::Int(-1)).unwrap(), Value::from("c"));
        assert_eq!(index(&list, &Value::Int(3)).unwrap_err().kind, "IndexError");
    }

    #[test]
    fn test_map_attribute_then_method() {
        let map = Value::Map([("name".to_string(), Value::from("ada"))].into_iter().collect());
        assert_eq!(attribute(&map, "name").unwrap(), Value::from("ada"));

        let upper = attribute(&Value::from("ada"), "upper").unwrap();
        match upper {
            Value::Function(f) => assert_eq!(f.call(&[]).unwrap(), Value::from("ADA")),
            other => panic!("Expected function, got {:?}", other),
        }

        let err = attribute(&Value::Int(1), "upper").unwrap_err();
        assert_eq!(err.kind, "AttributeError");
    }

    #[test]
    fn test_iterate_map_yields_keys() {
        let map = Value::Map(
            [("b", 2), ("a", 1)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::from(v)))
                .collect(),
        );
        assert_eq!(iterate(&map).unwrap(), vec![Value::from("a"), Value::from("b")]);
    }
}
