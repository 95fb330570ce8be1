//! Built-in functions visible to every template

use super::ops::{check_len, iterate};
use crate::error::EvalError;
use crate::value::{Function, Value, Vars};

/// Build the built-in function table
///
/// `max_len` bounds the lists `range` may produce.
pub fn builtins(max_len: usize) -> Vars {
    let table: [(&str, fn(&[Value]) -> Result<Value, EvalError>); 12] = [
        ("str", str_),
        ("int", int),
        ("float", float),
        ("bool", bool_),
        ("len", len),
        ("list", list),
        ("min", min),
        ("max", max),
        ("abs", abs),
        ("upper", upper),
        ("lower", lower),
        ("join", join),
    ];
    let mut vars: Vars = table
        .into_iter()
        .map(|(name, call)| (name.to_string(), Value::Function(Function::new(name, call))))
        .collect();
    let range = Function::new("range", move |args: &[Value]| range(args, max_len));
    vars.insert("range".to_string(), Value::Function(range));
    vars
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("{}", min)
    } else {
        format!("from {} to {}", min, max)
    };
    Err(EvalError::type_error(format!(
        "{}() takes {} arguments ({} given)",
        name,
        expected,
        args.len()
    )))
}

fn str_(args: &[Value]) -> Result<Value, EvalError> {
    arity("str", args, 0, 1)?;
    Ok(Value::Str(args.first().map(Value::to_string).unwrap_or_default()))
}

fn int(args: &[Value]) -> Result<Value, EvalError> {
    arity("int", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            EvalError::value_error(format!("invalid literal for int() with base 10: {:?}", s))
        }),
        other => Err(EvalError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float(args: &[Value]) -> Result<Value, EvalError> {
    arity("float", args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            EvalError::value_error(format!("could not convert string to float: {:?}", s))
        }),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            EvalError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn bool_(args: &[Value]) -> Result<Value, EvalError> {
    arity("bool", args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn len(args: &[Value]) -> Result<Value, EvalError> {
    arity("len", args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(EvalError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn range(args: &[Value], max_len: usize) -> Result<Value, EvalError> {
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|v| match v {
            Value::Int(n) => Ok(*n),
            other => Err(EvalError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<i64>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(EvalError::value_error("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let step_size = i128::from(step).abs();
    let count = if span > 0 { (span + step_size - 1) / step_size } else { 0 };
    let count = check_len(usize::try_from(count).ok(), max_len)?;

    let mut items = Vec::with_capacity(count);
    let mut n = start;
    while (step > 0 && n < stop) || (step < 0 && n > stop) {
        items.push(Value::Int(n));
        n = match n.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}

fn list(args: &[Value]) -> Result<Value, EvalError> {
    arity("list", args, 0, 1)?;
    match args.first() {
        Some(value) => iterate(value).map(Value::List),
        None => Ok(Value::List(Vec::new())),
    }
}

fn extreme(
    name: &str,
    args: &[Value],
    keep_new: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let items = match args {
        [] => {
            return Err(EvalError::type_error(format!(
                "{}() expected at least 1 argument",
                name
            )))
        }
        [single] => iterate(single)?,
        many => many.to_vec(),
    };
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| EvalError::value_error(format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        let ordering = item.compare(&best).ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                name,
                item.type_name(),
                best.type_name()
            ))
        })?;
        if keep_new(ordering) {
            best = item;
        }
    }
    Ok(best)
}

fn min(args: &[Value]) -> Result<Value, EvalError> {
    extreme("min", args, std::cmp::Ordering::is_lt)
}

fn max(args: &[Value]) -> Result<Value, EvalError> {
    extreme("max", args, std::cmp::Ordering::is_gt)
}

fn abs(args: &[Value]) -> Result<Value, EvalError> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| EvalError::new("OverflowError", "integer overflow")),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        other => Err(EvalError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn upper(args: &[Value]) -> Result<Value, EvalError> {
    arity("upper", args, 1, 1)?;
    Ok(Value::Str(args[0].to_string().to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, EvalError> {
    arity("lower", args, 1, 1)?;
    Ok(Value::Str(args[0].to_string().to_lowercase()))
}

/// `join(items, sep="")`
fn join(args: &[Value]) -> Result<Value, EvalError> {
    arity("join", args, 1, 2)?;
    let sep = args.get(1).map(Value::to_string).unwrap_or_default();
    let parts: Vec<String> = iterate(&args[0])?.iter().map(Value::to_string).collect();
    Ok(Value::Str(parts.join(&sep)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ops::DEFAULT_MAX_SEQUENCE_LEN;

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match &builtins(DEFAULT_MAX_SEQUENCE_LEN)[name] {
            Value::Function(f) => f.call(args),
            other => panic!("Expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(call("range", &[Value::Int(3)]).unwrap(), Value::from(vec![0, 1, 2]));
        assert_eq!(
            call("range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            Value::from(vec![5, 3, 1])
        );
        assert_eq!(
            call("range", &[Value::Int(0), Value::Int(1), Value::Int(0)])
                .unwrap_err()
                .kind,
            "ValueError"
        );
    }

    #[test]
    fn test_range_beyond_limit_is_memory_error() {
        let err = call("range", &[Value::Int(i64::MAX)]).unwrap_err();
        assert_eq!(err.kind, "MemoryError");

        let err = call("range", &[Value::Int(i64::MIN), Value::Int(i64::MAX)]).unwrap_err();
        assert_eq!(err.kind, "MemoryError");

        let small = builtins(3);
        let Value::Function(range) = &small["range"] else {
            panic!("Expected function");
        };
        assert_eq!(range.call(&[Value::Int(3)]).unwrap(), Value::from(vec![0, 1, 2]));
        assert_eq!(range.call(&[Value::Int(4)]).unwrap_err().kind, "MemoryError");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", &[Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", &[Value::from("x")]).unwrap_err().kind, "ValueError");
        assert_eq!(call("str", &[Value::Float(1.0)]).unwrap(), Value::from("1.0"));
        assert_eq!(call("bool", &[Value::from("")]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_len_counts_chars() {
        assert_eq!(call("len", &[Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call("len", &[Value::Int(1)]).unwrap_err().kind, "TypeError");
    }

    #[test]
    fn test_min_max() {
        let items = Value::from(vec![3, 1, 2]);
        assert_eq!(call("min", &[items.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("max", &[Value::Int(1), Value::Float(2.5)]).unwrap(), Value::Float(2.5));
        assert_eq!(
            call("max", &[Value::List(vec![])]).unwrap_err().kind,
            "ValueError"
        );
    }

    #[test]
    fn test_join() {
        assert_eq!(
            call("join", &[Value::from(vec!["a", "b"]), Value::from(", ")]).unwrap(),
            Value::from("a, b")
        );
    }
}
