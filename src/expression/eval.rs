//! Tree-walking evaluator for general expressions
//!
//! Property references are resolved through [`PropertyLookup`] at evaluation
//! time, so the same compiled tree follows live telemetry. `format` is the only
//! builtin that leaves this module: it goes through the [`ValueFormatter`]
//! collaborator.

use super::error::EvalError;
use super::parser::{BinaryOp, Expr, Function, UnaryOp};
use super::PropertyLookup;
use crate::telemetry::{PropertyValue, TypedValue};
use chrono::format::{Item, StrftimeItems};
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    TimeSpan(Duration),
    DateTime(NaiveDateTime),
}

impl From<&TypedValue> for Value {
    fn from(typed: &TypedValue) -> Self {
        match &typed.value {
            None => Value::Null,
            Some(PropertyValue::Boolean(b)) => Value::Bool(*b),
            Some(PropertyValue::Integer(i)) => Value::Int(i64::from(*i)),
            Some(PropertyValue::Long(l)) => Value::Int(*l),
            Some(PropertyValue::Double(d)) => Value::Float(*d),
            Some(PropertyValue::TimeSpan(t)) => Value::TimeSpan(*t),
            Some(PropertyValue::DateTime(dt)) => Value::DateTime(*dt),
            Some(PropertyValue::String(s)) | Some(PropertyValue::Object(s)) => {
                Value::Str(s.clone())
            }
        }
    }
}

impl Value {
    /// `true` for boolean true or a number greater than zero
    ///
    /// No epsilon: `0.0000001` is active.
    pub fn is_active(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i > 0,
            Value::Float(f) => *f > 0.0,
            _ => false,
        }
    }

    /// Text shown on the device for this value
    pub fn to_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::TimeSpan(t) => format_timespan(*t, "hh:mm:ss").unwrap_or_default(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Str(_) => "string",
            Value::TimeSpan(_) => "timespan",
            Value::DateTime(_) => "datetime",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn truthy(&self, op: &str) -> Result<bool, EvalError> {
        match self {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            other => Err(EvalError::InvalidOperand {
                op: op.to_string(),
                operand: other.kind().to_string(),
            }),
        }
    }
}

/// Collaborator behind the `format(value, pattern)` builtin
pub trait ValueFormatter: Send + Sync {
    fn format(&self, value: &Value, pattern: &str) -> Result<String, EvalError>;
}

/// Formatter used when the display layer does not provide its own
///
/// * numbers: `0`, `000`, `0.00`, `0.##`
/// * time spans: `d`, `h`, `m`, `s`, `f` runs such as `hh:mm:ss` or
///   `m:ss.fff`; the highest unit in the pattern carries the total
/// * date times: strftime patterns (`%H:%M`)
/// * anything else: `{0}` is replaced with the display text
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFormatter;

impl ValueFormatter for DefaultFormatter {
    fn format(&self, value: &Value, pattern: &str) -> Result<String, EvalError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Int(_) | Value::Float(_) if is_numeric_pattern(pattern) => {
                let number = value.as_f64().unwrap_or_default();
                Ok(format_number(number, pattern))
            }
            Value::TimeSpan(span) => format_timespan(*span, pattern),
            Value::DateTime(dt) => {
                let items: Vec<Item> = StrftimeItems::new(pattern).collect();
                if items.iter().any(|item| matches!(item, Item::Error)) {
                    return Err(EvalError::Format(format!(
                        "invalid date pattern '{pattern}'"
                    )));
                }
                Ok(dt.format_with_items(items.into_iter()).to_string())
            }
            other if pattern.contains("{0}") => Ok(pattern.replace("{0}", &other.to_display())),
            other => Err(EvalError::Format(format!(
                "pattern '{pattern}' does not apply to {}",
                other.kind()
            ))),
        }
    }
}

fn is_numeric_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern.chars().all(|c| matches!(c, '0' | '#' | '.'))
        && pattern.matches('.').count() <= 1
}

fn format_number(number: f64, pattern: &str) -> String {
    let (integer_part, fraction_part) = pattern.split_once('.').unwrap_or((pattern, ""));
    let min_integer_digits = integer_part.chars().filter(|c| *c == '0').count();
    let required = fraction_part.chars().filter(|c| *c == '0').count();
    let optional = fraction_part.chars().filter(|c| *c == '#').count();

    let mut text = format!("{:.*}", required + optional, number.abs());
    if optional > 0 {
        let min_len = text.len() - optional;
        while text.len() > min_len && text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }

    let int_len = text.find('.').unwrap_or(text.len());
    if int_len < min_integer_digits {
        text.insert_str(0, &"0".repeat(min_integer_digits - int_len));
    } else if min_integer_digits == 0 && text.starts_with("0.") {
        text.remove(0);
    }

    let is_zero = text.chars().all(|c| c == '0' || c == '.');
    if number < 0.0 && !is_zero {
        text.insert(0, '-');
    }
    text
}

fn format_timespan(span: Duration, pattern: &str) -> Result<String, EvalError> {
    let negative = span < Duration::zero();
    let span = span.abs();
    let total_seconds = span.num_seconds();
    let nanos = span.subsec_nanos().unsigned_abs();

    // runs of one unit letter, everything else is literal
    let mut runs: Vec<(char, usize)> = Vec::new();
    for c in pattern.chars() {
        match runs.last_mut() {
            Some((last, count)) if *last == c && "dhmsf".contains(c) => *count += 1,
            _ => runs.push((c, 1)),
        }
    }

    let highest = ['d', 'h', 'm', 's']
        .into_iter()
        .find(|unit| runs.iter().any(|(c, _)| c == unit));
    let Some(highest) = highest else {
        return Err(EvalError::Format(format!(
            "invalid time span pattern '{pattern}'"
        )));
    };

    let unit_value = |unit: char| -> i64 {
        let carries = unit == highest;
        match unit {
            'd' => total_seconds / 86_400,
            'h' if carries => total_seconds / 3_600,
            'h' => (total_seconds / 3_600) % 24,
            'm' if carries => total_seconds / 60,
            'm' => (total_seconds / 60) % 60,
            's' if carries => total_seconds,
            _ => total_seconds % 60,
        }
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    for (c, count) in runs {
        match c {
            'd' | 'h' | 'm' | 's' => {
                out.push_str(&format!("{:0width$}", unit_value(c), width = count));
            }
            'f' => {
                let digits = count.min(9);
                let scaled = nanos / 10u32.pow(9 - digits as u32);
                out.push_str(&format!("{:0width$}", scaled, width = digits));
            }
            literal => {
                for _ in 0..count {
                    out.push(literal);
                }
            }
        }
    }
    Ok(out)
}

/// Evaluates `expr`, resolving `[property]` references through `lookup`
pub fn evaluate(
    expr: &Expr,
    lookup: &dyn PropertyLookup,
    formatter: &dyn ValueFormatter,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Property(name) => Ok(lookup
            .lookup(name)
            .map(|typed| Value::from(&typed))
            .unwrap_or(Value::Null)),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, lookup, formatter)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let left = evaluate(left, lookup, formatter)?;
                if !left.truthy("&&")? {
                    return Ok(Value::Bool(false));
                }
                let right = evaluate(right, lookup, formatter)?;
                Ok(Value::Bool(right.truthy("&&")?))
            }
            BinaryOp::Or => {
                let left = evaluate(left, lookup, formatter)?;
                if left.truthy("||")? {
                    return Ok(Value::Bool(true));
                }
                let right = evaluate(right, lookup, formatter)?;
                Ok(Value::Bool(right.truthy("||")?))
            }
            _ => {
                let left = evaluate(left, lookup, formatter)?;
                let right = evaluate(right, lookup, formatter)?;
                apply_binary(*op, left, right)
            }
        },
        Expr::Call { function, args } => call(*function, args, lookup, formatter),
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy("!")?)),
        (UnaryOp::Negate, Value::Int(i)) => Ok(i
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(i as f64)))),
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Negate, Value::TimeSpan(t)) => Ok(Value::TimeSpan(-t)),
        (UnaryOp::Negate, other) => Err(EvalError::InvalidOperand {
            op: "-".to_string(),
            operand: other.kind().to_string(),
        }),
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        left: left.kind().to_string(),
        right: right.kind().to_string(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_f64() == right.as_f64()
        }
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => left
            .as_f64()
            .zip(right.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::TimeSpan(a), Value::TimeSpan(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| mismatch(op, left, right))
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(int_op(*a, *b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(float_op(*a as f64, *b as f64)))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, &left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!(
                "{}{}",
                left.to_display(),
                right.to_display()
            ))),
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a
                .checked_add(b)
                .map(Value::TimeSpan)
                .ok_or_else(|| mismatch(op, &left, &right)),
            (Value::DateTime(a), Value::TimeSpan(b)) => a
                .checked_add_signed(*b)
                .map(Value::DateTime)
                .ok_or_else(|| mismatch(op, &left, &right)),
            _ => arithmetic(op, &left, &right, i64::checked_add, |a, b| a + b),
        },
        BinaryOp::Sub => match (&left, &right) {
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a
                .checked_sub(b)
                .map(Value::TimeSpan)
                .ok_or_else(|| mismatch(op, &left, &right)),
            (Value::DateTime(a), Value::DateTime(b)) => Ok(Value::TimeSpan(*a - *b)),
            (Value::DateTime(a), Value::TimeSpan(b)) => a
                .checked_sub_signed(*b)
                .map(Value::DateTime)
                .ok_or_else(|| mismatch(op, &left, &right)),
            _ => arithmetic(op, &left, &right, i64::checked_sub, |a, b| a - b),
        },
        BinaryOp::Mul => arithmetic(op, &left, &right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(EvalError::DivisionByZero),
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => Err(mismatch(op, &left, &right)),
        },
        BinaryOp::Rem => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(EvalError::DivisionByZero),
            _ => arithmetic(op, &left, &right, i64::checked_rem, |a, b| a % b),
        },
        BinaryOp::And | BinaryOp::Or => {
            let result = if op == BinaryOp::And {
                left.truthy(op.symbol())? && right.truthy(op.symbol())?
            } else {
                left.truthy(op.symbol())? || right.truthy(op.symbol())?
            };
            Ok(Value::Bool(result))
        }
    }
}

fn numeric_arg(function: Function, value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| EvalError::InvalidOperand {
        op: function.name().to_string(),
        operand: value.kind().to_string(),
    })
}

fn call(
    function: Function,
    args: &[Expr],
    lookup: &dyn PropertyLookup,
    formatter: &dyn ValueFormatter,
) -> Result<Value, EvalError> {
    // arity was checked by the parser
    let arg = |index: usize| -> Result<Value, EvalError> {
        match args.get(index) {
            Some(expr) => evaluate(expr, lookup, formatter),
            None => Ok(Value::Null),
        }
    };

    match function {
        Function::If => {
            if arg(0)?.truthy("if")? {
                arg(1)
            } else {
                arg(2)
            }
        }
        Function::IsNull => match arg(0)? {
            Value::Null => arg(1),
            value => Ok(value),
        },
        Function::Abs => match arg(0)? {
            Value::Int(i) => Ok(i
                .checked_abs()
                .map(Value::Int)
                .unwrap_or(Value::Float((i as f64).abs()))),
            Value::TimeSpan(t) => Ok(Value::TimeSpan(t.abs())),
            other => Ok(Value::Float(numeric_arg(function, &other)?.abs())),
        },
        Function::Round => {
            let value = arg(0)?;
            let digits = match args.len() {
                2 => numeric_arg(function, &arg(1)?)? as i32,
                _ => 0,
            };
            match value {
                Value::Int(i) if digits >= 0 => Ok(Value::Int(i)),
                other => {
                    let number = numeric_arg(function, &other)?;
                    let scale = 10f64.powi(digits);
                    Ok(Value::Float((number * scale).round() / scale))
                }
            }
        }
        Function::Floor | Function::Ceiling => match arg(0)? {
            Value::Int(i) => Ok(Value::Int(i)),
            other => {
                let number = numeric_arg(function, &other)?;
                Ok(Value::Float(if function == Function::Floor {
                    number.floor()
                } else {
                    number.ceil()
                }))
            }
        },
        Function::Min | Function::Max => {
            let left = arg(0)?;
            let right = arg(1)?;
            let op = if function == Function::Min {
                BinaryOp::Lt
            } else {
                BinaryOp::Gt
            };
            let keep_left = compare(op, &left, &right)?
                == if function == Function::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            Ok(if keep_left { left } else { right })
        }
        Function::Int => match arg(0)? {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).or_else(|_| {
                s.trim()
                    .parse::<f64>()
                    .map(|f| Value::Int(f.trunc() as i64))
                    .map_err(|_| EvalError::Conversion {
                        value: s.clone(),
                        target: "integer".to_string(),
                    })
            }),
            Value::TimeSpan(t) => Ok(Value::Int(t.num_seconds())),
            other => Err(EvalError::Conversion {
                value: other.to_display(),
                target: "integer".to_string(),
            }),
        },
        Function::Double => match arg(0)? {
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Str(s) => {
                s.trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| EvalError::Conversion {
                        value: s.clone(),
                        target: "double".to_string(),
                    })
            }
            Value::TimeSpan(t) => Ok(Value::Float(t.num_milliseconds() as f64 / 1000.0)),
            other => Err(EvalError::Conversion {
                value: other.to_display(),
                target: "double".to_string(),
            }),
        },
        Function::Str => Ok(Value::Str(arg(0)?.to_display())),
        Function::Format => {
            let value = arg(0)?;
            let pattern = match arg(1)? {
                Value::Str(pattern) => pattern,
                other => other.to_display(),
            };
            formatter.format(&value, &pattern).map(Value::Str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse;
    use crate::telemetry::PropertyType;
    use std::collections::HashMap;

    fn telemetry() -> HashMap<String, TypedValue> {
        let mut values = HashMap::new();
        let mut put = |name: &str, property_type: PropertyType, raw: &str| {
            values.insert(
                name.to_string(),
                TypedValue::decode(property_type, raw).unwrap(),
            );
        };
        put("rpm", PropertyType::Double, "7250.7");
        put("maxrpm", PropertyType::Integer, "8000");
        put("gear", PropertyType::String, "N");
        put("pit", PropertyType::Boolean, "True");
        put("fuel", PropertyType::Double, "(null)");
        put("laptime", PropertyType::TimeSpan, "00:01:23.4560000");
        values
    }

    fn eval(text: &str) -> Result<Value, EvalError> {
        let values = telemetry();
        let lookup = |name: &str| values.get(name).cloned();
        let (expr, _) = parse(text, None).unwrap();
        evaluate(&expr, &lookup, &DefaultFormatter)
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(eval("[rpm] > [maxrpm] * 0.9").unwrap(), Value::Bool(true));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("7 % 4").unwrap(), Value::Int(3));
        assert_eq!(eval("-(2 + 3) * 2").unwrap(), Value::Int(-10));
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn strings_concatenate_and_compare() {
        assert_eq!(
            eval("'Gear ' + [gear]").unwrap(),
            Value::Str("Gear N".to_string())
        );
        assert_eq!(eval("[gear] == 'N' && [pit]").unwrap(), Value::Bool(true));
        assert!(matches!(
            eval("[gear] > 1"),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn null_only_supports_equality() {
        assert_eq!(eval("[fuel] == null").unwrap(), Value::Bool(true));
        assert_eq!(eval("[missing] == null").unwrap(), Value::Bool(true));
        assert!(eval("[fuel] > 1").is_err());
        assert_eq!(eval("isnull([fuel], 12.5)").unwrap(), Value::Float(12.5));
    }

    #[test]
    fn if_is_lazy() {
        assert_eq!(eval("if([pit], 1, 1 / 0)").unwrap(), Value::Int(1));
        assert_eq!(eval("false && 1 / 0").unwrap(), Value::Bool(false));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("round(2.346, 2)").unwrap(), Value::Float(2.35));
        assert_eq!(eval("floor(2.7)").unwrap(), Value::Float(2.0));
        assert_eq!(eval("max([maxrpm], 9000)").unwrap(), Value::Int(9000));
        assert_eq!(eval("int('42')").unwrap(), Value::Int(42));
        assert_eq!(eval("str(3)").unwrap(), Value::Str("3".to_string()));
        assert!(matches!(
            eval("double('abc')"),
            Err(EvalError::Conversion { .. })
        ));
    }

    #[test]
    fn format_numbers_and_time_spans() {
        assert_eq!(
            eval("format([rpm], '0')").unwrap(),
            Value::Str("7251".to_string())
        );
        assert_eq!(
            eval("format(3.14159, '0.00')").unwrap(),
            Value::Str("3.14".to_string())
        );
        assert_eq!(
            eval("format(7, '000')").unwrap(),
            Value::Str("007".to_string())
        );
        assert_eq!(
            eval("format(2.5, '0.##')").unwrap(),
            Value::Str("2.5".to_string())
        );
        assert_eq!(
            eval("format([laptime], 'm:ss.fff')").unwrap(),
            Value::Str("1:23.456".to_string())
        );
        assert_eq!(
            eval("format([laptime], 'ss')").unwrap(),
            Value::Str("83".to_string())
        );
        assert!(matches!(
            eval("format([gear], '0.0')"),
            Err(EvalError::Format(_))
        ));
    }

    #[test]
    fn activity_has_no_epsilon() {
        assert!(Value::Float(0.0000001).is_active());
        assert!(!Value::Float(0.0).is_active());
        assert!(!Value::Int(-1).is_active());
        assert!(Value::Bool(true).is_active());
        assert!(!Value::Str("1".to_string()).is_active());
    }
}
