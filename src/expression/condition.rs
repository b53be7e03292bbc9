//! Legacy comparator dialect: `<property> [<op> <value>]`
//!
//! `~~` is between and takes two `;`-separated bounds. A bare property name
//! means `<property> > 0`. Compare values are coerced to the property's
//! declared type at evaluation time; anything that does not line up is simply
//! inactive.

use super::error::ExpressionError;
use super::PropertyLookup;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Between,
}

impl ConditionOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ConditionOperator::Eq => "==",
            ConditionOperator::Ge => ">=",
            ConditionOperator::Gt => ">",
            ConditionOperator::Le => "<=",
            ConditionOperator::Lt => "<",
            ConditionOperator::Ne => "!=",
            ConditionOperator::Between => "~~",
        }
    }
}

// two-character operators first so `>=` is not read as `>`
const OPERATORS: [(&str, ConditionOperator); 7] = [
    ("==", ConditionOperator::Eq),
    (">=", ConditionOperator::Ge),
    ("<=", ConditionOperator::Le),
    ("!=", ConditionOperator::Ne),
    ("~~", ConditionOperator::Between),
    (">", ConditionOperator::Gt),
    ("<", ConditionOperator::Lt),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpression {
    pub property: String,
    pub operator: ConditionOperator,
    pub compare_values: Vec<String>,
}

impl ConditionExpression {
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let found = text.char_indices().find_map(|(index, _)| {
            OPERATORS
                .iter()
                .find(|(symbol, _)| text[index..].starts_with(symbol))
                .map(|(symbol, operator)| (index, symbol.len(), *operator))
        });

        let (property, operator, compare_values) = match found {
            Some((index, len, operator)) => {
                let rest = text[index + len..].trim();
                let values = if operator == ConditionOperator::Between {
                    rest.split(';').map(|v| v.trim().to_string()).collect()
                } else {
                    vec![rest.to_string()]
                };
                (text[..index].trim(), operator, values)
            }
            None => (text.trim(), ConditionOperator::Gt, vec!["0".to_string()]),
        };

        if property.is_empty() {
            return Err(ExpressionError::MissingProperty(text.to_string()));
        }

        Ok(Self {
            property: property.to_string(),
            operator,
            compare_values,
        })
    }

    /// Evaluates against the current value of the property
    ///
    /// A missing or null property, a compare value that does not parse as the
    /// property's type, or a between without exactly two bounds is `false`.
    pub fn evaluate(&self, lookup: &dyn PropertyLookup) -> bool {
        let Some(current) = lookup.lookup(&self.property) else {
            return false;
        };
        let Some(value) = current.value.as_ref() else {
            return false;
        };

        let mut bounds = Vec::with_capacity(self.compare_values.len());
        for text in &self.compare_values {
            match current.coerce(text) {
                Some(bound) => bounds.push(bound),
                None => return false,
            }
        }

        let ordering_to = |index: usize| bounds.get(index).and_then(|b| value.compare(b));

        match self.operator {
            ConditionOperator::Between => {
                if bounds.len() != 2 {
                    return false;
                }
                matches!(
                    (ordering_to(0), ordering_to(1)),
                    (
                        Some(Ordering::Greater | Ordering::Equal),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                )
            }
            operator => {
                let Some(ordering) = ordering_to(0) else {
                    return false;
                };
                match operator {
                    ConditionOperator::Eq => ordering == Ordering::Equal,
                    ConditionOperator::Ne => ordering != Ordering::Equal,
                    ConditionOperator::Gt => ordering == Ordering::Greater,
                    ConditionOperator::Ge => ordering != Ordering::Less,
                    ConditionOperator::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

impl fmt::Display for ConditionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.property,
            self.operator.symbol(),
            self.compare_values.join(";")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{PropertyType, TypedValue};

    fn holding(
        property_type: PropertyType,
        raw: &'static str,
    ) -> impl Fn(&str) -> Option<TypedValue> {
        move |name: &str| (name == "x").then(|| TypedValue::decode(property_type, raw).unwrap())
    }

    #[test]
    fn parses_operators() {
        let condition = ConditionExpression::parse("speed >= 100").unwrap();
        assert_eq!(condition.property, "speed");
        assert_eq!(condition.operator, ConditionOperator::Ge);
        assert_eq!(condition.compare_values, vec!["100".to_string()]);

        let condition = ConditionExpression::parse("gear~~1; 3").unwrap();
        assert_eq!(condition.operator, ConditionOperator::Between);
        assert_eq!(condition.compare_values, vec!["1", "3"]);

        let condition = ConditionExpression::parse("  DataCorePlugin.GameRunning ").unwrap();
        assert_eq!(condition.property, "DataCorePlugin.GameRunning");
        assert_eq!(condition.operator, ConditionOperator::Gt);
        assert_eq!(condition.compare_values, vec!["0"]);

        assert!(matches!(
            ConditionExpression::parse("== 3"),
            Err(ExpressionError::MissingProperty(_))
        ));
    }

    #[test]
    fn between_is_inclusive() {
        let condition = ConditionExpression::parse("x ~~ 1;2").unwrap();
        for (raw, expected) in [("0", false), ("1", true), ("2", true), ("3", false)] {
            assert_eq!(
                condition.evaluate(&holding(PropertyType::Integer, raw)),
                expected,
                "x = {raw}"
            );
        }
    }

    #[test]
    fn between_with_one_bound_is_inactive() {
        let condition = ConditionExpression::parse("x ~~ 1").unwrap();
        assert!(!condition.evaluate(&holding(PropertyType::Integer, "1")));
    }

    #[test]
    fn type_mismatch_is_false() {
        let condition = ConditionExpression::parse("x > fast").unwrap();
        assert!(!condition.evaluate(&holding(PropertyType::Double, "12.5")));
        let condition = ConditionExpression::parse("x != fast").unwrap();
        assert!(!condition.evaluate(&holding(PropertyType::Double, "12.5")));
    }

    #[test]
    fn bare_property_means_greater_than_zero() {
        let condition = ConditionExpression::parse("x").unwrap();
        assert!(condition.evaluate(&holding(PropertyType::Boolean, "True")));
        assert!(!condition.evaluate(&holding(PropertyType::Boolean, "False")));
        assert!(condition.evaluate(&holding(PropertyType::Double, "0.5")));
        assert!(!condition.evaluate(&holding(PropertyType::Integer, "(null)")));
        assert!(!ConditionExpression::parse("y").unwrap().evaluate(&holding(PropertyType::Integer, "5")));
    }

    #[test]
    fn string_equality() {
        let condition = ConditionExpression::parse("x == R").unwrap();
        assert!(condition.evaluate(&holding(PropertyType::String, "R")));
        assert!(!condition.evaluate(&holding(PropertyType::String, "N")));
    }
}
