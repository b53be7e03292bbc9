//! Compiled expressions and the slot that holds them
//!
//! An [`ExpressionSlot`] only ever swaps in a successfully compiled
//! expression. A failed compile records the error and keeps evaluating the
//! previous form, so a half-typed condition in the settings never turns a
//! working binding off.

use super::condition::ConditionExpression;
use super::error::{EvalError, ExpressionError};
use super::eval::{evaluate, DefaultFormatter, Value, ValueFormatter};
use super::parser::{parse, Expr, Labels};
use super::PropertyLookup;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Nothing configured: always active, displays nothing
    Empty,
    Condition(ConditionExpression),
    General(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    pub expression: Expression,
    pub used_properties: BTreeSet<String>,
}

impl CompiledExpression {
    pub fn empty() -> Self {
        Self {
            expression: Expression::Empty,
            used_properties: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expression == Expression::Empty
    }

    pub fn evaluate(
        &self,
        lookup: &dyn PropertyLookup,
        formatter: &dyn ValueFormatter,
    ) -> Result<Value, EvalError> {
        match &self.expression {
            Expression::Empty => Ok(Value::Bool(true)),
            Expression::Condition(condition) => Ok(Value::Bool(condition.evaluate(lookup))),
            Expression::General(expr) => evaluate(expr, lookup, formatter),
        }
    }
}

/// Compiles either dialect
///
/// Text containing `[` is a general expression, blank text is
/// [`Expression::Empty`] and anything else is a legacy comparator.
pub fn compile(text: &str, labels: Option<&Labels>) -> Result<CompiledExpression, ExpressionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(CompiledExpression::empty());
    }

    if trimmed.contains('[') {
        let (expr, used_properties) = parse(trimmed, labels)?;
        return Ok(CompiledExpression {
            expression: Expression::General(expr),
            used_properties,
        });
    }

    let condition = ConditionExpression::parse(trimmed)?;
    let mut used_properties = BTreeSet::new();
    used_properties.insert(condition.property.clone());
    Ok(CompiledExpression {
        expression: Expression::Condition(condition),
        used_properties,
    })
}

/// Holds the source text and the last good compiled form of one expression
pub struct ExpressionSlot {
    source: String,
    compiled: CompiledExpression,
    last_error: Option<ExpressionError>,
    error_logged: AtomicBool,
    formatter: Arc<dyn ValueFormatter>,
}

impl Default for ExpressionSlot {
    fn default() -> Self {
        Self::with_formatter(Arc::new(DefaultFormatter))
    }
}

impl ExpressionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formatter(formatter: Arc<dyn ValueFormatter>) -> Self {
        Self {
            source: String::new(),
            compiled: CompiledExpression::empty(),
            last_error: None,
            error_logged: AtomicBool::new(false),
            formatter,
        }
    }

    /// Builds a slot from `text`, keeping the error if it does not compile
    pub fn from_source(text: &str, labels: Option<&Labels>) -> Self {
        let mut slot = Self::new();
        // the error stays available through last_error()
        let _ = slot.update_with_labels(text, labels);
        slot
    }

    pub fn update(&mut self, text: &str) -> Result<(), ExpressionError> {
        self.update_with_labels(text, None)
    }

    /// Replaces the source text and, if it compiles, the compiled form
    ///
    /// The source always updates; on failure the previous compiled form and
    /// its used properties stay in effect and the error is returned.
    pub fn update_with_labels(
        &mut self,
        text: &str,
        labels: Option<&Labels>,
    ) -> Result<(), ExpressionError> {
        self.source = text.to_string();
        match compile(text, labels) {
            Ok(compiled) => {
                debug!("Compiled expression '{}'", text);
                self.compiled = compiled;
                self.last_error = None;
                self.error_logged.store(false, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                warn!("Keeping previous expression, '{}' does not compile: {}", text, e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compiled(&self) -> &CompiledExpression {
        &self.compiled
    }

    pub fn used_properties(&self) -> &BTreeSet<String> {
        &self.compiled.used_properties
    }

    pub fn last_error(&self) -> Option<&ExpressionError> {
        self.last_error.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Evaluates the compiled form; errors are logged once and yield `None`
    pub fn evaluate(&self, lookup: &dyn PropertyLookup) -> Option<Value> {
        match self.compiled.evaluate(lookup, self.formatter.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                if !self.error_logged.swap(true, Ordering::Relaxed) {
                    warn!("Evaluating '{}' failed: {}", self.source, e);
                }
                None
            }
        }
    }

    /// `true` when empty, or when the value is boolean true or a number > 0
    pub fn is_active(&self, lookup: &dyn PropertyLookup) -> bool {
        if self.is_empty() {
            return true;
        }
        self.evaluate(lookup).is_some_and(|value| value.is_active())
    }

    /// Display text of the value; empty for an empty slot or a failed evaluation
    pub fn display(&self, lookup: &dyn PropertyLookup) -> String {
        if self.is_empty() {
            return String::new();
        }
        self.evaluate(lookup)
            .map(|value| value.to_display())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ExpressionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionSlot")
            .field("source", &self.source)
            .field("compiled", &self.compiled)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{PropertyType, TypedValue};

    fn x_is(raw: &'static str) -> impl Fn(&str) -> Option<TypedValue> {
        move |name: &str| (name == "x").then(|| TypedValue::decode(PropertyType::Integer, raw).unwrap())
    }

    #[test]
    fn selects_dialect() {
        assert!(compile("  ", None).unwrap().is_empty());
        assert!(matches!(
            compile("x > 1", None).unwrap().expression,
            Expression::Condition(_)
        ));
        assert!(matches!(
            compile("[x] > 1", None).unwrap().expression,
            Expression::General(_)
        ));
    }

    #[test]
    fn failed_update_keeps_previous_expression() {
        let mut slot = ExpressionSlot::new();
        slot.update("[x] > 1").unwrap();
        assert!(slot.is_active(&x_is("2")));

        assert!(slot.update("[x] >").is_err());
        assert_eq!(slot.source(), "[x] >");
        assert!(slot.last_error().is_some());
        assert!(slot.is_active(&x_is("2")));
        assert!(!slot.is_active(&x_is("1")));
        assert_eq!(slot.used_properties().len(), 1);

        slot.update("[y] == 3").unwrap();
        assert!(slot.last_error().is_none());
        assert!(!slot.is_active(&x_is("2")));
        assert!(slot.used_properties().contains("y"));
        assert!(!slot.used_properties().contains("x"));
    }

    #[test]
    fn empty_slot_is_active_and_blank() {
        let slot = ExpressionSlot::new();
        assert!(slot.is_active(&x_is("0")));
        assert_eq!(slot.display(&x_is("0")), "");
    }

    #[test]
    fn evaluation_error_is_inactive() {
        let slot = ExpressionSlot::from_source("[x] / 0 > 1", None);
        assert!(slot.last_error().is_none());
        assert!(!slot.is_active(&x_is("4")));
        assert_eq!(slot.display(&x_is("4")), "");
    }

    #[test]
    fn display_formats_value() {
        let slot = ExpressionSlot::from_source("'Gear ' + [x]", None);
        assert_eq!(slot.display(&x_is("4")), "Gear 4");
    }
}
