use std::{borrow::Cow, collections::BTreeMap};

use crate::error::EvalError;
use crate::source::Span;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// An opaque expression handed to an [`Evaluator`]: the expression text
/// plus the source span it was cut from, for error attribution.
#[derive(Debug, Clone, Copy)]
pub struct ExprRef<'a> {
    text: &'a str,
    span: Span,
}

impl<'a> ExprRef<'a> {
    pub(crate) fn new(source: &'a str, span: Span) -> Self {
        Self {
            text: span.text(source),
            span,
        }
    }

    pub const fn as_str(&self) -> &'a str {
        self.text
    }

    pub const fn span(&self) -> Span {
        self.span
    }

    /// An [`EvalError`] attributed to this expression's span.
    pub fn error<M: Into<String>>(&self, message: M) -> EvalError {
        EvalError {
            span: self.span,
            message: message.into(),
        }
    }
}

/// The external expression evaluator and variable store.
///
/// This core never parses expression interiors; every `${…}`, condition,
/// `##` statement, and `#for` iteration source is handed here as an opaque
/// [`ExprRef`]. Errors abort the render walk entirely; they are not control
/// signals.
pub trait Evaluator {
    /// Evaluates an `#if`/`#elif`/`#while` condition to a boolean.
    fn eval_condition(&mut self, expr: ExprRef<'_>) -> EvalResult<bool>;

    /// Evaluates a `${…}` placeholder to the text to append to the output.
    fn eval_placeholder(&mut self, expr: ExprRef<'_>) -> EvalResult<String>;

    /// Executes a `##` raw statement for its side effects.
    fn exec_statement(&mut self, statement: ExprRef<'_>) -> EvalResult<()>;

    /// Begins a `#for` iteration: returns how many iterations the source
    /// yields. Zero selects the loop's `#else` branch.
    fn begin_loop(&mut self, expr: ExprRef<'_>) -> EvalResult<usize>;

    /// Binds the loop variable(s) for iteration `index`, called once before
    /// each iteration's body renders.
    fn bind_loop(&mut self, expr: ExprRef<'_>, index: usize) -> EvalResult<()>;
}

/// Supplies the source text of `#include`/`#inherint` targets during
/// `post_process`.
pub trait SourceProvider {
    fn load(&self, name: &str) -> crate::VeertlResult<String>;
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableTy {
    String,
    Boolean,
    Iterable,
}

impl VariableTy {
    pub fn with_data<'a, T: Into<Cow<'a, str>>>(self, data: T) -> Variable<'a> {
        Variable {
            ty: self,
            data: Some(data.into()),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable<'a> {
    ty: VariableTy,
    data: Option<Cow<'a, str>>,
}

impl Variable<'_> {
    pub const fn ty(&self) -> VariableTy {
        self.ty
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_ref().map(|s| s.as_ref())
    }

    /// Truthiness for condition evaluation: booleans by value, strings and
    /// iterables by non-emptiness; missing data is false.
    fn truthy(&self) -> bool {
        match self.ty {
            VariableTy::Boolean => self
                .data()
                .is_some_and(|d| d == "true" || d == "1" || d == "yes"),
            VariableTy::String | VariableTy::Iterable => self.data().is_some_and(|d| !d.is_empty()),
        }
    }
}

/// A minimal variable store doubling as the built-in [`Evaluator`].
///
/// This is deliberately not an expression language: conditions and
/// placeholders are plain variable names, `##` statements are `name = value`
/// assignments, and `#for` sources are `var in iterable` over
/// comma-separated iterable data. Anything richer belongs in an external
/// evaluator implementation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Context<'a> {
    data: BTreeMap<String, Variable<'a>>,
}

impl Context<'_> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> Context<'a> {
    pub fn insert<T: AsRef<str>>(&mut self, name: T, variable: Variable<'a>) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), variable);
        self
    }

    pub fn get<T: AsRef<str>>(&self, name: T) -> Option<&Variable<'a>> {
        self.data.get(name.as_ref())
    }

    pub fn contains<T: AsRef<str>>(&self, name: T) -> bool {
        self.data.contains_key(name.as_ref())
    }

    /// Splits a `#for` expression into `(variable, iterable)` names.
    fn loop_parts(expr: ExprRef<'_>) -> EvalResult<(String, String)> {
        let mut words = expr.as_str().split_whitespace();
        match (words.next(), words.next(), words.next(), words.next()) {
            (Some(variable), Some("in"), Some(iterable), None) => {
                Ok((variable.to_string(), iterable.to_string()))
            }
            _ => Err(expr.error(format!(
                "malformed loop expression '{}' (expected 'var in iterable')",
                expr.as_str()
            ))),
        }
    }

    /// The comma-separated items of an iterable variable's data.
    fn items(&self, iterable: &str, expr: ExprRef<'_>) -> EvalResult<Vec<String>> {
        let variable = self
            .get(iterable)
            .ok_or_else(|| expr.error(format!("variable not found: {iterable}")))?;
        if variable.ty() != VariableTy::Iterable {
            return Err(expr.error(format!(
                "variable '{}' is {:?}, expected Iterable",
                iterable,
                variable.ty()
            )));
        }
        let data = variable.data().unwrap_or("");
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(data.split(',').map(|item| item.trim().to_string()).collect())
    }
}

impl Evaluator for Context<'_> {
    fn eval_condition(&mut self, expr: ExprRef<'_>) -> EvalResult<bool> {
        let name = expr.as_str().trim();
        // A missing variable is simply false.
        Ok(self.get(name).is_some_and(Variable::truthy))
    }

    fn eval_placeholder(&mut self, expr: ExprRef<'_>) -> EvalResult<String> {
        let name = expr.as_str().trim();
        let variable = self
            .get(name)
            .ok_or_else(|| expr.error(format!("variable not found: {name}")))?;
        let data = variable
            .data()
            .ok_or_else(|| expr.error(format!("variable data missing: {name}")))?;
        Ok(data.to_string())
    }

    fn exec_statement(&mut self, statement: ExprRef<'_>) -> EvalResult<()> {
        let (name, value) = statement
            .as_str()
            .split_once('=')
            .ok_or_else(|| statement.error("malformed statement (expected 'name = value')"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(statement.error("malformed statement: empty variable name"));
        }
        let value = value.trim().to_string();
        self.insert(name, VariableTy::String.with_data(value));
        Ok(())
    }

    fn begin_loop(&mut self, expr: ExprRef<'_>) -> EvalResult<usize> {
        let (_, iterable) = Self::loop_parts(expr)?;
        Ok(self.items(&iterable, expr)?.len())
    }

    fn bind_loop(&mut self, expr: ExprRef<'_>, index: usize) -> EvalResult<()> {
        let (variable, iterable) = Self::loop_parts(expr)?;
        let mut items = self.items(&iterable, expr)?;
        if index >= items.len() {
            return Err(expr.error(format!(
                "loop index {index} out of range for '{iterable}'"
            )));
        }
        let item = items.swap_remove(index);
        self.insert(&variable, VariableTy::String.with_data(item));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(text: &'static str) -> ExprRef<'static> {
        ExprRef::new(text, Span::new(0, text.len()))
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_truthiness() {
        let mut context = Context::new();
        context.insert("yes", VariableTy::Boolean.with_data("true"));
        context.insert("no", VariableTy::Boolean.with_data("false"));
        context.insert("name", VariableTy::String.with_data("x"));
        context.insert("empty", VariableTy::String.with_data(""));

        assert!(context.eval_condition(expr("yes")).unwrap());
        assert!(!context.eval_condition(expr("no")).unwrap());
        assert!(context.eval_condition(expr("name")).unwrap());
        assert!(!context.eval_condition(expr("empty")).unwrap());
        assert!(!context.eval_condition(expr("missing")).unwrap());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_placeholder_lookup() {
        let mut context = Context::new();
        context.insert("name", VariableTy::String.with_data("World"));
        assert_eq!(context.eval_placeholder(expr("name")).unwrap(), "World");
        let err = context.eval_placeholder(expr("missing")).unwrap_err();
        assert!(err.message.contains("missing"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_statement_assignment() {
        let mut context = Context::new();
        context.exec_statement(expr("greeting = hello")).unwrap();
        assert_eq!(context.get("greeting").unwrap().data(), Some("hello"));

        let err = context.exec_statement(expr("no assignment")).unwrap_err();
        assert!(err.message.contains("malformed"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loop_protocol() {
        let mut context = Context::new();
        context.insert("cats", VariableTy::Iterable.with_data("a, b, c"));

        let loop_expr = expr("cat in cats");
        assert_eq!(context.begin_loop(loop_expr).unwrap(), 3);
        context.bind_loop(loop_expr, 1).unwrap();
        assert_eq!(context.get("cat").unwrap().data(), Some("b"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loop_over_empty_iterable() {
        let mut context = Context::new();
        context.insert("none", VariableTy::Iterable.with_data(""));
        assert_eq!(context.begin_loop(expr("x in none")).unwrap(), 0);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loop_type_mismatch() {
        let mut context = Context::new();
        context.insert("s", VariableTy::String.with_data("abc"));
        let err = context.begin_loop(expr("x in s")).unwrap_err();
        assert!(err.message.contains("Iterable"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_malformed_loop_expression() {
        let mut context = Context::new();
        let err = context.begin_loop(expr("just_one_word")).unwrap_err();
        assert!(err.message.contains("malformed"));
    }
}
