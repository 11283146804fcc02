mod ast;
mod engine;
mod error;
mod interface;
mod parser;
mod source;
mod template;
mod token;

// Public exports.
pub use engine::VeertlEngine;
pub use error::{EvalError, ParseError, ParseErrorKind, VeertlError, VeertlResult};
pub use interface::{Context, EvalResult, Evaluator, ExprRef, SourceProvider, Variable, VariableTy};
pub use source::Span;
pub use template::Template;
