use crate::source::Span;

pub type VeertlResult<T> = std::result::Result<T, VeertlError>;

/// What went wrong during tokenizing or block parsing.
///
/// `Expected`/`UnexpectedEof` are syntax errors: a directive's interior did
/// not match its micro-grammar. The remaining variants are structural
/// errors: a directive appeared where the block parser's stack discipline
/// forbids it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    Expected {
        expected: String,
        found: String,
    },
    UnexpectedEof {
        /// Describes what was expected, e.g. "')'".
        expected: String,
    },
    /// An `#end` with no open block to close.
    UnbalancedEnd,
    /// An `#elif` outside an open `#if`, or after its `#else`.
    UnexpectedElif,
    /// An `#else` outside an open `#if`/`#for`, or a duplicate one.
    UnexpectedElse,
    /// `#function`/`#method`/`#include`/`#inherint` below top level.
    NotAtTopLevel {
        directive: String,
    },
    /// End of input reached with an open block still on the stack.
    UnclosedBlock {
        block: String,
    },
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expected { expected, found } => {
                write!(f, "Expecting {}, but got '{}'", expected, found)
            }
            Self::UnexpectedEof { expected } => {
                write!(f, "Unexpected end of input (expected {})", expected)
            }
            Self::UnbalancedEnd => {
                write!(f, "Unexpected '#end': no open block to close")
            }
            Self::UnexpectedElif => {
                write!(f, "Unexpected '#elif': not inside an open '#if' block")
            }
            Self::UnexpectedElse => {
                write!(f, "Unexpected '#else'")
            }
            Self::NotAtTopLevel { directive } => {
                write!(f, "'{}' is only allowed at the top level", directive)
            }
            Self::UnclosedBlock { block } => {
                write!(f, "Unclosed '{}' block: missing '#end'", block)
            }
        }
    }
}

impl std::error::Error for ParseErrorKind {}

/// A syntax or structural error, carrying the offending source span.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) const fn new(span: Span, kind: ParseErrorKind) -> Self {
        Self { span, kind }
    }

    /// 1-indexed (line, column) of the error within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        self.span.line_col(source)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at bytes {}..{}: {}",
            self.span.start, self.span.stop, self.kind
        )
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// An expression-evaluation failure surfaced by an external [`Evaluator`].
///
/// This core does not interpret or recover from evaluation errors; it only
/// propagates them unchanged up through the render call stack.
///
/// [`Evaluator`]: crate::Evaluator
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvalError {
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Evaluation error at bytes {}..{}: {}",
            self.span.start, self.span.stop, self.message
        )
    }
}

impl std::error::Error for EvalError {}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VeertlError {
    TemplateExists {
        template_name: String,
    },
    MissingTemplate {
        template_name: String,
    },
    MissingFunction {
        function_name: String,
    },
    /// An `#include`/`#inherint` directive reached rendering without
    /// `post_process` having resolved it.
    UnresolvedInclude {
        target: String,
    },
    /// Include/inherit resolution revisited a template already on the
    /// resolution path.
    CircularInclude {
        target: String,
    },
    RenderError {
        message: String,
    },
    Parse(ParseError),
    Eval(EvalError),
}

impl std::fmt::Display for VeertlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TemplateExists { template_name } => {
                write!(f, "Template already exists: {}", template_name)
            }
            Self::MissingTemplate { template_name } => {
                write!(f, "Template not found: {}", template_name)
            }
            Self::MissingFunction { function_name } => {
                write!(f, "Function not found: {}", function_name)
            }
            Self::UnresolvedInclude { target } => {
                write!(f, "Include target '{}' has not been resolved", target)
            }
            Self::CircularInclude { target } => {
                write!(f, "Circular include of template '{}'", target)
            }
            Self::RenderError { message } => {
                write!(f, "Rendering error: {}", message)
            }
            Self::Parse(parse_error) => {
                write!(f, "{}", parse_error)
            }
            Self::Eval(eval_error) => {
                write!(f, "{}", eval_error)
            }
        }
    }
}

impl std::error::Error for VeertlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(parse_error) => Some(parse_error),
            Self::Eval(eval_error) => Some(eval_error),
            Self::TemplateExists { .. }
            | Self::MissingTemplate { .. }
            | Self::MissingFunction { .. }
            | Self::UnresolvedInclude { .. }
            | Self::CircularInclude { .. }
            | Self::RenderError { .. } => None,
        }
    }
}

impl From<ParseError> for VeertlError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<EvalError> for VeertlError {
    fn from(error: EvalError) -> Self {
        Self::Eval(error)
    }
}
