use crate::source::Span;
use crate::template::Template;

/// A node of the parsed template tree.
///
/// The set is closed: it is fixed by the directive keyword table and
/// dispatched by exhaustive matching during rendering. Nodes hold spans into
/// the owning template's source text rather than borrowed slices, so the
/// tree carries no lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// Literal template text.
    Text(Span),
    /// A `${…}` placeholder; the span is the expression interior.
    Placeholder(Span),
    /// A `##…` raw statement line; the span is the statement interior.
    RawStatement(Span),
    /// `#break` / `#continue` / `#return` control-transfer leaves.
    Break(Span),
    Continue(Span),
    Return(Span),
    If(IfNode),
    For(ForNode),
    While(WhileNode),
    DoWhile(DoWhileNode),
    /// Reference to a root-level `#include` directive, rendered in place
    /// once `post_process` has resolved it.
    Include(usize),
}

/// One `(condition, body)` arm of an `#if`/`#elif` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Branch {
    pub condition: Span,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IfNode {
    /// The `#if` arm followed by any `#elif` arms, in source order.
    pub branches: Vec<Branch>,
    pub else_body: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForNode {
    /// Opaque iteration expression, e.g. `item in items`.
    pub expression: Span,
    pub body: Vec<Node>,
    /// Rendered only when the iteration source yields zero iterations.
    pub else_body: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WhileNode {
    pub condition: Span,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DoWhileNode {
    /// Attached by the `#while` that closes the `#do` block. A `#do` block
    /// closed by a bare `#end` has no condition and runs its body once.
    pub condition: Option<Span>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Function,
    Method,
}

/// A top-level `#function`/`#method` definition owned by the template root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Function {
    pub kind: FunctionKind,
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// A root-level `#include`/`#inherint` directive. `resolved` is populated
/// by `post_process` with the parsed target unit.
#[derive(Debug, Clone)]
pub(crate) struct IncludeDirective {
    pub target: String,
    pub span: Span,
    pub resolved: Option<Box<Template>>,
}

/// The template root: top-level body nodes plus the function definitions
/// and include/inherit directives it owns. Ownership is strictly
/// tree-shaped; nodes never reference their parents.
#[derive(Debug, Clone, Default)]
pub(crate) struct Root {
    pub body: Vec<Node>,
    pub functions: Vec<Function>,
    pub includes: Vec<IncludeDirective>,
    pub inherits: Vec<IncludeDirective>,
}

/// Cooperative control transfer produced by rendering a `#break`,
/// `#continue`, or `#return` leaf.
///
/// Signals are expected control flow, not failure: they travel through the
/// render return value, distinct from the error channel, and short-circuit
/// the remaining siblings of whatever sequence produced them. Loops consume
/// `Break` and `Continue`; only a function or method body invocation absorbs
/// `Return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Break,
    Continue,
    Return,
}
