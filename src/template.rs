use log::trace;

use crate::ast::{Function, Node, Root, Signal};
use crate::error::{VeertlError, VeertlResult};
use crate::interface::{Evaluator, ExprRef, SourceProvider};
use crate::parser::parse;

/// A parsed template: the owned source text plus the directive tree built
/// from it.
///
/// Nodes index into `source` by span, so the tree carries no borrowed
/// lifetimes. Rendering walks the tree recursively with an external
/// [`Evaluator`], appending to an output buffer in document order.
///
/// # Example
///
/// ```rust
/// use veertl::{Context, Template, VariableTy};
///
/// let template = Template::parse("Hello, ${name}!").unwrap();
///
/// let mut context = Context::new();
/// context.insert("name", VariableTy::String.with_data("World"));
///
/// let result = template.render(&mut context).unwrap();
/// assert_eq!(result, "Hello, World!");
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    pub(crate) name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    root: Root,
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct TemplateHelper {
            source: String,
            name: Option<String>,
        }

        // Rebuild the tree by re-parsing the stored source.
        let helper = TemplateHelper::deserialize(deserializer)?;
        let mut template = Template::parse(helper.source)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse template: {}", e)))?;
        template.name = helper.name;
        Ok(template)
    }
}

impl Template {
    /// Parses template source into a tree.
    ///
    /// # Errors
    ///
    /// Returns `VeertlError::Parse` when a directive's interior does not
    /// match its micro-grammar (syntax error) or a directive appears where
    /// the block nesting forbids it (structural error).
    pub fn parse<T: Into<String>>(source: T) -> VeertlResult<Self> {
        let source = source.into();
        let root = parse(&source)?;
        Ok(Self {
            source,
            name: None,
            root,
        })
    }

    /// The raw source text this template was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whole-tree finalization, run once after parsing and before
    /// rendering: resolves every `#include`/`#inherint` directive by
    /// loading and parsing its target through `provider`, recursively.
    ///
    /// Included units render in place of their directive and contribute
    /// function definitions; inherited units contribute function
    /// definitions only, with this template's own definitions taking
    /// precedence.
    ///
    /// # Errors
    ///
    /// Fails when a target cannot be loaded or parsed, or when resolution
    /// revisits a template already on the resolution path.
    pub fn post_process<P: SourceProvider>(&mut self, provider: &P) -> VeertlResult<()> {
        let mut visited = Vec::new();
        if let Some(name) = &self.name {
            visited.push(name.clone());
        }
        self.resolve(provider, &mut visited)
    }

    fn resolve<P: SourceProvider>(
        &mut self,
        provider: &P,
        visited: &mut Vec<String>,
    ) -> VeertlResult<()> {
        for directive in self
            .root
            .includes
            .iter_mut()
            .chain(self.root.inherits.iter_mut())
        {
            if directive.resolved.is_some() {
                continue;
            }
            if visited.iter().any(|name| name == &directive.target) {
                return Err(VeertlError::CircularInclude {
                    target: directive.target.clone(),
                });
            }
            trace!(
                "resolving '{}' (directive at bytes {}..{})",
                directive.target, directive.span.start, directive.span.stop
            );
            visited.push(directive.target.clone());
            let mut template = Self::parse(provider.load(&directive.target)?)?;
            template.name = Some(directive.target.clone());
            template.resolve(provider, visited)?;
            directive.resolved = Some(Box::new(template));
            // Diamond-shaped includes are fine; only cycles are rejected.
            visited.pop();
        }
        Ok(())
    }

    /// Whether any include/inherit directive still awaits `post_process`.
    pub fn needs_resolution(&self) -> bool {
        self.root
            .includes
            .iter()
            .chain(self.root.inherits.iter())
            .any(|directive| directive.resolved.is_none())
    }

    /// Renders the template's top-level body with the given evaluator.
    ///
    /// A control signal reaching the top level short-circuits the remaining
    /// top-level nodes, exactly as it would the remainder of any sequence.
    ///
    /// # Errors
    ///
    /// Returns `VeertlError::Eval` when the evaluator fails, and
    /// `VeertlError::UnresolvedInclude` when an `#include` is reached
    /// without `post_process` having run.
    pub fn render<E: Evaluator>(&self, evaluator: &mut E) -> VeertlResult<String> {
        let mut output = String::new();
        self.render_sequence(&self.root.body, evaluator, &mut output)?;
        Ok(output)
    }

    /// Invokes a top-level `#function`/`#method` body, appending its output
    /// to `output`. A `#return` anywhere in the body aborts every enclosing
    /// sequence up to the function boundary and is absorbed here.
    ///
    /// Lookup order is this template's own definitions first, then included
    /// units, then inherited units, so a child definition overrides an
    /// inherited one.
    ///
    /// # Errors
    ///
    /// Returns `VeertlError::MissingFunction` when no definition with the
    /// given name is visible.
    pub fn call<E: Evaluator>(
        &self,
        name: &str,
        evaluator: &mut E,
        output: &mut String,
    ) -> VeertlResult<()> {
        let (owner, function) =
            self.function(name)
                .ok_or_else(|| VeertlError::MissingFunction {
                    function_name: name.to_string(),
                })?;
        trace!(
            "invoking {:?} '{}' ({} parameters, defined at bytes {}..{})",
            function.kind,
            name,
            function.parameters.len(),
            function.span.start,
            function.span.stop
        );
        owner.render_sequence(&function.body, evaluator, output)?;
        Ok(())
    }

    /// Parameter names of a visible function or method, for callers that
    /// bind arguments in their evaluator before [`Template::call`].
    #[must_use]
    pub fn parameters(&self, name: &str) -> Option<&[String]> {
        self.function(name)
            .map(|(_, function)| function.parameters.as_slice())
    }

    /// Finds a function definition together with the template that owns it
    /// (whose source its spans index).
    fn function(&self, name: &str) -> Option<(&Self, &Function)> {
        if let Some(function) = self.root.functions.iter().find(|f| f.name == name) {
            return Some((self, function));
        }
        self.root
            .includes
            .iter()
            .chain(self.root.inherits.iter())
            .filter_map(|directive| directive.resolved.as_deref())
            .find_map(|unit| unit.function(name))
    }

    fn expr(&self, span: crate::source::Span) -> ExprRef<'_> {
        ExprRef::new(&self.source, span)
    }

    /// Renders children strictly in order; the first child whose render
    /// yields a signal stops the sequence immediately and the signal
    /// becomes the sequence's result.
    fn render_sequence<E: Evaluator>(
        &self,
        nodes: &[Node],
        evaluator: &mut E,
        output: &mut String,
    ) -> VeertlResult<Option<Signal>> {
        for node in nodes {
            if let Some(signal) = self.render_node(node, evaluator, output)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    fn render_node<E: Evaluator>(
        &self,
        node: &Node,
        evaluator: &mut E,
        output: &mut String,
    ) -> VeertlResult<Option<Signal>> {
        match node {
            Node::Text(span) => {
                output.push_str(span.text(&self.source));
                Ok(None)
            }
            Node::Placeholder(expression) => {
                let text = evaluator.eval_placeholder(self.expr(*expression))?;
                output.push_str(&text);
                Ok(None)
            }
            Node::RawStatement(statement) => {
                evaluator.exec_statement(self.expr(*statement))?;
                Ok(None)
            }
            Node::Break(_) => Ok(Some(Signal::Break)),
            Node::Continue(_) => Ok(Some(Signal::Continue)),
            Node::Return(_) => Ok(Some(Signal::Return)),
            Node::If(node) => {
                for branch in &node.branches {
                    if evaluator.eval_condition(self.expr(branch.condition))? {
                        return self.render_sequence(&branch.body, evaluator, output);
                    }
                }
                match &node.else_body {
                    Some(body) => self.render_sequence(body, evaluator, output),
                    None => Ok(None),
                }
            }
            Node::For(node) => {
                let iterations = evaluator.begin_loop(self.expr(node.expression))?;
                if iterations == 0 {
                    // Zero iterations selects the else branch, never both.
                    return match &node.else_body {
                        Some(body) => self.render_sequence(body, evaluator, output),
                        None => Ok(None),
                    };
                }
                for index in 0..iterations {
                    evaluator.bind_loop(self.expr(node.expression), index)?;
                    match self.render_sequence(&node.body, evaluator, output)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Return) => return Ok(Some(Signal::Return)),
                        Some(Signal::Continue) | None => {}
                    }
                }
                Ok(None)
            }
            Node::While(node) => {
                while evaluator.eval_condition(self.expr(node.condition))? {
                    match self.render_sequence(&node.body, evaluator, output)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Return) => return Ok(Some(Signal::Return)),
                        Some(Signal::Continue) | None => {}
                    }
                }
                Ok(None)
            }
            Node::DoWhile(node) => {
                loop {
                    match self.render_sequence(&node.body, evaluator, output)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Return) => return Ok(Some(Signal::Return)),
                        Some(Signal::Continue) | None => {}
                    }
                    match node.condition {
                        Some(condition) => {
                            if !evaluator.eval_condition(self.expr(condition))? {
                                break;
                            }
                        }
                        // A '#do' closed by '#end' runs exactly once.
                        None => break,
                    }
                }
                Ok(None)
            }
            Node::Include(index) => {
                let directive = &self.root.includes[*index];
                match &directive.resolved {
                    Some(unit) => unit.render_sequence(&unit.root.body, evaluator, output),
                    None => Err(VeertlError::UnresolvedInclude {
                        target: directive.target.clone(),
                    }),
                }
            }
        }
    }
}
