use log::trace;

use crate::ast::{
    Branch, DoWhileNode, ForNode, Function, FunctionKind, IfNode, IncludeDirective, Node, Root,
    WhileNode,
};
use crate::error::{ParseError, ParseErrorKind};
use crate::source::Span;
use crate::token::{Token, TokenKind, Tokenizer};

/// Parses template source into a [`Root`] tree.
///
/// A single forward pass over the token stream; nesting is validated
/// eagerly against a stack of open containers, so a misplaced directive
/// fails at the offending token with its exact source span.
pub(crate) fn parse(source: &str) -> Result<Root, ParseError> {
    let mut parser = BlockParser {
        source,
        root: Root::default(),
        stack: Vec::new(),
    };
    for token in Tokenizer::new(source) {
        parser.accept(token?)?;
    }
    parser.finish()
}

/// An open container node. A container is mutable (receiving children)
/// while it sits on the stack and becomes immutable once popped.
enum Frame {
    If {
        branches: Vec<Branch>,
        else_body: Option<Vec<Node>>,
    },
    For {
        expression: Span,
        body: Vec<Node>,
        else_body: Option<Vec<Node>>,
    },
    While {
        condition: Span,
        body: Vec<Node>,
    },
    Do {
        body: Vec<Node>,
    },
    Function {
        kind: FunctionKind,
        name: String,
        parameters: Vec<String>,
        opened: Span,
        body: Vec<Node>,
    },
}

impl Frame {
    fn describe(&self) -> &'static str {
        match self {
            Self::If { .. } => "#if",
            Self::For { .. } => "#for",
            Self::While { .. } => "#while",
            Self::Do { .. } => "#do",
            Self::Function {
                kind: FunctionKind::Function,
                ..
            } => "#function",
            Self::Function {
                kind: FunctionKind::Method,
                ..
            } => "#method",
        }
    }
}

struct BlockParser<'a> {
    source: &'a str,
    root: Root,
    stack: Vec<Frame>,
}

impl BlockParser<'_> {
    fn accept(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::End => match self.stack.pop() {
                Some(frame) => {
                    trace!("closed {} block", frame.describe());
                    self.close(frame);
                    Ok(())
                }
                None => Err(ParseError::new(token.span, ParseErrorKind::UnbalancedEnd)),
            },
            // Context-sensitive: a '#while' closes an open '#do' block,
            // otherwise it opens a new loop of its own.
            TokenKind::While { condition } => {
                if matches!(self.stack.last(), Some(Frame::Do { .. })) {
                    if let Some(Frame::Do { body }) = self.stack.pop() {
                        trace!("closed #do block with while-condition");
                        self.push_node(Node::DoWhile(DoWhileNode {
                            condition: Some(condition),
                            body,
                        }));
                    }
                    Ok(())
                } else {
                    self.open(Frame::While {
                        condition,
                        body: Vec::new(),
                    });
                    Ok(())
                }
            }
            TokenKind::Function { name, arguments } => {
                self.open_function(token.span, FunctionKind::Function, name, arguments)
            }
            TokenKind::Method { name, arguments } => {
                self.open_function(token.span, FunctionKind::Method, name, arguments)
            }
            TokenKind::If { condition } => {
                self.open(Frame::If {
                    branches: vec![Branch {
                        condition,
                        body: Vec::new(),
                    }],
                    else_body: None,
                });
                Ok(())
            }
            TokenKind::For { expression } => {
                self.open(Frame::For {
                    expression,
                    body: Vec::new(),
                    else_body: None,
                });
                Ok(())
            }
            TokenKind::Do => {
                self.open(Frame::Do { body: Vec::new() });
                Ok(())
            }
            TokenKind::Elif { condition } => match self.stack.last_mut() {
                Some(Frame::If {
                    branches,
                    else_body: None,
                }) => {
                    branches.push(Branch {
                        condition,
                        body: Vec::new(),
                    });
                    Ok(())
                }
                // Includes '#elif' after '#else' on the same block.
                _ => Err(ParseError::new(token.span, ParseErrorKind::UnexpectedElif)),
            },
            TokenKind::Else => match self.stack.last_mut() {
                Some(Frame::If { else_body, .. } | Frame::For { else_body, .. })
                    if else_body.is_none() =>
                {
                    *else_body = Some(Vec::new());
                    Ok(())
                }
                // Includes a duplicate '#else' on the same block.
                _ => Err(ParseError::new(token.span, ParseErrorKind::UnexpectedElse)),
            },
            TokenKind::Include { target } => self.top_level_directive(token.span, target, false),
            TokenKind::Inherint { target } => self.top_level_directive(token.span, target, true),
            TokenKind::Text => {
                self.push_node(Node::Text(token.span));
                Ok(())
            }
            TokenKind::Placeholder { expression } => {
                self.push_node(Node::Placeholder(expression));
                Ok(())
            }
            TokenKind::RawStatement { statement } => {
                self.push_node(Node::RawStatement(statement));
                Ok(())
            }
            TokenKind::Break => {
                self.push_node(Node::Break(token.span));
                Ok(())
            }
            TokenKind::Continue => {
                self.push_node(Node::Continue(token.span));
                Ok(())
            }
            TokenKind::Return => {
                self.push_node(Node::Return(token.span));
                Ok(())
            }
        }
    }

    fn open(&mut self, frame: Frame) {
        trace!("opened {} block at depth {}", frame.describe(), self.stack.len() + 1);
        self.stack.push(frame);
    }

    fn open_function(
        &mut self,
        span: Span,
        kind: FunctionKind,
        name: Span,
        arguments: Vec<Span>,
    ) -> Result<(), ParseError> {
        if !self.stack.is_empty() {
            let directive = match kind {
                FunctionKind::Function => "#function",
                FunctionKind::Method => "#method",
            };
            return Err(ParseError::new(
                span,
                ParseErrorKind::NotAtTopLevel {
                    directive: directive.to_string(),
                },
            ));
        }
        self.open(Frame::Function {
            kind,
            name: name.text(self.source).to_string(),
            parameters: arguments
                .iter()
                .map(|a| a.text(self.source).to_string())
                .collect(),
            opened: span,
            body: Vec::new(),
        });
        Ok(())
    }

    fn top_level_directive(
        &mut self,
        span: Span,
        target: Span,
        inherit: bool,
    ) -> Result<(), ParseError> {
        if !self.stack.is_empty() {
            return Err(ParseError::new(
                span,
                ParseErrorKind::NotAtTopLevel {
                    directive: if inherit { "#inherint" } else { "#include" }.to_string(),
                },
            ));
        }
        let directive = IncludeDirective {
            target: target.text(self.source).to_string(),
            span,
            resolved: None,
        };
        if inherit {
            self.root.inherits.push(directive);
        } else {
            let index = self.root.includes.len();
            self.root.includes.push(directive);
            self.root.body.push(Node::Include(index));
        }
        Ok(())
    }

    /// Appends a node to whichever body is currently being populated on the
    /// innermost open container (the else branch if one is open, else the
    /// latest elif branch, else the main body).
    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => self.root.body.push(node),
            Some(Frame::If {
                branches,
                else_body,
            }) => match else_body {
                Some(body) => body.push(node),
                None => branches
                    .last_mut()
                    .expect("an if frame always holds at least one branch")
                    .body
                    .push(node),
            },
            Some(Frame::For {
                body, else_body, ..
            }) => match else_body {
                Some(else_body) => else_body.push(node),
                None => body.push(node),
            },
            Some(
                Frame::While { body, .. } | Frame::Do { body } | Frame::Function { body, .. },
            ) => body.push(node),
        }
    }

    /// Converts a popped frame into its closed node and attaches it.
    fn close(&mut self, frame: Frame) {
        match frame {
            Frame::If {
                branches,
                else_body,
            } => self.push_node(Node::If(IfNode {
                branches,
                else_body,
            })),
            Frame::For {
                expression,
                body,
                else_body,
            } => self.push_node(Node::For(ForNode {
                expression,
                body,
                else_body,
            })),
            Frame::While { condition, body } => {
                self.push_node(Node::While(WhileNode { condition, body }));
            }
            // A '#do' closed by a bare '#end' keeps no condition.
            Frame::Do { body } => self.push_node(Node::DoWhile(DoWhileNode {
                condition: None,
                body,
            })),
            // Functions only open at top level, so after the pop the new
            // top is always the root.
            Frame::Function {
                kind,
                name,
                parameters,
                opened,
                body,
            } => self.root.functions.push(Function {
                kind,
                name,
                parameters,
                body,
                span: opened,
            }),
        }
    }

    fn finish(self) -> Result<Root, ParseError> {
        if let Some(frame) = self.stack.last() {
            return Err(ParseError::new(
                Span::empty(self.source.len()),
                ParseErrorKind::UnclosedBlock {
                    block: frame.describe().to_string(),
                },
            ));
        }
        Ok(self.root)
    }
}
