use crate::error::{ParseError, ParseErrorKind};
use crate::source::{Cursor, Lexeme, Span};

/// A directive token: a source span plus kind-specific fields.
///
/// Every token's span covers the source text from its opening marker through
/// its last consumed character, so continuations never re-scan consumed text
/// and never skip any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub span: Span,
    pub kind: TokenKind,
}

/// The fixed, closed set of directive token kinds.
///
/// Expression fields are opaque source spans handed to the external
/// expression evaluator; this core never parses their interior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text,
    Placeholder { expression: Span },
    RawStatement { statement: Span },
    If { condition: Span },
    Elif { condition: Span },
    While { condition: Span },
    For { expression: Span },
    Function { name: Span, arguments: Vec<Span> },
    Method { name: Span, arguments: Vec<Span> },
    Include { target: Span },
    Inherint { target: Span },
    End,
    Do,
    Else,
    Break,
    Continue,
    Return,
}

/// Byte offset of the end of the line starting at or after `pos`
/// (exclusive of the `\r`/`\n` terminator).
fn line_end(source: &str, pos: usize) -> usize {
    source[pos..]
        .find(['\r', '\n'])
        .map_or(source.len(), |offset| pos + offset)
}

/// The span `[start, stop)` with leading and trailing whitespace removed.
fn trim_span(source: &str, start: usize, stop: usize) -> Span {
    let raw = &source[start..stop];
    let trimmed_start = raw.trim_start();
    let new_start = start + (raw.len() - trimmed_start.len());
    let trimmed = trimmed_start.trim_end();
    Span::new(new_start, new_start + trimmed.len())
}

/// Splits the source into a gapless, non-overlapping sequence of directive
/// tokens. Empty text prefixes between adjacent directives are skipped
/// rather than emitted as zero-width tokens.
pub(crate) struct Tokenizer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub(crate) const fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn eof_error(&self, expected: &str) -> ParseError {
        ParseError::new(
            Span::empty(self.source.len()),
            ParseErrorKind::UnexpectedEof {
                expected: expected.to_string(),
            },
        )
    }

    /// Classifies the directive at `self.pos`, which sits on a `$` or `#`.
    fn directive(&self) -> Result<Token, ParseError> {
        let rest = &self.source[self.pos..];
        if rest.starts_with("${") {
            self.placeholder()
        } else if rest.starts_with("##") {
            Ok(self.raw_statement())
        } else if rest.starts_with('#') {
            self.statement()
        } else {
            // A lone '$' is literal text.
            Ok(Token {
                span: Span::new(self.pos, self.pos + 1),
                kind: TokenKind::Text,
            })
        }
    }

    /// `${…}` to the matching close brace, tracking nesting depth.
    fn placeholder(&self) -> Result<Token, ParseError> {
        let open = self.pos;
        let mut depth = 1usize;
        for (i, ch) in self.source[open + 2..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let stop = open + 2 + i + 1;
                        return Ok(Token {
                            span: Span::new(open, stop),
                            kind: TokenKind::Placeholder {
                                expression: trim_span(self.source, open + 2, stop - 1),
                            },
                        });
                    }
                }
                _ => {}
            }
        }
        Err(self.eof_error("'}'"))
    }

    /// `##…` to end of line.
    fn raw_statement(&self) -> Token {
        let start = self.pos;
        let stop = line_end(self.source, start + 2);
        Token {
            span: Span::new(start, stop),
            kind: TokenKind::RawStatement {
                statement: trim_span(self.source, start + 2, stop),
            },
        }
    }

    /// `#keyword …` dispatch. An unrecognized word after `#` is not an
    /// error: the `#` degrades to a one-character text token and scanning
    /// continues after it.
    fn statement(&self) -> Result<Token, ParseError> {
        let hash = self.pos;
        let keyword = Cursor::with_range(self.source, hash + 1, self.source.len()).simple_token();

        let simple = |kind: TokenKind| {
            Ok(Token {
                span: Span::new(hash, keyword.span().stop),
                kind,
            })
        };
        let conditional = |make: fn(Span) -> TokenKind| {
            let stop = line_end(self.source, keyword.span().stop);
            Ok(Token {
                span: Span::new(hash, stop),
                kind: make(trim_span(self.source, keyword.span().stop, stop)),
            })
        };

        match keyword.as_str() {
            "end" => simple(TokenKind::End),
            "do" => simple(TokenKind::Do),
            "else" => simple(TokenKind::Else),
            "break" => simple(TokenKind::Break),
            "continue" => simple(TokenKind::Continue),
            "return" => simple(TokenKind::Return),
            "if" => conditional(|condition| TokenKind::If { condition }),
            "elif" => conditional(|condition| TokenKind::Elif { condition }),
            "while" => conditional(|condition| TokenKind::While { condition }),
            "for" => conditional(|expression| TokenKind::For { expression }),
            "include" => self.named_target(hash, &keyword, |target| TokenKind::Include { target }),
            "inherint" => self.named_target(hash, &keyword, |target| TokenKind::Inherint { target }),
            "function" => self.signature(hash, &keyword, false),
            "method" => self.signature(hash, &keyword, true),
            _ => Ok(Token {
                span: Span::new(hash, hash + 1),
                kind: TokenKind::Text,
            }),
        }
    }

    /// `#include name` / `#inherint name`: the target is the trimmed
    /// remainder of the line.
    fn named_target(
        &self,
        hash: usize,
        keyword: &Lexeme<'_>,
        make: fn(Span) -> TokenKind,
    ) -> Result<Token, ParseError> {
        let stop = line_end(self.source, keyword.span().stop);
        let target = trim_span(self.source, keyword.span().stop, stop);
        if target.is_empty() {
            return Err(ParseError::new(
                target,
                ParseErrorKind::Expected {
                    expected: "a template name".to_string(),
                    found: "end of line".to_string(),
                },
            ));
        }
        Ok(Token {
            span: Span::new(hash, stop),
            kind: make(target),
        })
    }

    /// `#function name(arg, …)` / `#method name(arg, …)`.
    ///
    /// The separator loop breaks on `)` wherever it appears, so a dangling
    /// comma before `)` reads as "zero more arguments" and an argument
    /// literally named `)` is indistinguishable from the end of the list.
    /// That coincidence is part of the grammar and is preserved as-is.
    fn signature(
        &self,
        hash: usize,
        keyword: &Lexeme<'_>,
        method: bool,
    ) -> Result<Token, ParseError> {
        let name = keyword.rest().simple_token();
        if name.is_eof() {
            return Err(self.eof_error("a function name"));
        }

        let open = name.rest().simple_token();
        if open.is_eof() {
            return Err(self.eof_error("open bracket '('"));
        }
        if open.as_str() != "(" {
            return Err(ParseError::new(
                open.span(),
                ParseErrorKind::Expected {
                    expected: "open bracket '('".to_string(),
                    found: open.as_str().to_string(),
                },
            ));
        }

        let mut arguments = Vec::new();
        let mut cursor = open.rest();
        let stop = loop {
            let argument = cursor.simple_token();
            if argument.is_eof() {
                return Err(self.eof_error("')'"));
            }
            if argument.as_str() == ")" {
                break argument.span().stop;
            }
            arguments.push(argument.span());

            let separator = argument.rest().simple_token();
            if separator.is_eof() {
                return Err(self.eof_error("',' or ')'"));
            }
            match separator.as_str() {
                "," => cursor = separator.rest(),
                ")" => break separator.span().stop,
                other => {
                    return Err(ParseError::new(
                        separator.span(),
                        ParseErrorKind::Expected {
                            expected: "',' or ')'".to_string(),
                            found: other.to_string(),
                        },
                    ));
                }
            }
        };

        let name = name.span();
        let kind = if method {
            TokenKind::Method { name, arguments }
        } else {
            TokenKind::Function { name, arguments }
        };
        Ok(Token {
            span: Span::new(hash, stop),
            kind,
        })
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.source.len() {
            return None;
        }
        match self.source[self.pos..].find(['$', '#']) {
            None => {
                let token = Token {
                    span: Span::new(self.pos, self.source.len()),
                    kind: TokenKind::Text,
                };
                self.pos = self.source.len();
                Some(Ok(token))
            }
            Some(0) => match self.directive() {
                Ok(token) => {
                    self.pos = token.span.stop;
                    Some(Ok(token))
                }
                Err(error) => {
                    // No recovery: poison the stream.
                    self.pos = self.source.len();
                    Some(Err(error))
                }
            },
            Some(offset) => {
                let token = Token {
                    span: Span::new(self.pos, self.pos + offset),
                    kind: TokenKind::Text,
                };
                self.pos += offset;
                Some(Ok(token))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(source: &str) -> Vec<Token> {
        Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn texts<'a>(source: &'a str, tokens: &[Token]) -> Vec<&'a str> {
        tokens.iter().map(|t| t.span.text(source)).collect()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_plain_text() {
        let source = "just some text";
        let tokens = tokenize(source);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].span.text(source), source);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_placeholder_between_text() {
        let source = "foo ${bar} baz";
        let tokens = tokenize(source);
        assert_eq!(texts(source, &tokens), vec!["foo ", "${bar}", " baz"]);
        let TokenKind::Placeholder { expression } = tokens[1].kind else {
            panic!("expected placeholder, got {:?}", tokens[1].kind);
        };
        assert_eq!(expression.text(source), "bar");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_placeholder_nested_braces() {
        let source = "${ {a: 1} }";
        let tokens = tokenize(source);
        assert_eq!(tokens.len(), 1);
        let TokenKind::Placeholder { expression } = tokens[0].kind else {
            panic!("expected placeholder");
        };
        assert_eq!(expression.text(source), "{a: 1}");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_placeholder_unterminated() {
        let source = "text ${oops";
        let err = Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert_eq!(err.span, Span::empty(source.len()));
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEof { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_block_tokens() {
        let source = "foo\n#if zap == 3\nzip\n#end\nbaz";
        let tokens = tokenize(source);
        assert_eq!(
            texts(source, &tokens),
            vec!["foo\n", "#if zap == 3", "\nzip\n", "#end", "\nbaz"]
        );
        let TokenKind::If { condition } = tokens[1].kind else {
            panic!("expected if token");
        };
        assert_eq!(condition.text(source), "zap == 3");
        assert_eq!(tokens[3].kind, TokenKind::End);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_raw_statement_to_end_of_line() {
        let source = "\tfoo\r\n## a = 5\r\nzip";
        let tokens = tokenize(source);
        assert_eq!(
            texts(source, &tokens),
            vec!["\tfoo\r\n", "## a = 5", "\r\nzip"]
        );
        let TokenKind::RawStatement { statement } = tokens[1].kind else {
            panic!("expected raw statement");
        };
        assert_eq!(statement.text(source), "a = 5");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_keyword_degrades_to_text() {
        let source = "a #foo b";
        let tokens = tokenize(source);
        assert_eq!(texts(source, &tokens), vec!["a ", "#", "foo b"]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_lone_dollar_is_text() {
        let source = "price: $5";
        let tokens = tokenize(source);
        assert_eq!(texts(source, &tokens), vec!["price: ", "$", "5"]);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_coverage_reconstructs_input() {
        let sources = [
            "plain",
            "foo ${bar} baz",
            "#if a\nx\n#elif b\ny\n#else\nz\n#end",
            "#for x in xs\n${x}\n#end",
            "#do\nbody\n#while cond",
            "#function f(a, b)\n${a}\n#end",
            "## x = 1\n#include base\n#unknown $",
            "",
        ];
        for source in sources {
            let tokens = tokenize(source);
            let rebuilt: String = tokens.iter().map(|t| t.span.text(source)).collect();
            assert_eq!(rebuilt, source, "coverage failed for {source:?}");
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_signature() {
        let source = "#function f(a, b)";
        let tokens = tokenize(source);
        assert_eq!(tokens.len(), 1);
        let TokenKind::Function { name, arguments } = &tokens[0].kind else {
            panic!("expected function token");
        };
        assert_eq!(name.text(source), "f");
        let args: Vec<&str> = arguments.iter().map(|a| a.text(source)).collect();
        assert_eq!(args, vec!["a", "b"]);
        assert_eq!(tokens[0].span.text(source), "#function f(a, b)");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_method_signature_empty_arguments() {
        let source = "#method render()";
        let tokens = tokenize(source);
        let TokenKind::Method { name, arguments } = &tokens[0].kind else {
            panic!("expected method token");
        };
        assert_eq!(name.text(source), "render");
        assert!(arguments.is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_trailing_comma_accepted() {
        // The ')' check runs first on every loop iteration, so a trailing
        // comma reads as "zero more arguments".
        let source = "#function f(a, )";
        let tokens = tokenize(source);
        let TokenKind::Function { arguments, .. } = &tokens[0].kind else {
            panic!("expected function token");
        };
        let args: Vec<&str> = arguments.iter().map(|a| a.text(source)).collect();
        assert_eq!(args, vec!["a"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_missing_open_bracket() {
        let source = "#function f a, b)";
        let err = Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        // The error points at the token found where '(' was expected.
        assert_eq!(err.span.text(source), "a");
        assert!(
            matches!(err.kind, ParseErrorKind::Expected { ref expected, .. } if expected.contains('('))
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_unterminated() {
        let source = "#function f(";
        let err = Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert_eq!(err.span, Span::empty(source.len()));
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEof { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_bad_separator() {
        let source = "#function f(a; b)";
        let err = Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert_eq!(err.span.text(source), ";");
        assert!(matches!(err.kind, ParseErrorKind::Expected { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_include_and_inherint_targets() {
        let source = "#include header.vtl\n#inherint base";
        let tokens = tokenize(source);
        let TokenKind::Include { target } = tokens[0].kind else {
            panic!("expected include");
        };
        assert_eq!(target.text(source), "header.vtl");
        let TokenKind::Inherint { target } = tokens[2].kind else {
            panic!("expected inherint");
        };
        assert_eq!(target.text(source), "base");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_include_missing_target() {
        let source = "#include \nrest";
        let err = Tokenizer::new(source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Expected { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_do_while_tokens() {
        let source = "#do\nbody\n#while x < 3";
        let tokens = tokenize(source);
        assert_eq!(tokens[0].kind, TokenKind::Do);
        let TokenKind::While { condition } = tokens[2].kind else {
            panic!("expected while token");
        };
        assert_eq!(condition.text(source), "x < 3");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_condition_is_opaque() {
        // The condition span is handed to the evaluator unparsed, even
        // when empty.
        let source = "#if \nx\n#end";
        let tokens = tokenize(source);
        let TokenKind::If { condition } = tokens[0].kind else {
            panic!("expected if token");
        };
        assert!(condition.is_empty());
    }
}
