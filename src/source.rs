/// A half-open byte range `[start, stop)` into a template's source text.
///
/// Spans are attached to tokens, AST nodes, and errors so higher layers can
/// surface precise positions. They never own text; resolving a span requires
/// the source buffer it was cut from.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub stop: usize,
}

impl Span {
    pub(crate) const fn new(start: usize, stop: usize) -> Self {
        debug_assert!(start <= stop);
        Self { start, stop }
    }

    /// Zero-width span at `pos`, used for end-of-input errors.
    pub(crate) const fn empty(pos: usize) -> Self {
        Self {
            start: pos,
            stop: pos,
        }
    }

    pub const fn len(&self) -> usize {
        self.stop - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Resolves this span against the source text it was cut from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.stop]
    }

    /// 1-indexed (line, column) of the span's start, for error display.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let start = self.start.min(source.len());
        let prefix = &source[..start];
        let line = prefix.matches('\n').count() + 1;
        let column = prefix.rfind('\n').map_or(start, |nl| start - nl - 1) + 1;
        (line, column)
    }
}

/// An immutable, sliceable view over template text.
///
/// All scanning consumes a prefix of a cursor and yields the remaining cursor
/// via [`Lexeme::rest`]; nothing mutates text in place.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    text: &'a str,
    start: usize,
    stop: usize,
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

impl<'a> Cursor<'a> {
    /// A cursor over `[start, stop)` of `text`.
    pub(crate) const fn with_range(text: &'a str, start: usize, stop: usize) -> Self {
        debug_assert!(start <= stop && stop <= text.len());
        Self { text, start, stop }
    }

    pub(crate) fn as_str(&self) -> &'a str {
        &self.text[self.start..self.stop]
    }

    /// Scans one lexical token: skips leading whitespace, then consumes
    /// either a single punctuation character or a maximal run of word
    /// characters (alphanumeric or `_`). On an empty or whitespace-only
    /// remainder the returned lexeme is end-of-input.
    pub(crate) fn simple_token(&self) -> Lexeme<'a> {
        let mut chars = self.as_str().char_indices();
        let (start, first) = loop {
            match chars.next() {
                Some((_, ch)) if ch.is_whitespace() => {}
                Some((i, ch)) => break (self.start + i, ch),
                None => {
                    return Lexeme {
                        text: self.text,
                        span: Span::empty(self.stop),
                        limit: self.stop,
                    };
                }
            }
        };

        let stop = if is_word_char(first) {
            let mut stop = self.stop;
            for (i, ch) in self.text[start..self.stop].char_indices() {
                if !is_word_char(ch) {
                    stop = start + i;
                    break;
                }
            }
            stop
        } else {
            start + first.len_utf8()
        };

        Lexeme {
            text: self.text,
            span: Span::new(start, stop),
            limit: self.stop,
        }
    }
}

/// A lexical token cut from a cursor: a span classified implicitly by its
/// content, plus the cursor positioned immediately after it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lexeme<'a> {
    text: &'a str,
    span: Span,
    limit: usize,
}

impl<'a> Lexeme<'a> {
    pub(crate) fn as_str(&self) -> &'a str {
        self.span.text(self.text)
    }

    pub(crate) const fn span(&self) -> Span {
        self.span
    }

    pub(crate) const fn is_eof(&self) -> bool {
        self.span.is_empty()
    }

    /// The cursor positioned after this lexeme's consumed run.
    pub(crate) const fn rest(&self) -> Cursor<'a> {
        Cursor::with_range(self.text, self.span.stop, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(text: &str) -> Cursor<'_> {
        Cursor::with_range(text, 0, text.len())
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_token_word() {
        let cursor = cursor("  hello world");
        let lexeme = cursor.simple_token();
        assert_eq!(lexeme.as_str(), "hello");
        assert_eq!(lexeme.span(), Span::new(2, 7));
        assert_eq!(lexeme.rest().as_str(), " world");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_token_punctuation_is_single_char() {
        let cursor = cursor("(a, b)");
        let open = cursor.simple_token();
        assert_eq!(open.as_str(), "(");
        let a = open.rest().simple_token();
        assert_eq!(a.as_str(), "a");
        let comma = a.rest().simple_token();
        assert_eq!(comma.as_str(), ",");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_token_eof_on_whitespace() {
        let cursor = cursor("   \t\n ");
        let lexeme = cursor.simple_token();
        assert!(lexeme.is_eof());
        assert!(lexeme.rest().as_str().is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_token_chain_reparses_nothing() {
        // Each lexeme's rest starts exactly after the consumed run.
        let cursor = cursor("f(a,b)");
        let mut lexeme = cursor.simple_token();
        let mut collected = Vec::new();
        while !lexeme.is_eof() {
            collected.push(lexeme.as_str());
            lexeme = lexeme.rest().simple_token();
        }
        assert_eq!(collected, vec!["f", "(", "a", ",", "b", ")"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_span_line_col() {
        let source = "ab\ncd\nef";
        assert_eq!(Span::new(0, 1).line_col(source), (1, 1));
        assert_eq!(Span::new(4, 5).line_col(source), (2, 2));
        assert_eq!(Span::new(6, 8).line_col(source), (3, 1));
        // End-of-input position.
        assert_eq!(Span::empty(8).line_col(source), (3, 3));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_span_text_resolution() {
        let source = "hello world";
        assert_eq!(Span::new(6, 11).text(source), "world");
        assert!(Span::empty(3).text(source).is_empty());
    }
}
