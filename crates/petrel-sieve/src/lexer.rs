//! Sieve lexer for tokenizing script source.
//!
//! This module implements a lexer for the token classes of RFC 5228
//! section 8.1. It breaks the script into spanned tokens the parser can
//! process. Lexical problems are not fatal: the lexer emits an error token
//! with a range and resynchronises at the next whitespace or delimiter, so
//! a caller always gets a full token stream.

use std::fmt;

/// One Sieve token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// An unquoted identifier like `if`, `header`, `fileinto`. Original
    /// case is preserved; callers lower-case when comparing.
    Identifier(String),
    /// A `:tag` like `:is` or `:over`, including the leading colon.
    Tag(String),
    /// A number, with any `K`/`M`/`G` multiplier already applied.
    Number(u32),
    /// A quoted or multi-line string, decoded.
    String(String),
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// A malformed token; the lexer has already resynchronised.
    Error(String),
    /// End of input.
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "{s}"),
            Self::Tag(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(_) => write!(f, "string"),
            Self::LeftBrace => write!(f, "'{{'"),
            Self::RightBrace => write!(f, "'}}'"),
            Self::LeftParen => write!(f, "'('"),
            Self::RightParen => write!(f, "')'"),
            Self::LeftBracket => write!(f, "'['"),
            Self::RightBracket => write!(f, "']'"),
            Self::Comma => write!(f, "','"),
            Self::Semicolon => write!(f, "';'"),
            Self::Error(m) => write!(f, "{m}"),
            Self::Eof => write!(f, "end of script"),
        }
    }
}

/// A token plus the byte range it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Sieve lexer state.
pub(crate) struct Lexer<'a> {
    src: &'a str,
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source.
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src,
            input: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Reads the next token.
    pub(crate) fn next_token(&mut self) -> SpannedToken {
        if let Some(error) = self.skip_blank() {
            return error;
        }

        let start = self.pos;
        let Some(byte) = self.peek() else {
            return self.spanned(Token::Eof, start);
        };

        match byte {
            b'{' => self.single(Token::LeftBrace),
            b'}' => self.single(Token::RightBrace),
            b'(' => self.single(Token::LeftParen),
            b')' => self.single(Token::RightParen),
            b'[' => self.single(Token::LeftBracket),
            b']' => self.single(Token::RightBracket),
            b',' => self.single(Token::Comma),
            b';' => self.single(Token::Semicolon),

            b'"' => self.read_quoted_string(),

            b':' => self.read_tag(),

            b'0'..=b'9' => self.read_number(),

            _ if byte.is_ascii_alphabetic() || byte == b'_' => self.read_identifier(),

            _ => {
                let c = self.src[self.pos..].chars().next().unwrap_or('?');
                self.pos += c.len_utf8();
                self.error_at(start, format!("Unexpected character: {c}"))
            }
        }
    }

    fn single(&mut self, token: Token) -> SpannedToken {
        let start = self.pos;
        self.pos += 1;
        self.spanned(token, start)
    }

    fn spanned(&self, token: Token, start: usize) -> SpannedToken {
        SpannedToken {
            token,
            start,
            end: self.pos,
        }
    }

    /// Emits an error token and resynchronises at the next whitespace or
    /// delimiter.
    fn error_at(&mut self, start: usize, message: impl Into<String>) -> SpannedToken {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        self.spanned(Token::Error(message.into()), start)
    }

    /// Skips whitespace and both comment forms. Returns an error token for
    /// an unterminated bracket comment.
    fn skip_blank(&mut self) -> Option<SpannedToken> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.pos + 1 >= self.input.len() {
                            self.pos = self.input.len();
                            return Some(self.spanned(
                                Token::Error("Unterminated comment".into()),
                                start,
                            ));
                        }
                        if self.input[self.pos] == b'*' && self.input[self.pos + 1] == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return None,
            }
        }
    }

    fn read_identifier(&mut self) -> SpannedToken {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = &self.src[start..self.pos];

        // "text:" introduces a multi-line string, not an identifier.
        if name.eq_ignore_ascii_case("text") && self.peek() == Some(b':') {
            self.pos += 1;
            return self.read_multiline_string(start);
        }

        self.spanned(Token::Identifier(name.to_string()), start)
    }

    fn read_tag(&mut self) -> SpannedToken {
        let start = self.pos;
        self.pos += 1;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
            _ => return self.error_at(start, "Expected a name after ':'"),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.spanned(Token::Tag(self.src[start..self.pos].to_string()), start)
    }

    fn read_number(&mut self) -> SpannedToken {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
                self.pos += 1;
            } else {
                break;
            }
        }
        if let Some(b) = self.peek() {
            let shift = match b.to_ascii_uppercase() {
                b'K' => Some(10),
                b'M' => Some(20),
                b'G' => Some(30),
                _ => None,
            };
            if let Some(shift) = shift {
                self.pos += 1;
                value = value.saturating_mul(1 << shift);
            }
        }
        match u32::try_from(value) {
            Ok(n) => self.spanned(Token::Number(n), start),
            Err(_) => self.error_at(start, "Number too large"),
        }
    }

    fn read_quoted_string(&mut self) -> SpannedToken {
        let start = self.pos;
        self.pos += 1;
        let mut decoded = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => {
                    // The backslash is dropped; whatever follows stands for
                    // itself, which covers both \" and \\ (RFC 5228 2.4.2).
                    if let Some(b) = self.advance() {
                        decoded.push(b);
                        while let Some(next) = self.peek() {
                            if next & 0xC0 == 0x80 {
                                decoded.push(next);
                                self.pos += 1;
                            } else {
                                break;
                            }
                        }
                    } else {
                        return self.spanned(Token::Error("Unterminated string".into()), start);
                    }
                }
                Some(b) => decoded.push(b),
                None => {
                    return self.spanned(Token::Error("Unterminated string".into()), start);
                }
            }
        }
        match String::from_utf8(decoded) {
            Ok(s) => self.spanned(Token::String(s), start),
            Err(_) => self.error_at(start, "String is not valid UTF-8"),
        }
    }

    /// Reads a multi-line string. `start` is the offset of `text:`, which
    /// the caller has already consumed.
    fn read_multiline_string(&mut self, start: usize) -> SpannedToken {
        // Optional blanks and a hash comment, then the line must end.
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'#') {
            while let Some(b) = self.peek() {
                if b == b'\n' {
                    break;
                }
                self.pos += 1;
            }
        }
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.advance() != Some(b'\n') {
            return self.error_at(start, "Expected a newline after text:");
        }

        let mut decoded = String::new();
        loop {
            if self.pos >= self.input.len() {
                return self.spanned(Token::Error("Unterminated multiline string".into()), start);
            }
            let line_start = self.pos;
            while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
                self.pos += 1;
            }
            let has_newline = self.pos < self.input.len();
            if has_newline {
                self.pos += 1;
            }
            let line = &self.src[line_start..self.pos];

            if line.trim_end_matches(['\r', '\n']) == "." {
                return self.spanned(Token::String(decoded), start);
            }
            // Dot-stuffing: a leading '.' is dropped.
            decoded.push_str(line.strip_prefix('.').unwrap_or(line));
            if !has_newline {
                return self.spanned(Token::Error("Unterminated multiline string".into()), start);
            }
        }
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'{' | b'}' | b'(' | b')' | b'[' | b']' | b',' | b';')
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            let t = lexer.next_token();
            if t.token == Token::Eof {
                return tokens;
            }
            tokens.push(t.token);
        }
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = all_tokens("require \"fileinto\";");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("require".into()),
                Token::String("fileinto".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_identifier_keeps_case() {
        let tokens = all_tokens("FileInto");
        assert_eq!(tokens, vec![Token::Identifier("FileInto".into())]);
    }

    #[test]
    fn test_tags() {
        let tokens = all_tokens(":contains :OVER");
        assert_eq!(
            tokens,
            vec![Token::Tag(":contains".into()), Token::Tag(":OVER".into())]
        );
    }

    #[test]
    fn test_spans() {
        let mut lexer = Lexer::new("if  header");
        let t = lexer.next_token();
        assert_eq!((t.start, t.end), (0, 2));
        let t = lexer.next_token();
        assert_eq!((t.start, t.end), (4, 10));
    }

    #[test]
    fn test_numbers_with_multipliers() {
        assert_eq!(all_tokens("100"), vec![Token::Number(100)]);
        assert_eq!(all_tokens("2K"), vec![Token::Number(2048)]);
        assert_eq!(all_tokens("2k"), vec![Token::Number(2048)]);
        assert_eq!(all_tokens("1M"), vec![Token::Number(1 << 20)]);
        assert_eq!(all_tokens("3G"), vec![Token::Number(3 << 30)]);
    }

    #[test]
    fn test_number_overflow() {
        assert!(matches!(&all_tokens("5G")[0], Token::Error(m) if m == "Number too large"));
        assert!(matches!(
            &all_tokens("4294967296")[0],
            Token::Error(m) if m == "Number too large"
        ));
        assert_eq!(all_tokens("4294967295"), vec![Token::Number(u32::MAX)]);
    }

    #[test]
    fn test_quoted_string_escapes() {
        assert_eq!(
            all_tokens(r#""a \"quote\" and \\ and \x""#),
            vec![Token::String("a \"quote\" and \\ and x".into())]
        );
    }

    #[test]
    fn test_quoted_string_with_newline() {
        assert_eq!(
            all_tokens("\"two\nlines\""),
            vec![Token::String("two\nlines".into())]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(&all_tokens("\"oops")[0], Token::Error(m) if m == "Unterminated string"));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = all_tokens("# a comment\nkeep /* inline */ ;");
        assert_eq!(
            tokens,
            vec![Token::Identifier("keep".into()), Token::Semicolon]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(
            matches!(&all_tokens("/* no end")[0], Token::Error(m) if m == "Unterminated comment")
        );
    }

    #[test]
    fn test_multiline_string() {
        let src = "text:\r\nfirst line\r\nsecond line\r\n.\r\n;";
        let tokens = all_tokens(src);
        assert_eq!(
            tokens,
            vec![
                Token::String("first line\r\nsecond line\r\n".into()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_multiline_dot_stuffing() {
        let src = "text:\n..one dot\n.\n";
        assert_eq!(all_tokens(src), vec![Token::String(".one dot\n".into())]);
    }

    #[test]
    fn test_multiline_unterminated() {
        assert!(matches!(
            &all_tokens("text:\nno dot line")[0],
            Token::Error(m) if m == "Unterminated multiline string"
        ));
    }

    #[test]
    fn test_text_identifier_without_colon() {
        assert_eq!(all_tokens("text "), vec![Token::Identifier("text".into())]);
    }

    #[test]
    fn test_error_resyncs_at_delimiter() {
        let tokens = all_tokens("@@@;keep");
        assert!(matches!(&tokens[0], Token::Error(_)));
        assert_eq!(tokens[1], Token::Semicolon);
        assert_eq!(tokens[2], Token::Identifier("keep".into()));
    }

    #[test]
    fn test_lone_colon() {
        assert!(matches!(&all_tokens(": x")[0], Token::Error(m) if m == "Expected a name after ':'"));
    }
}
