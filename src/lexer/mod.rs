//! Source text → token stream (spec §4.1).

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::ParseErrorDetail;
use crate::token::{LiteralValue, Token, TokenKind};

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("if", If),
        ("else", Else),
        ("while", While),
        ("for", For),
        ("in", In),
        ("return", Return),
        ("throw", Throw),
        ("var", Var),
        ("immut", Immut),
        ("class", Class),
        ("this", This),
        ("import", Import),
        ("export", Export),
        ("from", From),
        ("try", Try),
        ("catch", Catch),
        ("match", Match),
        ("null", Null),
        ("true", True),
        ("false", False),
        ("and", And),
        ("or", Or),
        ("string", TString),
        ("number", TNumber),
        ("boolean", TBoolean),
        ("any", TAny),
        ("void", TVoid),
        ("Array", TArray),
        ("Function", TFunction),
    ])
});

/// Source text → token stream. Unlike the parser, the lexer never halts on
/// a bad character: it records a diagnostic and keeps scanning so a single
/// typo doesn't hide every other lexical error in the file.
pub struct Lexer {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: usize,
    tokens: Vec<Token>,
    errors: Vec<ParseErrorDetail>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Scan the whole source, returning the token stream (terminated with an
    /// `Eof` token) or the diagnostics collected along the way.
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, Vec<ParseErrorDetail>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }
        self.tokens.push(Token::eof(self.line));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char {
        *self.source.get(self.current).unwrap_or(&'\0')
    }

    fn peek_next(&self) -> char {
        *self.source.get(self.current + 1).unwrap_or(&'\0')
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn add_literal(&mut self, kind: TokenKind, literal: LiteralValue) {
        let lexeme = self.lexeme();
        self.tokens
            .push(Token::with_literal(kind, lexeme, literal, self.line));
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(ParseErrorDetail {
            line: self.line,
            message: message.into(),
        });
    }

    fn scan_token(&mut self) {
        use TokenKind::*;

        let c = self.advance();
        match c {
            '(' => self.add_token(LeftParen),
            ')' => self.add_token(RightParen),
            '{' => self.add_token(LeftBrace),
            '}' => self.add_token(RightBrace),
            '[' => self.add_token(LeftBracket),
            ']' => self.add_token(RightBracket),
            ',' => self.add_token(Comma),
            '.' => self.add_token(Dot),
            ';' => self.add_token(Semicolon),
            ':' => self.add_token(Colon),
            '_' => {
                if self.peek().is_alphanumeric() {
                    self.identifier();
                } else {
                    self.add_token(Underscore)
                }
            }
            '$' => self.add_token(Dollar),
            '@' => self.add_token(At),
            '%' => {
                if self.matches('=') {
                    self.add_token(PercentEqual)
                } else {
                    self.add_token(Percent)
                }
            }
            '+' => {
                if self.matches('=') {
                    self.add_token(PlusEqual)
                } else {
                    self.add_token(Plus)
                }
            }
            '-' => {
                if self.matches('=') {
                    self.add_token(MinusEqual)
                } else if self.matches('>') {
                    self.add_token(Arrow)
                } else {
                    self.add_token(Minus)
                }
            }
            '*' => {
                if self.matches('*') {
                    self.add_token(StarStar)
                } else if self.matches('=') {
                    self.add_token(StarEqual)
                } else {
                    self.add_token(Star)
                }
            }
            '/' => {
                if self.matches('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.matches('=') {
                    self.add_token(SlashEqual)
                } else {
                    self.add_token(Slash)
                }
            }
            '!' => {
                if self.matches('=') {
                    self.add_token(BangEqual)
                } else {
                    self.add_token(Bang)
                }
            }
            '=' => {
                if self.matches('=') {
                    self.add_token(EqEqual)
                } else if self.matches('>') {
                    self.add_token(Arrow)
                } else {
                    self.add_token(Eq)
                }
            }
            '<' => {
                if self.matches('=') {
                    self.add_token(LessEqual)
                } else {
                    self.add_token(Less)
                }
            }
            '>' => {
                if self.matches('=') {
                    self.add_token(GreaterEqual)
                } else {
                    self.add_token(Greater)
                }
            }
            '&' => {
                if self.matches('&') {
                    self.add_token(AndAnd)
                } else {
                    self.error(format!("unexpected character '{c}'"));
                }
            }
            '|' => {
                if self.matches('|') {
                    self.add_token(OrOr)
                } else {
                    self.error(format!("unexpected character '{c}'"));
                }
            }
            '?' => {
                if self.matches('?') {
                    self.add_token(QuestionQuestion)
                } else {
                    self.error(format!("unexpected character '{c}'"));
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => self.line += 1,
            '"' => self.string('"'),
            '\'' => self.string('\''),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() => self.identifier(),
            _ => self.error(format!("unexpected character '{c}'")),
        }
    }

    fn string(&mut self, quote: char) {
        let mut raw = String::new();
        while self.peek() != quote && !self.is_at_end() {
            let c = self.advance();
            if c == '\n' {
                self.line += 1;
            }
            if c == '\\' && self.peek() == quote {
                raw.push(self.advance());
                continue;
            }
            raw.push(c);
        }

        if self.is_at_end() {
            self.error("unterminated string");
            return;
        }

        self.advance(); // closing quote

        let value = unescape::unescape(&raw).unwrap_or(raw);
        self.add_literal(TokenKind::String, LiteralValue::Str(value));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = self.lexeme();
        match lexeme.parse::<f64>() {
            Ok(value) => self.add_literal(TokenKind::Number, LiteralValue::Number(value)),
            Err(_) => self.error(format!("invalid numeric literal '{lexeme}'")),
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        match KEYWORDS.get(text.as_str()) {
            Some(kind) => self.add_token(*kind),
            None => self.add_token(TokenKind::Identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_var_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("var x = 42;"),
            vec![Var, Identifier, Eq, Number, Semicolon, Eof]
        );
    }

    #[test]
    fn lexes_immutable_declaration_sigil() {
        use TokenKind::*;
        assert_eq!(
            kinds("@immut x = 1;"),
            vec![At, Immut, Identifier, Eq, Number, Semicolon, Eof]
        );
    }

    #[test]
    fn lexes_function_sigil() {
        use TokenKind::*;
        assert_eq!(
            kinds("$ add(a, b) { return a + b; }"),
            vec![
                Dollar, Identifier, LeftParen, Identifier, Comma, Identifier, RightParen,
                LeftBrace, Return, Identifier, Plus, Identifier, Semicolon, RightBrace, Eof
            ]
        );
    }

    #[test]
    fn lexes_string_with_escapes() {
        let tokens = Lexer::new(r#""a\nb""#).scan_tokens().unwrap();
        assert_eq!(
            tokens[0].literal,
            Some(LiteralValue::Str("a\nb".to_string()))
        );
    }

    #[test]
    fn lexes_power_and_null_coalescing() {
        use TokenKind::*;
        assert_eq!(kinds("a ** b ?? c"), vec![Identifier, StarStar, Identifier, QuestionQuestion, Identifier, Eof]);
    }

    #[test]
    fn reports_unexpected_character_and_keeps_going() {
        let err = Lexer::new("var x = 1 # 2;").scan_tokens().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains('#'));
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = Lexer::new("var x = 1;\nvar y = 2;").scan_tokens().unwrap();
        let y_token = tokens.iter().find(|t| t.lexeme == "y").unwrap();
        assert_eq!(y_token.line, 2);
    }
}
