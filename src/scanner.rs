// A lexeme is the raw sequence of characters in the source code that
// represents a meaningful unit. A token is a categorized representation of
// a lexeme, pairing it with its type.

use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenType, KEYWORDS};
use crate::value::Value;

pub struct Scanner<'d> {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    diagnostics: &'d Diagnostics,
}

impl<'d> Scanner<'d> {
    pub fn new(source: &str, diagnostics: &'d Diagnostics) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            diagnostics,
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        log::trace!("scanned {} tokens", self.tokens.len());
        self.tokens
    }

    fn scan_token(&mut self) {
        let c: char = self.advance();
        match c {
            // single char
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),

            // can be double char
            '!' => {
                let tpe = if self.matches('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(tpe);
            }
            '=' => {
                let tpe = if self.matches('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(tpe);
            }
            '<' => {
                let tpe = if self.matches('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(tpe);
            }
            '>' => {
                let tpe = if self.matches('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(tpe);
            }

            // can be comment
            '/' => {
                if self.matches('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            // ignore whitespace
            ' ' | '\t' | '\r' => (),

            // handle new line
            '\n' => {
                self.line += 1;
            }

            '"' => self.string(),

            c => {
                if c.is_ascii_digit() {
                    self.number()
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier()
                } else {
                    self.diagnostics
                        .lex_error(self.line, "Unexpected character.");
                }
            }
        }
    }

    // consume characters until we reach the closing "
    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.diagnostics.lex_error(self.line, "Unterminated string.");
            return;
        }

        // the closing "
        self.advance();

        // trim the surrounding quotes
        let literal: String = self.source[(self.start + 1)..(self.current - 1)]
            .iter()
            .collect();
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::with_literal(
            TokenType::String,
            lexeme,
            Value::String(literal.into()),
            self.line,
        ));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // consume the .
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme: String = self.source[self.start..self.current].iter().collect();
        let literal: f64 = lexeme.parse().expect("scanned number must be valid f64");

        self.tokens.push(Token::with_literal(
            TokenType::Number,
            lexeme,
            Value::Number(literal),
            self.line,
        ));
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let tpe = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenType::Identifier);

        self.add_token(tpe);
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    // it's like advance but doesn't consume the next character
    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(token_type, text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    // we only consume the current character if that is what we are looking for
    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }

        self.current += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn scan(source: &str) -> Vec<Token> {
        let diagnostics = Diagnostics::new();
        Scanner::new(source, &diagnostics).scan_tokens()
    }

    #[test]
    fn scans_operators_and_punctuation() {
        let tokens = scan("(){};,.+-*!=<=>===!<>/");
        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::Semicolon,
                TokenType::Comma,
                TokenType::Dot,
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Star,
                TokenType::BangEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::EqualEqual,
                TokenType::Bang,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Slash,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_classified_via_perfect_hash() {
        let tokens = scan("and break class continue else false for fun if nil or print return super this true var while x");
        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(types[..17], [
            TokenType::And,
            TokenType::Break,
            TokenType::Class,
            TokenType::Continue,
            TokenType::Else,
            TokenType::False,
            TokenType::For,
            TokenType::Fun,
            TokenType::If,
            TokenType::Nil,
            TokenType::Or,
            TokenType::Print,
            TokenType::Return,
            TokenType::Super,
            TokenType::This,
            TokenType::True,
            TokenType::Var,
        ]);
        assert_eq!(types[17], TokenType::While);
        assert_eq!(types[18], TokenType::Identifier);
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let tokens = scan("var a = 1;\nvar b = 2;\n");
        let b_token = tokens.iter().find(|t| &*t.lexeme == "b").unwrap();
        assert_eq!(b_token.line, 2);
    }

    #[test]
    fn unterminated_string_reports_error_but_keeps_scanning() {
        let diagnostics = Diagnostics::new();
        let tokens = Scanner::new("\"abc", &diagnostics).scan_tokens();
        assert!(diagnostics.had_error());
        // Eof is still produced.
        assert_eq!(tokens.last().unwrap().token_type, TokenType::Eof);
    }

    #[test]
    fn number_literals_parse_as_f64() {
        let tokens = scan("3.14;");
        match &tokens[0].literal {
            Some(Value::Number(n)) => assert_eq!(*n, 3.14),
            other => panic!("expected Number literal, got {other:?}"),
        }
    }
}
