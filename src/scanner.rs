use std::{iter::Peekable, str::Chars};
use strum_macros::{Display, EnumString};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Error,
    Eof,
}

/// Reserved words, checked once an identifier's full extent is known.
/// `phf::Map` is a compile-time perfect hash: this is a single exact-match
/// lookup, not a byte-by-byte walk, so there's no need for the scanner to
/// build its own keyword trie at startup the way a runtime `HashMap`-backed
/// lookup would.
static KEYWORDS: phf::Map<&'static str, TokenType> = phf::phf_map! {
    "and" => TokenType::And,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "if" => TokenType::If,
    "nil" => TokenType::Nil,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "var" => TokenType::Var,
    "while" => TokenType::While,
    "for" => TokenType::For,
    "false" => TokenType::False,
    "fun" => TokenType::Fun,
    "this" => TokenType::This,
    "true" => TokenType::True,
};

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub token_type: TokenType,
    pub value: &'a str,
    pub line: usize,
}

pub struct Scanner<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Box<Scanner<'a>> {
        Box::new(Scanner {
            source,
            chars: source.chars().peekable(),
            start: 0,
            current: 0,
            line: 1,
        })
    }

    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_end() {
            return self.make_token(TokenType::Eof);
        }

        let c = self.advance();

        if Self::is_alpha(c) {
            return self.make_identifier_token();
        }

        if Self::is_digit(c) {
            return self.make_number_token();
        }

        match c {
            '(' => self.make_token(TokenType::LeftParen),
            ')' => self.make_token(TokenType::RightParen),
            '{' => self.make_token(TokenType::LeftBrace),
            '}' => self.make_token(TokenType::RightBrace),
            ';' => self.make_token(TokenType::Semicolon),
            ',' => self.make_token(TokenType::Comma),
            '.' => self.make_token(TokenType::Dot),
            '-' => self.make_token(TokenType::Minus),
            '+' => self.make_token(TokenType::Plus),
            '/' => self.make_token(TokenType::Slash),
            '*' => self.make_token(TokenType::Star),
            '"' => self.make_string_token(),
            '!' => self.make_either_token('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.make_either_token('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.make_either_token('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.make_either_token('=', TokenType::GreaterEqual, TokenType::Greater),
            _ => self.error_token("Unexpected character."),
        }
    }

    fn is_digit(ch: char) -> bool {
        ch.is_ascii_digit()
    }

    fn is_alpha(ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_'
    }

    /// Looks up the lexeme just scanned (`self.start..self.current`) against
    /// the reserved-word table; anything not in `KEYWORDS` is a plain
    /// identifier.
    fn identifier_type(&self) -> TokenType {
        let lexeme = &self.source[self.start..self.current];
        KEYWORDS.get(lexeme).copied().unwrap_or(TokenType::Identifier)
    }

    fn make_identifier_token(&mut self) -> Token<'a> {
        while matches!(self.peek(), Some(c) if Self::is_alpha(*c) || Self::is_digit(*c)) {
            self.advance();
        }
        let token_type = self.identifier_type();
        self.make_token(token_type)
    }

    fn make_number_token(&mut self) -> Token<'a> {
        while matches!(self.peek(), Some(c) if Self::is_digit(*c)) {
            self.advance();
        }

        if self.peek() == Some(&'.') && self.peek_next().is_some_and(Self::is_digit) {
            self.advance(); // consume '.'
            while matches!(self.peek(), Some(c) if Self::is_digit(*c)) {
                self.advance();
            }
        }

        self.make_token(TokenType::Number)
    }

    fn make_string_token(&mut self) -> Token<'a> {
        while let Some(ch) = self.peek() {
            if *ch == '"' {
                break;
            }
            if *ch == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_end() {
            return self.error_token("Unterminated string.");
        }

        self.advance(); // closing quote
        self.make_token(TokenType::String)
    }

    /// Combines the one/two-character operator arms (`!`/`!=`, `=`/`==`, ...)
    /// into a single call site instead of repeating the same `if
    /// match_char` shape four times.
    fn make_either_token(&mut self, second: char, if_matched: TokenType, otherwise: TokenType) -> Token<'a> {
        let token_type = if self.match_char(second) { if_matched } else { otherwise };
        self.make_token(token_type)
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek().copied() {
                Some(c) if c.is_whitespace() => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| *c != '\n') {
                        self.advance();
                    }
                }
                _ => return,
            };
        }
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn peek_next(&self) -> Option<char> {
        if self.is_end() {
            return None;
        }

        let mut iter = self.chars.clone();
        iter.next();
        iter.next()
    }

    fn is_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn make_token(&self, token_type: TokenType) -> Token<'a> {
        Token {
            token_type,
            value: &self.source[self.start..self.current],
            line: self.line,
        }
    }

    fn error_token(&self, reason: &'static str) -> Token<'a> {
        Token {
            token_type: TokenType::Error,
            value: reason,
            line: self.line,
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> char {
        if let Some(next_char) = self.chars.next() {
            self.current += next_char.len_utf8();
            next_char
        } else {
            '\0'
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_win_over_identifiers_with_a_shared_prefix() {
        let mut scanner = Scanner::new("this is for if fun fun1 forfor");

        let expected = [
            (TokenType::This, "this"),
            (TokenType::Identifier, "is"),
            (TokenType::For, "for"),
            (TokenType::If, "if"),
            (TokenType::Fun, "fun"),
            (TokenType::Identifier, "fun1"),
            (TokenType::Identifier, "forfor"),
        ];
        for (token_type, value) in expected {
            let token = scanner.scan_token();
            assert_eq!(token.token_type, token_type);
            assert_eq!(token.value, value);
        }
    }

    #[test]
    fn unexpected_character_is_an_error_token() {
        let mut scanner = Scanner::new("%");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Error);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"never closed");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Error);
    }

    #[test]
    fn numbers_support_a_single_decimal_point() {
        let mut scanner = Scanner::new("1.5 2. .5");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Number);
        assert_eq!(token.value, "1.5");

        // `2.` without a following digit is the integer `2` then a `.` token.
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Number);
        assert_eq!(token.value, "2");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Dot);
    }

    #[test]
    fn line_tracking_follows_newlines_inside_strings_and_comments() {
        let mut scanner = Scanner::new("// a comment\nvar x = \"a\nb\";");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Var);
        assert_eq!(token.line, 2);

        scanner.scan_token(); // x
        scanner.scan_token(); // =
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::String);
        assert_eq!(token.line, 3);
    }

    #[test]
    fn full_program_scans_without_error_tokens() {
        let source = "
            var a = 1;
            fun add(x, y) { return x + y; }
            class Greeter {
                greet() { print \"hi\"; }
            }
            if (a == 1 and true or false) { a = a - 1; }
            while (a > 0) { a = a - 1; }
        ";
        let mut scanner = Scanner::new(source);
        loop {
            let token = scanner.scan_token();
            assert_ne!(token.token_type, TokenType::Error);
            if token.token_type == TokenType::Eof {
                break;
            }
        }
    }
}
