//! Tokenizer for the rule language.

use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// `$"..."` string; holes keep their raw source and byte offset.
    Interpolated(Vec<Segment>),
    Ident(String),
    True,
    False,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    PlusAssign,
    MinusAssign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Hole { source: String, offset: usize },
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            expression: self.source.to_string(),
            position,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, ExpressionError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            let position = self.offset();

            if ch.is_whitespace() {
                self.pos += 1;
                continue;
            }

            let token = match ch {
                '0'..='9' => self.number()?,
                '"' => {
                    self.pos += 1;
                    Token::Str(self.string_body(position)?)
                }
                '$' if self.peek_next() == Some('"') => {
                    self.pos += 2;
                    self.interpolated(position)?
                }
                c if c.is_alphabetic() || c == '_' => self.word(),
                _ => self.operator(position)?,
            };

            tokens.push(Spanned { token, position });
        }

        Ok(tokens)
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.offset();
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !seen_dot && self.peek_next().is_some_and(|n| n.is_ascii_digit())
            {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.source[start..self.offset()];
        if seen_dot {
            text.parse()
                .map(Token::Float)
                .map_err(|_| self.error(start, format!("invalid number '{text}'")))
        } else {
            text.parse()
                .map(Token::Int)
                .map_err(|_| self.error(start, format!("invalid number '{text}'")))
        }
    }

    fn word(&mut self) -> Token {
        let start = self.offset();
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.offset()];
        match word.to_ascii_lowercase().as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "and" => Token::AndAnd,
            "or" => Token::OrOr,
            "not" => Token::Bang,
            _ => Token::Ident(word.to_string()),
        }
    }

    /// Reads up to and including the closing quote.
    fn string_body(&mut self, start: usize) -> Result<String, ExpressionError> {
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(text);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ ('"' | '\\' | '{' | '}')) => text.push(c),
                        Some('n') => text.push('\n'),
                        Some(c) => {
                            text.push('\\');
                            text.push(c);
                        }
                        None => return Err(self.error(start, "unterminated string")),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn interpolated(&mut self, start: usize) -> Result<Token, ExpressionError> {
        let mut segments = Vec::new();
        let mut text = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('n') => text.push('\n'),
                        Some(c) => text.push(c),
                        None => return Err(self.error(start, "unterminated string")),
                    }
                    self.pos += 1;
                }
                Some('{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    let offset = self.offset();
                    let source = self.hole(start)?;
                    segments.push(Segment::Hole { source, offset });
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Token::Interpolated(segments))
    }

    /// Raw source of an interpolation hole, consuming the closing brace.
    fn hole(&mut self, start: usize) -> Result<String, ExpressionError> {
        let begin = self.offset();
        let mut depth = 0usize;
        let mut in_string = false;

        while let Some(c) = self.peek() {
            match c {
                '\\' if in_string => self.pos += 1,
                '"' => in_string = !in_string,
                '{' if !in_string => depth += 1,
                '}' if !in_string => {
                    if depth == 0 {
                        let source = self.source[begin..self.offset()].to_string();
                        self.pos += 1;
                        return Ok(source);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.pos += 1;
        }

        Err(self.error(start, "unclosed '{' in interpolated string"))
    }

    fn operator(&mut self, position: usize) -> Result<Token, ExpressionError> {
        let ch = self.peek().unwrap_or_default();
        let next = self.peek_next();
        let (token, width) = match (ch, next) {
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('+', Some('=')) => (Token::PlusAssign, 2),
            ('-', Some('=')) => (Token::MinusAssign, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            (';', _) => (Token::Semicolon, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('!', _) => (Token::Bang, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('=', _) => (Token::Assign, 1),
            (c, _) => return Err(self.error(position, format!("unexpected character '{c}'"))),
        };
        self.pos += width;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            tokens("a >= 2 and not b || c != 1.5"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Int(2),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::Float(1.5),
            ]
        );
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            tokens("rages -= 1; x = TRUE"),
            vec![
                Token::Ident("rages".into()),
                Token::MinusAssign,
                Token::Int(1),
                Token::Semicolon,
                Token::Ident("x".into()),
                Token::Assign,
                Token::True,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""say \"hi\" \\ ok""#),
            vec![Token::Str(r#"say "hi" \ ok"#.into())]
        );
    }

    #[test]
    fn test_interpolated_segments() {
        let source = r#"$"{name} rages for {Max(1, 2)} rounds""#;
        assert_eq!(
            tokens(source),
            vec![Token::Interpolated(vec![
                Segment::Hole {
                    source: "name".into(),
                    offset: 3,
                },
                Segment::Text(" rages for ".into()),
                Segment::Hole {
                    source: "Max(1, 2)".into(),
                    offset: 20,
                },
                Segment::Text(" rounds".into()),
            ])]
        );
    }

    #[test]
    fn test_errors_report_position() {
        match tokenize("a # b") {
            Err(ExpressionError::Parse { position, .. }) => assert_eq!(position, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(tokenize("\"open").is_err());
        assert!(tokenize("$\"{open\"").is_err());
    }
}
