//! Call-expression parser.
//!
//! Turns one textual function-call expression, as emitted by the plan
//! model, into a structured [`Call`]. The grammar is deliberately tiny:
//! literals, lists, dicts, keyword arguments, and one level of call
//! nesting as an argument value. Nothing here evaluates code; the only
//! things a parse can produce are literal values and a function name
//! that the plan compiler later checks against the registry.

use thiserror::Error;

use crate::types::{Call, Literal};

/// Why a call expression failed to parse.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unbalanced delimiters: {0}")]
    UnbalancedDelimiters(String),
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("duplicate keyword argument `{0}`")]
    DuplicateArgument(String),
}

// --- Tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Str(_) => "string literal".to_string(),
            Token::Int(n) => format!("number `{}`", n),
            Token::Float(x) => format!("number `{}`", x),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Colon => "`:`".to_string(),
            Token::Equals => "`=`".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(sc) = chars.next() {
                    if sc == '\\' {
                        match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some('r') => value.push('\r'),
                            Some(escaped) => value.push(escaped),
                            None => break,
                        }
                    } else if sc == quote {
                        closed = true;
                        break;
                    } else {
                        value.push(sc);
                    }
                }
                if !closed {
                    return Err(ParseError::UnbalancedDelimiters(
                        "unterminated string literal".to_string(),
                    ));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut raw = String::new();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit()
                        || nc == '.'
                        || nc == '-'
                        || nc == '+'
                        || nc == 'e'
                        || nc == 'E'
                    {
                        raw.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Ok(n) = raw.parse::<i64>() {
                    tokens.push(Token::Int(n));
                } else if let Ok(x) = raw.parse::<f64>() {
                    tokens.push(Token::Float(x));
                } else {
                    return Err(ParseError::InvalidLiteral(format!(
                        "malformed number `{}`",
                        raw
                    )));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_alphanumeric() || nc == '_' {
                        name.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(ParseError::UnexpectedToken(format!(
                    "character `{}`",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

// --- Parser ---

/// Nested calls may appear only as a direct argument value, one level
/// deep. Anything deeper is a malformed plan.
const MAX_CALL_DEPTH: usize = 1;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, open: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ParseError::UnexpectedToken(format!(
                "expected {}, found {}",
                expected.describe(),
                token.describe()
            ))),
            None => Err(ParseError::UnbalancedDelimiters(format!(
                "unclosed `{}`",
                open
            ))),
        }
    }

    fn parse_call(&mut self, depth: usize) -> Result<Call, ParseError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(token) => {
                return Err(ParseError::UnexpectedToken(format!(
                    "expected function name, found {}",
                    token.describe()
                )))
            }
            None => {
                return Err(ParseError::UnexpectedToken(
                    "expected function name, found end of input".to_string(),
                ))
            }
        };
        self.expect(Token::LParen, "(")?;

        let mut positional = Vec::new();
        let mut keyword: Vec<(String, Literal)> = Vec::new();

        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.next();
                    break;
                }
                None => {
                    return Err(ParseError::UnbalancedDelimiters("unclosed `(`".to_string()))
                }
                Some(_) => {}
            }

            // IDENT '=' literal is a keyword argument; everything else
            // is a positional literal.
            let is_keyword = matches!(
                (self.peek(), self.peek_ahead(1)),
                (Some(Token::Ident(_)), Some(Token::Equals))
            );

            if is_keyword {
                let key = match self.next() {
                    Some(Token::Ident(key)) => key,
                    _ => unreachable!("peeked identifier"),
                };
                self.next(); // '='
                if keyword.iter().any(|(existing, _)| *existing == key) {
                    return Err(ParseError::DuplicateArgument(key));
                }
                let value = self.parse_literal(depth)?;
                keyword.push((key, value));
            } else {
                if !keyword.is_empty() {
                    return Err(ParseError::UnexpectedToken(
                        "positional argument after keyword argument".to_string(),
                    ));
                }
                positional.push(self.parse_literal(depth)?);
            }

            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                Some(Token::RParen) => {}
                Some(token) => {
                    let found = token.describe();
                    return Err(ParseError::UnexpectedToken(format!(
                        "expected `,` or `)`, found {}",
                        found
                    )));
                }
                None => {
                    return Err(ParseError::UnbalancedDelimiters("unclosed `(`".to_string()))
                }
            }
        }

        Ok(Call {
            name,
            positional,
            keyword,
        })
    }

    fn parse_literal(&mut self, depth: usize) -> Result<Literal, ParseError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Literal::Str(value)),
            Some(Token::Int(n)) => Ok(Literal::Int(n)),
            Some(Token::Float(x)) => Ok(Literal::Float(x)),
            Some(Token::Ident(name)) => {
                // Python and JSON spellings are both accepted; the
                // canonical rendering emits the Python ones.
                match name.as_str() {
                    "True" | "true" => return Ok(Literal::Bool(true)),
                    "False" | "false" => return Ok(Literal::Bool(false)),
                    "None" | "none" | "null" => return Ok(Literal::Null),
                    _ => {}
                }
                if matches!(self.peek(), Some(Token::LParen)) {
                    if depth >= MAX_CALL_DEPTH {
                        return Err(ParseError::InvalidLiteral(format!(
                            "call to `{}` nested deeper than one level",
                            name
                        )));
                    }
                    self.pos -= 1; // rewind to the call name
                    let call = self.parse_call(depth + 1)?;
                    return Ok(Literal::Call(Box::new(call)));
                }
                Ok(Literal::Symbol(name))
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::RBracket) => {
                            self.next();
                            break;
                        }
                        None => {
                            return Err(ParseError::UnbalancedDelimiters(
                                "unclosed `[`".to_string(),
                            ))
                        }
                        Some(_) => {}
                    }
                    items.push(self.parse_literal(depth)?);
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.next();
                        }
                        Some(Token::RBracket) => {}
                        Some(token) => {
                            let found = token.describe();
                            return Err(ParseError::UnexpectedToken(format!(
                                "expected `,` or `]`, found {}",
                                found
                            )));
                        }
                        None => {
                            return Err(ParseError::UnbalancedDelimiters(
                                "unclosed `[`".to_string(),
                            ))
                        }
                    }
                }
                Ok(Literal::List(items))
            }
            Some(Token::LBrace) => {
                let mut pairs = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::RBrace) => {
                            self.next();
                            break;
                        }
                        None => {
                            return Err(ParseError::UnbalancedDelimiters(
                                "unclosed `{`".to_string(),
                            ))
                        }
                        Some(_) => {}
                    }
                    let key = match self.next() {
                        Some(Token::Str(key)) => key,
                        Some(token) => {
                            return Err(ParseError::UnexpectedToken(format!(
                                "expected string key, found {}",
                                token.describe()
                            )))
                        }
                        None => {
                            return Err(ParseError::UnbalancedDelimiters(
                                "unclosed `{`".to_string(),
                            ))
                        }
                    };
                    self.expect(Token::Colon, "{")?;
                    let value = self.parse_literal(depth)?;
                    pairs.push((key, value));
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.next();
                        }
                        Some(Token::RBrace) => {}
                        Some(token) => {
                            let found = token.describe();
                            return Err(ParseError::UnexpectedToken(format!(
                                "expected `,` or `}}`, found {}",
                                found
                            )));
                        }
                        None => {
                            return Err(ParseError::UnbalancedDelimiters(
                                "unclosed `{`".to_string(),
                            ))
                        }
                    }
                }
                Ok(Literal::Map(pairs))
            }
            Some(token) => Err(ParseError::UnexpectedToken(format!(
                "expected literal, found {}",
                token.describe()
            ))),
            None => Err(ParseError::UnbalancedDelimiters(
                "expression ended before a literal".to_string(),
            )),
        }
    }
}

/// Parse one trimmed, non-empty call expression into a [`Call`].
pub fn parse_call_expression(input: &str) -> Result<Call, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let call = parser.parse_call(0)?;
    if let Some(trailing) = parser.peek() {
        return Err(ParseError::UnexpectedToken(format!(
            "trailing input after call: {}",
            trailing.describe()
        )));
    }
    Ok(call)
}
