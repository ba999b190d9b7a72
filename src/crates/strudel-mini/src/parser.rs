use crate::ast::{Ast, Step};
use crate::error::{ParseError, Result};
use crate::lexer::{Lexer, Token};
use crate::span::Span;

/// Parse mini notation into a syntax tree
pub fn parse(source: &str) -> Result<Ast> {
    Parser::new(source)?.parse_pattern()
}

/// Closing delimiter the current group is waiting for
#[derive(Clone, Copy)]
struct Closer {
    token: Token,
    open: char,
    open_span: Span,
}

/// Recursive descent parser for mini notation
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Result<Self> {
        Ok(Parser {
            lexer: Lexer::new(source)?,
        })
    }

    /// Parse the whole input as one pattern
    pub fn parse_pattern(&mut self) -> Result<Ast> {
        if self.lexer.peek().is_none() {
            return Err(ParseError::Empty {
                what: "pattern",
                span: self.lexer.end_span(),
            });
        }

        let ast = self.parse_layers(None)?;

        if let Some((token, span)) = self.lexer.next_token() {
            return Err(ParseError::unexpected_token(
                "end of pattern",
                token.to_string(),
                span,
            ));
        }

        Ok(ast.simplify())
    }

    /// Comma separated sequences
    fn parse_layers(&mut self, close: Option<Closer>) -> Result<Ast> {
        let mut layers = vec![self.parse_sequence(close)?];

        while let Some((Token::Comma, _)) = self.lexer.peek() {
            self.lexer.next_token();
            layers.push(self.parse_sequence(close)?);
        }

        if layers.len() == 1 {
            Ok(layers.remove(0))
        } else {
            Ok(Ast::Stack(layers.into_iter().map(Ast::simplify).collect()))
        }
    }

    fn parse_sequence(&mut self, close: Option<Closer>) -> Result<Ast> {
        let start = self
            .lexer
            .peek()
            .map(|(_, span)| span)
            .unwrap_or_else(|| self.lexer.end_span());
        let mut steps = Vec::new();

        loop {
            match self.lexer.peek() {
                None => match close {
                    Some(closer) => {
                        return Err(ParseError::UnclosedDelimiter {
                            delimiter: closer.open,
                            open_span: closer.open_span,
                        })
                    }
                    None => break,
                },
                Some((Token::Comma, _)) => break,
                Some((token, _)) if close.map(|c| c.token) == Some(token) => break,
                Some(_) => self.parse_step(&mut steps)?,
            }
        }

        if steps.is_empty() {
            return Err(ParseError::Empty {
                what: "sequence",
                span: start,
            });
        }

        Ok(Ast::Sequence(steps))
    }

    /// A term plus its modifiers; `!` may expand it into several steps
    fn parse_step(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        let mut node = self.parse_term()?;
        let mut weight = 1.0;
        let mut repeats = 1;

        while let Some((token, _)) = self.lexer.peek() {
            match token {
                Token::Star => {
                    self.lexer.next_token();
                    let factor = self.expect_positive()?;
                    node = Ast::Fast {
                        node: Box::new(node),
                        factor,
                    };
                }
                Token::Slash => {
                    self.lexer.next_token();
                    let factor = self.expect_positive()?;
                    node = Ast::Fast {
                        node: Box::new(node),
                        factor: 1.0 / factor,
                    };
                }
                Token::At => {
                    self.lexer.next_token();
                    weight = self.expect_positive()?;
                }
                Token::Bang => {
                    self.lexer.next_token();
                    if let Some((Token::Number, _)) = self.lexer.peek() {
                        repeats = self.expect_count()?.max(1);
                    } else {
                        repeats += 1;
                    }
                }
                Token::LParen => node = self.parse_euclid(node)?,
                _ => break,
            }
        }

        for _ in 0..repeats {
            steps.push(Step {
                node: node.clone(),
                weight,
            });
        }
        Ok(())
    }

    fn parse_term(&mut self) -> Result<Ast> {
        const EXPECTED: &str = "a sound, rest or group";

        let (token, span) = self
            .lexer
            .next_token()
            .ok_or_else(|| ParseError::unexpected_eof(EXPECTED))?;

        match token {
            Token::Word => {
                let name = self.lexer.slice(span).to_string();
                if let Some((Token::Colon, _)) = self.lexer.peek() {
                    self.lexer.next_token();
                    let (index, index_span) = self.expect_index()?;
                    Ok(Ast::sound(name, index, span.merge(index_span)))
                } else {
                    Ok(Ast::sound(name, 0, span))
                }
            }
            Token::Number => Ok(Ast::sound(self.lexer.slice(span), 0, span)),
            Token::Rest => Ok(Ast::Rest(span)),
            Token::LBracket => {
                let inner = self.parse_group(Token::RBracket, '[', span)?;
                Ok(inner.simplify())
            }
            Token::LAngle => {
                let inner = self.parse_group(Token::RAngle, '<', span)?;
                Ok(into_alternation(inner))
            }
            other => Err(ParseError::unexpected_token(EXPECTED, other.to_string(), span)),
        }
    }

    fn parse_group(&mut self, close: Token, open: char, open_span: Span) -> Result<Ast> {
        let inner = self.parse_layers(Some(Closer {
            token: close,
            open,
            open_span,
        }))?;
        self.expect(close)?;
        Ok(inner)
    }

    /// `(pulses,steps[,rotation])` following a term
    fn parse_euclid(&mut self, node: Ast) -> Result<Ast> {
        self.expect(Token::LParen)?;
        let pulses = self.expect_count()?;
        self.expect(Token::Comma)?;
        let steps = self.expect_count()?;

        let rotation = if let Some((Token::Comma, _)) = self.lexer.peek() {
            self.lexer.next_token();
            self.expect_count()?
        } else {
            0
        };
        self.expect(Token::RParen)?;

        Ok(Ast::Euclid {
            node: Box::new(node),
            pulses,
            steps,
            rotation,
        })
    }

    fn expect(&mut self, expected: Token) -> Result<Span> {
        match self.lexer.next_token() {
            Some((token, span)) if token == expected => Ok(span),
            Some((token, span)) => Err(ParseError::unexpected_token(
                format!("'{}'", expected),
                token.to_string(),
                span,
            )),
            None => Err(ParseError::unexpected_eof(format!("'{}'", expected))),
        }
    }

    fn expect_number(&mut self) -> Result<(f64, Span)> {
        let span = self.expect(Token::Number)?;
        let text = self.lexer.slice(span);
        text.parse::<f64>()
            .map(|value| (value, span))
            .map_err(|_| ParseError::InvalidNumber {
                value: text.to_string(),
                span,
            })
    }

    fn expect_positive(&mut self) -> Result<f64> {
        let (value, span) = self.expect_number()?;
        if value > 0.0 && value.is_finite() {
            Ok(value)
        } else {
            Err(ParseError::InvalidNumber {
                value: self.lexer.slice(span).to_string(),
                span,
            })
        }
    }

    fn expect_count(&mut self) -> Result<usize> {
        Ok(self.expect_index()?.0 as usize)
    }

    fn expect_index(&mut self) -> Result<(u32, Span)> {
        let span = self.expect(Token::Number)?;
        let text = self.lexer.slice(span);
        text.parse::<u32>()
            .map(|value| (value, span))
            .map_err(|_| ParseError::InvalidNumber {
                value: text.to_string(),
                span,
            })
    }
}

fn into_alternation(inner: Ast) -> Ast {
    match inner {
        Ast::Sequence(steps) => Ast::Alternation(steps.into_iter().map(|step| step.node).collect()),
        Ast::Stack(layers) => Ast::Stack(layers.into_iter().map(into_alternation).collect()),
        // a simplified single element: `<a>` is just `a`
        other => other,
    }
}
