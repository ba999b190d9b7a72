use crate::error::{ParseError, Result};
use crate::span::Span;
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?", priority = 10)]
    Number,

    // Sound and note names: bd, hh, sn, c4, a#3, bass_drum
    #[regex(r"[a-zA-Z][a-zA-Z0-9_#]*", priority = 5)]
    Word,

    #[token("~")]
    #[token("-")]
    Rest,

    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    LAngle,
    #[token(">")]
    RAngle,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("!")]
    Bang,
    #[token("@")]
    At,

    #[regex(r"//[^\n]*")]
    Comment,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::Number => "number",
            Token::Word => "name",
            Token::Rest => "~",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LAngle => "<",
            Token::RAngle => ">",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Bang => "!",
            Token::At => "@",
            Token::Comment => "comment",
        };
        f.write_str(text)
    }
}

/// Token stream with one token of lookahead
pub struct Lexer<'source> {
    source: &'source str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl<'source> Lexer<'source> {
    /// Tokenizes the whole source up front, failing on the first unrecognised character
    pub fn new(source: &'source str) -> Result<Self> {
        let mut inner = Token::lexer(source);
        let mut tokens = Vec::new();

        while let Some(token) = inner.next() {
            let span = Span::from(inner.span());
            match token {
                Ok(Token::Comment) => continue,
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(ParseError::InvalidToken {
                        text: inner.slice().to_string(),
                        span,
                    })
                }
            }
        }

        Ok(Lexer {
            source,
            tokens,
            pos: 0,
        })
    }

    pub fn peek(&self) -> Option<(Token, Span)> {
        self.tokens.get(self.pos).copied()
    }

    pub fn next_token(&mut self) -> Option<(Token, Span)> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn slice(&self, span: Span) -> &'source str {
        &self.source[span.to_range()]
    }

    /// Span just past the last token, used for end-of-input errors
    pub fn end_span(&self) -> Span {
        Span::new(self.source.len(), self.source.len())
    }
}
