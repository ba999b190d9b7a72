use crate::span::Span;

/// Syntax tree for a mini notation pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// `~` or `-`
    Rest(Span),
    /// `bd`, `bd:3`, `c4`
    Sound(SoundNode),
    /// Whitespace separated steps squeezed into one cycle
    Sequence(Vec<Step>),
    /// Comma separated layers played together
    Stack(Vec<Ast>),
    /// `<a b c>`: one child per cycle
    Alternation(Vec<Ast>),
    /// `x*n` (and `x/n` as the reciprocal factor)
    Fast { node: Box<Ast>, factor: f64 },
    /// `x(pulses,steps,rotation)`
    Euclid {
        node: Box<Ast>,
        pulses: usize,
        steps: usize,
        rotation: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundNode {
    pub name: String,
    pub index: u32,
    pub span: Span,
}

/// A sequence element and its relative length (`@weight`)
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub node: Ast,
    pub weight: f64,
}

impl Step {
    pub fn new(node: Ast) -> Self {
        Step { node, weight: 1.0 }
    }
}

impl Ast {
    pub fn sound(name: impl Into<String>, index: u32, span: Span) -> Self {
        Ast::Sound(SoundNode {
            name: name.into(),
            index,
            span,
        })
    }

    /// Collapses single-step sequences so `[bd]` and `bd` produce the same tree
    pub fn simplify(self) -> Ast {
        match self {
            Ast::Sequence(mut steps) if steps.len() == 1 => steps.remove(0).node,
            Ast::Stack(mut layers) if layers.len() == 1 => layers.remove(0),
            other => other,
        }
    }
}
