//! Compiled patterns and onset queries
//!
//! Time is measured in cycles. A query for `[begin, end)` yields every event
//! whose onset falls inside the span, already mapped to global cycle time.

use crate::ast::Ast;
use crate::euclid::bjorklund;
use std::fmt;
use std::sync::Arc;

/// Tolerance for onsets that land on a query boundary after float mapping
const ONSET_EPSILON: f64 = 1e-9;

/// A named sound plus its variation index (`bd:3`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sound {
    pub name: Arc<str>,
    pub index: u32,
}

impl Sound {
    pub fn new(name: &str, index: u32) -> Self {
        Sound {
            name: Arc::from(name),
            index,
        }
    }
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.index)
        }
    }
}

/// One event produced by a query
#[derive(Debug, Clone, PartialEq)]
pub struct Hap {
    /// Onset in cycles
    pub onset: f64,
    /// Length of the event in cycles
    pub duration: f64,
    pub sound: Sound,
}

#[derive(Debug, Clone)]
enum Node {
    Silence,
    Sound(Sound),
    Sequence { steps: Vec<(Node, f64)>, total: f64 },
    Stack(Vec<Node>),
    Alternation(Vec<Node>),
    Fast { node: Box<Node>, factor: f64 },
}

/// Maps a node's local time onto global cycle time: `global = offset + local * scale`
#[derive(Debug, Clone, Copy)]
struct Affine {
    offset: f64,
    scale: f64,
}

impl Affine {
    const IDENTITY: Affine = Affine {
        offset: 0.0,
        scale: 1.0,
    };

    fn apply(&self, local: f64) -> f64 {
        self.offset + local * self.scale
    }

    /// `inner` maps child time to this node's time
    fn then(&self, inner: Affine) -> Affine {
        Affine {
            offset: self.offset + self.scale * inner.offset,
            scale: self.scale * inner.scale,
        }
    }
}

/// A playable, queryable pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    root: Node,
}

impl Pattern {
    pub fn from_ast(ast: &Ast) -> Self {
        Pattern {
            root: Node::from_ast(ast),
        }
    }

    /// Replaces the contents of `out` with every event whose onset lies in
    /// `[begin, end)`, sorted by onset
    pub fn query_onsets(&self, begin: f64, end: f64, out: &mut Vec<Hap>) {
        out.clear();
        if begin.is_nan() || end.is_nan() || end <= begin {
            return;
        }
        self.root.collect(begin, end, Affine::IDENTITY, out);
        out.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    }

    /// Convenience wrapper around [`Pattern::query_onsets`] for a single cycle
    pub fn cycle(&self, cycle: i64) -> Vec<Hap> {
        let mut out = Vec::new();
        let begin = cycle as f64;
        self.query_onsets(begin, begin + 1.0, &mut out);
        out
    }
}

impl Node {
    fn from_ast(ast: &Ast) -> Node {
        match ast {
            Ast::Rest(_) => Node::Silence,
            Ast::Sound(sound) => Node::Sound(Sound::new(&sound.name, sound.index)),
            Ast::Sequence(steps) => Node::sequence(
                steps
                    .iter()
                    .map(|step| (Node::from_ast(&step.node), step.weight))
                    .collect(),
            ),
            Ast::Stack(layers) => Node::Stack(layers.iter().map(Node::from_ast).collect()),
            Ast::Alternation(children) => {
                Node::Alternation(children.iter().map(Node::from_ast).collect())
            }
            Ast::Fast { node, factor } => Node::Fast {
                node: Box::new(Node::from_ast(node)),
                factor: *factor,
            },
            Ast::Euclid {
                node,
                pulses,
                steps,
                rotation,
            } => {
                let inner = Node::from_ast(node);
                let slots = bjorklund(*pulses, *steps, *rotation)
                    .into_iter()
                    .map(|on| (if on { inner.clone() } else { Node::Silence }, 1.0))
                    .collect();
                Node::sequence(slots)
            }
        }
    }

    fn sequence(steps: Vec<(Node, f64)>) -> Node {
        let total = steps.iter().map(|(_, weight)| weight).sum();
        if steps.is_empty() {
            Node::Silence
        } else {
            Node::Sequence { steps, total }
        }
    }

    fn collect(&self, begin: f64, end: f64, to_global: Affine, out: &mut Vec<Hap>) {
        match self {
            Node::Silence => {}
            Node::Sound(sound) => {
                let first = (begin - ONSET_EPSILON).ceil() as i64;
                let mut cycle = first;
                while (cycle as f64) < end - ONSET_EPSILON {
                    out.push(Hap {
                        onset: to_global.apply(cycle as f64),
                        duration: to_global.scale,
                        sound: sound.clone(),
                    });
                    cycle += 1;
                }
            }
            Node::Stack(layers) => {
                for layer in layers {
                    layer.collect(begin, end, to_global, out);
                }
            }
            Node::Fast { node, factor } => {
                let inner = Affine {
                    offset: 0.0,
                    scale: 1.0 / factor,
                };
                node.collect(begin * factor, end * factor, to_global.then(inner), out);
            }
            Node::Sequence { steps, total } => {
                for cycle in cycles_touching(begin, end) {
                    let cycle_start = cycle as f64;
                    let mut position = 0.0;
                    for (node, weight) in steps {
                        let slot_start = cycle_start + position / total;
                        let slot_len = weight / total;
                        position += weight;

                        let query_begin = begin.max(slot_start);
                        let query_end = end.min(slot_start + slot_len);
                        if query_begin >= query_end {
                            continue;
                        }

                        // the child's cycle `cycle` is squeezed into this slot
                        let inner = Affine {
                            offset: slot_start - cycle_start * slot_len,
                            scale: slot_len,
                        };
                        node.collect(
                            cycle_start + (query_begin - slot_start) / slot_len,
                            cycle_start + (query_end - slot_start) / slot_len,
                            to_global.then(inner),
                            out,
                        );
                    }
                }
            }
            Node::Alternation(children) => {
                let count = children.len() as i64;
                if count == 0 {
                    return;
                }
                for cycle in cycles_touching(begin, end) {
                    let child = &children[cycle.rem_euclid(count) as usize];
                    // each child only advances on the cycles it is chosen for
                    let shift = (cycle - cycle.div_euclid(count)) as f64;
                    let query_begin = begin.max(cycle as f64);
                    let query_end = end.min(cycle as f64 + 1.0);
                    if query_begin >= query_end {
                        continue;
                    }
                    let inner = Affine {
                        offset: shift,
                        scale: 1.0,
                    };
                    child.collect(
                        query_begin - shift,
                        query_end - shift,
                        to_global.then(inner),
                        out,
                    );
                }
            }
        }
    }
}

fn cycles_touching(begin: f64, end: f64) -> std::ops::Range<i64> {
    let first = begin.floor() as i64;
    let last = end.ceil() as i64;
    first..last.max(first)
}
