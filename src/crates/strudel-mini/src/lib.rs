//! Mini notation compiler for Strudel-style rhythm patterns
//!
//! Turns pattern text such as `"bd hh [sn sn] hh"` into a [`Pattern`] that can
//! be queried for event onsets over any span of cycles.
//!
//! ```
//! use strudel_mini::compile;
//!
//! let pattern = compile("bd hh sn hh").unwrap();
//! let haps = pattern.cycle(0);
//! assert_eq!(haps.len(), 4);
//! assert_eq!(haps[2].onset, 0.5);
//! ```
//!
//! # Syntax
//!
//! - Space-separated sequences: `a b c`
//! - Rests: `~` or `-`
//! - Variation index: `bd:3`
//! - Nested groups: `[a b]`
//! - Alternation, one per cycle: `<a b>`
//! - Layering: `a, b`
//! - Speed: `a*2`, `a/2`
//! - Replication and weight: `a!3`, `a@2`
//! - Euclidean rhythms: `bd(3,8)`, `bd(3,8,2)`

pub mod ast;
pub mod error;
pub mod euclid;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod span;


pub use ast::{Ast, Step};
pub use error::{ParseError, Result};
pub use lexer::{Lexer, Token};
pub use parser::{parse, Parser};
pub use pattern::{Hap, Pattern, Sound};
pub use span::Span;

/// Parse and evaluate pattern text in one step
pub fn compile(source: &str) -> Result<Pattern> {
    let ast = parse(source)?;
    Ok(Pattern::from_ast(&ast))
}
