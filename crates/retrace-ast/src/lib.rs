//! AST definitions for the regex engine
//!
//! The parser lowers pattern text into the [`Node`] sum type defined here;
//! the compiler walks it into a state machine. Parse failures become
//! [`Node::Error`] placeholders so downstream passes can skip them while the
//! parser keeps producing a best-effort tree.

mod ast;
mod options;

pub use ast::{
    Alternative, CharacterClass, ClassAssertion, ComplexAssertion, Conditional,
    ConditionalCondition, Literal, NamedBackreference, Node, NumberedBackreference, Repetition,
    RepetitionKind, SimpleAssertionKind, Subexpression, SubexpressionKind,
};
pub use options::Options;
