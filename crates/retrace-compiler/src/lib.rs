//! AST-to-state-machine compiler
//!
//! Lowers the parser's [`Node`](retrace_ast::Node) tree into a flat
//! [`StateMachine`]: a table of states whose transitions carry
//! [`Condition`]s. Every node compiles into a path between two states;
//! alternation fans out of a shared state in source order, repetitions
//! become unrolled copies plus a back-edge loop, and the whole pattern is
//! framed in a capture of index 0.
//!
//! Compilation never aborts: problems (a backreference to a group that
//! never exists, a variable-length look-behind) are collected as
//! [`CompileDiagnostic`]s, the offending transition becomes
//! [`Condition::Fail`], and callers receive both the machine and the
//! diagnostics.

mod compile;
mod machine;
#[cfg(test)]
mod tests;

pub use compile::{CompileOutput, compile};
pub use machine::{
    CompiledAssertion, Condition, JumpData, NameRef, NamedCaptures, State, StateMachine, StateRef,
    Transition,
};

use thiserror::Error;

/// A problem found while lowering the AST.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileDiagnostic {
    #[error("backreference to nonexistent group {0}")]
    BadBackreference(usize),
    #[error("backreference to unknown group name `{0}`")]
    UnknownName(String),
    #[error("subroutine call to nonexistent group {0}")]
    BadSubroutineTarget(usize),
    #[error("subroutine call to unknown group name `{0}`")]
    UnknownSubroutineName(String),
    #[error("conditional references unknown group name `{0}`")]
    UnknownConditionName(String),
    #[error("variable-length look-behind is not supported")]
    VariableLengthLookbehind,
}
