//! Dataflow analyses over one function: control flow, liveness and
//! interference. All three are rebuilt from scratch whenever the function
//! changes.

pub mod cfg;
pub mod interference;
pub mod liveness;

pub use cfg::{BlockId, Cfg};
pub use interference::{InterferenceGraph, Node};
pub use liveness::{BlockLiveness, LiveSet, Liveness};
