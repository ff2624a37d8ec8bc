pub mod graph_coloring;
pub mod spiller;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Result;
use crate::ir::{Function, Var};

pub use graph_coloring::GraphColoring;
pub use spiller::{Spilled, Spiller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    R10,
    R11,
    R8,
    R9,
    Rax,
    Rcx,
    Rdi,
    Rdx,
    Rsi,
    R12,
    R13,
    R14,
    R15,
    Rbp,
    Rbx,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::Rax => "rax",
            Register::Rcx => "rcx",
            Register::Rdi => "rdi",
            Register::Rdx => "rdx",
            Register::Rsi => "rsi",
            Register::R12 => "r12",
            Register::R13 => "r13",
            Register::R14 => "r14",
            Register::R15 => "r15",
            Register::Rbp => "rbp",
            Register::Rbx => "rbx",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registers in the order the allocator hands them out: caller-saved first.
pub const AVAILABLE_REGS: [Register; 15] = [
    Register::R10,
    Register::R11,
    Register::R8,
    Register::R9,
    Register::Rax,
    Register::Rcx,
    Register::Rdi,
    Register::Rdx,
    Register::Rsi,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
    Register::Rbp,
    Register::Rbx,
];

pub const ARGUMENT_REGS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

pub const CALLER_SAVED_REGS: [Register; 9] = [
    Register::R10,
    Register::R11,
    Register::R8,
    Register::R9,
    Register::Rax,
    Register::Rcx,
    Register::Rdi,
    Register::Rdx,
    Register::Rsi,
];

/// The register file the allocator colors with, plus the calling
/// convention constraints that pre-colored nodes encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub allocatable: Vec<Register>,
    pub arguments: Vec<Register>,
    pub caller_saved: Vec<Register>,
}

impl Default for Target {
    fn default() -> Self {
        Self::x86_64()
    }
}

impl Target {
    pub fn x86_64() -> Self {
        Target {
            allocatable: AVAILABLE_REGS.to_vec(),
            arguments: ARGUMENT_REGS.to_vec(),
            caller_saved: CALLER_SAVED_REGS.to_vec(),
        }
    }

    /// The x86-64 target restricted to its first `count` allocatable
    /// registers.
    pub fn with_registers(count: usize) -> Self {
        let mut target = Self::x86_64();
        target.allocatable.truncate(count.clamp(1, AVAILABLE_REGS.len()));
        target
    }

    /// Number of colors.
    pub fn k(&self) -> usize {
        self.allocatable.len()
    }

    pub fn is_allocatable(&self, reg: Register) -> bool {
        self.allocatable.contains(&reg)
    }

    /// The register argument `index` arrives in, if it is one the allocator
    /// may use.
    pub fn argument_register(&self, index: usize) -> Option<Register> {
        self.arguments
            .get(index)
            .copied()
            .filter(|reg| self.is_allocatable(*reg))
    }

    pub fn clobbered_by_calls(&self) -> impl Iterator<Item = Register> + '_ {
        self.caller_saved
            .iter()
            .copied()
            .filter(|reg| self.is_allocatable(*reg))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorConfig {
    pub target: Target,
    /// Prefix of the temporaries the spiller introduces.
    pub spill_prefix: String,
    /// Upper bound on spill rounds. Defaults to one more than the number of
    /// variables of the input function.
    pub max_rounds: Option<usize>,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            target: Target::x86_64(),
            spill_prefix: "%S".to_string(),
            max_rounds: None,
        }
    }
}

/// Partial map from variables to registers plus the variables left
/// uncolored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coloring {
    pub colors: BTreeMap<Var, Register>,
    pub spilled: BTreeSet<Var>,
}

impl Coloring {
    pub fn color(&self, var: Var) -> Option<Register> {
        self.colors.get(&var).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.spilled.is_empty()
    }
}

/// A spill-free coloring together with the function it colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub function: Function,
    pub coloring: Coloring,
    /// Stack slots the rewritten function uses.
    pub frame_slots: u32,
    /// Spill rounds it took to get here.
    pub rounds: usize,
}

impl Allocation {
    pub fn frame_size(&self) -> i64 {
        self.frame_slots as i64 * 8
    }
}

pub trait RegisterAllocator {
    fn allocate(&self, func: &Function) -> Result<Allocation>;
}
