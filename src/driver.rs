//! Runs a prefix of the pipeline over a source text and renders the result.

use std::fs;
use std::path::Path;

use log::debug;

use crate::analysis::{Cfg, InterferenceGraph, Liveness};
use crate::backend::Backend;
use crate::backend::x86_64::Codegen;
use crate::error::Result;
use crate::frontend::{parse_program, parse_spill_request};
use crate::ir::{Function, RuntimeSymbols, SpillSlot};
use crate::registers::{AllocatorConfig, GraphColoring, RegisterAllocator, Spiller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Allocate every function and print the generated code.
    Compile,
    /// Apply one spill request and print the rewritten function.
    Spill,
    Liveness,
    Interference,
}

/// Reads `path` and runs `mode` over its contents.
pub fn run_file(mode: Mode, path: &Path, config: &AllocatorConfig) -> Result<String> {
    let source = fs::read_to_string(path)?;
    run(mode, &source, config)
}

pub fn run(mode: Mode, source: &str, config: &AllocatorConfig) -> Result<String> {
    let runtime = RuntimeSymbols::new();

    let render: fn(&Function, &AllocatorConfig) -> Result<String> = match mode {
        Mode::Spill => return spill_request(source, &runtime),
        Mode::Compile => compile,
        Mode::Liveness => liveness,
        Mode::Interference => interference,
    };

    let program = parse_program(source, &runtime)?;
    let mut out = String::new();
    for (i, func) in program.functions.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&render(func, config)?);
    }
    Ok(out)
}

fn spill_request(source: &str, runtime: &RuntimeSymbols) -> Result<String> {
    let request = parse_spill_request(source, runtime)?;
    let slot = SpillSlot(request.function.next_free_slot());
    let spilled = Spiller::new(request.prefix).spill(&request.function, request.var, slot);
    Ok(spilled.function.to_string())
}

fn compile(func: &Function, config: &AllocatorConfig) -> Result<String> {
    let allocation = GraphColoring::new(config.clone()).allocate(func)?;
    debug!(
        "{}: {} spill rounds, frame of {} bytes",
        func.name,
        allocation.rounds,
        allocation.frame_size()
    );
    Codegen.generate_assembly(&allocation)
}

fn liveness(func: &Function, _config: &AllocatorConfig) -> Result<String> {
    let cfg = Cfg::build(func)?;
    Ok(Liveness::compute(func, &cfg).render(func))
}

fn interference(func: &Function, config: &AllocatorConfig) -> Result<String> {
    let cfg = Cfg::build(func)?;
    let liveness = Liveness::compute(func, &cfg);
    let graph = InterferenceGraph::build(func, &liveness, &config.target);
    Ok(format!("{}\n{}", func.name, graph.render(func)))
}
