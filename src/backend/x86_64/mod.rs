use std::fmt;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::ir::{Names, Render, Var};
use crate::registers::graph_coloring::occurrences;
use crate::registers::{Allocation, Coloring};

pub struct Codegen;

// Prints every variable as the register it was colored with.
struct ColoredNames<'a>(&'a Coloring);

impl Names for ColoredNames<'_> {
    fn write_var(&self, f: &mut fmt::Formatter<'_>, var: Var) -> fmt::Result {
        match self.0.color(var) {
            Some(reg) => f.write_str(reg.name()),
            None => Err(fmt::Error),
        }
    }
}

impl Backend for Codegen {
    fn generate_assembly(&self, allocation: &Allocation) -> Result<String> {
        let func = &allocation.function;
        if let Some(var) = occurrences(func)
            .into_keys()
            .find(|&var| allocation.coloring.color(var).is_none())
        {
            return Err(Error::Internal(format!(
                "{}: {} reached code generation without a register",
                func.name,
                func.vars.name(var)
            )));
        }

        let body = func.display(&ColoredNames(&allocation.coloring)).to_string();
        Ok(format!(
            "// frame: {} bytes\n{}",
            allocation.frame_size(),
            body
        ))
    }
}
