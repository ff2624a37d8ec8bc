use std::fmt;

use indexmap::IndexSet;

/// Handle to an interned variable. Two handles are equal exactly when they
/// name the same variable of the same function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How variables are printed. The source table prints their names, the
/// backend prints the register each one was assigned.
pub trait Names {
    fn write_var(&self, f: &mut fmt::Formatter<'_>, var: Var) -> fmt::Result;
}

/// Per-function interning table for variables, keyed by name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VarTable {
    names: IndexSet<String>,
    fresh_counter: usize,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Var {
        if let Some(idx) = self.names.get_index_of(name) {
            return Var(idx as u32);
        }
        let (idx, _) = self.names.insert_full(name.to_string());
        Var(idx as u32)
    }

    pub fn lookup(&self, name: &str) -> Option<Var> {
        self.names.get_index_of(name).map(|idx| Var(idx as u32))
    }

    pub fn name(&self, var: Var) -> &str {
        self.names
            .get_index(var.index())
            .map(String::as_str)
            .unwrap_or("%<unknown>")
    }

    /// Mints a variable whose name starts with `prefix` and is not yet used
    /// by this function.
    pub fn fresh(&mut self, prefix: &str) -> Var {
        loop {
            let candidate = format!("{}{}", prefix, self.fresh_counter);
            self.fresh_counter += 1;
            if !self.names.contains(&candidate) {
                return self.intern(&candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        (0..self.names.len()).map(|idx| Var(idx as u32))
    }
}

impl Names for VarTable {
    fn write_var(&self, f: &mut fmt::Formatter<'_>, var: Var) -> fmt::Result {
        f.write_str(self.name(var))
    }
}
