use log::debug;

use crate::ir::{DefUse, Function, Instruction, Item, Render, SpillSlot, Var};

/// Rewrites a function so that one or more variables live in stack slots
/// instead of registers.
#[derive(Debug, Clone)]
pub struct Spiller {
    prefix: String,
}

/// The rewritten function and the temporaries the rewrite introduced.
#[derive(Debug, Clone, PartialEq)]
pub struct Spilled {
    pub function: Function,
    pub temporaries: Vec<Var>,
}

fn load(temp: Var, slot: SpillSlot) -> Instruction {
    Instruction::Assign {
        dst: Item::Var(temp),
        src: Item::Slot(slot),
    }
}

fn store(slot: SpillSlot, temp: Var) -> Instruction {
    Instruction::Assign {
        dst: Item::Slot(slot),
        src: Item::Var(temp),
    }
}

impl Spiller {
    pub fn new(prefix: impl Into<String>) -> Self {
        Spiller {
            prefix: prefix.into(),
        }
    }

    pub fn spill(&self, func: &Function, var: Var, slot: SpillSlot) -> Spilled {
        let mut function = func.clone();
        let mut temporaries = Vec::new();
        self.rewrite(&mut function, var, slot, &mut temporaries);
        Spilled {
            function,
            temporaries,
        }
    }

    /// Spills every variable of `vars` within one rewrite, giving them
    /// consecutive slots starting at `first_slot`.
    pub fn spill_all(&self, func: &Function, vars: &[Var], first_slot: u32) -> Spilled {
        let mut function = func.clone();
        let mut temporaries = Vec::new();
        for (slot, &var) in (first_slot..).zip(vars) {
            self.rewrite(&mut function, var, SpillSlot(slot), &mut temporaries);
        }
        Spilled {
            function,
            temporaries,
        }
    }

    fn rewrite(&self, function: &mut Function, var: Var, slot: SpillSlot, temps: &mut Vec<Var>) {
        let before = temps.len();

        // Arguments are defined on entry, so their store opens the entry block
        let mut entry_stores = Vec::new();
        for param in function.params.iter_mut().filter(|param| param.var == var) {
            let temp = function.vars.fresh(&self.prefix);
            temps.push(temp);
            param.var = temp;
            entry_stores.push(store(slot, temp));
        }
        if let Some(entry) = function.blocks.first_mut() {
            entry.instrs.splice(0..0, entry_stores);
        }

        for block in function.blocks.iter_mut() {
            let mut instrs = Vec::with_capacity(block.instrs.len());
            for mut instr in std::mem::take(&mut block.instrs) {
                let used = instr.uses().contains(&var);
                let defined = instr.defs().contains(&var);
                if !used && !defined {
                    instrs.push(instr);
                    continue;
                }

                let temp = function.vars.fresh(&self.prefix);
                temps.push(temp);
                instr.map_vars(&mut |v| if v == var { temp } else { v });
                if used {
                    instrs.push(load(temp, slot));
                }
                instrs.push(instr);
                if defined {
                    instrs.push(store(slot, temp));
                }
            }

            if block.terminator.uses().contains(&var) {
                let temp = function.vars.fresh(&self.prefix);
                temps.push(temp);
                block
                    .terminator
                    .map_vars(&mut |v| if v == var { temp } else { v });
                instrs.push(load(temp, slot));
            }
            block.instrs = instrs;
        }

        debug!(
            "{}: spilled {} to {} with {} temporaries",
            function.name,
            function.vars.name(var),
            Item::Slot(slot).display(&function.vars),
            temps.len() - before
        );
    }
}
