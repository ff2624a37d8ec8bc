pub mod item;
pub mod runtime;
pub mod vars;

use std::fmt;

pub use item::{CallExpr, Item, Label, OpKind, Render, SpillSlot, TypeSig, ValueKind, Visitor};
pub use runtime::RuntimeSymbols;
pub use vars::{Names, Var, VarTable};

/// A non-terminating instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Declare { ty: TypeSig, var: Var },
    Call(CallExpr),
    Assign { dst: Item, src: Item },
}

/// The instruction that ends a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return,
    ReturnValue(Item),
    Branch(Item),
    CondBranch {
        cond: Item,
        on_true: Item,
        on_false: Item,
    },
}

/// Variables written and read by an instruction.
pub trait DefUse {
    fn defs(&self) -> Vec<Var>;
    fn uses(&self) -> Vec<Var>;

    /// True when executing the instruction transfers control to a callee.
    fn is_call(&self) -> bool {
        false
    }
}

impl DefUse for Instruction {
    fn defs(&self) -> Vec<Var> {
        match self {
            Instruction::Declare { var, .. } => vec![*var],
            Instruction::Call(_) => vec![],
            Instruction::Assign { dst, .. } => dst.as_var().into_iter().collect(),
        }
    }

    fn uses(&self) -> Vec<Var> {
        match self {
            Instruction::Declare { .. } => vec![],
            Instruction::Call(call) => call.vars(),
            Instruction::Assign { dst, src } => {
                let mut uses = src.vars();
                // a store through an array access reads its base and offsets
                if dst.as_var().is_none() {
                    for var in dst.vars() {
                        if !uses.contains(&var) {
                            uses.push(var);
                        }
                    }
                }
                uses
            }
        }
    }

    fn is_call(&self) -> bool {
        match self {
            Instruction::Call(_) => true,
            Instruction::Assign { src, .. } => src.as_call().is_some(),
            Instruction::Declare { .. } => false,
        }
    }
}

impl DefUse for Terminator {
    fn defs(&self) -> Vec<Var> {
        vec![]
    }

    fn uses(&self) -> Vec<Var> {
        match self {
            Terminator::Return | Terminator::Branch(_) => vec![],
            Terminator::ReturnValue(value) => value.vars(),
            Terminator::CondBranch { cond, .. } => cond.vars(),
        }
    }
}

impl Instruction {
    pub fn map_vars(&mut self, f: &mut dyn FnMut(Var) -> Var) {
        match self {
            Instruction::Declare { var, .. } => *var = f(*var),
            Instruction::Call(call) => call.map_vars(f),
            Instruction::Assign { dst, src } => {
                dst.map_vars(f);
                src.map_vars(f);
            }
        }
    }
}

impl Terminator {
    pub fn map_vars(&mut self, f: &mut dyn FnMut(Var) -> Var) {
        match self {
            Terminator::Return => {}
            Terminator::ReturnValue(value) => value.map_vars(f),
            Terminator::Branch(target) => target.map_vars(f),
            Terminator::CondBranch {
                cond,
                on_true,
                on_false,
            } => {
                cond.map_vars(f);
                on_true.map_vars(f);
                on_false.map_vars(f);
            }
        }
    }
}

impl Render for Instruction {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        match self {
            Instruction::Declare { ty, var } => {
                write!(f, "{} ", ty)?;
                names.write_var(f, *var)
            }
            Instruction::Call(call) => call.render(f, names),
            Instruction::Assign { dst, src } => {
                dst.render(f, names)?;
                f.write_str(" <- ")?;
                src.render(f, names)
            }
        }
    }
}

impl Render for Terminator {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        match self {
            Terminator::Return => f.write_str("return"),
            Terminator::ReturnValue(value) => {
                f.write_str("return ")?;
                value.render(f, names)
            }
            Terminator::Branch(target) => {
                f.write_str("br ")?;
                target.render(f, names)
            }
            Terminator::CondBranch {
                cond,
                on_true,
                on_false,
            } => {
                f.write_str("br ")?;
                cond.render(f, names)?;
                f.write_str(" ")?;
                on_true.render(f, names)?;
                f.write_str(" ")?;
                on_false.render(f, names)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: Label,
    pub instrs: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>, instrs: Vec<Instruction>, terminator: Terminator) -> Self {
        BasicBlock {
            label: Label::new(label),
            instrs,
            terminator,
        }
    }

    /// Number of program points: every instruction plus the terminator.
    pub fn len(&self) -> usize {
        self.instrs.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn point(&self, idx: usize) -> &dyn DefUse {
        match self.instrs.get(idx) {
            Some(instr) => instr,
            None => &self.terminator,
        }
    }

    pub fn render_point(&self, idx: usize, names: &dyn Names) -> String {
        match self.instrs.get(idx) {
            Some(instr) => instr.display(names).to_string(),
            None => self.terminator.display(names).to_string(),
        }
    }
}

impl Render for BasicBlock {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        writeln!(f, "  {}", self.label)?;
        for instr in &self.instrs {
            writeln!(f, "  {}", instr.display(names))?;
        }
        writeln!(f, "  {}", self.terminator.display(names))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeSig,
    pub var: Var,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Label,
    pub ret_type: TypeSig,
    pub params: Vec<Param>,
    pub blocks: Vec<BasicBlock>,
    pub vars: VarTable,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_type: TypeSig) -> Self {
        Function {
            name: Label::new(name),
            ret_type,
            params: Vec::new(),
            blocks: Vec::new(),
            vars: VarTable::new(),
        }
    }

    pub fn args(&self) -> impl Iterator<Item = Var> + '_ {
        self.params.iter().map(|param| param.var)
    }

    /// The first slot index not referenced anywhere in the function.
    pub fn next_free_slot(&self) -> u32 {
        struct MaxSlot(Option<u32>);
        impl Visitor for MaxSlot {
            fn visit_slot(&mut self, slot: SpillSlot) {
                self.0 = Some(self.0.map_or(slot.0, |max| max.max(slot.0)));
            }
        }

        let mut max = MaxSlot(None);
        for block in &self.blocks {
            for instr in &block.instrs {
                match instr {
                    Instruction::Declare { .. } => {}
                    Instruction::Call(call) => call.accept(&mut max),
                    Instruction::Assign { dst, src } => {
                        dst.accept(&mut max);
                        src.accept(&mut max);
                    }
                }
            }
        }
        max.0.map_or(0, |slot| slot + 1)
    }

    pub fn render_with(&self, names: &dyn Names) -> String {
        self.display(names).to_string()
    }
}

impl Render for Function {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        write!(f, "define {} {}(", self.ret_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ", param.ty)?;
            names.write_var(f, param.var)?;
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            block.render(f, names)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &self.vars)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name.as_str() == name)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
