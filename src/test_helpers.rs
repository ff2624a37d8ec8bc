use crate::ir::{BasicBlock, Function, Instruction, Item, OpKind, Param, Terminator, TypeSig};

// Builders for constructing IR by hand in tests, without going through the
// parser. Variables are interned into the function being built.

pub fn function(name: &str, params: &[&str]) -> Function {
    let mut func = Function::new(name, TypeSig::INT64);
    for param in params {
        let var = func.vars.intern(param);
        func.params.push(Param {
            ty: TypeSig::INT64,
            var,
        });
    }
    func
}

pub fn var(func: &mut Function, name: &str) -> Item {
    Item::Var(func.vars.intern(name))
}

pub fn cnst(func: &mut Function, dest: &str, val: i64) -> Instruction {
    Instruction::Assign {
        dst: var(func, dest),
        src: Item::Constant(val),
    }
}

pub fn assign(func: &mut Function, dest: &str, src: &str) -> Instruction {
    Instruction::Assign {
        dst: var(func, dest),
        src: var(func, src),
    }
}

pub fn binop(func: &mut Function, dest: &str, l: &str, op: OpKind, r: &str) -> Instruction {
    Instruction::Assign {
        dst: var(func, dest),
        src: Item::binary(var(func, l), op, var(func, r)),
    }
}

pub fn jump(target: &str) -> Terminator {
    Terminator::Branch(Item::label(target))
}

pub fn branch(func: &mut Function, cond: &str, t: &str, f: &str) -> Terminator {
    Terminator::CondBranch {
        cond: var(func, cond),
        on_true: Item::label(t),
        on_false: Item::label(f),
    }
}

pub fn ret_val(func: &mut Function, val: &str) -> Terminator {
    Terminator::ReturnValue(var(func, val))
}

pub fn block(func: &mut Function, label: &str, instrs: Vec<Instruction>, terminator: Terminator) {
    func.blocks.push(BasicBlock::new(label, instrs, terminator));
}
