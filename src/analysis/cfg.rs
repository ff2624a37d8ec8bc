use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::ir::{CallExpr, Function, Instruction, Item, Render, Terminator};

pub type BlockId = usize;

/// Successor and predecessor relations of a function's blocks, addressed
/// by block index. Always rebuilt from the terminators, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    pub successors: Vec<Vec<BlockId>>,
    pub predecessors: Vec<Vec<BlockId>>,
    /// Blocks reachable from the entry in reverse post-order, followed by
    /// the unreachable ones in layout order.
    pub rpo: Vec<BlockId>,
}

impl Cfg {
    pub fn build(func: &Function) -> Result<Self> {
        check_operands(func)?;

        let mut label_to_block: HashMap<&str, BlockId> = HashMap::new();
        for (id, block) in func.blocks.iter().enumerate() {
            label_to_block.entry(block.label.as_str()).or_insert(id);
        }

        // First pass: successors from each terminator
        let mut successors = Vec::with_capacity(func.blocks.len());
        for block in &func.blocks {
            let resolve = |target: &Item| -> Result<BlockId> {
                let Some(label) = target.as_label() else {
                    return Err(Error::IllTypedOperand {
                        function: func.name.to_string(),
                        instruction: block.terminator.display(&func.vars).to_string(),
                        expected: "a label",
                    });
                };
                label_to_block
                    .get(label.as_str())
                    .copied()
                    .ok_or_else(|| Error::UnresolvedLabel {
                        function: func.name.to_string(),
                        label: label.to_string(),
                    })
            };

            let succs: BTreeSet<BlockId> = match &block.terminator {
                Terminator::Return | Terminator::ReturnValue(_) => BTreeSet::new(),
                Terminator::Branch(target) => BTreeSet::from([resolve(target)?]),
                Terminator::CondBranch {
                    cond,
                    on_true,
                    on_false,
                } => {
                    if !matches!(cond, Item::Var(_) | Item::Constant(_)) {
                        return Err(Error::IllTypedOperand {
                            function: func.name.to_string(),
                            instruction: block.terminator.display(&func.vars).to_string(),
                            expected: "a variable or constant condition",
                        });
                    }
                    BTreeSet::from([resolve(on_true)?, resolve(on_false)?])
                }
            };
            successors.push(succs.into_iter().collect::<Vec<_>>());
        }

        // Second pass: predecessors are the inverse relation
        let mut predecessors = vec![Vec::new(); func.blocks.len()];
        for (id, succs) in successors.iter().enumerate() {
            for &succ in succs {
                predecessors[succ].push(id);
            }
        }

        let mut cfg = Cfg {
            successors,
            predecessors,
            rpo: Vec::new(),
        };
        cfg.compute_rpo();
        Ok(cfg)
    }

    fn compute_rpo(&mut self) {
        let count = self.successors.len();
        if count == 0 {
            return;
        }

        let mut visited = vec![false; count];
        let mut post_order = Vec::with_capacity(count);
        // Iterative DFS: (block, next successor index)
        let mut stack = vec![(0usize, 0usize)];
        visited[0] = true;
        while let Some((block, next)) = stack.pop() {
            if let Some(&succ) = self.successors[block].get(next) {
                stack.push((block, next + 1));
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                post_order.push(block);
            }
        }

        self.rpo = post_order.into_iter().rev().collect();
        self.rpo
            .extend((0..count).filter(|&block| !visited[block]));
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn edges(&self) -> Vec<(BlockId, BlockId)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, succs)| succs.iter().map(move |&to| (from, to)))
            .collect()
    }

    pub fn is_exit(&self, block: BlockId) -> bool {
        self.successors[block].is_empty()
    }
}

/// Rejects instructions whose operators receive the wrong kind of operand,
/// such as a label on either side of an arithmetic operator.
fn check_operands(func: &Function) -> Result<()> {
    for block in &func.blocks {
        for instr in &block.instrs {
            let problem = match instr {
                Instruction::Declare { .. } => None,
                Instruction::Call(call) => ill_typed_call(call),
                Instruction::Assign { dst, src } => ill_typed(dst).or_else(|| ill_typed(src)),
            };
            if let Some(expected) = problem {
                return Err(Error::IllTypedOperand {
                    function: func.name.to_string(),
                    instruction: instr.display(&func.vars).to_string(),
                    expected,
                });
            }
        }
    }
    Ok(())
}

fn is_value(item: &Item) -> bool {
    matches!(item, Item::Var(_) | Item::Constant(_))
}

fn ill_typed_call(call: &CallExpr) -> Option<&'static str> {
    match call.callee {
        Item::Label(_) | Item::Var(_) => None,
        _ => Some("a label or variable callee"),
    }
}

fn ill_typed(item: &Item) -> Option<&'static str> {
    match item {
        Item::BinaryOp { lhs, rhs, .. } if !is_value(lhs) || !is_value(rhs) => {
            Some("variable or constant operands")
        }
        Item::ArrayAccess { base, .. } | Item::Length { base, .. } if base.as_var().is_none() => {
            Some("a variable base")
        }
        Item::ArrayAccess { offsets, .. } if !offsets.iter().all(is_value) => {
            Some("variable or constant offsets")
        }
        Item::Length { dim, .. } if !is_value(dim) => Some("a variable or constant dimension"),
        Item::NewArray { dims } if !dims.iter().all(is_value) => {
            Some("variable or constant sizes")
        }
        Item::NewTuple { length } if !is_value(length) => Some("a variable or constant size"),
        Item::Call(call) => ill_typed_call(call),
        _ => None,
    }
}
