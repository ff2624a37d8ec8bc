use std::collections::BTreeSet;
use std::fmt::Write;

use log::trace;

use crate::analysis::cfg::{BlockId, Cfg};
use crate::ir::{DefUse, Function, Var};

pub type LiveSet = BTreeSet<Var>;

/// Live sets for every program point of one block. Index `i` is the i-th
/// instruction, the last index is the terminator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockLiveness {
    pub live_in: Vec<LiveSet>,
    pub live_out: Vec<LiveSet>,
}

/// Backward may-be-live dataflow solution for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct Liveness {
    pub blocks: Vec<BlockLiveness>,
    /// Full passes over the blocks until nothing changed, the last one
    /// included.
    pub iterations: usize,
}

impl Liveness {
    pub fn compute(func: &Function, cfg: &Cfg) -> Self {
        // defs and uses per program point never change, compute them once
        let gen_kill: Vec<Vec<(Vec<Var>, Vec<Var>)>> = func
            .blocks
            .iter()
            .map(|block| {
                (0..block.len())
                    .map(|idx| {
                        let point = block.point(idx);
                        (point.defs(), point.uses())
                    })
                    .collect()
            })
            .collect();

        let mut blocks: Vec<BlockLiveness> = func
            .blocks
            .iter()
            .map(|block| BlockLiveness {
                live_in: vec![LiveSet::new(); block.len()],
                live_out: vec![LiveSet::new(); block.len()],
            })
            .collect();

        let mut iterations = 0;
        let mut changed = true;
        while changed {
            changed = false;
            iterations += 1;

            // Post-order visits successors before predecessors, which is
            // what a backward problem wants.
            for &block_id in cfg.rpo.iter().rev() {
                let mut live: LiveSet = LiveSet::new();
                for &succ in &cfg.successors[block_id] {
                    if let Some(succ_in) = blocks[succ].live_in.first() {
                        live.extend(succ_in.iter().copied());
                    }
                }

                let info = &mut blocks[block_id];
                for idx in (0..info.live_in.len()).rev() {
                    let (defs, uses) = &gen_kill[block_id][idx];
                    let mut live_in = live.clone();
                    for def in defs {
                        live_in.remove(def);
                    }
                    live_in.extend(uses.iter().copied());

                    if info.live_out[idx] != live {
                        info.live_out[idx] = live;
                        changed = true;
                    }
                    if info.live_in[idx] != live_in {
                        info.live_in[idx] = live_in.clone();
                        changed = true;
                    }
                    live = live_in;
                }
            }
        }

        trace!(
            "liveness for {} converged after {} iterations",
            func.name, iterations
        );
        Liveness { blocks, iterations }
    }

    pub fn live_in(&self, block: BlockId, idx: usize) -> &LiveSet {
        &self.blocks[block].live_in[idx]
    }

    pub fn live_out(&self, block: BlockId, idx: usize) -> &LiveSet {
        &self.blocks[block].live_out[idx]
    }

    pub fn block_in(&self, block: BlockId) -> &LiveSet {
        &self.blocks[block].live_in[0]
    }

    pub fn block_out(&self, block: BlockId) -> &LiveSet {
        let info = &self.blocks[block];
        &info.live_out[info.live_out.len() - 1]
    }

    /// One line per block and per instruction:
    /// `<instruction> in(<vars>) out(<vars>)`.
    pub fn render(&self, func: &Function) -> String {
        let set = |live: &LiveSet| {
            live.iter()
                .map(|&var| func.vars.name(var))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", func.name);
        for (id, block) in func.blocks.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {} in({}) out({})",
                block.label,
                set(self.block_in(id)),
                set(self.block_out(id))
            );
            for idx in 0..block.len() {
                let _ = writeln!(
                    out,
                    "    {} in({}) out({})",
                    block.render_point(idx, &func.vars),
                    set(self.live_in(id, idx)),
                    set(self.live_out(id, idx))
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_function;
    use crate::ir::RuntimeSymbols;
    use crate::test_helpers::{assign, block, branch, cnst, function, jump, ret_val};

    fn analyse(src: &str) -> (Function, Cfg, Liveness) {
        let func = parse_function(src, &RuntimeSymbols::new()).unwrap();
        let cfg = Cfg::build(&func).unwrap();
        let liveness = Liveness::compute(&func, &cfg);
        (func, cfg, liveness)
    }

    fn names(func: &Function, live: &LiveSet) -> Vec<String> {
        live.iter().map(|&v| func.vars.name(v).to_string()).collect()
    }

    const LOOP: &str = "define int64 @sum(int64 %n) {
  :entry
  %acc <- 0
  br :head
  :head
  %done <- %n <= 0
  br %done :exit :body
  :body
  %acc <- %acc + %n
  %n <- %n - 1
  br :head
  :exit
  return %acc
}";

    #[test]
    fn test_loop_liveness() {
        let (func, _, liveness) = analyse(LOOP);

        assert_eq!(names(&func, liveness.block_in(0)), vec!["%n"]);
        // the back-edge keeps %acc and %n live around the loop
        assert_eq!(names(&func, liveness.block_in(1)), vec!["%n", "%acc"]);
        assert_eq!(names(&func, liveness.block_out(2)), vec!["%n", "%acc"]);
        assert_eq!(names(&func, liveness.block_in(3)), vec!["%acc"]);
        // %done dies at the branch
        assert_eq!(names(&func, liveness.live_out(1, 0)), vec!["%n", "%acc", "%done"]);
        assert_eq!(names(&func, liveness.live_out(1, 1)), vec!["%n", "%acc"]);
    }

    #[test]
    fn test_fixpoint_equations_hold() {
        let (func, cfg, liveness) = analyse(LOOP);

        for (id, block) in func.blocks.iter().enumerate() {
            for idx in 0..block.len() {
                let point = block.point(idx);
                let mut expected = liveness.live_out(id, idx).clone();
                for def in point.defs() {
                    expected.remove(&def);
                }
                expected.extend(point.uses());
                assert_eq!(&expected, liveness.live_in(id, idx));

                if idx + 1 < block.len() {
                    assert_eq!(liveness.live_out(id, idx), liveness.live_in(id, idx + 1));
                }
            }

            let mut out = LiveSet::new();
            for &succ in &cfg.successors[id] {
                out.extend(liveness.block_in(succ).iter().copied());
            }
            assert_eq!(&out, liveness.block_out(id));
        }

        // running the analysis again from scratch reaches the same solution,
        // so no live set can still grow
        assert_eq!(Liveness::compute(&func, &cfg).blocks, liveness.blocks);
        assert!(liveness.iterations >= 2);
    }

    #[test]
    fn test_uses_inside_expression_trees() {
        let (func, _, liveness) = analyse(
            "define void @f(int64 %a, int64 %i, int64 %v) {
  :entry
  %a[%i] <- %v
  %x <- length %a 0
  call print(%x)
  return
}",
        );
        assert_eq!(names(&func, liveness.block_in(0)), vec!["%a", "%i", "%v"]);
        assert_eq!(names(&func, liveness.live_out(0, 0)), vec!["%a"]);
        assert_eq!(names(&func, liveness.live_out(0, 1)), vec!["%x"]);
        assert!(liveness.live_out(0, 2).is_empty());
    }

    #[test]
    fn test_diamond_merges_successor_sets() {
        let mut f = function("@f", &["%c", "%x"]);
        let entry = branch(&mut f, "%c", ":then", ":else");
        block(&mut f, ":entry", vec![], entry);
        let copy = assign(&mut f, "%y", "%x");
        block(&mut f, ":then", vec![copy], jump(":join"));
        let one = cnst(&mut f, "%y", 1);
        block(&mut f, ":else", vec![one], jump(":join"));
        let exit = ret_val(&mut f, "%y");
        block(&mut f, ":join", vec![], exit);

        let cfg = Cfg::build(&f).unwrap();
        let liveness = Liveness::compute(&f, &cfg);
        assert_eq!(names(&f, liveness.block_in(0)), vec!["%c", "%x"]);
        assert_eq!(names(&f, liveness.block_out(0)), vec!["%x"]);
        assert_eq!(names(&f, liveness.block_out(1)), vec!["%y"]);
        assert!(liveness.block_in(2).is_empty());
        assert_eq!(names(&f, liveness.block_in(3)), vec!["%y"]);
    }

    #[test]
    fn test_render() {
        let (func, _, liveness) = analyse(
            "define int64 @f(int64 %a) {
  :entry
  %b <- %a + 1
  return %b
}",
        );
        assert_eq!(
            liveness.render(&func),
            "@f\n  :entry in(%a) out()\n    %b <- %a + 1 in(%a) out(%b)\n    return %b in(%b) out()\n"
        );
    }
}
