use std::collections::BTreeSet;
use std::fmt::Write;

use indexmap::IndexMap;

use crate::analysis::liveness::Liveness;
use crate::ir::{DefUse, Function, Var};
use crate::registers::{Register, Target};

/// A vertex of the interference graph. Registers order before variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Reg(Register),
    Var(Var),
}

impl Node {
    pub fn as_var(self) -> Option<Var> {
        match self {
            Node::Var(var) => Some(var),
            Node::Reg(_) => None,
        }
    }
}

/// Undirected conflict graph over the variables of one function and the
/// allocatable registers of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct InterferenceGraph {
    adjacency: IndexMap<Node, BTreeSet<Node>>,
}

impl InterferenceGraph {
    /// A graph holding only the register clique of `target`.
    pub fn new(target: &Target) -> Self {
        let mut graph = InterferenceGraph {
            adjacency: IndexMap::new(),
        };
        for &reg in &target.allocatable {
            graph.add_node(Node::Reg(reg));
        }
        for (i, &a) in target.allocatable.iter().enumerate() {
            for &b in &target.allocatable[i + 1..] {
                graph.add_edge(Node::Reg(a), Node::Reg(b));
            }
        }
        graph
    }

    pub fn build(func: &Function, liveness: &Liveness, target: &Target) -> Self {
        let mut graph = Self::new(target);
        for arg in func.args() {
            graph.add_node(Node::Var(arg));
        }

        for (id, block) in func.blocks.iter().enumerate() {
            for idx in 0..block.len() {
                let point = block.point(idx);
                let defs = point.defs();
                for var in defs.iter().chain(point.uses().iter()) {
                    graph.add_node(Node::Var(*var));
                }

                let live_out = liveness.live_out(id, idx);
                for &def in &defs {
                    for &live in live_out {
                        graph.add_edge(Node::Var(def), Node::Var(live));
                    }
                }

                if point.is_call() {
                    for &live in live_out.iter().filter(|var| !defs.contains(var)) {
                        for reg in target.clobbered_by_calls() {
                            graph.add_edge(Node::Var(live), Node::Reg(reg));
                        }
                    }
                }
            }
        }

        // Arguments arrive in fixed registers
        for (i, arg) in func.args().enumerate() {
            let Some(fixed) = target.argument_register(i) else {
                continue;
            };
            for &reg in target.allocatable.iter().filter(|&&reg| reg != fixed) {
                graph.add_edge(Node::Var(arg), Node::Reg(reg));
            }
        }

        // and are all defined on entry
        if !func.blocks.is_empty() {
            let entry_in = liveness.block_in(0);
            for arg in func.args() {
                for &live in entry_in {
                    graph.add_edge(Node::Var(arg), Node::Var(live));
                }
            }
        }

        graph
    }

    pub fn add_node(&mut self, node: Node) {
        self.adjacency.entry(node).or_default();
    }

    /// Adds `a -- b` in both directions. Self-edges are ignored.
    pub fn add_edge(&mut self, a: Node, b: Node) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn interferes(&self, a: Node, b: Node) -> bool {
        self.adjacency
            .get(&a)
            .is_some_and(|neighbors| neighbors.contains(&b))
    }

    pub fn neighbors(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|neighbors| neighbors.iter().copied())
    }

    pub fn degree(&self, node: Node) -> usize {
        self.adjacency.get(&node).map_or(0, BTreeSet::len)
    }

    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.nodes().filter_map(Node::as_var)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn is_symmetric(&self) -> bool {
        self.adjacency.iter().all(|(&node, neighbors)| {
            neighbors
                .iter()
                .all(|&other| other != node && self.interferes(other, node))
        })
    }

    /// One line per node, registers first: the node followed by its
    /// neighbors.
    pub fn render(&self, func: &Function) -> String {
        let name = |node: Node| match node {
            Node::Reg(reg) => reg.name().to_string(),
            Node::Var(var) => func.vars.name(var).to_string(),
        };

        let mut nodes: Vec<Node> = self.nodes().collect();
        nodes.sort();

        let mut out = String::new();
        for node in nodes {
            out.push_str(&name(node));
            for neighbor in self.neighbors(node) {
                let _ = write!(out, " {}", name(neighbor));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::Cfg;
    use crate::frontend::parse_function;
    use crate::ir::RuntimeSymbols;
    use crate::ir::OpKind;
    use crate::registers::CALLER_SAVED_REGS;
    use crate::test_helpers::{assign, binop, block, function, ret_val};

    fn graph(src: &str, target: &Target) -> (Function, Liveness, InterferenceGraph) {
        let func = parse_function(src, &RuntimeSymbols::new()).unwrap();
        let cfg = Cfg::build(&func).unwrap();
        let liveness = Liveness::compute(&func, &cfg);
        let graph = InterferenceGraph::build(&func, &liveness, target);
        (func, liveness, graph)
    }

    fn var(func: &Function, name: &str) -> Node {
        Node::Var(func.vars.lookup(name).unwrap())
    }

    const CALLS: &str = "define int64 @main(int64 %n, int64 %m) {
  :entry
  %x <- %n + %m
  %y <- call @helper(%x)
  call print(%y)
  br %y :done :again
  :again
  %x <- %x - 1
  br :done
  :done
  return %x
}";

    #[test]
    fn test_graph_validity() {
        let target = Target::x86_64();
        let (func, liveness, graph) = graph(CALLS, &target);
        assert!(graph.is_symmetric());

        for (id, block) in func.blocks.iter().enumerate() {
            for idx in 0..block.len() {
                for def in block.point(idx).defs() {
                    for &live in liveness.live_out(id, idx) {
                        if live != def {
                            assert!(graph.interferes(Node::Var(def), Node::Var(live)));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_register_clique() {
        let target = Target::x86_64();
        let graph = InterferenceGraph::new(&target);
        assert_eq!(graph.len(), 15);
        assert_eq!(graph.edge_count(), 15 * 14 / 2);
        for &reg in &target.allocatable {
            assert_eq!(graph.degree(Node::Reg(reg)), 14);
        }
    }

    #[test]
    fn test_values_live_across_calls_avoid_caller_saved() {
        let target = Target::x86_64();
        let (func, _, graph) = graph(CALLS, &target);
        let x = var(&func, "%x");
        let y = var(&func, "%y");

        // %x survives both calls, %y only the call to print
        for reg in CALLER_SAVED_REGS {
            assert!(graph.interferes(x, Node::Reg(reg)));
            assert!(graph.interferes(y, Node::Reg(reg)));
        }
        assert!(!graph.interferes(x, Node::Reg(Register::R12)));
        assert!(!graph.interferes(y, Node::Reg(Register::Rbx)));
    }

    #[test]
    fn test_call_result_is_not_clobbered() {
        let (func, _, graph) = graph(
            "define int64 @f() {\n:entry\n%r <- call input()\nreturn %r\n}",
            &Target::x86_64(),
        );
        let r = var(&func, "%r");
        assert_eq!(graph.degree(r), 0);
    }

    #[test]
    fn test_arguments_are_pinned() {
        let target = Target::x86_64();
        let (func, _, graph) = graph(CALLS, &target);
        let n = var(&func, "%n");
        let m = var(&func, "%m");

        assert!(!graph.interferes(n, Node::Reg(Register::Rdi)));
        assert!(graph.interferes(n, Node::Reg(Register::Rsi)));
        assert!(!graph.interferes(m, Node::Reg(Register::Rsi)));
        assert!(graph.interferes(m, Node::Reg(Register::Rdi)));
        assert!(graph.interferes(n, m));
    }

    #[test]
    fn test_no_self_edges_for_self_assignment() {
        let (func, _, graph) = graph(
            "define int64 @f(int64 %a) {\n:entry\n%a <- %a + 1\nreturn %a\n}",
            &Target::with_registers(2),
        );
        let a = var(&func, "%a");
        assert!(!graph.interferes(a, a));
        assert_eq!(graph.degree(a), 0);
    }

    #[test]
    fn test_copies_still_interfere() {
        let mut f = function("@f", &["%a"]);
        let instrs = vec![
            assign(&mut f, "%b", "%a"),
            binop(&mut f, "%c", "%a", OpKind::Add, "%b"),
        ];
        let exit = ret_val(&mut f, "%c");
        block(&mut f, ":entry", instrs, exit);

        let cfg = Cfg::build(&f).unwrap();
        let liveness = Liveness::compute(&f, &cfg);
        let graph = InterferenceGraph::build(&f, &liveness, &Target::with_registers(2));
        assert!(graph.interferes(var(&f, "%a"), var(&f, "%b")));
        assert!(graph.is_symmetric());
    }

    #[test]
    fn test_render() {
        let (func, _, graph) = graph(
            "define int64 @f(int64 %a) {
  :entry
  %b <- %a + 1
  %c <- %a + %b
  return %c
}",
            &Target::with_registers(2),
        );
        assert_eq!(
            graph.render(&func),
            "r10 r11\nr11 r10\n%a %b\n%b %a\n%c\n"
        );
    }
}
