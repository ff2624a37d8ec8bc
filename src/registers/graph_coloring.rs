use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::analysis::{Cfg, InterferenceGraph, Liveness, Node};
use crate::error::{Error, Result};
use crate::ir::{DefUse, Function, Var};

use super::{
    Allocation, AllocatorConfig, Coloring, Register, RegisterAllocator, Spilled, Spiller, Target,
};

/// Chaitin-style allocator: simplify, optimistic select, spill and retry.
#[derive(Debug, Clone, Default)]
pub struct GraphColoring {
    config: AllocatorConfig,
}

// One entry of the select stack: the variable and whether it was pushed as a
// potential spill.
type StackEntry = (Var, bool);

enum State {
    Building(Function),
    Simplifying {
        function: Function,
        graph: InterferenceGraph,
    },
    Coloring {
        function: Function,
        graph: InterferenceGraph,
        stack: Vec<StackEntry>,
    },
    Success {
        function: Function,
        coloring: Coloring,
    },
    NeedsSpill {
        function: Function,
        coloring: Coloring,
    },
}

/// Number of program points that define or use each variable. Arguments
/// count one definition on entry.
pub fn occurrences(func: &Function) -> BTreeMap<Var, usize> {
    let mut counts = BTreeMap::new();
    for arg in func.args() {
        *counts.entry(arg).or_insert(0) += 1;
    }
    for block in &func.blocks {
        for idx in 0..block.len() {
            let point = block.point(idx);
            for var in point.defs().into_iter().chain(point.uses()) {
                *counts.entry(var).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Removes every variable node from the graph, lowest index first among
/// those of degree below `k`. When none is left, the cheapest spill
/// candidate is removed instead and marked as a potential spill.
fn simplify(
    graph: &InterferenceGraph,
    occurrences: &BTreeMap<Var, usize>,
    temporaries: &BTreeSet<Var>,
    k: usize,
) -> Vec<StackEntry> {
    let mut degrees: BTreeMap<Var, usize> = graph
        .vars()
        .map(|var| (var, graph.degree(Node::Var(var))))
        .collect();
    let mut stack = Vec::with_capacity(degrees.len());

    while !degrees.is_empty() {
        let trivial = degrees
            .iter()
            .find(|&(_, &degree)| degree < k)
            .map(|(&var, _)| var);
        let entry = match trivial {
            Some(var) => (var, false),
            None => match select_spill(&degrees, occurrences, temporaries) {
                Some(var) => (var, true),
                None => break,
            },
        };

        degrees.remove(&entry.0);
        for neighbor in graph.neighbors(Node::Var(entry.0)) {
            if let Node::Var(var) = neighbor {
                if let Some(degree) = degrees.get_mut(&var) {
                    *degree -= 1;
                }
            }
        }
        stack.push(entry);
    }
    stack
}

/// Lowest occurrences / degree wins, ties go to the lowest index. Spiller
/// temporaries only compete when nothing else is left.
fn select_spill(
    degrees: &BTreeMap<Var, usize>,
    occurrences: &BTreeMap<Var, usize>,
    temporaries: &BTreeSet<Var>,
) -> Option<Var> {
    let only_temporaries = degrees.keys().all(|var| temporaries.contains(var));
    let cost = |var: &Var| occurrences.get(var).copied().unwrap_or(0);

    let mut best: Option<(Var, usize, usize)> = None;
    for (&var, &degree) in degrees {
        if !only_temporaries && temporaries.contains(&var) {
            continue;
        }
        let uses = cost(&var);
        match best {
            // uses / degree < best_uses / best_degree, without division
            Some((_, best_uses, best_degree)) if uses * best_degree >= best_uses * degree => {}
            _ => best = Some((var, uses, degree)),
        }
    }
    best.map(|(var, _, _)| var)
}

/// Pops the stack and gives each variable the first register, in target
/// order, that none of its neighbors holds.
fn select(
    func: &Function,
    graph: &InterferenceGraph,
    mut stack: Vec<StackEntry>,
    target: &Target,
) -> Result<Coloring> {
    let mut coloring = Coloring::default();
    while let Some((var, potential_spill)) = stack.pop() {
        let taken: BTreeSet<Register> = graph
            .neighbors(Node::Var(var))
            .filter_map(|neighbor| match neighbor {
                Node::Reg(reg) => Some(reg),
                Node::Var(other) => coloring.color(other),
            })
            .collect();

        match target.allocatable.iter().find(|reg| !taken.contains(reg)) {
            Some(&reg) => {
                coloring.colors.insert(var, reg);
            }
            None if potential_spill => {
                trace!("{}: {} is an actual spill", func.name, func.vars.name(var));
                coloring.spilled.insert(var);
            }
            None => {
                return Err(Error::Internal(format!(
                    "{}: no register left for {} although its degree was below {}",
                    func.name,
                    func.vars.name(var),
                    target.k()
                )));
            }
        }
    }
    Ok(coloring)
}

impl GraphColoring {
    pub fn new(config: AllocatorConfig) -> Self {
        GraphColoring { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }
}

impl RegisterAllocator for GraphColoring {
    fn allocate(&self, func: &Function) -> Result<Allocation> {
        let target = &self.config.target;
        let max_rounds = self.config.max_rounds.unwrap_or(func.vars.len());
        let spiller = Spiller::new(self.config.spill_prefix.clone());

        let mut temporaries = BTreeSet::new();
        let mut rounds = 0;
        let mut state = State::Building(func.clone());
        loop {
            state = match state {
                State::Building(function) => {
                    let cfg = Cfg::build(&function)?;
                    let liveness = Liveness::compute(&function, &cfg);
                    let graph = InterferenceGraph::build(&function, &liveness, target);
                    trace!(
                        "{}: round {} graph has {} nodes and {} edges",
                        function.name,
                        rounds,
                        graph.len(),
                        graph.edge_count()
                    );
                    State::Simplifying { function, graph }
                }
                State::Simplifying { function, graph } => {
                    let stack = simplify(&graph, &occurrences(&function), &temporaries, target.k());
                    State::Coloring {
                        function,
                        graph,
                        stack,
                    }
                }
                State::Coloring {
                    function,
                    graph,
                    stack,
                } => {
                    let coloring = select(&function, &graph, stack, target)?;
                    if coloring.is_complete() {
                        State::Success { function, coloring }
                    } else {
                        State::NeedsSpill { function, coloring }
                    }
                }
                State::Success { function, coloring } => {
                    let frame_slots = function.next_free_slot();
                    debug!(
                        "{}: colored with {} registers after {} spill rounds, {} stack slots",
                        function.name,
                        target.k(),
                        rounds,
                        frame_slots
                    );
                    return Ok(Allocation {
                        function,
                        coloring,
                        frame_slots,
                        rounds,
                    });
                }
                State::NeedsSpill { function, coloring } => {
                    rounds += 1;
                    let only_temporaries =
                        coloring.spilled.iter().all(|var| temporaries.contains(var));
                    if rounds > max_rounds || only_temporaries {
                        return Err(Error::AllocationNonTermination {
                            function: function.name.to_string(),
                            rounds,
                        });
                    }

                    let spilled: Vec<Var> = coloring.spilled.iter().copied().collect();
                    debug!(
                        "{}: round {} spills {}",
                        function.name,
                        rounds,
                        spilled
                            .iter()
                            .map(|&var| function.vars.name(var))
                            .collect::<Vec<_>>()
                            .join(" ")
                    );

                    let first_slot = function.next_free_slot();
                    let Spilled {
                        function,
                        temporaries: fresh,
                    } = spiller.spill_all(&function, &spilled, first_slot);
                    temporaries.extend(fresh);
                    State::Building(function)
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_function;
    use crate::ir::{OpKind, RuntimeSymbols};
    use crate::test_helpers::{assign, binop, block, function, ret_val};

    fn allocator(registers: usize) -> GraphColoring {
        GraphColoring::new(AllocatorConfig {
            target: Target::with_registers(registers),
            ..AllocatorConfig::default()
        })
    }

    fn parse(src: &str) -> Function {
        parse_function(src, &RuntimeSymbols::new()).unwrap()
    }

    fn assert_sound(allocation: &Allocation, target: &Target) {
        let func = &allocation.function;
        let cfg = Cfg::build(func).unwrap();
        let liveness = Liveness::compute(func, &cfg);
        let graph = InterferenceGraph::build(func, &liveness, target);
        let color = |node: Node| match node {
            Node::Reg(reg) => Some(reg),
            Node::Var(var) => allocation.coloring.color(var),
        };

        for node in graph.nodes() {
            if let Node::Var(var) = node {
                assert!(color(node).is_some(), "{} is uncolored", func.vars.name(var));
            }
            for neighbor in graph.neighbors(node) {
                assert_ne!(color(node), color(neighbor));
            }
        }
    }

    const PRESSURE: &str = "define int64 @f() {
  :entry
  %a <- 1
  %b <- 2
  %c <- 3
  %x <- %b + %c
  %y <- %x + %a
  return %y
}";

    #[test]
    fn test_no_spill_with_enough_registers() {
        let func = parse(PRESSURE);
        let allocation = GraphColoring::default().allocate(&func).unwrap();
        assert_eq!(allocation.rounds, 0);
        assert_eq!(allocation.frame_slots, 0);
        assert_eq!(allocation.function, func);
        assert_sound(&allocation, &Target::x86_64());
    }

    #[test]
    fn test_three_live_values_with_two_registers_spill_once() {
        let func = parse(PRESSURE);
        let allocation = allocator(2).allocate(&func).unwrap();

        assert_eq!(allocation.rounds, 1);
        assert_eq!(allocation.frame_slots, 1);
        assert!(allocation.coloring.is_complete());
        // %a is the cheapest candidate and the only one spilled
        assert_eq!(
            allocation.function.to_string(),
            "define int64 @f() {
  :entry
  %S0 <- 1
  mem rsp 0 <- %S0
  %b <- 2
  %c <- 3
  %x <- %b + %c
  %S1 <- mem rsp 0
  %y <- %x + %S1
  return %y
}
"
        );
        assert_sound(&allocation, &Target::with_registers(2));
    }

    #[test]
    fn test_spill_candidate_prefers_low_cost() {
        let func = parse(PRESSURE);
        let degrees = BTreeMap::from([
            (func.vars.lookup("%a").unwrap(), 3),
            (func.vars.lookup("%b").unwrap(), 2),
        ]);
        let spilled = select_spill(&degrees, &occurrences(&func), &BTreeSet::new()).unwrap();
        assert_eq!(func.vars.name(spilled), "%a");

        // a temporary loses even when it would be cheaper
        let temporaries = BTreeSet::from([func.vars.lookup("%a").unwrap()]);
        let spilled = select_spill(&degrees, &occurrences(&func), &temporaries).unwrap();
        assert_eq!(func.vars.name(spilled), "%b");

        assert_eq!(select_spill(&BTreeMap::new(), &occurrences(&func), &temporaries), None);
    }

    #[test]
    fn test_loop_with_calls_colors_soundly() {
        let func = parse(
            "define int64 @main(int64 %n) {
  :entry
  %acc <- 0
  br :head
  :head
  %done <- %n <= 0
  br %done :exit :body
  :body
  %sq <- call @square(%n)
  %acc <- %acc + %sq
  call print(%acc)
  %n <- %n - 1
  br :head
  :exit
  return %acc
}",
        );
        for registers in [2, 4, 15] {
            let target = Target::with_registers(registers);
            let allocation = allocator(registers).allocate(&func).unwrap();
            assert!(allocation.rounds <= func.vars.len());
            assert_sound(&allocation, &target);
        }
    }

    #[test]
    fn test_spill_rounds_are_bounded_by_variable_count() {
        let func = parse(
            "define int64 @f() {
  :entry
  %a <- 1
  %b <- 2
  %c <- 3
  %d <- 4
  %e <- %a + %b
  %f <- %c + %d
  %g <- %e + %f
  return %g
}",
        );
        let allocation = allocator(3).allocate(&func).unwrap();
        assert!(allocation.rounds >= 1);
        assert!(allocation.rounds <= func.vars.len());
        assert!(allocation.frame_slots >= 1);
        assert_sound(&allocation, &Target::with_registers(3));
    }

    #[test]
    fn test_potential_spill_can_still_be_colored() {
        // %a -- %b -- %c -- %d -- %a: every node has degree 2, so simplify
        // gets stuck, yet the cycle is 2-colorable
        let func = parse(
            "define void @f() {
  :entry
  %a <- 1
  %b <- 2
  br :loop
  :loop
  %c <- %a + 1
  %d <- %b + 1
  %a <- %c + 1
  %b <- %d + 1
  br :loop
}",
        );
        let target = Target::with_registers(2);
        let cfg = Cfg::build(&func).unwrap();
        let graph = InterferenceGraph::build(&func, &Liveness::compute(&func, &cfg), &target);
        for name in ["%a", "%b", "%c", "%d"] {
            assert_eq!(graph.degree(Node::Var(func.vars.lookup(name).unwrap())), 2);
        }

        let allocation = allocator(2).allocate(&func).unwrap();
        assert_eq!(allocation.rounds, 0);
        assert_eq!(allocation.frame_slots, 0);
        assert!(allocation.coloring.spilled.is_empty());
        assert_eq!(allocation.function, func);
        assert_sound(&allocation, &target);
    }

    #[test]
    fn test_copy_related_values_get_distinct_registers() {
        let mut f = function("@f", &["%a"]);
        let instrs = vec![
            assign(&mut f, "%b", "%a"),
            binop(&mut f, "%c", "%a", OpKind::Add, "%b"),
        ];
        let exit = ret_val(&mut f, "%c");
        block(&mut f, ":entry", instrs, exit);

        let allocation = GraphColoring::default().allocate(&f).unwrap();
        let color = |name: &str| allocation.coloring.color(f.vars.lookup(name).unwrap());
        assert_eq!(color("%a"), Some(Register::Rdi));
        assert_eq!(color("%b"), Some(Register::R10));
        assert_eq!(color("%c"), Some(Register::R10));
        assert_sound(&allocation, &Target::x86_64());
    }

    #[test]
    fn test_round_limit_is_enforced() {
        let func = parse(PRESSURE);
        let gc = GraphColoring::new(AllocatorConfig {
            target: Target::with_registers(2),
            max_rounds: Some(0),
            ..AllocatorConfig::default()
        });
        let err = gc.allocate(&func).unwrap_err();
        assert!(matches!(err, Error::AllocationNonTermination { rounds: 1, .. }));
    }

    #[test]
    fn test_spilling_only_temporaries_does_not_terminate() {
        // a single register cannot hold both operands of an addition
        let func = parse("define int64 @f() {\n:entry\n%a <- 1\n%b <- 2\n%c <- %a + %b\nreturn %c\n}");
        let err = allocator(1).allocate(&func).unwrap_err();
        match err {
            Error::AllocationNonTermination { function, rounds } => {
                assert_eq!(function, "@f");
                assert_eq!(rounds, 3);
            }
            other => panic!("expected AllocationNonTermination, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_label_stops_before_liveness() {
        let func = parse("define void @f() {\n:entry\nbr :missing\n}");
        let err = GraphColoring::default().allocate(&func).unwrap_err();
        assert!(matches!(err, Error::UnresolvedLabel { .. }));
    }
}
