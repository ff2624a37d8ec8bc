//! A reference interpreter for the IR. Used to check that rewriting a
//! function (spilling in particular) does not change what it computes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::error::{Error, Result};
use crate::ir::{CallExpr, Function, Instruction, Item, Program, RuntimeSymbols, Terminator, Var};

const DEFAULT_MAX_CYCLES: u64 = 1_000_000;
/// Largest array or tuple the interpreter will allocate, in elements.
const MAX_ELEMENTS: i64 = 1 << 24;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Aggregate(Rc<RefCell<Aggregate>>),
    Code(String),
}

/// Storage of an array or tuple. Tuples have a single dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub dims: Vec<i64>,
    pub elements: Vec<Value>,
}

impl Value {
    fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(Error::Runtime(format!("expected an integer, found {}", other))),
        }
    }

    fn aggregate(dims: Vec<i64>) -> Result<Self> {
        let len = dims
            .iter()
            .try_fold(1i64, |acc, &dim| acc.checked_mul(dim.max(0)))
            .filter(|&len| len <= MAX_ELEMENTS)
            .ok_or_else(|| {
                Error::Runtime(format!(
                    "allocation of {:?} exceeds {} elements",
                    dims, MAX_ELEMENTS
                ))
            })?;
        Ok(Value::Aggregate(Rc::new(RefCell::new(Aggregate {
            dims,
            elements: vec![Value::Int(0); len as usize],
        }))))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Code(name) => f.write_str(name),
            Value::Aggregate(agg) => {
                let agg = agg.borrow();
                write!(f, "{{s:{}", agg.elements.len())?;
                for element in &agg.elements {
                    write!(f, ", {}", element)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Result of running a program to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub value: Option<Value>,
    pub output: Vec<String>,
    pub cycles: u64,
}

struct Frame<'a> {
    func: &'a Function,
    vars: HashMap<Var, Value>,
    slots: HashMap<u32, Value>,
}

impl Frame<'_> {
    fn var(&self, var: Var) -> Result<Value> {
        self.vars.get(&var).cloned().ok_or_else(|| {
            Error::Runtime(format!(
                "{}: variable {} used before definition",
                self.func.name,
                self.func.vars.name(var)
            ))
        })
    }
}

pub struct Interpreter<'a> {
    program: &'a Program,
    runtime: &'a RuntimeSymbols,
    input: VecDeque<i64>,
    output: Vec<String>,
    cycles: u64,
    max_cycles: u64,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, runtime: &'a RuntimeSymbols) -> Self {
        Interpreter {
            program,
            runtime,
            input: VecDeque::new(),
            output: Vec::new(),
            cycles: 0,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    /// Values returned by successive `input()` calls.
    pub fn with_input(mut self, input: impl IntoIterator<Item = i64>) -> Self {
        self.input.extend(input);
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn run(mut self, entry: &str, args: Vec<Value>) -> Result<Execution> {
        let program = self.program;
        let func = program
            .function(entry)
            .ok_or_else(|| Error::Runtime(format!("unknown function {}", entry)))?;
        let value = self.call(func, args)?;
        trace!("{} returned after {} cycles", entry, self.cycles);
        Ok(Execution {
            value,
            output: self.output,
            cycles: self.cycles,
        })
    }

    fn tick(&mut self) -> Result<()> {
        self.cycles += 1;
        if self.cycles > self.max_cycles {
            return Err(Error::Runtime(format!(
                "cycle limit of {} exceeded",
                self.max_cycles
            )));
        }
        Ok(())
    }

    fn call(&mut self, func: &'a Function, args: Vec<Value>) -> Result<Option<Value>> {
        if args.len() != func.params.len() {
            return Err(Error::Runtime(format!(
                "{} expects {} arguments, got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }

        let mut frame = Frame {
            func,
            vars: func.args().zip(args).collect(),
            slots: HashMap::new(),
        };
        let labels: HashMap<&str, usize> = func
            .blocks
            .iter()
            .enumerate()
            .map(|(id, block)| (block.label.as_str(), id))
            .collect();
        let jump = |target: &Item| -> Result<usize> {
            target
                .as_label()
                .and_then(|label| labels.get(label.as_str()).copied())
                .ok_or_else(|| Error::Runtime(format!("{}: bad branch target", func.name)))
        };

        let mut current = 0;
        loop {
            let block = func
                .blocks
                .get(current)
                .ok_or_else(|| Error::Runtime(format!("{} has no blocks", func.name)))?;
            for instr in &block.instrs {
                self.tick()?;
                self.execute(&mut frame, instr)?;
            }

            self.tick()?;
            current = match &block.terminator {
                Terminator::Return => return Ok(None),
                Terminator::ReturnValue(value) => return Ok(Some(self.eval(&frame, value)?)),
                Terminator::Branch(target) => jump(target)?,
                Terminator::CondBranch {
                    cond,
                    on_true,
                    on_false,
                } => {
                    if self.eval(&frame, cond)?.as_int()? != 0 {
                        jump(on_true)?
                    } else {
                        jump(on_false)?
                    }
                }
            };
        }
    }

    fn execute(&mut self, frame: &mut Frame<'a>, instr: &Instruction) -> Result<()> {
        match instr {
            Instruction::Declare { var, .. } => {
                frame.vars.insert(*var, Value::Int(0));
            }
            Instruction::Call(call) => {
                self.invoke(frame, call)?;
            }
            Instruction::Assign { dst, src } => {
                let value = self.eval(frame, src)?;
                self.store(frame, dst, value)?;
            }
        }
        Ok(())
    }

    fn store(&mut self, frame: &mut Frame<'a>, dst: &Item, value: Value) -> Result<()> {
        match dst {
            Item::Var(var) => {
                frame.vars.insert(*var, value);
            }
            Item::Slot(slot) => {
                frame.slots.insert(slot.0, value);
            }
            Item::ArrayAccess { base, offsets } => {
                let (agg, index) = self.element(frame, base, offsets)?;
                agg.borrow_mut().elements[index] = value;
            }
            _ => {
                return Err(Error::Runtime(format!(
                    "{}: cannot assign to this operand",
                    frame.func.name
                )));
            }
        }
        Ok(())
    }

    /// Resolves `base[o1][o2]...` to its aggregate and flat element index.
    fn element(
        &mut self,
        frame: &Frame<'a>,
        base: &Item,
        offsets: &[Item],
    ) -> Result<(Rc<RefCell<Aggregate>>, usize)> {
        let Value::Aggregate(agg) = self.eval(frame, base)? else {
            return Err(Error::Runtime(format!(
                "{}: indexing a value that is not an array",
                frame.func.name
            )));
        };

        let mut indices = Vec::with_capacity(offsets.len());
        for offset in offsets {
            indices.push(self.eval(frame, offset)?.as_int()?);
        }

        let index = {
            let data = agg.borrow();
            if indices.len() != data.dims.len() {
                return Err(Error::Runtime(format!(
                    "{}: {} offsets for an array of {} dimensions",
                    frame.func.name,
                    indices.len(),
                    data.dims.len()
                )));
            }
            let mut flat = 0i64;
            for (&idx, &dim) in indices.iter().zip(&data.dims) {
                if idx < 0 || idx >= dim {
                    return Err(Error::Runtime(format!(
                        "{}: array access out of bounds (index {}, length {})",
                        frame.func.name, idx, dim
                    )));
                }
                flat = flat * dim + idx;
            }
            flat as usize
        };
        Ok((agg, index))
    }

    fn eval(&mut self, frame: &Frame<'a>, item: &Item) -> Result<Value> {
        match item {
            Item::Constant(n) => Ok(Value::Int(*n)),
            Item::Var(var) => frame.var(*var),
            Item::Slot(slot) => frame.slots.get(&slot.0).cloned().ok_or_else(|| {
                Error::Runtime(format!(
                    "{}: stack offset {} read before it was written",
                    frame.func.name,
                    slot.offset()
                ))
            }),
            Item::Label(label) if label.as_str().starts_with('@') => {
                Ok(Value::Code(label.to_string()))
            }
            Item::Label(label) => Err(Error::Runtime(format!(
                "{}: label {} used as a value",
                frame.func.name, label
            ))),
            Item::Type(_) => Err(Error::Runtime(format!(
                "{}: type used as a value",
                frame.func.name
            ))),
            Item::BinaryOp { lhs, op, rhs } => {
                let lhs = self.eval(frame, lhs)?.as_int()?;
                let rhs = self.eval(frame, rhs)?.as_int()?;
                Ok(Value::Int(op.apply(lhs, rhs)))
            }
            Item::ArrayAccess { base, offsets } => {
                let (agg, index) = self.element(frame, base, offsets)?;
                let value = agg.borrow().elements[index].clone();
                Ok(value)
            }
            Item::Call(call) => self.invoke(frame, call)?.ok_or_else(|| {
                Error::Runtime(format!(
                    "{}: call without a result used as a value",
                    frame.func.name
                ))
            }),
            Item::NewArray { dims } => {
                let mut lengths = Vec::with_capacity(dims.len());
                for dim in dims {
                    let len = self.eval(frame, dim)?.as_int()?;
                    if len < 0 {
                        return Err(Error::Runtime(format!(
                            "{}: negative array dimension {}",
                            frame.func.name, len
                        )));
                    }
                    lengths.push(len);
                }
                Value::aggregate(lengths)
            }
            Item::NewTuple { length } => {
                let len = self.eval(frame, length)?.as_int()?;
                Value::aggregate(vec![len.max(0)])
            }
            Item::Length { base, dim } => {
                let Value::Aggregate(agg) = self.eval(frame, base)? else {
                    return Err(Error::Runtime(format!(
                        "{}: length of a value that is not an array",
                        frame.func.name
                    )));
                };
                let dim = self.eval(frame, dim)?.as_int()?;
                let len = agg.borrow().dims.get(dim as usize).copied();
                len.map(Value::Int).ok_or_else(|| {
                    Error::Runtime(format!("{}: no dimension {}", frame.func.name, dim))
                })
            }
        }
    }

    fn invoke(&mut self, frame: &Frame<'a>, call: &CallExpr) -> Result<Option<Value>> {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.eval(frame, arg)?);
        }

        if call.runtime {
            let runtime = self.runtime;
            return match call.callee.as_label() {
                Some(label) if *label == runtime.print => {
                    let line = args
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(" ");
                    self.output.push(line);
                    Ok(None)
                }
                Some(label) if *label == runtime.input => self
                    .input
                    .pop_front()
                    .map(|n| Some(Value::Int(n)))
                    .ok_or_else(|| Error::Runtime("input exhausted".to_string())),
                Some(label) if *label == runtime.tensor_error => Err(Error::Runtime(format!(
                    "tensor error raised in {}",
                    frame.func.name
                ))),
                _ => Err(Error::Runtime(format!(
                    "{}: unknown runtime call",
                    frame.func.name
                ))),
            };
        }

        let Value::Code(name) = self.eval(frame, &call.callee)? else {
            return Err(Error::Runtime(format!(
                "{}: calling a value that is not a function",
                frame.func.name
            )));
        };
        let program = self.program;
        let callee = program
            .function(&name)
            .ok_or_else(|| Error::Runtime(format!("unknown function {}", name)))?;
        self.call(callee, args)
    }
}
