use std::fmt;

use super::vars::{Names, Var};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int64,
    Tuple,
    Code,
    Void,
}

/// A type signature. Signatures are small immutable values, so every copy
/// is indistinguishable from the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSig {
    pub kind: ValueKind,
    pub dims: u32,
}

impl TypeSig {
    pub const INT64: TypeSig = TypeSig::scalar(ValueKind::Int64);
    pub const TUPLE: TypeSig = TypeSig::scalar(ValueKind::Tuple);
    pub const CODE: TypeSig = TypeSig::scalar(ValueKind::Code);
    pub const VOID: TypeSig = TypeSig::scalar(ValueKind::Void);

    pub const fn scalar(kind: ValueKind) -> Self {
        TypeSig { kind, dims: 0 }
    }

    pub const fn array(dims: u32) -> Self {
        TypeSig {
            kind: ValueKind::Int64,
            dims,
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValueKind::Int64 => {
                f.write_str("int64")?;
                for _ in 0..self.dims {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            ValueKind::Tuple => f.write_str("tuple"),
            ValueKind::Code => f.write_str("code"),
            ValueKind::Void => f.write_str("void"),
        }
    }
}

/// A label or function name, stored with its sigil (`:loop`, `@main`) or as
/// a bare runtime symbol (`print`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stack slot holding a spilled variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpillSlot(pub u32);

impl SpillSlot {
    pub fn offset(self) -> i64 {
        self.0 as i64 * 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    BitAnd,
    Shl,
    Shr,
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl OpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            OpKind::Add => "+",
            OpKind::Sub => "-",
            OpKind::Mul => "*",
            OpKind::BitAnd => "&",
            OpKind::Shl => "<<",
            OpKind::Shr => ">>",
            OpKind::Eq => "=",
            OpKind::Lt => "<",
            OpKind::Lte => "<=",
            OpKind::Gt => ">",
            OpKind::Gte => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => OpKind::Add,
            "-" => OpKind::Sub,
            "*" => OpKind::Mul,
            "&" => OpKind::BitAnd,
            "<<" => OpKind::Shl,
            ">>" => OpKind::Shr,
            "=" => OpKind::Eq,
            "<" => OpKind::Lt,
            "<=" => OpKind::Lte,
            ">" => OpKind::Gt,
            ">=" => OpKind::Gte,
            _ => return None,
        };
        Some(op)
    }

    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            OpKind::Add => lhs.wrapping_add(rhs),
            OpKind::Sub => lhs.wrapping_sub(rhs),
            OpKind::Mul => lhs.wrapping_mul(rhs),
            OpKind::BitAnd => lhs & rhs,
            OpKind::Shl => lhs.wrapping_shl(rhs as u32),
            OpKind::Shr => lhs.wrapping_shr(rhs as u32),
            OpKind::Eq => (lhs == rhs) as i64,
            OpKind::Lt => (lhs < rhs) as i64,
            OpKind::Lte => (lhs <= rhs) as i64,
            OpKind::Gt => (lhs > rhs) as i64,
            OpKind::Gte => (lhs >= rhs) as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub runtime: bool,
    pub callee: Item,
    pub args: Vec<Item>,
}

/// Operand and expression tree.
///
/// `Clone` is the copy operation: `Var` and `Type` are handles and copy as
/// themselves, every other variant is an owned tree and clones deeply, so a
/// rewrite of one use site never shows up at another.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Type(TypeSig),
    Constant(i64),
    Label(Label),
    Var(Var),
    ArrayAccess {
        base: Box<Item>,
        offsets: Vec<Item>,
    },
    BinaryOp {
        lhs: Box<Item>,
        op: OpKind,
        rhs: Box<Item>,
    },
    Call(Box<CallExpr>),
    NewArray {
        dims: Vec<Item>,
    },
    NewTuple {
        length: Box<Item>,
    },
    Length {
        base: Box<Item>,
        dim: Box<Item>,
    },
    Slot(SpillSlot),
}

/// Leaf hooks for walking an item tree. `Item::accept` does the recursion,
/// so a pass only overrides the leaves it cares about.
pub trait Visitor {
    fn visit_var(&mut self, _var: Var) {}
    fn visit_label(&mut self, _label: &Label) {}
    fn visit_constant(&mut self, _value: i64) {}
    fn visit_type(&mut self, _sig: TypeSig) {}
    fn visit_slot(&mut self, _slot: SpillSlot) {}
}

#[derive(Default)]
struct VarCollector {
    vars: Vec<Var>,
}

impl Visitor for VarCollector {
    fn visit_var(&mut self, var: Var) {
        if !self.vars.contains(&var) {
            self.vars.push(var);
        }
    }
}

impl Item {
    pub fn var(var: Var) -> Self {
        Item::Var(var)
    }

    pub fn label(name: impl Into<String>) -> Self {
        Item::Label(Label::new(name))
    }

    pub fn binary(lhs: Item, op: OpKind, rhs: Item) -> Self {
        Item::BinaryOp {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn as_var(&self) -> Option<Var> {
        match self {
            Item::Var(var) => Some(*var),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Item::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallExpr> {
        match self {
            Item::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn accept(&self, visitor: &mut dyn Visitor) {
        match self {
            Item::Type(sig) => visitor.visit_type(*sig),
            Item::Constant(value) => visitor.visit_constant(*value),
            Item::Label(label) => visitor.visit_label(label),
            Item::Var(var) => visitor.visit_var(*var),
            Item::Slot(slot) => visitor.visit_slot(*slot),
            Item::ArrayAccess { base, offsets } => {
                base.accept(visitor);
                for offset in offsets {
                    offset.accept(visitor);
                }
            }
            Item::BinaryOp { lhs, rhs, .. } => {
                lhs.accept(visitor);
                rhs.accept(visitor);
            }
            Item::Call(call) => call.accept(visitor),
            Item::NewArray { dims } => {
                for dim in dims {
                    dim.accept(visitor);
                }
            }
            Item::NewTuple { length } => length.accept(visitor),
            Item::Length { base, dim } => {
                base.accept(visitor);
                dim.accept(visitor);
            }
        }
    }

    /// Variables occurring anywhere in the tree, in first-occurrence order.
    pub fn vars(&self) -> Vec<Var> {
        let mut collector = VarCollector::default();
        self.accept(&mut collector);
        collector.vars
    }

    pub fn mentions(&self, var: Var) -> bool {
        self.vars().contains(&var)
    }

    /// Rewrites every variable leaf in place.
    pub fn map_vars(&mut self, f: &mut dyn FnMut(Var) -> Var) {
        match self {
            Item::Var(var) => *var = f(*var),
            Item::Type(_) | Item::Constant(_) | Item::Label(_) | Item::Slot(_) => {}
            Item::ArrayAccess { base, offsets } => {
                base.map_vars(f);
                for offset in offsets {
                    offset.map_vars(f);
                }
            }
            Item::BinaryOp { lhs, rhs, .. } => {
                lhs.map_vars(f);
                rhs.map_vars(f);
            }
            Item::Call(call) => call.map_vars(f),
            Item::NewArray { dims } => {
                for dim in dims {
                    dim.map_vars(f);
                }
            }
            Item::NewTuple { length } => length.map_vars(f),
            Item::Length { base, dim } => {
                base.map_vars(f);
                dim.map_vars(f);
            }
        }
    }
}

impl CallExpr {
    pub fn accept(&self, visitor: &mut dyn Visitor) {
        self.callee.accept(visitor);
        for arg in &self.args {
            arg.accept(visitor);
        }
    }

    pub fn vars(&self) -> Vec<Var> {
        let mut collector = VarCollector::default();
        self.accept(&mut collector);
        collector.vars
    }

    pub fn map_vars(&mut self, f: &mut dyn FnMut(Var) -> Var) {
        self.callee.map_vars(f);
        for arg in &mut self.args {
            arg.map_vars(f);
        }
    }
}

/// Text rendering that needs to know how variables are named.
pub trait Render {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result;

    fn display<'a>(&'a self, names: &'a dyn Names) -> Rendered<'a, Self> {
        Rendered { node: self, names }
    }
}

pub struct Rendered<'a, T: ?Sized> {
    node: &'a T,
    names: &'a dyn Names,
}

impl<T: Render + ?Sized> fmt::Display for Rendered<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.render(f, self.names)
    }
}

fn render_list(f: &mut fmt::Formatter<'_>, items: &[Item], names: &dyn Names) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.render(f, names)?;
    }
    Ok(())
}

impl Render for CallExpr {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        f.write_str("call ")?;
        self.callee.render(f, names)?;
        f.write_str("(")?;
        render_list(f, &self.args, names)?;
        f.write_str(")")
    }
}

impl Render for Item {
    fn render(&self, f: &mut fmt::Formatter<'_>, names: &dyn Names) -> fmt::Result {
        match self {
            Item::Type(sig) => write!(f, "{}", sig),
            Item::Constant(value) => write!(f, "{}", value),
            Item::Label(label) => write!(f, "{}", label),
            Item::Var(var) => names.write_var(f, *var),
            Item::Slot(slot) => write!(f, "mem rsp {}", slot.offset()),
            Item::ArrayAccess { base, offsets } => {
                base.render(f, names)?;
                for offset in offsets {
                    f.write_str("[")?;
                    offset.render(f, names)?;
                    f.write_str("]")?;
                }
                Ok(())
            }
            Item::BinaryOp { lhs, op, rhs } => {
                lhs.render(f, names)?;
                write!(f, " {} ", op.symbol())?;
                rhs.render(f, names)
            }
            Item::Call(call) => call.render(f, names),
            Item::NewArray { dims } => {
                f.write_str("new Array(")?;
                render_list(f, dims, names)?;
                f.write_str(")")
            }
            Item::NewTuple { length } => {
                f.write_str("new Tuple(")?;
                length.render(f, names)?;
                f.write_str(")")
            }
            Item::Length { base, dim } => {
                f.write_str("length ")?;
                base.render(f, names)?;
                f.write_str(" ")?;
                dim.render(f, names)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::vars::VarTable;

    #[test]
    fn test_clone_deep_copies_trees_but_shares_vars() {
        let mut vars = VarTable::new();
        let a = vars.intern("%a");
        let b = vars.intern("%b");
        let original = Item::ArrayAccess {
            base: Box::new(Item::Var(a)),
            offsets: vec![Item::binary(Item::Var(b), OpKind::Add, Item::Constant(1))],
        };

        let mut copy = original.clone();
        let c = vars.intern("%c");
        copy.map_vars(&mut |v| if v == b { c } else { v });

        // the copy was rewritten, the original still refers to %b
        assert_eq!(original.vars(), vec![a, b]);
        assert_eq!(copy.vars(), vec![a, c]);
        // the shared base variable is the same handle in both
        assert_eq!(original.vars()[0], copy.vars()[0]);
    }

    #[test]
    fn test_visitor_sees_every_leaf() {
        #[derive(Default)]
        struct Counter {
            vars: usize,
            labels: usize,
            constants: usize,
        }
        impl Visitor for Counter {
            fn visit_var(&mut self, _var: Var) {
                self.vars += 1;
            }
            fn visit_label(&mut self, _label: &Label) {
                self.labels += 1;
            }
            fn visit_constant(&mut self, _value: i64) {
                self.constants += 1;
            }
        }

        let mut vars = VarTable::new();
        let x = vars.intern("%x");
        let item = Item::Call(Box::new(CallExpr {
            runtime: false,
            callee: Item::label("@f"),
            args: vec![
                Item::Var(x),
                Item::Constant(3),
                Item::Length {
                    base: Box::new(Item::Var(x)),
                    dim: Box::new(Item::Constant(0)),
                },
            ],
        }));

        let mut counter = Counter::default();
        item.accept(&mut counter);
        assert_eq!(counter.vars, 2);
        assert_eq!(counter.labels, 1);
        assert_eq!(counter.constants, 2);
        // duplicates are collapsed
        assert_eq!(item.vars(), vec![x]);
    }

    #[test]
    fn test_render_items() {
        let mut vars = VarTable::new();
        let arr = vars.intern("%arr");
        let i = vars.intern("%i");

        let access = Item::ArrayAccess {
            base: Box::new(Item::Var(arr)),
            offsets: vec![Item::Constant(0), Item::Var(i)],
        };
        assert_eq!(access.display(&vars).to_string(), "%arr[0][%i]");

        let new_array = Item::NewArray {
            dims: vec![Item::Constant(3), Item::Var(i)],
        };
        assert_eq!(new_array.display(&vars).to_string(), "new Array(3, %i)");

        let length = Item::Length {
            base: Box::new(Item::Var(arr)),
            dim: Box::new(Item::Constant(1)),
        };
        assert_eq!(length.display(&vars).to_string(), "length %arr 1");

        assert_eq!(Item::Slot(SpillSlot(2)).display(&vars).to_string(), "mem rsp 16");
        assert_eq!(TypeSig::array(2).to_string(), "int64[][]");
    }

    #[test]
    fn test_op_symbols_round_trip() {
        for op in [
            OpKind::Add,
            OpKind::Sub,
            OpKind::Mul,
            OpKind::BitAnd,
            OpKind::Shl,
            OpKind::Shr,
            OpKind::Eq,
            OpKind::Lt,
            OpKind::Lte,
            OpKind::Gt,
            OpKind::Gte,
        ] {
            assert_eq!(OpKind::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(OpKind::Lte.apply(3, 3), 1);
        assert_eq!(OpKind::Shl.apply(1, 4), 16);
    }
}
