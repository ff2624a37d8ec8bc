use crate::error::{Error, Result};
use crate::frontend::token::{Token, TokenKind};
use crate::frontend::tokenizer::Tokenizer;
use crate::ir::{
    BasicBlock, CallExpr, Function, Instruction, Item, Label, Param, Program, RuntimeSymbols,
    SpillSlot, Terminator, TypeSig, ValueKind, Var,
};

/// A single function together with the variable to spill and the prefix for
/// the temporaries the spiller introduces.
#[derive(Debug, Clone, PartialEq)]
pub struct SpillRequest {
    pub function: Function,
    pub var: Var,
    pub prefix: String,
}

pub fn parse_program(input: &str, runtime: &RuntimeSymbols) -> Result<Program> {
    let tokens = Tokenizer::tokenize(input)?;
    let mut parser = Parser::new(&tokens, runtime);
    let mut program = Program::default();
    parser.skip_newlines();
    while !parser.at_end() {
        program.functions.push(parser.function()?);
        parser.skip_newlines();
    }
    if program.functions.is_empty() {
        return Err(Error::parse(parser.line(), "expected at least one function"));
    }
    Ok(program)
}

pub fn parse_function(input: &str, runtime: &RuntimeSymbols) -> Result<Function> {
    let tokens = Tokenizer::tokenize(input)?;
    let mut parser = Parser::new(&tokens, runtime);
    parser.skip_newlines();
    let function = parser.function()?;
    parser.skip_newlines();
    parser.expect_end()?;
    Ok(function)
}

pub fn parse_spill_request(input: &str, runtime: &RuntimeSymbols) -> Result<SpillRequest> {
    let tokens = Tokenizer::tokenize(input)?;
    let mut parser = Parser::new(&tokens, runtime);
    parser.skip_newlines();
    let mut function = parser.function()?;
    parser.skip_newlines();
    let var_name = parser.var_name()?;
    parser.skip_newlines();
    let prefix = parser.var_name()?;
    parser.skip_newlines();
    parser.expect_end()?;
    let var = function.vars.intern(&var_name);
    Ok(SpillRequest {
        function,
        var,
        prefix,
    })
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    runtime: &'a RuntimeSymbols,
}

// Block under construction while walking a function body
struct OpenBlock {
    label: Label,
    instrs: Vec<Instruction>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], runtime: &'a RuntimeSymbols) -> Self {
        Parser {
            tokens,
            position: 0,
            runtime,
        }
    }

    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.position).map(|token| &token.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a TokenKind> {
        self.tokens
            .get(self.position + offset)
            .map(|token| &token.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(1, |token| token.line)
    }

    fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<&'a TokenKind> {
        let kind = self.peek();
        if kind.is_some() {
            self.position += 1;
        }
        kind
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(Error::parse(self.line(), message))
    }

    fn describe(&self) -> String {
        match self.peek() {
            Some(kind) => format!("'{}'", kind),
            None => "end of input".to_string(),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<()> {
        if self.peek() == Some(&expected) {
            self.position += 1;
            Ok(())
        } else {
            self.error(format!("expected '{}', found {}", expected, self.describe()))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        if self.check_word(word) {
            self.position += 1;
            Ok(())
        } else {
            self.error(format!("expected '{}', found {}", word, self.describe()))
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            self.error(format!("unexpected {} after function", self.describe()))
        }
    }

    fn expect_line_end(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(TokenKind::Newline) => {
                self.skip_newlines();
                Ok(())
            }
            Some(TokenKind::RightBrace) => Ok(()),
            Some(_) => self.error(format!("unexpected {} at end of instruction", self.describe())),
        }
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Word(w)) if w == word)
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&TokenKind::Newline) {
            self.position += 1;
        }
    }

    fn var_name(&mut self) -> Result<String> {
        match self.advance() {
            Some(TokenKind::Var(name)) => Ok(name.clone()),
            _ => {
                self.position = self.position.saturating_sub(1);
                self.error(format!("expected a variable, found {}", self.describe()))
            }
        }
    }

    fn is_type_start(&self) -> bool {
        ["int64", "tuple", "code", "void"]
            .iter()
            .any(|word| self.check_word(word))
    }

    fn type_sig(&mut self) -> Result<TypeSig> {
        let kind = match self.peek() {
            Some(TokenKind::Word(w)) if w == "int64" => ValueKind::Int64,
            Some(TokenKind::Word(w)) if w == "tuple" => ValueKind::Tuple,
            Some(TokenKind::Word(w)) if w == "code" => ValueKind::Code,
            Some(TokenKind::Word(w)) if w == "void" => ValueKind::Void,
            _ => return self.error(format!("expected a type, found {}", self.describe())),
        };
        self.position += 1;

        let mut dims = 0;
        if kind == ValueKind::Int64 {
            while self.peek() == Some(&TokenKind::LeftBracket)
                && self.peek_at(1) == Some(&TokenKind::RightBracket)
            {
                self.position += 2;
                dims += 1;
            }
        }
        Ok(TypeSig { kind, dims })
    }

    pub fn function(&mut self) -> Result<Function> {
        self.expect_word("define")?;
        let ret_type = self.type_sig()?;
        let name = match self.advance() {
            Some(TokenKind::Function(name)) => name.clone(),
            _ => return self.error("expected a function name"),
        };

        let mut function = Function::new(name, ret_type);
        self.expect(TokenKind::LeftParen)?;
        if self.peek() != Some(&TokenKind::RightParen) {
            loop {
                let ty = self.type_sig()?;
                let var_name = self.var_name()?;
                let var = function.vars.intern(&var_name);
                function.params.push(Param { ty, var });
                if self.peek() == Some(&TokenKind::Comma) {
                    self.position += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;
        self.expect(TokenKind::LeftBrace)?;
        self.skip_newlines();

        let mut open: Option<OpenBlock> = None;
        loop {
            match self.peek() {
                None => return self.error(format!("unterminated function {}", function.name)),
                Some(TokenKind::RightBrace) => {
                    if let Some(block) = &open {
                        return self.error(format!(
                            "block {} does not end with a terminator",
                            block.label
                        ));
                    }
                    self.position += 1;
                    break;
                }
                Some(TokenKind::Label(name)) if self.peek_at(1) != Some(&TokenKind::Arrow) => {
                    if let Some(block) = &open {
                        return self.error(format!(
                            "block {} does not end with a terminator",
                            block.label
                        ));
                    }
                    let duplicate = function.blocks.iter().any(|b| b.label.as_str() == name);
                    if duplicate {
                        return self.error(format!("label {} is defined twice", name));
                    }
                    self.position += 1;
                    open = Some(OpenBlock {
                        label: Label::new(name.clone()),
                        instrs: Vec::new(),
                    });
                    self.expect_line_end()?;
                }
                Some(_) => {
                    let Some(block) = open.as_mut() else {
                        return self.error(format!(
                            "instruction {} outside of a basic block",
                            self.describe()
                        ));
                    };
                    if let Some(terminator) = self.terminator(&mut function)? {
                        if let Some(block) = open.take() {
                            function.blocks.push(BasicBlock {
                                label: block.label,
                                instrs: block.instrs,
                                terminator,
                            });
                        }
                    } else {
                        let instr = self.instruction(&mut function)?;
                        block.instrs.push(instr);
                    }
                    self.expect_line_end()?;
                }
            }
        }

        if function.blocks.is_empty() {
            return self.error(format!("function {} has no basic blocks", function.name));
        }
        Ok(function)
    }

    fn terminator(&mut self, function: &mut Function) -> Result<Option<Terminator>> {
        if self.check_word("return") {
            self.position += 1;
            return match self.peek() {
                None | Some(TokenKind::Newline) | Some(TokenKind::RightBrace) => {
                    Ok(Some(Terminator::Return))
                }
                Some(_) => Ok(Some(Terminator::ReturnValue(self.operand(function)?))),
            };
        }

        if self.check_word("br") {
            self.position += 1;
            let first = self.operand(function)?;
            return match self.peek() {
                None | Some(TokenKind::Newline) | Some(TokenKind::RightBrace) => {
                    Ok(Some(Terminator::Branch(first)))
                }
                Some(_) => {
                    let on_true = self.operand(function)?;
                    let on_false = self.operand(function)?;
                    Ok(Some(Terminator::CondBranch {
                        cond: first,
                        on_true,
                        on_false,
                    }))
                }
            };
        }

        Ok(None)
    }

    fn instruction(&mut self, function: &mut Function) -> Result<Instruction> {
        if self.is_type_start() {
            let ty = self.type_sig()?;
            let var_name = self.var_name()?;
            let var = function.vars.intern(&var_name);
            return Ok(Instruction::Declare { ty, var });
        }

        if self.check_word("call") {
            return Ok(Instruction::Call(self.call(function)?));
        }

        let dst = self.destination(function)?;
        self.expect(TokenKind::Arrow)?;
        let src = self.source(function)?;
        Ok(Instruction::Assign { dst, src })
    }

    fn destination(&mut self, function: &mut Function) -> Result<Item> {
        if self.check_word("mem") {
            return self.slot();
        }
        let var_name = self.var_name()?;
        let base = Item::Var(function.vars.intern(&var_name));
        self.with_offsets(base, function)
    }

    fn source(&mut self, function: &mut Function) -> Result<Item> {
        match self.peek() {
            Some(TokenKind::Word(w)) if w == "call" => {
                Ok(Item::Call(Box::new(self.call(function)?)))
            }
            Some(TokenKind::Word(w)) if w == "mem" => self.slot(),
            Some(TokenKind::Word(w)) if w == "length" => {
                self.position += 1;
                let base = self.operand(function)?;
                let dim = self.operand(function)?;
                Ok(Item::Length {
                    base: Box::new(base),
                    dim: Box::new(dim),
                })
            }
            Some(TokenKind::Word(w)) if w == "new" => {
                self.position += 1;
                if self.check_word("Array") {
                    self.position += 1;
                    let dims = self.arguments(function)?;
                    Ok(Item::NewArray { dims })
                } else if self.check_word("Tuple") {
                    self.position += 1;
                    self.expect(TokenKind::LeftParen)?;
                    let length = self.operand(function)?;
                    self.expect(TokenKind::RightParen)?;
                    Ok(Item::NewTuple {
                        length: Box::new(length),
                    })
                } else {
                    self.error(format!("expected 'Array' or 'Tuple', found {}", self.describe()))
                }
            }
            _ => {
                let lhs = self.operand(function)?;
                let lhs = self.with_offsets(lhs, function)?;
                if let Some(TokenKind::Op(op)) = self.peek() {
                    self.position += 1;
                    let rhs = self.operand(function)?;
                    Ok(Item::binary(lhs, *op, rhs))
                } else {
                    Ok(lhs)
                }
            }
        }
    }

    fn with_offsets(&mut self, base: Item, function: &mut Function) -> Result<Item> {
        if self.peek() != Some(&TokenKind::LeftBracket) || base.as_var().is_none() {
            return Ok(base);
        }
        let mut offsets = Vec::new();
        while self.peek() == Some(&TokenKind::LeftBracket) {
            self.position += 1;
            offsets.push(self.operand(function)?);
            self.expect(TokenKind::RightBracket)?;
        }
        Ok(Item::ArrayAccess {
            base: Box::new(base),
            offsets,
        })
    }

    fn slot(&mut self) -> Result<Item> {
        self.expect_word("mem")?;
        self.expect_word("rsp")?;
        match self.advance() {
            Some(TokenKind::Number(offset)) if *offset >= 0 && offset % 8 == 0 => {
                Ok(Item::Slot(SpillSlot((offset / 8) as u32)))
            }
            _ => {
                self.position = self.position.saturating_sub(1);
                self.error("stack offsets must be non-negative multiples of 8")
            }
        }
    }

    fn call(&mut self, function: &mut Function) -> Result<CallExpr> {
        self.expect_word("call")?;
        let (callee, runtime) = match self.advance() {
            Some(TokenKind::Var(name)) => (Item::Var(function.vars.intern(name)), false),
            Some(TokenKind::Function(name)) => (Item::label(name.clone()), false),
            Some(TokenKind::Word(name)) => match self.runtime.lookup(name) {
                Some(label) => (Item::Label(label.clone()), true),
                None => {
                    self.position -= 1;
                    return self.error(format!("unknown runtime function '{}'", name));
                }
            },
            _ => {
                self.position = self.position.saturating_sub(1);
                return self.error(format!("expected a callee, found {}", self.describe()));
            }
        };
        let args = self.arguments(function)?;
        Ok(CallExpr {
            runtime,
            callee,
            args,
        })
    }

    fn arguments(&mut self, function: &mut Function) -> Result<Vec<Item>> {
        self.expect(TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&TokenKind::RightParen) {
            loop {
                args.push(self.operand(function)?);
                if self.peek() == Some(&TokenKind::Comma) {
                    self.position += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;
        Ok(args)
    }

    fn operand(&mut self, function: &mut Function) -> Result<Item> {
        match self.advance() {
            Some(TokenKind::Var(name)) => Ok(Item::Var(function.vars.intern(name))),
            Some(TokenKind::Number(n)) => Ok(Item::Constant(*n)),
            Some(TokenKind::Label(name)) | Some(TokenKind::Function(name)) => {
                Ok(Item::label(name.clone()))
            }
            _ => {
                self.position = self.position.saturating_sub(1);
                self.error(format!("expected an operand, found {}", self.describe()))
            }
        }
    }
}
