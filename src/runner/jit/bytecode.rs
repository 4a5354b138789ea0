//! Bytecode instruction set, chunks and compiled units.
//!
//! Instructions are stack based and mirror IL closely enough that a
//! compiled method can be rendered as an IL-style listing.

use std::rc::Rc;

use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;

/// Bytecode opcodes for the stack-based VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// No operation. Debug builds place one at every statement.
    Nop,

    // ── Constants & Literals ──────────────────────────────────
    /// Push a constant from the constant pool (operand: pool index).
    LoadConst,
    /// Push `null`.
    LoadNull,

    // ── Locals & Arguments ───────────────────────────────────
    /// Push a local slot (operand: slot).
    LoadLocal,
    /// Pop into a local slot, converting to its declared type (operand: slot).
    StoreLocal,
    /// Push an argument (operand: index).
    LoadArg,
    /// Pop into an argument, converting to its declared type (operand: index).
    StoreArg,

    // ── Stack manipulation ───────────────────────────────────
    /// Pop and discard the top of the stack.
    Pop,
    /// Duplicate the top of the stack.
    Dup,

    // ── Arithmetic ───────────────────────────────────────────
    /// Pop two values, push their sum. Operand 1 marks a compound assignment,
    /// which converts the result back to the left operand's type.
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,

    // ── Comparison ───────────────────────────────────────────
    Ceq,
    Cne,
    Clt,
    Cle,
    Cgt,
    Cge,

    // ── Unary ────────────────────────────────────────────────
    /// Arithmetic negation.
    Neg,
    /// Logical NOT on a `bool`.
    Not,
    /// Bitwise complement.
    BitNot,
    /// Unary `+` (numeric promotion).
    Plus,
    /// Add one, keeping the operand's type.
    Inc,
    /// Subtract one, keeping the operand's type.
    Dec,

    // ── Control Flow ─────────────────────────────────────────
    /// Unconditional jump (operand: target index).
    Br,
    /// Pop a `bool`, jump when true.
    BrTrue,
    /// Pop a `bool`, jump when false.
    BrFalse,
    /// Pop a value, jump when it is not null.
    BrNonNull,

    // ── Types ────────────────────────────────────────────────
    /// Pop a value, push it when it is an instance of the type, else null
    /// (operand: type index).
    IsInst,
    /// Explicit conversion (operand: type index).
    CastClass,
    /// Implicit conversion (operand: type index).
    ConvImplicit,
    /// Push a `Type` object (operand: type index).
    LoadToken,

    // ── Objects & Arrays ─────────────────────────────────────
    /// Construct an object (operand: type index, operand2: argument count).
    NewObj,
    /// Pop `rank` lengths, push a new array (operand: element type, operand2: rank).
    NewArr,
    /// Pop `count` items, push a vector of their best common type
    /// (operand: count).
    NewArrInfer,
    /// Pop member values, push an anonymous object (operand: shape index).
    NewAnon,
    /// Indexer read. Stack: [object, index_1..index_n] (operand: index count).
    LdElem,
    /// Indexer write. Stack: [object, index_1..index_n, value] (operand: index count).
    StElem,
    /// Instance member read (operand: name index).
    LdFld,
    /// Instance member write. Stack: [object, value] (operand: name index).
    StFld,
    /// Static member read (operand: type index, operand2: name index).
    LdSFld,

    // ── Calls ────────────────────────────────────────────────
    /// Call a method of this unit (operand: method index, operand2: argc).
    Call,
    /// Call a static library method (operand: type, operand2: name, operand3: argc).
    CallStatic,
    /// Call an instance method. Stack: [object, args..] (operand: name, operand2: argc).
    CallVirt,

    // ── Exceptions ───────────────────────────────────────────
    /// Pop an exception object and throw it.
    Throw,
    /// Enter a protected region; exceptions jump to the handler (operand: target).
    EnterTry,
    /// Leave the innermost protected region.
    LeaveTry,

    // ── Iteration ────────────────────────────────────────────
    /// Pop a collection, push an enumerator.
    GetIter,
    /// Pop an enumerator, push its next element or jump when exhausted
    /// (operand: target).
    IterNext,

    // ── Misc ─────────────────────────────────────────────────
    /// Return the top of the stack from the current method.
    Ret,
}

/// A single bytecode instruction with optional operands.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: OpCode,
    /// Primary operand (constant pool index, jump target, slot, etc.).
    pub operand: u32,
    pub operand2: u32,
    pub operand3: u32,
}

impl Instruction {
    pub fn simple(op: OpCode) -> Self {
        Instruction { op, operand: 0, operand2: 0, operand3: 0 }
    }

    pub fn with_operand(op: OpCode, operand: u32) -> Self {
        Instruction { op, operand, operand2: 0, operand3: 0 }
    }

    pub fn with_two_operands(op: OpCode, operand: u32, operand2: u32) -> Self {
        Instruction { op, operand, operand2, operand3: 0 }
    }

    pub fn with_three_operands(op: OpCode, operand: u32, operand2: u32, operand3: u32) -> Self {
        Instruction { op, operand, operand2, operand3 }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self.op,
            OpCode::Br
                | OpCode::BrTrue
                | OpCode::BrFalse
                | OpCode::BrNonNull
                | OpCode::EnterTry
                | OpCode::IterNext
        )
    }
}

/// Member layout of an anonymous type.
#[derive(Debug, Clone)]
pub struct AnonShape {
    pub index: usize,
    pub members: Rc<[String]>,
}

/// A local variable slot.
#[derive(Debug, Clone)]
pub struct LocalSlot {
    pub name_idx: u32,
    /// `None` for compiler temporaries and `var` locals whose type is not
    /// known statically.
    pub declared_type: Option<TypeDesc>,
}

/// A compiled method body with its pools.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
    /// Deduplicated name table for member and local names.
    pub names: Vec<String>,
    pub locals: Vec<LocalSlot>,
    pub types: Vec<TypeDesc>,
    pub shapes: Vec<AnonShape>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction and return its index.
    pub fn emit(&mut self, instr: Instruction) -> usize {
        let idx = self.code.len();
        self.code.push(instr);
        idx
    }

    pub fn emit_op(&mut self, op: OpCode) -> usize {
        self.emit(Instruction::simple(op))
    }

    pub fn emit_with(&mut self, op: OpCode, operand: u32) -> usize {
        self.emit(Instruction::with_operand(op, operand))
    }

    pub fn add_constant(&mut self, value: Value) -> u32 {
        let idx = self.constants.len();
        self.constants.push(value);
        idx as u32
    }

    pub fn add_name(&mut self, s: &str) -> u32 {
        if let Some(i) = self.names.iter().position(|n| n == s) {
            return i as u32;
        }
        self.names.push(s.to_string());
        (self.names.len() - 1) as u32
    }

    pub fn add_type(&mut self, desc: &TypeDesc) -> u32 {
        if let Some(i) = self.types.iter().position(|t| t == desc) {
            return i as u32;
        }
        self.types.push(desc.clone());
        (self.types.len() - 1) as u32
    }

    pub fn add_shape(&mut self, shape: AnonShape) -> u32 {
        self.shapes.push(shape);
        (self.shapes.len() - 1) as u32
    }

    pub fn add_local(&mut self, name: &str, declared_type: Option<TypeDesc>) -> u32 {
        let name_idx = self.add_name(name);
        self.locals.push(LocalSlot { name_idx, declared_type });
        (self.locals.len() - 1) as u32
    }

    #[inline]
    pub fn get_name(&self, idx: u32) -> &str {
        &self.names[idx as usize]
    }

    #[inline]
    pub fn get_local_name(&self, slot: u32) -> &str {
        self.get_name(self.locals[slot as usize].name_idx)
    }

    #[inline]
    pub fn get_type(&self, idx: u32) -> &TypeDesc {
        &self.types[idx as usize]
    }

    /// Patch a jump instruction's operand to point to the current code position.
    pub fn patch_jump(&mut self, jump_idx: usize) {
        self.code[jump_idx].operand = self.code.len() as u32;
    }

    pub fn current_pos(&self) -> usize {
        self.code.len()
    }

    /// Deepest evaluation stack the code can reach.
    pub fn max_stack(&self) -> usize {
        let mut depth: i64 = 0;
        let mut max: i64 = 0;
        for instr in &self.code {
            depth += self.stack_effect(instr);
            if depth < 0 {
                depth = 0;
            }
            max = max.max(depth);
        }
        max.max(1) as usize
    }

    fn stack_effect(&self, instr: &Instruction) -> i64 {
        let n = instr.operand as i64;
        match instr.op {
            OpCode::LoadConst
            | OpCode::LoadNull
            | OpCode::LoadLocal
            | OpCode::LoadArg
            | OpCode::Dup
            | OpCode::LoadToken
            | OpCode::LdSFld => 1,
            OpCode::StoreLocal
            | OpCode::StoreArg
            | OpCode::Pop
            | OpCode::BrTrue
            | OpCode::BrFalse
            | OpCode::BrNonNull
            | OpCode::Throw
            | OpCode::Ret => -1,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::Ceq
            | OpCode::Cne
            | OpCode::Clt
            | OpCode::Cle
            | OpCode::Cgt
            | OpCode::Cge => -1,
            OpCode::NewObj => 1 - instr.operand2 as i64,
            OpCode::NewArr => 1 - instr.operand2 as i64,
            OpCode::NewArrInfer => 1 - n,
            OpCode::NewAnon => 1 - self.shapes[instr.operand as usize].members.len() as i64,
            OpCode::LdElem => -n,
            OpCode::StElem => -(n + 2),
            OpCode::StFld => -2,
            OpCode::Call => 1 - instr.operand2 as i64,
            OpCode::CallStatic => 1 - instr.operand3 as i64,
            OpCode::CallVirt => -(instr.operand2 as i64),
            OpCode::EnterTry => 0,
            _ => 0,
        }
    }

    /// IL-style offsets: each instruction takes one opcode byte plus its
    /// operand bytes.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.code.len() + 1);
        let mut pos = 0;
        for instr in &self.code {
            offsets.push(pos);
            pos += self.encoded_size(instr);
        }
        offsets.push(pos);
        offsets
    }

    fn encoded_size(&self, instr: &Instruction) -> usize {
        match instr.op {
            OpCode::LoadConst => match &self.constants[instr.operand as usize] {
                Value::Long(_) | Value::ULong(_) | Value::Double(_) => 9,
                Value::Bool(_) => 1,
                Value::Decimal(_) | Value::Int128(_) | Value::UInt128(_) => 17,
                _ => 5,
            },
            OpCode::LoadLocal | OpCode::StoreLocal | OpCode::LoadArg | OpCode::StoreArg => {
                if instr.operand < 4 {
                    1
                } else {
                    2
                }
            }
            OpCode::Nop
            | OpCode::LoadNull
            | OpCode::Pop
            | OpCode::Dup
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::Neg
            | OpCode::Not
            | OpCode::BitNot
            | OpCode::Plus
            | OpCode::Inc
            | OpCode::Dec
            | OpCode::Throw
            | OpCode::LeaveTry
            | OpCode::Ret => 1,
            OpCode::Ceq | OpCode::Cne | OpCode::Clt | OpCode::Cle | OpCode::Cgt | OpCode::Cge => 2,
            OpCode::CastClass | OpCode::ConvImplicit => {
                match conversion_mnemonic(self.get_type(instr.operand)) {
                    Some(_) => 1,
                    None => 5,
                }
            }
            _ => 5,
        }
    }

    fn mnemonic(&self, instr: &Instruction, offsets: &[usize], method_names: &[String]) -> String {
        let label = |target: u32| format!("IL_{:04x}", offsets[target as usize]);
        let slot = |prefix: &str, n: u32, name: &str| {
            if n < 4 {
                format!("{}.{}", prefix, n)
            } else {
                format!("{}.s {}", prefix, name)
            }
        };
        match instr.op {
            OpCode::Nop => "nop".to_string(),
            OpCode::LoadConst => match &self.constants[instr.operand as usize] {
                Value::String(s) => format!("ldstr \"{}\"", escape(s)),
                Value::Bool(true) => "ldc.i4.1".to_string(),
                Value::Bool(false) => "ldc.i4.0".to_string(),
                Value::Char(c) => format!("ldc.i4 {}", *c as u32),
                Value::Int(v) => format!("ldc.i4 {}", v),
                Value::UInt(v) => format!("ldc.i4 {}", *v as i32),
                Value::Long(v) => format!("ldc.i8 {}", v),
                Value::ULong(v) => format!("ldc.i8 {}", *v as i64),
                Value::Float(v) => format!("ldc.r4 {}", v),
                Value::Double(v) => format!("ldc.r8 {}", v),
                Value::Decimal(d) => format!("ldc.dec {}", d),
                other => format!("ldc {}", other),
            },
            OpCode::LoadNull => "ldnull".to_string(),
            OpCode::LoadLocal => slot("ldloc", instr.operand, self.get_local_name(instr.operand)),
            OpCode::StoreLocal => slot("stloc", instr.operand, self.get_local_name(instr.operand)),
            OpCode::LoadArg if instr.operand < 4 => format!("ldarg.{}", instr.operand),
            OpCode::LoadArg => format!("ldarg.s {}", instr.operand),
            OpCode::StoreArg => format!("starg.s {}", instr.operand),
            OpCode::Pop => "pop".to_string(),
            OpCode::Dup => "dup".to_string(),
            OpCode::Add => "add".to_string(),
            OpCode::Sub => "sub".to_string(),
            OpCode::Mul => "mul".to_string(),
            OpCode::Div => "div".to_string(),
            OpCode::Rem => "rem".to_string(),
            OpCode::Shl => "shl".to_string(),
            OpCode::Shr => "shr".to_string(),
            OpCode::BitAnd => "and".to_string(),
            OpCode::BitOr => "or".to_string(),
            OpCode::BitXor => "xor".to_string(),
            OpCode::Ceq => "ceq".to_string(),
            OpCode::Cne => "cne".to_string(),
            OpCode::Clt => "clt".to_string(),
            OpCode::Cle => "cle".to_string(),
            OpCode::Cgt => "cgt".to_string(),
            OpCode::Cge => "cge".to_string(),
            OpCode::Neg => "neg".to_string(),
            OpCode::Not => "lnot".to_string(),
            OpCode::BitNot => "not".to_string(),
            OpCode::Plus => "uplus".to_string(),
            OpCode::Inc => "inc".to_string(),
            OpCode::Dec => "dec".to_string(),
            OpCode::Br => format!("br {}", label(instr.operand)),
            OpCode::BrTrue => format!("brtrue {}", label(instr.operand)),
            OpCode::BrFalse => format!("brfalse {}", label(instr.operand)),
            OpCode::BrNonNull => format!("brinst {}", label(instr.operand)),
            OpCode::IsInst => format!("isinst {}", self.get_type(instr.operand)),
            OpCode::CastClass | OpCode::ConvImplicit => {
                let desc = self.get_type(instr.operand);
                match conversion_mnemonic(desc) {
                    Some(conv) => conv.to_string(),
                    None => format!("castclass {}", desc),
                }
            }
            OpCode::LoadToken => format!("ldtoken {}", self.get_type(instr.operand)),
            OpCode::NewObj => format!(
                "newobj instance void {}::.ctor/{}",
                self.get_type(instr.operand),
                instr.operand2
            ),
            OpCode::NewArr => {
                let element = self.get_type(instr.operand);
                if instr.operand2 == 1 {
                    format!("newarr {}", element)
                } else {
                    format!(
                        "newobj instance void {}::.ctor",
                        TypeDesc::array_of(element.clone(), instr.operand2 as usize)
                    )
                }
            }
            OpCode::NewArrInfer => format!("newarr var/{}", instr.operand),
            OpCode::NewAnon => {
                let shape = &self.shapes[instr.operand as usize];
                format!(
                    "newobj instance void <>f__AnonymousType{}`{}::.ctor",
                    shape.index,
                    shape.members.len()
                )
            }
            OpCode::LdElem => format!("ldelem/{}", instr.operand),
            OpCode::StElem => format!("stelem/{}", instr.operand),
            OpCode::LdFld => format!("callvirt instance get_{}", self.get_name(instr.operand)),
            OpCode::StFld => format!("callvirt instance set_{}", self.get_name(instr.operand)),
            OpCode::LdSFld => format!(
                "call {}::get_{}",
                self.get_type(instr.operand),
                self.get_name(instr.operand2)
            ),
            OpCode::Call => format!(
                "call {}/{}",
                method_names
                    .get(instr.operand as usize)
                    .map(String::as_str)
                    .unwrap_or("?"),
                instr.operand2
            ),
            OpCode::CallStatic => format!(
                "call {}::{}/{}",
                self.get_type(instr.operand),
                self.get_name(instr.operand2),
                instr.operand3
            ),
            OpCode::CallVirt => format!(
                "callvirt instance {}/{}",
                self.get_name(instr.operand),
                instr.operand2
            ),
            OpCode::Throw => "throw".to_string(),
            OpCode::EnterTry => format!(".try handler {}", label(instr.operand)),
            OpCode::LeaveTry => "leave".to_string(),
            OpCode::GetIter => "callvirt instance GetEnumerator".to_string(),
            OpCode::IterNext => format!("movenext {}", label(instr.operand)),
            OpCode::Ret => "ret".to_string(),
        }
    }

    /// Renders the instruction lines, one per instruction.
    pub fn listing(&self, method_names: &[String]) -> Vec<String> {
        let offsets = self.offsets();
        self.code
            .iter()
            .enumerate()
            .map(|(i, instr)| {
                format!(
                    "IL_{:04x}: {}",
                    offsets[i],
                    self.mnemonic(instr, &offsets, method_names)
                )
            })
            .collect()
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn conversion_mnemonic(desc: &TypeDesc) -> Option<&'static str> {
    Some(match desc.kind()? {
        TypeKind::SByte => "conv.i1",
        TypeKind::Byte => "conv.u1",
        TypeKind::Int16 => "conv.i2",
        TypeKind::UInt16 | TypeKind::Char => "conv.u2",
        TypeKind::Int32 => "conv.i4",
        TypeKind::UInt32 => "conv.u4",
        TypeKind::Int64 => "conv.i8",
        TypeKind::UInt64 => "conv.u8",
        TypeKind::Single => "conv.r4",
        TypeKind::Double => "conv.r8",
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Top-level script body.
    Script,
    /// `object Main()` of a standalone method unit.
    Main,
    /// A local function.
    Local,
    /// Implicit parameterless constructor of the synthetic type.
    Constructor,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub declared_type: TypeDesc,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub kind: MethodKind,
    pub params: Vec<Parameter>,
    pub return_type: TypeDesc,
    pub chunk: Chunk,
}

impl Method {
    pub fn new(name: impl Into<String>, kind: MethodKind, return_type: TypeDesc) -> Self {
        Method {
            name: name.into(),
            kind,
            params: Vec::new(),
            return_type,
            chunk: Chunk::new(),
        }
    }

    /// `.method` header line.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{} {}", il_type_name(&p.declared_type), p.name))
            .collect();
        let (attributes, instance) = match self.kind {
            MethodKind::Local => ("assembly hidebysig static", ""),
            MethodKind::Constructor => ("public hidebysig specialname rtspecialname", "instance "),
            _ => ("public hidebysig", "instance "),
        };
        format!(
            ".method {} {}{} {}({}) cil managed",
            attributes,
            instance,
            il_type_name(&self.return_type),
            self.name,
            params.join(", ")
        )
    }
}

/// IL spelling of a type in signatures and `.locals`.
pub fn il_type_name(desc: &TypeDesc) -> String {
    match desc {
        TypeDesc::Named(kind, args) if args.is_empty() => match kind {
            TypeKind::Boolean => "bool".to_string(),
            TypeKind::Char => "char".to_string(),
            TypeKind::SByte => "int8".to_string(),
            TypeKind::Byte => "uint8".to_string(),
            TypeKind::Int16 => "int16".to_string(),
            TypeKind::UInt16 => "uint16".to_string(),
            TypeKind::Int32 => "int32".to_string(),
            TypeKind::UInt32 => "uint32".to_string(),
            TypeKind::Int64 => "int64".to_string(),
            TypeKind::UInt64 => "uint64".to_string(),
            TypeKind::Single => "float32".to_string(),
            TypeKind::Double => "float64".to_string(),
            TypeKind::String => "string".to_string(),
            TypeKind::Object => "object".to_string(),
            TypeKind::Void => "void".to_string(),
            _ => format!("class {}", desc.full_name()),
        },
        TypeDesc::Array(element, rank) => {
            if *rank == 1 {
                format!("{}[]", il_type_name(element))
            } else {
                let dims = vec!["0..."; *rank].join(",");
                format!("{}[{}]", il_type_name(element), dims)
            }
        }
        _ => format!("class {}", desc.full_name()),
    }
}

/// The result of compiling one source: its methods in declaration order.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Unique assembly name of this compilation.
    pub name: String,
    pub methods: Vec<Method>,
    /// Index of the method execution starts at.
    pub entry: usize,
}

impl Unit {
    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }

    /// Full listing of one method: header, `.maxstack`, `.locals init`
    /// and instructions.
    pub fn disassemble_method(&self, index: usize) -> String {
        let method = &self.methods[index];
        let chunk = &method.chunk;
        let mut out = String::new();
        out.push_str(&method.signature());
        out.push('\n');
        out.push_str("{\n");
        out.push_str(&format!("  .maxstack {}\n", chunk.max_stack()));
        if !chunk.locals.is_empty() {
            out.push_str("  .locals init (\n");
            let count = chunk.locals.len();
            for (i, local) in chunk.locals.iter().enumerate() {
                let ty = local
                    .declared_type
                    .as_ref()
                    .map(il_type_name)
                    .unwrap_or_else(|| "object".to_string());
                out.push_str(&format!(
                    "    [{}] {} {}{}\n",
                    i,
                    ty,
                    chunk.get_name(local.name_idx),
                    if i + 1 < count { "," } else { "" }
                ));
            }
            out.push_str("  )\n");
        }
        for line in chunk.listing(&self.method_names()) {
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
        out.push('}');
        out
    }
}
