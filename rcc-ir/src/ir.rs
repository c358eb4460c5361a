//! Intermediate representation for the C99-to-Ripple compiler.
//!
//! This is the contract between the (out-of-scope) frontend and the
//! backend: a three-address IR, grouped into basic blocks per function,
//! with pointer arithmetic routed exclusively through `GetElementPtr`.

use rcc_common::{BankInfo, LabelId, SourceLocation, SymbolId, TempId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// IR Value - represents operands in IR instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Temporary variable.
    Temp(TempId),

    /// Constant integer (16-bit on this machine; stored wider for convenience).
    Constant(i64),

    /// Constant array initializer (used for string literals and aggregate globals).
    ConstantArray(Vec<i64>),

    /// Global symbol reference.
    Global(String),

    /// Function reference.
    Function(String),

    /// Fat-pointer literal: (address, bank), both resolved at compile time.
    FatPtr(Box<Value>, Box<Value>),

    /// Undefined value (for uninitialized variables).
    Undef,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(id) => write!(f, "%{id}"),
            Value::Constant(val) => write!(f, "{val}"),
            Value::ConstantArray(vals) => write!(f, "{vals:?}"),
            Value::Global(name) => write!(f, "@{name}"),
            Value::Function(name) => write!(f, "@{name}"),
            Value::FatPtr(addr, bank) => write!(f, "fatptr({addr}, {bank})"),
            Value::Undef => write!(f, "undef"),
        }
    }
}

/// IR type system. Every scalar is at most 16 bits wide at runtime; wider
/// C types are represented here for the frontend's benefit but the
/// backend only ever materializes `I16` words and pointer pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrType {
    Void,
    I1,
    I8,
    I16,
    I32,
    Ptr(Box<IrType>),
    Array {
        size: u64,
        element_type: Box<IrType>,
    },
    Function {
        return_type: Box<IrType>,
        param_types: Vec<IrType>,
        is_vararg: bool,
    },
    Struct {
        name: Option<String>,
        fields: Vec<IrType>,
        packed: bool,
    },
    Label,
}

impl IrType {
    /// Size in 16-bit machine words (not bytes) - the unit GEP offsets are expressed in.
    pub fn size_in_words(&self) -> Option<u64> {
        match self {
            IrType::Void => None,
            IrType::I1 | IrType::I8 | IrType::I16 => Some(1),
            IrType::I32 => Some(2),
            IrType::Ptr(_) => Some(2), // fat pointer: addr + bank
            IrType::Array { size, element_type } => {
                element_type.size_in_words().map(|w| w * size)
            }
            IrType::Function { .. } => None,
            IrType::Struct { fields, .. } => {
                let mut total = 0;
                for field in fields {
                    total += field.size_in_words()?;
                }
                Some(total)
            }
            IrType::Label => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::I1 | IrType::I8 | IrType::I16 | IrType::I32)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn element_type(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(elem) => Some(elem),
            IrType::Array { element_type, .. } => Some(element_type),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::Ptr(target) => write!(f, "{target}*"),
            IrType::Array { size, element_type } => write!(f, "[{size} x {element_type}]"),
            IrType::Function { return_type, param_types, is_vararg } => {
                write!(f, "{return_type} (")?;
                for (i, param) in param_types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if *is_vararg {
                    write!(f, ", ...")?;
                }
                write!(f, ")")
            }
            IrType::Struct { name: Some(name), .. } => write!(f, "%{name}"),
            IrType::Struct { name: None, .. } => write!(f, "%struct"),
            IrType::Label => write!(f, "label"),
        }
    }
}

/// Binary operations in IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrBinaryOp {
    Add, Sub, Mul,
    SDiv, UDiv,
    SRem, URem,
    And, Or, Xor,
    Shl, LShr, AShr,
    Eq, Ne,
    Slt, Sle, Sgt, Sge,
    Ult, Ule, Ugt, Uge,
}

impl fmt::Display for IrBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            IrBinaryOp::Add => "add",
            IrBinaryOp::Sub => "sub",
            IrBinaryOp::Mul => "mul",
            IrBinaryOp::SDiv => "sdiv",
            IrBinaryOp::UDiv => "udiv",
            IrBinaryOp::SRem => "srem",
            IrBinaryOp::URem => "urem",
            IrBinaryOp::And => "and",
            IrBinaryOp::Or => "or",
            IrBinaryOp::Xor => "xor",
            IrBinaryOp::Shl => "shl",
            IrBinaryOp::LShr => "lshr",
            IrBinaryOp::AShr => "ashr",
            IrBinaryOp::Eq => "eq",
            IrBinaryOp::Ne => "ne",
            IrBinaryOp::Slt => "slt",
            IrBinaryOp::Sle => "sle",
            IrBinaryOp::Sgt => "sgt",
            IrBinaryOp::Sge => "sge",
            IrBinaryOp::Ult => "ult",
            IrBinaryOp::Ule => "ule",
            IrBinaryOp::Ugt => "ugt",
            IrBinaryOp::Uge => "uge",
        };
        write!(f, "{op_str}")
    }
}

impl IrBinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            IrBinaryOp::Eq
                | IrBinaryOp::Ne
                | IrBinaryOp::Slt
                | IrBinaryOp::Sle
                | IrBinaryOp::Sgt
                | IrBinaryOp::Sge
                | IrBinaryOp::Ult
                | IrBinaryOp::Ule
                | IrBinaryOp::Ugt
                | IrBinaryOp::Uge
        )
    }
}

/// Unary operations in IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrUnaryOp {
    Not,
    Neg,
    ZExt,
    SExt,
    Trunc,
    PtrToInt,
    IntToPtr,
}

impl fmt::Display for IrUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            IrUnaryOp::Not => "not",
            IrUnaryOp::Neg => "neg",
            IrUnaryOp::ZExt => "zext",
            IrUnaryOp::SExt => "sext",
            IrUnaryOp::Trunc => "trunc",
            IrUnaryOp::PtrToInt => "ptrtoint",
            IrUnaryOp::IntToPtr => "inttoptr",
        };
        write!(f, "{op_str}")
    }
}

/// IR Instruction. Tagged sum, matched per-stage; no dynamic dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Binary {
        result: TempId,
        op: IrBinaryOp,
        lhs: Value,
        rhs: Value,
        result_type: IrType,
    },
    Unary {
        result: TempId,
        op: IrUnaryOp,
        operand: Value,
        result_type: IrType,
    },
    Load {
        result: TempId,
        ptr: Value,
        result_type: IrType,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    /// `result = getelementptr ptr, indices, elem_size` - the sole pointer
    /// arithmetic op. `elem_size` is in machine words: for array indexing
    /// it is the element's word size, for struct field access it is 1
    /// (the index is already the word offset).
    GetElementPtr {
        result: TempId,
        ptr: Value,
        indices: Vec<Value>,
        elem_size: u16,
        result_type: IrType,
    },
    Alloca {
        result: TempId,
        alloc_type: IrType,
        count: Option<Value>,
        result_type: IrType,
    },
    Call {
        result: Option<TempId>,
        function: Value,
        args: Vec<Value>,
        result_type: IrType,
    },
    Return(Option<Value>),
    Branch(LabelId),
    BranchCond {
        condition: Value,
        true_label: LabelId,
        false_label: LabelId,
    },
    Phi {
        result: TempId,
        incoming: Vec<(Value, LabelId)>,
        result_type: IrType,
    },
    Cast {
        result: TempId,
        value: Value,
        target_type: IrType,
    },
    Select {
        result: TempId,
        condition: Value,
        true_value: Value,
        false_value: Value,
        result_type: IrType,
    },
    Intrinsic {
        result: Option<TempId>,
        intrinsic: String,
        args: Vec<Value>,
        result_type: IrType,
    },
    DebugLoc {
        location: SourceLocation,
    },
    InlineAsm {
        assembly: String,
    },
    Comment(String),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary { result, op, lhs, rhs, result_type } => {
                write!(f, "%{result} = {op} {result_type} {lhs}, {rhs}")
            }
            Instruction::Unary { result, op, operand, result_type } => {
                write!(f, "%{result} = {op} {result_type} {operand}")
            }
            Instruction::Load { result, ptr, result_type } => {
                write!(f, "%{result} = load {result_type}, {ptr}")
            }
            Instruction::Store { value, ptr } => {
                write!(f, "store {value}, {ptr}")
            }
            Instruction::GetElementPtr { result, ptr, indices, elem_size, .. } => {
                write!(f, "%{result} = getelementptr {ptr}, elem_size={elem_size}")?;
                for index in indices {
                    write!(f, ", {index}")?;
                }
                Ok(())
            }
            Instruction::Alloca { result, alloc_type, count, .. } => {
                write!(f, "%{result} = alloca {alloc_type}")?;
                if let Some(count) = count {
                    write!(f, ", {count}")?;
                }
                Ok(())
            }
            Instruction::Call { result, function, args, .. } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "call {function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Instruction::Return(Some(value)) => write!(f, "ret {value}"),
            Instruction::Return(None) => write!(f, "ret void"),
            Instruction::Branch(label) => write!(f, "br label %{label}"),
            Instruction::BranchCond { condition, true_label, false_label } => {
                write!(f, "br {condition}, label %{true_label}, label %{false_label}")
            }
            Instruction::Phi { result, incoming, result_type } => {
                write!(f, "%{result} = phi {result_type} ")?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{value}, %{label}]")?;
                }
                Ok(())
            }
            Instruction::Cast { result, value, target_type } => {
                write!(f, "%{result} = cast {value} to {target_type}")
            }
            Instruction::Select { result, condition, true_value, false_value, result_type } => {
                write!(
                    f,
                    "%{result} = select {result_type} {condition}, {true_value}, {false_value}"
                )
            }
            Instruction::Intrinsic { result, intrinsic, args, .. } => {
                if let Some(result) = result {
                    write!(f, "%{result} = ")?;
                }
                write!(f, "call @{intrinsic}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Instruction::DebugLoc { location } => write!(f, "!dbg !{}", location.line),
            Instruction::InlineAsm { assembly } => write!(f, "asm \"{assembly}\""),
            Instruction::Comment(text) => write!(f, "; {text}"),
        }
    }
}

/// Basic Block - ordered instructions, single entry, ending in a terminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: LabelId,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<LabelId>,
    pub successors: Vec<LabelId>,
}

impl BasicBlock {
    pub fn new(id: LabelId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn add_instruction(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn has_terminator(&self) -> bool {
        self.instructions.last().is_some_and(|instr| {
            matches!(
                instr,
                Instruction::Return(_) | Instruction::Branch(_) | Instruction::BranchCond { .. }
            )
        })
    }
}

/// Function in IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub return_type: IrType,
    pub parameters: Vec<(TempId, IrType)>,
    pub blocks: Vec<BasicBlock>,
    pub is_external: bool,
    pub is_vararg: bool,
    pub symbol_id: Option<SymbolId>,
    pub source_location: Option<SourceLocation>,
}

impl Function {
    pub fn new(name: String, return_type: IrType) -> Self {
        Self {
            name,
            return_type,
            parameters: Vec::new(),
            blocks: Vec::new(),
            is_external: false,
            is_vararg: false,
            symbol_id: None,
            source_location: None,
        }
    }

    pub fn add_parameter(&mut self, param_id: TempId, param_type: IrType) {
        self.parameters.push((param_id, param_type));
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }

    pub fn get_block(&self, id: LabelId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_block_mut(&mut self, id: LabelId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }
}

/// Global variable definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub var_type: IrType,
    pub is_constant: bool,
    pub initializer: Option<Value>,
    pub linkage: Linkage,
    pub symbol_id: Option<SymbolId>,
}

/// Linkage types for global symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    External,
    Internal,
    Private,
}

/// IR Module - a complete compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    pub type_definitions: HashMap<String, IrType>,
}

impl Module {
    pub fn new(name: String) -> Self {
        Self {
            name,
            functions: Vec::new(),
            globals: Vec::new(),
            type_definitions: HashMap::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn add_global(&mut self, global: GlobalVariable) {
        self.globals.push(global);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }
}

/// Per-temp provenance table threaded alongside IR construction. Keyed by
/// `TempId`; every pointer-typed temp must have an entry by the time it's
/// used, per the provenance invariant.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceMap {
    banks: HashMap<TempId, BankInfo>,
}

impl ProvenanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, temp: TempId, info: BankInfo) {
        self.banks.insert(temp, info);
    }

    pub fn get(&self, temp: TempId) -> Option<&BankInfo> {
        self.banks.get(&temp)
    }

    pub fn join(&mut self, temp: TempId, incoming: &[BankInfo]) -> BankInfo {
        let joined = incoming
            .iter()
            .cloned()
            .reduce(|a, b| a.join(&b))
            .unwrap_or(BankInfo::Unknown);
        self.banks.insert(temp, joined.clone());
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ir_types() {
        assert_eq!(IrType::I8.size_in_words(), Some(1));
        assert_eq!(IrType::I16.size_in_words(), Some(1));
        assert_eq!(IrType::I32.size_in_words(), Some(2));
        assert_eq!(IrType::Ptr(Box::new(IrType::I16)).size_in_words(), Some(2));

        let array_type = IrType::Array { size: 10, element_type: Box::new(IrType::I16) };
        assert_eq!(array_type.size_in_words(), Some(10));
    }

    #[test]
    fn test_ir_values() {
        let temp = Value::Temp(5);
        let constant = Value::Constant(42);
        let global = Value::Global("main".to_string());

        assert_eq!(format!("{temp}"), "%5");
        assert_eq!(format!("{constant}"), "42");
        assert_eq!(format!("{global}"), "@main");
    }

    #[test]
    fn test_basic_block_terminator() {
        let mut block = BasicBlock::new(0);
        assert!(block.is_empty());
        assert!(!block.has_terminator());

        block.add_instruction(Instruction::Comment("test".to_string()));
        assert!(!block.has_terminator());

        block.add_instruction(Instruction::Return(Some(Value::Constant(0))));
        assert!(block.has_terminator());
    }

    #[test]
    fn test_provenance_join() {
        let mut map = ProvenanceMap::new();
        let joined = map.join(0, &[BankInfo::Global, BankInfo::Stack]);
        assert_eq!(joined, BankInfo::Mixed);

        let joined2 = map.join(1, &[BankInfo::Unknown, BankInfo::Global]);
        assert_eq!(joined2, BankInfo::Global);
    }

    #[test]
    fn test_module_lookup() {
        let mut module = Module::new("test".to_string());
        module.add_function(Function::new("main".to_string(), IrType::I16));
        module.add_global(GlobalVariable {
            name: "g".to_string(),
            var_type: IrType::I16,
            is_constant: false,
            initializer: Some(Value::Constant(42)),
            linkage: Linkage::External,
            symbol_id: None,
        });

        assert!(module.get_function("main").is_some());
        assert!(module.get_global("g").is_some());
    }
}
