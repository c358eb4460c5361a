use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    Add = 0x01,
    Sub = 0x02,
    And = 0x03,
    Or = 0x04,
    Xor = 0x05,
    Sll = 0x06,
    Srl = 0x07,
    Slt = 0x08,
    Sltu = 0x09,
    Addi = 0x0A,
    Andi = 0x0B,
    Ori = 0x0C,
    Xori = 0x0D,
    Li = 0x0E,
    Slli = 0x0F,
    Srli = 0x10,
    Load = 0x11,
    Store = 0x12,
    Jal = 0x13,
    Jalr = 0x14,
    Beq = 0x15,
    Bne = 0x16,
    Blt = 0x17,
    Bge = 0x18,
    Brk = 0x19,
    Mul = 0x1A,
    Div = 0x1B,
    Mod = 0x1C,
    Muli = 0x1D,
    Divi = 0x1E,
    Modi = 0x1F,
}

impl Opcode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NOP" => Some(Opcode::Nop),
            "ADD" => Some(Opcode::Add),
            "SUB" => Some(Opcode::Sub),
            "AND" => Some(Opcode::And),
            "OR" => Some(Opcode::Or),
            "XOR" => Some(Opcode::Xor),
            "SLL" => Some(Opcode::Sll),
            "SRL" => Some(Opcode::Srl),
            "SLT" => Some(Opcode::Slt),
            "SLTU" => Some(Opcode::Sltu),
            "ADDI" => Some(Opcode::Addi),
            "ANDI" => Some(Opcode::Andi),
            "ORI" => Some(Opcode::Ori),
            "XORI" => Some(Opcode::Xori),
            "LI" => Some(Opcode::Li),
            "SLLI" => Some(Opcode::Slli),
            "SRLI" => Some(Opcode::Srli),
            "LOAD" => Some(Opcode::Load),
            "STORE" => Some(Opcode::Store),
            "JAL" => Some(Opcode::Jal),
            "JALR" => Some(Opcode::Jalr),
            "BEQ" => Some(Opcode::Beq),
            "BNE" => Some(Opcode::Bne),
            "BLT" => Some(Opcode::Blt),
            "BGE" => Some(Opcode::Bge),
            "BRK" => Some(Opcode::Brk),
            "MUL" => Some(Opcode::Mul),
            "DIV" => Some(Opcode::Div),
            "MOD" => Some(Opcode::Mod),
            "MULI" => Some(Opcode::Muli),
            "DIVI" => Some(Opcode::Divi),
            "MODI" => Some(Opcode::Modi),
            _ => None,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Nop),
            0x01 => Some(Opcode::Add),
            0x02 => Some(Opcode::Sub),
            0x03 => Some(Opcode::And),
            0x04 => Some(Opcode::Or),
            0x05 => Some(Opcode::Xor),
            0x06 => Some(Opcode::Sll),
            0x07 => Some(Opcode::Srl),
            0x08 => Some(Opcode::Slt),
            0x09 => Some(Opcode::Sltu),
            0x0A => Some(Opcode::Addi),
            0x0B => Some(Opcode::Andi),
            0x0C => Some(Opcode::Ori),
            0x0D => Some(Opcode::Xori),
            0x0E => Some(Opcode::Li),
            0x0F => Some(Opcode::Slli),
            0x10 => Some(Opcode::Srli),
            0x11 => Some(Opcode::Load),
            0x12 => Some(Opcode::Store),
            0x13 => Some(Opcode::Jal),
            0x14 => Some(Opcode::Jalr),
            0x15 => Some(Opcode::Beq),
            0x16 => Some(Opcode::Bne),
            0x17 => Some(Opcode::Blt),
            0x18 => Some(Opcode::Bge),
            0x19 => Some(Opcode::Brk),
            0x1A => Some(Opcode::Mul),
            0x1B => Some(Opcode::Div),
            0x1C => Some(Opcode::Mod),
            0x1D => Some(Opcode::Muli),
            0x1E => Some(Opcode::Divi),
            0x1F => Some(Opcode::Modi),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Sll => "SLL",
            Opcode::Srl => "SRL",
            Opcode::Slt => "SLT",
            Opcode::Sltu => "SLTU",
            Opcode::Addi => "ADDI",
            Opcode::Andi => "ANDI",
            Opcode::Ori => "ORI",
            Opcode::Xori => "XORI",
            Opcode::Li => "LI",
            Opcode::Slli => "SLLI",
            Opcode::Srli => "SRLI",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Jal => "JAL",
            Opcode::Jalr => "JALR",
            Opcode::Beq => "BEQ",
            Opcode::Bne => "BNE",
            Opcode::Blt => "BLT",
            Opcode::Bge => "BGE",
            Opcode::Brk => "BRK",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Muli => "MULI",
            Opcode::Divi => "DIVI",
            Opcode::Modi => "MODI",
        }
    }

    pub fn all() -> Vec<&'static str> {
        vec![
            "NOP", "ADD", "SUB", "AND", "OR", "XOR", "SLL", "SRL", "SLT", "SLTU",
            "ADDI", "ANDI", "ORI", "XORI", "LI", "SLLI", "SRLI", "LOAD", "STORE",
            "JAL", "JALR", "BEQ", "BNE", "BLT", "BGE", "BRK", "MUL", "DIV", "MOD",
            "MULI", "DIVI", "MODI"
        ]
    }

    pub fn format(&self) -> InstructionFormat {
        match self {
            Opcode::Nop | Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Or | 
            Opcode::Xor | Opcode::Sll | Opcode::Srl | Opcode::Slt | Opcode::Sltu | 
            Opcode::Jalr | Opcode::Brk | Opcode::Mul | Opcode::Div | Opcode::Mod => InstructionFormat::R,
            
            Opcode::Addi | Opcode::Andi | Opcode::Ori | Opcode::Xori | 
            Opcode::Slli | Opcode::Srli | Opcode::Load | Opcode::Store | 
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bge | 
            Opcode::Jal | Opcode::Muli | Opcode::Divi | Opcode::Modi => InstructionFormat::I,
            
            Opcode::Li => InstructionFormat::I1,
        }
    }
}

/// The 32 fixed-role registers of the Ripple ISA.
///
/// Roles, not general-purpose numbering: `T0..T7` and `S0..S3` are the only
/// registers the register manager is allowed to allocate (see
/// `rcc-codegen::abi::CallingConvention::ALLOCATABLE` and
/// `rcc-codegen::regalloc`). Everything else here is a reserved role fixed
/// by the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    R0 = 0,
    Pc = 1,
    Pcb = 2,
    Ra = 3,
    Rab = 4,
    Rv0 = 5,
    Rv1 = 6,
    A0 = 7,
    A1 = 8,
    A2 = 9,
    A3 = 10,
    T0 = 11,
    T1 = 12,
    T2 = 13,
    T3 = 14,
    T4 = 15,
    T5 = 16,
    T6 = 17,
    T7 = 18,
    S0 = 19,
    S1 = 20,
    S2 = 21,
    S3 = 22,
    Sc = 23,
    Sb = 24,
    Sp = 25,
    Fp = 26,
    Gp = 27,
    Res0 = 28,
    Res1 = 29,
    Res2 = 30,
    Res3 = 31,
}

impl Register {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Register::R0),
            1 => Some(Register::Pc),
            2 => Some(Register::Pcb),
            3 => Some(Register::Ra),
            4 => Some(Register::Rab),
            5 => Some(Register::Rv0),
            6 => Some(Register::Rv1),
            7 => Some(Register::A0),
            8 => Some(Register::A1),
            9 => Some(Register::A2),
            10 => Some(Register::A3),
            11 => Some(Register::T0),
            12 => Some(Register::T1),
            13 => Some(Register::T2),
            14 => Some(Register::T3),
            15 => Some(Register::T4),
            16 => Some(Register::T5),
            17 => Some(Register::T6),
            18 => Some(Register::T7),
            19 => Some(Register::S0),
            20 => Some(Register::S1),
            21 => Some(Register::S2),
            22 => Some(Register::S3),
            23 => Some(Register::Sc),
            24 => Some(Register::Sb),
            25 => Some(Register::Sp),
            26 => Some(Register::Fp),
            27 => Some(Register::Gp),
            28 => Some(Register::Res0),
            29 => Some(Register::Res1),
            30 => Some(Register::Res2),
            31 => Some(Register::Res3),
            _ => None,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "R0" => Some(Register::R0),
            "PC" => Some(Register::Pc),
            "PCB" => Some(Register::Pcb),
            "RA" => Some(Register::Ra),
            "RAB" => Some(Register::Rab),
            "RV0" => Some(Register::Rv0),
            "RV1" => Some(Register::Rv1),
            "A0" => Some(Register::A0),
            "A1" => Some(Register::A1),
            "A2" => Some(Register::A2),
            "A3" => Some(Register::A3),
            "T0" => Some(Register::T0),
            "T1" => Some(Register::T1),
            "T2" => Some(Register::T2),
            "T3" => Some(Register::T3),
            "T4" => Some(Register::T4),
            "T5" => Some(Register::T5),
            "T6" => Some(Register::T6),
            "T7" => Some(Register::T7),
            "S0" => Some(Register::S0),
            "S1" => Some(Register::S1),
            "S2" => Some(Register::S2),
            "S3" => Some(Register::S3),
            "SC" => Some(Register::Sc),
            "SB" => Some(Register::Sb),
            "SP" => Some(Register::Sp),
            "FP" => Some(Register::Fp),
            "GP" => Some(Register::Gp),
            "RES0" => Some(Register::Res0),
            "RES1" => Some(Register::Res1),
            "RES2" => Some(Register::Res2),
            "RES3" => Some(Register::Res3),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Register::R0 => "R0",
            Register::Pc => "PC",
            Register::Pcb => "PCB",
            Register::Ra => "RA",
            Register::Rab => "RAB",
            Register::Rv0 => "RV0",
            Register::Rv1 => "RV1",
            Register::A0 => "A0",
            Register::A1 => "A1",
            Register::A2 => "A2",
            Register::A3 => "A3",
            Register::T0 => "T0",
            Register::T1 => "T1",
            Register::T2 => "T2",
            Register::T3 => "T3",
            Register::T4 => "T4",
            Register::T5 => "T5",
            Register::T6 => "T6",
            Register::T7 => "T7",
            Register::S0 => "S0",
            Register::S1 => "S1",
            Register::S2 => "S2",
            Register::S3 => "S3",
            Register::Sc => "SC",
            Register::Sb => "SB",
            Register::Sp => "SP",
            Register::Fp => "FP",
            Register::Gp => "GP",
            Register::Res0 => "RES0",
            Register::Res1 => "RES1",
            Register::Res2 => "RES2",
            Register::Res3 => "RES3",
        }
    }

    pub fn to_macro_str(&self) -> String {
        format!("@{}", self.to_str())
    }

    pub fn all() -> Vec<&'static str> {
        vec![
            "R0", "PC", "PCB", "RA", "RAB", "RV0", "RV1",
            "A0", "A1", "A2", "A3",
            "T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7",
            "S0", "S1", "S2", "S3",
            "SC", "SB", "SP", "FP", "GP",
            "RES0", "RES1", "RES2", "RES3",
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFormat {
    R,  // Register format
    I,  // Immediate format
    I1, // Special immediate format for LI
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: u8,
    pub word0: u8,
    pub word1: u16,
    pub word2: u16,
    pub word3: u16,
}

impl Instruction {
    pub fn new(opcode: Opcode, word1: u16, word2: u16, word3: u16) -> Self {
        Self {
            opcode: opcode as u8,
            word0: opcode as u8,
            word1,
            word2,
            word3,
        }
    }

    pub fn is_halt(&self) -> bool {
        self.opcode == Opcode::Nop as u8 && 
        self.word1 == 0 && 
        self.word2 == 0 && 
        self.word3 == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub bank: u16,
    pub offset: u16,
    pub absolute_address: u32,
}

#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operands: Vec<String>,
    pub directive: Option<String>,
    pub directive_args: Vec<String>,
    pub line_number: usize,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Code,
    Data,
}

#[derive(Debug)]
pub struct AssemblerOptions {
    pub case_insensitive: bool,
    pub start_bank: u16,
    pub bank_size: u16,
    pub max_immediate: u32,
    pub data_offset: u16,  // Offset to add to all memory addresses (default 2 for VM special values)
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            start_bank: 0,
            bank_size: DEFAULT_BANK_SIZE,
            max_immediate: DEFAULT_MAX_IMMEDIATE,
            data_offset: 2,  // Default to 2 to account for VM special values
        }
    }
}

/// Cells per bank. The architecture fixes a bank at 4096 instructions; since
/// each instruction is 4 cells wide, that is also the span GEP lowering uses
/// when computing bank overflow for data addresses.
pub const DEFAULT_BANK_SIZE: u16 = 4096;
pub const INSTRUCTION_SIZE: u16 = 4;
pub const DEFAULT_MAX_IMMEDIATE: u32 = 65535;

#[derive(Debug)]
pub struct AssemblerState {
    pub current_bank: u16,
    pub current_offset: u16,
    pub labels: HashMap<String, Label>,
    pub data_labels: HashMap<String, u32>,
    pub pending_references: HashMap<usize, PendingReference>,
    pub instructions: Vec<Instruction>,
    pub memory_data: Vec<u8>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PendingReference {
    pub label: String,
    pub ref_type: ReferenceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    Branch,
    Absolute,
    Data,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFile {
    pub version: u32,
    pub instructions: Vec<Instruction>,
    pub data: Vec<u8>,
    pub labels: HashMap<String, Label>,
    pub data_labels: HashMap<String, u32>,
    pub unresolved_references: HashMap<usize, UnresolvedReference>,
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub label: String,
    pub ref_type: String, // "branch", "absolute", "data"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub version: u32,
    pub objects: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,  // Original filename or module name
    pub object: ObjectFile,
}

// Virtual instruction definitions for extensibility
pub trait VirtualInstruction {
    fn name(&self) -> &str;
    fn expand(&self, operands: &[String]) -> Result<Vec<ParsedLine>, String>;
}