pub mod types;
pub mod parser;
pub mod encoder;
pub mod assembler;
pub mod linker;
pub mod virtual_instructions;

pub use types::{
    Instruction, Opcode, Register, InstructionFormat, Label, ParsedLine,
    Section, AssemblerOptions, AssemblerState, ObjectFile, UnresolvedReference,
    VirtualInstruction, DEFAULT_BANK_SIZE, INSTRUCTION_SIZE, DEFAULT_MAX_IMMEDIATE,
};

pub use parser::Parser;
pub use encoder::InstructionEncoder;
pub use assembler::RippleAssembler;
pub use linker::{Linker, LinkedProgram};
pub use virtual_instructions::{VirtualInstructionRegistry, create_custom_instruction};

// Re-export for convenience
pub fn assemble(source: &str) -> Result<ObjectFile, Vec<String>> {
    let assembler = RippleAssembler::new(AssemblerOptions::default());
    assembler.assemble(source)
}

pub fn link(object_files: Vec<ObjectFile>) -> Result<LinkedProgram, Vec<String>> {
    let linker = Linker::new(DEFAULT_BANK_SIZE);
    linker.link(object_files)
}
