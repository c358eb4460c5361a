//! Final assembly-text emission.
//!
//! Turns the flat `Vec<AsmInst>` produced by `lowering::lower_module` into
//! the textual Ripple assembly `rcc_asm::RippleAssembler` parses. Labels
//! and raw directives are emitted flush-left; every other instruction gets
//! a single leading tab.

use crate::asm::AsmInst;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("empty program: no instructions to emit")]
    EmptyProgram,
}

/// Render a flat instruction stream to assembly text, one instruction per
/// line.
pub fn emit_instructions(instructions: Vec<AsmInst>) -> Result<String, CodegenError> {
    let mut out = String::new();
    for inst in &instructions {
        match inst {
            AsmInst::Label(_) | AsmInst::Raw(_) => out.push_str(&inst.to_string()),
            _ => {
                out.push('\t');
                out.push_str(&inst.to_string());
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Emit a complete, directly-assemblable program: the module's code and
/// data sections, with an entry trampoline inserted right after the
/// `.code` directive when the module defines `main`. `RippleAssembler`
/// resolves its entry point from a `start` label, so the trampoline calls
/// `main` and halts on return.
pub fn emit_complete_program(instructions: Vec<AsmInst>, has_main: bool) -> Result<String, CodegenError> {
    if instructions.is_empty() {
        return Err(CodegenError::EmptyProgram);
    }

    if !has_main {
        return emit_instructions(instructions);
    }

    let mut out = Vec::with_capacity(instructions.len() + 3);
    let mut inserted = false;
    for inst in instructions {
        let is_code_directive = matches!(&inst, AsmInst::Raw(s) if s == ".code");
        out.push(inst);
        if is_code_directive && !inserted {
            out.push(AsmInst::Label("start".to_string()));
            out.push(AsmInst::Call("main".to_string()));
            out.push(AsmInst::Halt);
            inserted = true;
        }
    }
    emit_instructions(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Reg;

    #[test]
    fn labels_and_raw_directives_are_flush_left() {
        let text = emit_instructions(vec![
            AsmInst::Raw(".code".to_string()),
            AsmInst::Label("main".to_string()),
            AsmInst::LI(Reg::T0, 1),
        ])
        .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ".code");
        assert_eq!(lines[1], "main:");
        assert_eq!(lines[2], "\tLI T0, 1");
    }

    #[test]
    fn empty_program_is_an_error() {
        assert!(matches!(emit_complete_program(vec![], true), Err(CodegenError::EmptyProgram)));
    }

    #[test]
    fn entry_trampoline_inserted_after_code_directive_when_has_main() {
        let instructions = vec![
            AsmInst::Raw(".code".to_string()),
            AsmInst::Label("main".to_string()),
            AsmInst::Halt,
        ];
        let text = emit_complete_program(instructions, true).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ".code");
        assert_eq!(lines[1], "start:");
        assert_eq!(lines[2], "\tCALL main");
        assert_eq!(lines[3], "\tHALT");
    }

    #[test]
    fn no_trampoline_without_main() {
        let instructions = vec![AsmInst::Raw(".code".to_string()), AsmInst::Label("helper".to_string())];
        let text = emit_complete_program(instructions, false).unwrap();
        assert!(!text.contains("start:"));
    }
}
