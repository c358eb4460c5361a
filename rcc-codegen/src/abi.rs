//! Ripple VM ABI Implementation
//!
//! Calling convention, stack frame layout, and function prologue/epilogue
//! generation for the Ripple VM's bank-segmented memory model.
//!
//! Register usage:
//! - R0: always zero
//! - A0-A3: four-word argument/return window
//! - T0-T7, S0-S3: allocatable (see `regalloc::ALLOCATABLE_REGISTERS`)
//! - RV0/RV1: return value (scalar, or fat pointer addr/bank)
//! - SB/SP/FP: stack bank, stack pointer, frame pointer
//! - RA/RAB, PCB: return address/bank, program counter bank (cross-bank calls)

use crate::asm::{AsmInst, Reg};
use log::trace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AbiError {
    #[error("too many arguments for call: {0} words needed, frame pointer math would overflow")]
    TooManyArguments(usize),

    #[error("stack frame too large: {0} words")]
    FrameTooLarge(u16),
}

/// A single call argument, already resolved to the register(s) holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArg {
    Scalar(Reg),
    FatPointer { addr: Reg, bank: Reg },
}

impl CallArg {
    /// Number of argument-window slots this value occupies.
    pub fn width(&self) -> usize {
        match self {
            CallArg::Scalar(_) => 1,
            CallArg::FatPointer { .. } => 2,
        }
    }
}

/// Where a call is headed: a resolvable label (intra-module, most calls)
/// or a known absolute bank:addr pair (used for externs linked elsewhere).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Label(String),
    Address { bank: i16, addr: i16 },
}

/// The four-word argument window: A0, A1, A2, A3.
pub const ARG_REGS: [Reg; 4] = [Reg::A0, Reg::A1, Reg::A2, Reg::A3];

/// Where a single argument or parameter landed after placement analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPlacement {
    /// Occupies argument register(s) starting at `ARG_REGS[start]`.
    Registers { start: usize },
    /// Spilled in full to the stack below the caller's frame, at word offset
    /// `offset` from the base of the stack-spilled parameter area (offset 0
    /// is the first spilled word, growing positive toward later words).
    Stack { offset: u16 },
}

/// Calling convention: argument placement, call sequence emission, return
/// value handling, and the stack-spilled-parameter layout shared by caller
/// and callee.
///
/// A single scalar occupies one argument-window slot; a fat pointer occupies
/// two *contiguous* slots. If a value would straddle the boundary between
/// the register window and the stack (e.g. a fat pointer starting at A3), it
/// is spilled to the stack in full rather than split across register and
/// stack — never half in a register, half on the stack.
pub struct CallingConvention;

impl CallingConvention {
    pub const MAX_REG_ARGS: usize = ARG_REGS.len();

    /// Determine register/stack placement for each argument in left-to-right
    /// order, respecting the no-split-fat-pointers rule.
    pub fn analyze_arg_placement(args: &[CallArg]) -> Vec<ArgPlacement> {
        let mut placements = Vec::with_capacity(args.len());
        let mut next_reg = 0usize;
        let mut stack_offset = 0u16;

        for arg in args {
            let width = arg.width();
            if next_reg + width <= Self::MAX_REG_ARGS {
                placements.push(ArgPlacement::Registers { start: next_reg });
                next_reg += width;
            } else {
                // Once we spill one argument, all registers from here on
                // are considered consumed: the window doesn't get reused
                // out of order.
                next_reg = Self::MAX_REG_ARGS;
                placements.push(ArgPlacement::Stack { offset: stack_offset });
                stack_offset += width as u16;
            }
        }
        placements
    }

    /// Same analysis, phrased for parameter types at function entry
    /// (width 1 = scalar, width 2 = fat pointer).
    pub fn analyze_param_placement(param_widths: &[usize]) -> Vec<ArgPlacement> {
        let args: Vec<CallArg> = param_widths
            .iter()
            .map(|&w| {
                if w == 2 {
                    CallArg::FatPointer { addr: Reg::R0, bank: Reg::R0 }
                } else {
                    CallArg::Scalar(Reg::R0)
                }
            })
            .collect();
        Self::analyze_arg_placement(&args)
    }

    /// FP-relative offset of a stack-spilled parameter. The caller writes
    /// stack-spilled arguments left-to-right starting at its own SP, each
    /// word stored then SP incremented (the same empty-ascending convention
    /// the callee's prologue uses for its saved area), so word 0 lands at
    /// the lowest address and the callee's saved area — RA, FP, S0..S3, six
    /// words — is pushed directly on top of the last one. The callee's FP
    /// ends up `total_stack_words + 6` words above where word 0 was stored,
    /// so word `i` sits at `FP - total_stack_words - 6 + i`.
    pub fn stack_param_offset(stack_word_offset: u16, total_stack_words: u16) -> i16 {
        const SAVED_AREA: i16 = 6; // RA, FP, S0..S3
        stack_word_offset as i16 - total_stack_words as i16 - SAVED_AREA
    }

    /// Emit the instructions that place `args` into the argument window /
    /// stack ahead of a call. Stack-spilled arguments are written
    /// left-to-right starting at the current SP, each word stored then SP
    /// incremented — the callee's prologue picks up right where this
    /// leaves SP and keeps incrementing through its own saved area, so the
    /// first stack-spilled word ends up at the lowest address, matching
    /// `stack_param_offset`.
    pub fn setup_call_args(args: &[CallArg]) -> Vec<AsmInst> {
        let placements = Self::analyze_arg_placement(args);
        let mut code = Vec::new();

        for (arg, placement) in args.iter().zip(placements.iter()) {
            if let ArgPlacement::Registers { start } = placement {
                Self::emit_register_arg(&mut code, *arg, *start);
            }
        }

        for (arg, placement) in args.iter().zip(placements.iter()) {
            if matches!(placement, ArgPlacement::Stack { .. }) {
                match *arg {
                    CallArg::FatPointer { addr, bank } => {
                        // address at the lower word, bank immediately above
                        // it — read back address-then-bank by LOAD.
                        code.push(AsmInst::Store(addr, Reg::Sb, Reg::Sp));
                        code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
                        code.push(AsmInst::Store(bank, Reg::Sb, Reg::Sp));
                        code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
                    }
                    CallArg::Scalar(r) => {
                        code.push(AsmInst::Store(r, Reg::Sb, Reg::Sp));
                        code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
                    }
                }
            }
        }

        code
    }

    fn emit_register_arg(code: &mut Vec<AsmInst>, arg: CallArg, start: usize) {
        match arg {
            CallArg::Scalar(r) => {
                if r != ARG_REGS[start] {
                    code.push(AsmInst::Move(ARG_REGS[start], r));
                }
            }
            CallArg::FatPointer { addr, bank } => {
                if addr != ARG_REGS[start] {
                    code.push(AsmInst::Move(ARG_REGS[start], addr));
                }
                if bank != ARG_REGS[start + 1] {
                    code.push(AsmInst::Move(ARG_REGS[start + 1], bank));
                }
            }
        }
    }

    /// Emit the call itself. For a same-bank call this is just `CALL label`.
    /// For a cross-bank call, PCB is loaded before the jump; the VM restores
    /// the caller's bank from the saved RAB on return.
    pub fn emit_call(target: &CallTarget, caller_bank: i16) -> Vec<AsmInst> {
        let mut code = Vec::new();
        match target {
            CallTarget::Label(label) => {
                code.push(AsmInst::Call(label.clone()));
            }
            CallTarget::Address { bank, addr } => {
                if *bank != caller_bank {
                    trace!("cross-bank call: caller bank {caller_bank} -> target bank {bank}, loading PCB");
                    code.push(AsmInst::LI(Reg::Pcb, *bank));
                }
                code.push(AsmInst::Jal(*bank, *addr));
            }
        }
        code
    }

    /// Drop any stack-spilled arguments back off the stack after a call
    /// returns. `setup_call_args` advanced SP by `stack_words` writing them;
    /// this undoes that in one instruction.
    pub fn cleanup_stack(stack_words: u16) -> Vec<AsmInst> {
        if stack_words == 0 {
            Vec::new()
        } else {
            vec![AsmInst::SubI(Reg::Sp, Reg::Sp, stack_words as i16)]
        }
    }

    /// A complete call: spill args into place, call, and pop the stack tail.
    /// Does not itself spill caller-saved registers — the register manager
    /// must call `spill_all()` before this, since every allocatable register
    /// is considered clobbered across a call.
    pub fn make_complete_call(target: &CallTarget, args: &[CallArg], caller_bank: i16) -> Vec<AsmInst> {
        let placements = Self::analyze_arg_placement(args);
        let stack_words: u16 = args
            .iter()
            .zip(placements.iter())
            .filter(|(_, p)| matches!(p, ArgPlacement::Stack { .. }))
            .map(|(a, _)| a.width() as u16)
            .sum();

        let mut code = Self::setup_call_args(args);
        code.extend(Self::emit_call(target, caller_bank));
        code.extend(Self::cleanup_stack(stack_words));
        code
    }

    /// Where the return value lands: scalar in RV0, fat pointer addr in RV0
    /// and bank in RV1.
    pub fn return_registers(is_fat_pointer: bool) -> (Reg, Option<Reg>) {
        if is_fat_pointer {
            (Reg::Rv0, Some(Reg::Rv1))
        } else {
            (Reg::Rv0, None)
        }
    }
}

/// Stack frame layout for a single function.
///
/// The saved area — `[RA][FP][S0..S3]` — is written below FP, each word
/// stored then SP incremented; FP is set to SP only once all of it has
/// been written, so it ends up just past the saved area. Locals and spill
/// slots are reserved above that, at non-negative FP offsets:
/// `[saved RA][saved FP][saved S0..S3] FP-> [locals][spill slots]`
/// Stack-spilled call parameters live *below* the saved area, at negative
/// FP offsets computed by [`CallingConvention::stack_param_offset`].
#[derive(Debug, Clone)]
pub struct Frame {
    /// Size of local variables in 16-bit words.
    pub locals_size: u16,
    /// Callee-saved registers actually used by this function (subset of S0-S3).
    pub saved_regs: Vec<Reg>,
    /// Whether this function makes calls (always true unless it's a leaf).
    pub has_calls: bool,
}

impl Frame {
    pub fn new(locals_size: u16) -> Self {
        Self { locals_size, saved_regs: Vec::new(), has_calls: false }
    }

    pub fn set_has_calls(&mut self, has_calls: bool) {
        self.has_calls = has_calls;
    }

    pub fn add_saved_reg(&mut self, reg: Reg) {
        if !self.saved_regs.contains(&reg) {
            self.saved_regs.push(reg);
        }
    }

    /// Saved-area size in words: RA + FP + however many S-registers are used.
    pub fn saved_area_size(&self) -> u16 {
        2 + self.saved_regs.len() as u16
    }

    /// Function prologue: initialize SB, store RA/FP/used S-registers each
    /// at the current SP and increment, set FP = SP once all of them have
    /// been written, then reserve `locals_size` words for locals. Spill
    /// slots are reserved lazily by the register manager as it spills,
    /// starting at `FP + locals_size`.
    pub fn gen_prologue(&self) -> Vec<AsmInst> {
        let mut code = Vec::new();

        code.push(AsmInst::Store(Reg::Ra, Reg::Sb, Reg::Sp));
        code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
        code.push(AsmInst::Store(Reg::Fp, Reg::Sb, Reg::Sp));
        code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
        for &reg in &self.saved_regs {
            code.push(AsmInst::Store(reg, Reg::Sb, Reg::Sp));
            code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, 1));
        }

        code.push(AsmInst::Add(Reg::Fp, Reg::Sp, Reg::R0));

        if self.locals_size > 0 {
            code.push(AsmInst::AddI(Reg::Sp, Reg::Sp, self.locals_size as i16));
        }

        code
    }

    /// Function epilogue: tear down locals and any spill slots, restore
    /// saved registers in reverse order, restore FP, move the return value
    /// through RV0/RV1 unchanged, then RET (which restores PCB from RAB).
    ///
    /// `spill_slots` is how many additional words the register manager
    /// reserved beyond `locals_size`; the caller of `gen_epilogue` must pass
    /// the final count observed during code generation.
    pub fn gen_epilogue(&self, spill_slots: u16) -> Vec<AsmInst> {
        let mut code = Vec::new();

        // Collapse SP back to the saved-area boundary (FP itself), which
        // also discards locals and spill slots in one move.
        code.push(AsmInst::Add(Reg::Sp, Reg::Fp, Reg::R0));
        let _ = spill_slots; // locals+spills are entirely above SP==FP already

        for &reg in self.saved_regs.iter().rev() {
            code.push(AsmInst::SubI(Reg::Sp, Reg::Sp, 1));
            code.push(AsmInst::Load(reg, Reg::Sb, Reg::Sp));
        }
        code.push(AsmInst::SubI(Reg::Sp, Reg::Sp, 1));
        code.push(AsmInst::Load(Reg::Fp, Reg::Sb, Reg::Sp));
        code.push(AsmInst::SubI(Reg::Sp, Reg::Sp, 1));
        code.push(AsmInst::Load(Reg::Ra, Reg::Sb, Reg::Sp));
        code.push(AsmInst::Ret);

        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_args_fill_window_left_to_right() {
        let args = vec![CallArg::Scalar(Reg::T0), CallArg::Scalar(Reg::T1)];
        let placements = CallingConvention::analyze_arg_placement(&args);
        assert_eq!(placements, vec![
            ArgPlacement::Registers { start: 0 },
            ArgPlacement::Registers { start: 1 },
        ]);
    }

    #[test]
    fn fat_pointer_straddling_window_spills_whole() {
        // Three scalars fill A0-A2, leaving one slot — a fat pointer needs
        // two, so it must spill entirely rather than split.
        let args = vec![
            CallArg::Scalar(Reg::T0),
            CallArg::Scalar(Reg::T1),
            CallArg::Scalar(Reg::T2),
            CallArg::FatPointer { addr: Reg::T3, bank: Reg::T4 },
        ];
        let placements = CallingConvention::analyze_arg_placement(&args);
        assert_eq!(placements[3], ArgPlacement::Stack { offset: 0 });
    }

    #[test]
    fn stack_args_store_addr_before_bank() {
        let args = vec![
            CallArg::Scalar(Reg::T0), CallArg::Scalar(Reg::T1),
            CallArg::Scalar(Reg::T2), CallArg::Scalar(Reg::T3),
            CallArg::FatPointer { addr: Reg::T4, bank: Reg::T5 },
        ];
        let code = CallingConvention::setup_call_args(&args);
        let stores: Vec<&AsmInst> = code.iter().filter(|i| matches!(i, AsmInst::Store(..))).collect();
        assert_eq!(stores, vec![
            &AsmInst::Store(Reg::T4, Reg::Sb, Reg::Sp), &AsmInst::Store(Reg::T5, Reg::Sb, Reg::Sp),
        ]);
    }

    #[test]
    fn stack_param_offset_matches_caller_push_layout() {
        // Three stack-spilled words; word 0 was stored first (lowest
        // address), so it ends up deepest below the callee's saved area.
        assert_eq!(CallingConvention::stack_param_offset(0, 3), -9);
        assert_eq!(CallingConvention::stack_param_offset(1, 3), -8);
        assert_eq!(CallingConvention::stack_param_offset(2, 3), -7);
    }

    #[test]
    fn same_bank_call_skips_pcb_load() {
        let code = CallingConvention::emit_call(&CallTarget::Address { bank: 0, addr: 10 }, 0);
        assert!(!code.iter().any(|i| matches!(i, AsmInst::LI(Reg::Pcb, _))));
    }

    #[test]
    fn cross_bank_call_sets_pcb_first() {
        let code = CallingConvention::emit_call(&CallTarget::Address { bank: 2, addr: 10 }, 0);
        assert_eq!(code[0], AsmInst::LI(Reg::Pcb, 2));
        assert_eq!(code[1], AsmInst::Jal(2, 10));
    }

    #[test]
    fn prologue_saves_ra_fp_then_used_callee_saved() {
        let mut frame = Frame::new(4);
        frame.set_has_calls(true);
        frame.add_saved_reg(Reg::S0);
        let prologue = frame.gen_prologue();
        let stores: Vec<&Reg> = prologue
            .iter()
            .filter_map(|i| if let AsmInst::Store(r, Reg::Sb, Reg::Sp) = i { Some(r) } else { None })
            .collect();
        assert_eq!(stores, vec![&Reg::Ra, &Reg::Fp, &Reg::S0]);
        // FP is only set after every save has been written and SP advanced
        // past it, then locals are reserved above FP.
        let fp_set_pos = prologue.iter().position(|i| matches!(i, AsmInst::Add(Reg::Fp, Reg::Sp, Reg::R0))).unwrap();
        let last_store_pos = prologue.iter().rposition(|i| matches!(i, AsmInst::Store(..))).unwrap();
        assert!(fp_set_pos > last_store_pos);
        assert_eq!(prologue[prologue.len() - 1], AsmInst::AddI(Reg::Sp, Reg::Sp, 4));
    }

    #[test]
    fn epilogue_restores_in_reverse_and_returns() {
        let mut frame = Frame::new(0);
        frame.add_saved_reg(Reg::S0);
        frame.add_saved_reg(Reg::S1);
        let epilogue = frame.gen_epilogue(0);
        assert_eq!(*epilogue.last().unwrap(), AsmInst::Ret);
        let loads: Vec<&Reg> = epilogue
            .iter()
            .filter_map(|i| if let AsmInst::Load(r, Reg::Sb, Reg::Sp) = i { Some(r) } else { None })
            .collect();
        assert_eq!(loads, vec![&Reg::S1, &Reg::S0, &Reg::Fp, &Reg::Ra]);
    }

    #[test]
    fn return_registers_scalar_vs_fat_pointer() {
        assert_eq!(CallingConvention::return_registers(false), (Reg::Rv0, None));
        assert_eq!(CallingConvention::return_registers(true), (Reg::Rv0, Some(Reg::Rv1)));
    }
}
