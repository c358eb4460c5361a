//! Instruction Lowering
//!
//! Translates a module's IR (`rcc_ir::ir`) into a flat sequence of
//! `AsmInst`, one function at a time. This is where the bank-segmented
//! memory model actually gets enforced: every pointer-typed value is
//! tracked through the register manager as an (address, bank) pair, and
//! every `GetElementPtr` is lowered to the arithmetic that keeps that pair
//! correct across a bank boundary.

use crate::abi::{CallArg, CallTarget, CallingConvention, Frame};
use crate::asm::{AsmInst, Reg};
use crate::regalloc::RegisterManager;
use log::{debug, trace};
use rcc_common::{BankInfo, CompilerError, LabelId, TempId};
use rcc_ir::ir::{BasicBlock, Function, GlobalVariable, Instruction, IrBinaryOp, IrType, Linkage, Module, Value};

/// Cells per bank. GEP lowering uses this as the modulus when computing
/// whether an offset crosses into the next bank.
pub const BANK_SIZE: i64 = 4096;

fn temp_name(id: TempId) -> String {
    format!("t{id}")
}

fn bank_name(id: TempId) -> String {
    format!("t{id}_bank")
}

fn block_label(func_name: &str, id: LabelId) -> String {
    format!("{func_name}.bb{id}")
}

/// Lower an entire module to assembly instructions: code for every
/// non-external function, followed by data directives for every global.
pub fn lower_module(module: &Module) -> Result<Vec<AsmInst>, CompilerError> {
    let mut out = vec![AsmInst::Raw(".code".to_string())];

    for function in &module.functions {
        if function.is_external {
            continue;
        }
        out.extend(lower_function(function)?);
    }

    if !module.globals.is_empty() {
        out.push(AsmInst::Raw(".data".to_string()));
        for global in &module.globals {
            out.extend(lower_global(global));
        }
    }

    Ok(out)
}

fn lower_global(global: &GlobalVariable) -> Vec<AsmInst> {
    let mut out = vec![AsmInst::Label(global.name.clone())];
    let words = global.var_type.size_in_words().unwrap_or(1);
    match &global.initializer {
        Some(Value::Constant(v)) => out.push(AsmInst::Raw(format!(".word {v}"))),
        Some(Value::ConstantArray(vals)) => {
            let list = vals.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            out.push(AsmInst::Raw(format!(".word {list}")));
        }
        _ => {
            for _ in 0..words {
                out.push(AsmInst::Raw(".word 0".to_string()));
            }
        }
    }
    if global.linkage == Linkage::External {
        out.insert(0, AsmInst::Comment(format!("extern linkage: {}", global.name)));
    }
    out
}

/// Per-function lowering state.
struct FunctionLowering<'a> {
    func: &'a Function,
    mgr: RegisterManager,
    frame: Frame,
    code: Vec<AsmInst>,
}

fn is_fat_pointer(ty: &IrType) -> bool {
    matches!(ty, IrType::Ptr(_))
}

fn param_width(ty: &IrType) -> usize {
    if is_fat_pointer(ty) {
        2
    } else {
        1
    }
}

pub fn lower_function(func: &Function) -> Result<Vec<AsmInst>, CompilerError> {
    debug!("lowering function {}", func.name);

    // Locals: every alloca gets a home slot up front, sized in the first
    // pass so the register manager's local_count is correct before a
    // single instruction is emitted.
    let local_words = count_alloca_words(func);

    // Every callee-saved register is pushed/popped unconditionally, not
    // just the ones this function happens to touch - the register manager
    // hands S0-S3 out of the same pool as T0-T7, so by the time lowering
    // finishes a function body it's too late to decide which were "used"
    // without a second pass.
    let mut frame = Frame::new(local_words as i16);
    frame.set_has_calls(function_has_calls(func));
    for &reg in &[Reg::S0, Reg::S1, Reg::S2, Reg::S3] {
        frame.add_saved_reg(reg);
    }

    let mut lowering = FunctionLowering {
        func,
        mgr: RegisterManager::new(local_words as i16),
        frame,
        code: Vec::new(),
    };

    lowering.code.push(AsmInst::Label(func.name.clone()));

    // Stack-bank init must precede the prologue's own pushes of RA/FP/saved
    // registers - PUSH lowers to a STORE through SB, so SB has to already
    // hold a value before the very first frame access.
    lowering.mgr.init();
    lowering.code.extend(lowering.mgr.take_instructions());
    lowering.code.extend(lowering.frame.gen_prologue());

    lowering.bind_incoming_parameters()?;
    lowering.assign_alloca_offsets();

    for block in &func.blocks {
        lowering.mgr.invalidate_block_boundary_bindings();
        lowering.code.push(AsmInst::Label(block_label(&func.name, block.id)));
        lowering.lower_block(block)?;
    }

    // Epilogue is emitted per-Return inline (see `lower_return`); only
    // append a trailing one here if the function can fall off the end
    // without hitting a Return (e.g. `void` with no final return), since
    // otherwise the last block already ended with its own epilogue + RET.
    let mut out = lowering.code;
    let falls_off_end = !matches!(
        func.blocks.last().and_then(|b| b.instructions.last()),
        Some(Instruction::Return(_))
    );
    if falls_off_end {
        out.extend(lowering.frame.gen_epilogue(lowering.mgr.spill_slot_count() as u16));
    }
    Ok(out)
}

fn count_alloca_words(func: &Function) -> u64 {
    let mut total = 0u64;
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Instruction::Alloca { alloc_type, count, .. } = inst {
                let elem_words = alloc_type.size_in_words().unwrap_or(1);
                let n = match count {
                    Some(Value::Constant(c)) => *c as u64,
                    _ => 1,
                };
                total += elem_words * n;
            }
        }
    }
    total
}

fn function_has_calls(func: &Function) -> bool {
    func.blocks.iter().any(|b| b.instructions.iter().any(|i| matches!(i, Instruction::Call { .. })))
}

impl<'a> FunctionLowering<'a> {
    /// Get a register for `name`, draining any spill/reload/recompute
    /// instructions the register manager had to emit straight into the
    /// function's code stream *at this point* — never batched for later.
    /// Out-of-order spill code would both misplace the stack-bank init
    /// relative to the rest of the prologue and reorder a spill/reload
    /// relative to the instruction it exists to serve.
    fn get_register(&mut self, name: &str) -> Reg {
        let reg = self.mgr.get_register(name);
        self.code.extend(self.mgr.take_instructions());
        reg
    }

    /// Same draining discipline as [`Self::get_register`], for the
    /// before-every-call spill of every live register.
    fn spill_all(&mut self) {
        self.mgr.spill_all();
        self.code.extend(self.mgr.take_instructions());
    }

    /// Move incoming parameters out of the A-register window / stack slots
    /// into owned locations immediately, per the calling convention: the
    /// callee never reads an A-register after the prologue.
    fn bind_incoming_parameters(&mut self) -> Result<(), CompilerError> {
        let widths: Vec<usize> = self.func.parameters.iter().map(|(_, ty)| param_width(ty)).collect();
        let placements = CallingConvention::analyze_param_placement(&widths);
        let total_stack_words: u16 = widths
            .iter()
            .zip(placements.iter())
            .filter(|(_, p)| matches!(p, crate::abi::ArgPlacement::Stack { .. }))
            .map(|(w, _)| *w as u16)
            .sum();

        for ((temp_id, ty), placement) in self.func.parameters.iter().zip(placements.iter()) {
            let name = temp_name(*temp_id);
            match placement {
                crate::abi::ArgPlacement::Registers { start } => {
                    if is_fat_pointer(ty) {
                        let addr_reg = self.get_register(&name);
                        self.code.push(AsmInst::Move(addr_reg, crate::abi::ARG_REGS[*start]));
                        self.mgr.bind_value_to_register(name.clone(), addr_reg);
                        let bank_reg = self.get_register(&bank_name(*temp_id));
                        self.code.push(AsmInst::Move(bank_reg, crate::abi::ARG_REGS[*start + 1]));
                        self.mgr.bind_value_to_register(bank_name(*temp_id), bank_reg);
                        self.mgr.set_pointer_bank(name, BankInfo::Register(bank_name(*temp_id)));
                    } else {
                        let reg = self.get_register(&name);
                        self.code.push(AsmInst::Move(reg, crate::abi::ARG_REGS[*start]));
                        self.mgr.bind_value_to_register(name, reg);
                    }
                }
                crate::abi::ArgPlacement::Stack { offset } => {
                    let fp_offset = CallingConvention::stack_param_offset(*offset, total_stack_words);
                    let reg = self.get_register(&name);
                    self.code.push(AsmInst::Add(reg, Reg::Fp, Reg::R0));
                    self.code.push(AsmInst::AddI(reg, reg, fp_offset));
                    self.code.push(AsmInst::Load(reg, Reg::Sb, reg));
                    self.mgr.bind_value_to_register(name.clone(), reg);
                    if is_fat_pointer(ty) {
                        let bank_reg = self.get_register(&bank_name(*temp_id));
                        self.code.push(AsmInst::Add(bank_reg, Reg::Fp, Reg::R0));
                        self.code.push(AsmInst::AddI(bank_reg, bank_reg, fp_offset + 1));
                        self.code.push(AsmInst::Load(bank_reg, Reg::Sb, bank_reg));
                        self.mgr.bind_value_to_register(bank_name(*temp_id), bank_reg);
                        self.mgr.set_pointer_bank(name, BankInfo::Register(bank_name(*temp_id)));
                    }
                }
            }
        }
        Ok(())
    }

    fn assign_alloca_offsets(&mut self) {
        let mut offset: i16 = 0;
        for block in &self.func.blocks {
            for inst in &block.instructions {
                if let Instruction::Alloca { result, alloc_type, count, .. } = inst {
                    let name = temp_name(*result);
                    self.mgr.register_alloca(name.clone(), offset);
                    self.mgr.set_pointer_bank(name, BankInfo::Stack);
                    let elem_words = alloc_type.size_in_words().unwrap_or(1);
                    let n = match count {
                        Some(Value::Constant(c)) => *c as i16,
                        _ => 1,
                    };
                    offset += elem_words as i16 * n;
                }
            }
        }
    }

    fn lower_block(&mut self, block: &BasicBlock) -> Result<(), CompilerError> {
        for inst in &block.instructions {
            self.lower_instruction(inst)?;
        }
        Ok(())
    }

    fn lower_instruction(&mut self, inst: &Instruction) -> Result<(), CompilerError> {
        match inst {
            Instruction::Comment(text) => self.code.push(AsmInst::Comment(text.clone())),
            Instruction::DebugLoc { .. } => {}
            Instruction::InlineAsm { assembly } => self.code.push(AsmInst::Raw(assembly.clone())),

            Instruction::Binary { result, op, lhs, rhs, .. } => self.lower_binary(*result, *op, lhs, rhs)?,
            Instruction::Unary { result, op, operand, .. } => self.lower_unary(*result, *op, operand)?,

            Instruction::Alloca { .. } => {
                // Home slot already assigned in `assign_alloca_offsets`; the
                // address is materialized lazily on first use via the
                // register manager's alloca recomputation path.
            }

            Instruction::Load { result, ptr, .. } => self.lower_load(*result, ptr)?,
            Instruction::Store { value, ptr } => self.lower_store(value, ptr)?,
            Instruction::GetElementPtr { result, ptr, indices, elem_size, .. } => {
                self.lower_gep(*result, ptr, indices, *elem_size)?
            }

            Instruction::Call { result, function, args, .. } => self.lower_call(*result, function, args)?,
            Instruction::Return(value) => self.lower_return(value)?,
            Instruction::Branch(label) => {
                let target = block_label(&self.func.name, *label);
                self.code.push(AsmInst::Beq(Reg::R0, Reg::R0, target));
            }
            Instruction::BranchCond { condition, true_label, false_label } => {
                self.lower_branch_cond(condition, *true_label, *false_label)?
            }

            Instruction::Cast { result, value, .. } => {
                // All scalars are at most one machine word at runtime; a
                // cast is a register move (sign/zero-extension of narrower
                // C types already folded in by the frontend).
                let src = self.value_operand(value)?;
                let dst = self.get_register(&temp_name(*result));
                self.code.push(AsmInst::Add(dst, src, Reg::R0));
                self.mgr.bind_value_to_register(temp_name(*result), dst);
            }

            Instruction::Select { result, condition, true_value, false_value, .. } => {
                let cond = self.value_operand(condition)?;
                let t = self.value_operand(true_value)?;
                let f = self.value_operand(false_value)?;
                let dst = self.get_register(&temp_name(*result));
                let else_label = format!("{}.select{}.else", self.func.name, result);
                let end_label = format!("{}.select{}.end", self.func.name, result);
                self.code.push(AsmInst::Beq(cond, Reg::R0, else_label.clone()));
                self.code.push(AsmInst::Add(dst, t, Reg::R0));
                self.code.push(AsmInst::Beq(Reg::R0, Reg::R0, end_label.clone()));
                self.code.push(AsmInst::Label(else_label));
                self.code.push(AsmInst::Add(dst, f, Reg::R0));
                self.code.push(AsmInst::Label(end_label));
                self.mgr.bind_value_to_register(temp_name(*result), dst);
            }

            Instruction::Phi { .. } => {
                // Phi nodes are resolved by the frontend/builder inserting
                // copies on predecessor edges before this stage; by the
                // time lowering sees a block, any live phi result already
                // has a same-named temp bound on every incoming edge.
                self.code.push(AsmInst::Comment("phi (resolved via predecessor copies)".to_string()));
            }

            Instruction::Intrinsic { result, intrinsic, args, .. } => {
                self.lower_intrinsic(*result, intrinsic, args)?
            }
        }
        Ok(())
    }

    fn value_operand(&mut self, value: &Value) -> Result<Reg, CompilerError> {
        match value {
            Value::Temp(id) => Ok(self.get_register(&temp_name(*id))),
            Value::Constant(c) => {
                let key = format!("const_{c}");
                let reg = self.get_register(&key);
                self.code.push(AsmInst::LI(reg, *c as i16));
                self.mgr.bind_value_to_register(key, reg);
                Ok(reg)
            }
            Value::Global(name) => {
                let reg = self.get_register(&format!("global_{name}"));
                self.code.push(AsmInst::Raw(format!("LI {reg}, {name}")));
                self.mgr.set_pointer_bank(format!("global_{name}"), BankInfo::Global);
                Ok(reg)
            }
            Value::Function(name) => {
                let reg = self.get_register(&format!("fn_{name}"));
                self.code.push(AsmInst::Raw(format!("LI {reg}, {name}")));
                Ok(reg)
            }
            Value::Undef => Ok(self.get_register("undef")),
            Value::FatPtr(addr, _bank) => self.value_operand(addr),
            Value::ConstantArray(_) => Err(CompilerError::InternalError {
                message: "constant array used as a scalar operand".to_string(),
            }),
        }
    }

    /// Resolve the bank register to use for a pointer-typed value, erroring
    /// per the provenance invariant if it can't be determined.
    fn bank_operand(&mut self, ptr_name: &str, span_hint: &str) -> Result<Reg, CompilerError> {
        match self.mgr.get_pointer_bank(ptr_name) {
            Some(BankInfo::Global) => Ok(Reg::R0),
            Some(BankInfo::Stack) => Ok(Reg::Sb),
            Some(BankInfo::Register(name)) => Ok(self.get_register(&name)),
            Some(BankInfo::Unknown) | None => Err(CompilerError::InternalError {
                message: format!(
                    "pointer '{span_hint}' has no statically known bank at codegen time"
                ),
            }),
            Some(BankInfo::Mixed) => Err(CompilerError::InternalError {
                message: format!(
                    "pointer '{span_hint}' has mixed provenance and cannot be dereferenced"
                ),
            }),
        }
    }

    fn ptr_name_of(&self, value: &Value) -> String {
        match value {
            Value::Temp(id) => temp_name(*id),
            Value::Global(name) => format!("global_{name}"),
            _ => "ptr".to_string(),
        }
    }

    fn lower_load(&mut self, result: TempId, ptr: &Value) -> Result<(), CompilerError> {
        let ptr_name = self.ptr_name_of(ptr);
        let addr = self.value_operand(ptr)?;
        let bank = self.bank_operand(&ptr_name, &ptr_name)?;
        let dst = self.get_register(&temp_name(result));
        self.code.push(AsmInst::Load(dst, bank, addr));
        self.mgr.bind_value_to_register(temp_name(result), dst);
        Ok(())
    }

    fn lower_store(&mut self, value: &Value, ptr: &Value) -> Result<(), CompilerError> {
        let ptr_name = self.ptr_name_of(ptr);
        let addr = self.value_operand(ptr)?;
        let bank = self.bank_operand(&ptr_name, &ptr_name)?;
        let src = self.value_operand(value)?;
        self.code.push(AsmInst::Store(src, bank, addr));
        Ok(())
    }

    /// `GetElementPtr` is the sole pointer-arithmetic op. We always take the
    /// dynamic path: compute the raw cell offset, then split it back into
    /// (addr, bank) by dividing/modding against `BANK_SIZE`. This is
    /// correct whether or not the access actually crosses a bank boundary,
    /// and sidesteps needing compile-time-constant indices.
    fn lower_gep(&mut self, result: TempId, ptr: &Value, indices: &[Value], elem_size: u16) -> Result<(), CompilerError> {
        let ptr_name = self.ptr_name_of(ptr);
        let base_addr = self.value_operand(ptr)?;
        let base_bank = self.bank_operand(&ptr_name, &ptr_name)?;

        let index = indices.first().cloned().unwrap_or(Value::Constant(0));
        let index_reg = self.value_operand(&index)?;

        let raw = self.get_register(&format!("gep_raw_{result}"));
        if elem_size == 1 {
            self.code.push(AsmInst::Add(raw, base_addr, Reg::R0));
            self.code.push(AsmInst::Add(raw, raw, index_reg));
        } else if elem_size.is_power_of_two() {
            let shift = elem_size.trailing_zeros() as i16;
            let shift_reg = self.get_register(&format!("gep_shift_{result}"));
            self.code.push(AsmInst::LI(shift_reg, shift));
            self.code.push(AsmInst::Sll(raw, index_reg, shift_reg));
            self.code.push(AsmInst::Add(raw, raw, base_addr));
            self.mgr.free_register(shift_reg);
        } else {
            self.code.push(AsmInst::MulI(raw, index_reg, elem_size as i16));
            self.code.push(AsmInst::Add(raw, raw, base_addr));
        }

        let new_addr = self.get_register(&temp_name(result));
        self.code.push(AsmInst::ModI(new_addr, raw, BANK_SIZE as i16));

        let bank_delta = self.get_register(&format!("gep_bank_{result}"));
        self.code.push(AsmInst::DivI(bank_delta, raw, BANK_SIZE as i16));
        self.code.push(AsmInst::Add(bank_delta, bank_delta, base_bank));
        trace!("gep t{result}: elem_size={elem_size} may cross bank, emitted div/mod against {BANK_SIZE}");

        self.mgr.free_register(raw);
        self.mgr.bind_value_to_register(temp_name(result), new_addr);
        self.mgr.bind_value_to_register(format!("gep_bank_{result}"), bank_delta);
        self.mgr.set_pointer_bank(temp_name(result), BankInfo::Register(format!("gep_bank_{result}")));

        Ok(())
    }

    fn lower_binary(&mut self, result: TempId, op: IrBinaryOp, lhs: &Value, rhs: &Value) -> Result<(), CompilerError> {
        let lhs_operand = self.operand_tag(lhs);
        let rhs_operand = self.operand_tag(rhs);
        let swap = self.mgr.should_swap_operands(&lhs_operand, &rhs_operand);
        trace!("binary {op:?}: swap={swap}");

        let (first_val, second_val) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let first = self.value_operand(first_val)?;
        self.mgr.pin(first);
        let second = self.value_operand(second_val)?;
        self.mgr.unpin(first);

        let (l, r) = if swap { (second, first) } else { (first, second) };
        let dst = first;

        match op {
            IrBinaryOp::Add => self.code.push(AsmInst::Add(dst, l, r)),
            IrBinaryOp::Sub => self.code.push(AsmInst::Sub(dst, l, r)),
            IrBinaryOp::Mul => self.code.push(AsmInst::Mul(dst, l, r)),
            IrBinaryOp::SDiv | IrBinaryOp::UDiv => self.code.push(AsmInst::Div(dst, l, r)),
            IrBinaryOp::SRem | IrBinaryOp::URem => self.code.push(AsmInst::Mod(dst, l, r)),
            IrBinaryOp::And => self.code.push(AsmInst::And(dst, l, r)),
            IrBinaryOp::Or => self.code.push(AsmInst::Or(dst, l, r)),
            IrBinaryOp::Xor => self.code.push(AsmInst::Xor(dst, l, r)),
            IrBinaryOp::Shl => self.code.push(AsmInst::Sll(dst, l, r)),
            IrBinaryOp::LShr => self.code.push(AsmInst::Srl(dst, l, r)),
            IrBinaryOp::AShr => self.emit_arithmetic_shift_right(dst, l, r),
            IrBinaryOp::Slt => self.code.push(AsmInst::Slt(dst, l, r)),
            IrBinaryOp::Ult => self.code.push(AsmInst::Sltu(dst, l, r)),
            IrBinaryOp::Eq => self.emit_compare_eq(dst, l, r, false),
            IrBinaryOp::Ne => self.emit_compare_eq(dst, l, r, true),
            IrBinaryOp::Sle => {
                self.code.push(AsmInst::Slt(dst, r, l));
                self.code.push(AsmInst::XorI(dst, dst, 1));
            }
            IrBinaryOp::Sgt => self.code.push(AsmInst::Slt(dst, r, l)),
            IrBinaryOp::Sge => {
                self.code.push(AsmInst::Slt(dst, l, r));
                self.code.push(AsmInst::XorI(dst, dst, 1));
            }
            IrBinaryOp::Ule => {
                self.code.push(AsmInst::Sltu(dst, r, l));
                self.code.push(AsmInst::XorI(dst, dst, 1));
            }
            IrBinaryOp::Ugt => self.code.push(AsmInst::Sltu(dst, r, l)),
            IrBinaryOp::Uge => {
                self.code.push(AsmInst::Sltu(dst, l, r));
                self.code.push(AsmInst::XorI(dst, dst, 1));
            }
        }

        if first != second {
            self.mgr.free_register(second);
        }
        self.mgr.bind_value_to_register(temp_name(result), dst);
        Ok(())
    }

    /// x != y reduces to (x == y) inverted; we only have SLT/SLTU natively,
    /// so equality goes through subtract-and-test-zero via two SLTU
    /// comparisons (neither a<b nor b<a implies a==b).
    fn emit_compare_eq(&mut self, dst: Reg, l: Reg, r: Reg, negate: bool) {
        // Neither l<r nor r<l implies equality; OR the two SLTU results and
        // invert for `==` (leave as-is for `!=`).
        self.code.push(AsmInst::Sltu(dst, l, r));
        let tmp = self.get_register("cmp_tmp");
        self.code.push(AsmInst::Sltu(tmp, r, l));
        self.code.push(AsmInst::Or(dst, dst, tmp));
        self.mgr.free_register(tmp);
        if !negate {
            self.code.push(AsmInst::XorI(dst, dst, 1));
        }
    }

    fn emit_arithmetic_shift_right(&mut self, dst: Reg, l: Reg, r: Reg) {
        // No native AShr on this ISA: logical-shift then OR in a sign mask
        // built from (l < 0) sign-extended into the vacated high bits.
        self.code.push(AsmInst::Srl(dst, l, r));
        let sign = self.get_register("ashr_sign");
        self.code.push(AsmInst::Slt(sign, l, Reg::R0)); // 1 if l<0 else 0
        self.code.push(AsmInst::Sub(sign, Reg::R0, sign)); // 0 or -1 (0xFFFF)
        let width = self.get_register("ashr_width");
        self.code.push(AsmInst::LI(width, 16));
        self.code.push(AsmInst::Sub(width, width, r)); // 16 - r
        self.code.push(AsmInst::Sll(sign, sign, width));
        self.code.push(AsmInst::Or(dst, dst, sign));
        self.mgr.free_register(sign);
        self.mgr.free_register(width);
    }

    fn operand_tag(&self, value: &Value) -> crate::regalloc::OperandValue {
        match value {
            Value::Temp(id) => crate::regalloc::OperandValue::Named(temp_name(*id)),
            Value::Constant(c) => crate::regalloc::OperandValue::Constant(*c as i16),
            _ => crate::regalloc::OperandValue::Constant(0),
        }
    }

    fn lower_unary(&mut self, result: TempId, op: rcc_ir::ir::IrUnaryOp, operand: &Value) -> Result<(), CompilerError> {
        use rcc_ir::ir::IrUnaryOp;
        let src = self.value_operand(operand)?;
        let dst = self.get_register(&temp_name(result));
        match op {
            IrUnaryOp::Neg => {
                self.code.push(AsmInst::Add(dst, src, Reg::R0));
                self.code.push(AsmInst::Sub(dst, Reg::R0, dst));
            }
            IrUnaryOp::Not => {
                self.code.push(AsmInst::Add(dst, src, Reg::R0));
                self.code.push(AsmInst::XorI(dst, dst, -1));
            }
            IrUnaryOp::ZExt | IrUnaryOp::SExt | IrUnaryOp::Trunc | IrUnaryOp::PtrToInt | IrUnaryOp::IntToPtr => {
                // Every scalar is already a single 16-bit word at runtime;
                // these are no-ops on the value representation.
                self.code.push(AsmInst::Add(dst, src, Reg::R0));
            }
        }
        self.mgr.bind_value_to_register(temp_name(result), dst);
        Ok(())
    }

    fn lower_call(&mut self, result: Option<TempId>, function: &Value, args: &[Value]) -> Result<(), CompilerError> {
        let mut call_args = Vec::with_capacity(args.len());
        for arg in args {
            let reg = self.value_operand(arg)?;
            let name = self.ptr_name_of(arg);
            if let Some(BankInfo::Register(bank_val)) = self.mgr.get_pointer_bank(&name) {
                let bank_reg = self.get_register(&bank_val);
                call_args.push(CallArg::FatPointer { addr: reg, bank: bank_reg });
            } else {
                call_args.push(CallArg::Scalar(reg));
            }
        }

        self.spill_all();

        let target = match function {
            Value::Function(name) => CallTarget::Label(name.clone()),
            _ => CallTarget::Label("indirect".to_string()),
        };
        self.code.extend(CallingConvention::make_complete_call(&target, &call_args, 0));

        if let Some(result) = result {
            let reg = Reg::Rv0;
            self.mgr.bind_value_to_register(temp_name(result), reg);
        }
        Ok(())
    }

    fn lower_return(&mut self, value: &Option<Value>) -> Result<(), CompilerError> {
        if let Some(v) = value {
            let reg = self.value_operand(v)?;
            if reg != Reg::Rv0 {
                self.code.push(AsmInst::Move(Reg::Rv0, reg));
            }
            let name = self.ptr_name_of(v);
            if let Some(BankInfo::Register(bank_val)) = self.mgr.get_pointer_bank(&name) {
                let bank_reg = self.get_register(&bank_val);
                if bank_reg != Reg::Rv1 {
                    self.code.push(AsmInst::Move(Reg::Rv1, bank_reg));
                }
            }
        }
        // Each return site tears its own frame down; `lower_function` only
        // appends a further trailing epilogue for blocks that fall off the
        // end without hitting a return.
        self.code.extend(self.frame.gen_epilogue(self.mgr.spill_slot_count() as u16));
        Ok(())
    }

    fn lower_branch_cond(&mut self, condition: &Value, true_label: LabelId, false_label: LabelId) -> Result<(), CompilerError> {
        let cond = self.value_operand(condition)?;
        let true_target = block_label(&self.func.name, true_label);
        let false_target = block_label(&self.func.name, false_label);
        self.code.push(AsmInst::Bne(cond, Reg::R0, true_target));
        self.code.push(AsmInst::Beq(Reg::R0, Reg::R0, false_target));
        Ok(())
    }

    fn lower_intrinsic(&mut self, result: Option<TempId>, intrinsic: &str, args: &[Value]) -> Result<(), CompilerError> {
        self.code.push(AsmInst::Comment(format!("intrinsic @{intrinsic}")));
        let mut call_args = Vec::with_capacity(args.len());
        for arg in args {
            call_args.push(CallArg::Scalar(self.value_operand(arg)?));
        }
        self.spill_all();
        self.code.extend(CallingConvention::make_complete_call(&CallTarget::Label(intrinsic.to_string()), &call_args, 0));
        if let Some(result) = result {
            self.mgr.bind_value_to_register(temp_name(result), Reg::Rv0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_function(name: &str) -> Function {
        let mut f = Function::new(name.to_string(), IrType::I16);
        let mut block = BasicBlock::new(0);
        block.add_instruction(Instruction::Return(Some(Value::Constant(0))));
        f.blocks.push(block);
        f
    }

    #[test]
    fn function_prologue_initializes_stack_bank_before_any_frame_access() {
        let func = scalar_function("main");
        let code = lower_function(&func).unwrap();
        // Find the function's own label, then assert the very next
        // non-comment instruction initializes SB before anything else
        // touches the frame (the prologue's saves go through SB).
        let label_idx = code.iter().position(|i| matches!(i, AsmInst::Label(l) if l == "main")).unwrap();
        let first_real = code[label_idx + 1..]
            .iter()
            .find(|i| !matches!(i, AsmInst::Comment(_)))
            .unwrap();
        assert_eq!(*first_real, AsmInst::LI(Reg::Sb, 1));
        // And it must precede the first frame store.
        let sb_pos = code.iter().position(|i| matches!(i, AsmInst::LI(Reg::Sb, 1))).unwrap();
        let store_pos = code.iter().position(|i| matches!(i, AsmInst::Store(..))).unwrap();
        assert!(sb_pos < store_pos);
    }

    #[test]
    fn function_ending_in_return_gets_exactly_one_epilogue() {
        let func = scalar_function("main");
        let code = lower_function(&func).unwrap();
        let ret_count = code.iter().filter(|i| matches!(i, AsmInst::Ret)).count();
        assert_eq!(ret_count, 1, "a function whose last block returns must not get a second, unreachable epilogue");
    }

    #[test]
    fn gep_over_array_spanning_bank_boundary_emits_div_mod_sequence() {
        // int a[2000]; a[1500] - 1500*1(word) pushes base_addr=1500 past
        // BANK_SIZE=4096 only for bigger offsets, but the lowering always
        // takes the dynamic DIV/MOD path regardless, so just assert the
        // sequence is present for a GEP with a non-trivial index.
        let mut func = Function::new("main".to_string(), IrType::I16);
        let mut block = BasicBlock::new(0);
        block.add_instruction(Instruction::Alloca {
            result: 0,
            alloc_type: IrType::Array { size: 2000, element_type: Box::new(IrType::I16) },
            count: None,
            result_type: IrType::Ptr(Box::new(IrType::I16)),
        });
        block.add_instruction(Instruction::GetElementPtr {
            result: 1,
            ptr: Value::Temp(0),
            indices: vec![Value::Constant(1500)],
            elem_size: 1,
            result_type: IrType::Ptr(Box::new(IrType::I16)),
        });
        block.add_instruction(Instruction::Return(Some(Value::Constant(0))));
        func.blocks.push(block);

        let code = lower_function(&func).unwrap();
        assert!(code.iter().any(|i| matches!(i, AsmInst::ModI(_, _, BANK_SIZE_I16))),
            "GEP lowering must compute the new address via mod BANK_SIZE");
        assert!(code.iter().any(|i| matches!(i, AsmInst::DivI(_, _, BANK_SIZE_I16))),
            "GEP lowering must compute the bank delta via div BANK_SIZE");
    }

    #[test]
    fn five_scalar_parameters_place_first_four_in_argument_registers() {
        let mut func = Function::new("g".to_string(), IrType::I16);
        for i in 0..5u32 {
            func.add_parameter(i, IrType::I16);
        }
        let mut block = BasicBlock::new(0);
        block.add_instruction(Instruction::Return(Some(Value::Temp(4))));
        func.blocks.push(block);

        let code = lower_function(&func).unwrap();
        // The first four parameters move out of A0..A3; the fifth is a
        // stack load through SB rather than an A-register move.
        for reg in [Reg::A0, Reg::A1, Reg::A2, Reg::A3] {
            assert!(code.iter().any(|i| matches!(i, AsmInst::Move(_, r) if *r == reg)));
        }
        assert!(code.iter().any(|i| matches!(i, AsmInst::Load(_, Reg::Sb, _))),
            "the 5th scalar parameter must be loaded from its FP-relative stack slot");
    }

    #[test]
    fn module_lowering_emits_code_directive_before_functions_and_data_after() {
        let mut module = Module::new("m".to_string());
        module.add_function(scalar_function("main"));
        module.add_global(GlobalVariable {
            name: "g".to_string(),
            var_type: IrType::I16,
            is_constant: false,
            initializer: Some(Value::Constant(7)),
            linkage: Linkage::External,
            symbol_id: None,
        });
        let code = lower_module(&module).unwrap();
        assert_eq!(code[0], AsmInst::Raw(".code".to_string()));
        let code_pos = code.iter().position(|i| matches!(i, AsmInst::Raw(s) if s == ".code")).unwrap();
        let data_pos = code.iter().position(|i| matches!(i, AsmInst::Raw(s) if s == ".data")).unwrap();
        assert!(code_pos < data_pos);
    }

    const BANK_SIZE_I16: i16 = BANK_SIZE as i16;
}
