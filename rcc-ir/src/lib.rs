//! Intermediate representation and typed-AST lowering for the Ripple
//! C99 compiler backend.

pub mod builder;
pub mod ir;
pub mod typed_ast;

pub use builder::lower_program;
pub use ir::{
    BasicBlock, Function, GlobalVariable, Instruction, IrBinaryOp, IrType, IrUnaryOp, Linkage,
    Module, ProvenanceMap, Value,
};
pub use typed_ast::{BinOp, Expr, FunctionDef, GlobalDef, Param, Program, Stmt, StructLayout, Type, UnOp};
