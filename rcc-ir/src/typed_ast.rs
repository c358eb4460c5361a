//! Typed-AST contract.
//!
//! The real C99 frontend (preprocessor, lexer, parser, semantic analyzer)
//! is an external collaborator and lives outside this crate. This module
//! defines the shape of its output: a typed AST with resolved struct
//! layouts and symbol types, so `builder::IrBuilder` has something
//! concrete to lower. A reimplemented or swapped-in frontend only needs
//! to produce these types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Int,
    Char,
    Pointer(Box<Type>),
    Array(Box<Type>, u64),
    Struct(String),
}

impl Type {
    /// Size in machine words, given a struct layout table for nested structs.
    pub fn size_in_words(&self, structs: &HashMap<String, StructLayout>) -> u64 {
        match self {
            Type::Void => 0,
            Type::Int => 1,
            Type::Char => 1,
            Type::Pointer(_) => 2,
            Type::Array(elem, count) => elem.size_in_words(structs) * count,
            Type::Struct(name) => structs.get(name).map(|l| l.size_words).unwrap_or(0),
        }
    }
}

/// Resolved struct layout: field name -> (word offset, type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructLayout {
    pub fields: Vec<(String, u64, Type)>,
    pub size_words: u64,
}

impl StructLayout {
    pub fn field_offset(&self, name: &str) -> Option<(u64, &Type)> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, off, ty)| (*off, ty))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod,
    And, Or, Xor, Shl, Shr,
    Eq, Ne, Lt, Le, Gt, Ge,
    LogAnd, LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i64),
    StrLit(String),
    Var(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Field(Box<Expr>, String),
    Arrow(Box<Expr>, String),
    Addr(Box<Expr>),
    Deref(Box<Expr>),
    Call(String, Vec<Expr>),
    Cast(Type, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Decl { name: String, ty: Type, init: Option<Expr> },
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDef {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
    pub globals: Vec<GlobalDef>,
    pub structs: HashMap<String, StructLayout>,
}
