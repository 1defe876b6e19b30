//! The flat IR that initializer lowering targets: direct object references,
//! simple expressions, and assignment statements collected into blocks.

use std::fmt;
use std::rc::Rc;

use crate::symbols::{Linkage, Symbol, SymbolKind};
use crate::types::{Member, Type};

/// An operand: either an immediate, or a direct reference into a symbol's
/// storage.
///
/// Direct references carry a byte `offset` and the leaf `ty` being accessed.
/// `field_offset` and `field_width` select a bit window within `ty` when the
/// access is a bit-field; both are zero for whole-unit accesses.
#[derive(Clone)]
pub struct Var {
  pub kind: VarKind,
  pub ty: Type,
  pub offset: usize,
  pub field_offset: u16,
  pub field_width: u16,
}

#[derive(Clone)]
pub enum VarKind {
  Direct(Rc<Symbol>),
  Immediate(Imm),
}

#[derive(Clone, Copy)]
pub enum Imm {
  Int(i64),
  Float(f64),
}

impl Var {
  pub fn direct(symbol: &Rc<Symbol>) -> Var {
    Var {
      kind: VarKind::Direct(symbol.clone()),
      ty: symbol.ty.clone(),
      offset: 0,
      field_offset: 0,
      field_width: 0,
    }
  }

  pub fn imm_int(value: i64, ty: Type) -> Var {
    Var {
      kind: VarKind::Immediate(Imm::Int(value)),
      ty,
      offset: 0,
      field_offset: 0,
      field_width: 0,
    }
  }

  pub fn imm_float(value: f64, ty: Type) -> Var {
    Var {
      kind: VarKind::Immediate(Imm::Float(value)),
      ty,
      offset: 0,
      field_offset: 0,
      field_width: 0,
    }
  }

  pub fn is_direct(&self) -> bool {
    matches!(self.kind, VarKind::Direct(_))
  }

  /// The referenced symbol. Panics on immediates; lowering only ever
  /// manipulates direct targets.
  pub fn symbol(&self) -> &Rc<Symbol> {
    match &self.kind {
      VarKind::Direct(symbol) => symbol,
      VarKind::Immediate(_) => panic!("immediate operand has no symbol"),
    }
  }

  pub fn imm_int_value(&self) -> Option<i64> {
    match self.kind {
      VarKind::Immediate(Imm::Int(v)) => Some(v),
      _ => None,
    }
  }

  /// Access `member` within this object.
  pub fn member(&self, member: &Member) -> Var {
    Var {
      kind: self.kind.clone(),
      ty: member.ty.clone(),
      offset: self.offset + member.offset,
      field_offset: member.field_offset,
      field_width: member.field_width,
    }
  }

  /// Reinterpret this reference at its current offset as `ty`, clearing any
  /// bit-field window.
  pub fn with_type(&self, ty: Type) -> Var {
    Var {
      kind: self.kind.clone(),
      ty,
      offset: self.offset,
      field_offset: 0,
      field_width: 0,
    }
  }

  fn convert(self, ty: &Type) -> Var {
    match self.kind {
      VarKind::Immediate(imm) => Var {
        kind: VarKind::Immediate(imm.convert(ty)),
        ty: ty.clone(),
        offset: 0,
        field_offset: 0,
        field_width: 0,
      },
      _ => self,
    }
  }
}

impl Imm {
  fn convert(self, ty: &Type) -> Imm {
    use crate::types::TypeKind;
    match (self, ty.kind()) {
      (Imm::Int(v), TypeKind::Int { size, signed }) => Imm::Int(truncate(v, *size, *signed)),
      (Imm::Int(v), TypeKind::Float { size: 4 }) => Imm::Float(v as f32 as f64),
      (Imm::Int(v), TypeKind::Float { .. }) => Imm::Float(v as f64),
      (Imm::Float(v), TypeKind::Int { size, signed }) => {
        Imm::Int(truncate(v as i64, *size, *signed))
      }
      (Imm::Float(v), TypeKind::Float { size: 4 }) => Imm::Float(v as f32 as f64),
      (Imm::Float(v), TypeKind::Float { .. }) => Imm::Float(v),
      _ => self,
    }
  }
}

fn truncate(value: i64, size: usize, signed: bool) -> i64 {
  let bits = size * 8;
  if bits >= 64 {
    return value;
  }
  let mask = (1i128 << bits) - 1;
  let low = (value as i128) & mask;
  if signed && low >> (bits - 1) & 1 == 1 {
    (low - (1i128 << bits)) as i64
  } else {
    low as i64
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Minus,
  Not,
  BitNot,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Shl,
  Shr,
  BitAnd,
  BitXor,
  BitOr,
  Eq,
  Neq,
  Less,
  LessEq,
  More,
  MoreEq,
}

/// The value side of an assignment, in the shapes lowering can produce.
#[derive(Clone)]
pub enum Expr {
  Identity(Var),
  Unary {
    op: UnaryOp,
    ty: Type,
    operand: Var,
  },
  Binary {
    op: BinaryOp,
    ty: Type,
    left: Var,
    right: Var,
  },
  Addr(Var),
  Call {
    func: Var,
    args: Vec<Var>,
    ty: Type,
  },
}

impl Expr {
  pub fn ty(&self) -> Type {
    match self {
      Expr::Identity(v) => v.ty.clone(),
      Expr::Unary { ty, .. } => ty.clone(),
      Expr::Binary { ty, .. } => ty.clone(),
      Expr::Addr(v) => Type::pointer(v.ty.clone()),
      Expr::Call { ty, .. } => ty.clone(),
    }
  }

  pub fn is_call(&self) -> bool {
    matches!(self, Expr::Call { .. })
  }

  pub fn as_identity(&self) -> Option<&Var> {
    match self {
      Expr::Identity(v) => Some(v),
      _ => None,
    }
  }
}

pub enum Statement {
  Assign { target: Var, value: Expr },
  Discard(Expr),
  Return(Option<Expr>),
}

/// A straight-line sequence of statements.
///
/// A block optionally holds one *pending* initializer value: an expression
/// that has been parsed but not yet bound to a target, which is how the
/// walker looks one element ahead before committing to a level.
pub struct Block {
  pub code: Vec<Statement>,
  init_value: Option<Expr>,
}

impl Block {
  pub fn new() -> Block {
    Block {
      code: Vec::new(),
      init_value: None,
    }
  }

  pub fn has_init_value(&self) -> bool {
    self.init_value.is_some()
  }

  pub fn defer_init_value(&mut self, value: Expr) {
    debug_assert!(self.init_value.is_none());
    self.init_value = Some(value);
  }

  pub fn take_init_value(&mut self) -> Option<Expr> {
    self.init_value.take()
  }
}

impl Default for Block {
  fn default() -> Self {
    Self::new()
  }
}

/// Freelist of empty scratch blocks.
///
/// Union initialization burns through one short-lived block per designator
/// iteration; recycling them keeps that loop allocation-free.
pub struct BlockPool {
  free: Vec<Block>,
}

impl BlockPool {
  pub fn new() -> BlockPool {
    BlockPool { free: Vec::new() }
  }

  pub fn acquire(&mut self) -> Block {
    self.free.pop().unwrap_or_default()
  }

  pub fn release(&mut self, mut block: Block) {
    debug_assert!(!block.has_init_value());
    block.code.clear();
    self.free.push(block);
  }

  pub fn finalize(&mut self) {
    self.free.clear();
  }
}

impl Default for BlockPool {
  fn default() -> Self {
    Self::new()
  }
}

/// One lowered definition: a symbol together with the code that initializes
/// it, or a function body.
pub struct Def {
  pub symbol: Rc<Symbol>,
  pub body: Block,
  pub temps: Vec<Rc<Symbol>>,
}

impl Def {
  pub fn new(symbol: Rc<Symbol>) -> Def {
    Def {
      symbol,
      body: Block::new(),
      temps: Vec::new(),
    }
  }

  /// A fresh temporary of type `ty`.
  pub fn temp(&mut self, ty: Type) -> Var {
    let symbol = Rc::new(Symbol {
      name: format!("%t{}", self.temps.len()),
      ty: ty.clone(),
      linkage: Linkage::None,
      kind: SymbolKind::Temporary,
    });
    self.temps.push(symbol.clone());
    Var::direct(&symbol)
  }
}

pub struct Program {
  pub defs: Vec<Def>,
}

/// Append an assignment of `value` into `target`, converting immediate
/// operands to the target type. Returns the target written.
pub fn eval_assign(block: &mut Block, target: Var, value: Expr) -> Var {
  debug_assert!(target.is_direct());
  let value = match value {
    Expr::Identity(v) => Expr::Identity(v.convert(&target.ty)),
    value => value,
  };
  block.code.push(Statement::Assign {
    target: target.clone(),
    value,
  });
  target
}

impl fmt::Display for Imm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Imm::Int(v) => write!(f, "{v}"),
      Imm::Float(v) => write!(f, "{v}"),
    }
  }
}

impl fmt::Display for Var {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      VarKind::Immediate(imm) => write!(f, "{imm}"),
      VarKind::Direct(symbol) => {
        if let SymbolKind::Literal(bytes) = &symbol.kind {
          return write_quoted(f, bytes);
        }
        write!(f, "{}", symbol.name)?;
        if self.offset > 0 {
          write!(f, "+{}", self.offset)?;
        }
        if self.field_width > 0 {
          write!(f, "<{}:{}>", self.field_offset, self.field_width)?;
        }
        Ok(())
      }
    }
  }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
  let content = bytes.strip_suffix(&[0]).unwrap_or(bytes);
  write!(f, "\"")?;
  for &b in content {
    match b {
      b'\n' => write!(f, "\\n")?,
      b'\t' => write!(f, "\\t")?,
      b'\r' => write!(f, "\\r")?,
      b'\\' => write!(f, "\\\\")?,
      b'"' => write!(f, "\\\"")?,
      0x20..=0x7e => write!(f, "{}", b as char)?,
      _ => write!(f, "\\x{b:02x}")?,
    }
  }
  write!(f, "\"")
}

impl fmt::Display for UnaryOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let op = match self {
      UnaryOp::Minus => "-",
      UnaryOp::Not => "!",
      UnaryOp::BitNot => "~",
    };
    write!(f, "{op}")
  }
}

impl fmt::Display for BinaryOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let op = match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Rem => "%",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitXor => "^",
      BinaryOp::BitOr => "|",
      BinaryOp::Eq => "==",
      BinaryOp::Neq => "!=",
      BinaryOp::Less => "<",
      BinaryOp::LessEq => "<=",
      BinaryOp::More => ">",
      BinaryOp::MoreEq => ">=",
    };
    write!(f, "{op}")
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Identity(v) => write!(f, "{v}"),
      Expr::Unary { op, operand, .. } => write!(f, "{op}{operand}"),
      Expr::Binary { op, left, right, .. } => write!(f, "{left} {op} {right}"),
      Expr::Addr(v) => write!(f, "&{v}"),
      Expr::Call { func, args, .. } => {
        write!(f, "{func}(")?;
        for (i, arg) in args.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{arg}")?;
        }
        write!(f, ")")
      }
    }
  }
}

impl fmt::Display for Statement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Statement::Assign { target, value } => write!(f, "{target}:{} = {value}", target.ty),
      Statement::Discard(value) => write!(f, "{value}"),
      Statement::Return(None) => write!(f, "return"),
      Statement::Return(Some(value)) => write!(f, "return {value}"),
    }
  }
}

impl fmt::Display for Def {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}:", self.symbol.name)?;
    for stmt in &self.body.code {
      writeln!(f, "  {stmt}")?;
    }
    Ok(())
  }
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, def) in self.defs.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "{def}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbols::{Linkage, Symbol, SymbolKind};

  fn sym(name: &str, ty: Type) -> Rc<Symbol> {
    Rc::new(Symbol {
      name: name.into(),
      ty,
      linkage: Linkage::External,
      kind: SymbolKind::Definition,
    })
  }

  #[test]
  fn assign_converts_immediates() {
    let x = sym("x", Type::signed(1));
    let mut block = Block::new();
    eval_assign(
      &mut block,
      Var::direct(&x),
      Expr::Identity(Var::imm_int(300, Type::signed(4))),
    );
    assert_eq!(block.code[0].to_string(), "x:char = 44");
  }

  #[test]
  fn truncation_is_sign_aware() {
    assert_eq!(truncate(255, 1, true), -1);
    assert_eq!(truncate(255, 1, false), 255);
    assert_eq!(truncate(-1, 2, false), 65535);
    assert_eq!(truncate(5, 8, true), 5);
  }

  #[test]
  fn pool_recycles_blocks() {
    let mut pool = BlockPool::new();
    let mut block = pool.acquire();
    let x = sym("x", Type::signed(4));
    eval_assign(
      &mut block,
      Var::direct(&x),
      Expr::Identity(Var::imm_int(1, Type::signed(4))),
    );
    pool.release(block);
    let block = pool.acquire();
    assert!(block.code.is_empty());
    assert!(!block.has_init_value());
    pool.release(block);
    pool.finalize();
  }

  #[test]
  fn temps_are_numbered() {
    let f = sym("f", Type::function(Type::signed(4)));
    let mut def = Def::new(f);
    assert_eq!(def.temp(Type::signed(4)).to_string(), "%t0");
    assert_eq!(def.temp(Type::signed(4)).to_string(), "%t1");
  }

  #[test]
  fn display_forms() {
    let x = sym("x", Type::signed(4));
    let v = Var::direct(&x);
    assert_eq!(Expr::Addr(v.clone()).to_string(), "&x");
    let mut at = v.clone();
    at.offset = 8;
    assert_eq!(at.to_string(), "x+8");
    let mut bits = v;
    bits.field_offset = 3;
    bits.field_width = 5;
    assert_eq!(bits.to_string(), "x<3:5>");
  }
}
