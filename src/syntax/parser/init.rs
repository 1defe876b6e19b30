//! Initializer lowering.
//!
//! An initializer is flattened into one assignment per leaf object. The
//! walker emits assignments in the order the source names them, into a
//! scratch buffer rather than the caller's block; once the full list is
//! known it is re-sorted into layout order, duplicate writes from repeated
//! designators are dropped, and every unwritten hole is filled with zeros
//! so the object is covered end to end.

use std::rc::Rc;

use super::*;
use crate::ir::{Expr, Statement, Var, VarKind};
use crate::symbols::{Linkage, Symbol};
use crate::types::Type;

/// How the object currently being filled was entered. Decides whether a
/// bare `,` advances to the next sibling or returns control to the
/// enclosing level.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Nesting {
  /// An explicit brace level; commas advance through its elements, and
  /// designators at this level belong to it.
  Braced,
  /// Entered through a designator; only another designator continues the
  /// enclosing list.
  Designated,
  /// A nested object without braces of its own, filled from the enclosing
  /// element list.
  Unbraced,
}

impl<'src> Parser<'src> {
  /// Lower the initializer for `symbol`, appending the resulting
  /// assignments to `block` in layout order with padding interpolated.
  pub(super) fn initializer(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    symbol: &Rc<Symbol>,
  ) -> Result<()> {
    let start = self.current().span;
    let target = Var::direct(symbol);
    // arrays may be initialized from a string literal without braces
    if self.current().is(Brk_CurlyL) || symbol.ty.is_array() {
      let mut values = self.pool.acquire();
      let result = self.initialize_and_flush(def, block, &mut values, target, symbol, start);
      self.pool.release(values);
      result
    } else {
      let value = self.read_initializer_element(def, block, symbol)?;
      ir::eval_assign(block, target, value);
      debug_assert!(!block.has_init_value());
      Ok(())
    }
  }

  fn initialize_and_flush(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    symbol: &Rc<Symbol>,
    start: Span,
  ) -> Result<()> {
    self.initialize_object(def, block, values, target)?;
    let span = start.join(self.previous().span);
    postprocess(symbol, values, span)?;
    block.code.append(&mut values.code);
    debug_assert!(!block.has_init_value());
    Ok(())
  }

  /// One complete object, with or without braces.
  fn initialize_object(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
  ) -> Result<()> {
    if self.bump_if(Brk_CurlyL) {
      if target.ty.is_struct_or_union() {
        self.initialize_struct_or_union(def, block, values, target, Nesting::Braced)?;
      } else if target.ty.is_array() {
        self.initialize_array(def, block, values, target, Nesting::Braced)?;
      } else {
        let symbol = target.symbol().clone();
        let value = self.read_initializer_element(def, block, &symbol)?;
        ir::eval_assign(values, target, value);
      }
      self.bump_if(Tok_Comma);
      self.expect(Brk_CurlyR)?;
    } else if target.ty.is_array() {
      self.initialize_array(def, block, values, target, Nesting::Unbraced)?;
    } else {
      let symbol = target.symbol().clone();
      let value = self.read_initializer_element(def, block, &symbol)?;
      ir::eval_assign(values, target, value);
    }
    Ok(())
  }

  /// A nested sub-object reached during aggregate traversal. Scalar leaves
  /// may be wrapped in one redundant pair of braces.
  fn initialize_member(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    self.check_recursion_limit(self.current().span)?;
    if target.ty.is_struct_or_union() {
      if self.bump_if(Brk_CurlyL) {
        self.initialize_struct_or_union(def, block, values, target, Nesting::Braced)?;
        self.bump_if(Tok_Comma);
        self.expect(Brk_CurlyR)?;
      } else {
        self.initialize_struct_or_union(def, block, values, target, nesting)?;
      }
    } else if target.ty.is_array() {
      if self.bump_if(Brk_CurlyL) {
        self.initialize_array(def, block, values, target, Nesting::Braced)?;
        self.bump_if(Tok_Comma);
        self.expect(Brk_CurlyR)?;
      } else {
        self.initialize_array(def, block, values, target, nesting)?;
      }
    } else {
      let symbol = target.symbol().clone();
      if self.bump_if(Brk_CurlyL) {
        let value = self.read_initializer_element(def, block, &symbol)?;
        ir::eval_assign(values, target, value);
        self.bump_if(Tok_Comma);
        self.expect(Brk_CurlyR)?;
      } else {
        let value = self.read_initializer_element(def, block, &symbol)?;
        ir::eval_assign(values, target, value);
      }
    }
    Ok(())
  }

  /// Dispatch for a struct or union body, handling assignment of a whole
  /// aggregate from a compatible sibling object first.
  fn initialize_struct_or_union(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    if !block.has_init_value()
      && !matches!(
        self.current().kind,
        Op_Dot | Brk_CurlyL | Brk_SquareL
      )
    {
      let symbol = target.symbol().clone();
      let value = self.read_initializer_element(def, block, &symbol)?;
      if value.ty().compatible_unqualified(&target.ty) {
        ir::eval_assign(values, target, value);
        return Ok(());
      }
      // not the whole object; the first leaf below consumes it
      block.defer_init_value(value);
    }
    if target.ty.is_union() {
      self.initialize_union(def, block, values, target, nesting)
    } else {
      self.initialize_struct(def, block, values, target, nesting)
    }
  }

  fn initialize_struct(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    let members = target.ty.nmembers();
    let mut i = 0;
    let mut prev: Option<(usize, u16)> = None;
    loop {
      if !block.has_init_value() && self.current().is(Op_Dot) {
        self.bump();
        let (name, span) = self.ident()?;
        self.bump_if(Op_Equal);
        let Some((index, member)) = target.ty.find_member(&name) else {
          fail!(UnknownMember @ span, "`{}` has no member named `{name}`", target.ty);
        };
        i = index + 1;
        self.initialize_member(def, block, values, target.member(&member), Nesting::Designated)?;
        prev = Some((member.offset, member.field_offset));
      } else {
        // members of an anonymous union share storage with their first
        // sibling; only that sibling is initialized positionally
        let member = loop {
          if i >= members {
            return Ok(());
          }
          let member = target.ty.member(i).unwrap();
          if prev == Some((member.offset, member.field_offset)) {
            i += 1;
            continue;
          }
          break member;
        };
        i += 1;
        self.initialize_member(def, block, values, target.member(&member), Nesting::Unbraced)?;
        prev = Some((member.offset, member.field_offset));
      }
      if !self.next_element(nesting) {
        break;
      }
    }
    Ok(())
  }

  /// A union initializes exactly one member: the first by default, or the
  /// last designated one. Each iteration collects into its own scratch
  /// block so that an earlier member's writes can be discarded when a later
  /// designator takes over.
  fn initialize_union(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    let mut scratch = self.pool.acquire();
    let result = self.initialize_union_member(def, block, &mut scratch, target, nesting);
    if result.is_ok() {
      values.code.append(&mut scratch.code);
    } else {
      scratch.code.clear();
    }
    self.pool.release(scratch);
    result
  }

  fn initialize_union_member(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    scratch: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    let mut done = false;
    loop {
      let (member, entered) = if !block.has_init_value() && self.current().is(Op_Dot) {
        self.bump();
        let (name, span) = self.ident()?;
        self.bump_if(Op_Equal);
        match target.ty.find_member(&name) {
          Some((_, member)) => (member, Nesting::Designated),
          None => fail!(UnknownMember @ span, "`{}` has no member named `{name}`", target.ty),
        }
      } else if !done {
        match target.ty.member(0) {
          Some(member) => (member, Nesting::Unbraced),
          None => fail!(@self.current().span, "union has no members to initialize"),
        }
      } else {
        break;
      };
      scratch.code.clear();
      self.initialize_member(def, block, scratch, target.member(&member), entered)?;
      done = true;
      if !self.next_element(nesting) {
        break;
      }
    }
    Ok(())
  }

  fn initialize_array(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    values: &mut ir::Block,
    target: Var,
    nesting: Nesting,
  ) -> Result<()> {
    let symbol = target.symbol().clone();
    let element = target.ty.next().unwrap();

    // an array of char may be assigned a string literal wholesale; any
    // trailing bytes are zero-filled by the post-processor
    if !block.has_init_value()
      && !matches!(
        self.current().kind,
        Op_Dot | Brk_CurlyL | Brk_SquareL
      )
    {
      let value = self.read_initializer_element(def, block, &symbol)?;
      let literal = value
        .as_identity()
        .filter(|v| v.ty.is_array())
        .and_then(|v| match &v.kind {
          VarKind::Direct(s) if s.is_literal() => Some(v.clone()),
          _ => None,
        });
      match literal {
        Some(literal) if element.is_char() => {
          if target.ty.len().is_none() {
            target.ty.set_len(literal.ty.len().unwrap());
          }
          let store = target.with_type(literal.ty.clone());
          ir::eval_assign(values, store, value);
          return Ok(());
        }
        _ => block.defer_init_value(value),
      }
    }

    let width = element.size_of();
    if width == 0 {
      fail!(IncompleteType @ self.current().span, "array has incomplete element type `{element}`");
    }
    let count = target.ty.len();
    let initial = target.offset;
    let mut i: usize = 0;
    let mut c: usize = 0;
    loop {
      let mut entered = Nesting::Unbraced;
      if !block.has_init_value() && self.current().is(Brk_SquareL) {
        self.bump();
        let (index, span) = self.constant_expression()?;
        if index < 0 {
          fail!(@span, "array index in initializer is negative");
        }
        if let Some(n) = count {
          if index as usize >= n {
            fail!(@span, "array index in initializer exceeds array bounds");
          }
        }
        self.expect(Brk_SquareR)?;
        self.bump_if(Op_Equal);
        i = index as usize;
        entered = Nesting::Designated;
      }
      let mut at = target.with_type(element.clone());
      at.offset = initial + i * width;
      self.initialize_member(def, block, values, at, entered)?;
      i += 1;
      c = c.max(i);
      let mut designator = false;
      if !self.has_next_array_element(nesting, &mut designator) {
        break;
      }
      if let Some(n) = count {
        if !designator && c >= n {
          break;
        }
      }
      self.expect(Tok_Comma)?;
    }
    if count.is_none() {
      target.ty.set_len(c);
    }
    Ok(())
  }

  /// Read exactly one initializer element, or pick up the value a caller
  /// already parsed ahead. Static-storage initializers must be computable
  /// at load time; calls in automatic initializers are spilled to a
  /// temporary so that later reordering cannot change observable order.
  fn read_initializer_element(
    &mut self,
    def: &mut ir::Def,
    block: &mut ir::Block,
    symbol: &Rc<Symbol>,
  ) -> Result<Expr> {
    let start = self.current().span;
    let value = match block.take_init_value() {
      Some(value) => value,
      None => self.assignment_expression(def, block)?,
    };
    let span = start.join(self.previous().span);
    if value.ty().is_void() {
      fail!(VoidInitializer @ span, "initializer element has type `void`");
    }
    if symbol.linkage != Linkage::None {
      if !is_load_time_constant(&value) {
        fail!(NotConstant @ span, "initializer element is not computable at load time");
      }
      Ok(value)
    } else if value.is_call() {
      let temp = def.temp(value.ty());
      Ok(Expr::Identity(ir::eval_assign(block, temp, value)))
    } else {
      Ok(value)
    }
  }

  /// True iff a `,` continues the current element list: the token after it
  /// must not close the list, and a designator only continues a braced
  /// level. Consumes the comma when continuing.
  fn next_element(&mut self, nesting: Nesting) -> bool {
    if self.current().is(Tok_Comma)
      && !self.lookahead().is(Brk_CurlyR)
      && (nesting == Nesting::Braced || !self.lookahead().is(Op_Dot))
    {
      self.bump();
      return true;
    }
    false
  }

  /// Array variant of [`next_element`][Parser::next_element]: `[` after the
  /// comma continues only a braced level, and flags the next element as
  /// designated. Does not consume the comma.
  fn has_next_array_element(&self, nesting: Nesting, is_designator: &mut bool) -> bool {
    if !self.current().is(Tok_Comma) {
      return false;
    }
    if self.lookahead().is(Brk_SquareL) {
      if nesting == Nesting::Braced {
        *is_designator = true;
        return true;
      }
      return false;
    }
    !self.lookahead().is(Brk_CurlyR) && !self.lookahead().is(Op_Dot)
  }
}

fn is_load_time_constant(value: &Expr) -> bool {
  match value {
    Expr::Identity(v) => match &v.kind {
      VarKind::Immediate(_) => true,
      VarKind::Direct(_) => v.ty.is_array() || v.ty.is_function(),
    },
    Expr::Addr(v) => v.symbol().linkage != Linkage::None,
    _ => false,
  }
}

/// Write zero into the whole of `target`, decomposing aggregates and
/// preserving bit-field windows.
fn zero_initialize(values: &mut ir::Block, target: &Var, span: Span) -> Result<()> {
  if target.field_width > 0 || target.ty.is_scalar() {
    ir::eval_assign(
      values,
      target.clone(),
      Expr::Identity(Var::imm_int(0, Type::signed(4))),
    );
    return Ok(());
  }
  if target.ty.is_array() {
    let element = target.ty.next().unwrap();
    let width = element.size_of();
    let Some(len) = target.ty.len() else {
      fail!(ZeroInit @ span, "cannot zero-initialize object of type `{}`", target.ty);
    };
    for i in 0..len {
      let mut at = target.with_type(element.clone());
      at.offset = target.offset + i * width;
      zero_initialize(values, &at, span)?;
    }
    return Ok(());
  }
  if target.ty.is_struct_or_union() {
    let size = target.ty.size_of();
    let cast = if size % 8 == 0 {
      Type::array(Type::signed(8), Some(size / 8))
    } else {
      Type::array(Type::signed(1), Some(size))
    };
    return zero_initialize(values, &target.with_type(cast), span);
  }
  fail!(ZeroInit @ span, "cannot zero-initialize object of type `{}`", target.ty)
}

/// Zero `n` bytes starting at `target`, greedily using the widest scalar
/// store that both fits the remaining range and keeps the offset aligned.
fn zero_initialize_bytes(values: &mut ir::Block, target: &Var, n: usize) {
  let mut at = target.with_type(target.ty.clone());
  let mut n = n;
  while n > 0 {
    let mut size = 8;
    while size > n || at.offset % size != 0 {
      size >>= 1;
    }
    at.ty = Type::signed(size);
    ir::eval_assign(
      values,
      at.clone(),
      Expr::Identity(Var::imm_int(0, Type::signed(size))),
    );
    at.offset += size;
    n -= size;
  }
}

/// Rewrite the raw assignment list for one object into layout order with
/// every hole zero-filled: sort, drop shadowed duplicates, then interpolate
/// padding between and after the surviving entries.
fn postprocess(symbol: &Rc<Symbol>, values: &mut ir::Block, span: Span) -> Result<()> {
  sort_and_dedup(&mut values.code);
  interpolate_padding(symbol, values, span)?;
  if cfg!(debug_assertions) {
    validate(&values.code, symbol.ty.size_of());
  }
  Ok(())
}

fn entry(stmt: &Statement) -> &Var {
  match stmt {
    Statement::Assign { target, .. } => target,
    _ => unreachable!("values buffer holds only assignments"),
  }
}

fn entry_key(stmt: &Statement) -> (usize, u16) {
  let target = entry(stmt);
  (target.offset, target.field_offset)
}

/// Stable insertion sort on `(offset, field_offset)`. When two writes land
/// on the same leaf, the one written later in the source wins, matching
/// designator overwrite semantics.
fn sort_and_dedup(code: &mut Vec<Statement>) {
  let mut i = 1;
  while i < code.len() {
    let mut j = i;
    while j > 0 && entry_key(&code[j - 1]) > entry_key(&code[j]) {
      code.swap(j - 1, j);
      j -= 1;
    }
    if j > 0 && entry_key(&code[j - 1]) == entry_key(&code[j]) {
      debug_assert_eq!(
        entry(&code[j - 1]).field_width,
        entry(&code[j]).field_width
      );
      code.remove(j - 1);
    } else {
      i += 1;
    }
  }
}

fn interpolate_padding(symbol: &Rc<Symbol>, values: &mut ir::Block, span: Span) -> Result<()> {
  let total = symbol.ty.size_of();
  let code = std::mem::take(&mut values.code);
  let root = Var::direct(symbol);

  let mut offset = 0usize;
  // bit cursor and unit size of the bit-field run currently open at `offset`
  let mut bits = 0u16;
  let mut unit = 0usize;

  for stmt in code {
    let target = entry(&stmt).clone();
    if offset < target.offset && bits > 0 {
      // close the open unit before moving on
      let window = bit_window(&root, offset, Type::signed(unit), bits, unit as u16 * 8 - bits);
      zero_initialize(values, &window, span)?;
      offset += unit;
      bits = 0;
      unit = 0;
    }
    if target.offset < offset {
      fail!(@span, "initializer writes overlap");
    }
    if offset < target.offset {
      let mut at = root.clone();
      at.offset = offset;
      zero_initialize_bytes(values, &at, target.offset - offset);
      offset = target.offset;
    }
    if target.field_width > 0 {
      if target.field_offset < bits {
        fail!(@span, "initializer writes overlap");
      }
      if bits < target.field_offset {
        let window = bit_window(&root, offset, target.ty.clone(), bits, target.field_offset - bits);
        zero_initialize(values, &window, span)?;
      }
      unit = unit.max(target.ty.size_of());
      bits = target.field_offset + target.field_width;
      values.code.push(stmt);
      if usize::from(bits) == unit * 8 {
        offset += unit;
        bits = 0;
        unit = 0;
      }
    } else {
      if bits > 0 {
        fail!(@span, "initializer writes overlap");
      }
      offset = target.offset + target.ty.size_of();
      values.code.push(stmt);
    }
  }

  if bits > 0 {
    let window = bit_window(&root, offset, Type::signed(unit), bits, unit as u16 * 8 - bits);
    zero_initialize(values, &window, span)?;
    offset += unit;
  }
  if offset < total {
    let mut at = root.clone();
    at.offset = offset;
    zero_initialize_bytes(values, &at, total - offset);
  }
  Ok(())
}

fn bit_window(root: &Var, offset: usize, ty: Type, field_offset: u16, field_width: u16) -> Var {
  let mut window = root.with_type(ty);
  window.offset = offset;
  window.field_offset = field_offset;
  window.field_width = field_width;
  window
}

/// Every byte of the object must be written exactly once, counting a
/// bit-field unit as one coverage event, and offsets must be contiguous.
fn validate(code: &[Statement], total: usize) {
  for pair in code.windows(2) {
    let (a, b) = (entry(&pair[0]), entry(&pair[1]));
    if a.field_width > 0 && b.field_width > 0 && a.offset == b.offset {
      assert_eq!(a.field_offset + a.field_width, b.field_offset);
    } else {
      assert_eq!(a.offset + a.ty.size_of(), b.offset);
    }
  }
  if let Some(first) = code.first() {
    assert_eq!(entry(first).offset, 0);
  }
  if let Some(last) = code.last() {
    let t = entry(last);
    assert_eq!(t.offset + t.ty.size_of(), total);
  }
}
