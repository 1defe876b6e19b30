use std::rc::Rc;

use super::*;
use crate::ir::{Def, Statement};
use crate::symbols::{Linkage, Symbol, SymbolKind};
use crate::types::{RecordBuilder, Type};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Storage {
  Default,
  Static,
  Extern,
}

impl<'src> Parser<'src> {
  pub(super) fn translation_unit(&mut self) -> Result<ir::Program> {
    let mut defs = Vec::new();
    while !self.current().is(Tok_Eof) {
      self.external_declaration(&mut defs)?;
    }
    self.pool.finalize();
    Ok(ir::Program { defs })
  }

  fn external_declaration(&mut self, defs: &mut Vec<Def>) -> Result<()> {
    let (base, storage) = self.declaration_specifiers()?;
    // a bare specifier declares a tag and nothing else
    if self.bump_if(Tok_Semicolon) {
      return Ok(());
    }
    let linkage = if storage == Storage::Static {
      Linkage::Internal
    } else {
      Linkage::External
    };
    loop {
      let (name, span, ty) = self.declarator(base.clone())?;
      if ty.is_function() && self.current().is(Brk_CurlyL) {
        let symbol = self.declare(name, span, ty, linkage)?;
        let mut def = Def::new(symbol);
        self.function_body(&mut def, defs)?;
        defs.push(def);
        return Ok(());
      }
      let symbol = self.declare(name, span, ty, linkage)?;
      if self.bump_if(Op_Equal) {
        let mut def = Def::new(symbol.clone());
        let mut block = ir::Block::new();
        self.initializer(&mut def, &mut block, &symbol)?;
        def.body = block;
        defs.push(def);
      }
      if !self.bump_if(Tok_Comma) {
        break;
      }
    }
    self.expect(Tok_Semicolon)
  }

  fn declare(
    &mut self,
    name: String,
    span: Span,
    ty: Type,
    linkage: Linkage,
  ) -> Result<Rc<Symbol>> {
    if let Some(existing) = self.symbols.lookup_current(&name) {
      if existing.ty.compatible_unqualified(&ty) {
        return Ok(existing);
      }
      fail!(@span, "conflicting types for `{name}`");
    }
    Ok(self.symbols.insert(Symbol {
      name,
      ty,
      linkage,
      kind: SymbolKind::Definition,
    }))
  }

  fn declaration_specifiers(&mut self) -> Result<(Type, Storage)> {
    let start = self.current().span;
    let mut storage = Storage::Default;
    let mut record: Option<Type> = None;
    let mut void = false;
    let mut char_ = false;
    let mut short_ = false;
    let mut long_ = false;
    let mut float_ = false;
    let mut double_ = false;
    let mut signed_ = false;
    let mut unsigned_ = false;
    let mut seen = false;

    loop {
      match self.current().kind {
        Kw_Static => {
          self.bump();
          storage = Storage::Static;
        }
        Kw_Extern => {
          self.bump();
          storage = Storage::Extern;
        }
        // qualifiers do not affect lowering and are discarded
        Kw_Const | Kw_Volatile => {
          self.bump();
        }
        Kw_Void => {
          self.bump();
          void = true;
          seen = true;
        }
        Kw_Char => {
          self.bump();
          char_ = true;
          seen = true;
        }
        Kw_Short => {
          self.bump();
          short_ = true;
          seen = true;
        }
        Kw_Int => {
          self.bump();
          seen = true;
        }
        Kw_Long => {
          self.bump();
          long_ = true;
          seen = true;
        }
        Kw_Float => {
          self.bump();
          float_ = true;
          seen = true;
        }
        Kw_Double => {
          self.bump();
          double_ = true;
          seen = true;
        }
        Kw_Signed => {
          self.bump();
          signed_ = true;
          seen = true;
        }
        Kw_Unsigned => {
          self.bump();
          unsigned_ = true;
          seen = true;
        }
        Kw_Struct => {
          self.bump();
          record = Some(self.record_specifier(false)?);
          seen = true;
        }
        Kw_Union => {
          self.bump();
          record = Some(self.record_specifier(true)?);
          seen = true;
        }
        _ => break,
      }
    }

    if !seen {
      fail!(@start.join(self.current().span), "expected a type specifier");
    }
    let _ = signed_;

    let ty = if let Some(record) = record {
      record
    } else if void {
      Type::void()
    } else if float_ {
      Type::float(4)
    } else if double_ {
      Type::float(8)
    } else {
      let size = if char_ {
        1
      } else if short_ {
        2
      } else if long_ {
        8
      } else {
        4
      };
      if unsigned_ {
        Type::unsigned(size)
      } else {
        Type::signed(size)
      }
    };
    Ok((ty, storage))
  }

  fn record_specifier(&mut self, union_: bool) -> Result<Type> {
    let tag = if self.current().is(Lit_Ident) {
      Some(self.ident()?)
    } else {
      None
    };

    if self.bump_if(Brk_CurlyL) {
      let mut builder = RecordBuilder::new(union_, tag.as_ref().map(|(name, _)| name.clone()));
      if self.current().is(Brk_CurlyR) {
        fail!(@self.current().span, "expected a member declaration");
      }
      while !self.bump_if(Brk_CurlyR) {
        self.record_member(&mut builder)?;
      }
      let record = builder.finish();
      let ty = if union_ {
        Type::union(record)
      } else {
        Type::struct_(record)
      };
      if let Some((name, _)) = &tag {
        self.symbols.insert_tag(name, ty.clone());
      }
      return Ok(ty);
    }

    let Some((name, span)) = tag else {
      fail!(@self.current().span, "expected a tag or a member list");
    };
    match self.symbols.lookup_tag(&name) {
      Some(ty) if ty.is_union() == union_ => Ok(ty),
      Some(_) => fail!(@span, "`{name}` declared as the wrong kind of tag"),
      None => fail!(@span, "use of undeclared tag `{name}`"),
    }
  }

  fn record_member(&mut self, builder: &mut RecordBuilder) -> Result<()> {
    let (base, _) = self.declaration_specifiers()?;

    // an unnamed struct/union member is flattened into the parent
    if self.current().is(Tok_Semicolon) && base.is_struct_or_union() {
      self.bump();
      builder.member(None, base);
      return Ok(());
    }

    loop {
      if self.bump_if(Tok_Colon) {
        // unnamed bit-field, participates in layout only
        let (width, span) = self.constant_expression()?;
        let width = bit_width(&base, width, span)?;
        builder.bit_field(None, base.clone(), width);
      } else {
        let (name, span, ty) = self.declarator(base.clone())?;
        if self.bump_if(Tok_Colon) {
          let (width, wspan) = self.constant_expression()?;
          let width = bit_width(&ty, width, wspan)?;
          if width == 0 {
            fail!(@wspan, "zero width for named bit-field `{name}`");
          }
          builder.bit_field(Some(&name), ty, width);
        } else {
          if ty.size_of() == 0 {
            fail!(IncompleteType @ span, "member `{name}` has incomplete type `{ty}`");
          }
          builder.member(Some(&name), ty);
        }
      }
      if !self.bump_if(Tok_Comma) {
        break;
      }
    }
    self.expect(Tok_Semicolon)
  }

  fn declarator(&mut self, base: Type) -> Result<(String, Span, Type)> {
    let mut ty = base;
    while self.bump_if(Op_Star) {
      while self.bump_if(Kw_Const) || self.bump_if(Kw_Volatile) {}
      ty = Type::pointer(ty);
    }
    let (name, span) = self.ident()?;

    if self.bump_if(Brk_ParenL) {
      self.parameter_list()?;
      self.expect(Brk_ParenR)?;
      return Ok((name, span, Type::function(ty)));
    }

    // array dimensions, outermost first; only the outermost may be open
    let mut dims = Vec::new();
    while self.bump_if(Brk_SquareL) {
      if self.bump_if(Brk_SquareR) {
        if !dims.is_empty() {
          fail!(IncompleteType @ self.previous().span, "array has incomplete element type");
        }
        dims.push(None);
      } else {
        let (n, nspan) = self.constant_expression()?;
        if n <= 0 {
          fail!(@nspan, "array size must be positive");
        }
        self.expect(Brk_SquareR)?;
        dims.push(Some(n as usize));
      }
    }
    for dim in dims.into_iter().rev() {
      ty = Type::array(ty, dim);
    }
    Ok((name, span, ty))
  }

  /// Parameter lists are parsed for form only; parameter names and types
  /// are not recorded in this subset.
  fn parameter_list(&mut self) -> Result<()> {
    if self.current().is(Brk_ParenR) {
      return Ok(());
    }
    if self.current().is(Kw_Void) && self.lookahead().is(Brk_ParenR) {
      self.bump();
      return Ok(());
    }
    loop {
      let (mut base, _) = self.declaration_specifiers()?;
      while self.bump_if(Op_Star) {
        base = Type::pointer(base);
      }
      let _ = base;
      if self.current().is(Lit_Ident) {
        self.bump();
      }
      while self.bump_if(Brk_SquareL) {
        if !self.current().is(Brk_SquareR) {
          let _ = self.constant_expression()?;
        }
        self.expect(Brk_SquareR)?;
      }
      if !self.bump_if(Tok_Comma) {
        break;
      }
    }
    Ok(())
  }

  fn function_body(&mut self, def: &mut Def, defs: &mut Vec<Def>) -> Result<()> {
    self.expect(Brk_CurlyL)?;
    self.symbols.enter_scope();
    let mut block = ir::Block::new();
    while !self.bump_if(Brk_CurlyR) {
      self.block_item(def, &mut block, defs)?;
    }
    self.symbols.leave_scope();
    def.body = block;
    Ok(())
  }

  fn block_item(
    &mut self,
    def: &mut Def,
    block: &mut ir::Block,
    defs: &mut Vec<Def>,
  ) -> Result<()> {
    if self.starts_declaration() {
      return self.local_declaration(def, block, defs);
    }
    if self.bump_if(Kw_Return) {
      let value = if self.current().is(Tok_Semicolon) {
        None
      } else {
        Some(self.assignment_expression(def, block)?)
      };
      block.code.push(Statement::Return(value));
      return self.expect(Tok_Semicolon);
    }
    if self.bump_if(Tok_Semicolon) {
      return Ok(());
    }
    let value = self.assignment_expression(def, block)?;
    // plain assignments have already been emitted; anything else with a
    // side effect is kept as a discarded value
    if !matches!(value, ir::Expr::Identity(_)) {
      block.code.push(Statement::Discard(value));
    }
    self.expect(Tok_Semicolon)
  }

  fn starts_declaration(&self) -> bool {
    matches!(
      self.current().kind,
      Kw_Void
        | Kw_Char
        | Kw_Short
        | Kw_Int
        | Kw_Long
        | Kw_Signed
        | Kw_Unsigned
        | Kw_Float
        | Kw_Double
        | Kw_Struct
        | Kw_Union
        | Kw_Const
        | Kw_Volatile
        | Kw_Static
        | Kw_Extern
    )
  }

  fn local_declaration(
    &mut self,
    def: &mut Def,
    block: &mut ir::Block,
    defs: &mut Vec<Def>,
  ) -> Result<()> {
    let (base, storage) = self.declaration_specifiers()?;
    if self.bump_if(Tok_Semicolon) {
      return Ok(());
    }
    let linkage = match storage {
      Storage::Static => Linkage::Internal,
      Storage::Extern => Linkage::External,
      Storage::Default => Linkage::None,
    };
    loop {
      let (name, span, ty) = self.declarator(base.clone())?;
      let symbol = self.declare(name, span, ty, linkage)?;
      if self.bump_if(Op_Equal) {
        if symbol.linkage == Linkage::None {
          self.initializer(def, block, &symbol)?;
        } else {
          // statics are their own load-time definition, not function code
          let mut ldef = Def::new(symbol.clone());
          let mut lblock = ir::Block::new();
          self.initializer(&mut ldef, &mut lblock, &symbol)?;
          ldef.body = lblock;
          defs.push(ldef);
        }
      }
      if !self.bump_if(Tok_Comma) {
        break;
      }
    }
    self.expect(Tok_Semicolon)
  }
}

fn bit_width(ty: &Type, width: i64, span: Span) -> Result<u16> {
  if !ty.is_integer() {
    fail!(@span, "bit-field has non-integer type `{ty}`");
  }
  if width < 0 || width as usize > ty.size_of() * 8 {
    fail!(@span, "bit-field width out of range");
  }
  Ok(width as u16)
}
