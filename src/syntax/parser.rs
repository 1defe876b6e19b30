#![deny(unused_must_use)]

use span::Span;

use super::lexer::TokenKind::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{Error, Result};
use crate::ir;
use crate::symbols::SymbolTable;

pub fn parse(src: &str) -> Result<ir::Program> {
  let lexer = Lexer::new(src);
  let mut parser = Parser::new(lexer);
  parser.translation_unit()
}

struct Parser<'src> {
  lex: Lexer<'src>,
  symbols: SymbolTable,
  pool: ir::BlockPool,
}

impl<'src> Parser<'src> {
  fn new(lex: Lexer<'src>) -> Self {
    Self {
      lex,
      symbols: SymbolTable::new(),
      pool: ir::BlockPool::new(),
    }
  }

  #[inline]
  fn previous(&self) -> &Token {
    self.lex.previous()
  }

  #[inline]
  fn current(&self) -> &Token {
    self.lex.current()
  }

  #[inline]
  fn lookahead(&self) -> &Token {
    self.lex.lookahead()
  }

  #[inline]
  fn expect(&mut self, kind: TokenKind) -> Result<()> {
    if self.bump_if(kind) {
      Ok(())
    } else if self.current().is(Tok_Error) {
      Err(Error::syntax(
        format!("invalid token `{}`", self.lex.lexeme(self.current())),
        self.current().span,
      ))
    } else {
      Err(Error::syntax(
        format!("expected `{}`", kind.name()),
        self.current().span,
      ))
    }
  }

  #[inline]
  fn bump_if(&mut self, kind: TokenKind) -> bool {
    if self.current().is(kind) {
      self.bump();
      true
    } else {
      false
    }
  }

  /// Move forward by one token, returning the previous one.
  #[inline]
  fn bump(&mut self) -> &Token {
    self.lex.bump();
    self.previous()
  }

  fn ident(&mut self) -> Result<(String, Span)> {
    self.expect(Lit_Ident)?;
    let token = self.previous();
    Ok((self.lex.lexeme(token).to_string(), token.span))
  }
}

impl<'src> Parser<'src> {
  // A single parse_XXX() method consumes a few hundred bytes of stack, and
  // initializers recurse once per brace level. Assuming ~50 recursive calls
  // per dive and 700 bytes of stack space per call, a dive requires about
  // 35k bytes of stack. Rounded up to 64k for future proofing.
  const MINIMUM_STACK_REQUIRED: usize = 64_000;

  // On WASM, remaining_stack() will always return None. Stack overflow
  // panics are converted to exceptions and handled by the host.
  #[cfg(any(target_family = "wasm", not(feature = "check-recursion-limit")))]
  fn check_recursion_limit(&self, _span: Span) -> Result<()> {
    Ok(())
  }

  #[cfg(all(not(target_family = "wasm"), feature = "check-recursion-limit"))]
  fn check_recursion_limit(&self, span: Span) -> Result<()> {
    if stacker::remaining_stack()
      .map(|available| available > Self::MINIMUM_STACK_REQUIRED)
      .unwrap_or(true)
    {
      Ok(())
    } else {
      Err(Error::syntax("nesting limit reached", span))
    }
  }
}

mod decl;
mod expr;
mod init;
