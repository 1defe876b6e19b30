#![allow(non_camel_case_types)]

use std::borrow::Borrow;
use std::fmt;
use std::mem::discriminant;
use std::ops::Range;

use logos::Logos;

use span::Span;

#[derive(Clone, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
}

impl Token {
  pub fn is(&self, kind: impl Borrow<TokenKind>) -> bool {
    discriminant(&self.kind) == discriminant(kind.borrow())
  }
}

/// Token cursor with one token of lookahead past `current`.
///
/// Two tokens of lookahead are needed because initializer continuation is
/// decided from `,` plus the token after it.
#[derive(Clone)]
pub struct Lexer<'src> {
  src: &'src str,
  inner: logos::Lexer<'src, TokenKind>,
  previous: Token,
  current: Token,
  lookahead: Token,
  eof: Token,
}

impl<'src> Lexer<'src> {
  pub fn new(src: &'src str) -> Self {
    let end = src.len();
    let eof = Token {
      span: (end..end).into(),
      kind: TokenKind::Tok_Eof,
    };

    let mut lex = Self {
      src,
      inner: TokenKind::lexer(src),
      previous: eof.clone(),
      current: eof.clone(),
      lookahead: eof.clone(),
      eof,
    };
    // prime `current` and `lookahead`
    lex.bump();
    lex.bump();
    lex.previous = lex.eof.clone();

    lex
  }

  #[inline]
  pub fn previous(&self) -> &Token {
    &self.previous
  }

  #[inline]
  pub fn current(&self) -> &Token {
    &self.current
  }

  /// The token after `current`, without consuming anything.
  #[inline]
  pub fn lookahead(&self) -> &Token {
    &self.lookahead
  }

  #[inline]
  pub fn lexeme(&self, token: &Token) -> &'src str {
    &self.src[Range::from(token.span)]
  }

  #[inline]
  pub fn bump(&mut self) {
    std::mem::swap(&mut self.previous, &mut self.current);
    std::mem::swap(&mut self.current, &mut self.lookahead);
    self.lookahead = self.next_token().unwrap_or_else(|| self.eof.clone());
  }

  fn next_token(&mut self) -> Option<Token> {
    let lexer = &mut self.inner;
    lexer.next().map(|kind| Token {
      kind,
      span: lexer.span().into(),
    })
  }
}

#[derive(Clone, Copy, Debug, Logos, PartialEq)]
pub enum TokenKind {
  // Keywords
  #[token("void")]
  Kw_Void,
  #[token("char")]
  Kw_Char,
  #[token("short")]
  Kw_Short,
  #[token("int")]
  Kw_Int,
  #[token("long")]
  Kw_Long,
  #[token("signed")]
  Kw_Signed,
  #[token("unsigned")]
  Kw_Unsigned,
  #[token("float")]
  Kw_Float,
  #[token("double")]
  Kw_Double,
  #[token("struct")]
  Kw_Struct,
  #[token("union")]
  Kw_Union,
  #[token("const")]
  Kw_Const,
  #[token("volatile")]
  Kw_Volatile,
  #[token("static")]
  Kw_Static,
  #[token("extern")]
  Kw_Extern,
  #[token("return")]
  Kw_Return,

  // Brackets
  #[token("{")]
  Brk_CurlyL,
  #[token("}")]
  Brk_CurlyR,
  #[token("[")]
  Brk_SquareL,
  #[token("]")]
  Brk_SquareR,
  #[token("(")]
  Brk_ParenL,
  #[token(")")]
  Brk_ParenR,

  // Punctuation
  #[token(",")]
  Tok_Comma,
  #[token(";")]
  Tok_Semicolon,
  #[token(":")]
  Tok_Colon,

  // Operators
  #[token(".")]
  Op_Dot,
  #[token("=")]
  Op_Equal,
  #[token("==")]
  Op_EqualEqual,
  #[token("!")]
  Op_Bang,
  #[token("!=")]
  Op_BangEqual,
  #[token("&")]
  Op_And,
  #[token("|")]
  Op_Pipe,
  #[token("^")]
  Op_Caret,
  #[token("~")]
  Op_Tilde,
  #[token("*")]
  Op_Star,
  #[token("/")]
  Op_Slash,
  #[token("%")]
  Op_Percent,
  #[token("+")]
  Op_Plus,
  #[token("-")]
  Op_Minus,
  #[token("<")]
  Op_Less,
  #[token("<=")]
  Op_LessEqual,
  #[token(">")]
  Op_More,
  #[token(">=")]
  Op_MoreEqual,
  #[token("<<")]
  Op_LessLess,
  #[token(">>")]
  Op_MoreMore,

  // Literals
  #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
  Lit_Ident,
  #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*|0[0-7]*[uUlL]*|[1-9][0-9]*[uUlL]*")]
  Lit_Int,
  #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fF]?|\.[0-9]+([eE][+-]?[0-9]+)?[fF]?|[0-9]+[eE][+-]?[0-9]+[fF]?")]
  Lit_Float,
  #[regex(r"'(\\.|[^\\'\n])+'")]
  Lit_Char,
  #[regex(r#""(\\.|[^\\"\n])*""#)]
  Lit_String,

  #[error]
  #[regex(r"[ \t\n\r\f]+", logos::skip)]
  #[regex(r"//[^\n]*", logos::skip)]
  #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
  Tok_Error,

  Tok_Eof,
}

impl TokenKind {
  pub fn name(&self) -> &'static str {
    match self {
      TokenKind::Kw_Void => "void",
      TokenKind::Kw_Char => "char",
      TokenKind::Kw_Short => "short",
      TokenKind::Kw_Int => "int",
      TokenKind::Kw_Long => "long",
      TokenKind::Kw_Signed => "signed",
      TokenKind::Kw_Unsigned => "unsigned",
      TokenKind::Kw_Float => "float",
      TokenKind::Kw_Double => "double",
      TokenKind::Kw_Struct => "struct",
      TokenKind::Kw_Union => "union",
      TokenKind::Kw_Const => "const",
      TokenKind::Kw_Volatile => "volatile",
      TokenKind::Kw_Static => "static",
      TokenKind::Kw_Extern => "extern",
      TokenKind::Kw_Return => "return",
      TokenKind::Brk_CurlyL => "{",
      TokenKind::Brk_CurlyR => "}",
      TokenKind::Brk_SquareL => "[",
      TokenKind::Brk_SquareR => "]",
      TokenKind::Brk_ParenL => "(",
      TokenKind::Brk_ParenR => ")",
      TokenKind::Tok_Comma => ",",
      TokenKind::Tok_Semicolon => ";",
      TokenKind::Tok_Colon => ":",
      TokenKind::Op_Dot => ".",
      TokenKind::Op_Equal => "=",
      TokenKind::Op_EqualEqual => "==",
      TokenKind::Op_Bang => "!",
      TokenKind::Op_BangEqual => "!=",
      TokenKind::Op_And => "&",
      TokenKind::Op_Pipe => "|",
      TokenKind::Op_Caret => "^",
      TokenKind::Op_Tilde => "~",
      TokenKind::Op_Star => "*",
      TokenKind::Op_Slash => "/",
      TokenKind::Op_Percent => "%",
      TokenKind::Op_Plus => "+",
      TokenKind::Op_Minus => "-",
      TokenKind::Op_Less => "<",
      TokenKind::Op_LessEqual => "<=",
      TokenKind::Op_More => ">",
      TokenKind::Op_MoreEqual => ">=",
      TokenKind::Op_LessLess => "<<",
      TokenKind::Op_MoreMore => ">>",
      TokenKind::Lit_Ident => "identifier",
      TokenKind::Lit_Int => "integer",
      TokenKind::Lit_Float => "float literal",
      TokenKind::Lit_Char => "character",
      TokenKind::Lit_String => "string",
      TokenKind::Tok_Error => "error",
      TokenKind::Tok_Eof => "eof",
    }
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::TokenKind::*;
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    let mut lex = Lexer::new(src);
    let mut out = vec![];
    while !lex.current().is(Tok_Eof) {
      out.push(lex.current().kind);
      lex.bump();
    }
    out
  }

  #[test]
  fn declaration_tokens() {
    assert_eq!(
      kinds("int a[4] = {1, 2};"),
      vec![
        Kw_Int,
        Lit_Ident,
        Brk_SquareL,
        Lit_Int,
        Brk_SquareR,
        Op_Equal,
        Brk_CurlyL,
        Lit_Int,
        Tok_Comma,
        Lit_Int,
        Brk_CurlyR,
        Tok_Semicolon
      ]
    );
  }

  #[test]
  fn designators_and_strings() {
    assert_eq!(
      kinds(r#"{.x = 1, [2] = "hi"}"#),
      vec![
        Brk_CurlyL,
        Op_Dot,
        Lit_Ident,
        Op_Equal,
        Lit_Int,
        Tok_Comma,
        Brk_SquareL,
        Lit_Int,
        Brk_SquareR,
        Op_Equal,
        Lit_String,
        Brk_CurlyR
      ]
    );
  }

  #[test]
  fn comments_are_skipped() {
    assert_eq!(
      kinds("int /* block */ x; // line"),
      vec![Kw_Int, Lit_Ident, Tok_Semicolon]
    );
  }

  #[test]
  fn two_token_lookahead() {
    let mut lex = Lexer::new(", }");
    assert!(lex.current().is(Tok_Comma));
    assert!(lex.lookahead().is(Brk_CurlyR));
    lex.bump();
    assert!(lex.previous().is(Tok_Comma));
    assert!(lex.current().is(Brk_CurlyR));
    assert!(lex.lookahead().is(Tok_Eof));
  }

  #[test]
  fn zero_is_an_integer() {
    assert_eq!(kinds("0"), vec![Lit_Int]);
    assert_eq!(kinds("0x1f 017 10uL"), vec![Lit_Int, Lit_Int, Lit_Int]);
  }
}
