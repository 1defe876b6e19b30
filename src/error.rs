use beef::lean::Cow;
use span::Span;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// What a front-end error is about.
///
/// Every error is fatal to the translation unit and there is no
/// recovery; the kind exists so callers and tests can tell the
/// initializer-specific failures apart from plain parse errors without
/// matching on message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// Malformed or unexpected input.
  Syntax,
  /// An initializer element of type `void`.
  VoidInitializer,
  /// A static-storage initializer that is not computable at load time.
  NotConstant,
  /// A designator naming a member the record does not have.
  UnknownMember,
  /// A constant expression that did not fold to an integer.
  NotInteger,
  /// An object of incomplete type where a sized object was required.
  IncompleteType,
  /// A zero-fill request against a type that cannot be zeroed.
  ZeroInit,
}

#[derive(Clone, Debug)]
pub struct Error {
  pub kind: ErrorKind,
  pub message: Cow<'static, str>,
  pub span: Span,
}

impl Error {
  pub fn new(
    kind: ErrorKind,
    message: impl Into<Cow<'static, str>>,
    span: impl Into<Span>,
  ) -> Self {
    let message = message.into();
    let span = span.into();
    Error {
      kind,
      message,
      span,
    }
  }

  pub fn syntax(message: impl Into<Cow<'static, str>>, span: impl Into<Span>) -> Self {
    Error::new(ErrorKind::Syntax, message, span)
  }

  /// Render the error against the source it was raised for.
  pub fn report(&self, src: &str) -> String {
    diag::Report::error(src, format!("{self}"), self.span)
      .emit_to_string()
      .unwrap()
  }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}
