//! Error reporting
//!
//! The entrypoint to this module is [Report][`crate::Report`].
//!
//! Every diagnostic this front-end raises is a fatal error, so there is
//! no severity ladder. A report renders the way C compilers print
//! errors: an `error:` line, the `file:line:column` location, the
//! offending source line, and a caret underline.

use std::fmt;
use std::fmt::Write;

use beef::lean::Cow;
use owo_colors as colors;
use span::Span;
use thiserror::Error;

use crate::snippet::Snippet;
use crate::style;

/// A single fatal error, renderable to anything which implements
/// [`fmt::Write`].
pub struct Report<'a> {
  src: &'a str,
  file: Option<Cow<'a, str>>,
  message: Cow<'a, str>,
  span: Span,
  label: Option<Cow<'a, str>>,
  color: bool,
}

impl<'a> Report<'a> {
  /// An error report for `span` within `src`.
  pub fn error(
    src: &'a str,
    message: impl Into<Cow<'a, str>>,
    span: impl Into<Span>,
  ) -> Report<'a> {
    Report {
      src,
      file: None,
      message: message.into(),
      span: span.into(),
      label: None,
      color: true,
    }
  }

  /// Name the translation unit; unnamed sources render as `<source>`.
  pub fn file(mut self, name: impl Into<Cow<'a, str>>) -> Self {
    self.file = Some(name.into());
    self
  }

  /// A secondary note, rendered under the underline.
  pub fn label(mut self, label: impl Into<Cow<'a, str>>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn color(mut self, enabled: bool) -> Self {
    self.color = enabled;
    self
  }

  /// Emit the report to `w`.
  pub fn emit<W: Write>(self, w: &mut W) -> Result<(), EmitError> {
    // error: expected `;`
    //  --> main.c:2:9
    //   int y = z
    //           ^~
    //   = some label

    if self.src.len() < self.span.end {
      return Err(EmitError::OutOfBounds);
    }

    let style = style::Style {
      enabled: self.color,
      underline: colors::style().red().bold(),
      severity: colors::style().red().bold(),
      location: colors::style().bold(),
    };

    // error: {message}
    writeln!(w, "{}: {}", style.severity("error"), self.message)?;

    let snippet = Snippet::new(self.src, self.span);

    //  --> {file}:{line}:{column}
    writeln!(
      w,
      " --> {}",
      style.location(format!(
        "{}:{}",
        self.file.as_deref().unwrap_or("<source>"),
        snippet.location
      ))
    )?;

    //   {line}
    writeln!(w, "  {}", snippet.line)?;

    //   {padding}{carets}
    let pad = snippet.line[..snippet.start.min(snippet.line.len())]
      .chars()
      .count();
    let width = snippet.end - snippet.start;
    let mut carets = String::with_capacity(width + 2);
    carets.push('^');
    for _ in 1..width {
      carets.push('~');
    }
    if snippet.truncated {
      carets.push_str("~..");
    }
    writeln!(w, "  {:pad$}{}", "", style.underline(carets), pad = pad)?;

    if let Some(label) = self.label {
      //   = {label}
      writeln!(w, "  = {label}")?;
    }

    Ok(())
  }

  /// Emit the report to a string.
  pub fn emit_to_string(self) -> Result<String, EmitError> {
    let mut buf = String::new();
    self.emit(&mut buf)?;
    Ok(buf)
  }
}

#[derive(Debug, Error)]
pub enum EmitError {
  #[error("failed to format")]
  Fmt(#[from] fmt::Error),
  #[error("span does not fit within source string")]
  OutOfBounds,
}
