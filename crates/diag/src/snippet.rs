use span::{LineCol, Span};

/// The single source line a diagnostic points at, together with the
/// column range to underline.
///
/// Spans covering multiple lines are clipped to their first line, with
/// `truncated` set so the renderer can mark the continuation.
#[derive(Clone, Debug, PartialEq)]
pub struct Snippet<'a> {
  /// The spanned line, without its terminating newline.
  pub line: &'a str,
  /// Position of the span start, 1-based.
  pub location: LineCol,
  /// Byte offset into `line` where the underline starts.
  pub start: usize,
  /// Byte offset into `line` where the underline ends (exclusive).
  /// Always greater than `start`; zero-width spans underline one column.
  pub end: usize,
  /// True if the span continues past the end of `line`.
  pub truncated: bool,
}

impl<'a> Snippet<'a> {
  pub fn new(src: &'a str, span: impl Into<Span>) -> Self {
    let span: Span = span.into();
    let at = span.start.min(src.len());

    let line_start = src[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = src[at..].find('\n').map(|i| i + at).unwrap_or(src.len());
    let line = &src[line_start..line_end];

    let start = at - line_start;
    let end = span.end.min(line_end).saturating_sub(line_start).max(start + 1);

    Snippet {
      line,
      location: LineCol::resolve(src, at),
      start,
      end,
      truncated: span.end > line_end,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_line() {
    let src = "int x;\nint y = z;\n";
    let s = Snippet::new(src, 15..16);
    assert_eq!(s.line, "int y = z;");
    assert_eq!((s.location.line, s.location.column), (2, 9));
    assert_eq!((s.start, s.end), (8, 9));
    assert!(!s.truncated);
  }

  #[test]
  fn zero_width_span_still_underlines() {
    let src = "int x\n";
    let s = Snippet::new(src, 5..5);
    assert_eq!((s.start, s.end), (5, 6));
  }

  #[test]
  fn multi_line_span_is_clipped() {
    let src = "int a[] = {1,\n2};\n";
    let s = Snippet::new(src, 10..16);
    assert_eq!(s.line, "int a[] = {1,");
    assert_eq!((s.start, s.end), (10, 13));
    assert!(s.truncated);
  }
}
