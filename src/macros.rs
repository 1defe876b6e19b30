#[macro_export]
#[doc(hidden)]
macro_rules! fail {
  ($kind:ident @ $span:expr, $fmt:literal $(,$($arg:tt)*)?) => {
    return Err($crate::error::Error::new(
      $crate::error::ErrorKind::$kind,
      format!($fmt $(, $($arg)*)?),
      $span,
    ))
  };
  (@$span:expr, $fmt:literal $(,$($arg:tt)*)?) => {
    return Err($crate::error::Error::syntax(
      format!($fmt $(, $($arg)*)?),
      $span,
    ))
  };
}
