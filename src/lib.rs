//! A small C front-end.
//!
//! `natrix` lexes and parses C declarations and lowers their initializers
//! into a flat list of IR assignments: one write per leaf object, emitted
//! in layout order, with every unwritten byte zero-filled. Static-storage
//! initializers are checked for load-time computability; automatic ones may
//! run arbitrary expressions, with calls spilled to temporaries.
//!
//! ```
//! let program = natrix::compile("int a[4] = {1, 2};").unwrap();
//! assert_eq!(program.defs.len(), 1);
//! ```

#[macro_use]
mod macros;

mod error;

pub mod ir;
pub mod symbols;
pub mod syntax;
pub mod types;

pub use error::{Error, ErrorKind, Result};

/// Compile a translation unit into its lowered definitions.
pub fn compile(src: &str) -> Result<ir::Program> {
  syntax::parse(src)
}
