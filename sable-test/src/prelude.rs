//! The `use`s every test wants.

pub use color_eyre::eyre::{bail, eyre, Report, Result};
pub use pretty_assertions::{assert_eq, assert_ne};
pub use spandoc::spandoc;
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};
