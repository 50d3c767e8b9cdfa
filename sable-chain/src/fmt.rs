//! Formatting helpers.

use std::fmt;

/// Wrapper that forwards a type's `Display` impl to `Debug`, for use in
/// `debug_struct` fields that should render human-readably.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
