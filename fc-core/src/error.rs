//! Error types, re-exported from `fc-error`

pub use fc_error::*;
