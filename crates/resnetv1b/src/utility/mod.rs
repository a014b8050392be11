//! Miscellaneous utilities.
pub mod kwargs;
