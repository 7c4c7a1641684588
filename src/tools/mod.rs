//! Process level helpers.

pub mod system;
