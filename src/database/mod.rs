//! Typed tables derived from sheets, and the naming rules they follow.

pub mod column;
pub mod naming;
pub(crate) mod table;
pub mod value;
