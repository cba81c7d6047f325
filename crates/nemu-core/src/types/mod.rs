//! Core types for nemu.

mod knowledge;
mod message;
mod scope;

pub use knowledge::*;
pub use message::*;
pub use scope::*;
