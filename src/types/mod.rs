//! Request and response types shared by every provider.

mod capabilities;
mod chat;
mod tools;
mod usage;

pub use capabilities::*;
pub use chat::*;
pub use tools::*;
pub use usage::*;
