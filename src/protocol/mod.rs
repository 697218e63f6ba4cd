pub mod flooding;
pub mod message;

pub use flooding::*;
pub use message::*;
