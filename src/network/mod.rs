pub mod channel;
pub mod link_table;
pub mod listener;

pub use link_table::*;
pub use listener::*;
