mod id;
pub mod messages;
mod peer;
mod routing_table;

pub use id::*;
pub use peer::*;
pub use routing_table::*;
