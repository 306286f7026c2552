// quire-common: content engine, wire types and protocol shared by quire crates.

pub mod content;
pub mod ids;
pub mod outline;
pub mod protocol;
pub mod types;
