// quire-daemon library entry point (also embeddable in a desktop shell).

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod notebook;
pub mod rpc;
pub mod runtime;
pub mod search;
pub mod startup;
pub mod store;
pub mod subscription;
