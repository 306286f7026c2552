// JSON-RPC server: method dispatch and the Unix socket transport.

pub mod methods;
pub mod session;
pub mod unix;
