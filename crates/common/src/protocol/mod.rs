pub mod jsonrpc;
pub mod push;
pub mod rpc_methods;
