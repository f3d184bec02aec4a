pub mod connectivity;
pub mod http;
pub mod sender;
pub mod transport;
