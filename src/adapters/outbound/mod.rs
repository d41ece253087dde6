mod rdb_decoder;
mod tcp_connector;

pub use rdb_decoder::RdbDecoder;
pub use tcp_connector::{drain_replies, DrainStats, TcpConnector};
