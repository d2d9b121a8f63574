//! Client side of a Murmur chat: keeps one chat's messages reconciled from
//! history fetches and live gateway pushes.

pub mod error;
pub mod session;
pub mod timeline;
pub mod transport;

pub use error::ClientError;
pub use session::{ClientSession, FetchTicket};
pub use timeline::Timeline;
pub use transport::{GatewayConnection, RelayClient};
