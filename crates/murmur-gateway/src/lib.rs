pub mod connection;
pub mod identity;
pub mod registry;
pub mod router;

pub use connection::{GatewayConfig, GatewayState};
pub use identity::{Identity, IdentityResolver, JwtIdentityResolver};
pub use registry::{RoomRegistry, SessionHandle};
pub use router::MessageRouter;
