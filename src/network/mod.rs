//! Network Layer
//!
//! Host-runtime stand-in around the registry: JWT identity, the wire
//! protocol, a gateway that serializes calls, and the WebSocket server.
//! No match logic lives here; everything goes through `game/`.

pub mod auth;
pub mod protocol;
pub mod gateway;
pub mod server;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{ClientMessage, ErrorCode, MoveFrame, Operation, ServerMessage};
pub use gateway::{GatewayError, RegistryGateway};
pub use server::{ConnectionId, RpsServer, RpsServerError, ServerConfig};
