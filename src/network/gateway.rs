//! Registry Gateway
//!
//! Stands in for the host runtime: every call into the registry goes through
//! one `RwLock`, so state-changing operations are applied one at a time and
//! each either completes or leaves the registry untouched. Queries share the
//! read lock.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::core::address::Address;
use crate::fhe::capability::FheCapability;
use crate::game::events::RegistryEvent;
use crate::game::oracle::RevealRequest;
use crate::game::registry::{MatchRegistry, RegistryError};
use super::protocol::{ClientMessage, ErrorCode, Operation, ServerMessage};

/// Gateway errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// State-changing request without an authenticated caller.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The registry rejected the call.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Connection-level message routed to the gateway.
    #[error("unsupported request: {0}")]
    Unsupported(&'static str),
}

impl GatewayError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::NotAuthenticated => ErrorCode::NotAuthenticated,
            GatewayError::Registry(err) => ErrorCode::from(err),
            GatewayError::Unsupported(_) => ErrorCode::InvalidInput,
        }
    }
}

/// Shared, serialized access to a [`MatchRegistry`].
pub struct RegistryGateway<F> {
    registry: Arc<RwLock<MatchRegistry<F>>>,
}

impl<F> Clone for RegistryGateway<F> {
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone() }
    }
}

impl<F: FheCapability> RegistryGateway<F> {
    /// Wrap a registry.
    pub fn new(registry: MatchRegistry<F>) -> Self {
        Self { registry: Arc::new(RwLock::new(registry)) }
    }

    /// Execute a request on behalf of `caller` and return the reply.
    ///
    /// Failures become `error` messages.
    pub async fn execute(&self, caller: Option<Address>, msg: ClientMessage) -> ServerMessage {
        match self.dispatch(caller, msg).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!(caller = ?caller.map(|a| a.short()), error = %err, "request rejected");
                ServerMessage::error(err.code(), err.to_string())
            }
        }
    }

    /// Execute a request on behalf of `caller`.
    pub async fn dispatch(
        &self,
        caller: Option<Address>,
        msg: ClientMessage,
    ) -> Result<ServerMessage, GatewayError> {
        if msg.is_state_changing() {
            let caller = caller.ok_or(GatewayError::NotAuthenticated)?;
            return self.apply(caller, msg).await;
        }

        let registry = self.registry.read().await;
        let reply = match msg {
            ClientMessage::LockMove { match_id } => ServerMessage::Locked {
                match_id,
                locked: registry.lock_move(match_id),
            },
            ClientMessage::GetPendingMatches => ServerMessage::PendingMatches {
                match_ids: registry.get_pending_matches().to_vec(),
            },
            ClientMessage::GetMatch { match_id } => ServerMessage::Match {
                record: registry.get_match(match_id),
            },
            ClientMessage::GetPlayerStats { address } => ServerMessage::PlayerStats {
                address,
                stats: registry.get_player_stats(&address),
            },
            ClientMessage::GetActiveMatch { address } => ServerMessage::ActiveMatch {
                address,
                match_id: registry.get_active_match(&address),
            },
            ClientMessage::Auth(_) => return Err(GatewayError::Unsupported("auth")),
            ClientMessage::Ping { .. } => return Err(GatewayError::Unsupported("ping")),
            _ => return Err(GatewayError::Unsupported("state-changing request")),
        };
        Ok(reply)
    }

    async fn apply(&self, caller: Address, msg: ClientMessage) -> Result<ServerMessage, GatewayError> {
        let mut registry = self.registry.write().await;
        let reply = match msg {
            ClientMessage::CreateMatch => ServerMessage::MatchCreated {
                match_id: registry.create_match(caller)?,
            },
            ClientMessage::JoinMatch { match_id } => {
                registry.join_match(match_id, caller)?;
                ServerMessage::Ok { op: Operation::JoinMatch, match_id }
            }
            ClientMessage::CancelMatch { match_id } => {
                registry.cancel_match(match_id, caller)?;
                ServerMessage::Ok { op: Operation::CancelMatch, match_id }
            }
            ClientMessage::SubmitMove { match_id, input } => {
                registry.submit_move(match_id, caller, &input)?;
                ServerMessage::Ok { op: Operation::SubmitMove, match_id }
            }
            ClientMessage::RequestReveal { match_id } => {
                registry.request_reveal(match_id, caller)?;
                ServerMessage::Ok { op: Operation::RequestReveal, match_id }
            }
            _ => return Err(GatewayError::Unsupported("query")),
        };
        Ok(reply)
    }

    /// Subscribe to registry events.
    pub async fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.read().await.subscribe_events()
    }

    /// Drain reveals waiting for decryption.
    pub async fn take_reveal_requests(&self) -> Vec<RevealRequest> {
        self.registry.write().await.take_reveal_requests()
    }

    /// Run `f` against the registry under the read lock.
    pub async fn with_registry<R>(&self, f: impl FnOnce(&MatchRegistry<F>) -> R) -> R {
        let registry = self.registry.read().await;
        f(&registry)
    }
}
