//! Match Registry
//!
//! The match lifecycle state machine:
//!
//! ```text
//!            create            both moves           reveal
//!   (none) ─────────▶ WAITING ───────────▶ BOTH_COMMITTED ─────▶ REVEALED
//!                        │
//!                        │ cancel (unjoined only)
//!                        ▼
//!                    CANCELLED
//! ```
//!
//! Every operation checks all preconditions and performs all fallible FHE
//! work before touching registry state, so a failed call changes nothing.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::core::address::Address;
use crate::core::clock::{Clock, SystemClock};
use crate::fhe::capability::{FheCapability, FheError};
use crate::fhe::handle::{EncryptedInput, Euint8};
use super::events::{RegistryEvent, RegistryEventData};
use super::oracle::{RevealQueue, RevealRequest, DEFAULT_REVEAL_CAPACITY};
use super::pending::PendingSet;
use super::settle::settle_moves;
use super::state::{Match, MatchId, MatchStatus, PlayerStats, Slot, NO_MATCH};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Address the registry executes as (FHE ACL principal).
    pub contract_address: Address,
    /// Event broadcast buffer size.
    pub event_capacity: usize,
    /// Reveal requests kept before the oldest is evicted.
    pub reveal_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            contract_address: Address::from_subject("veiled-rps-registry"),
            event_capacity: 256,
            reveal_capacity: DEFAULT_REVEAL_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            contract_address: std::env::var("RPS_CONTRACT_ADDRESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.contract_address),
            event_capacity: std::env::var("RPS_EVENT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.event_capacity),
            reveal_capacity: std::env::var("RPS_REVEAL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.reveal_capacity),
        }
    }
}

/// Registry errors. All are fail-closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Participant already has a non-terminal match.
    #[error("player already in a match")]
    AlreadyInMatch,

    /// Match id outside the allocated range.
    #[error("invalid match id")]
    InvalidMatchId,

    /// Operation needs an unjoined waiting match.
    #[error("match is not waiting")]
    MatchNotWaiting,

    /// Caller is not allowed to act on this match.
    #[error("unauthorized player")]
    UnauthorizedPlayer,

    /// Slot already holds a committed move.
    #[error("move already committed")]
    MoveAlreadyCommitted,

    /// Reveal requested before both moves were committed.
    #[error("match not ready")]
    MatchNotReady,

    /// FHE import or evaluation failed.
    #[error("fhe failure: {0}")]
    Fhe(#[from] FheError),
}

/// The match registry.
pub struct MatchRegistry<F> {
    /// Registry configuration.
    config: RegistryConfig,
    /// FHE subsystem.
    fhe: F,
    /// Timestamp source.
    clock: Arc<dyn Clock>,
    /// Next id to allocate.
    next_id: MatchId,
    /// All matches ever created.
    matches: BTreeMap<MatchId, Match>,
    /// Participant to non-terminal match.
    active: BTreeMap<Address, MatchId>,
    /// Participant statistics.
    stats: BTreeMap<Address, PlayerStats>,
    /// Joinable matches.
    pending: PendingSet,
    /// Settled matches awaiting decryption.
    reveals: RevealQueue,
    /// Last emitted event sequence number.
    event_seq: u64,
    /// Event broadcast channel.
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl<F: FheCapability> MatchRegistry<F> {
    /// Create a registry using the wall clock.
    pub fn new(config: RegistryConfig, fhe: F) -> Self {
        Self::with_clock(config, fhe, Arc::new(SystemClock))
    }

    /// Create a registry with an explicit clock.
    pub fn with_clock(config: RegistryConfig, fhe: F, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let reveals = RevealQueue::with_capacity(config.reveal_capacity);

        Self {
            config,
            fhe,
            clock,
            next_id: 1,
            matches: BTreeMap::new(),
            active: BTreeMap::new(),
            stats: BTreeMap::new(),
            pending: PendingSet::new(),
            reveals,
            event_seq: 0,
            event_tx,
        }
    }

    // =========================================================================
    // STATE-CHANGING OPERATIONS
    // =========================================================================

    /// Open a new match for `initiator`.
    pub fn create_match(&mut self, initiator: Address) -> Result<MatchId, RegistryError> {
        if self.has_active_match(&initiator) {
            debug!(player = %initiator.short(), "create rejected: already in match");
            return Err(RegistryError::AlreadyInMatch);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.matches.insert(id, Match::new(id, initiator, self.clock.now()));
        self.active.insert(initiator, id);
        self.pending.push(id);

        info!(match_id = id, initiator = %initiator.short(), "match created");
        self.emit(RegistryEventData::match_created(id, initiator));
        Ok(id)
    }

    /// Join an open match as its opponent.
    pub fn join_match(&mut self, match_id: MatchId, joiner: Address) -> Result<(), RegistryError> {
        if match_id == NO_MATCH || match_id >= self.next_id {
            return Err(RegistryError::InvalidMatchId);
        }

        let m = self.matches.get(&match_id).ok_or(RegistryError::MatchNotWaiting)?;
        if !m.is_open() {
            debug!(match_id, state = ?m.state, "join rejected: not waiting");
            return Err(RegistryError::MatchNotWaiting);
        }
        if self.has_active_match(&joiner) {
            return Err(RegistryError::AlreadyInMatch);
        }
        if joiner == m.initiator {
            return Err(RegistryError::UnauthorizedPlayer);
        }

        if let Some(m) = self.matches.get_mut(&match_id) {
            m.opponent = Some(joiner);
        }
        self.active.insert(joiner, match_id);
        self.pending.remove(match_id);

        info!(match_id, opponent = %joiner.short(), "match joined");
        self.emit(RegistryEventData::match_joined(match_id, joiner));
        Ok(())
    }

    /// Withdraw an unjoined match.
    pub fn cancel_match(&mut self, match_id: MatchId, caller: Address) -> Result<(), RegistryError> {
        let m = self.matches.get(&match_id).ok_or(RegistryError::UnauthorizedPlayer)?;
        if caller != m.initiator {
            return Err(RegistryError::UnauthorizedPlayer);
        }
        if !m.is_open() {
            debug!(match_id, state = ?m.state, "cancel rejected: not waiting");
            return Err(RegistryError::MatchNotWaiting);
        }

        let initiator = m.initiator;
        if let Some(m) = self.matches.get_mut(&match_id) {
            m.state = MatchStatus::Cancelled;
        }
        self.clear_active(&initiator, match_id);
        self.pending.remove(match_id);

        info!(match_id, "match cancelled");
        self.emit(RegistryEventData::match_cancelled(match_id));
        Ok(())
    }

    /// Commit `caller`'s encrypted move.
    ///
    /// The move is imported through the FHE capability, which rejects inputs
    /// whose proof is not bound to this registry and to `caller`.
    #[instrument(level = "debug", skip(self, input))]
    pub fn submit_move(
        &mut self,
        match_id: MatchId,
        caller: Address,
        input: &EncryptedInput,
    ) -> Result<(), RegistryError> {
        let m = self.matches.get(&match_id).ok_or(RegistryError::UnauthorizedPlayer)?;
        let slot = m.slot_of(&caller).ok_or(RegistryError::UnauthorizedPlayer)?;
        if m.is_committed(slot) {
            return Err(RegistryError::MoveAlreadyCommitted);
        }
        if m.state == MatchStatus::Cancelled {
            return Err(RegistryError::MatchNotWaiting);
        }

        let handle = self.fhe.import_encrypted(input, &caller)?;
        self.fhe.authorize_self(handle.handle())?;

        let Some(m) = self.matches.get_mut(&match_id) else {
            return Err(RegistryError::UnauthorizedPlayer);
        };
        match slot {
            Slot::Initiator => {
                m.move_initiator = Some(handle);
                m.initiator_committed = true;
            }
            Slot::Opponent => {
                m.move_opponent = Some(handle);
                m.opponent_committed = true;
            }
        }
        if m.both_committed() {
            m.state = MatchStatus::BothCommitted;
            info!(match_id, "both moves committed");
        }

        debug!(match_id, player = %caller.short(), ?slot, "move committed");
        self.emit(RegistryEventData::move_committed(match_id, caller));
        Ok(())
    }

    /// Settle a fully committed match.
    ///
    /// The outcome stays encrypted: the revealed event carries placeholder
    /// winner/result values and a [`RevealRequest`] is queued for an external
    /// decryption oracle.
    #[instrument(level = "debug", skip(self))]
    pub fn request_reveal(&mut self, match_id: MatchId, caller: Address) -> Result<(), RegistryError> {
        let m = self.matches.get(&match_id).ok_or(RegistryError::MatchNotReady)?;
        if m.state != MatchStatus::BothCommitted {
            return Err(RegistryError::MatchNotReady);
        }
        if m.slot_of(&caller).is_none() {
            return Err(RegistryError::UnauthorizedPlayer);
        }

        let (initiator, opponent) = match (m.opponent, m.move_initiator, m.move_opponent) {
            (Some(opponent), Some(_), Some(_)) => (m.initiator, opponent),
            _ => return Err(RegistryError::MatchNotReady),
        };

        let result = self.settle(match_id)?;

        if let Some(m) = self.matches.get_mut(&match_id) {
            m.state = MatchStatus::Revealed;
            m.result = Some(result);
        }
        self.clear_active(&initiator, match_id);
        self.clear_active(&opponent, match_id);
        if let Some(evicted) = self.reveals.push(RevealRequest { match_id, initiator, opponent, result }) {
            warn!(match_id = evicted.match_id, "reveal queue full, oldest request evicted");
        }

        info!(match_id, result = %result.handle(), "match revealed, outcome pending decryption");
        self.emit(RegistryEventData::match_revealed(match_id));
        Ok(())
    }

    /// Compute the encrypted outcome and count the match for both players.
    ///
    /// Only `total_matches` moves: wins, losses, draws and streaks need the
    /// decrypted outcome.
    fn settle(&mut self, match_id: MatchId) -> Result<Euint8, RegistryError> {
        let m = self.matches.get(&match_id).ok_or(RegistryError::MatchNotReady)?;
        let (m1, m2) = match (m.move_initiator, m.move_opponent) {
            (Some(m1), Some(m2)) => (m1, m2),
            _ => return Err(RegistryError::MatchNotReady),
        };
        let participants: Vec<Address> = m.participants().collect();

        let result = settle_moves(&mut self.fhe, m1, m2)?;

        for player in participants {
            self.stats.entry(player).or_default().total_matches += 1;
        }
        Ok(result)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Whether both moves are committed. False for unknown ids.
    pub fn lock_move(&self, match_id: MatchId) -> bool {
        self.matches
            .get(&match_id)
            .map(|m| m.state == MatchStatus::BothCommitted)
            .unwrap_or(false)
    }

    /// Joinable match ids, unordered.
    pub fn get_pending_matches(&self) -> &[MatchId] {
        self.pending.as_slice()
    }

    /// Match record; the empty `None`-state record for unknown ids.
    pub fn get_match(&self, match_id: MatchId) -> Match {
        self.matches.get(&match_id).cloned().unwrap_or_default()
    }

    /// Player statistics; zeroed for unknown players.
    pub fn get_player_stats(&self, player: &Address) -> PlayerStats {
        self.stats.get(player).copied().unwrap_or_default()
    }

    /// Active match id, or [`NO_MATCH`].
    pub fn get_active_match(&self, player: &Address) -> MatchId {
        self.active.get(player).copied().unwrap_or(NO_MATCH)
    }

    /// Id the next created match will receive.
    pub fn next_match_id(&self) -> MatchId {
        self.next_id
    }

    /// Address the registry executes as.
    pub fn contract_address(&self) -> Address {
        self.config.contract_address
    }

    /// Subscribe to registry events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Drain settled matches awaiting decryption.
    pub fn take_reveal_requests(&mut self) -> Vec<RevealRequest> {
        self.reveals.drain()
    }

    /// FHE subsystem the registry executes against.
    pub fn fhe(&self) -> &F {
        &self.fhe
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn has_active_match(&self, player: &Address) -> bool {
        self.get_active_match(player) != NO_MATCH
    }

    fn clear_active(&mut self, player: &Address, match_id: MatchId) {
        if self.active.get(player) == Some(&match_id) {
            self.active.remove(player);
        }
    }

    fn emit(&mut self, data: RegistryEventData) {
        self.event_seq += 1;
        // No subscribers is fine
        let _ = self.event_tx.send(RegistryEvent::new(self.event_seq, data));
    }
}
