//! Veiled RPS Server
//!
//! Runs the confidential match registry behind a WebSocket server, or plays
//! a scripted demo against the local FHE backend.

use std::sync::Arc;
use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use veiled_rps::{
    VERSION,
    core::address::Address,
    fhe::{FheCapability, LocalFhe, LocalFheConfig},
    game::{
        events::RegistryEventData,
        registry::{MatchRegistry, RegistryConfig},
        state::{Move, Outcome},
    },
    network::{AuthConfig, RegistryGateway, RpsServer, ServerConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Veiled RPS v{}", VERSION);

    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    match mode.as_str() {
        "serve" => serve().await,
        "demo" => demo_matches(),
        other => bail!("unknown mode '{}' (expected 'serve' or 'demo')", other),
    }
}

fn build_registry() -> MatchRegistry<LocalFhe> {
    let registry_config = RegistryConfig::from_env();
    let fhe = LocalFhe::new(registry_config.contract_address, LocalFheConfig::from_env());
    info!("Registry contract address: {}", registry_config.contract_address);
    MatchRegistry::new(registry_config, fhe)
}

async fn serve() -> Result<()> {
    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; every auth request will fail");
    }

    let gateway = RegistryGateway::new(build_registry());
    let server = Arc::new(RpsServer::new(ServerConfig::from_env(), auth, gateway));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_server.shutdown();
        }
    });

    server.run().await.context("registry server failed")?;

    let pending = server.gateway().take_reveal_requests().await;
    if !pending.is_empty() {
        warn!("{} reveals still awaiting decryption at shutdown", pending.len());
    }
    Ok(())
}

/// Play scripted matches and decrypt the outcomes locally.
fn demo_matches() -> Result<()> {
    info!("=== Starting Demo Matches ===");

    let mut registry = build_registry();
    let mut events = registry.subscribe_events();
    let encryptor = registry.fhe().encryptor();

    let players: Vec<Address> = ["alice", "bob", "carol", "dave"]
        .iter()
        .map(|name| Address::from_subject(name))
        .collect();

    let pairings = [
        (Move::Rock, Move::Scissors),
        (Move::Paper, Move::Scissors),
        (Move::Scissors, Move::Scissors),
    ];

    for (round, (initiator_move, opponent_move)) in pairings.iter().enumerate() {
        let initiator = players[round % players.len()];
        let opponent = players[(round + 1) % players.len()];

        let match_id = registry.create_match(initiator)?;
        registry.join_match(match_id, opponent)?;

        let input = encryptor.encrypt_u8(initiator_move.as_u8(), &initiator);
        registry.submit_move(match_id, initiator, &input)?;
        let input = encryptor.encrypt_u8(opponent_move.as_u8(), &opponent);
        registry.submit_move(match_id, opponent, &input)?;

        registry.request_reveal(match_id, initiator)?;
        info!(
            "Match {}: {} ({:?}) vs {} ({:?}) settled",
            match_id,
            initiator.short(),
            initiator_move,
            opponent.short(),
            opponent_move
        );
    }

    // A cancelled match frees the initiator immediately
    let loner = players[3];
    let match_id = registry.create_match(loner)?;
    registry.cancel_match(match_id, loner)?;
    info!("Match {} cancelled by {}", match_id, loner.short());

    info!("=== Decrypting Outcomes ===");
    for request in registry.take_reveal_requests() {
        let value = registry.fhe().oracle_decrypt(request.result.handle())?;
        let outcome = Outcome::from_u8(value).context("decrypted outcome out of range")?;
        let winner = match outcome {
            Outcome::Draw => "draw".to_string(),
            Outcome::InitiatorWins => request.initiator.short(),
            Outcome::OpponentWins => request.opponent.short(),
        };
        info!("Match {}: {:?} (winner: {})", request.match_id, outcome, winner);
    }

    info!("=== Events ===");
    let mut total_events = 0;
    while let Ok(event) = events.try_recv() {
        total_events += 1;
        if let RegistryEventData::MatchRevealed { match_id, .. } = event.data {
            info!("#{} revealed match {}", event.seq, match_id);
        }
    }
    info!("{} events emitted", total_events);

    info!("=== Player Stats ===");
    for player in &players {
        let stats = registry.get_player_stats(player);
        info!("{}: {} matches played", player.short(), stats.total_matches);
    }
    info!("{} ciphertexts held by {}", registry.fhe().ciphertext_count(), registry.fhe().contract());

    Ok(())
}
