//! Encrypted Settlement
//!
//! Evaluates the Rock-Paper-Scissors table over two encrypted moves:
//!
//! ```text
//! draw      = m1 == m2
//! init_wins = (m1 == R && m2 == S) || (m1 == P && m2 == R) || (m1 == S && m2 == P)
//! result    = draw ? 0 : (init_wins ? 1 : 2)
//! ```
//!
//! Neither move nor the result is decrypted here. Intermediates are released
//! once the result is authorized; only the result handle survives.

use crate::fhe::capability::{FheCapability, FheError};
use crate::fhe::handle::{CiphertextHandle, Ebool, Euint8};
use super::state::{Move, Outcome};

/// Compute the encrypted outcome of `initiator` vs `opponent`.
///
/// The returned handle is authorized for the executing contract.
pub fn settle_moves<F: FheCapability>(
    fhe: &mut F,
    initiator: Euint8,
    opponent: Euint8,
) -> Result<Euint8, FheError> {
    let is_draw = fhe.eq(initiator, opponent)?;

    let rock_wins = beats_case(fhe, initiator, opponent, Move::Rock)?;
    let paper_wins = beats_case(fhe, initiator, opponent, Move::Paper)?;
    let scissors_wins = beats_case(fhe, initiator, opponent, Move::Scissors)?;
    let partial = fhe.or(rock_wins.wins, paper_wins.wins)?;
    let initiator_wins = fhe.or(partial, scissors_wins.wins)?;

    let draw = fhe.as_euint8(Outcome::Draw.as_u8())?;
    let init = fhe.as_euint8(Outcome::InitiatorWins.as_u8())?;
    let opp = fhe.as_euint8(Outcome::OpponentWins.as_u8())?;

    let decided = fhe.select(initiator_wins, init, opp)?;
    let result = fhe.select(is_draw, draw, decided)?;
    fhe.authorize_self(result.handle())?;

    let mut scratch = vec![*is_draw.handle(), *partial.handle(), *initiator_wins.handle()];
    for case in [rock_wins, paper_wins, scissors_wins] {
        scratch.extend_from_slice(&case.scratch);
        scratch.push(*case.wins.handle());
    }
    scratch.extend([*draw.handle(), *init.handle(), *opp.handle(), *decided.handle()]);
    for handle in &scratch {
        fhe.release(handle)?;
    }

    Ok(result)
}

struct BeatsCase {
    wins: Ebool,
    scratch: [CiphertextHandle; 2],
}

/// `initiator == mv && opponent == mv.beats()`
fn beats_case<F: FheCapability>(
    fhe: &mut F,
    initiator: Euint8,
    opponent: Euint8,
    mv: Move,
) -> Result<BeatsCase, FheError> {
    let played = fhe.eq_scalar(initiator, mv.as_u8())?;
    let beaten = fhe.eq_scalar(opponent, mv.beats().as_u8())?;
    let wins = fhe.and(played, beaten)?;
    Ok(BeatsCase { wins, scratch: [*played.handle(), *beaten.handle()] })
}
