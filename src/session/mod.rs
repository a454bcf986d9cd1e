// One session instance per run; nothing here is shared between sessions.

mod challenge;
mod passive;

pub use challenge::{ChallengePhase, ChallengeSession};
pub use passive::{PassiveSession, PassiveState};
