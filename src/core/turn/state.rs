use serde::Serialize;

/// Phase of the current conversational turn.
///
/// ```text
/// Idle ─▶ Listening ─▶ Transcribing ─▶ AwaitingEndOfTurn ─▶ Generating ─▶ Synthesizing ─▶ Idle
/// ```
/// Any failure or stop returns straight to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    Listening,
    Transcribing,
    AwaitingEndOfTurn,
    Generating,
    Synthesizing,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Transcribing => "transcribing",
            TurnState::AwaitingEndOfTurn => "awaiting_end_of_turn",
            TurnState::Generating => "generating",
            TurnState::Synthesizing => "synthesizing",
        }
    }

    /// A turn has passed end-of-turn and owns the generation/synthesis slot.
    pub fn is_turn_in_flight(&self) -> bool {
        matches!(
            self,
            TurnState::AwaitingEndOfTurn | TurnState::Generating | TurnState::Synthesizing
        )
    }

    /// Still collecting speech for the next turn.
    pub fn is_capturing(&self) -> bool {
        matches!(self, TurnState::Listening | TurnState::Transcribing)
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
