//! Turn sequencing: the per-session state machine and the events it emits.

pub mod coordinator;
pub mod events;
pub mod state;

pub use coordinator::{
    DEFAULT_AUDIO_QUEUE_SIZE, SubmitError, TurnCapabilities, TurnConfig, TurnCoordinator,
    TurnHandle,
};
pub use events::TurnEvent;
pub use state::TurnState;
