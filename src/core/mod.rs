pub mod audio;
pub mod intent;
pub mod llm;
pub mod retry;
pub mod session;
pub mod stream;
pub mod stt;
pub mod tts;
pub mod turn;

// Re-export commonly used types for convenience
pub use audio::{AudioChunkEnvelope, AudioError, InputTranscoder, PlaybackScheduler, SampleEncoding};

pub use stt::{
    AssemblyAISTT, BaseSTT, STTConfig, STTError, STTEvent, STTProvider, STTResult,
    create_stt_provider, create_stt_provider_from_enum, get_supported_stt_providers,
};

pub use llm::{
    BaseLLM, ChatMessage, GeminiLLM, GenerationRequest, LLMConfig, LLMError, LLMEvent,
    LLMProvider, LLMResult, Role, create_llm_provider,
};

pub use tts::{BaseTTS, MurfTTS, TTSConfig, TTSError, TTSEvent, TTSProvider, TTSResult, create_tts_provider};

pub use intent::{IntentRouter, LookupError, NewsClient, WeatherClient};

pub use session::{
    Capability, Persona, PersonaCatalog, Session, SessionError, SessionLease, SessionStore,
};

pub use turn::{TurnCapabilities, TurnConfig, TurnCoordinator, TurnEvent, TurnHandle, TurnState};
