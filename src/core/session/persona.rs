//! Named assistant personas.

use serde::Serialize;
use std::collections::BTreeMap;

use super::SessionError;

pub const DEFAULT_PERSONA: &str = "default";

const DEFAULT_PROMPT: &str = "You are a friendly voice assistant. Answer in one to three short, \
conversational sentences that sound natural when spoken aloud. Avoid lists, markdown and \
emoji. If you are unsure, say so briefly and offer to help another way.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
}

/// Immutable set of personas sessions may select from.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    default_name: String,
    prompts: BTreeMap<String, String>,
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        let mut prompts = BTreeMap::new();
        prompts.insert(DEFAULT_PERSONA.to_string(), DEFAULT_PROMPT.to_string());
        Self {
            default_name: DEFAULT_PERSONA.to_string(),
            prompts,
        }
    }
}

impl PersonaCatalog {
    /// Built-in persona plus `extra`, which may override it. `default_name`
    /// must name an entry of the resulting catalog.
    pub fn new(
        extra: impl IntoIterator<Item = (String, String)>,
        default_name: Option<String>,
    ) -> Result<Self, SessionError> {
        let mut catalog = Self::default();
        for (name, prompt) in extra {
            let name = name.trim().to_lowercase();
            if name.is_empty() || prompt.trim().is_empty() {
                return Err(SessionError::InvalidPersona(
                    "persona name and prompt must not be empty".to_string(),
                ));
            }
            catalog.prompts.insert(name, prompt);
        }
        if let Some(name) = default_name {
            let name = name.trim().to_lowercase();
            if !catalog.prompts.contains_key(&name) {
                return Err(SessionError::UnknownPersona(name));
            }
            catalog.default_name = name;
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<Persona> {
        let name = name.trim().to_lowercase();
        self.prompts.get(&name).map(|prompt| Persona {
            name,
            prompt: prompt.clone(),
        })
    }

    pub fn default_persona(&self) -> Persona {
        Persona {
            name: self.default_name.clone(),
            prompt: self
                .prompts
                .get(&self.default_name)
                .cloned()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.prompts.keys().cloned().collect()
    }
}
