//! Engine configuration.

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Total attempts for episode generation, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Settings for one kind of generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            max_output_tokens: 1200,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Configuration for [`crate::StoryEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Story creation: title, logline and episode 1.
    pub create: GenerationSettings,

    /// Continuation episodes and their repairs.
    pub episode: GenerationSettings,

    /// Recap and state extraction.
    pub finalize: GenerationSettings,

    /// Attempts for episode generation before rejecting. At least 1.
    pub max_attempts: u32,

    /// Run the opening episode through safety checks and repair too.
    pub repair_initial_episode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create: GenerationSettings::new(DEFAULT_MODEL)
                .with_temperature(0.7)
                .with_max_output_tokens(3000),
            episode: GenerationSettings::new(DEFAULT_MODEL).with_max_output_tokens(1800),
            finalize: GenerationSettings::new(DEFAULT_MODEL),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            repair_initial_episode: false,
        }
    }
}

impl EngineConfig {
    /// Defaults, with every model overridden by `STORY_MODEL` when set.
    pub fn from_env() -> Self {
        match std::env::var("STORY_MODEL") {
            Ok(model) if !model.trim().is_empty() => Self::default().with_model(model.trim()),
            _ => Self::default(),
        }
    }

    /// Use one model for every call.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.create.model = model.clone();
        self.episode.model = model.clone();
        self.finalize.model = model;
        self
    }

    pub fn with_create(mut self, settings: GenerationSettings) -> Self {
        self.create = settings;
        self
    }

    pub fn with_episode(mut self, settings: GenerationSettings) -> Self {
        self.episode = settings;
        self
    }

    pub fn with_finalize(mut self, settings: GenerationSettings) -> Self {
        self.finalize = settings;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_repair_initial_episode(mut self, enabled: bool) -> Self {
        self.repair_initial_episode = enabled;
        self
    }
}
