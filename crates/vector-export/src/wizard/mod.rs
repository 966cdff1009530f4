//! Interactive completion of an export job.
//!
//! Values given on the command line or in the config file are kept as is.
//! Anything still missing is read from the environment (secrets only) or
//! asked for interactively.

pub mod prompts;
pub mod ui;

pub use prompts::DialoguerPrompter;
pub use ui::ExportUI;

use tracing::{debug, warn};

use crate::config::{
    PineconeConfig, QdrantConfig, SourceConfig, WeaviateConfig, ALL_COLLECTIONS,
    PINECONE_API_KEY_ENV, QDRANT_API_KEY_ENV, WEAVIATE_API_KEY_ENV,
};
use crate::error::{Error, Result};
use crate::schema::Backend;

/// Attempts granted to name a valid backend.
pub const MAX_BACKEND_ATTEMPTS: usize = 3;

/// Source of interactive answers.
pub trait Prompter {
    /// Reads one line of text.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Reads a secret without echoing it.
    fn password(&self, prompt: &str) -> Result<String>;

    /// Asks a yes/no question.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Fills the gaps of a partially configured source.
pub struct Wizard<P> {
    prompter: P,
    env: EnvLookup,
    ui: ExportUI,
}

/// Interprets a Y/N answer. Only "y" (any case) means yes.
pub fn parse_yes_no(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl<P: Prompter> Wizard<P> {
    /// Creates a wizard reading secrets from the process environment.
    pub fn new(prompter: P) -> Self {
        Self::with_env(prompter, process_env)
    }

    /// Creates a wizard with a custom environment lookup.
    pub fn with_env(prompter: P, env: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            prompter,
            env: Box::new(env),
            ui: ExportUI::new(),
        }
    }

    /// Completes `source`, asking for the backend first when none was given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backend cannot be determined, a
    /// required value stays empty, or a prompt is cancelled.
    pub fn resolve_source(&self, source: Option<SourceConfig>) -> Result<SourceConfig> {
        let source = match source {
            Some(source) => source,
            None => SourceConfig::empty(self.select_backend()?),
        };
        self.complete_source(source)
    }

    /// Asks for the backend name, giving up after [`MAX_BACKEND_ATTEMPTS`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when every attempt named an unknown backend.
    pub fn select_backend(&self) -> Result<Backend> {
        for attempt in 1..=MAX_BACKEND_ATTEMPTS {
            let answer = self.prompter.input(
                "Enter the name of vector database to export (pinecone, weaviate, qdrant)",
                None,
            )?;
            match answer.parse::<Backend>() {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    warn!("Attempt {attempt}/{MAX_BACKEND_ATTEMPTS}: {e}");
                    self.ui.print_invalid_backend(answer.trim());
                }
            }
        }
        Err(Error::Config(format!(
            "no valid vector database given after {MAX_BACKEND_ATTEMPTS} attempts"
        )))
    }

    /// Fills every missing value of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required value stays empty or a prompt
    /// is cancelled.
    pub fn complete_source(&self, source: SourceConfig) -> Result<SourceConfig> {
        let completed = match source {
            SourceConfig::Pinecone(cfg) => SourceConfig::Pinecone(self.complete_pinecone(cfg)?),
            SourceConfig::Weaviate(cfg) => SourceConfig::Weaviate(self.complete_weaviate(cfg)?),
            SourceConfig::Qdrant(cfg) => SourceConfig::Qdrant(self.complete_qdrant(cfg)?),
        };
        debug!("Completed {} configuration", completed.backend());
        Ok(completed)
    }

    fn complete_pinecone(&self, mut cfg: PineconeConfig) -> Result<PineconeConfig> {
        if cfg.environment.is_empty() && cfg.controller_url.is_none() {
            cfg.environment =
                self.resolve_value("Enter the environment of Pinecone instance", None)?;
        }
        if cfg.index.is_empty() {
            cfg.index = self.resolve_value(
                "Enter the name of index to export, or type all to get all indexes",
                Some(ALL_COLLECTIONS),
            )?;
        }
        cfg.api_key = Some(self.resolve_secret(
            PINECONE_API_KEY_ENV,
            cfg.api_key.take(),
            "Enter your Pinecone API key",
        )?);
        Ok(cfg)
    }

    fn complete_weaviate(&self, mut cfg: WeaviateConfig) -> Result<WeaviateConfig> {
        if cfg.url.is_empty() {
            cfg.url = self.resolve_value(
                "Enter the location of Weaviate instance",
                Some("http://localhost:8080"),
            )?;
        }
        if cfg.class_name.is_empty() {
            cfg.class_name = self.resolve_value(
                "Enter the name of class to export, or type all to export all classes",
                None,
            )?;
        }
        if cfg.include_cross_references.is_none() {
            let answer = self
                .prompter
                .input("Include cross references, enter Y or N", Some("N"))?;
            cfg.include_cross_references = Some(parse_yes_no(&answer));
        }
        cfg.api_key = self.resolve_optional_secret(
            WEAVIATE_API_KEY_ENV,
            cfg.api_key.take(),
            "Weaviate API key",
        )?;
        Ok(cfg)
    }

    fn complete_qdrant(&self, mut cfg: QdrantConfig) -> Result<QdrantConfig> {
        if cfg.url.is_empty() {
            cfg.url = self.resolve_value(
                "Enter the location of Qdrant instance",
                Some("http://localhost:6333"),
            )?;
        }
        if cfg.collection.is_empty() {
            cfg.collection = self.resolve_value(
                "Enter the name of collection to export, or type all to export all collections",
                None,
            )?;
        }
        cfg.api_key = self.resolve_optional_secret(
            QDRANT_API_KEY_ENV,
            cfg.api_key.take(),
            "Qdrant API key",
        )?;
        Ok(cfg)
    }

    /// Prompts for a required value.
    fn resolve_value(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let value = self.prompter.input(prompt, default)?.trim().to_string();
        if value.is_empty() {
            return Err(Error::Config(format!("{prompt}: a value is required")));
        }
        Ok(value)
    }

    /// Environment first, then the configured value, then a masked prompt.
    fn resolve_secret(
        &self,
        env_name: &str,
        current: Option<String>,
        prompt: &str,
    ) -> Result<String> {
        if let Some(value) = (self.env)(env_name) {
            debug!("Using {env_name} from the environment");
            return Ok(value);
        }
        if let Some(value) = current.filter(|v| !v.is_empty()) {
            return Ok(value);
        }
        let value = self.prompter.password(prompt)?;
        if value.is_empty() {
            return Err(Error::Config(format!("{env_name} is required")));
        }
        Ok(value)
    }

    /// Like [`Self::resolve_secret`], but asks whether a key exists at all.
    fn resolve_optional_secret(
        &self,
        env_name: &str,
        current: Option<String>,
        label: &str,
    ) -> Result<Option<String>> {
        if let Some(value) = (self.env)(env_name) {
            debug!("Using {env_name} from the environment");
            return Ok(Some(value));
        }
        if let Some(value) = current.filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }
        if !self
            .prompter
            .confirm(&format!("Do you have a {label}? (optional)"), false)?
        {
            return Ok(None);
        }
        let value = self.prompter.password(label)?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }
}
