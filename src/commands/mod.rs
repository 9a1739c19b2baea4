// Command implementations for the devboot CLI

pub mod descriptors;
pub mod platform;
pub mod resolve;
pub mod venv;

use std::path::Path;

use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::language::{Definition, Language, ProviderRegistry, Resolver};

/// Everything a command needs for one language of one project
pub struct Session {
    pub ctx: Context,
    pub language: Language,
    pub registry: ProviderRegistry,
}

impl Session {
    /// Load project configuration and register the language's built-in providers
    pub fn open(project_dir: &Path, config_path: Option<&Path>, language: Language) -> Result<Self> {
        let config = Config::load(project_dir, config_path)?;
        Ok(Self::from_context(Context::new(config)?, language))
    }

    pub fn from_context(ctx: Context, language: Language) -> Self {
        Self {
            registry: language.builtin_providers(ctx.platform()),
            ctx,
            language,
        }
    }

    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.ctx, &self.registry)
    }

    pub fn definition(&self, name: &str) -> Result<Definition> {
        self.ctx.descriptors().get_definition(self.language, name)
    }
}
