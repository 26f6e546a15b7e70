//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{ApportionmentSession, ElectionInput};
use crate::config::Settings;
use crate::infrastructure::tally_file::TallyFileLoader;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    pub loader: TallyFileLoader,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        let settings = Arc::new(settings);
        let loader = TallyFileLoader::new(Arc::clone(&fs));

        Self { settings, fs, loader }
    }

    /// A fresh session for `input`, configured from the settings.
    pub fn session(&self, input: ElectionInput) -> ApportionmentSession {
        ApportionmentSession::new(input, self.settings.double_proportional_options())
    }
}
