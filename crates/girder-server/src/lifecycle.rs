//! Initialize/shutdown lifecycle.
//!
//! Everything except the handshake is rejected until `build/initialize`
//! completes; `build/exit` returns 0 only after an orderly shutdown.

use girder_bsp as bsp;
use girder_core::file_uri_to_path;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

const BSP_VERSION: &str = "2.1.0";
const SERVER_NAME: &str = "girder";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("server is already initialized")]
    AlreadyInitialized,

    #[error("rootUri is not a usable file URI: {0}")]
    InvalidRoot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initialized,
    ShutdownRequested,
}

#[derive(Debug)]
pub struct LifecycleService {
    phase: Mutex<Phase>,
}

impl Default for LifecycleService {
    fn default() -> Self {
        Self {
            phase: Mutex::new(Phase::Uninitialized),
        }
    }
}

impl LifecycleService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `build/initialize`: returns the workspace root and the
    /// capability advertisement.
    pub fn initialize(
        &self,
        params: &bsp::InitializeBuildParams,
    ) -> Result<(PathBuf, bsp::InitializeBuildResult), LifecycleError> {
        let root = file_uri_to_path(&params.root_uri)
            .map_err(|_| LifecycleError::InvalidRoot(params.root_uri.clone()))?;

        let mut phase = self.phase.lock().expect("lifecycle lock poisoned");
        if *phase != Phase::Uninitialized {
            return Err(LifecycleError::AlreadyInitialized);
        }
        *phase = Phase::Initialized;

        tracing::info!(
            client = %params.display_name,
            version = %params.version,
            root = %root.display(),
            "client initialized"
        );

        let languages = vec![
            "java".to_string(),
            "kotlin".to_string(),
            "scala".to_string(),
            "groovy".to_string(),
        ];
        let result = bsp::InitializeBuildResult {
            display_name: SERVER_NAME.to_string(),
            version: girder_core::GIRDER_VERSION.to_string(),
            bsp_version: BSP_VERSION.to_string(),
            capabilities: bsp::ServerCapabilities {
                compile_provider: Some(bsp::LanguageProvider {
                    language_ids: languages.clone(),
                }),
                test_provider: Some(bsp::LanguageProvider {
                    language_ids: languages.clone(),
                }),
                run_provider: Some(bsp::LanguageProvider {
                    language_ids: languages,
                }),
                can_reload: true,
            },
        };
        Ok((root, result))
    }

    pub fn is_initialized(&self) -> bool {
        *self.phase.lock().expect("lifecycle lock poisoned") != Phase::Uninitialized
    }

    pub fn shutdown(&self) {
        *self.phase.lock().expect("lifecycle lock poisoned") = Phase::ShutdownRequested;
    }

    /// Exit code for `build/exit`: 0 after an orderly shutdown, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match *self.phase.lock().expect("lifecycle lock poisoned") {
            Phase::ShutdownRequested => 0,
            _ => 1,
        }
    }
}
