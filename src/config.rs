//! Worker startup configuration.
//!
//! The worker thread and its callers share no memory, so everything the
//! engine factory needs is captured here and handed over exactly once at
//! spawn time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_thread_name() -> String {
    "pdfium-worker".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name for the worker OS thread, visible in debuggers and profilers.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Path to the native engine shared library, for engines that resolve
    /// their symbols at runtime. `None` means statically linked or
    /// system-default lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            library_path: None,
        }
    }
}
