//! Integration-side entry lifecycle

use async_trait::async_trait;

use crate::entry::ConfigEntry;

/// Result of an integration's setup or unload; `Err` carries the reason
pub type HandlerResult = Result<(), String>;

/// Callbacks to run when an entry is unloaded
///
/// Run in reverse order of registration, on unload and when setup fails
/// after some of them were pushed.
#[derive(Default)]
pub struct OnUnload {
    callbacks: Vec<Box<dyn FnOnce() + Send + Sync>>,
}

impl OnUnload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn run(self) {
        for callback in self.callbacks.into_iter().rev() {
            callback();
        }
    }
}

impl std::fmt::Debug for OnUnload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnUnload")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Sets up and unloads the config entries of one integration domain
#[async_trait]
pub trait EntryHandler: Send + Sync {
    /// Set up an entry; push anything that must be released on unload
    async fn setup_entry(&self, entry: &ConfigEntry, on_unload: &mut OnUnload) -> HandlerResult;

    /// Unload an entry; the `OnUnload` callbacks run after this succeeds
    async fn unload_entry(&self, entry: &ConfigEntry) -> HandlerResult;
}
