use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wasm_bindgen::prelude::*;

use crate::error::BuildError;

/// Cooperative cancellation flag shared between a caller and a running generation.
///
/// The core polls it between features; collaborators (cursors, elevation queries)
/// receive it too and may bail out early on their own.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    pub id: String,
    is_cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token nobody holds a handle to; never fires.
    pub fn none() -> Self {
        Self::new("")
    }

    pub fn cancel(&self) {
        self.is_cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled(self.id.clone()))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

/// Tokens for in-flight operations started through the wasm surface.
#[derive(Default)]
pub struct CancellationManager {
    tokens: HashMap<String, CancellationToken>,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_token(&mut self, id: &str) -> CancellationToken {
        // Starting a new operation under a live id supersedes the old one
        if let Some(existing) = self.tokens.get(id) {
            existing.cancel();
        }

        let token = CancellationToken::new(id);
        self.tokens.insert(id.to_string(), token.clone());
        token
    }

    pub fn cancel_token(&mut self, id: &str) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get_token(&self, id: &str) -> Option<&CancellationToken> {
        self.tokens.get(id)
    }

    pub fn cleanup_token(&mut self, id: &str) {
        self.tokens.remove(id);
    }
}

lazy_static! {
    static ref GLOBAL_CANCELLATION_MANAGER: Mutex<CancellationManager> =
        Mutex::new(CancellationManager::new());
}

pub fn register_operation(id: &str) -> CancellationToken {
    GLOBAL_CANCELLATION_MANAGER.lock().create_token(id)
}

#[wasm_bindgen]
pub fn cancel_operation(id: &str) -> bool {
    GLOBAL_CANCELLATION_MANAGER.lock().cancel_token(id)
}

#[wasm_bindgen]
pub fn cleanup_operation(id: &str) {
    GLOBAL_CANCELLATION_MANAGER.lock().cleanup_token(id);
}

pub fn get_operation_token(id: &str) -> Option<CancellationToken> {
    GLOBAL_CANCELLATION_MANAGER.lock().get_token(id).cloned()
}
