// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cooperative shutdown flag.
//!
//! Every loop in the pipeline polls this flag: receivers observe it within
//! one socket timeout (<= 1 s), processors on their next pop iteration.
//! The binary installs it into a Ctrl-C handler; tests trip it directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap cloneable handle to the process-wide stop flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    stopped: Arc<AtomicBool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent, callable from signal context.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
