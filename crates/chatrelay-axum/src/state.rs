//! Shared application state type.

use crate::bootstrap::AxumContext;
use std::sync::Arc;

/// Application state shared across all handlers and both routers.
pub type AppState = Arc<AxumContext>;
