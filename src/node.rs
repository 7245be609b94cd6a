//! Process-wide node identity.
//!
//! A process joins the ROS graph once, under one name. Later attempts to
//! initialize report the existing name instead of replacing it.

use crate::error::{Error, Result};
use chrono::Utc;
use std::sync::OnceLock;

static NODE: OnceLock<String> = OnceLock::new();

/// Initializes the node as `name`.
///
/// Anonymous nodes get a `_<pid>_<millis>` suffix so several processes can
/// run under the same base name. Returns [`Error::AlreadyInitialized`] if the
/// node was initialized before, by this call site or any other.
pub fn init(name: &str, anonymous: bool) -> Result<&'static str> {
    if name.is_empty() {
        return Err(Error::InvalidInput("node name is empty".into()));
    }

    let full_name = if anonymous {
        format!(
            "{name}_{}_{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        )
    } else {
        name.to_string()
    };

    let mut initialized = false;
    let current = NODE.get_or_init(|| {
        initialized = true;
        full_name
    });

    if initialized {
        Ok(current.as_str())
    } else {
        Err(Error::AlreadyInitialized {
            name: current.clone(),
        })
    }
}

/// The name the node was initialized with, if any.
pub fn name() -> Option<&'static str> {
    NODE.get().map(String::as_str)
}
