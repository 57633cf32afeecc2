//! Request actor identity.

use serde::{Deserialize, Serialize};

/// Sentinel identity used when no authenticated actor is present.
pub const ANONYMOUS: &str = "anonymous";

/// The identity a request acts as.
///
/// Cache keys are scoped by actor so that two users never share an entry.
/// Identity resolution fails open: any error while looking up the caller
/// yields [`Actor::anonymous`] rather than failing the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// An authenticated actor with the given opaque identifier.
    pub fn authenticated(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            Self::anonymous()
        } else {
            Actor(id)
        }
    }

    /// The anonymous sentinel actor.
    pub fn anonymous() -> Self {
        Actor(ANONYMOUS.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
