//! Typed ID wrappers for frames, events, threads, tool calls, and memory entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up frame IDs, thread IDs, etc.
/// These are just strings underneath — no format requirement. IDs the
/// engine mints itself come from [`generate`](FrameId::generate) (UUID v4);
/// IDs arriving from outside (tool call ids from the model, caller-chosen
/// thread ids) are accepted verbatim.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh random ID.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(FrameId, "Unique identifier for an execution frame.");
typed_id!(EventId, "Unique identifier for a journaled event.");
typed_id!(ThreadId, "Unique identifier for a conversation thread.");
typed_id!(ToolCallId, "Identifier for a tool call, assigned by the model.");
typed_id!(EntryId, "Unique identifier for a memory entry.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(FrameId::generate(), FrameId::generate());
    }

    #[test]
    fn id_serde_is_transparent_string() {
        let id = ThreadId::new("thread-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"thread-1\"");
        let back: ThreadId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(EventId::new("ev-9").to_string(), "ev-9");
    }
}
