//! Process-wide unique session keys
//!
//! Keys look like `FLVSUB1`, `FLVSUB2`, ...: a prefix naming the kind of
//! session followed by a counter shared by every prefix.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of session a key is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKeyPrefix {
    /// HTTP-FLV subscriber session
    FlvSubSession,
    /// HTTP-FLV server instance
    FlvServer,
}

impl UniqueKeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueKeyPrefix::FlvSubSession => "FLVSUB",
            UniqueKeyPrefix::FlvServer => "FLVSERVER",
        }
    }
}

impl fmt::Display for UniqueKeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a new key for `prefix`
pub fn gen_unique_key(prefix: UniqueKeyPrefix) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", prefix, id)
}
