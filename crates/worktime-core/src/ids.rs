//! Type-safe identifiers for owners, tasks, work days and timer entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a `u64` newtype identifier with the usual conversions.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(
    /// The user whose time is being tracked.
    ///
    /// Always passed explicitly; there is no ambient "current user".
    OwnerId,
    "user-"
);

numeric_id!(
    /// A task that time can be logged against.
    TaskId,
    "task-"
);

numeric_id!(
    /// Identifier of a persisted work-day record.
    WorkDayId,
    "day-"
);

numeric_id!(
    /// Identifier of a task-level time entry.
    EntryId,
    "entry-"
);

/// Monotonic id allocator used by the in-memory books.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdSequence {
    last: u64,
}

impl IdSequence {
    /// Returns the next raw id, starting at 1.
    pub(crate) fn next_raw(&mut self) -> u64 {
        self.last = self.last.saturating_add(1);
        self.last
    }
}
