//! Buffer staleness state machine.
//!
//! ```text
//! event        from                          to
//! Adopt(H/D)   any                           HostOnly / DeviceOnly
//! AdoptBoth    any                           InSync
//! Synced       any but Empty                 InSync
//! Wrote(H)     InSync, DeviceOnly/Newer      HostNewer
//! Wrote(D)     InSync, HostOnly/Newer        DeviceNewer
//! Freed(H)     HostOnly                      Empty
//! Freed(H)     other non-empty               DeviceOnly
//! Cleared      any                           Empty
//! ```
//!
//! [`BufferState::on`] is total: every (state, event) pair has exactly one
//! successor.

use core::fmt;

/// Memory side of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Host,
    Device,
}

impl Placement {
    /// The opposite side.
    pub const fn other(self) -> Self {
        match self {
            Placement::Host => Placement::Device,
            Placement::Device => Placement::Host,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Host => write!(f, "host"),
            Placement::Device => write!(f, "device"),
        }
    }
}

/// Which sides hold storage and which of them is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferState {
    /// No storage on either side
    #[default]
    Empty,
    /// Host storage only
    HostOnly,
    /// Device storage only
    DeviceOnly,
    /// Both present, host holds the latest writes
    HostNewer,
    /// Both present, device holds the latest writes
    DeviceNewer,
    /// Both present and identical
    InSync,
}

/// Something that happened to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    /// Storage adopted or allocated on one side, the other released
    Adopt(Placement),
    /// Storage adopted on both sides at once
    AdoptBoth,
    /// The stale side was refreshed from the authoritative one
    Synced,
    /// One side was written
    Wrote(Placement),
    /// One side was released
    Freed(Placement),
    /// Everything was released
    Cleared,
}

impl BufferState {
    /// Successor state after `event`.
    pub const fn on(self, event: BufferEvent) -> Self {
        use BufferEvent as E;
        use BufferState as S;

        match (self, event) {
            (_, E::Cleared) => S::Empty,
            (_, E::Adopt(Placement::Host)) => S::HostOnly,
            (_, E::Adopt(Placement::Device)) => S::DeviceOnly,
            (_, E::AdoptBoth) => S::InSync,

            (S::Empty, E::Synced) => S::Empty,
            (_, E::Synced) => S::InSync,

            (S::Empty, E::Wrote(_)) => S::Empty,
            (S::HostOnly, E::Wrote(Placement::Host)) => S::HostOnly,
            (S::DeviceOnly, E::Wrote(Placement::Device)) => S::DeviceOnly,
            (_, E::Wrote(Placement::Host)) => S::HostNewer,
            (_, E::Wrote(Placement::Device)) => S::DeviceNewer,

            (S::Empty | S::HostOnly, E::Freed(Placement::Host)) => S::Empty,
            (_, E::Freed(Placement::Host)) => S::DeviceOnly,
            (S::Empty | S::DeviceOnly, E::Freed(Placement::Device)) => S::Empty,
            (_, E::Freed(Placement::Device)) => S::HostOnly,
        }
    }

    /// Whether `placement` holds storage in this state.
    pub const fn has(self, placement: Placement) -> bool {
        match placement {
            Placement::Host => !matches!(self, BufferState::Empty | BufferState::DeviceOnly),
            Placement::Device => !matches!(self, BufferState::Empty | BufferState::HostOnly),
        }
    }

    /// Whether `placement` holds the current contents.
    pub const fn is_valid(self, placement: Placement) -> bool {
        match placement {
            Placement::Host => matches!(
                self,
                BufferState::HostOnly | BufferState::HostNewer | BufferState::InSync
            ),
            Placement::Device => matches!(
                self,
                BufferState::DeviceOnly | BufferState::DeviceNewer | BufferState::InSync
            ),
        }
    }

    /// Whether reading from `placement` first requires a copy.
    pub const fn needs_sync(self, placement: Placement) -> bool {
        !matches!(self, BufferState::Empty) && !self.is_valid(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [BufferState; 6] = [
        BufferState::Empty,
        BufferState::HostOnly,
        BufferState::DeviceOnly,
        BufferState::HostNewer,
        BufferState::DeviceNewer,
        BufferState::InSync,
    ];

    #[test]
    fn test_adopt_and_clear_ignore_previous_state() {
        for state in ALL_STATES {
            assert_eq!(
                state.on(BufferEvent::Adopt(Placement::Host)),
                BufferState::HostOnly
            );
            assert_eq!(
                state.on(BufferEvent::Adopt(Placement::Device)),
                BufferState::DeviceOnly
            );
            assert_eq!(state.on(BufferEvent::AdoptBoth), BufferState::InSync);
            assert_eq!(state.on(BufferEvent::Cleared), BufferState::Empty);
        }
    }

    #[test]
    fn test_write_marks_other_side_stale() {
        let state = BufferState::InSync.on(BufferEvent::Wrote(Placement::Device));
        assert_eq!(state, BufferState::DeviceNewer);
        assert!(state.needs_sync(Placement::Host));
        assert!(!state.needs_sync(Placement::Device));

        assert_eq!(state.on(BufferEvent::Synced), BufferState::InSync);
        assert_eq!(
            BufferState::HostOnly.on(BufferEvent::Wrote(Placement::Host)),
            BufferState::HostOnly
        );
        assert_eq!(
            BufferState::Empty.on(BufferEvent::Wrote(Placement::Host)),
            BufferState::Empty
        );
    }

    #[test]
    fn test_free_keeps_the_other_side() {
        assert_eq!(
            BufferState::InSync.on(BufferEvent::Freed(Placement::Host)),
            BufferState::DeviceOnly
        );
        assert_eq!(
            BufferState::HostOnly.on(BufferEvent::Freed(Placement::Host)),
            BufferState::Empty
        );
        assert_eq!(
            BufferState::HostNewer.on(BufferEvent::Freed(Placement::Device)),
            BufferState::HostOnly
        );
    }

    #[test]
    fn test_storage_presence_matches_state() {
        for state in ALL_STATES {
            for placement in [Placement::Host, Placement::Device] {
                if state.is_valid(placement) {
                    assert!(state.has(placement), "{state:?} {placement}");
                }
            }
            assert_eq!(
                state == BufferState::Empty,
                !state.has(Placement::Host) && !state.has(Placement::Device)
            );
        }
    }
}
