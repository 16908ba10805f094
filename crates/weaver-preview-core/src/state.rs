//! Coarse session state used to gate long-running user actions.

use std::fmt;

/// Session state machine states.
///
/// `Normal` is the only resting state. Every other state is entered by a
/// gated action and left again (back to `Normal`) when that action settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Session constructed, no document opened yet.
    #[default]
    Init,
    /// A document is being opened.
    Loading,
    Normal,
    /// A storage sync or pull is in flight.
    Syncing,
    /// A static export is being rendered and written.
    Exporting,
}

impl SessionState {
    /// Returns true if no gated action is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Whether an action entering some state may start from `self`.
    ///
    /// Starting from `Normal` is always allowed; any other state must be
    /// whitelisted in `ok_states`.
    pub fn admits(&self, ok_states: &[SessionState]) -> bool {
        self.is_idle() || ok_states.contains(self)
    }

    /// Progressive verb used in user-facing notices.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Init => "initializing",
            Self::Loading => "loading",
            Self::Normal => "idle",
            Self::Syncing => "synchronizing",
            Self::Exporting => "exporting",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}
