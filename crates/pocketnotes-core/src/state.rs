//! Shared session state types.

/// Sign-in state of the current user.
///
/// Only changes through `NoteStore::set_signed_in`; there are no automatic
/// transitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn,
}

impl AuthState {
    pub const fn from_flag(signed_in: bool) -> Self {
        if signed_in {
            Self::SignedIn
        } else {
            Self::SignedOut
        }
    }

    pub const fn is_signed_in(self) -> bool {
        matches!(self, Self::SignedIn)
    }
}
