//! Channel value type and wire naming.

use std::fmt;

/// Who may subscribe to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Anyone may subscribe; no authorization performed.
    Public,
    /// Requires an authenticated principal and a granting channel guard.
    Private,
    /// Like private, but subscribers are tracked as presence members.
    Presence,
    /// Private channel whose payloads are encrypted by the transport.
    EncryptedPrivate,
}

/// A named broadcast destination with a visibility class.
///
/// The visibility prefix (`private-`, `presence-`, `private-encrypted-`) is
/// derived when the channel is serialized to its wire form, never stored in
/// `name`. A user-chosen `name` that itself starts with a reserved prefix is
/// not validated or escaped here; callers must avoid reserved prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub name: String,
    pub visibility: Visibility,
}

impl Channel {
    pub fn new(name: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            visibility,
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Public)
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Private)
    }

    pub fn presence(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Presence)
    }

    pub fn private_encrypted(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::EncryptedPrivate)
    }

    /// The channel name as clients see it on the wire.
    pub fn wire_name(&self) -> String {
        match self.visibility {
            Visibility::Public => self.name.clone(),
            Visibility::Private => format!("private-{}", self.name),
            Visibility::Presence => format!("presence-{}", self.name),
            Visibility::EncryptedPrivate => format!("private-encrypted-{}", self.name),
        }
    }

    /// Parse a wire channel name back into a `Channel`.
    ///
    /// `private-encrypted-` is checked before `private-` so the longer prefix
    /// wins.
    pub fn from_wire(wire: &str) -> Self {
        if let Some(rest) = wire.strip_prefix("private-encrypted-") {
            Self::private_encrypted(rest)
        } else if let Some(rest) = wire.strip_prefix("presence-") {
            Self::presence(rest)
        } else if let Some(rest) = wire.strip_prefix("private-") {
            Self::private(rest)
        } else {
            Self::public(wire)
        }
    }

    /// Whether subscribing requires an authenticated principal.
    pub fn requires_auth(&self) -> bool {
        !matches!(self.visibility, Visibility::Public)
    }

    pub fn is_presence(&self) -> bool {
        matches!(self.visibility, Visibility::Presence)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}
