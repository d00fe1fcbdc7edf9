//! Channel guard registry: decides who may subscribe to guarded channels.

use std::collections::HashMap;

use serde_json::Value;

use crate::auth::principal::Principal;
use crate::broadcast::broadcaster::AuthDecision;
use crate::broadcast::channel::Channel;

/// Outcome of a channel guard callback.
pub enum Access {
    Denied,
    Granted,
    /// Granted, with explicit presence member info to expose.
    Member(Value),
}

/// Parameters extracted from a channel pattern match
/// (`orders.{id}` against `orders.42` yields `id = "42"`).
pub struct ChannelParams(HashMap<String, String>);

impl ChannelParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

enum Segment {
    Literal(String),
    Param(String),
}

type Guard = Box<dyn Fn(&Principal, &ChannelParams) -> Access + Send + Sync>;

struct GuardEntry {
    pattern: Vec<Segment>,
    guard: Guard,
}

/// Registry of channel patterns and their guards.
///
/// Built once at startup and shared (read-only) by every broadcaster backend.
/// Public channels always allow. Private/presence/encrypted channels deny
/// unless the caller is authenticated and the first matching guard grants.
#[derive(Default)]
pub struct ChannelAuthorizer {
    guards: Vec<GuardEntry>,
}

impl ChannelAuthorizer {
    pub fn new() -> Self {
        Self { guards: Vec::new() }
    }

    /// Register a guard for a channel pattern. Segments are dot-separated;
    /// `{param}` matches any single segment. Registration order wins when
    /// multiple patterns match.
    pub fn guard<F>(&mut self, pattern: &str, guard: F) -> &mut Self
    where
        F: Fn(&Principal, &ChannelParams) -> Access + Send + Sync + 'static,
    {
        let pattern = pattern
            .split('.')
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') {
                    Segment::Param(segment[1..segment.len() - 1].to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        self.guards.push(GuardEntry {
            pattern,
            guard: Box::new(guard),
        });
        self
    }

    /// Decide whether `principal` may subscribe to `channel`.
    pub fn authorize(&self, channel: &Channel, principal: Option<&Principal>) -> AuthDecision {
        if !channel.requires_auth() {
            return AuthDecision::Allow { member: None };
        }

        let Some(principal) = principal else {
            return AuthDecision::Deny;
        };

        for entry in &self.guards {
            let Some(params) = match_pattern(&entry.pattern, &channel.name) else {
                continue;
            };

            return match (entry.guard)(principal, &params) {
                Access::Denied => AuthDecision::Deny,
                Access::Granted => AuthDecision::Allow {
                    member: channel.is_presence().then(|| principal.member_info()),
                },
                Access::Member(info) => AuthDecision::Allow {
                    member: Some(info),
                },
            };
        }

        // A guarded channel with no registered guard is closed.
        AuthDecision::Deny
    }
}

fn match_pattern(pattern: &[Segment], name: &str) -> Option<ChannelParams> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() != pattern.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (segment, expected) in segments.iter().zip(pattern) {
        match expected {
            Segment::Literal(literal) if literal == segment => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), segment.to_string());
            }
        }
    }
    Some(ChannelParams(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal::new("u1", "alice")
    }

    #[test]
    fn public_channels_allow_without_guard_or_principal() {
        let auth = ChannelAuthorizer::new();
        let decision = auth.authorize(&Channel::public("news"), None);
        assert_eq!(decision, AuthDecision::Allow { member: None });
    }

    #[test]
    fn guarded_channel_denies_unauthenticated() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("orders.{id}", |_, _| Access::Granted);

        assert_eq!(auth.authorize(&Channel::private("orders.42"), None), AuthDecision::Deny);
        assert_eq!(auth.authorize(&Channel::presence("orders.42"), None), AuthDecision::Deny);
    }

    #[test]
    fn guarded_channel_denies_without_matching_guard() {
        let auth = ChannelAuthorizer::new();
        let decision = auth.authorize(&Channel::private("orders.42"), Some(&principal()));
        assert_eq!(decision, AuthDecision::Deny);
    }

    #[test]
    fn guard_params_are_extracted() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("orders.{id}", |p, params| {
            if params.get("id") == Some("42") && p.id == "u1" {
                Access::Granted
            } else {
                Access::Denied
            }
        });

        assert_eq!(
            auth.authorize(&Channel::private("orders.42"), Some(&principal())),
            AuthDecision::Allow { member: None }
        );
        assert_eq!(
            auth.authorize(&Channel::private("orders.43"), Some(&principal())),
            AuthDecision::Deny
        );
    }

    #[test]
    fn literal_and_length_mismatches_do_not_match() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("orders.{id}", |_, _| Access::Granted);

        // Different literal head.
        assert_eq!(
            auth.authorize(&Channel::private("invoices.42"), Some(&principal())),
            AuthDecision::Deny
        );
        // Extra segment.
        assert_eq!(
            auth.authorize(&Channel::private("orders.42.items"), Some(&principal())),
            AuthDecision::Deny
        );
    }

    #[test]
    fn presence_grant_defaults_to_principal_member_info() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("room.{id}", |_, _| Access::Granted);

        let decision = auth.authorize(&Channel::presence("room.7"), Some(&principal()));
        assert_eq!(
            decision,
            AuthDecision::Allow {
                member: Some(serde_json::json!({ "id": "u1", "name": "alice" })),
            }
        );
    }

    #[test]
    fn member_access_carries_custom_info() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("room.{id}", |p, _| {
            Access::Member(serde_json::json!({ "id": p.id, "role": "moderator" }))
        });

        let decision = auth.authorize(&Channel::presence("room.7"), Some(&principal()));
        assert_eq!(
            decision,
            AuthDecision::Allow {
                member: Some(serde_json::json!({ "id": "u1", "role": "moderator" })),
            }
        );
    }

    #[test]
    fn first_matching_guard_wins() {
        let mut auth = ChannelAuthorizer::new();
        auth.guard("room.{id}", |_, _| Access::Denied);
        auth.guard("room.{id}", |_, _| Access::Granted);

        assert_eq!(
            auth.authorize(&Channel::private("room.7"), Some(&principal())),
            AuthDecision::Deny
        );
    }
}
