//! Per-channel presence membership tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A member currently present on a presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PresenceMember {
    pub id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub info: Value,
}

struct MemberEntry {
    member: PresenceMember,
    last_seen: Instant,
}

/// Thread-safe presence registry, keyed by wire channel name.
///
/// Membership is per-channel; a member appears at most once per channel and
/// is refreshed on every poll touch. Members that stop touching are removed
/// by the TTL sweeper.
pub struct PresenceRegistry {
    channels: DashMap<String, HashMap<String, MemberEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Insert or refresh `member` on `channel` and return the channel's
    /// current member list, ordered by member id.
    pub fn touch(&self, channel: &str, member: PresenceMember) -> Vec<PresenceMember> {
        let mut members = self.channels.entry(channel.to_string()).or_default();
        members.insert(
            member.id.clone(),
            MemberEntry {
                member,
                last_seen: Instant::now(),
            },
        );

        let mut list: Vec<PresenceMember> =
            members.values().map(|entry| entry.member.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Current member list for `channel`, ordered by member id.
    pub fn members(&self, channel: &str) -> Vec<PresenceMember> {
        let Some(members) = self.channels.get(channel) else {
            return Vec::new();
        };
        let mut list: Vec<PresenceMember> =
            members.values().map(|entry| entry.member.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Remove members not touched within `ttl`; returns how many were
    /// removed. Channels left empty are removed entirely.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.channels.retain(|_, members| {
            members.retain(|_, entry| {
                let alive = now.duration_since(entry.last_seen) <= ttl;
                if !alive {
                    removed += 1;
                }
                alive
            });
            !members.is_empty()
        });

        removed
    }
}
