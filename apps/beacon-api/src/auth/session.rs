//! Session token and socket-association management.

use serde::{Deserialize, Serialize};

use crate::auth::principal::Principal;
use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Opaque token generation
// ---------------------------------------------------------------------------

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

// ---------------------------------------------------------------------------
// Sessions — bearer token → principal
// ---------------------------------------------------------------------------

/// Session TTL in seconds (12 hours).
pub const SESSION_TTL_SECS: u64 = 12 * 3600;

/// Data stored alongside a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionData {
    pub principal: Principal,
}

pub fn generate_session_token() -> String {
    generate_opaque_token("ses", 32)
}

pub async fn store_session(
    kv: &dyn KeyValueStore,
    token: &str,
    principal: &Principal,
) -> Result<(), ApiError> {
    let key = format!("beacon:session:{}", token);
    let value = serde_json::to_string(&SessionData {
        principal: principal.clone(),
    })
    .map_err(|_| ApiError::internal("serialization"))?;
    kv.set_ex(&key, &value, SESSION_TTL_SECS).await
}

pub async fn lookup_session(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<Principal>, ApiError> {
    let key = format!("beacon:session:{}", token);
    match kv.get(&key).await? {
        Some(v) => {
            let data: SessionData = serde_json::from_str(&v)
                .map_err(|_| ApiError::internal("corrupt session data"))?;
            Ok(Some(data.principal))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Socket association — principal → live connection id
// ---------------------------------------------------------------------------

/// Socket association TTL in seconds (1 hour).
pub const SOCKET_TTL_SECS: u64 = 3600;

pub async fn store_socket(
    kv: &dyn KeyValueStore,
    principal_id: &str,
    socket_id: &str,
) -> Result<(), ApiError> {
    let key = format!("beacon:socket:{}", principal_id);
    kv.set_ex(&key, socket_id, SOCKET_TTL_SECS).await
}

pub async fn lookup_socket(
    kv: &dyn KeyValueStore,
    principal_id: &str,
) -> Result<Option<String>, ApiError> {
    let key = format!("beacon:socket:{}", principal_id);
    kv.get(&key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::MemoryStore;

    #[test]
    fn opaque_tokens_are_prefixed_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert!(a.starts_with("ses_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn session_round_trip() {
        let kv = MemoryStore::new();
        let principal = Principal::new("u1", "alice");
        store_session(&kv, "tok", &principal).await.unwrap();

        let found = lookup_session(&kv, "tok").await.unwrap();
        assert_eq!(found, Some(principal));

        assert!(lookup_session(&kv, "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn socket_association_round_trip() {
        let kv = MemoryStore::new();
        store_socket(&kv, "u1", "sock_abc").await.unwrap();
        assert_eq!(
            lookup_socket(&kv, "u1").await.unwrap().as_deref(),
            Some("sock_abc")
        );
    }
}
