use crate::utils::time::is_expired;
use dashmap::DashMap;

/// Session token issued at login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedToken {
    pub user_id: u32,
    pub issued_at: i64,
}

/// Opaque bearer tokens keyed by their raw 32 bytes.
///
/// Tokens live only in memory; a restart signs everyone out.
pub struct TokenStore {
    tokens: DashMap<[u8; 32], IssuedToken>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Issue a fresh random token for `user_id`, returned hex encoded
    pub fn issue(&self, user_id: u32, now: i64) -> String {
        let raw: [u8; 32] = rand::random();
        self.tokens.insert(
            raw,
            IssuedToken {
                user_id,
                issued_at: now,
            },
        );
        hex::encode(raw)
    }

    /// Look up a token presented by a client.
    /// Malformed, unknown and expired tokens all resolve to `None`.
    pub fn resolve(&self, token: &str, now: i64, ttl: Option<u64>) -> Option<IssuedToken> {
        let raw = decode_token(token)?;
        let issued = *self.tokens.get(&raw)?.value();

        if is_expired(issued.issued_at, ttl, now) {
            self.tokens.remove(&raw);
            return None;
        }

        Some(issued)
    }

    /// Drop every token of a user. Returns how many were removed.
    pub fn revoke_user(&self, user_id: u32) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, issued| issued.user_id != user_id);
        before.saturating_sub(self.tokens.len())
    }

    /// Remove expired tokens, returning the number removed
    pub fn purge_expired(&self, now: i64, ttl: Option<u64>) -> usize {
        if ttl.is_none() {
            return 0;
        }

        let before = self.tokens.len();
        self.tokens
            .retain(|_, issued| !is_expired(issued.issued_at, ttl, now));
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_token(token: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(token.trim()).ok()?;
    bytes.try_into().ok()
}
