use crate::cache::MemoryCache;
use crate::prelude::*;
use rand::RngCore;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Default cookie name per spec/config; overridable via `SessionStore::new`.
pub const DEFAULT_SESSION_COOKIE: &str = "litefs.sid";
/// Default session capacity: an entry-count-bounded LRU, not byte-sized.
pub const DEFAULT_SESSION_CAPACITY: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct Session {
    pub data: HashMap<String, String>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    pub fn new(ttl: u64) -> Self {
        Session {
            data: HashMap::new(),
            created_at: current_timestamp(),
            expires_at: current_timestamp() + ttl,
        }
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

pub struct SessionStore {
    sessions: MemoryCache<Session>,
    ttl: u64,
    cookie_name: String,
    pub last_cleanup: Instant,
}

impl SessionStore {
    pub fn new(ttl: u64) -> Self {
        SessionStore {
            sessions: MemoryCache::new(DEFAULT_SESSION_CAPACITY),
            ttl,
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            last_cleanup: Instant::now(),
        }
    }

    /// 160-bit session id: random nonce + wall-clock salted through SHA-1, so
    /// ids aren't guessable from the issue timestamp alone.
    fn generate_session_id() -> String {
        let mut nonce = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(current_timestamp().to_le_bytes());
        let digest = hasher.finalize();

        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Mints an id guaranteed absent from the store at the moment of
    /// insertion, retrying on the vanishingly unlikely collision.
    fn generate_unique_session_id(&mut self) -> String {
        loop {
            let id = Self::generate_session_id();
            if self.sessions.get(&id).is_none() {
                return id;
            }
        }
    }

    pub fn cleanup(&mut self) {
        let now = current_timestamp();
        self.sessions.retain(|s| !s.is_expired(now));
        self.last_cleanup = Instant::now();
    }

    fn setup_new_session(&mut self, res: &mut HttpResponse) {
        let id = self.generate_unique_session_id();
        self.sessions.put(id.clone(), Session::new(self.ttl));

        let set_cookie = SetCookie::new(&self.cookie_name, &id)
            .max_age(self.ttl)
            .to_header();

        res.headers.insert("Set-Cookie".to_string(), set_cookie);
    }

    pub fn mange_session_store(&mut self, conn: &mut HttpConnection) {
        let cookies_header = conn.request.headers.get("cookie");
        let cookies: Cookies = match cookies_header {
            Some(data) => Cookies::parse(data),
            None => Cookies::new(),
        };

        let cookie_name = self.cookie_name.clone();
        match cookies.get(&cookie_name) {
            Some(session_id) => match self.sessions.get(session_id) {
                Some(session) if !session.is_expired(current_timestamp()) => {}
                _ => {
                    self.setup_new_session(&mut conn.response);
                }
            },
            _ => {
                self.setup_new_session(&mut conn.response);
            }
        };
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
