//! Session records (one per terminal tab)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use shellgate_protocol::HostConfig;

static LAST_CREATED_MS: AtomicU64 = AtomicU64::new(0);

/// `<host id>-<creation millis>`. Creation times are strictly increasing
/// within the process, so the same host opened twice gets distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(host_id: u64, created_at_ms: u64) -> Self {
        Self(format!("{host_id}-{created_at_ms}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One live or pending terminal
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub host: HostConfig,
    pub title: String,
    pub is_active: bool,
    pub created_at_ms: u64,
}

impl Session {
    pub fn new(host: HostConfig, title: String) -> Self {
        let created_at_ms = unique_now_ms();
        Self {
            id: SessionId::new(host.id, created_at_ms),
            host,
            title,
            is_active: false,
            created_at_ms,
        }
    }
}

/// Wall-clock millis, bumped past the previous value when two sessions are
/// created in the same millisecond.
fn unique_now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut last = LAST_CREATED_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_CREATED_MS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use shellgate_protocol::AuthMethod;

    use super::*;

    fn host(id: u64) -> HostConfig {
        HostConfig {
            id,
            name: format!("host-{id}"),
            address: "127.0.0.1".to_string(),
            port: 22,
            username: "me".to_string(),
            auth: AuthMethod::Password {
                password: "pw".to_string(),
            },
        }
    }

    #[test]
    fn same_host_twice_gets_distinct_ids() {
        let a = Session::new(host(1), "a".into());
        let b = Session::new(host(1), "b".into());
        assert_ne!(a.id, b.id);
        assert!(b.created_at_ms > a.created_at_ms);
        assert!(a.id.as_str().starts_with("1-"));
    }

    #[test]
    fn ids_stay_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..250)
                        .map(|_| Session::new(host(9), String::new()).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread") {
                assert!(seen.insert(id), "duplicate session id");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
