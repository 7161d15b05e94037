use crate::config::AclConfig;
use crate::error::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Key/value service the cache layer talks to. Keys arrive already
/// prefixed.
pub trait CacheBackend: Send + Sync {
    /// Values for `keys`, in input order.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Stores every pair with the same expiry.
    fn set_many_ex(&self, values: &[(String, String)], ttl: Duration) -> Result<(), CacheError>;

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Redis-backed cache using a single lazily opened connection.
///
/// A failed command drops the connection so the next call reconnects.
/// Connecting is bounded by the configured connect timeout.
pub struct RedisBackend {
    client: redis::Client,
    connect_timeout: Duration,
    connection: Mutex<Option<redis::Connection>>,
}

impl RedisBackend {
    /// Validates the config and URL without connecting.
    pub fn open(config: &AclConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let client = redis::Client::open(config.cache_url().as_str())?;
        Ok(Self {
            client,
            connect_timeout: config.cache_connect_timeout(),
            connection: Mutex::new(None),
        })
    }

    fn with_connection<T>(
        &self,
        command: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, CacheError> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(self.client.get_connection_with_timeout(self.connect_timeout)?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(CacheError::Unavailable("no redis connection".into()));
        };
        let result = command(connection);
        if result.is_err() {
            *guard = None;
        }
        result.map_err(CacheError::from)
    }
}

impl CacheBackend for RedisBackend {
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        self.with_connection(|connection| redis::cmd("MGET").arg(keys).query(connection))
    }

    fn set_many_ex(&self, values: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        self.with_connection(|connection| {
            let mut pipe = redis::pipe();
            for (key, value) in values {
                pipe.cmd("SETEX").arg(key).arg(seconds).arg(value).ignore();
            }
            pipe.query::<()>(connection)
        })
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        self.with_connection(|connection| redis::cmd("DEL").arg(keys).query::<()>(connection))
    }
}

/// In-process backend honouring expiry, for tests and single-process
/// deployments.
///
/// [`MemoryBackend::set_available`] switches it into a failing state to
/// simulate an unreachable cache service.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of backend calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Unexpired keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        self.enter()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(keys
            .iter()
            .map(|key| entries.get(key).map(|(value, _)| value.clone()))
            .collect())
    }

    fn set_many_ex(&self, values: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        self.enter()?;
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.lock();
        for (key, value) in values {
            entries.insert(key.clone(), (value.clone(), expires_at));
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        self.enter()?;
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
