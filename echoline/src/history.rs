//! # History Manager
//!
//! Coordinates the volatile cache and the durable store for every exchange.
//!
//! ## Resolution (cache-aside)
//!
//! 1. Cache hit with a trustworthy projection: use it.
//! 2. Otherwise read the durable store and, when it holds a record, write it
//!    back into the cache.
//! 3. A failing durable read degrades to an empty history.
//!
//! ## Persistence
//!
//! The cached projection is invalidated, then the durable store is written and
//! its failure aborts the request. The cache is repopulated last and its
//! failure is only logged. A failed or cancelled cache write therefore leaves a
//! miss, never a projection older than the durable record.

use echoline_store::{apply_jitter, CacheStore, DurableStore, Turn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::responder::{Responder, ResponderError};

/// Behaviour knobs for [`HistoryManager`]
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// TTL for cache writes
    pub cache_ttl: Duration,

    /// Fraction (0.0 - 1.0) by which each cache TTL is randomised
    pub cache_ttl_jitter: f64,

    /// Keep only the most recent N turns in the cache; `None` caches everything
    pub max_cached_turns: Option<usize>,

    /// Run requests for the same user one at a time within this process
    pub serialize_per_user: bool,

    /// Upper bound on a single `Responder::generate` call
    pub responder_timeout: Option<Duration>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            // 24 hours
            cache_ttl: Duration::from_secs(24 * 3600),
            cache_ttl_jitter: 0.0,
            max_cached_turns: None,
            serialize_per_user: true,
            responder_timeout: None,
        }
    }
}

/// Result of one successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub reply: String,
    /// Full history, ending with the user turn and the reply
    pub history: Vec<Turn>,
}

pub struct HistoryManager {
    cache: Arc<dyn CacheStore>,
    durable: Arc<dyn DurableStore>,
    responder: Arc<dyn Responder>,
    config: HistoryConfig,
    user_locks: UserLocks,
}

impl HistoryManager {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        durable: Arc<dyn DurableStore>,
        responder: Arc<dyn Responder>,
        config: HistoryConfig,
    ) -> Self {
        info!(
            "History manager using {} cache and {} durable store",
            cache.backend_name(),
            durable.backend_name()
        );

        Self {
            cache,
            durable,
            responder,
            config,
            user_locks: UserLocks::default(),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    /// Record `message` from `user_id`, generate a reply and persist both turns
    pub async fn handle(&self, user_id: &str, message: &str) -> Result<Exchange, ChatError> {
        validate_user_id(user_id)?;
        if message.trim().is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }

        let _user_guard = if self.config.serialize_per_user {
            Some(self.user_locks.acquire(user_id).await)
        } else {
            None
        };

        let mut history = self.resolve(user_id).await;
        history.push(Turn::user(message));

        let reply = self.generate(message, &history).await?;
        history.push(Turn::assistant(reply.clone()));

        if let Err(e) = self.cache.invalidate(user_id).await {
            warn!("Cache invalidation failed for {}, continuing: {}", user_id, e);
        }

        self.durable
            .set(user_id, &history)
            .await
            .map_err(ChatError::Persistence)?;

        self.write_cache(user_id, &history).await;

        debug!("User {} now has {} turns", user_id, history.len());
        Ok(Exchange { reply, history })
    }

    /// Current history for `user_id` without modifying it
    pub async fn history(&self, user_id: &str) -> Result<Vec<Turn>, ChatError> {
        validate_user_id(user_id)?;
        Ok(self.resolve(user_id).await)
    }

    async fn resolve(&self, user_id: &str) -> Vec<Turn> {
        match self.cache.get(user_id).await {
            Ok(Some(turns)) if self.is_complete_projection(&turns) => {
                debug!("History cache hit for {} ({} turns)", user_id, turns.len());
                return turns;
            }
            Ok(Some(turns)) => {
                debug!(
                    "Cached history for {} holds {} turns and may be truncated; reading durable store",
                    user_id,
                    turns.len()
                );
            }
            Ok(None) => debug!("History cache miss for {}", user_id),
            Err(e) => warn!("Cache read failed for {}, bypassing cache: {}", user_id, e),
        }

        match self.durable.get(user_id).await {
            Ok(Some(turns)) => {
                self.write_cache(user_id, &turns).await;
                turns
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    "Durable read failed for {}, continuing with empty history: {}",
                    user_id, e
                );
                Vec::new()
            }
        }
    }

    /// A projection that reached the truncation limit may be missing older turns
    fn is_complete_projection(&self, turns: &[Turn]) -> bool {
        match self.config.max_cached_turns {
            Some(limit) => turns.len() < limit,
            None => true,
        }
    }

    async fn generate(&self, message: &str, history: &[Turn]) -> Result<String, ResponderError> {
        let call = self.responder.generate(message, history);

        match self.config.responder_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ResponderError::Timeout(limit))?,
            None => call.await,
        }
    }

    async fn write_cache(&self, user_id: &str, history: &[Turn]) {
        let projection = match self.config.max_cached_turns {
            Some(limit) if history.len() > limit => &history[history.len() - limit..],
            _ => history,
        };
        let ttl = apply_jitter(self.config.cache_ttl, self.config.cache_ttl_jitter);

        if let Err(e) = self.cache.set(user_id, projection, ttl).await {
            warn!("Cache write failed for {}, continuing: {}", user_id, e);
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<(), ChatError> {
    if user_id.trim().is_empty() {
        return Err(ChatError::InvalidInput("user_id must not be empty".to_string()));
    }
    Ok(())
}

/// Per-user async mutexes, created on demand and dropped when unused
#[derive(Default)]
struct UserLocks {
    slots: Mutex<HashMap<String, UserSlot>>,
}

struct UserSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters
    users: usize,
}

impl UserLocks {
    async fn acquire(&self, user_id: &str) -> UserGuard<'_> {
        let lock = {
            let mut slots = self.slots();
            let slot = slots.entry(user_id.to_string()).or_insert_with(|| UserSlot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            slot.lock.clone()
        };

        // Registered before waiting: dropping a cancelled wait still releases the slot
        let mut guard = UserGuard {
            held: None,
            locks: self,
            user_id: user_id.to_string(),
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, UserSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots().len()
    }
}

struct UserGuard<'a> {
    held: Option<OwnedMutexGuard<()>>,
    locks: &'a UserLocks,
    user_id: String,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        self.held.take();

        if let Some(slot) = slots.get_mut(&self.user_id) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::EchoResponder;
    use async_trait::async_trait;
    use echoline_store::{
        CacheResult, CacheUnavailable, MemoryCache, MemoryConversationStore, Role, StoreError,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    /// Cache double recording every `set`, with switchable failures
    #[derive(Default)]
    struct FakeCache {
        entries: Mutex<HashMap<String, Vec<Turn>>>,
        sets: Mutex<Vec<(String, Vec<Turn>, Duration)>>,
        always_miss: bool,
        fail: AtomicBool,
        fail_set: AtomicBool,
        hang_set: AtomicBool,
    }

    impl FakeCache {
        fn always_miss() -> Self {
            Self {
                always_miss: true,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            let cache = Self::default();
            cache.fail.store(true, Ordering::SeqCst);
            cache
        }

        fn seed(&self, user_id: &str, turns: Vec<Turn>) {
            self.entries.lock().unwrap().insert(user_id.to_string(), turns);
        }

        fn sets(&self) -> Vec<(String, Vec<Turn>, Duration)> {
            self.sets.lock().unwrap().clone()
        }

        fn cached(&self, user_id: &str) -> Option<Vec<Turn>> {
            self.entries.lock().unwrap().get(user_id).cloned()
        }
    }

    #[async_trait]
    impl CacheStore for FakeCache {
        async fn get(&self, user_id: &str) -> CacheResult<Option<Vec<Turn>>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheUnavailable::new("connection refused"));
            }
            if self.always_miss {
                return Ok(None);
            }
            Ok(self.cached(user_id))
        }

        async fn set(&self, user_id: &str, turns: &[Turn], ttl: Duration) -> CacheResult<()> {
            if self.fail.load(Ordering::SeqCst) || self.fail_set.load(Ordering::SeqCst) {
                return Err(CacheUnavailable::new("connection refused"));
            }
            if self.hang_set.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.sets
                .lock()
                .unwrap()
                .push((user_id.to_string(), turns.to_vec(), ttl));
            self.seed(user_id, turns.to_vec());
            Ok(())
        }

        async fn invalidate(&self, user_id: &str) -> CacheResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheUnavailable::new("connection refused"));
            }
            self.entries.lock().unwrap().remove(user_id);
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }
    }

    /// Durable double with switchable read/write failures
    #[derive(Default)]
    struct FakeDurable {
        records: Mutex<HashMap<String, Vec<Turn>>>,
        fail_get: AtomicBool,
        fail_set: AtomicBool,
        gets: AtomicUsize,
    }

    impl FakeDurable {
        fn seed(&self, user_id: &str, turns: Vec<Turn>) {
            self.records.lock().unwrap().insert(user_id.to_string(), turns);
        }

        fn stored(&self, user_id: &str) -> Option<Vec<Turn>> {
            self.records.lock().unwrap().get(user_id).cloned()
        }
    }

    #[async_trait]
    impl DurableStore for FakeDurable {
        async fn get(&self, user_id: &str) -> echoline_store::Result<Option<Vec<Turn>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::ConnectionError("db down".to_string()));
            }
            Ok(self.stored(user_id))
        }

        async fn set(&self, user_id: &str, turns: &[Turn]) -> echoline_store::Result<()> {
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(StoreError::QueryError("write rejected".to_string()));
            }
            self.seed(user_id, turns.to_vec());
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }
    }

    struct FailingResponder;

    #[async_trait]
    impl Responder for FailingResponder {
        async fn generate(&self, _message: &str, _history: &[Turn]) -> Result<String, ResponderError> {
            Err(ResponderError::Failed("model unavailable".to_string()))
        }
    }

    struct SlowResponder(Duration);

    #[async_trait]
    impl Responder for SlowResponder {
        async fn generate(&self, message: &str, _history: &[Turn]) -> Result<String, ResponderError> {
            tokio::time::sleep(self.0).await;
            Ok(message.to_string())
        }
    }

    /// Holds every caller until `n` of them have resolved their history
    struct BarrierResponder(Barrier);

    #[async_trait]
    impl Responder for BarrierResponder {
        async fn generate(&self, message: &str, _history: &[Turn]) -> Result<String, ResponderError> {
            self.0.wait().await;
            Ok(format!("Echo: {}", message))
        }
    }

    /// Yields mid-generation so concurrent requests interleave
    struct YieldingEcho;

    #[async_trait]
    impl Responder for YieldingEcho {
        async fn generate(&self, message: &str, _history: &[Turn]) -> Result<String, ResponderError> {
            tokio::task::yield_now().await;
            Ok(format!("Echo: {}", message))
        }
    }

    fn manager_with(
        cache: Arc<FakeCache>,
        durable: Arc<FakeDurable>,
        responder: Arc<dyn Responder>,
        config: HistoryConfig,
    ) -> HistoryManager {
        HistoryManager::new(cache, durable, responder, config)
    }

    fn echo_manager(cache: Arc<FakeCache>, durable: Arc<FakeDurable>) -> HistoryManager {
        manager_with(cache, durable, Arc::new(EchoResponder), HistoryConfig::default())
    }

    fn prior_turns(exchanges: usize) -> Vec<Turn> {
        (0..exchanges)
            .flat_map(|i| [Turn::user(format!("old {}", i)), Turn::assistant(format!("Echo: old {}", i))])
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_user_gets_two_turns() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let manager = echo_manager(cache.clone(), durable.clone());

        let exchange = manager.handle("u1", "hi").await.unwrap();

        assert_eq!(exchange.reply, "Echo: hi");
        assert_eq!(exchange.history, vec![Turn::user("hi"), Turn::assistant("Echo: hi")]);
        assert_eq!(durable.stored("u1"), Some(exchange.history.clone()));
        assert_eq!(cache.cached("u1"), Some(exchange.history));
    }

    #[tokio::test]
    async fn test_second_message_extends_history() {
        let manager = echo_manager(Arc::new(FakeCache::default()), Arc::new(FakeDurable::default()));

        manager.handle("u1", "hi").await.unwrap();
        let exchange = manager.handle("u1", "again").await.unwrap();

        assert_eq!(exchange.reply, "Echo: again");
        assert_eq!(exchange.history.len(), 4);
        assert_eq!(exchange.history[2], Turn::user("again"));
        assert_eq!(exchange.history[3], Turn::assistant("Echo: again"));
    }

    #[tokio::test]
    async fn test_n_calls_yield_2n_turns_in_order() {
        let manager = echo_manager(Arc::new(FakeCache::default()), Arc::new(FakeDurable::default()));

        let mut last = None;
        for i in 0..5 {
            last = Some(manager.handle("u1", &format!("m{}", i)).await.unwrap());
        }

        let history = last.unwrap().history;
        assert_eq!(history.len(), 10);
        for (i, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0], Turn::user(format!("m{}", i)));
            assert_eq!(pair[1], Turn::assistant(format!("Echo: m{}", i)));
        }
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_durable() {
        let cache = Arc::new(FakeCache::always_miss());
        let durable = Arc::new(FakeDurable::default());
        durable.seed("u1", prior_turns(3));
        let manager = echo_manager(cache.clone(), durable.clone());

        let exchange = manager.handle("u1", "hi").await.unwrap();

        assert_eq!(exchange.history.len(), 8);
        assert_eq!(&exchange.history[..6], prior_turns(3).as_slice());

        let sets = cache.sets();
        // write-through of the durable record, then the updated history
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].1, prior_turns(3));
        assert_eq!(sets.last().unwrap().1, exchange.history);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_durable_read() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        cache.seed("u1", prior_turns(1));
        let manager = echo_manager(cache, durable.clone());

        let exchange = manager.handle("u1", "hi").await.unwrap();

        assert_eq!(exchange.history.len(), 4);
        assert_eq!(durable.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_durable() {
        let cache = Arc::new(FakeCache::failing());
        let durable = Arc::new(FakeDurable::default());
        durable.seed("u1", prior_turns(2));
        let manager = echo_manager(cache, durable.clone());

        let exchange = manager.handle("u1", "hi").await.unwrap();

        assert_eq!(exchange.history.len(), 6);
        assert_eq!(durable.stored("u1"), Some(exchange.history));
    }

    #[tokio::test]
    async fn test_durable_write_failure_is_fatal_and_skips_cache() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        durable.fail_set.store(true, Ordering::SeqCst);
        let manager = echo_manager(cache.clone(), durable.clone());

        let err = manager.handle("u1", "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Persistence(_)));
        assert!(cache.sets().is_empty());
        assert_eq!(durable.stored("u1"), None);
    }

    #[tokio::test]
    async fn test_failed_cache_write_never_leaves_stale_history() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let manager = echo_manager(cache.clone(), durable.clone());

        manager.handle("u1", "one").await.unwrap();

        cache.fail_set.store(true, Ordering::SeqCst);
        manager.handle("u1", "two").await.unwrap();
        assert_eq!(cache.cached("u1"), None);

        cache.fail_set.store(false, Ordering::SeqCst);
        let exchange = manager.handle("u1", "three").await.unwrap();

        let stored = durable.stored("u1").unwrap();
        assert_eq!(stored.len(), 6);
        assert_eq!(stored[2], Turn::user("two"));
        assert_eq!(exchange.history, stored);
    }

    #[tokio::test]
    async fn test_cancelled_cache_write_leaves_a_miss() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let manager = echo_manager(cache.clone(), durable.clone());

        manager.handle("u1", "one").await.unwrap();

        // The durable write lands, then the caller goes away mid cache write
        cache.hang_set.store(true, Ordering::SeqCst);
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), manager.handle("u1", "two")).await;
        assert!(cancelled.is_err());
        assert_eq!(durable.stored("u1").unwrap().len(), 4);
        assert_eq!(cache.cached("u1"), None);

        cache.hang_set.store(false, Ordering::SeqCst);
        let exchange = manager.handle("u1", "three").await.unwrap();
        assert_eq!(exchange.history.len(), 6);
        assert_eq!(exchange.history[2], Turn::user("two"));
        assert_eq!(manager.user_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_lock_wait_releases_slot() {
        let locks = UserLocks::default();

        let held = locks.acquire("u1").await;
        let mut waiter = Box::pin(locks.acquire("u1"));
        assert!(futures::poll!(&mut waiter).is_pending());
        assert_eq!(locks.len(), 1);

        // Holder leaves first, then the waiter is abandoned before it runs again
        drop(held);
        drop(waiter);
        assert_eq!(locks.len(), 0);

        let _again = locks.acquire("u1").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_durable_read_failure_starts_from_empty_history() {
        let cache = Arc::new(FakeCache::always_miss());
        let durable = Arc::new(FakeDurable::default());
        durable.seed("u1", prior_turns(2));
        durable.fail_get.store(true, Ordering::SeqCst);
        let manager = echo_manager(cache.clone(), durable.clone());

        let exchange = manager.handle("u1", "hi").await.unwrap();

        assert_eq!(exchange.history.len(), 2);
        // no write-through of a history that was never read
        assert_eq!(cache.sets().len(), 1);
    }

    #[tokio::test]
    async fn test_responder_failure_persists_nothing() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        cache.seed("u1", prior_turns(1));
        durable.seed("u1", prior_turns(1));
        let manager = manager_with(
            cache.clone(),
            durable.clone(),
            Arc::new(FailingResponder),
            HistoryConfig::default(),
        );

        let err = manager.handle("u1", "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Responder(ResponderError::Failed(_))));
        assert_eq!(durable.stored("u1"), Some(prior_turns(1)));
        assert_eq!(cache.cached("u1"), Some(prior_turns(1)));
        assert!(cache.sets().is_empty());
    }

    #[tokio::test]
    async fn test_responder_timeout() {
        let durable = Arc::new(FakeDurable::default());
        let config = HistoryConfig {
            responder_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let manager = manager_with(
            Arc::new(FakeCache::default()),
            durable.clone(),
            Arc::new(SlowResponder(Duration::from_millis(500))),
            config,
        );

        let err = manager.handle("u1", "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Responder(ResponderError::Timeout(_))));
        assert_eq!(durable.stored("u1"), None);
    }

    #[tokio::test]
    async fn test_invalid_input_touches_no_store() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let manager = echo_manager(cache.clone(), durable.clone());

        for (user, message) in [("", "hi"), ("   ", "hi"), ("u1", ""), ("u1", " \n\t ")] {
            let err = manager.handle(user, message).await.unwrap_err();
            assert!(matches!(err, ChatError::InvalidInput(_)));
        }

        assert!(manager.history("").await.is_err());
        assert!(cache.sets().is_empty());
        assert_eq!(durable.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_message_stored_verbatim() {
        let manager = echo_manager(Arc::new(FakeCache::default()), Arc::new(FakeDurable::default()));

        let exchange = manager.handle("u1", "  padded  ").await.unwrap();
        assert_eq!(exchange.history[0].content, "  padded  ");
        assert_eq!(exchange.history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_truncated_cache_projection() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let config = HistoryConfig {
            max_cached_turns: Some(4),
            ..Default::default()
        };
        let manager = manager_with(cache.clone(), durable.clone(), Arc::new(EchoResponder), config);

        for i in 0..3 {
            manager.handle("u1", &format!("m{}", i)).await.unwrap();
        }

        // cache holds only the tail, durable holds everything
        assert_eq!(cache.cached("u1").unwrap().len(), 4);
        assert_eq!(durable.stored("u1").unwrap().len(), 6);

        let gets_before = durable.gets.load(Ordering::SeqCst);
        let exchange = manager.handle("u1", "m3").await.unwrap();

        assert_eq!(exchange.history.len(), 8);
        assert_eq!(exchange.history[0], Turn::user("m0"));
        assert!(durable.gets.load(Ordering::SeqCst) > gets_before);
    }

    #[tokio::test]
    async fn test_short_projection_is_trusted_under_truncation() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let config = HistoryConfig {
            max_cached_turns: Some(10),
            ..Default::default()
        };
        let manager = manager_with(cache, durable.clone(), Arc::new(EchoResponder), config);

        manager.handle("u1", "a").await.unwrap();
        manager.handle("u1", "b").await.unwrap();

        // only the very first request had to consult the durable store
        assert_eq!(durable.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_ttl_comes_from_config() {
        let cache = Arc::new(FakeCache::default());
        let config = HistoryConfig {
            cache_ttl: Duration::from_secs(90),
            ..Default::default()
        };
        let manager = manager_with(
            cache.clone(),
            Arc::new(FakeDurable::default()),
            Arc::new(EchoResponder),
            config,
        );

        manager.handle("u1", "hi").await.unwrap();
        assert_eq!(cache.sets()[0].2, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_history_reads_without_writing() {
        let cache = Arc::new(FakeCache::default());
        let durable = Arc::new(FakeDurable::default());
        let manager = echo_manager(cache.clone(), durable.clone());

        assert!(manager.history("nobody").await.unwrap().is_empty());

        manager.handle("u1", "hi").await.unwrap();
        let sets_before = cache.sets().len();

        assert_eq!(manager.history("u1").await.unwrap().len(), 2);
        assert_eq!(cache.sets().len(), sets_before);
    }

    #[tokio::test]
    async fn test_unserialized_concurrent_requests_lose_updates() {
        let durable = Arc::new(FakeDurable::default());
        let config = HistoryConfig {
            serialize_per_user: false,
            ..Default::default()
        };
        let manager = manager_with(
            Arc::new(FakeCache::default()),
            durable.clone(),
            Arc::new(BarrierResponder(Barrier::new(2))),
            config,
        );

        // Both requests resolve the empty history before either persists
        let (a, b) = tokio::join!(manager.handle("u1", "first"), manager.handle("u1", "second"));

        assert_eq!(a.unwrap().history.len(), 2);
        assert_eq!(b.unwrap().history.len(), 2);
        assert_eq!(durable.stored("u1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_serialized_concurrent_requests_keep_every_turn() {
        let durable = Arc::new(FakeDurable::default());
        let manager = manager_with(
            Arc::new(FakeCache::default()),
            durable.clone(),
            Arc::new(YieldingEcho),
            HistoryConfig::default(),
        );

        let messages: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
        let results =
            futures::future::join_all(messages.iter().map(|m| manager.handle("u1", m))).await;

        for result in results {
            result.unwrap();
        }

        let stored = durable.stored("u1").unwrap();
        assert_eq!(stored.len(), 20);
        for pair in stored.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].content, format!("Echo: {}", pair[0].content));
        }
        assert_eq!(manager.user_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_users_do_not_block_each_other() {
        let manager = Arc::new(manager_with(
            Arc::new(FakeCache::default()),
            Arc::new(FakeDurable::default()),
            Arc::new(BarrierResponder(Barrier::new(2))),
            HistoryConfig::default(),
        ));

        // Would deadlock if alice's lock also held bob back
        let (a, b) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(manager.handle("alice", "hi"), manager.handle("bob", "hi")) },
        )
        .await
        .unwrap();

        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_with_real_memory_adapters() {
        let cache = Arc::new(MemoryCache::new(Default::default()));
        let durable = Arc::new(MemoryConversationStore::new());
        let manager = HistoryManager::new(
            cache.clone(),
            durable.clone(),
            Arc::new(EchoResponder),
            HistoryConfig::default(),
        );

        manager.handle("u1", "hi").await.unwrap();
        manager.handle("u1", "again").await.unwrap();

        assert_eq!(durable.record("u1").await.unwrap().message_count, 4);
        assert_eq!(cache.stats().await.hits, 1);
    }
}
