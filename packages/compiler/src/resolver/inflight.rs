//! Shared resolution state: the memoization cache and per-key guards.
//!
//! A key is fetched by at most one task at a time. Other tasks asking for
//! the same key wait on its async mutex and then find the result in the
//! cache, or the owner's error in the failure cache. Waiting is recorded in
//! a wait-for graph (task waits on key, key is owned by task, forked task
//! belongs to parent task) so that a wait which would close a cycle fails
//! with `CircularReference` instead of deadlocking.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};

use crate::error::ReferenceError;
use crate::node::Resolved;

/// Identifier of one logical resolution task (a context or one of its forks).
pub type TaskId = u64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct WaitGraph {
    /// key -> task holding its guard
    owners: HashMap<String, TaskId>,
    /// task -> key it is waiting for
    waiting: HashMap<TaskId, String>,
    /// forked task -> the task that forked it (and awaits it)
    parents: HashMap<TaskId, TaskId>,
}

impl WaitGraph {
    /// Whether `target` is reachable from `from` along wait and fork edges.
    fn reaches(&self, from: TaskId, target: TaskId) -> bool {
        let mut pending = vec![from];
        let mut seen = HashSet::new();
        while let Some(task) = pending.pop() {
            if task == target {
                return true;
            }
            if !seen.insert(task) {
                continue;
            }
            if let Some(owner) = self.waiting.get(&task).and_then(|key| self.owners.get(key)) {
                pending.push(*owner);
            }
            pending.extend(
                self.parents
                    .iter()
                    .filter(|(_, parent)| **parent == task)
                    .map(|(child, _)| *child),
            );
        }
        false
    }
}

/// Result of [`ResolutionState::acquire`].
#[derive(Debug)]
pub(crate) enum Acquired {
    /// Another task resolved the key while we waited
    Cached(Resolved),
    /// The caller now owns the key and must fetch it
    Owned(KeyGuard),
}

/// Exclusive right to fetch one key. Released on drop.
#[derive(Debug)]
pub(crate) struct KeyGuard {
    state: Arc<ResolutionState>,
    key: String,
    _lock: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        lock(&self.state.graph).owners.remove(&self.key);
    }
}

/// Removes a waiting edge when the wait ends (including on timeout).
struct WaitEntry<'a> {
    state: &'a ResolutionState,
    task: TaskId,
}

impl Drop for WaitEntry<'_> {
    fn drop(&mut self) {
        lock(&self.state.graph).waiting.remove(&self.task);
    }
}

/// Parent/child edge of a forked context. Removed when the fork is dropped.
#[derive(Debug)]
pub(crate) struct ForkLink {
    state: Arc<ResolutionState>,
    task: TaskId,
}

impl ForkLink {
    pub(crate) fn new(state: Arc<ResolutionState>, parent: TaskId, task: TaskId) -> Self {
        lock(&state.graph).parents.insert(task, parent);
        Self { state, task }
    }
}

impl Drop for ForkLink {
    fn drop(&mut self) {
        lock(&self.state.graph).parents.remove(&self.task);
    }
}

/// Cache and in-flight bookkeeping shared by a context and its forks.
///
/// Both caches are append-only: a stored value or failure is never replaced.
#[derive(Debug, Default)]
pub struct ResolutionState {
    cache: Mutex<HashMap<String, Resolved>>,
    failures: Mutex<HashMap<String, ReferenceError>>,
    locks: Mutex<HashMap<String, Arc<KeyLock<()>>>>,
    graph: Mutex<WaitGraph>,
    next_task: AtomicU64,
    fetches: AtomicUsize,
}

impl ResolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Resolved> {
        lock(&self.cache).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.cache).contains_key(key)
    }

    /// Store a result. An existing entry is kept.
    pub(crate) fn store(&self, key: &str, value: Resolved) {
        lock(&self.cache).entry(key.to_string()).or_insert(value);
    }

    /// The failure recorded for `key`, if its fetch failed.
    pub fn failure(&self, key: &str) -> Option<ReferenceError> {
        lock(&self.failures).get(key).cloned()
    }

    /// Record a failed fetch so later requests for `key` fail without
    /// invoking the handler again. Path-dependent failures are skipped.
    pub(crate) fn store_failure(&self, key: &str, err: &ReferenceError) {
        if err.is_path_dependent() {
            return;
        }
        lock(&self.failures)
            .entry(key.to_string())
            .or_insert_with(|| err.clone());
    }

    /// Cached keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.cache).keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.cache).is_empty()
    }

    /// Number of protocol handler invocations so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        self.next_task.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Obtain the right to fetch `key`, or its cached value.
    ///
    /// `stack` is the caller's in-flight stack, used to report the cycle.
    ///
    /// # Errors
    /// The recorded failure if the key already failed, `CircularReference`
    /// if waiting would deadlock, `Timeout` if the current owner does not
    /// finish within `timeout`.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        key: &str,
        task: TaskId,
        stack: &[String],
        timeout: Duration,
    ) -> Result<Acquired, ReferenceError> {
        if let Some(value) = self.get(key) {
            return Ok(Acquired::Cached(value));
        }
        if let Some(err) = self.failure(key) {
            return Err(err);
        }

        let key_lock = Arc::clone(lock(&self.locks).entry(key.to_string()).or_default());

        let waiter = {
            let mut graph = lock(&self.graph);
            match Arc::clone(&key_lock).try_lock_owned() {
                Ok(guard) => {
                    graph.owners.insert(key.to_string(), task);
                    drop(graph);
                    return Ok(Acquired::Owned(self.guard(key, guard)));
                }
                Err(_) => {
                    if let Some(owner) = graph.owners.get(key).copied() {
                        if graph.reaches(owner, task) {
                            let mut cycle = stack.to_vec();
                            cycle.push(key.to_string());
                            return Err(ReferenceError::CircularReference { cycle });
                        }
                    }
                    graph.waiting.insert(task, key.to_string());
                    WaitEntry {
                        state: self.as_ref(),
                        task,
                    }
                }
            }
        };

        tracing::debug!(uri = %key, task, "Waiting for in-flight resolution");
        let acquired = tokio::time::timeout(timeout, key_lock.lock_owned()).await;
        drop(waiter);
        let guard = acquired.map_err(|_| ReferenceError::Timeout {
            uri: key.to_string(),
            timeout,
        })?;

        lock(&self.graph).owners.insert(key.to_string(), task);
        let guard = self.guard(key, guard);

        // The previous owner usually stored its outcome before releasing
        if let Some(value) = self.get(key) {
            return Ok(Acquired::Cached(value));
        }
        match self.failure(key) {
            Some(err) => Err(err),
            None => Ok(Acquired::Owned(guard)),
        }
    }

    fn guard(self: &Arc<Self>, key: &str, lock: OwnedMutexGuard<()>) -> KeyGuard {
        KeyGuard {
            state: Arc::clone(self),
            key: key.to_string(),
            _lock: lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_cache_is_append_only() {
        let state = ResolutionState::new();
        state.store("id:x", Resolved::Text("first".into()));
        state.store("id:x", Resolved::Text("second".into()));
        assert_eq!(state.get("id:x"), Some(Resolved::Text("first".into())));
        assert_eq!(state.keys(), vec!["id:x".to_string()]);
    }

    #[tokio::test]
    async fn test_waiter_receives_cached_value() {
        let state = Arc::new(ResolutionState::new());
        let Acquired::Owned(guard) = state.acquire("id:k", 1, &[], SECOND).await.unwrap() else {
            panic!("first acquire should own the key");
        };

        let waiter_state = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            waiter_state
                .acquire("id:k", 2, &[], SECOND)
                .await
                .map(|a| matches!(a, Acquired::Cached(_)))
        });
        tokio::task::yield_now().await;

        state.store("id:k", Resolved::Text("value".into()));
        drop(guard);

        assert_eq!(waiter.await.unwrap(), Ok(true));
    }

    #[tokio::test]
    async fn test_waiter_receives_owner_failure() {
        let state = Arc::new(ResolutionState::new());
        let Acquired::Owned(guard) = state.acquire("id:k", 1, &[], SECOND).await.unwrap() else {
            panic!("first acquire should own the key");
        };

        let waiter_state = Arc::clone(&state);
        let waiter =
            tokio::spawn(async move { waiter_state.acquire("id:k", 2, &[], SECOND).await.err() });
        tokio::task::yield_now().await;

        let not_found = ReferenceError::NotFound {
            uri: "id:k".into(),
        };
        state.store_failure("id:k", &not_found);
        drop(guard);

        assert_eq!(waiter.await.unwrap(), Some(not_found.clone()));
        // Later requests fail straight from the failure cache
        let again = state.acquire("id:k", 3, &[], SECOND).await;
        assert_eq!(again.err(), Some(not_found));
    }

    #[test]
    fn test_path_dependent_failures_are_not_stored() {
        let state = ResolutionState::new();
        state.store_failure(
            "id:a",
            &ReferenceError::CircularReference {
                cycle: vec!["id:a".into(), "id:a".into()],
            },
        );
        assert!(state.failure("id:a").is_none());
    }

    #[tokio::test]
    async fn test_cross_task_cycle_is_detected() {
        let state = Arc::new(ResolutionState::new());
        let Ok(Acquired::Owned(a)) = state.acquire("id:a", 1, &[], SECOND).await else {
            panic!("task 1 should own id:a");
        };
        let Ok(Acquired::Owned(b)) = state.acquire("id:b", 2, &[], SECOND).await else {
            panic!("task 2 should own id:b");
        };

        // Task 1 waits for id:b
        let waiter_state = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            waiter_state
                .acquire("id:b", 1, &["id:a".to_string()], SECOND)
                .await
                .is_ok()
        });
        tokio::task::yield_now().await;

        // Task 2 asking for id:a would close the loop
        let result = state
            .acquire("id:a", 2, &["id:b".to_string()], SECOND)
            .await;
        assert_eq!(
            result.map(|_| ()),
            Err(ReferenceError::CircularReference {
                cycle: vec!["id:b".to_string(), "id:a".to_string()]
            })
        );

        drop(b);
        assert!(waiter.await.unwrap());
        drop(a);
    }

    #[tokio::test]
    async fn test_fork_edge_counts_as_waiting() {
        let state = Arc::new(ResolutionState::new());
        let Ok(Acquired::Owned(_a)) = state.acquire("id:a", 1, &[], SECOND).await else {
            panic!("task 1 should own id:a");
        };
        let Ok(Acquired::Owned(b)) = state.acquire("id:b", 2, &[], SECOND).await else {
            panic!("task 2 should own id:b");
        };
        // Task 1 forked task 3 and awaits it
        let _link = ForkLink::new(Arc::clone(&state), 1, 3);

        // Task 2 waits for id:a (owned by 1)
        let waiter_state = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            waiter_state
                .acquire("id:a", 2, &[], Duration::from_millis(50))
                .await
                .is_err()
        });
        tokio::task::yield_now().await;

        // Task 3 asking for id:b: 2 waits on 1, which awaits 3
        let result = state.acquire("id:b", 3, &[], SECOND).await;
        assert!(matches!(
            result,
            Err(ReferenceError::CircularReference { .. })
        ));

        drop(b);
        // The waiter eventually times out because task 1 never releases id:a
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let state = Arc::new(ResolutionState::new());
        let Ok(Acquired::Owned(_held)) = state.acquire("id:slow", 1, &[], SECOND).await else {
            panic!("task 1 should own id:slow");
        };

        let result = state
            .acquire("id:slow", 2, &[], Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ReferenceError::Timeout { .. })));
        assert!(lock(&state.graph).waiting.is_empty());
    }
}
