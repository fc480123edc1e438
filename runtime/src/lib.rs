//! # Tokengate Runtime
//!
//! The Store runtime that serializes transactions against a reducer and
//! dispatches the effects the reducer returns.
//!
//! ## Core Components
//!
//! - **Store**: Owns state behind a lock, runs the reducer one action at a time
//! - **Effect Dispatch**: Feeds emitted actions back before the lock is released
//! - **Action Broadcast**: Lets observers see every emitted action, in order
//!
//! ## Example
//!
//! ```ignore
//! use tokengate_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! store.send(Action::DoSomething).await?;
//!
//! let value = store.state(|s| s.some_field).await;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokengate_core::{effect::Effect, reducer::Reducer};
use tokio::sync::RwLock;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for an in-flight action
        #[error("Shutdown timed out with an action still in flight")]
        ShutdownTimeout,
    }
}

pub use error::StoreError;

/// Store module - the runtime coordinator
pub mod store {
    use super::{
        Arc, AtomicBool, Duration, Effect, Ordering, Reducer, RwLock, StoreError, VecDeque,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; the reducer runs under the write lock)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect dispatch (with feedback loop)
    ///
    /// Because the reducer always runs while holding the write lock, concurrent
    /// `send` calls are applied one after another in lock-acquisition order.
    /// Emitted actions are broadcast under the same lock, so subscribers see
    /// them in that order too.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast keeps the last 64 actions for slow subscribers.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Broadcasts and reduces every emitted action, breadth first
        ///
        /// The state change and every emitted action are visible as soon as
        /// this returns.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let mut state = self.state.write().await;
            tracing::trace!("Acquired write lock on state");

            let mut pending = VecDeque::from([action]);
            while let Some(action) = pending.pop_front() {
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                tracing::trace!("Dispatching {} effects", effects.len());

                for effect in effects {
                    match effect {
                        Effect::None => {
                            metrics::counter!("store.effects.executed", "type" => "none")
                                .increment(1);
                        },
                        Effect::Emit(emitted) => {
                            metrics::counter!("store.effects.executed", "type" => "emit")
                                .increment(1);
                            // No subscribers is fine
                            let _ = self.action_broadcast.send(emitted.clone());
                            pending.push_back(emitted);
                        },
                    }
                }
            }

            Ok(())
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.events.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Subscribe to actions emitted from now on
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Stop accepting actions and wait for the one in flight, if any
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if an action is still being
        /// reduced after `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            if let Ok(_state) = tokio::time::timeout(timeout, self.state.write()).await {
                tracing::info!("In-flight actions drained, shutdown successful");
                Ok(())
            } else {
                tracing::error!("Shutdown timeout");
                Err(StoreError::ShutdownTimeout)
            }
        }

        /// Whether shutdown was requested
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
