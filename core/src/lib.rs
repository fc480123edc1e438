//! # Tokengate Core
//!
//! Core traits and types shared by the Tokengate ledger runtime and its contracts.
//!
//! Contract logic is written as reducers: deterministic functions that take the
//! current ledger state and one transaction, mutate the state in place and
//! describe any follow-up work as [`effect::Effect`] values. The runtime owns
//! the state and serializes every call, which is what gives each transaction
//! its atomicity.
//!
//! ## Core Concepts
//!
//! - **State**: Everything the ledger knows (balances, events, receipts)
//! - **Action**: A submitted transaction or a fact emitted by one
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Description of follow-up work, executed by the runtime
//! - **Environment**: Injected dependencies, most importantly the block [`environment::Clock`]
//!
//! ## Example
//!
//! ```
//! use tokengate_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct Counter {
//!     blocks: u64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Mine,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Counter,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Mine => state.blocks += 1,
//!         }
//!         SmallVec::new()
//!     }
//! }
//!
//! let mut state = Counter::default();
//! let effects = CounterReducer.reduce(&mut state, CounterAction::Mine, &());
//! assert_eq!(state.blocks, 1);
//! assert!(effects.is_empty());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - The core trait for contract logic
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most reducers return zero or one effect, so the return type keeps
        /// up to four effects inline.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values, not execution. The runtime decides when to run them
/// and feeds any resulting action back into the reducer.
pub mod effect {
    /// Effect type - describes follow-up work for the runtime
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Dispatch an action before the originating `send` returns
        ///
        /// The runtime broadcasts the action and reduces it while it still
        /// holds the state lock, so observers see emitted actions in the
        /// order their causes were applied.
        Emit(Action),
    }

    impl<Action> Effect<Action> {
        /// Wrap an already-known action so the runtime feeds it back
        #[must_use]
        pub const fn emit(action: Action) -> Effect<Action> {
            Effect::Emit(action)
        }

        /// The action this effect dispatches, if any
        #[must_use]
        pub const fn action(&self) -> Option<&Action> {
            match self {
                Effect::None => None,
                Effect::Emit(action) => Some(action),
            }
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - the source of block timestamps
    ///
    /// Contracts never read wall-clock time directly. Every time-based guard
    /// (event end times, claim windows) goes through this trait so that tests
    /// can move time forward deterministically.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current time as whole unix seconds, the unit contracts compare against
        fn unix_seconds(&self) -> u64 {
            u64::try_from(self.now().timestamp()).unwrap_or(0)
        }
    }

    /// Wall-clock time, used by the deploy binary
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
