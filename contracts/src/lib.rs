//! # Tokengate Contracts
//!
//! Token-gated event reservations on a simulated ledger.
//!
//! Two contracts live on the ledger:
//!
//! - [`token::TokenState`]: an ERC-20 style token (`MyToken`)
//! - [`event::EventRegistryState`]: events whose participants escrow a token
//!   deposit, refunded on check-in and swept to the creator for no-shows
//!
//! Transactions go through [`ledger::LedgerReducer`], run by a
//! `tokengate_runtime::Store`, one transaction per block. Time comes from an
//! injected [`tokengate_core::environment::Clock`].
//!
//! ## Example
//!
//! ```ignore
//! let clock = Arc::new(ManualClock::default());
//! let ledger = Ledger::new(clock.clone());
//! let Deployment { token, event_contract } = deploy_contracts(&ledger, owner).await?;
//!
//! let end = ledger.block_timestamp().await + 3_000;
//! let id = event_contract.create_event("Conference", 100, deposit, end).await?;
//!
//! token.connect(user).approve(event_contract.address(), deposit).await?;
//! event_contract.connect(user).reserve_space(id, "MK").await?;
//! event_contract.check_in(id, user).await?;
//! ```

pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod event;
pub mod ledger;
pub mod token;
pub mod types;

pub use client::{EventContract, Ledger, LedgerError, LogSubscription, TokenContract};
pub use config::{ConfigError, NetworkConfig, Secret, SigningKey};
pub use deploy::{DeployError, Deployment, deploy_contracts};
pub use error::{ContractError, ContractKind, Restriction};
pub use event::{Event, EventRegistryState, NewEvent, Reservation, ReservationStatus};
pub use ledger::{Call, LedgerAction, LedgerReducer, LedgerState, Receipt, Transaction, TxStatus};
pub use token::{TokenLedger, TokenParams, TokenState};
pub use types::{
    Address, AmountError, EventId, Log, LogEvent, TokenAmount, TxId, U256, format_units,
    labeled_address, parse_units,
};
