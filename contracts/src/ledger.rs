//! The ledger: every deployed contract plus the reducer that executes
//! transactions against them.
//!
//! A transaction runs against a scratch copy of [`Contracts`]. The copy
//! replaces the live state only when the call succeeds, so a revert never
//! leaves a partial write behind. Either way the transaction gets a
//! [`Receipt`], and the sender's nonce advances.

use crate::error::{ContractError, ContractKind};
use crate::event::{EventRegistryState, NewEvent};
use crate::token::{TokenLedger, TokenParams, TokenState};
use crate::types::{Address, EventId, Log, TokenAmount, TxId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokengate_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};

/// A contract call (or deployment) submitted by an account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Deploy a `MyToken`
    DeployToken(TokenParams),

    /// Deploy an `EventContract` bound to `token`
    DeployEventContract {
        /// Deposit token
        token: Address,
    },

    /// `token.transfer(to, amount)`
    Transfer {
        /// Token contract
        token: Address,
        /// Receiver
        to: Address,
        /// Amount in base units
        amount: TokenAmount,
    },

    /// `token.approve(spender, amount)`
    Approve {
        /// Token contract
        token: Address,
        /// Spender
        spender: Address,
        /// New allowance
        amount: TokenAmount,
    },

    /// `token.transferFrom(from, to, amount)`
    TransferFrom {
        /// Token contract
        token: Address,
        /// Account debited
        from: Address,
        /// Receiver
        to: Address,
        /// Amount in base units
        amount: TokenAmount,
    },

    /// `token.mint(to, amount)`
    Mint {
        /// Token contract
        token: Address,
        /// Receiver
        to: Address,
        /// Amount in base units
        amount: TokenAmount,
    },

    /// `events.createEvent(name, capacity, requiredDeposit, endTime)`
    CreateEvent {
        /// Event contract
        contract: Address,
        /// Event parameters
        event: NewEvent,
    },

    /// `events.reserveSpace(eventId, tag)`
    ReserveSpace {
        /// Event contract
        contract: Address,
        /// Event id
        event_id: EventId,
        /// Reservation tag
        tag: String,
    },

    /// `events.checkIn(eventId, participant)`
    CheckIn {
        /// Event contract
        contract: Address,
        /// Event id
        event_id: EventId,
        /// Participant being checked in
        participant: Address,
    },

    /// `events.claimRefund(eventId)`
    ClaimRefund {
        /// Event contract
        contract: Address,
        /// Event id
        event_id: EventId,
    },
}

impl Call {
    /// Contract method name, as it appears in logs and metrics
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::DeployToken(_) | Self::DeployEventContract { .. } => "constructor",
            Self::Transfer { .. } => "transfer",
            Self::Approve { .. } => "approve",
            Self::TransferFrom { .. } => "transferFrom",
            Self::Mint { .. } => "mint",
            Self::CreateEvent { .. } => "createEvent",
            Self::ReserveSpace { .. } => "reserveSpace",
            Self::CheckIn { .. } => "checkIn",
            Self::ClaimRefund { .. } => "claimRefund",
        }
    }

    /// Contract being called; `None` for deployments
    #[must_use]
    pub const fn target(&self) -> Option<Address> {
        match self {
            Self::DeployToken(_) | Self::DeployEventContract { .. } => None,
            Self::Transfer { token, .. }
            | Self::Approve { token, .. }
            | Self::TransferFrom { token, .. }
            | Self::Mint { token, .. } => Some(*token),
            Self::CreateEvent { contract, .. }
            | Self::ReserveSpace { contract, .. }
            | Self::CheckIn { contract, .. }
            | Self::ClaimRefund { contract, .. } => Some(*contract),
        }
    }
}

/// A signed call awaiting execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Client-assigned identifier
    pub id: TxId,
    /// Sender (`msg.sender`)
    pub from: Address,
    /// What to execute
    pub call: Call,
}

/// Outcome of a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// State committed
    Success,
    /// Call reverted; nothing committed
    Reverted(ContractError),
}

/// Record of an executed transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction id
    pub tx_id: TxId,
    /// Block that included it (one transaction per block)
    pub block_number: u64,
    /// Block timestamp, unix seconds
    pub timestamp: u64,
    /// Sender
    pub from: Address,
    /// Called contract; `None` for deployments
    pub to: Option<Address>,
    /// Address of the contract a deployment created
    pub contract_address: Option<Address>,
    /// Success or revert reason
    pub status: TxStatus,
    /// Logs emitted; always empty for reverted transactions
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Whether the transaction committed
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success)
    }

    /// Revert reason, if the transaction reverted
    #[must_use]
    pub const fn revert_reason(&self) -> Option<&ContractError> {
        match &self.status {
            TxStatus::Success => None,
            TxStatus::Reverted(error) => Some(error),
        }
    }
}

/// Every deployed contract, keyed by address
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contracts {
    tokens: BTreeMap<Address, TokenState>,
    registries: BTreeMap<Address, EventRegistryState>,
}

/// What a successful call produced
#[derive(Debug, Default)]
struct Outcome {
    contract_address: Option<Address>,
    logs: Vec<Log>,
}

impl Outcome {
    const fn logs(logs: Vec<Log>) -> Self {
        Self {
            contract_address: None,
            logs,
        }
    }
}

impl Contracts {
    /// Token deployed at `address`
    ///
    /// # Errors
    ///
    /// [`ContractError::ContractNotFound`] if no token lives there.
    pub fn token(&self, address: &Address) -> Result<&TokenState, ContractError> {
        self.tokens.get(address).ok_or(ContractError::ContractNotFound {
            address: *address,
            kind: ContractKind::Token,
        })
    }

    /// Event contract deployed at `address`
    ///
    /// # Errors
    ///
    /// [`ContractError::ContractNotFound`] if no event contract lives there.
    pub fn registry(&self, address: &Address) -> Result<&EventRegistryState, ContractError> {
        self.registries
            .get(address)
            .ok_or(ContractError::ContractNotFound {
                address: *address,
                kind: ContractKind::EventRegistry,
            })
    }

    /// Every deployed token
    pub fn tokens(&self) -> impl Iterator<Item = &TokenState> {
        self.tokens.values()
    }

    fn token_mut(&mut self, address: &Address) -> Result<&mut TokenState, ContractError> {
        self.tokens
            .get_mut(address)
            .ok_or(ContractError::ContractNotFound {
                address: *address,
                kind: ContractKind::Token,
            })
    }

    /// Event contract together with the token it escrows in
    fn registry_with_token(
        &mut self,
        address: &Address,
    ) -> Result<(&mut EventRegistryState, &mut TokenState), ContractError> {
        let registry =
            self.registries
                .get_mut(address)
                .ok_or(ContractError::ContractNotFound {
                    address: *address,
                    kind: ContractKind::EventRegistry,
                })?;
        let token = self
            .tokens
            .get_mut(&registry.token)
            .ok_or(ContractError::ContractNotFound {
                address: registry.token,
                kind: ContractKind::Token,
            })?;
        Ok((registry, token))
    }

    fn execute(
        &mut self,
        from: Address,
        nonce: u64,
        call: Call,
        now: u64,
    ) -> Result<Outcome, ContractError> {
        match call {
            // ========== Deployments ==========
            Call::DeployToken(params) => {
                let address = from.create(nonce);
                let (token, logs) = TokenState::deploy(address, params)?;
                self.tokens.insert(address, token);
                Ok(Outcome {
                    contract_address: Some(address),
                    logs,
                })
            },

            Call::DeployEventContract { token } => {
                self.token(&token)?;
                let address = from.create(nonce);
                self.registries
                    .insert(address, EventRegistryState::deploy(address, token));
                Ok(Outcome {
                    contract_address: Some(address),
                    logs: Vec::new(),
                })
            },

            // ========== Token ==========
            Call::Transfer { token, to, amount } => self
                .token_mut(&token)?
                .transfer(from, to, amount)
                .map(Outcome::logs),

            Call::Approve {
                token,
                spender,
                amount,
            } => self
                .token_mut(&token)?
                .approve(from, spender, amount)
                .map(Outcome::logs),

            Call::TransferFrom {
                token,
                from: owner,
                to,
                amount,
            } => self
                .token_mut(&token)?
                .transfer_from(from, owner, to, amount)
                .map(Outcome::logs),

            Call::Mint { token, to, amount } => self
                .token_mut(&token)?
                .mint(from, to, amount)
                .map(Outcome::logs),

            // ========== Events ==========
            Call::CreateEvent { contract, event } => {
                let (registry, _) = self.registry_with_token(&contract)?;
                let (_, logs) = registry.create_event(from, event, now)?;
                Ok(Outcome::logs(logs))
            },

            Call::ReserveSpace {
                contract,
                event_id,
                tag,
            } => {
                let (registry, token) = self.registry_with_token(&contract)?;
                registry
                    .reserve_space(token, from, event_id, tag, now)
                    .map(Outcome::logs)
            },

            Call::CheckIn {
                contract,
                event_id,
                participant,
            } => {
                let (registry, token) = self.registry_with_token(&contract)?;
                registry
                    .check_in(token, from, event_id, participant)
                    .map(Outcome::logs)
            },

            Call::ClaimRefund { contract, event_id } => {
                let (registry, token) = self.registry_with_token(&contract)?;
                registry
                    .claim_refund(token, from, event_id, now)
                    .map(Outcome::logs)
            },
        }
    }
}

/// Ledger state managed by the store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Deployed contracts
    pub contracts: Contracts,
    /// Receipts of every executed transaction
    pub receipts: BTreeMap<TxId, Receipt>,
    /// Number of the latest block
    pub block_number: u64,
    /// Timestamp of the latest block, unix seconds
    pub timestamp: u64,
    nonces: BTreeMap<Address, u64>,
}

impl LedgerState {
    /// Empty ledger at block zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions `account` has sent
    #[must_use]
    pub fn nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Receipt of a transaction
    #[must_use]
    pub fn receipt(&self, tx_id: TxId) -> Option<&Receipt> {
        self.receipts.get(&tx_id)
    }

    /// Returns the current nonce of `account` and advances it
    fn take_nonce(&mut self, account: Address) -> u64 {
        let nonce = self.nonces.entry(account).or_insert(0);
        let current = *nonce;
        *nonce += 1;
        current
    }
}

/// Ledger actions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerAction {
    // ========== Commands ==========
    /// Execute a transaction in the next block
    Submit(Transaction),

    // ========== Notifications ==========
    /// Logs of a committed transaction, broadcast to subscribers
    LogsEmitted {
        /// Transaction that emitted them
        tx_id: TxId,
        /// Logs in emission order
        logs: Vec<Log>,
    },
}

/// Dependencies of the ledger reducer
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Source of block timestamps
    pub clock: Arc<dyn Clock>,
}

impl LedgerEnvironment {
    /// Creates an environment around a clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Executes transactions, one block each
#[derive(Clone, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates a new ledger reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Block timestamps never go backwards, even if the clock does
    fn next_timestamp(state: &LedgerState, env: &LedgerEnvironment) -> u64 {
        env.clock.unix_seconds().max(state.timestamp)
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = LedgerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            LedgerAction::Submit(Transaction { id, from, call }) => {
                if state.receipts.contains_key(&id) {
                    tracing::warn!(tx = %id, "Ignoring transaction with a duplicate id");
                    return SmallVec::new();
                }

                let timestamp = Self::next_timestamp(state, env);
                state.block_number += 1;
                state.timestamp = timestamp;
                let nonce = state.take_nonce(from);

                let method = call.method();
                let to = call.target();
                let mut scratch = state.contracts.clone();

                let (status, outcome) = match scratch.execute(from, nonce, call, timestamp) {
                    Ok(outcome) => {
                        state.contracts = scratch;
                        metrics::counter!("ledger.transactions", "status" => "success")
                            .increment(1);
                        tracing::debug!(
                            tx = %id,
                            block = state.block_number,
                            %from,
                            method,
                            logs = outcome.logs.len(),
                            "Transaction committed"
                        );
                        (TxStatus::Success, outcome)
                    },
                    Err(error) => {
                        metrics::counter!("ledger.transactions", "status" => "reverted")
                            .increment(1);
                        tracing::info!(
                            tx = %id,
                            block = state.block_number,
                            %from,
                            method,
                            %error,
                            "Transaction reverted"
                        );
                        (TxStatus::Reverted(error), Outcome::default())
                    },
                };

                let logs = outcome.logs;
                state.receipts.insert(
                    id,
                    Receipt {
                        tx_id: id,
                        block_number: state.block_number,
                        timestamp,
                        from,
                        to,
                        contract_address: outcome.contract_address,
                        status,
                        logs: logs.clone(),
                    },
                );

                if logs.is_empty() {
                    SmallVec::new()
                } else {
                    smallvec![Effect::emit(LedgerAction::LogsEmitted { tx_id: id, logs })]
                }
            },

            // Already recorded in the receipt; the store broadcasts it in commit order
            LedgerAction::LogsEmitted { .. } => SmallVec::new(),
        }
    }
}
