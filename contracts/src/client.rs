//! Async client over the ledger store, plus typed contract handles.
//!
//! ```ignore
//! let ledger = Ledger::new(Arc::new(SystemClock));
//! let token = ledger.deploy_token(owner, params).await?;
//! let events = ledger.deploy_event_contract(owner, token.address()).await?;
//!
//! token.connect(user).approve(events.address(), deposit).await?;
//! events.connect(user).reserve_space(event_id, "MK").await?;
//! ```

use crate::error::ContractError;
use crate::event::{Event, EventRegistryState, NewEvent, Reservation};
use crate::ledger::{
    Call, LedgerAction, LedgerEnvironment, LedgerReducer, LedgerState, Receipt, Transaction,
    TxStatus,
};
use crate::token::{TokenLedger, TokenParams, TokenState};
use crate::types::{Address, EventId, Log, LogEvent, TokenAmount, TxId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokengate_core::environment::Clock;
use tokengate_runtime::{Store, StoreError};
use tokio::sync::broadcast;

type LedgerStore = Store<LedgerState, LedgerAction, LedgerEnvironment, LedgerReducer>;

/// Log batches a subscriber may fall behind by before it skips ahead
const LOG_BUFFER: usize = 1024;

/// Why a ledger interaction failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The call reverted (or a view hit a missing contract)
    #[error("transaction reverted: {0}")]
    Reverted(#[from] ContractError),

    /// The store refused the transaction
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store accepted the transaction but no receipt was recorded
    #[error("no receipt recorded for {0}")]
    MissingReceipt(TxId),

    /// The receipt lacks the address or log the call should have produced
    #[error("receipt for {0} does not carry the expected result")]
    UnexpectedReceipt(TxId),
}

/// Handle to a simulated chain
///
/// Cloning is cheap; all clones share the same store.
#[derive(Clone)]
pub struct Ledger {
    store: LedgerStore,
    next_tx: Arc<AtomicU64>,
}

impl Ledger {
    /// Starts an empty ledger whose block timestamps come from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Store::with_broadcast_capacity(
                LedgerState::new(),
                LedgerReducer::new(),
                LedgerEnvironment::new(clock),
                LOG_BUFFER,
            ),
            next_tx: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Executes `call` as `from` in the next block
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] with the revert reason if the call failed,
    /// [`LedgerError::Store`] if the ledger is shutting down.
    pub async fn transact(&self, from: Address, call: Call) -> Result<Receipt, LedgerError> {
        let id = TxId(self.next_tx.fetch_add(1, Ordering::SeqCst));
        let method = call.method();

        self.store
            .send(LedgerAction::Submit(Transaction { id, from, call }))
            .await?;

        let receipt = self
            .store
            .state(|state| state.receipt(id).cloned())
            .await
            .ok_or(LedgerError::MissingReceipt(id))?;

        match receipt.status {
            TxStatus::Success => {
                tracing::debug!(tx = %id, %from, method, block = receipt.block_number, "Transaction mined");
                Ok(receipt)
            },
            TxStatus::Reverted(error) => Err(LedgerError::Reverted(error)),
        }
    }

    /// Deploys a token and returns a handle connected to the deployer
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn deploy_token(
        &self,
        deployer: Address,
        params: TokenParams,
    ) -> Result<TokenContract, LedgerError> {
        let receipt = self.transact(deployer, Call::DeployToken(params)).await?;
        let address = receipt
            .contract_address
            .ok_or(LedgerError::UnexpectedReceipt(receipt.tx_id))?;
        tracing::info!(%address, %deployer, "Token deployed");
        Ok(TokenContract::at(self, address, deployer))
    }

    /// Deploys an event contract bound to `token`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`]; reverts with `ContractNotFound` if `token`
    /// is not a deployed token.
    pub async fn deploy_event_contract(
        &self,
        deployer: Address,
        token: Address,
    ) -> Result<EventContract, LedgerError> {
        let receipt = self
            .transact(deployer, Call::DeployEventContract { token })
            .await?;
        let address = receipt
            .contract_address
            .ok_or(LedgerError::UnexpectedReceipt(receipt.tx_id))?;
        tracing::info!(%address, %deployer, %token, "Event contract deployed");
        Ok(EventContract::at(self, address, deployer))
    }

    /// Reads ledger state through a closure
    pub async fn view<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&LedgerState) -> T,
    {
        self.store.state(f).await
    }

    /// Receipt of a past transaction, successful or reverted
    pub async fn receipt(&self, tx_id: TxId) -> Option<Receipt> {
        self.view(|state| state.receipt(tx_id).cloned()).await
    }

    /// Timestamp of the latest block
    pub async fn block_timestamp(&self) -> u64 {
        self.view(|state| state.timestamp).await
    }

    /// Subscribes to logs of transactions committed from now on
    #[must_use]
    pub fn subscribe_logs(&self) -> LogSubscription {
        LogSubscription {
            receiver: self.store.subscribe_actions(),
        }
    }

    /// Stops accepting transactions and waits for the one in flight
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] if a transaction is still executing after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), LedgerError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }
}

/// Stream of committed logs, in commit order
///
/// Logs are published while the ledger still holds its state lock, so
/// batches arrive in block order even under concurrent senders.
pub struct LogSubscription {
    receiver: broadcast::Receiver<LedgerAction>,
}

impl LogSubscription {
    /// Waits for the logs of the next committed transaction
    ///
    /// Returns `None` once the ledger is gone. Skips ahead if this
    /// subscriber fell too far behind.
    pub async fn recv(&mut self) -> Option<(TxId, Vec<Log>)> {
        loop {
            match self.receiver.recv().await {
                Ok(LedgerAction::LogsEmitted { tx_id, logs }) => return Some((tx_id, logs)),
                Ok(LedgerAction::Submit(_)) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Log subscriber lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A deployed `MyToken`, bound to the account that signs its calls
#[derive(Clone)]
pub struct TokenContract {
    ledger: Ledger,
    address: Address,
    signer: Address,
}

impl TokenContract {
    /// Handle to the token at `address`, signing as `signer`
    #[must_use]
    pub fn at(ledger: &Ledger, address: Address, signer: Address) -> Self {
        Self {
            ledger: ledger.clone(),
            address,
            signer,
        }
    }

    /// Contract address
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Account that signs calls made through this handle
    #[must_use]
    pub const fn signer(&self) -> Address {
        self.signer
    }

    /// Same contract, different signer
    #[must_use]
    pub fn connect(&self, signer: Address) -> Self {
        Self {
            signer,
            ..self.clone()
        }
    }

    /// `transfer(to, amount)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn transfer(&self, to: Address, amount: TokenAmount) -> Result<Receipt, LedgerError> {
        self.send(Call::Transfer {
            token: self.address,
            to,
            amount,
        })
        .await
    }

    /// `approve(spender, amount)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn approve(
        &self,
        spender: Address,
        amount: TokenAmount,
    ) -> Result<Receipt, LedgerError> {
        self.send(Call::Approve {
            token: self.address,
            spender,
            amount,
        })
        .await
    }

    /// `transferFrom(from, to, amount)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn transfer_from(
        &self,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Receipt, LedgerError> {
        self.send(Call::TransferFrom {
            token: self.address,
            from,
            to,
            amount,
        })
        .await
    }

    /// `mint(to, amount)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn mint(&self, to: Address, amount: TokenAmount) -> Result<Receipt, LedgerError> {
        self.send(Call::Mint {
            token: self.address,
            to,
            amount,
        })
        .await
    }

    /// `balanceOf(holder)`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no token is deployed at this address.
    pub async fn balance_of(&self, holder: Address) -> Result<TokenAmount, LedgerError> {
        self.read(move |token| token.balance_of(&holder)).await
    }

    /// `allowance(owner, spender)`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no token is deployed at this address.
    pub async fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount, LedgerError> {
        self.read(move |token| token.allowance(&owner, &spender))
            .await
    }

    /// `totalSupply()`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no token is deployed at this address.
    pub async fn total_supply(&self) -> Result<TokenAmount, LedgerError> {
        self.read(TokenState::total_supply).await
    }

    /// `decimals()`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no token is deployed at this address.
    pub async fn decimals(&self) -> Result<u8, LedgerError> {
        self.read(|token| token.decimals).await
    }

    /// `name()`, `symbol()` and `owner()` in one read
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no token is deployed at this address.
    pub async fn metadata(&self) -> Result<(String, String, Address), LedgerError> {
        self.read(|token| (token.name.clone(), token.symbol.clone(), token.owner))
            .await
    }

    async fn read<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&TokenState) -> T,
    {
        let address = self.address;
        self.ledger
            .view(move |state| state.contracts.token(&address).map(f))
            .await
            .map_err(LedgerError::from)
    }

    async fn send(&self, call: Call) -> Result<Receipt, LedgerError> {
        self.ledger.transact(self.signer, call).await
    }
}

/// A deployed `EventContract`, bound to the account that signs its calls
#[derive(Clone)]
pub struct EventContract {
    ledger: Ledger,
    address: Address,
    signer: Address,
}

impl EventContract {
    /// Handle to the event contract at `address`, signing as `signer`
    #[must_use]
    pub fn at(ledger: &Ledger, address: Address, signer: Address) -> Self {
        Self {
            ledger: ledger.clone(),
            address,
            signer,
        }
    }

    /// Contract address
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Same contract, different signer
    #[must_use]
    pub fn connect(&self, signer: Address) -> Self {
        Self {
            signer,
            ..self.clone()
        }
    }

    /// Handle to the deposit token, signing as the same account
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no event contract is deployed at this address.
    pub async fn token(&self) -> Result<TokenContract, LedgerError> {
        let token = self.read(|registry| registry.token).await?;
        Ok(TokenContract::at(&self.ledger, token, self.signer))
    }

    /// `createEvent(name, capacity, requiredDeposit, endTime)`; returns the new id
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn create_event(
        &self,
        name: impl Into<String>,
        capacity: u32,
        token_required: TokenAmount,
        end_time: u64,
    ) -> Result<EventId, LedgerError> {
        let receipt = self
            .send(Call::CreateEvent {
                contract: self.address,
                event: NewEvent {
                    name: name.into(),
                    capacity,
                    token_required,
                    end_time,
                },
            })
            .await?;

        receipt
            .logs
            .iter()
            .find_map(|log| match log.event {
                LogEvent::EventCreated { event_id, .. } => Some(event_id),
                _ => None,
            })
            .ok_or(LedgerError::UnexpectedReceipt(receipt.tx_id))
    }

    /// `reserveSpace(eventId, tag)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn reserve_space(
        &self,
        event_id: EventId,
        tag: impl Into<String>,
    ) -> Result<Receipt, LedgerError> {
        self.send(Call::ReserveSpace {
            contract: self.address,
            event_id,
            tag: tag.into(),
        })
        .await
    }

    /// `checkIn(eventId, participant)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn check_in(
        &self,
        event_id: EventId,
        participant: Address,
    ) -> Result<Receipt, LedgerError> {
        self.send(Call::CheckIn {
            contract: self.address,
            event_id,
            participant,
        })
        .await
    }

    /// `claimRefund(eventId)`
    ///
    /// # Errors
    ///
    /// See [`Ledger::transact`].
    pub async fn claim_refund(&self, event_id: EventId) -> Result<Receipt, LedgerError> {
        self.send(Call::ClaimRefund {
            contract: self.address,
            event_id,
        })
        .await
    }

    /// `isUserCheckedIn(eventId, participant)`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no event contract is deployed at this address.
    pub async fn is_user_checked_in(
        &self,
        event_id: EventId,
        participant: Address,
    ) -> Result<bool, LedgerError> {
        self.read(move |registry| registry.is_user_checked_in(event_id, &participant))
            .await
    }

    /// `events(eventId)`
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] with `EventNotFound` for unknown ids.
    pub async fn events(&self, event_id: EventId) -> Result<Event, LedgerError> {
        self.read(move |registry| registry.event(event_id).cloned())
            .await?
            .map_err(LedgerError::from)
    }

    /// Reservation of `participant` for `event_id`, if any
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no event contract is deployed at this address.
    pub async fn reservation(
        &self,
        event_id: EventId,
        participant: Address,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.read(move |registry| registry.reservation(event_id, &participant).cloned())
            .await
    }

    /// Number of events created so far
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reverted`] if no event contract is deployed at this address.
    pub async fn event_count(&self) -> Result<usize, LedgerError> {
        self.read(EventRegistryState::event_count)
            .await
    }

    async fn read<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&EventRegistryState) -> T,
    {
        let address = self.address;
        self.ledger
            .view(move |state| state.contracts.registry(&address).map(f))
            .await
            .map_err(LedgerError::from)
    }

    async fn send(&self, call: Call) -> Result<Receipt, LedgerError> {
        self.ledger.transact(self.signer, call).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::types::{labeled_address, parse_units};
    use tokengate_testing::ManualClock;

    fn params(owner: Address) -> TokenParams {
        TokenParams {
            name: "MyToken".to_string(),
            symbol: "MTK".to_string(),
            decimals: 18,
            initial_supply: parse_units("1000", 18).unwrap(),
            owner,
        }
    }

    #[tokio::test]
    async fn deploy_and_read_token_metadata() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");

        let token = ledger.deploy_token(owner, params(owner)).await.unwrap();

        assert_eq!(token.signer(), owner);
        assert_eq!(token.decimals().await.unwrap(), 18);
        assert_eq!(
            token.metadata().await.unwrap(),
            ("MyToken".to_string(), "MTK".to_string(), owner)
        );
        assert_eq!(
            token.balance_of(owner).await.unwrap(),
            parse_units("1000", 18).unwrap()
        );
    }

    #[tokio::test]
    async fn reverted_call_returns_reason_and_keeps_receipt() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");
        let user = labeled_address("user");
        let token = ledger.deploy_token(owner, params(owner)).await.unwrap();

        let err = token
            .connect(user)
            .mint(user, TokenAmount::from(1u64))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "transaction reverted: Only the token owner can mint");
        let receipt = ledger.receipt(TxId(2)).await.unwrap();
        assert!(!receipt.is_success());
        assert_eq!(receipt.from, user);
    }

    #[tokio::test]
    async fn views_on_missing_contracts_fail() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let ghost = TokenContract::at(&ledger, labeled_address("ghost"), Address::ZERO);

        assert!(matches!(
            ghost.total_supply().await,
            Err(LedgerError::Reverted(ContractError::ContractNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn subscribers_receive_committed_logs() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");
        let mut logs = ledger.subscribe_logs();

        ledger.deploy_token(owner, params(owner)).await.unwrap();

        let (tx_id, emitted) = tokio::time::timeout(Duration::from_secs(1), logs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx_id, TxId(1));
        assert!(matches!(emitted[0].event, LogEvent::Transfer { to, .. } if to == owner));
    }

    #[tokio::test]
    async fn subscription_starts_after_already_committed_logs() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");
        ledger.deploy_token(owner, params(owner)).await.unwrap();

        let mut logs = ledger.subscribe_logs();

        assert!(
            tokio::time::timeout(Duration::from_millis(50), logs.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_deliver_logs_in_block_order() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");
        let token = ledger.deploy_token(owner, params(owner)).await.unwrap();
        let mut logs = ledger.subscribe_logs();

        let mut tasks = Vec::new();
        for i in 0..64 {
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                let to = labeled_address(&format!("holder-{i}"));
                token.transfer(to, TokenAmount::from(1u64)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut blocks = Vec::new();
        for _ in 0..64 {
            let (tx_id, _) = tokio::time::timeout(Duration::from_secs(1), logs.recv())
                .await
                .unwrap()
                .unwrap();
            blocks.push(ledger.receipt(tx_id).await.unwrap().block_number);
        }
        assert_eq!(blocks, (2..=65).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn shutdown_rejects_new_transactions() {
        let ledger = Ledger::new(Arc::new(ManualClock::default()));
        let owner = labeled_address("owner");

        ledger.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            ledger.deploy_token(owner, params(owner)).await.err(),
            Some(LedgerError::Store(StoreError::ShutdownInProgress))
        );
    }
}
