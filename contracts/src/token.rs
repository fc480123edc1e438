//! `MyToken`: a fungible token ledger with ERC-20 semantics.
//!
//! Balances and allowances live in ordered maps so that iteration (and
//! therefore every receipt and test) is deterministic. Amounts are base units.
//!
//! The event contract never touches these maps. It only talks to a token
//! through [`TokenLedger`], the same surface an external contract would call.

use crate::error::{ContractError, Restriction};
use crate::types::{Address, Log, LogEvent, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Constructor arguments for a token deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    /// Token name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Display decimals
    pub decimals: u8,
    /// Amount minted to `owner` at deployment, in base units
    pub initial_supply: TokenAmount,
    /// Account allowed to mint later
    pub owner: Address,
}

/// The token surface other contracts call into
pub trait TokenLedger {
    /// Address of the token contract
    fn address(&self) -> Address;

    /// Balance of `holder`
    fn balance_of(&self, holder: &Address) -> TokenAmount;

    /// Remaining amount `spender` may move on behalf of `owner`
    fn allowance(&self, owner: &Address, spender: &Address) -> TokenAmount;

    /// Moves `amount` from `from` to `to`, where `from` is the caller
    ///
    /// # Errors
    ///
    /// [`ContractError::InsufficientBalance`] or [`ContractError::InvalidReceiver`].
    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError>;

    /// Moves `amount` from `from` to `to`, spending the caller's (`spender`) allowance
    ///
    /// # Errors
    ///
    /// [`ContractError::InsufficientAllowance`] is checked before
    /// [`ContractError::InsufficientBalance`].
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError>;
}

/// Storage of one deployed token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Contract address
    pub address: Address,
    /// Token name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Display decimals
    pub decimals: u8,
    /// Account allowed to mint
    pub owner: Address,
    total_supply: TokenAmount,
    balances: BTreeMap<Address, TokenAmount>,
    allowances: BTreeMap<(Address, Address), TokenAmount>,
}

impl TokenState {
    /// Runs the constructor: mints the initial supply to the owner
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidReceiver`] if the owner is the null address.
    pub fn deploy(address: Address, params: TokenParams) -> Result<(Self, Vec<Log>), ContractError> {
        let TokenParams {
            name,
            symbol,
            decimals,
            initial_supply,
            owner,
        } = params;

        let mut token = Self {
            address,
            name,
            symbol,
            decimals,
            owner,
            total_supply: TokenAmount::ZERO,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        };
        let logs = token.mint_to(owner, initial_supply)?;
        Ok((token, logs))
    }

    /// Total amount in circulation
    #[must_use]
    pub const fn total_supply(&self) -> TokenAmount {
        self.total_supply
    }

    /// Every non-zero balance, ordered by holder
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &TokenAmount)> {
        self.balances.iter().filter(|(_, amount)| !amount.is_zero())
    }

    /// Sets the allowance of `spender` over the caller's (`owner`) tokens
    ///
    /// # Errors
    ///
    /// [`ContractError::InvalidSpender`] for the null address.
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError> {
        if spender.is_zero() {
            return Err(ContractError::InvalidSpender(spender));
        }
        self.allowances.insert((owner, spender), amount);
        Ok(vec![Log::new(
            self.address,
            LogEvent::Approval {
                owner,
                spender,
                value: amount,
            },
        )])
    }

    /// Creates new tokens; only the owner may call it
    ///
    /// # Errors
    ///
    /// [`ContractError::Unauthorized`] for any other caller,
    /// [`ContractError::ArithmeticOverflow`] if supply would overflow.
    pub fn mint(
        &mut self,
        caller: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError> {
        if caller != self.owner {
            return Err(ContractError::Unauthorized {
                caller,
                restriction: Restriction::Mint,
            });
        }
        self.mint_to(to, amount)
    }

    fn mint_to(&mut self, to: Address, amount: TokenAmount) -> Result<Vec<Log>, ContractError> {
        if to.is_zero() {
            return Err(ContractError::InvalidReceiver(to));
        }
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ContractError::ArithmeticOverflow)?;
        self.credit(to, amount)?;
        Ok(vec![Log::new(
            self.address,
            LogEvent::Transfer {
                from: Address::ZERO,
                to,
                value: amount,
            },
        )])
    }

    fn credit(&mut self, to: Address, amount: TokenAmount) -> Result<(), ContractError> {
        let balance = self.balances.entry(to).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(ContractError::ArithmeticOverflow)?;
        Ok(())
    }

    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError> {
        if to.is_zero() {
            return Err(ContractError::InvalidReceiver(to));
        }

        let available = self.balance_of(&from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance {
                holder: from,
                available,
                required: amount,
            })?;

        self.balances.insert(from, remaining);
        self.credit(to, amount)?;

        Ok(vec![Log::new(
            self.address,
            LogEvent::Transfer {
                from,
                to,
                value: amount,
            },
        )])
    }

    /// Allowance left after spending `amount`; `None` for an unlimited allowance
    fn allowance_after(
        &self,
        owner: Address,
        spender: Address,
        amount: TokenAmount,
    ) -> Result<Option<TokenAmount>, ContractError> {
        let allowance = self.allowance(&owner, &spender);
        if allowance == TokenAmount::MAX {
            return Ok(None);
        }
        allowance
            .checked_sub(amount)
            .map(Some)
            .ok_or(ContractError::InsufficientAllowance {
                spender,
                allowance,
                required: amount,
            })
    }
}

impl TokenLedger for TokenState {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, holder: &Address) -> TokenAmount {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> TokenAmount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: TokenAmount,
    ) -> Result<Vec<Log>, ContractError> {
        let remaining = self.allowance_after(from, spender, amount)?;
        let logs = self.move_balance(from, to, amount)?;
        if let Some(remaining) = remaining {
            self.allowances.insert((from, spender), remaining);
        }
        Ok(logs)
    }
}
