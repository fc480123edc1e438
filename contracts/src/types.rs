//! Domain types shared by the token, the event registry and the ledger.
//!
//! Addresses and amounts are the EVM primitives from `alloy-primitives`.
//! Amounts are always carried in base units; human-readable amounts only
//! exist at the edges, through [`parse_units`] and [`format_units`].

use alloy_primitives::utils::{self, ParseUnits};
use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use alloy_primitives::{Address, B256, U256};

/// Token amount in base units (already scaled by `10^decimals`)
///
/// `TokenAmount::MAX` is the unlimited-allowance sentinel; allowances at that
/// value are never decremented.
pub type TokenAmount = U256;

/// Deterministic address for a named account (test signers, demo users)
#[must_use]
pub fn labeled_address(label: &str) -> Address {
    Address::from_word(keccak256(format!("account:{label}")))
}

/// Failure to convert a decimal string into base units
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Rejected by the unit parser
    #[error("invalid decimal amount {value:?}: {reason}")]
    Invalid {
        /// Input value
        value: String,
        /// Parser message
        reason: String,
    },

    /// Amounts are unsigned
    #[error("{0:?} is negative")]
    Negative(String),

    /// More fractional digits than the token has decimals
    #[error("{value:?} has more than {decimals} fractional digits")]
    TooPrecise {
        /// Input value
        value: String,
        /// Token decimals
        decimals: u8,
    },
}

/// Converts a decimal string such as `"50"` or `"0.25"` into base units
///
/// Excess fractional digits are an error rather than being truncated.
///
/// # Errors
///
/// Returns [`AmountError`] for malformed, negative or over-precise input.
pub fn parse_units(value: &str, decimals: u8) -> Result<TokenAmount, AmountError> {
    let value = value.trim();
    let invalid = |reason: String| AmountError::Invalid {
        value: value.to_string(),
        reason,
    };

    let fraction_digits = value.split_once('.').map_or(0, |(_, fraction)| fraction.len());
    if fraction_digits > usize::from(decimals) {
        return Err(AmountError::TooPrecise {
            value: value.to_string(),
            decimals,
        });
    }

    match utils::parse_units(value, decimals).map_err(|err| invalid(err.to_string()))? {
        ParseUnits::U256(amount) => Ok(amount),
        ParseUnits::I256(_) => Err(AmountError::Negative(value.to_string())),
    }
}

/// Renders base units as a decimal string, trimming trailing zeros
///
/// Falls back to plain base units when `decimals` is out of range.
#[must_use]
pub fn format_units(amount: TokenAmount, decimals: u8) -> String {
    match utils::format_units(amount, decimals) {
        Ok(text) if text.contains('.') => {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        },
        Ok(text) => text,
        Err(_) => amount.to_string(),
    }
}

/// Sequential, 1-based event identifier
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventId(u64);

impl EventId {
    /// The first identifier handed out by a fresh registry
    pub const FIRST: Self = Self(1);

    /// Creates an event identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric identifier
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The identifier following this one
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the client assigns to each submitted transaction
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Something a contract announced while executing a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEvent {
    /// Tokens moved; `from` is zero for mints
    Transfer {
        /// Sender
        from: Address,
        /// Receiver
        to: Address,
        /// Amount moved
        value: TokenAmount,
    },

    /// Allowance set
    Approval {
        /// Token holder
        owner: Address,
        /// Approved spender
        spender: Address,
        /// New allowance
        value: TokenAmount,
    },

    /// Event registered
    EventCreated {
        /// New event id
        event_id: EventId,
        /// Creator
        creator: Address,
        /// Event name
        name: String,
        /// Unix end time
        end_time: u64,
    },

    /// Deposit escrowed for a participant
    SpaceReserved {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
        /// Reservation tag
        tag: String,
        /// Escrowed amount
        deposit: TokenAmount,
    },

    /// Participant checked in and deposit returned
    CheckedIn {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
        /// Amount returned
        refunded: TokenAmount,
    },

    /// No-show deposits swept to the creator
    FundsClaimed {
        /// Event id
        event_id: EventId,
        /// Creator receiving the funds
        creator: Address,
        /// Total amount swept
        amount: TokenAmount,
        /// Number of reservations swept
        no_shows: u32,
    },
}

/// A log entry tagged with the contract that emitted it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Payload
    pub event: LogEvent,
}

impl Log {
    /// Creates a log entry
    #[must_use]
    pub const fn new(address: Address, event: LogEvent) -> Self {
        Self { address, event }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[test]
    fn labeled_addresses_are_stable_and_distinct() {
        let alice = labeled_address("alice");
        assert_eq!(alice, labeled_address("alice"));
        assert_ne!(alice, labeled_address("bob"));
        assert!(!alice.is_zero());
        assert_eq!(alice.to_string().parse::<Address>().unwrap(), alice);
    }

    #[test]
    fn contract_addresses_follow_create() {
        let deployer = labeled_address("deployer");
        let first = deployer.create(0);
        assert_ne!(first, deployer.create(1));
        assert_ne!(first, labeled_address("other").create(0));
        assert_eq!(first, deployer.create(0));
    }

    #[test]
    fn parse_units_scales_by_decimals() {
        assert_eq!(
            parse_units("50", 18),
            Ok(U256::from(50u64) * U256::from(10u64).pow(U256::from(18u64)))
        );
        assert_eq!(parse_units("0.25", 2), Ok(U256::from(25u64)));
        assert_eq!(parse_units("7", 0), Ok(U256::from(7u64)));
    }

    #[test]
    fn parse_units_rejects_bad_input() {
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(matches!(
            parse_units("0.001", 2),
            Err(AmountError::TooPrecise { decimals: 2, .. })
        ));
    }

    #[test]
    fn format_units_trims_trailing_zeros() {
        assert_eq!(format_units(parse_units("50", 18).unwrap(), 18), "50");
        assert_eq!(format_units(U256::from(1_500u64), 3), "1.5");
        assert_eq!(format_units(U256::from(5u64), 2), "0.05");
    }

    #[test]
    fn event_ids_are_sequential() {
        assert_eq!(EventId::FIRST.get(), 1);
        assert_eq!(EventId::FIRST.next(), EventId::new(2));
    }
}
