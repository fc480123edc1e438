//! Revert reasons for the token and event contracts.
//!
//! Every variant aborts the whole transaction; the ledger records it in the
//! receipt and discards any state the transaction touched.

use crate::types::{Address, EventId, TokenAmount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role-gated operations and the message a caller sees when they lack the role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Restriction {
    /// `claimRefund` is reserved to the event creator
    ClaimFunds,
    /// `checkIn` is reserved to the event creator
    CheckIn,
    /// `mint` is reserved to the token owner
    Mint,
}

impl std::fmt::Display for Restriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ClaimFunds => "Only the event creator can claim funds",
            Self::CheckIn => "Only the event creator can check in participants",
            Self::Mint => "Only the token owner can mint",
        })
    }
}

/// Why a contract call reverted
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractError {
    /// Sender balance is below the amount being moved
    #[error("ERC20InsufficientBalance({holder}, {available}, {required})")]
    InsufficientBalance {
        /// Account being debited
        holder: Address,
        /// Its balance
        available: TokenAmount,
        /// Amount requested
        required: TokenAmount,
    },

    /// Spender allowance is below the amount being pulled
    #[error("ERC20InsufficientAllowance({spender}, {allowance}, {required})")]
    InsufficientAllowance {
        /// Account spending the allowance
        spender: Address,
        /// Remaining allowance
        allowance: TokenAmount,
        /// Amount requested
        required: TokenAmount,
    },

    /// Tokens sent to the null address
    #[error("ERC20InvalidReceiver({0})")]
    InvalidReceiver(Address),

    /// Allowance granted to the null address
    #[error("ERC20InvalidSpender({0})")]
    InvalidSpender(Address),

    /// Caller does not hold the role the operation requires
    #[error("{restriction}")]
    Unauthorized {
        /// Offending caller
        caller: Address,
        /// Which role was missing
        restriction: Restriction,
    },

    /// `claimRefund` before the event's end time
    #[error("Cannot claim funds before event ends")]
    TooEarly {
        /// Event id
        event_id: EventId,
        /// Unix end time
        end_time: u64,
        /// Block timestamp of the attempt
        now: u64,
    },

    /// `createEvent` with an end time that is not in the future
    #[error("Event end time must be in the future")]
    EndTimeNotInFuture {
        /// Requested end time
        end_time: u64,
        /// Block timestamp of the attempt
        now: u64,
    },

    /// No event with this id
    #[error("Event {0} does not exist")]
    EventNotFound(EventId),

    /// Reservation attempted at or after the end time
    #[error("Event {0} has already ended")]
    EventEnded(EventId),

    /// Every seat is taken
    #[error("Event {event_id} is fully booked ({capacity} seats)")]
    EventFull {
        /// Event id
        event_id: EventId,
        /// Seat limit
        capacity: u32,
    },

    /// Participant already holds a reservation for this event
    #[error("{participant} already reserved a space for event {event_id}")]
    AlreadyReserved {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
    },

    /// No reservation for this participant
    #[error("{participant} has no reservation for event {event_id}")]
    NotReserved {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
    },

    /// Participant was already checked in
    #[error("{participant} is already checked in to event {event_id}")]
    AlreadyCheckedIn {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
    },

    /// The deposit was swept to the creator; the reservation is closed
    #[error("Deposit of {participant} for event {event_id} was already claimed")]
    ReservationSwept {
        /// Event id
        event_id: EventId,
        /// Participant
        participant: Address,
    },

    /// `claimRefund` called a second time
    #[error("Funds for event {0} were already claimed")]
    AlreadyClaimed(EventId),

    /// Checked arithmetic failed
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Call targets an address with no contract of the expected kind
    #[error("No {kind} contract deployed at {address}")]
    ContractNotFound {
        /// Target address
        address: Address,
        /// Expected contract kind
        kind: ContractKind,
    },
}

/// The two contract kinds the ledger can host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    /// `MyToken`
    Token,
    /// `EventContract`
    EventRegistry,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Token => "token",
            Self::EventRegistry => "event",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::labeled_address;

    #[test]
    fn role_messages_are_fixed() {
        let err = ContractError::Unauthorized {
            caller: labeled_address("mallory"),
            restriction: Restriction::ClaimFunds,
        };
        assert_eq!(err.to_string(), "Only the event creator can claim funds");

        let err = ContractError::TooEarly {
            event_id: EventId::FIRST,
            end_time: 10,
            now: 5,
        };
        assert_eq!(err.to_string(), "Cannot claim funds before event ends");
    }

    #[test]
    fn insufficient_balance_carries_its_arguments() {
        let holder = labeled_address("user3");
        let err = ContractError::InsufficientBalance {
            holder,
            available: TokenAmount::ZERO,
            required: TokenAmount::from(50u64),
        };
        assert_eq!(
            err.to_string(),
            format!("ERC20InsufficientBalance({holder}, 0, 50)")
        );
    }
}
