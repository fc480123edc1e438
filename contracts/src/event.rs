//! `EventContract`: event registry and per-event deposit escrow.
//!
//! Reservation lifecycle:
//!
//! ```text
//! (none) ──reserveSpace──► Reserved ──checkIn──────────────► CheckedIn
//!                              │
//!                              └──claimRefund (after end)──► Swept
//! ```
//!
//! Deposits move only through the bound token's [`TokenLedger`] surface:
//! `transfer_from` on reservation, `transfer` on check-in and on sweep.

use crate::error::{ContractError, Restriction};
use crate::token::TokenLedger;
use crate::types::{Address, EventId, Log, LogEvent, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event record; immutable after creation apart from its counters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sequential id
    pub id: EventId,
    /// Display name
    pub event_name: String,
    /// Account that created the event
    pub event_creator: Address,
    /// Maximum number of reservations
    pub expected_users: u32,
    /// Deposit escrowed per reservation, in base units
    pub token_required: TokenAmount,
    /// Unix timestamp after which no-show deposits can be claimed
    pub end_time: u64,
    /// Reservations made so far
    pub reserved: u32,
    /// Whether `claimRefund` already ran
    pub funds_claimed: bool,
}

impl Event {
    /// Seats still available
    #[must_use]
    pub const fn seats_left(&self) -> u32 {
        self.expected_users.saturating_sub(self.reserved)
    }

    /// Whether `now` is at or past the end time
    #[must_use]
    pub const fn has_ended(&self, now: u64) -> bool {
        now >= self.end_time
    }
}

/// Where a reservation is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Deposit held in escrow
    Reserved,
    /// Participant attended; deposit returned
    CheckedIn,
    /// Participant did not attend; deposit paid to the creator
    Swept,
}

/// One participant's reservation for one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Free-form tag supplied at reservation time (seat, reference)
    pub tag: String,
    /// Amount held in escrow
    pub deposit: TokenAmount,
    /// Lifecycle position
    pub status: ReservationStatus,
    /// Block timestamp of the reservation
    pub reserved_at: u64,
}

impl Reservation {
    /// Whether the participant has been checked in
    #[must_use]
    pub fn is_checked_in(&self) -> bool {
        self.status == ReservationStatus::CheckedIn
    }
}

/// Arguments of `createEvent`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// Maximum number of reservations
    pub capacity: u32,
    /// Deposit per reservation, in base units
    pub token_required: TokenAmount,
    /// Unix end time
    pub end_time: u64,
}

/// Storage of one deployed event contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRegistryState {
    /// Contract address (holds the escrowed deposits)
    pub address: Address,
    /// Token used for deposits
    pub token: Address,
    next_event_id: EventId,
    events: BTreeMap<EventId, Event>,
    reservations: BTreeMap<EventId, BTreeMap<Address, Reservation>>,
}

impl EventRegistryState {
    /// Runs the constructor
    #[must_use]
    pub const fn deploy(address: Address, token: Address) -> Self {
        Self {
            address,
            token,
            next_event_id: EventId::FIRST,
            events: BTreeMap::new(),
            reservations: BTreeMap::new(),
        }
    }

    /// Number of events created
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Returns an event by id
    ///
    /// # Errors
    ///
    /// [`ContractError::EventNotFound`] if no such event exists.
    pub fn event(&self, event_id: EventId) -> Result<&Event, ContractError> {
        self.events
            .get(&event_id)
            .ok_or(ContractError::EventNotFound(event_id))
    }

    /// Returns a participant's reservation, if any
    #[must_use]
    pub fn reservation(&self, event_id: EventId, participant: &Address) -> Option<&Reservation> {
        self.reservations.get(&event_id)?.get(participant)
    }

    /// False for unknown events and participants who never reserved
    #[must_use]
    pub fn is_user_checked_in(&self, event_id: EventId, participant: &Address) -> bool {
        self.reservation(event_id, participant)
            .is_some_and(Reservation::is_checked_in)
    }

    /// Reservations of an event still holding their deposit
    fn pending_reservations(&self, event_id: EventId) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .get(&event_id)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|r| r.status == ReservationStatus::Reserved)
    }

    /// Registers a new event under the next sequential id
    ///
    /// # Errors
    ///
    /// [`ContractError::EndTimeNotInFuture`] if `end_time <= now`.
    pub fn create_event(
        &mut self,
        caller: Address,
        new_event: NewEvent,
        now: u64,
    ) -> Result<(EventId, Vec<Log>), ContractError> {
        let NewEvent {
            name,
            capacity,
            token_required,
            end_time,
        } = new_event;

        if end_time <= now {
            return Err(ContractError::EndTimeNotInFuture { end_time, now });
        }

        let id = self.next_event_id;
        self.next_event_id = id.next();

        let log = Log::new(
            self.address,
            LogEvent::EventCreated {
                event_id: id,
                creator: caller,
                name: name.clone(),
                end_time,
            },
        );

        self.events.insert(
            id,
            Event {
                id,
                event_name: name,
                event_creator: caller,
                expected_users: capacity,
                token_required,
                end_time,
                reserved: 0,
                funds_claimed: false,
            },
        );

        Ok((id, vec![log]))
    }

    /// Escrows the event deposit from the caller and records a reservation
    ///
    /// # Errors
    ///
    /// [`ContractError::EventNotFound`], [`ContractError::EventEnded`],
    /// [`ContractError::AlreadyReserved`], [`ContractError::EventFull`], or the
    /// token's allowance/balance error, unchanged.
    pub fn reserve_space(
        &mut self,
        token: &mut impl TokenLedger,
        caller: Address,
        event_id: EventId,
        tag: String,
        now: u64,
    ) -> Result<Vec<Log>, ContractError> {
        let event = self.event(event_id)?;
        if event.has_ended(now) {
            return Err(ContractError::EventEnded(event_id));
        }
        if self.reservation(event_id, &caller).is_some() {
            return Err(ContractError::AlreadyReserved {
                event_id,
                participant: caller,
            });
        }
        if event.seats_left() == 0 {
            return Err(ContractError::EventFull {
                event_id,
                capacity: event.expected_users,
            });
        }
        let deposit = event.token_required;

        let mut logs = token.transfer_from(self.address, caller, self.address, deposit)?;

        if let Some(event) = self.events.get_mut(&event_id) {
            event.reserved += 1;
        }
        self.reservations.entry(event_id).or_default().insert(
            caller,
            Reservation {
                tag: tag.clone(),
                deposit,
                status: ReservationStatus::Reserved,
                reserved_at: now,
            },
        );

        logs.push(Log::new(
            self.address,
            LogEvent::SpaceReserved {
                event_id,
                participant: caller,
                tag,
                deposit,
            },
        ));
        Ok(logs)
    }

    /// Marks a participant as attended and returns their deposit
    ///
    /// # Errors
    ///
    /// [`ContractError::Unauthorized`] unless the caller created the event;
    /// [`ContractError::NotReserved`], [`ContractError::AlreadyCheckedIn`] or
    /// [`ContractError::ReservationSwept`] for reservations not in `Reserved`.
    pub fn check_in(
        &mut self,
        token: &mut impl TokenLedger,
        caller: Address,
        event_id: EventId,
        participant: Address,
    ) -> Result<Vec<Log>, ContractError> {
        let event = self.event(event_id)?;
        if caller != event.event_creator {
            return Err(ContractError::Unauthorized {
                caller,
                restriction: Restriction::CheckIn,
            });
        }

        let reservation = self
            .reservations
            .get_mut(&event_id)
            .and_then(|by_participant| by_participant.get_mut(&participant))
            .ok_or(ContractError::NotReserved {
                event_id,
                participant,
            })?;

        match reservation.status {
            ReservationStatus::Reserved => {},
            ReservationStatus::CheckedIn => {
                return Err(ContractError::AlreadyCheckedIn {
                    event_id,
                    participant,
                });
            },
            ReservationStatus::Swept => {
                return Err(ContractError::ReservationSwept {
                    event_id,
                    participant,
                });
            },
        }

        let refunded = reservation.deposit;
        let mut logs = token.transfer(self.address, participant, refunded)?;
        reservation.status = ReservationStatus::CheckedIn;

        logs.push(Log::new(
            self.address,
            LogEvent::CheckedIn {
                event_id,
                participant,
                refunded,
            },
        ));
        Ok(logs)
    }

    /// Pays every unreturned deposit of an ended event to its creator
    ///
    /// Callable once per event. Authorization is checked before timing, so a
    /// non-creator always sees [`ContractError::Unauthorized`].
    ///
    /// # Errors
    ///
    /// [`ContractError::Unauthorized`], [`ContractError::TooEarly`],
    /// [`ContractError::AlreadyClaimed`].
    pub fn claim_refund(
        &mut self,
        token: &mut impl TokenLedger,
        caller: Address,
        event_id: EventId,
        now: u64,
    ) -> Result<Vec<Log>, ContractError> {
        let event = self.event(event_id)?;
        if caller != event.event_creator {
            return Err(ContractError::Unauthorized {
                caller,
                restriction: Restriction::ClaimFunds,
            });
        }
        if !event.has_ended(now) {
            return Err(ContractError::TooEarly {
                event_id,
                end_time: event.end_time,
                now,
            });
        }
        if event.funds_claimed {
            return Err(ContractError::AlreadyClaimed(event_id));
        }

        let mut amount = TokenAmount::ZERO;
        let mut no_shows = 0u32;
        for reservation in self.pending_reservations(event_id) {
            amount = amount
                .checked_add(reservation.deposit)
                .ok_or(ContractError::ArithmeticOverflow)?;
            no_shows += 1;
        }

        let mut logs = if amount.is_zero() {
            Vec::new()
        } else {
            token.transfer(self.address, caller, amount)?
        };

        if let Some(by_participant) = self.reservations.get_mut(&event_id) {
            for reservation in by_participant
                .values_mut()
                .filter(|r| r.status == ReservationStatus::Reserved)
            {
                reservation.status = ReservationStatus::Swept;
            }
        }
        if let Some(event) = self.events.get_mut(&event_id) {
            event.funds_claimed = true;
        }

        logs.push(Log::new(
            self.address,
            LogEvent::FundsClaimed {
                event_id,
                creator: caller,
                amount,
                no_shows,
            },
        ));
        Ok(logs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::token::{TokenParams, TokenState};
    use crate::types::labeled_address;

    const NOW: u64 = 1_735_689_600;

    struct Fixture {
        token: TokenState,
        registry: EventRegistryState,
        creator: Address,
        user1: Address,
        user2: Address,
        user3: Address,
    }

    fn tokens(n: u128) -> TokenAmount {
        TokenAmount::from(n) * TokenAmount::from(10u64).pow(TokenAmount::from(18u64))
    }

    fn fixture() -> Fixture {
        let creator = labeled_address("owner");
        let user1 = labeled_address("user1");
        let user2 = labeled_address("user2");
        let user3 = labeled_address("user3");

        let (mut token, _) = TokenState::deploy(
            labeled_address("token"),
            TokenParams {
                name: "EventToken".to_string(),
                symbol: "ETK".to_string(),
                decimals: 18,
                initial_supply: tokens(1_000_000),
                owner: creator,
            },
        )
        .unwrap();
        token.transfer(creator, user1, tokens(100)).unwrap();
        token.transfer(creator, user2, tokens(100)).unwrap();

        let mut registry =
            EventRegistryState::deploy(labeled_address("events"), token.address);
        registry
            .create_event(
                creator,
                NewEvent {
                    name: "Blockchain Conference".to_string(),
                    capacity: 2,
                    token_required: tokens(50),
                    end_time: NOW + 3_000,
                },
                NOW,
            )
            .unwrap();

        Fixture {
            token,
            registry,
            creator,
            user1,
            user2,
            user3,
        }
    }

    fn approve_and_reserve(user: Address, f: &mut Fixture) -> Result<Vec<Log>, ContractError> {
        f.token.approve(user, f.registry.address, tokens(50)).unwrap();
        f.registry
            .reserve_space(&mut f.token, user, EventId::FIRST, "MK".to_string(), NOW)
    }

    #[test]
    fn create_event_assigns_sequential_ids() {
        let mut f = fixture();
        let (second, logs) = f
            .registry
            .create_event(
                f.user1,
                NewEvent {
                    name: "Meetup".to_string(),
                    capacity: 10,
                    token_required: tokens(1),
                    end_time: NOW + 10,
                },
                NOW,
            )
            .unwrap();

        assert_eq!(second, EventId::new(2));
        assert_eq!(f.registry.event_count(), 2);
        assert!(matches!(logs[0].event, LogEvent::EventCreated { event_id, .. } if event_id == second));

        let first = f.registry.event(EventId::FIRST).unwrap();
        assert_eq!(first.event_name, "Blockchain Conference");
        assert_eq!(first.event_creator, f.creator);
        assert_eq!(first.expected_users, 2);
        assert_eq!(first.token_required, tokens(50));
        assert_eq!(first.end_time, NOW + 3_000);
    }

    #[test]
    fn create_event_rejects_past_end_time() {
        let mut f = fixture();
        let result = f.registry.create_event(
            f.creator,
            NewEvent {
                name: "Yesterday".to_string(),
                capacity: 1,
                token_required: tokens(1),
                end_time: NOW,
            },
            NOW,
        );
        assert_eq!(
            result,
            Err(ContractError::EndTimeNotInFuture { end_time: NOW, now: NOW })
        );
    }

    #[test]
    fn reserve_escrows_deposit() {
        let mut f = fixture();
        let logs = approve_and_reserve(f.user1, &mut f).unwrap();

        assert_eq!(f.token.balance_of(&f.user1), tokens(50));
        assert_eq!(f.token.balance_of(&f.registry.address), tokens(50));
        assert_eq!(logs.len(), 2);
        let reservation = f.registry.reservation(EventId::FIRST, &f.user1).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Reserved);
        assert_eq!(reservation.tag, "MK");
        assert_eq!(f.registry.event(EventId::FIRST).unwrap().reserved, 1);
    }

    #[test]
    fn reserve_without_balance_propagates_token_error() {
        let mut f = fixture();
        let err = approve_and_reserve(f.user3, &mut f).unwrap_err();

        assert_eq!(
            err,
            ContractError::InsufficientBalance {
                holder: f.user3,
                available: TokenAmount::ZERO,
                required: tokens(50),
            }
        );
    }

    #[test]
    fn reserve_without_allowance_propagates_token_error() {
        let mut f = fixture();
        let err = f
            .registry
            .reserve_space(&mut f.token, f.user1, EventId::FIRST, "MK".to_string(), NOW)
            .unwrap_err();

        assert!(matches!(err, ContractError::InsufficientAllowance { .. }));
        assert_eq!(f.token.balance_of(&f.user1), tokens(100));
    }

    #[test]
    fn reserve_twice_is_rejected() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();

        assert_eq!(
            approve_and_reserve(f.user1, &mut f),
            Err(ContractError::AlreadyReserved {
                event_id: EventId::FIRST,
                participant: f.user1,
            })
        );
    }

    #[test]
    fn reserve_beyond_capacity_is_rejected() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();
        approve_and_reserve(f.user2, &mut f).unwrap();

        let latecomer = f.creator;
        assert_eq!(
            approve_and_reserve(latecomer, &mut f),
            Err(ContractError::EventFull {
                event_id: EventId::FIRST,
                capacity: 2,
            })
        );
    }

    #[test]
    fn reserve_after_end_or_for_unknown_event_is_rejected() {
        let mut f = fixture();
        f.token.approve(f.user1, f.registry.address, tokens(50)).unwrap();

        assert_eq!(
            f.registry.reserve_space(
                &mut f.token,
                f.user1,
                EventId::FIRST,
                "MK".to_string(),
                NOW + 3_000
            ),
            Err(ContractError::EventEnded(EventId::FIRST))
        );
        assert_eq!(
            f.registry.reserve_space(
                &mut f.token,
                f.user1,
                EventId::new(9),
                "MK".to_string(),
                NOW
            ),
            Err(ContractError::EventNotFound(EventId::new(9)))
        );
    }

    #[test]
    fn check_in_returns_deposit() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();

        f.registry
            .check_in(&mut f.token, f.creator, EventId::FIRST, f.user1)
            .unwrap();

        assert!(f.registry.is_user_checked_in(EventId::FIRST, &f.user1));
        assert_eq!(f.token.balance_of(&f.user1), tokens(100));
        assert_eq!(f.token.balance_of(&f.registry.address), TokenAmount::ZERO);
    }

    #[test]
    fn check_in_guards() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();

        assert_eq!(
            f.registry
                .check_in(&mut f.token, f.user2, EventId::FIRST, f.user1),
            Err(ContractError::Unauthorized {
                caller: f.user2,
                restriction: Restriction::CheckIn,
            })
        );
        assert_eq!(
            f.registry
                .check_in(&mut f.token, f.creator, EventId::FIRST, f.user2),
            Err(ContractError::NotReserved {
                event_id: EventId::FIRST,
                participant: f.user2,
            })
        );

        f.registry
            .check_in(&mut f.token, f.creator, EventId::FIRST, f.user1)
            .unwrap();
        assert_eq!(
            f.registry
                .check_in(&mut f.token, f.creator, EventId::FIRST, f.user1),
            Err(ContractError::AlreadyCheckedIn {
                event_id: EventId::FIRST,
                participant: f.user1,
            })
        );
    }

    #[test]
    fn never_reserved_participant_is_not_checked_in() {
        let f = fixture();
        assert!(!f.registry.is_user_checked_in(EventId::FIRST, &f.user3));
        assert!(!f.registry.is_user_checked_in(EventId::new(42), &f.user3));
    }

    #[test]
    fn claim_refund_sweeps_only_no_shows() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();
        approve_and_reserve(f.user2, &mut f).unwrap();
        f.registry
            .check_in(&mut f.token, f.creator, EventId::FIRST, f.user1)
            .unwrap();
        let creator_before = f.token.balance_of(&f.creator);

        let logs = f
            .registry
            .claim_refund(&mut f.token, f.creator, EventId::FIRST, NOW + 3_000)
            .unwrap();

        assert_eq!(f.token.balance_of(&f.creator), creator_before.checked_add(tokens(50)).unwrap());
        assert_eq!(f.token.balance_of(&f.registry.address), TokenAmount::ZERO);
        assert_eq!(
            f.registry.reservation(EventId::FIRST, &f.user2).unwrap().status,
            ReservationStatus::Swept
        );
        assert!(matches!(
            logs.last().unwrap().event,
            LogEvent::FundsClaimed { no_shows: 1, .. }
        ));

        assert_eq!(
            f.registry
                .check_in(&mut f.token, f.creator, EventId::FIRST, f.user2),
            Err(ContractError::ReservationSwept {
                event_id: EventId::FIRST,
                participant: f.user2,
            })
        );
    }

    #[test]
    fn claim_refund_guards_in_order() {
        let mut f = fixture();
        approve_and_reserve(f.user1, &mut f).unwrap();

        assert!(matches!(
            f.registry
                .claim_refund(&mut f.token, f.user1, EventId::FIRST, NOW + 5_000),
            Err(ContractError::Unauthorized {
                restriction: Restriction::ClaimFunds,
                ..
            })
        ));
        assert!(matches!(
            f.registry
                .claim_refund(&mut f.token, f.creator, EventId::FIRST, NOW),
            Err(ContractError::TooEarly { .. })
        ));

        f.registry
            .claim_refund(&mut f.token, f.creator, EventId::FIRST, NOW + 3_000)
            .unwrap();
        assert_eq!(
            f.registry
                .claim_refund(&mut f.token, f.creator, EventId::FIRST, NOW + 3_001),
            Err(ContractError::AlreadyClaimed(EventId::FIRST))
        );
    }

    #[test]
    fn claim_refund_with_no_reservations_pays_nothing() {
        let mut f = fixture();
        let before = f.token.balance_of(&f.creator);

        let logs = f
            .registry
            .claim_refund(&mut f.token, f.creator, EventId::FIRST, NOW + 3_000)
            .unwrap();

        assert_eq!(f.token.balance_of(&f.creator), before);
        assert_eq!(logs.len(), 1);
    }
}
