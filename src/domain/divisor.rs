//! Shared divisor search over anything that carries a weight.
//!
//! Seats are handed out one at a time to the unit with the highest
//! `weight / (seats + 0.5)`. This is the highest-averages form of the
//! Sainte-Lague method: the resulting distribution equals `round(weight / D)` for
//! every divisor `D` of the reported interval.

use num::{BigInt, Zero};
use tracing::{debug, instrument, trace};

use crate::domain::error::DomainResult;
use crate::domain::lot::{LotDecisionResolver, Resolution, TieGroup, TieId, TiePhase};
use crate::domain::quotient::{from_u64, one_half, round_half_up, simplest_between, Rational};

/// A unit competing in a divisor search: a list, a column or a cell.
pub trait Weighable {
    fn unit_id(&self) -> &str;
    fn weight(&self) -> Rational;
    fn is_eligible(&self) -> bool;
}

/// Plain weighted unit, used where the weight is derived on the fly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedUnit {
    pub id: String,
    pub weight: Rational,
    pub eligible: bool,
}

impl Weighable for WeightedUnit {
    fn unit_id(&self) -> &str {
        &self.id
    }

    fn weight(&self) -> Rational {
        self.weight.clone()
    }

    fn is_eligible(&self) -> bool {
        self.eligible
    }
}

/// Sainte-Lague divisor step a unit holding `seats` competes with for its
/// next seat: 0.5, 1.5, 2.5, ...
pub fn sainte_lague_step(seats: u64) -> Rational {
    from_u64(seats) + one_half()
}

/// Step at which the unit won its last seat; None without seats.
fn previous_step(seats: u64) -> Option<Rational> {
    (seats > 0).then(|| sainte_lague_step(seats - 1))
}

/// How a divisor search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStatus {
    Complete,
    /// Stopped at an unresolved tie; the tied seats stay unallocated
    Tied(TieGroup),
    /// Seats remain but no eligible unit carries weight
    NoEligibleUnits,
}

/// Result of one divisor search, seats in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub seats: Vec<u64>,
    /// Seats of `seats` that came from a pinned lot decision
    pub seats_from_lot: Vec<u64>,
    /// Largest divisor reproducing the distribution
    pub divisor: Option<Rational>,
    pub status: AllocationStatus,
    pub lot_applied: Option<TieId>,
}

impl Allocation {
    pub fn total(&self) -> u64 {
        self.seats.iter().sum()
    }
}

/// Sainte-Lague divisor search; ties are reported under `phase`.
#[derive(Debug, Clone, Copy)]
pub struct DivisorSearch<'a> {
    phase: TiePhase,
    resolver: LotDecisionResolver<'a>,
}

impl<'a> DivisorSearch<'a> {
    pub fn new(phase: TiePhase, resolver: LotDecisionResolver<'a>) -> Self {
        Self { phase, resolver }
    }

    /// Distributes `seats` among `units`.
    ///
    /// `tie_id` names a tie from its candidate ids. Ties are only raised when
    /// fewer seats remain than units share the highest quotient.
    #[instrument(level = "debug", skip(self, units, tie_id), fields(units = units.len()))]
    pub fn apportion<U, F>(&self, units: &[U], seats: u64, tie_id: F) -> DomainResult<Allocation>
    where
        U: Weighable,
        F: Fn(&[String]) -> TieId,
    {
        let weights: Vec<Option<Rational>> = units
            .iter()
            .map(|u| u.is_eligible().then(|| u.weight()))
            .collect();
        let mut allocated = vec![0u64; units.len()];
        let mut from_lot = vec![0u64; units.len()];
        let mut remaining = seats;
        let mut status = AllocationStatus::Complete;
        let mut lot_applied = None;

        while remaining > 0 {
            let quotients: Vec<Option<Rational>> = weights
                .iter()
                .zip(&allocated)
                .map(|(w, &s)| w.as_ref().map(|w| w / sainte_lague_step(s)))
                .collect();
            // zero-weight units never take a seat
            let Some(best) = quotients.iter().flatten().max().filter(|q| !q.is_zero()).cloned() else {
                status = AllocationStatus::NoEligibleUnits;
                break;
            };
            let tied: Vec<usize> = quotients
                .iter()
                .enumerate()
                .filter(|(_, q)| q.as_ref() == Some(&best))
                .map(|(i, _)| i)
                .collect();
            trace!("best quotient {} shared by {} unit(s)", best, tied.len());

            if (tied.len() as u64) <= remaining {
                for &i in &tied {
                    allocated[i] += 1;
                }
                remaining -= tied.len() as u64;
                continue;
            }

            let candidates: Vec<String> = tied.iter().map(|&i| units[i].unit_id().to_string()).collect();
            let tie = TieGroup {
                id: tie_id(&candidates),
                phase: self.phase,
                candidates,
                seats: remaining as usize,
            };
            match self.resolver.resolve(&tie)? {
                Resolution::Pinned(winners) => {
                    for &i in &tied {
                        if winners.iter().any(|w| w == units[i].unit_id()) {
                            allocated[i] += 1;
                            from_lot[i] += 1;
                        }
                    }
                    lot_applied = Some(tie.id);
                    remaining = 0;
                }
                Resolution::Open(reason) => {
                    debug!("tie {} stays open: {}", tie.id, reason);
                    status = AllocationStatus::Tied(tie);
                    break;
                }
            }
        }

        let divisor = if status == AllocationStatus::Complete {
            Self::largest_divisor(&weights, &allocated)
        } else {
            None
        };

        Ok(Allocation {
            seats: allocated,
            seats_from_lot: from_lot,
            divisor,
            status,
            lot_applied,
        })
    }

    /// `min(weight / previous_step(seats))` over all units holding seats.
    fn largest_divisor(weights: &[Option<Rational>], allocated: &[u64]) -> Option<Rational> {
        weights
            .iter()
            .zip(allocated)
            .filter_map(|(w, &s)| {
                let w = w.as_ref()?;
                let step = previous_step(s)?;
                Some(w / step)
            })
            .filter(|d| !d.is_zero())
            .min()
    }

    /// `max(weight / step(seats))` over eligible units: the quotient the next
    /// seat would go for. Divisors must stay strictly above it.
    pub fn next_seat_quotient<U: Weighable>(&self, units: &[U], seats: &[u64]) -> Option<Rational> {
        units
            .iter()
            .zip(seats)
            .filter(|(u, _)| u.is_eligible())
            .map(|(u, &s)| u.weight() / sainte_lague_step(s))
            .max()
    }

    /// Simplest fraction inside the reproducing divisor interval, or its upper
    /// end when the interval has no interior. Keeps divisors short when they
    /// are fed back into the next scaling step.
    pub fn interior_divisor<U: Weighable>(&self, units: &[U], allocation: &Allocation) -> Option<Rational> {
        let largest = allocation.divisor.clone()?;
        match self.next_seat_quotient(units, &allocation.seats) {
            Some(lower) if lower < largest => Some(simplest_between(&lower, &largest)),
            _ => Some(largest),
        }
    }

    /// Checks that `round(weight / divisor)` reproduces the allocation. Does
    /// not hold for seats handed out by a lot decision.
    pub fn reproduces<U: Weighable>(&self, units: &[U], allocation: &Allocation) -> bool {
        let Some(divisor) = allocation.divisor.as_ref() else {
            return allocation.total() == 0;
        };
        units.iter().zip(&allocation.seats).all(|(u, &s)| {
            if !u.is_eligible() {
                return s == 0;
            }
            round_half_up(&(u.weight() / divisor)) == BigInt::from(s)
        })
    }
}
