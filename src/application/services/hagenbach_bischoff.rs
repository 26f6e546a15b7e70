//! Hagenbach-Bischoff apportionment service
//!
//! Hands out the seats of an election one round at a time over its group
//! tree. Seats won by a list union are handed on to the union's children with
//! the same procedure, top-down and depth-first in child order.

use std::cmp::Ordering;

use generational_arena::Index;
use num::BigInt;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, trace};

use crate::application::ApplicationResult;
use crate::domain::quotient::{distribution_number, quotient, quotient_remainder, to_u64, Rational};
use crate::domain::{
    ApportionmentState, CalculationRound, DomainError, DomainResult, GroupTree, GroupTreeBuilder, GroupValues,
    LotDecisionResolver, ProportionalElectionInput, Resolution, TieGroup, TieId, TiePhase,
    WinnerReason,
};

/// Outcome of one Hagenbach-Bischoff run.
#[derive(Debug, Clone, Serialize)]
pub struct HagenbachBischoffResult {
    pub election_id: String,
    pub number_of_mandates: u64,
    pub state: ApportionmentState,
    #[serde(rename = "groups", serialize_with = "serialize_tree")]
    pub tree: GroupTree,
    pub rounds: Vec<CalculationRound>,
    /// The tie that stopped the run, if any
    pub pending: Option<TieGroup>,
}

fn serialize_tree<S: Serializer>(tree: &GroupTree, serializer: S) -> Result<S::Ok, S::Error> {
    tree.snapshot().serialize(serializer)
}

impl HagenbachBischoffResult {
    /// Mandates per list id, in tree order.
    pub fn list_mandates(&self) -> Vec<(String, u64)> {
        self.tree
            .leaf_nodes()
            .into_iter()
            .filter_map(|i| self.tree.get_node(i))
            .map(|n| (n.data.id.clone(), n.data.current_mandates))
            .collect()
    }

    pub fn mandates_of(&self, id: &str) -> Option<u64> {
        self.tree
            .find(id)
            .and_then(|i| self.tree.get_node(i))
            .map(|n| n.data.current_mandates)
    }
}

/// Runs the quotient procedure; stateless, one tree per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct HagenbachBischoffApportioner;

impl HagenbachBischoffApportioner {
    pub fn new() -> Self {
        Self
    }

    /// Builds the tree of `input` and apportions its seats.
    ///
    /// Contract violations fail before the first round. An unbreakable tie
    /// without a matching lot decision stops the run in
    /// [`ApportionmentState::HasOpenLotDecision`].
    #[instrument(level = "debug", skip(self, input), fields(election = %input.id))]
    pub fn apportion(&self, input: &ProportionalElectionInput) -> ApplicationResult<HagenbachBischoffResult> {
        let seats = GroupTreeBuilder::seats(input)?;
        let tree = GroupTreeBuilder::new().build(input)?;

        let mut run = Run {
            tree,
            rounds: Vec::new(),
            resolver: LotDecisionResolver::new(&input.lot_decisions),
        };
        let root = run.tree.root().ok_or(DomainError::EmptyTree)?;
        run.tree.data_mut(root)?.current_mandates = seats;
        let pending = run.distribute(root, seats)?;

        let state = match pending {
            None => {
                run.tree.verify_distribution(seats)?;
                ApportionmentState::Completed
            }
            Some(ref tie) => {
                info!("election {} waits for a lot decision on {}", input.id, tie);
                ApportionmentState::HasOpenLotDecision
            }
        };
        debug!("{} rounds, state {}", run.rounds.len(), state);

        Ok(HagenbachBischoffResult {
            election_id: input.id.clone(),
            number_of_mandates: seats,
            state,
            tree: run.tree,
            rounds: run.rounds,
            pending,
        })
    }
}

/// Mutable state of one run.
struct Run<'a> {
    tree: GroupTree,
    rounds: Vec<CalculationRound>,
    resolver: LotDecisionResolver<'a>,
}

/// A sibling's standing at the start of a round.
struct Contender {
    idx: Index,
    id: String,
    vote_count: u64,
    mandates: u64,
    quotient: Rational,
}

impl Contender {
    /// Orders by distribution number, then remainder, then votes.
    fn compare(&self, other: &Self) -> (Ordering, WinnerReason) {
        let by_number = distribution_number(&self.quotient).cmp(&distribution_number(&other.quotient));
        if by_number != Ordering::Equal {
            return (by_number, WinnerReason::Quotient);
        }
        let by_remainder = quotient_remainder(&self.quotient).cmp(&quotient_remainder(&other.quotient));
        if by_remainder != Ordering::Equal {
            return (by_remainder, WinnerReason::QuotientRemainder);
        }
        (self.vote_count.cmp(&other.vote_count), WinnerReason::VoteCount)
    }
}

impl Run<'_> {
    /// Distributes the `seats` held by `parent` among its children, then
    /// recurses into every union that won seats. Returns the blocking tie.
    fn distribute(&mut self, parent: Index, seats: u64) -> DomainResult<Option<TieGroup>> {
        let children = self.tree.children(parent).to_vec();
        if children.is_empty() || seats == 0 {
            return Ok(None);
        }
        let parent_data = self.tree.data(parent)?.clone();
        trace!("distributing {} seat(s) of {}", seats, parent_data.id);

        // first distribution share, used as lower bound
        let parent_number = distribution_number(&quotient(parent_data.vote_count, seats));
        for &child in &children {
            let data = self.tree.data_mut(child)?;
            data.initial_mandates = to_u64(&(BigInt::from(data.vote_count) / &parent_number));
        }

        for awarded in 0..seats {
            if let Some(tie) = self.round(&parent_data.id, &children, seats - awarded)? {
                return Ok(Some(tie));
            }
        }

        for &child in &children {
            let data = self.tree.data(child)?;
            if data.kind.is_leaf() || data.current_mandates == 0 {
                continue;
            }
            let won = data.current_mandates;
            if let Some(tie) = self.distribute(child, won)? {
                return Ok(Some(tie));
            }
        }
        Ok(None)
    }

    /// Awards one of the `remaining` seats among `siblings` and records the round.
    fn round(&mut self, group_id: &str, siblings: &[Index], remaining: u64) -> DomainResult<Option<TieGroup>> {
        let index = self.rounds.len();
        let contenders = siblings
            .iter()
            .map(|&idx| -> DomainResult<Contender> {
                let data = self.tree.data(idx)?;
                Ok(Contender {
                    idx,
                    id: data.id.clone(),
                    vote_count: data.vote_count,
                    mandates: data.current_mandates,
                    quotient: quotient(data.vote_count, data.current_mandates),
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let (winner, reason) = match self.pick(group_id, index, &contenders, remaining)? {
            Pick::Winner(i, reason) => (i, reason),
            Pick::Open(tie) => return Ok(Some(tie)),
        };

        let winner_idx = contenders[winner].idx;
        self.tree.data_mut(winner_idx)?.current_mandates += 1;

        let values = contenders
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mandates = if i == winner { c.mandates + 1 } else { c.mandates };
                GroupValues {
                    group_id: c.id.clone(),
                    previous_quotient: c.quotient.clone(),
                    next_quotient: quotient(c.vote_count, mandates),
                    number_of_mandates: mandates,
                    previous_number_of_mandates: c.mandates,
                    is_winner: i == winner,
                }
            })
            .collect();

        trace!("round {}: {} wins in {} by {:?}", index, contenders[winner].id, group_id, reason);
        self.rounds.push(CalculationRound {
            index,
            group_id: group_id.to_string(),
            winner_id: contenders[winner].id.clone(),
            winner_reason: reason,
            values,
        });
        Ok(None)
    }

    /// Applies the tie-break tiers. A full tie goes to the lot decisions only
    /// when more groups are tied than seats remain.
    fn pick(&self, group_id: &str, index: usize, contenders: &[Contender], remaining: u64) -> DomainResult<Pick> {
        let mut best = vec![0usize];
        let mut reason = WinnerReason::Quotient;
        for i in 1..contenders.len() {
            let (ordering, tier) = contenders[i].compare(&contenders[best[0]]);
            match ordering {
                Ordering::Greater => {
                    best = vec![i];
                    reason = tier;
                }
                Ordering::Equal => best.push(i),
                Ordering::Less => {
                    // the decisive tier is the deepest one needed against any rival
                    if tier_depth(tier) > tier_depth(reason) {
                        reason = tier;
                    }
                }
            }
        }

        if let [single] = best[..] {
            return Ok(Pick::Winner(single, reason));
        }
        // the tied groups keep the highest quotient until each has won a seat
        if best.len() as u64 <= remaining {
            trace!("{} tied group(s) fit into {} remaining seat(s)", best.len(), remaining);
            return Ok(Pick::Winner(best[0], WinnerReason::SeatForEveryTied));
        }

        let tie = TieGroup {
            id: TieId::hagenbach_bischoff(group_id, index),
            phase: TiePhase::HagenbachBischoff,
            candidates: best.iter().map(|&i| contenders[i].id.clone()).collect(),
            seats: 1,
        };
        match self.resolver.resolve(&tie)? {
            Resolution::Pinned(winners) => {
                let winner = best
                    .iter()
                    .copied()
                    .find(|&i| winners.iter().any(|w| *w == contenders[i].id))
                    .ok_or_else(|| DomainError::InvalidLotDecision {
                        tie: tie.id.to_string(),
                        message: "no winner among the tied groups".to_string(),
                    })?;
                Ok(Pick::Winner(winner, WinnerReason::LotDecision))
            }
            Resolution::Open(reason) => {
                debug!("round {} in {} stays tied: {}", index, group_id, reason);
                Ok(Pick::Open(tie))
            }
        }
    }
}

enum Pick {
    Winner(usize, WinnerReason),
    Open(TieGroup),
}

fn tier_depth(reason: WinnerReason) -> u8 {
    match reason {
        WinnerReason::Quotient => 0,
        WinnerReason::QuotientRemainder => 1,
        WinnerReason::VoteCount => 2,
        WinnerReason::SeatForEveryTied => 3,
        WinnerReason::LotDecision => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListInput, ListUnionInput, LotDecision};
    use rstest::rstest;

    fn election(seats: i64, votes: &[(&str, i64)]) -> ProportionalElectionInput {
        ProportionalElectionInput {
            id: "e".into(),
            number_of_mandates: seats,
            lists: votes
                .iter()
                .enumerate()
                .map(|(i, (id, v))| ListInput {
                    id: id.to_string(),
                    position: i as u32 + 1,
                    vote_count: *v,
                })
                .collect(),
            list_unions: vec![],
            lot_decisions: vec![],
        }
    }

    #[test]
    fn given_three_lists_two_seats_when_apportioning_then_a_then_b() {
        // Arrange
        let input = election(2, &[("A", 100), ("B", 60), ("C", 40)]);

        // Act
        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        // Assert
        assert_eq!(result.state, ApportionmentState::Completed);
        let winners: Vec<_> = result.rounds.iter().map(|r| r.winner_id.as_str()).collect();
        assert_eq!(winners, vec!["A", "B"]);
        assert_eq!(result.mandates_of("A"), Some(1));
        assert_eq!(result.mandates_of("B"), Some(1));
        assert_eq!(result.mandates_of("C"), Some(0));
        assert_eq!(result.rounds[0].winner_reason, WinnerReason::Quotient);
    }

    #[test]
    fn given_round_when_recorded_then_values_hold_pre_and_post_round_state() {
        let input = election(2, &[("A", 100), ("B", 60), ("C", 40)]);
        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        let second = &result.rounds[1];
        assert_eq!(second.index, 1);
        assert_eq!(second.values.iter().filter(|v| v.is_winner).count(), 1);
        let a = &second.values[0];
        assert_eq!(a.previous_quotient, crate::domain::quotient::from_u64(50));
        assert_eq!(a.previous_number_of_mandates, 1);
        let b = second.winner_values().unwrap();
        assert_eq!(b.group_id, "B");
        assert_eq!(b.next_quotient, crate::domain::quotient::from_u64(30));
    }

    #[test]
    fn given_equal_lists_one_seat_when_apportioning_then_open_lot_decision() {
        let input = election(1, &[("A", 50), ("B", 50)]);
        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        assert_eq!(result.state, ApportionmentState::HasOpenLotDecision);
        let tie = result.pending.unwrap();
        assert_eq!(tie.id.as_str(), "hb:e:0");
        assert_eq!(tie.candidates, vec!["A", "B"]);
        assert!(result.rounds.is_empty());
    }

    #[test]
    fn given_tie_fitting_remaining_seats_when_apportioning_then_no_lot_decision() {
        // Arrange
        let input = election(2, &[("A", 50), ("B", 50), ("C", 10)]);

        // Act
        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        // Assert
        assert_eq!(result.state, ApportionmentState::Completed);
        assert!(result.pending.is_none());
        assert_eq!(result.mandates_of("A"), Some(1));
        assert_eq!(result.mandates_of("B"), Some(1));
        assert_eq!(result.mandates_of("C"), Some(0));
        let winners: Vec<_> = result.rounds.iter().map(|r| r.winner_id.as_str()).collect();
        assert_eq!(winners, vec!["A", "B"]);
        assert_eq!(result.rounds[0].winner_reason, WinnerReason::SeatForEveryTied);
    }

    #[test]
    fn given_more_tied_than_remaining_seats_when_apportioning_then_lot_decision_required() {
        let result = HagenbachBischoffApportioner::new()
            .apportion(&election(2, &[("A", 40), ("B", 40), ("C", 40)]))
            .unwrap();

        assert_eq!(result.state, ApportionmentState::HasOpenLotDecision);
        assert_eq!(result.pending.unwrap().candidates, vec!["A", "B", "C"]);
        assert!(result.rounds.is_empty());
    }

    #[test]
    fn given_lot_decision_when_apportioning_then_pinned_winner_seated() {
        let mut input = election(1, &[("A", 50), ("B", 50)]);
        let tie = HagenbachBischoffApportioner::new()
            .apportion(&input)
            .unwrap()
            .pending
            .unwrap();
        input.lot_decisions.push(LotDecision::for_tie(&tie, &["A"]).unwrap());

        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        assert_eq!(result.state, ApportionmentState::Completed);
        assert_eq!(result.mandates_of("A"), Some(1));
        assert_eq!(result.mandates_of("B"), Some(0));
        assert_eq!(result.rounds[0].winner_reason, WinnerReason::LotDecision);
    }

    #[rstest]
    // equal quotient 50, B has more votes
    #[case(&[("A", 50), ("B", 100)], 2, WinnerReason::VoteCount)]
    // 100 / 1 vs 99 / 1: distribution numbers 101 and 100
    #[case(&[("A", 100), ("B", 99)], 1, WinnerReason::Quotient)]
    fn given_close_quotients_when_apportioning_then_tier_recorded(
        #[case] votes: &[(&str, i64)],
        #[case] seats: i64,
        #[case] expected: WinnerReason,
    ) {
        let result = HagenbachBischoffApportioner::new()
            .apportion(&election(seats, votes))
            .unwrap();
        assert_eq!(result.rounds.last().unwrap().winner_reason, expected);
    }

    #[test]
    fn given_remainder_decides_when_apportioning_then_quotient_remainder_reason() {
        // after one seat A competes with 301/2 = 150.5, B with 150: same distribution number 151
        let result = HagenbachBischoffApportioner::new()
            .apportion(&election(2, &[("A", 301), ("B", 150)]))
            .unwrap();
        let second = &result.rounds[1];
        assert_eq!(second.winner_id, "A");
        assert_eq!(second.winner_reason, WinnerReason::QuotientRemainder);
    }

    #[test]
    fn given_union_when_apportioning_then_union_seats_redistributed_to_members() {
        let mut input = election(4, &[("A", 100), ("B", 60), ("C", 45)]);
        input.list_unions.push(ListUnionInput {
            id: "U".into(),
            position: 1,
            list_ids: vec!["B".into(), "C".into()],
            sub_list_unions: vec![],
        });

        let result = HagenbachBischoffApportioner::new().apportion(&input).unwrap();

        assert_eq!(result.state, ApportionmentState::Completed);
        // root: U 105 vs A 100 -> U, A, U, A
        assert_eq!(result.mandates_of("U"), Some(2));
        assert_eq!(result.mandates_of("A"), Some(2));
        assert_eq!(result.mandates_of("B"), Some(1));
        assert_eq!(result.mandates_of("C"), Some(1));
        assert_eq!(result.rounds.len(), 6);
        assert!(result.rounds[4..].iter().all(|r| r.group_id == "U"));
        let total: u64 = result.list_mandates().iter().map(|(_, m)| m).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn given_zero_vote_list_when_apportioning_then_never_wins() {
        let result = HagenbachBischoffApportioner::new()
            .apportion(&election(3, &[("A", 10), ("B", 0)]))
            .unwrap();
        assert_eq!(result.mandates_of("B"), Some(0));
        assert_eq!(result.mandates_of("A"), Some(3));
    }
}
