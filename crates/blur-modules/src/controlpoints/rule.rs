//! Capture rules: which team (if any) is capturing, given who is on the
//! point.
//!
//! Rules only look at per-team head counts of players standing in the
//! capture extent. Teamless players never capture and never decide a rule,
//! but they still dilute the capturing team in [`effective_players`].

use std::collections::BTreeMap;

use blur_types::{CaptureRule, TeamId};

/// Outcome of a capture rule for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captor {
    /// This team is capturing.
    Team(TeamId),
    /// Several teams contest an exclusive point. Progress is frozen.
    Halted,
    /// Nobody is capturing.
    Nobody,
}

impl Captor {
    /// The capturing team, if any.
    pub const fn team(&self) -> Option<&TeamId> {
        match self {
            Self::Team(team) => Some(team),
            Self::Halted | Self::Nobody => None,
        }
    }
}

/// Evaluate `rule` over the team head counts on a point.
pub fn capturing_team(rule: CaptureRule, counts: &BTreeMap<TeamId, usize>) -> Captor {
    let mut present = counts.iter().filter(|(_, n)| **n > 0);
    match rule {
        CaptureRule::Exclusive => {
            let Some((team, _)) = present.next() else {
                return Captor::Nobody;
            };
            if present.next().is_some() {
                return Captor::Halted;
            }
            Captor::Team(team.clone())
        }
        CaptureRule::Majority => {
            let total: usize = counts.values().sum();
            present
                .find(|(_, n)| **n > total.saturating_sub(**n))
                .map_or(Captor::Nobody, |(team, _)| Captor::Team(team.clone()))
        }
        CaptureRule::Lead => {
            let Some(max) = counts.values().copied().max().filter(|m| *m > 0) else {
                return Captor::Nobody;
            };
            let mut leaders = present.filter(|(_, n)| **n == max);
            match (leaders.next(), leaders.next()) {
                (Some((team, _)), None) => Captor::Team(team.clone()),
                _ => Captor::Nobody,
            }
        }
    }
}

/// Players that actually make a difference: the capturing team's count
/// minus everybody else on the point (teamless players included), at
/// least one.
///
/// `on_point` is the number of players standing on the point. It is never
/// taken to be below the sum of `counts`.
pub fn effective_players(
    team: &TeamId,
    counts: &BTreeMap<TeamId, usize>,
    on_point: usize,
) -> usize {
    let own = counts.get(team).copied().unwrap_or(0);
    let total = on_point.max(counts.values().sum());
    let others = total.saturating_sub(own);
    own.saturating_sub(others).max(1)
}
