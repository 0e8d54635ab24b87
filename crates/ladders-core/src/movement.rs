//! Movement planning.
//!
//! Converts one authoritative position change into the ordered display steps
//! a client animates: one `Advance` per cell crossed, then a
//! `TransportStart` / jump / `TransportEnd` triple when the landing cell is a
//! ladder or snake. Planning is pure; delivery and cancellation live in the
//! server's playback layer.

use crate::board::{Board, Position, START_POSITION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a display step represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Token shown on the next cell
    Advance,
    /// Token starts riding a ladder or snake
    TransportStart,
    /// Token has arrived at the transport's destination
    TransportEnd,
}

/// A single display sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub display_position: Position,
    pub kind: StepKind,
}

impl Step {
    pub fn advance(display_position: Position) -> Self {
        Self {
            display_position,
            kind: StepKind::Advance,
        }
    }
}

/// Ordered, finite steps for one move. Iterating always starts from the first step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPlan {
    steps: Vec<Step>,
}

impl MovementPlan {
    /// A plan with nothing to animate
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Where the token is displayed after the last step
    pub fn final_position(&self) -> Option<Position> {
        self.steps.last().map(|s| s.display_position)
    }

    /// Number of cell-by-cell steps before any transport
    pub fn walk_len(&self) -> usize {
        self.steps
            .iter()
            .take_while(|s| s.kind == StepKind::Advance)
            .count()
    }

    pub fn has_transport(&self) -> bool {
        self.steps.iter().any(|s| s.kind == StepKind::TransportStart)
    }
}

impl<'a> IntoIterator for &'a MovementPlan {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Plan the display steps for a token going from `from` to the landed cell `to`.
///
/// Empty when nothing moved or when either end is off the board.
pub fn plan(from: Position, to: Position, board: &Board) -> MovementPlan {
    if from == to || from == START_POSITION || to == START_POSITION {
        return MovementPlan::empty();
    }

    let mut steps: Vec<Step> = if to > from {
        (from + 1..=to).map(Step::advance).collect()
    } else {
        (to..from).rev().map(Step::advance).collect()
    };

    if let Some(destination) = board.transport_at(to) {
        steps.push(Step {
            display_position: to,
            kind: StepKind::TransportStart,
        });
        steps.push(Step::advance(destination));
        steps.push(Step {
            display_position: destination,
            kind: StepKind::TransportEnd,
        });
    }

    MovementPlan { steps }
}

/// Recommended delivery pacing for plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Target time for the whole cell-by-cell walk
    pub max_traversal: Duration,
    pub min_step: Duration,
    pub max_step: Duration,
    /// Pause while a ladder or snake is ridden
    pub transport_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            max_traversal: Duration::from_millis(2_000),
            min_step: Duration::from_millis(50),
            max_step: Duration::from_millis(200),
            transport_pause: Duration::from_millis(600),
        }
    }
}

impl Pacing {
    /// Delay between walk steps for a walk of `walk_len` cells
    pub fn step_delay(&self, walk_len: usize) -> Duration {
        if walk_len == 0 {
            return self.max_step;
        }
        let even = self.max_traversal / walk_len as u32;
        even.clamp(self.min_step, self.max_step)
    }

    /// Delay to wait after emitting `step` from `plan`
    pub fn delay_after(&self, step: &Step, plan: &MovementPlan) -> Duration {
        match step.kind {
            StepKind::TransportStart => self.transport_pause,
            StepKind::Advance | StepKind::TransportEnd => self.step_delay(plan.walk_len()),
        }
    }

    /// Total delivery time of a plan
    pub fn total(&self, plan: &MovementPlan) -> Duration {
        plan.iter().map(|s| self.delay_after(s, plan)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardDefinition, TransportDefinition};
    use pretty_assertions::assert_eq;

    fn board_with(transports: &[(Position, Position)]) -> Board {
        Board::from_definition(&BoardDefinition {
            size: 100,
            transports: transports
                .iter()
                .map(|&(from, to)| TransportDefinition { from, to })
                .collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_no_movement_gives_empty_plan() {
        let board = Board::standard();
        assert!(plan(5, 5, &board).is_empty());
        assert!(plan(2, 2, &board).is_empty());
    }

    #[test]
    fn test_off_board_gives_empty_plan() {
        let board = Board::standard();
        assert!(plan(0, 3, &board).is_empty());
        assert!(plan(4, 0, &board).is_empty());
    }

    #[test]
    fn test_forward_walk_is_inclusive_of_destination() {
        let board = Board::standard();
        let positions: Vec<Position> = plan(4, 7, &board)
            .iter()
            .map(|s| s.display_position)
            .collect();
        assert_eq!(positions, vec![5, 6, 7]);
        assert!(plan(4, 7, &board)
            .iter()
            .all(|s| s.kind == StepKind::Advance));
    }

    #[test]
    fn test_backward_walk() {
        let board = Board::standard();
        let positions: Vec<Position> = plan(10, 7, &board)
            .iter()
            .map(|s| s.display_position)
            .collect();
        assert_eq!(positions, vec![9, 8, 7]);
    }

    #[test]
    fn test_snake_landing_ends_at_destination() {
        let board = board_with(&[(14, 2)]);
        let plan = plan(11, 14, &board);

        assert_eq!(
            plan.steps(),
            &[
                Step::advance(12),
                Step::advance(13),
                Step::advance(14),
                Step {
                    display_position: 14,
                    kind: StepKind::TransportStart
                },
                Step::advance(2),
                Step {
                    display_position: 2,
                    kind: StepKind::TransportEnd
                },
            ]
        );
        assert_eq!(plan.final_position(), Some(2));
        assert_eq!(plan.walk_len(), 3);
        assert!(plan.has_transport());
    }

    #[test]
    fn test_ladder_landing() {
        let board = Board::standard();
        let plan = plan(1, 14, &board);
        assert_eq!(plan.len(), 13 + 3);
        assert_eq!(plan.final_position(), Some(30));
    }

    #[test]
    fn test_plan_is_restartable() {
        let board = Board::standard();
        let plan = plan(20, 24, &board);
        let first: Vec<_> = plan.iter().copied().collect();
        let second: Vec<_> = (&plan).into_iter().copied().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_step_delay_clamped() {
        let pacing = Pacing::default();
        assert_eq!(pacing.step_delay(1), Duration::from_millis(200));
        assert_eq!(pacing.step_delay(20), Duration::from_millis(100));
        assert_eq!(pacing.step_delay(99), Duration::from_millis(50));
    }

    #[test]
    fn test_transport_pause_applies_after_start() {
        let board = Board::standard();
        let pacing = Pacing::default();
        let plan = plan(10, 14, &board);

        let delays: Vec<Duration> = plan.iter().map(|s| pacing.delay_after(s, &plan)).collect();
        assert_eq!(delays[3], Duration::from_millis(200));
        assert_eq!(delays[4], Duration::from_millis(600));
        assert_eq!(delays[0], Duration::from_millis(200));
        assert_eq!(
            pacing.total(&plan),
            Duration::from_millis(200 * 6 + 600)
        );
    }
}
