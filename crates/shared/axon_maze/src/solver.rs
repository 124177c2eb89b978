use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardError, Coord, Direction};

use core::fmt;

/// How a solve attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveOutcome {
    /// The end cell was reached; `path` holds the route.
    ReachedEnd,
    /// Breadth-first search exhausted its frontier: no route exists.
    Unreachable,
    /// A greedy policy hit a cell with no legal unvisited neighbor. The
    /// policies never backtrack, so this can happen on solvable boards.
    DeadEnd,
    /// A greedy policy ran out of its step budget before reaching the end.
    StepBudgetExhausted,
}

impl SolveOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SolveOutcome::ReachedEnd => "reached_end",
            SolveOutcome::Unreachable => "unreachable",
            SolveOutcome::DeadEnd => "dead_end",
            SolveOutcome::StepBudgetExhausted => "step_budget_exhausted",
        }
    }

    #[must_use]
    pub fn is_solved(self) -> bool {
        matches!(self, SolveOutcome::ReachedEnd)
    }
}

/// Result of one solve attempt.
///
/// "No path" outcomes are reports, not errors; only malformed input or a
/// misbehaving scorer surfaces as [`SolveError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    /// Start-to-end route when solved, absent otherwise.
    pub path: Option<Vec<Coord>>,
    /// Moves taken by a greedy walk, or cells expanded by breadth-first
    /// search. Lets a caller tell budget exhaustion apart from a dead end
    /// without inspecting the outcome.
    pub steps: u32,
    /// Distinct cells visited during the attempt.
    pub visited: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The board failed validation (missing markers, ragged rows, ...).
    Board(BoardError),
    /// The scoring collaborator returned the wrong shape.
    Scorer { detail: String },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Board(e) => write!(f, "invalid board: {e}"),
            SolveError::Scorer { detail } => write!(f, "scorer error: {detail}"),
        }
    }
}

impl From<BoardError> for SolveError {
    fn from(e: BoardError) -> Self {
        SolveError::Board(e)
    }
}

impl std::error::Error for SolveError {}

/// Per-cell scores for a marked board state, flat row-major — one scalar per
/// grid cell from the collaborator's output distribution.
pub trait CellScorer {
    fn score_cells(&mut self, tokens: &[u32]) -> Result<Vec<f32>, SolveError>;
}

impl<F> CellScorer for F
where
    F: FnMut(&[u32]) -> Vec<f32>,
{
    fn score_cells(&mut self, tokens: &[u32]) -> Result<Vec<f32>, SolveError> {
        Ok(self(tokens))
    }
}

/// One score per cardinal direction for a marked board state, indexed per
/// [`Direction::ALL`] (up, down, left, right).
pub trait DirectionScorer {
    fn score_directions(&mut self, tokens: &[u32]) -> Result<[f32; 4], SolveError>;
}

impl<F> DirectionScorer for F
where
    F: FnMut(&[u32]) -> [f32; 4],
{
    fn score_directions(&mut self, tokens: &[u32]) -> Result<[f32; 4], SolveError> {
        Ok(self(tokens))
    }
}

/// Bounds for the greedy policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreedyConfig {
    /// Hard cap on moves per attempt.
    pub max_steps: u32,
    /// Weight of the model score against the (dominant) Manhattan term when
    /// ranking candidate cells.
    pub score_weight: f32,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            score_weight: 0.1,
        }
    }
}

// Mutable state of one greedy walk. Created at solve start, discarded at
// solve end; cells visited once stay excluded for the whole attempt.
struct SolverState {
    current: Coord,
    visited: Vec<bool>,
    path: Vec<Coord>,
    steps: u32,
}

impl SolverState {
    fn new(board: &Board, start: Coord) -> Self {
        let mut visited = vec![false; board.len()];
        visited[board.cell_index(start)] = true;
        Self {
            current: start,
            visited,
            path: vec![start],
            steps: 0,
        }
    }

    fn is_visited(&self, board: &Board, c: Coord) -> bool {
        self.visited[board.cell_index(c)]
    }

    fn advance(&mut self, board: &Board, next: Coord) {
        self.visited[board.cell_index(next)] = true;
        self.path.push(next);
        self.steps += 1;
        self.current = next;
    }

    fn visited_count(&self) -> usize {
        self.visited.iter().filter(|&&v| v).count()
    }

    fn report(self, outcome: SolveOutcome) -> SolveReport {
        let visited = self.visited_count();
        let solved = outcome.is_solved();
        SolveReport {
            outcome,
            path: solved.then_some(self.path),
            steps: self.steps,
            visited,
        }
    }
}

// A move is legal iff the cell is in-bounds, not a wall, and not yet visited
// in this attempt.
fn legal_step(board: &Board, state: &SolverState, dir: Direction) -> Option<Coord> {
    let next = board.step(state.current, dir)?;
    if board.is_wall(next) || state.is_visited(board, next) {
        return None;
    }
    Some(next)
}

/// Exact breadth-first policy.
///
/// FIFO frontier seeded with the start cell; neighbors are enqueued at most
/// once. BFS explores in non-decreasing path length, so the first time the
/// end cell is dequeued its accumulated path is a shortest path by edge
/// count. Frontier exhaustion is the normal "unreachable" outcome.
pub fn solve_bfs(board: &Board) -> Result<SolveReport, SolveError> {
    let (start, end) = board.markers()?;

    let mut visited = vec![false; board.len()];
    visited[board.cell_index(start)] = true;
    let mut frontier: VecDeque<(Coord, Vec<Coord>)> = VecDeque::new();
    frontier.push_back((start, vec![start]));

    let mut expanded = 0u32;
    while let Some((current, path)) = frontier.pop_front() {
        expanded += 1;
        if current == end {
            let visited_count = visited.iter().filter(|&&v| v).count();
            return Ok(SolveReport {
                outcome: SolveOutcome::ReachedEnd,
                path: Some(path),
                steps: expanded,
                visited: visited_count,
            });
        }
        for dir in Direction::ALL {
            let Some(next) = board.step(current, dir) else {
                continue;
            };
            if board.is_wall(next) || visited[board.cell_index(next)] {
                continue;
            }
            visited[board.cell_index(next)] = true;
            let mut longer = path.clone();
            longer.push(next);
            frontier.push_back((next, longer));
        }
    }

    let visited_count = visited.iter().filter(|&&v| v).count();
    Ok(SolveReport {
        outcome: SolveOutcome::Unreachable,
        path: None,
        steps: expanded,
        visited: visited_count,
    })
}

/// Greedy cell-scored policy.
///
/// Each step enumerates the legal neighbor cells; every candidate is scored
/// by one collaborator call on the board with that candidate marked as the
/// current position, and candidates are ranked by
/// `score_weight * model_score - manhattan(candidate, end)` — the Manhattan
/// term dominates, the model score refines ties. No backtracking: a cell
/// with no legal unvisited neighbor is a dead end.
pub fn solve_greedy_cells<S: CellScorer>(
    board: &Board,
    scorer: &mut S,
    cfg: &GreedyConfig,
) -> Result<SolveReport, SolveError> {
    let (start, end) = board.markers()?;
    let mut state = SolverState::new(board, start);

    for _ in 0..cfg.max_steps {
        if state.current == end {
            return Ok(state.report(SolveOutcome::ReachedEnd));
        }

        let mut best: Option<(Coord, f32)> = None;
        for dir in Direction::ALL {
            let Some(next) = legal_step(board, &state, dir) else {
                continue;
            };
            let tokens = board.tokens_with_cursor(next);
            let scores = scorer.score_cells(&tokens)?;
            let idx = board.cell_index(next);
            let Some(&model_score) = scores.get(idx) else {
                return Err(SolveError::Scorer {
                    detail: format!(
                        "cell scorer returned {} scores for a {}-cell board",
                        scores.len(),
                        board.len()
                    ),
                });
            };
            let rank = cfg.score_weight * model_score - next.manhattan(end) as f32;
            // Strictly-greater comparison: ties keep the earliest direction
            // in Direction::ALL order.
            if best.map_or(true, |(_, r)| rank > r) {
                best = Some((next, rank));
            }
        }

        let Some((next, _)) = best else {
            return Ok(state.report(SolveOutcome::DeadEnd));
        };
        state.advance(board, next);
    }

    if state.current == end {
        Ok(state.report(SolveOutcome::ReachedEnd))
    } else {
        Ok(state.report(SolveOutcome::StepBudgetExhausted))
    }
}

/// Greedy direction-scored policy.
///
/// One collaborator call per step on the board with the actual current
/// position marked; the four direction scores are tried in descending order
/// (ties keep the up/down/left/right index order) and the first legal cell
/// is taken. Termination mirrors the cell-scored policy.
pub fn solve_greedy_directions<S: DirectionScorer>(
    board: &Board,
    scorer: &mut S,
    cfg: &GreedyConfig,
) -> Result<SolveReport, SolveError> {
    let (start, end) = board.markers()?;
    let mut state = SolverState::new(board, start);

    for _ in 0..cfg.max_steps {
        if state.current == end {
            return Ok(state.report(SolveOutcome::ReachedEnd));
        }

        let tokens = board.tokens_with_cursor(state.current);
        let scores = scorer.score_directions(&tokens)?;

        let mut order = Direction::ALL;
        // Stable sort: equal scores fall back to the fixed index order.
        order.sort_by(|a, b| scores[b.index()].total_cmp(&scores[a.index()]));

        let next = order
            .iter()
            .find_map(|&dir| legal_step(board, &state, dir));
        let Some(next) = next else {
            return Ok(state.report(SolveOutcome::DeadEnd));
        };
        state.advance(board, next);
    }

    if state.current == end {
        Ok(state.report(SolveOutcome::ReachedEnd))
    } else {
        Ok(state.report(SolveOutcome::StepBudgetExhausted))
    }
}
