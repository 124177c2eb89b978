//! Adapters that drive the greedy policies from an `axon` sequence model.
//!
//! Both adapters feed the marked board state to the collaborator as a
//! flattened token sequence and read scores off the last position's logit
//! vector: the cell adapter exposes the whole vector (one scalar per grid
//! cell), the direction adapter its first four entries (up, down, left,
//! right).

use axon::model::SequenceModel;

use crate::solver::{CellScorer, DirectionScorer, SolveError};

/// Cell-indexed scoring through a model whose vocabulary is the cell space.
pub struct ModelCellScorer<'a, M: SequenceModel> {
    model: &'a M,
}

impl<'a, M: SequenceModel> ModelCellScorer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }
}

impl<M: SequenceModel> CellScorer for ModelCellScorer<'_, M> {
    fn score_cells(&mut self, tokens: &[u32]) -> Result<Vec<f32>, SolveError> {
        let pass = self.model.forward(tokens);
        let rows = pass.logits.rows();
        if rows == 0 {
            return Err(SolveError::Scorer {
                detail: "model produced no logit rows".to_string(),
            });
        }
        Ok(pass.logits.row(rows - 1).to_vec())
    }
}

/// Direction-indexed scoring through a model with a four-way logit head.
pub struct ModelDirectionScorer<'a, M: SequenceModel> {
    model: &'a M,
}

impl<'a, M: SequenceModel> ModelDirectionScorer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }
}

impl<M: SequenceModel> DirectionScorer for ModelDirectionScorer<'_, M> {
    fn score_directions(&mut self, tokens: &[u32]) -> Result<[f32; 4], SolveError> {
        let pass = self.model.forward(tokens);
        let rows = pass.logits.rows();
        if rows == 0 {
            return Err(SolveError::Scorer {
                detail: "model produced no logit rows".to_string(),
            });
        }
        let last = pass.logits.row(rows - 1);
        if last.len() < 4 {
            return Err(SolveError::Scorer {
                detail: format!("direction head has {} logits, expected 4", last.len()),
            });
        }
        Ok([last[0], last[1], last[2], last[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::solver::{solve_greedy_cells, solve_greedy_directions, GreedyConfig};
    use axon::model::{ModelConfig, SyntheticModel};

    fn open_board() -> Board {
        Board::from_rows(&[
            vec![2, 0, 0],
            vec![0, 0, 0],
            vec![0, 0, 3],
        ])
        .unwrap()
    }

    #[test]
    fn cell_adapter_solves_with_a_synthetic_model() {
        let board = open_board();
        let model = SyntheticModel::new(ModelConfig::with_shape(board.len(), 16, 2), 9);
        let mut scorer = ModelCellScorer::new(&model);
        let report = solve_greedy_cells(&board, &mut scorer, &GreedyConfig::default()).unwrap();
        // On an open board the Manhattan-dominant ranking still converges no
        // matter what the untrained logits say.
        assert!(report.outcome.is_solved());
    }

    #[test]
    fn direction_adapter_walks_with_a_four_way_head() {
        let board = open_board();
        let model = SyntheticModel::new(ModelConfig::with_shape(4, 16, 2), 9);
        let mut scorer = ModelDirectionScorer::new(&model);
        let report =
            solve_greedy_directions(&board, &mut scorer, &GreedyConfig::default()).unwrap();
        // Direction preferences are arbitrary for an untrained model; the
        // attempt must still terminate cleanly one way or the other.
        assert!(report.steps <= GreedyConfig::default().max_steps);
    }

    #[test]
    fn direction_adapter_rejects_narrow_heads() {
        let board = open_board();
        let model = SyntheticModel::new(ModelConfig::with_shape(2, 16, 2), 9);
        let mut scorer = ModelDirectionScorer::new(&model);
        let err =
            solve_greedy_directions(&board, &mut scorer, &GreedyConfig::default()).unwrap_err();
        assert!(matches!(err, SolveError::Scorer { .. }));
    }
}
