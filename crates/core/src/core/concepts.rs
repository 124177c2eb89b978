// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
use std::collections::BTreeMap;

#[cfg(not(feature = "std"))]
use alloc::{collections::BTreeMap, vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tensor::{Matrix, ShapeError};

/// A neuron whose activation, averaged over every occurrence of a symbol,
/// exceeded the caller's threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConceptNeuron {
    pub neuron_id: u32,
    pub avg_activation: f32,
}

/// For each vocabulary symbol present in `tokens`, average the activation at
/// that symbol's positions across all layers and occurrences, and keep the
/// neurons whose average is strictly above `threshold`.
///
/// Symbols with no occurrences are absent from the output, not zero-valued.
/// Keys iterate in ascending symbol order; neuron lists are ordered by id.
pub fn concept_neurons(
    activations: &[Matrix],
    tokens: &[u32],
    vocab_size: u32,
    threshold: f32,
) -> Result<BTreeMap<u32, Vec<ConceptNeuron>>, ShapeError> {
    let first = activations.first().ok_or(ShapeError::EmptyStack)?;
    let (positions, neurons) = (first.rows(), first.cols());
    for (i, layer) in activations.iter().enumerate().skip(1) {
        if (layer.rows(), layer.cols()) != (positions, neurons) {
            return Err(ShapeError::LayerShape {
                layer: i,
                expected: (positions, neurons),
                got: (layer.rows(), layer.cols()),
            });
        }
    }
    if tokens.len() != positions {
        return Err(ShapeError::TokenCount {
            expected: positions,
            got: tokens.len(),
        });
    }

    let mut out = BTreeMap::new();
    let mut averaged = Vec::with_capacity(neurons);
    for symbol in 0..vocab_size {
        let occurrences: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == symbol)
            .map(|(pos, _)| pos)
            .collect();
        if occurrences.is_empty() {
            continue;
        }

        averaged.clear();
        averaged.resize(neurons, 0.0f32);
        for layer in activations {
            for &pos in &occurrences {
                for (n, &v) in layer.row(pos).iter().enumerate() {
                    averaged[n] += v;
                }
            }
        }
        let inv = 1.0 / (activations.len() * occurrences.len()) as f32;

        let selected: Vec<ConceptNeuron> = averaged
            .iter()
            .enumerate()
            .filter_map(|(n, &sum)| {
                let avg = sum * inv;
                (avg > threshold).then_some(ConceptNeuron {
                    neuron_id: n as u32,
                    avg_activation: avg,
                })
            })
            .collect();

        out.insert(symbol, selected);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_symbols_are_skipped_entirely() {
        let layers = vec![Matrix::from_fn(3, 2, |_, _| 1.0)];
        let map = concept_neurons(&layers, &[0, 0, 2], 4, 0.5).unwrap();
        assert!(map.contains_key(&0));
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));
        assert!(!map.contains_key(&3));
    }

    #[test]
    fn averages_span_layers_and_occurrences() {
        // Symbol 1 occurs at positions 0 and 2. Neuron 0 fires with 1.0 at
        // position 0 in layer 0 only: average = 1.0 / (2 layers * 2 occ).
        let a = Matrix::from_fn(3, 2, |r, c| if r == 0 && c == 0 { 1.0 } else { 0.0 });
        let b = Matrix::zeros(3, 2);
        let map = concept_neurons(&[a, b], &[1, 0, 1], 2, 0.2).unwrap();
        let hits = &map[&1];
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].neuron_id, 0);
        assert!((hits[0].avg_activation - 0.25).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_strict() {
        let layers = vec![Matrix::from_fn(1, 2, |_, c| if c == 0 { 0.5 } else { 0.6 })];
        let map = concept_neurons(&layers, &[0], 1, 0.5).unwrap();
        let hits = &map[&0];
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].neuron_id, 1);
    }

    #[test]
    fn neuron_lists_are_ordered_by_id() {
        let layers = vec![Matrix::from_fn(1, 5, |_, _| 1.0)];
        let map = concept_neurons(&layers, &[0], 1, 0.0).unwrap();
        let ids: Vec<u32> = map[&0].iter().map(|n| n.neuron_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn token_length_mismatch_is_an_error() {
        let layers = vec![Matrix::zeros(3, 2)];
        let err = concept_neurons(&layers, &[0, 1], 2, 0.5).unwrap_err();
        assert_eq!(
            err,
            ShapeError::TokenCount {
                expected: 3,
                got: 2
            }
        );
    }

    #[test]
    fn empty_stack_is_an_error() {
        assert_eq!(
            concept_neurons(&[], &[], 2, 0.5).unwrap_err(),
            ShapeError::EmptyStack
        );
    }
}
