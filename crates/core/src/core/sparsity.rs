// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tensor::{mean, population_std, Matrix, ShapeError};

/// Sparsity profile of one activation stream.
///
/// "Sparsity" here is the fraction of entries that are exactly nonzero — an
/// exact comparison, not a magnitude threshold. Aggregates are population
/// statistics over the per-layer values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SparsityProfile {
    /// Nonzero fraction per layer.
    pub per_layer: Vec<f32>,
    /// Nonzero fraction per sequence position, averaged across layers.
    pub per_position: Vec<f32>,
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    /// Mean activation per neuron across all layers and positions.
    pub neuron_mean_activation: Vec<f32>,
    /// Fraction of (layer, position) slots in which each neuron is nonzero.
    pub neuron_active_rate: Vec<f32>,
    /// Raw layer x position x neuron values for heatmap rendering.
    pub heatmap: Vec<Vec<Vec<f32>>>,
}

/// Sparsity profiles for the primary stream and, when captured, the
/// secondary stream. The secondary stream never affects primary aggregates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivationSummary {
    pub primary: SparsityProfile,
    pub secondary: Option<SparsityProfile>,
}

/// Per-layer value statistics for both activation streams.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamStats {
    pub mean: f32,
    pub std: f32,
    pub max: f32,
    pub min: f32,
    pub sparsity: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerStats {
    pub layer: usize,
    pub primary: StreamStats,
    pub secondary: StreamStats,
}

fn check_stack(layers: &[Matrix]) -> Result<(usize, usize), ShapeError> {
    let first = layers.first().ok_or(ShapeError::EmptyStack)?;
    let shape = (first.rows(), first.cols());
    for (i, layer) in layers.iter().enumerate().skip(1) {
        if (layer.rows(), layer.cols()) != shape {
            return Err(ShapeError::LayerShape {
                layer: i,
                expected: shape,
                got: (layer.rows(), layer.cols()),
            });
        }
    }
    Ok(shape)
}

fn profile_stream(layers: &[Matrix]) -> Result<SparsityProfile, ShapeError> {
    let (positions, neurons) = check_stack(layers)?;
    let cells_per_layer = positions * neurons;

    let per_layer: Vec<f32> = layers
        .iter()
        .map(|m| {
            if cells_per_layer == 0 {
                return 0.0;
            }
            let nonzero = m.data().iter().filter(|&&v| v != 0.0).count();
            nonzero as f32 / cells_per_layer as f32
        })
        .collect();

    let mut per_position = vec![0.0f32; positions];
    let slots_per_position = layers.len() * neurons;
    if slots_per_position > 0 {
        for (t, out) in per_position.iter_mut().enumerate() {
            let nonzero: usize = layers
                .iter()
                .map(|m| m.row(t).iter().filter(|&&v| v != 0.0).count())
                .sum();
            *out = nonzero as f32 / slots_per_position as f32;
        }
    }

    let mut neuron_mean_activation = vec![0.0f32; neurons];
    let mut neuron_active_rate = vec![0.0f32; neurons];
    let slots_per_neuron = layers.len() * positions;
    if slots_per_neuron > 0 {
        for m in layers {
            for t in 0..positions {
                let row = m.row(t);
                for (n, &v) in row.iter().enumerate() {
                    neuron_mean_activation[n] += v;
                    if v != 0.0 {
                        neuron_active_rate[n] += 1.0;
                    }
                }
            }
        }
        let inv = 1.0 / slots_per_neuron as f32;
        for n in 0..neurons {
            neuron_mean_activation[n] *= inv;
            neuron_active_rate[n] *= inv;
        }
    }

    let min = per_layer.iter().copied().fold(f32::INFINITY, f32::min);
    let max = per_layer.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    Ok(SparsityProfile {
        mean: mean(&per_layer),
        std: population_std(&per_layer),
        min: if min.is_finite() { min } else { 0.0 },
        max: if max.is_finite() { max } else { 0.0 },
        per_layer,
        per_position,
        neuron_mean_activation,
        neuron_active_rate,
        heatmap: layers.iter().map(Matrix::to_rows).collect(),
    })
}

/// Compute fractional-nonzero statistics over per-layer activation matrices
/// (sequence positions x neurons), for the primary stream and optionally a
/// parallel secondary stream.
pub fn activation_sparsity(
    primary: &[Matrix],
    secondary: Option<&[Matrix]>,
) -> Result<ActivationSummary, ShapeError> {
    let primary_profile = profile_stream(primary)?;
    let secondary_profile = match secondary {
        Some(layers) => Some(profile_stream(layers)?),
        None => None,
    };
    Ok(ActivationSummary {
        primary: primary_profile,
        secondary: secondary_profile,
    })
}

fn stream_stats(m: &Matrix) -> StreamStats {
    let data = m.data();
    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let nonzero = data.iter().filter(|&&v| v != 0.0).count();
    StreamStats {
        mean: mean(data),
        std: population_std(data),
        max: if max.is_finite() { max } else { 0.0 },
        min: if min.is_finite() { min } else { 0.0 },
        sparsity: if data.is_empty() {
            0.0
        } else {
            nonzero as f32 / data.len() as f32
        },
    }
}

/// Per-layer value statistics across both streams. The streams must have the
/// same layer count and per-layer shapes.
pub fn layer_statistics(
    primary: &[Matrix],
    secondary: &[Matrix],
) -> Result<Vec<LayerStats>, ShapeError> {
    check_stack(primary)?;
    if secondary.len() != primary.len() {
        return Err(ShapeError::StreamCount {
            expected: primary.len(),
            got: secondary.len(),
        });
    }
    check_stack(secondary)?;

    Ok(primary
        .iter()
        .zip(secondary.iter())
        .enumerate()
        .map(|(layer, (p, s))| LayerStats {
            layer,
            primary: stream_stats(p),
            secondary: stream_stats(s),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(rows: usize, cols: usize, f: impl FnMut(usize, usize) -> f32) -> Matrix {
        Matrix::from_fn(rows, cols, f)
    }

    #[test]
    fn all_zero_stack_has_zero_sparsity_everywhere() {
        let layers = vec![Matrix::zeros(4, 8), Matrix::zeros(4, 8)];
        let summary = activation_sparsity(&layers, None).unwrap();
        assert!(summary.primary.per_layer.iter().all(|&v| v == 0.0));
        assert!(summary.primary.per_position.iter().all(|&v| v == 0.0));
        assert_eq!(summary.primary.mean, 0.0);
        assert_eq!(summary.primary.std, 0.0);
        assert_eq!(summary.primary.min, 0.0);
        assert_eq!(summary.primary.max, 0.0);
    }

    #[test]
    fn all_nonzero_stack_has_unit_sparsity_everywhere() {
        let layers = vec![layer(3, 5, |_, _| 1.5), layer(3, 5, |_, _| -0.2)];
        let summary = activation_sparsity(&layers, None).unwrap();
        assert!(summary.primary.per_layer.iter().all(|&v| v == 1.0));
        assert!(summary.primary.per_position.iter().all(|&v| v == 1.0));
        assert_eq!(summary.primary.mean, 1.0);
        assert_eq!(summary.primary.max, 1.0);
    }

    #[test]
    fn per_layer_fraction_counts_exact_nonzeros() {
        // First row nonzero, second row zero: half the entries are active.
        let m = layer(2, 4, |r, _| if r == 0 { 0.25 } else { 0.0 });
        let summary = activation_sparsity(&[m], None).unwrap();
        assert_eq!(summary.primary.per_layer, vec![0.5]);
        assert_eq!(summary.primary.per_position, vec![1.0, 0.0]);
        // Single-layer aggregate: min == max == mean, std == 0.
        assert_eq!(summary.primary.min, 0.5);
        assert_eq!(summary.primary.max, 0.5);
        assert_eq!(summary.primary.std, 0.0);
    }

    #[test]
    fn secondary_stream_does_not_affect_primary_aggregate() {
        let sparse = vec![Matrix::zeros(2, 2)];
        let dense = vec![layer(2, 2, |_, _| 1.0)];
        let alone = activation_sparsity(&sparse, None).unwrap();
        let with_secondary = activation_sparsity(&sparse, Some(&dense)).unwrap();
        assert_eq!(alone.primary, with_secondary.primary);
        let secondary = with_secondary.secondary.unwrap();
        assert_eq!(secondary.mean, 1.0);
    }

    #[test]
    fn neuron_metrics_average_over_layers_and_positions() {
        // Neuron 0 fires with value 2.0 in half its slots, neuron 1 never.
        let a = layer(2, 2, |r, c| if c == 0 && r == 0 { 2.0 } else { 0.0 });
        let b = layer(2, 2, |r, c| if c == 0 && r == 1 { 2.0 } else { 0.0 });
        let summary = activation_sparsity(&[a, b], None).unwrap();
        assert!((summary.primary.neuron_mean_activation[0] - 1.0).abs() < 1e-6);
        assert_eq!(summary.primary.neuron_mean_activation[1], 0.0);
        assert!((summary.primary.neuron_active_rate[0] - 0.5).abs() < 1e-6);
        assert_eq!(summary.primary.neuron_active_rate[1], 0.0);
    }

    #[test]
    fn empty_stack_is_an_error() {
        let err = activation_sparsity(&[], None).unwrap_err();
        assert_eq!(err, ShapeError::EmptyStack);
    }

    #[test]
    fn mismatched_layer_shape_is_an_error() {
        let layers = vec![Matrix::zeros(2, 3), Matrix::zeros(2, 4)];
        let err = activation_sparsity(&layers, None).unwrap_err();
        assert_eq!(
            err,
            ShapeError::LayerShape {
                layer: 1,
                expected: (2, 3),
                got: (2, 4)
            }
        );
    }

    #[test]
    fn heatmap_preserves_raw_values() {
        let m = layer(2, 2, |r, c| (r * 2 + c) as f32);
        let summary = activation_sparsity(&[m], None).unwrap();
        assert_eq!(summary.primary.heatmap, vec![vec![vec![0.0, 1.0], vec![2.0, 3.0]]]);
    }

    #[test]
    fn layer_statistics_covers_both_streams() {
        let p = vec![layer(2, 2, |_, _| 2.0)];
        let s = vec![layer(2, 2, |r, _| if r == 0 { 4.0 } else { 0.0 })];
        let stats = layer_statistics(&p, &s).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].primary.mean, 2.0);
        assert_eq!(stats[0].primary.sparsity, 1.0);
        assert_eq!(stats[0].secondary.mean, 2.0);
        assert_eq!(stats[0].secondary.max, 4.0);
        assert_eq!(stats[0].secondary.min, 0.0);
        assert_eq!(stats[0].secondary.sparsity, 0.5);
    }

    #[test]
    fn layer_statistics_rejects_uneven_stream_lengths() {
        let p = vec![Matrix::zeros(2, 2), Matrix::zeros(2, 2)];
        let s = vec![Matrix::zeros(2, 2)];
        assert!(layer_statistics(&p, &s).is_err());
    }
}
