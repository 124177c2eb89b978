// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tensor::{Matrix, ShapeError, Tensor3};

/// One attention edge from a query position to a key position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttentionEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

/// Batch-averaged attention flow.
///
/// `top_edges_per_layer` lists each layer's `top_k` heaviest edges by raw
/// (not absolute) weight, in ascending weight order; equal weights resolve to
/// the lower flat (query * T + key) index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttentionFlow {
    /// Batch-averaged query x key matrix per layer.
    pub per_layer: Vec<Vec<Vec<f32>>>,
    pub top_edges_per_layer: Vec<Vec<AttentionEdge>>,
    /// Scalar mean over the full averaged matrix, per layer.
    pub mean_per_layer: Vec<f32>,
}

/// Average each layer's (batch, query, key) tensor over the batch axis and
/// extract the top-k heaviest edges plus the scalar attention mean per layer.
///
/// Layers must share the (query, key) shape; batch size may vary by layer,
/// and a zero-batch layer averages to zeros. An empty layer list is
/// degenerate, not an error.
pub fn attention_flow(layers: &[Tensor3], top_k: usize) -> Result<AttentionFlow, ShapeError> {
    if let Some(first) = layers.first() {
        let shape = (first.rows(), first.cols());
        for (i, layer) in layers.iter().enumerate() {
            if layer.rows() != layer.cols() {
                return Err(ShapeError::NotSquare {
                    rows: layer.rows(),
                    cols: layer.cols(),
                });
            }
            if (layer.rows(), layer.cols()) != shape {
                return Err(ShapeError::LayerShape {
                    layer: i,
                    expected: shape,
                    got: (layer.rows(), layer.cols()),
                });
            }
        }
    }

    let mut per_layer = Vec::with_capacity(layers.len());
    let mut top_edges_per_layer = Vec::with_capacity(layers.len());
    let mut mean_per_layer = Vec::with_capacity(layers.len());

    for tensor in layers {
        let averaged = tensor.mean_batch();
        top_edges_per_layer.push(top_edges(&averaged, top_k));
        mean_per_layer.push(averaged.mean());
        per_layer.push(averaged.to_rows());
    }

    Ok(AttentionFlow {
        per_layer,
        top_edges_per_layer,
        mean_per_layer,
    })
}

fn top_edges(averaged: &Matrix, top_k: usize) -> Vec<AttentionEdge> {
    let t = averaged.cols();
    let data = averaged.data();
    let mut order: Vec<usize> = (0..data.len()).collect();
    // Stable ascending sort, then the tail: equal weights keep the lower
    // flat index, and the output stays in ascending weight order.
    order.sort_by(|&a, &b| data[a].total_cmp(&data[b]));

    let take = top_k.min(order.len());
    order[order.len() - take..]
        .iter()
        .map(|&flat| AttentionEdge {
            source: flat / t,
            target: flat % t,
            weight: data[flat],
        })
        .collect()
}
