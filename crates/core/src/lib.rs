//! # axon
//!
//! Introspection and search analytics for a pretrained sequence model.
//!
//! The model itself is an external collaborator: given a token sequence it
//! yields logits, per-layer activation tensors, attention tensors, and a
//! learned connectivity matrix. This crate turns those snapshots into graph
//! structures, summary statistics, and concept maps a front end can render.
//!
//! ## Quick Start
//!
//! ```
//! use axon::prelude::*;
//!
//! // A deterministic stand-in for a trained collaborator.
//! let model = SyntheticModel::new(ModelConfig::with_shape(5, 64, 4), 42);
//!
//! // Threshold the learned connectivity matrix into a directed graph.
//! let topology = extract_topology(model.connectivity_matrix(), 0.1, None).unwrap();
//! assert_eq!(topology.metrics.num_nodes, 64);
//!
//! // Summarize activation sparsity over one forward pass.
//! let pass = model.forward(&[0, 1, 2, 3]);
//! let summary = activation_sparsity(&pass.activations, Some(&pass.secondary)).unwrap();
//! assert_eq!(summary.primary.per_layer.len(), 4);
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support
//! - `serde`: Enable serialization/deserialization of result types
//!
//! ## Modules
//!
//! - [`topology`]: Connectivity matrix to thresholded directed graph
//! - [`sparsity`]: Activation sparsity profiles and layer statistics
//! - [`attention`]: Batch-averaged attention flow and top-k edges
//! - [`concepts`]: Symbol-conditioned concept neuron identification
//! - [`model`]: The collaborator contract and a synthetic stand-in

// no_std support
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[path = "core/tensor.rs"]
pub mod tensor;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/sparsity.rs"]
pub mod sparsity;

#[path = "core/attention.rs"]
pub mod attention;

#[path = "core/concepts.rs"]
pub mod concepts;

pub mod model;

/// Prelude module for convenient imports.
///
/// ```
/// use axon::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attention::{attention_flow, AttentionEdge, AttentionFlow};
    pub use crate::concepts::{concept_neurons, ConceptNeuron};
    pub use crate::model::{ForwardPass, ModelConfig, SequenceModel, SyntheticModel};
    pub use crate::sparsity::{
        activation_sparsity, layer_statistics, ActivationSummary, LayerStats, SparsityProfile,
    };
    pub use crate::tensor::{Matrix, ShapeError, Tensor3};
    pub use crate::topology::{
        detect_communities, extract_topology, CommunityPartition, GraphEdge, GraphNode,
        GraphTopology, TopologyMetrics,
    };
}
