// no_std support
#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prng::Prng;
use crate::tensor::{Matrix, Tensor3};

/// Shape of the sequence-model collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelConfig {
    /// Vocabulary / cell-space size of the logit head.
    pub vocab: usize,
    /// Maximum sequence length the model was trained for.
    pub seq_len: usize,
    pub heads: usize,
    pub neurons: usize,
    pub latent: usize,
    pub layers: usize,
}

impl ModelConfig {
    /// Shorthand for the dimensions analytics actually cares about; the rest
    /// keeps the trained defaults.
    pub fn with_shape(vocab: usize, neurons: usize, layers: usize) -> Self {
        Self {
            vocab,
            neurons,
            layers,
            ..Self::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab: 5,
            seq_len: 100,
            heads: 4,
            neurons: 2048,
            latent: 64,
            layers: 12,
        }
    }
}

/// Everything one forward call captures.
///
/// - `logits`: one score vector per sequence position over `vocab` entries.
/// - `activations` / `secondary`: per-layer (position x neuron) matrices for
///   the two internal streams.
/// - `attention`: per-layer (batch, query, key) tensors.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub logits: Matrix,
    pub activations: Vec<Matrix>,
    pub secondary: Vec<Matrix>,
    pub attention: Vec<Tensor3>,
}

/// The single capability interface the analytics and solvers consume.
///
/// Implementations are black boxes: given a token sequence they produce a
/// capture, and they expose a snapshot of the learned connectivity matrix.
/// Both operations are read-only; a handle is constructed once and reused
/// across calls.
pub trait SequenceModel {
    fn config(&self) -> &ModelConfig;

    /// Learned N x N connectivity snapshot, borrowed for the duration of one
    /// analysis call.
    fn connectivity_matrix(&self) -> &Matrix;

    /// Run the model over `tokens` and capture logits, both activation
    /// streams, and attention. Blocking and synchronous; may run on an
    /// accelerator behind the implementation.
    fn forward(&self, tokens: &[u32]) -> ForwardPass;
}

/// Deterministic stand-in for a trained collaborator.
///
/// Produces seeded pseudo-random captures with the right shapes and the
/// right coarse texture (sparse primary stream, denser secondary stream,
/// causal row-normalized attention, a hub-heavy connectivity matrix). Used
/// by the daemon when no trained model is wired in, and by tests.
#[derive(Debug, Clone)]
pub struct SyntheticModel {
    cfg: ModelConfig,
    seed: u64,
    connectivity: Matrix,
}

impl SyntheticModel {
    pub fn new(cfg: ModelConfig, seed: u64) -> Self {
        let n = cfg.neurons;
        let mut r = Prng::new(seed);
        let mut connectivity = Matrix::from_fn(n, n, |_, _| r.gen_range_f32(-0.15, 0.15));

        // Strengthen a few rows/columns so the thresholded graph has hubs,
        // the way a trained circuit matrix does.
        let hub_count = (n / 32).max(1).min(n);
        for hub in 0..hub_count {
            for j in 0..n {
                connectivity.set(hub, j, r.gen_range_f32(-0.5, 0.5));
                connectivity.set(j, hub, r.gen_range_f32(-0.5, 0.5));
            }
        }

        Self {
            cfg,
            seed,
            connectivity,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn pass_rng(&self, tokens: &[u32]) -> Prng {
        // Fold the token sequence into the seed so distinct inputs give
        // distinct (but reproducible) captures.
        let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        for &t in tokens {
            h = (h.rotate_left(7) ^ (t as u64).wrapping_add(0xA5A5_5A5A))
                .wrapping_mul(0x100_0000_01B3);
        }
        Prng::new(h)
    }
}

impl SequenceModel for SyntheticModel {
    fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    fn connectivity_matrix(&self) -> &Matrix {
        &self.connectivity
    }

    fn forward(&self, tokens: &[u32]) -> ForwardPass {
        let t = tokens.len();
        let n = self.cfg.neurons;
        let mut r = self.pass_rng(tokens);

        let mut activations = Vec::with_capacity(self.cfg.layers);
        let mut secondary = Vec::with_capacity(self.cfg.layers);
        let mut attention = Vec::with_capacity(self.cfg.layers);

        for _ in 0..self.cfg.layers {
            // Sparse rectified primary stream: ~10% of entries nonzero.
            activations.push(Matrix::from_fn(t, n, |_, _| {
                let v = r.next_f32_01();
                if v < 0.9 {
                    0.0
                } else {
                    (v - 0.9) * 10.0
                }
            }));
            // Denser secondary stream.
            secondary.push(Matrix::from_fn(t, n, |_, _| {
                let v = r.next_f32_01();
                if v < 0.5 {
                    0.0
                } else {
                    v - 0.5
                }
            }));

            // Causal attention: positive mass on keys <= query, rows
            // normalized to sum 1.
            let mut layer = Tensor3::from_fn(1, t, t, |_, q, k| {
                if k <= q {
                    0.05 + r.next_f32_01()
                } else {
                    0.0
                }
            });
            for q in 0..t {
                let row_sum: f32 = (0..t).map(|k| layer.get(0, q, k)).sum();
                if row_sum > 0.0 {
                    for k in 0..t {
                        let v = layer.get(0, q, k) / row_sum;
                        layer.set(0, q, k, v);
                    }
                }
            }
            attention.push(layer);
        }

        let logits = Matrix::from_fn(t, self.cfg.vocab, |_, _| r.gen_range_f32(-1.0, 1.0));

        ForwardPass {
            logits,
            activations,
            secondary,
            attention,
        }
    }
}
