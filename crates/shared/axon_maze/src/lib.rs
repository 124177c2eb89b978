#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod board;

// The solver policies allocate freely (paths, frontiers) and report through
// std error types. Keep them behind `std` so `no_std` consumers can still use
// the board encoding.
#[cfg(feature = "std")]
pub mod solver;

// Explicit adapters for scoring moves with an `axon::model::SequenceModel`.
// Kept behind the optional `axon` feature.
#[cfg(feature = "axon")]
pub mod model_io;
