//! Crate wide constants.

/// The compiled spatial dimension.
pub const SPACEDIM: usize = 3;

/// The rank that draws reader sets, generates serialized particles and reports summaries.
pub const LEADER_RANK: usize = 0;

/// Refinement ratio between consecutive levels of an
/// [AmrHierarchy](crate::hierarchy::AmrHierarchy).
pub const REF_RATIO: usize = 2;

/// Fraction of a cell a particle sitting on the domain boundary is moved inwards on read.
pub const BOUNDARY_SNAP_FRACTION: f64 = 0.125;

/// Size of the binary particle file header: `[i64 NP][i32 DM][i32 NX]`.
pub const BINARY_HEADER_BYTES: u64 = 16;

/// Number of bytes of a single 32 bit float in a binary particle file.
pub const FLOAT_BYTES: u64 = 4;

/// Number of bytes of a single 64 bit float in a binary particle file.
pub const DOUBLE_BYTES: u64 = 8;
