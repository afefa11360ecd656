//! Construction-time validation errors for shape geometry.

use thiserror::Error;

/// Rejected geometry passed to a shape constructor.
///
/// The simulation loop itself never fails; only constructors that index into
/// caller-provided data validate it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("face {face} references vertex {vertex}, but only {count} vertices exist")]
    VertexOutOfRange { face: usize, vertex: usize, count: usize },

    #[error("face {face} has {len} vertices, at least 3 are required")]
    DegenerateFace { face: usize, len: usize },

    #[error("triangle {triangle} references vertex {vertex}, but only {count} vertices exist")]
    TriangleIndexOutOfRange { triangle: usize, vertex: u32, count: usize },

    #[error("{0} requires at least one element")]
    Empty(&'static str),

    #[error("heightfield needs at least 2x2 samples, got {rows}x{columns}")]
    HeightfieldTooSmall { rows: usize, columns: usize },

    #[error("heightfield row {row} has {len} samples, expected {expected}")]
    RaggedHeightfield { row: usize, len: usize, expected: usize },

    #[error("cylinder needs at least 3 segments, got {0}")]
    TooFewSegments(usize),

    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f32 },
}
