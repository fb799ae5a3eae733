//! Allocation errors, reported by [`Heap`] implementations and the node lifecycle functions
//!
//! [`Heap`]: crate::param::Heap

use std::error::Error;
use std::fmt;

/// Errors that can occur while allocating a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The heap could not satisfy the request
    Exhausted {
        /// Number of bytes requested
        size: usize,
        /// Alignment of the request
        align: usize,
    },
    /// A node with this many elements would be larger than `isize::MAX` bytes
    CapacityOverflow {
        /// The requested capacity, in elements
        count: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { size, align } => {
                write!(f, "heap exhausted: could not allocate {size} bytes (align {align})")
            }
            Self::CapacityOverflow { count } => {
                write!(f, "capacity overflow: a node of {count} elements is too large")
            }
        }
    }
}

impl Error for AllocError {}
