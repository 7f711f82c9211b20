//! Spatial hashing of integer grid corners.
//!
//! Coarse levels that fit in their table are indexed densely; finer levels
//! fold corners into the table with a prime-multiply XOR hash. Distinct
//! corners may share a slot. That is a property of the encoding, not an
//! error: colliding corners share one feature vector and their gradients
//! are summed into it.

/// Per-axis multipliers of the corner hash (x, y, z).
pub const HASH_PRIMES: [u32; 3] = [1, 2_654_435_761, 805_459_861];

/// Hash an integer corner into `[0, table_size)`.
///
/// `table_size` must be non-zero.
#[inline]
pub fn spatial_hash(corner: [u32; 3], table_size: usize) -> usize {
    let h = corner[0].wrapping_mul(HASH_PRIMES[0])
        ^ corner[1].wrapping_mul(HASH_PRIMES[1])
        ^ corner[2].wrapping_mul(HASH_PRIMES[2]);
    h as usize % table_size
}

/// Row-major (x fastest) linear index of a corner in a grid of `dims` points.
#[inline]
pub fn dense_index(corner: [u32; 3], dims: [u32; 3]) -> usize {
    corner[0] as usize + dims[0] as usize * (corner[1] as usize + dims[1] as usize * corner[2] as usize)
}
