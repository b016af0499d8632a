//! Generators for synthetic file payloads.
//!
//! Payloads follow predictable patterns so tests can verify content that
//! went through a source, a sink or a store without keeping a copy around.

/// Bytes where `data[i] == (i % 251) as u8`.
///
/// 251 is prime, so the pattern does not line up with power-of-two buffer
/// sizes and misplaced chunks are detected.
///
/// ```
/// use test_utils::create_pattern_bytes;
///
/// let data = create_pattern_bytes(300);
/// assert_eq!(data[0], 0);
/// assert_eq!(data[250], 250);
/// assert_eq!(data[251], 0);
/// ```
pub fn create_pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Checks a buffer produced by [`create_pattern_bytes`], possibly starting
/// at `offset` within the original pattern.
pub fn verify_pattern_bytes(data: &[u8], offset: usize) -> bool {
    data.iter()
        .enumerate()
        .all(|(i, b)| *b == ((offset + i) % 251) as u8)
}

/// A payload seeded by `seed`; different seeds give different bytes.
pub fn create_seeded_bytes(len: usize, seed: u64) -> Vec<u8> {
    // xorshift64
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state & 0xff) as u8
        })
        .collect()
}

/// A minimal PNG signature followed by `len` pattern bytes.
pub fn create_fake_png(len: usize) -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    data.extend(create_pattern_bytes(len));
    data
}
