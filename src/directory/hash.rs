//! Address hashing for the bucket table

/// Number of buckets in the directory's hash table (prime).
pub const TABLE_SIZE: usize = 1019;

/// Byte-wise multiplicative hash over the raw bytes of an address.
///
/// Each byte is read as a signed char, so bytes above `0x7f` contribute
/// negatively (wrapping).
pub fn address_hash(address: usize) -> u32 {
    address
        .to_ne_bytes()
        .iter()
        .fold(0u32, |hash, &byte| {
            (byte as i8 as i32 as u32).wrapping_add(hash.wrapping_mul(31))
        })
}

/// Bucket index for `address`.
pub fn bucket_of(address: usize) -> usize {
    address_hash(address) as usize % TABLE_SIZE
}
