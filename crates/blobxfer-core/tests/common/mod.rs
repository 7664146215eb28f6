#![allow(dead_code)]

pub mod blob_server;
pub mod memory_blob;

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
