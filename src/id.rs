/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Mask a random word down to a 16 bit transaction id. The low byte of
/// the word is discarded first.
pub(crate) fn id_from_word(word: u32) -> u16 {
    ((word >> 8) & 0xffff) as u16
}

/// Source of DNS transaction ids for outgoing queries.
pub trait IdSource {
    fn next_id(&mut self) -> u16;
}

/// Transaction ids drawn from an OS-entropy seeded CSPRNG.
pub struct SecureIdSource {
    rng: StdRng,
}

impl SecureIdSource {
    pub fn new() -> Self {
        SecureIdSource {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SecureIdSource {
    fn default() -> Self {
        SecureIdSource::new()
    }
}

impl IdSource for SecureIdSource {
    fn next_id(&mut self) -> u16 {
        id_from_word(self.rng.next_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_low_byte() {
        assert_eq!(id_from_word(0x1234_5678), 0x3456);
        assert_eq!(id_from_word(0xffff_ffff), 0xffff);
        assert_eq!(id_from_word(0x0000_00ff), 0x0000);
    }

    #[test]
    fn ids_within_range() {
        let mut source = SecureIdSource::new();
        for _ in 0..32 {
            let _ = source.next_id();
        }
    }
}
