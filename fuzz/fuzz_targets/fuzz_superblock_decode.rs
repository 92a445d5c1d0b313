//! Fuzz target: `Superblock::decode`
//!
//! Arbitrary block contents must either be rejected or decode to a
//! catalog that encodes back into a single block.
//!
//! cargo fuzz run fuzz_superblock_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use romemu::storage::{BLOCK_SIZE, Superblock};

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(BLOCK_SIZE)];
    if let Some(sb) = Superblock::decode(data) {
        let mut block = [0xFFu8; BLOCK_SIZE];
        sb.encode(&mut block).expect("decoded catalog re-encodes");
        assert_eq!(Superblock::decode(&block), Some(sb));
    }
});
