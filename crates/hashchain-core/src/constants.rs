pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const HASH_BITS: u32 = (HASH_SIZE * BYTE) as u32;
pub const DEFAULT_DIFFICULTY: u32 = 16;
pub const GENESIS_PAYLOAD: &[u8] = b"genesis";
pub const GENESIS_PREVIOUS_HASH: [u8; HASH_SIZE] = [0u8; HASH_SIZE];
