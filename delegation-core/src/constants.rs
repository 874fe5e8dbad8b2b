/// EIP-7702 delegation prefix bytes
pub const EIP_7702_DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// EIP-7702 delegation code length (prefix + address)
pub const EIP_7702_DELEGATION_CODE_LENGTH: usize = 23;
