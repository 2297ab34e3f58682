use crc16::{State, CCITT_FALSE};

/// Frame checksum: CRC-16/CCITT-FALSE over the encoded payload.
pub fn checksum(data: &[u8]) -> u16 {
    State::<CCITT_FALSE>::calculate(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_incremental_update_matches_one_shot() {
        let mut state = State::<CCITT_FALSE>::new();
        state.update(b"rpcbus ");
        state.update(b"payload");
        assert_eq!(state.get(), checksum(b"rpcbus payload"));
    }

    #[test]
    fn test_single_bit_flip_changes_crc() {
        assert_ne!(checksum(b"rpcbus payload"), checksum(b"rpcbus paylobd"));
    }
}
