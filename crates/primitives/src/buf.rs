use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};

/// 20-byte buf, used for account addresses.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary, BorshSerialize, BorshDeserialize,
)]
pub struct Buf20([u8; 20]);
impl_buf!(Buf20, 20);

/// 32-byte buf, used for block hashes and state roots.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary, BorshSerialize, BorshDeserialize,
)]
pub struct Buf32([u8; 32]);
impl_buf!(Buf32, 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buf32_hex_roundtrip_through_str() {
        let mut raw = [0u8; 32];
        raw[0] = 0xab;
        raw[31] = 0x01;
        let buf = Buf32::new(raw);

        let s = buf.to_string();
        assert!(s.starts_with("0xab"));
        assert_eq!(s.parse::<Buf32>().unwrap(), buf);
        // prefix is optional
        assert_eq!(s[2..].parse::<Buf32>().unwrap(), buf);
    }

    #[test]
    fn test_buf32_zero() {
        assert!(Buf32::zero().is_zero());
        assert!(!Buf32::new([1; 32]).is_zero());
        assert_eq!(Buf32::default(), Buf32::zero());
    }

    #[test]
    fn test_buf32_borsh_is_fixed_width() {
        let buf = Buf32::new([7; 32]);
        let enc = borsh::to_vec(&buf).unwrap();
        assert_eq!(enc.len(), Buf32::LEN);
    }

    #[test]
    fn test_buf20_serde_json() {
        let buf = Buf20::new([0x11; 20]);
        let json = serde_json::to_string(&buf).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "11".repeat(20)));
        let back: Buf20 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, buf);
    }
}
