//! Small encoding helpers shared by the node types.
//!
//! - lowercase hex
//! - unsigned varints (multiformats flavor: minimal, at most 9 bytes)
//! - serde adapters that render byte fields as standard base64

/// Maximum encoded length of an unsigned varint.
pub const MAX_VARINT_LEN: usize = 9;

/// Encode bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a hex string (either case).
pub fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err(format!("odd hex length: {}", s.len()));
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex '{digits}': {e}"))
        })
        .collect()
}

/// Append the unsigned varint encoding of `value` to `out`.
pub fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encode `value` as an unsigned varint.
pub fn uvarint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    write_uvarint(&mut out, value);
    out
}

/// Decode an unsigned varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Non-minimal
/// encodings and encodings longer than [`MAX_VARINT_LEN`] are rejected.
pub fn read_uvarint(bytes: &[u8]) -> Result<(u64, usize), String> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err("varint too long".to_string());
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err("varint not minimally encoded".to_string());
            }
            return Ok((value, i + 1));
        }
    }
    Err("unexpected end of varint".to_string())
}

/// Serde adapter for `Vec<u8>` fields, rendered as standard base64.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
