//! Base62 alphabet and byte mapping used for short-code generation.

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest multiple of 62 that fits in a byte. Bytes at or above it are
/// discarded so that every symbol is equally likely.
const REJECT_FROM: u8 = 248;

/// Returns the base62 alphabet as bytes.
pub fn alphabet() -> &'static [u8] {
    &ALPHABET[..]
}

/// Map one random byte to a base62 symbol, or `None` if it must be discarded.
pub fn symbol_for(byte: u8) -> Option<char> {
    if byte >= REJECT_FROM {
        return None;
    }
    Some(ALPHABET[(byte % 62) as usize] as char)
}

/// Append symbols for `bytes` to `out` until it holds `len` characters.
/// Returns true once `out` is full.
pub fn encode_into(bytes: &[u8], len: usize, out: &mut String) -> bool {
    for &b in bytes {
        if out.len() >= len {
            break;
        }
        if let Some(c) = symbol_for(b) {
            out.push(c);
        }
    }
    out.len() >= len
}
