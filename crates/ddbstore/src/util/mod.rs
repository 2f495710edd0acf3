use rand::RngCore;

/// Random bytes behind every session identifier.
pub const SESSION_ID_BYTES: usize = 32;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Current time as seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Fill a buffer of `len` bytes from the OS random source.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Mint a new session identifier.
///
/// The identifier is used as the table's partition key and travels inside the
/// cookie, so it only uses the RFC 4648 base32 alphabet (`A-Z`, `2-7`).
pub fn generate_session_id() -> String {
    encode_base32(&random_bytes(SESSION_ID_BYTES))
}

/// RFC 4648 base32, upper case, no padding.
pub fn encode_base32(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let idx = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[idx] as char);
        }
    }
    if bits > 0 {
        let idx = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[idx] as char);
    }
    out
}
