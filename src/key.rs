//! Key composer: builds deterministic, collision-free storage keys from
//! (prefix, identifier, tenant tag, algorithm-specific suffix).

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

/// Maximum key length before the SHA-256 truncation fallback kicks in.
const MAX_KEY_LENGTH: usize = 200;

/// Characters that must be percent-encoded: everything except
/// `[A-Za-z0-9-_.~]`. This keeps `:` encoded so `"a:b"` and `"a_b"`
/// never collide once composed into a key.
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single key component so it cannot introduce a
/// delimiter collision once joined with `:`.
pub fn encode_component(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, ENCODE_SET).to_string()
}

/// Compose `prefix:encode(identifier):encode(tenant):suffix`, applying
/// the SHA-256 truncation fallback when the result exceeds 200 chars.
pub fn compose(prefix: &str, identifier: &str, tenant: &str, suffix: &str) -> String {
    let full = format!(
        "{prefix}:{}:{}:{suffix}",
        encode_component(identifier),
        encode_component(tenant)
    );
    truncate_if_needed(full)
}

fn truncate_if_needed(key: String) -> String {
    if key.len() <= MAX_KEY_LENGTH {
        return key;
    }

    let digest = Sha256::digest(key.as_bytes());
    let hash_hex = hex::encode(digest);

    let sep_and_hash_len = hash_hex.len() + 1;
    if MAX_KEY_LENGTH > sep_and_hash_len {
        let prefix_len = MAX_KEY_LENGTH - sep_and_hash_len;
        // Respect char boundaries: never split a multi-byte UTF-8 sequence.
        let mut cut = prefix_len.min(key.len());
        while cut > 0 && !key.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}_{}", &key[..cut], hash_hex)
    } else {
        hash_hex
    }
}
