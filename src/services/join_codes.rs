use rand::Rng;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GROUP_LEN: usize = 4;

/// Human-friendly code in the form `ABCD-EF23`.
pub(crate) fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    let mut output = String::with_capacity(GROUP_LEN * 2 + 1);
    for position in 0..GROUP_LEN * 2 {
        if position == GROUP_LEN {
            output.push('-');
        }
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}

/// Case, whitespace and dashes are not significant when students type a code.
pub(crate) fn normalize_join_code(code: &str) -> String {
    code.chars().filter(|ch| ch.is_ascii_alphanumeric()).collect::<String>().to_ascii_uppercase()
}

pub(crate) fn hash_join_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_join_code(code).as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn join_code_matches(candidate: &str, stored_hash: &str) -> bool {
    hash_join_code(candidate) == stored_hash
}
