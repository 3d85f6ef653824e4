use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub(crate) const CODE_LEN: usize = 8;

pub(crate) fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    let mut output = String::with_capacity(CODE_LEN);
    for _ in 0..CODE_LEN {
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}

/// Students type codes by hand; accept surrounding whitespace and lowercase.
pub(crate) fn normalize_access_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub(crate) fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|byte| ALPHABET.contains(&byte))
}
