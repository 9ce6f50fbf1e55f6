use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const URL_ALPHABET: &[u8] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

pub const NANOID_LEN: usize = 21;
const SUFFIX_LEN: usize = 9;

/// `<prefix>_<unix-millis>_<9 base36 chars>`, e.g. `course_1718000000000_k3j9x0a1b`.
pub fn prefixed_id(prefix: &str) -> String {
    format!("{prefix}_{}_{}", unix_millis(), random_string(BASE36, SUFFIX_LEN))
}

/// 21 URL-safe characters, the shape user ids have always had.
pub fn nanoid() -> String {
    random_string(URL_ALPHABET, NANOID_LEN)
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
