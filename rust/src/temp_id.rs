//! Provisional identities for entities the remote service has not confirmed yet.
//!
//! Format: `temp_<epoch millis>_<9 base-36 chars>`. Reconcilers rely on the
//! prefix to tell local-only entries from server-issued ones, so anything that
//! matches [`is_temp_id`] must never be sent to (or accepted from) the remote
//! service as a durable identity.

use rand::Rng;

use crate::clock::now_millis;

pub const TEMP_ID_PREFIX: &str = "temp_";

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn generate_temp_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{TEMP_ID_PREFIX}{}_{suffix}", now_millis())
}

pub fn is_temp_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(TEMP_ID_PREFIX) else {
        return false;
    };
    let Some((millis, suffix)) = rest.split_once('_') else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

/// Loose check used when reconciling: anything carrying the reserved prefix is
/// treated as local-only, even if the suffix is malformed.
pub fn has_temp_prefix(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}
