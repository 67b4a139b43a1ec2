use faststr::FastStr;
use rand::rng;
use rand::seq::IndexedRandom;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub const REQUEST_ID_LEN: usize = 8;

/// Short base36 correlation id attached to every log line of one relayed
/// request and echoed back in `X-Request-ID`.
pub fn request_id() -> FastStr {
    request_id_with_len(REQUEST_ID_LEN)
}

pub fn request_id_with_len(len: usize) -> FastStr {
    let mut rng = rng();
    (0..len)
        .filter_map(|_| ALPHABET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect::<String>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_id_shape() {
        let id = request_id();
        assert_eq!(id.len(), REQUEST_ID_LEN);
        assert!(
            id.bytes().all(|b| ALPHABET.contains(&b)),
            "unexpected character in {id}"
        );
    }

    #[test]
    fn test_request_id_custom_len() {
        assert_eq!(request_id_with_len(0), "");
        assert_eq!(request_id_with_len(16).len(), 16);
    }

    #[test]
    fn test_request_ids_differ() {
        // 36^8 possible ids, collisions across 64 draws would point at a broken rng
        let ids: HashSet<_> = (0..64).map(|_| request_id()).collect();
        assert_eq!(ids.len(), 64);
    }
}
