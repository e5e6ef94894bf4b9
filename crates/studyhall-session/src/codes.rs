//! Room code generation.

use rand::Rng;
use studyhall_protocol::RoomCode;

/// Characters a room code may contain. The ambiguous glyphs are left
/// out (`I`/`1`, `O`/`0`) because codes get read aloud and copied off
/// a projector.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Room codes are always this long. 32^6 ≈ 1.07 billion combinations —
/// plenty, since uniqueness is only required among *active* sessions.
const CODE_LEN: usize = 6;

/// Generates a random room code.
///
/// Uniqueness is NOT checked here — the registry does that, because
/// only it knows which codes are live.
pub(crate) fn generate_code() -> RoomCode {
    let mut rng = rand::rng();
    let code: String = (0..CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect();
    RoomCode(code)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_has_fixed_length() {
        for _ in 0..50 {
            assert_eq!(generate_code().as_str().len(), CODE_LEN);
        }
    }

    #[test]
    fn test_generate_code_uses_only_the_alphabet() {
        for _ in 0..50 {
            let code = generate_code();
            for byte in code.as_str().bytes() {
                assert!(
                    CODE_ALPHABET.contains(&byte),
                    "unexpected character {:?} in code {}",
                    byte as char,
                    code
                );
            }
        }
    }

    #[test]
    fn test_generate_code_avoids_ambiguous_glyphs() {
        for _ in 0..200 {
            let code = generate_code();
            for forbidden in ['I', 'O', '0', '1'] {
                assert!(
                    !code.as_str().contains(forbidden),
                    "code {code} contains ambiguous glyph {forbidden}"
                );
            }
        }
    }

    #[test]
    fn test_generate_code_varies() {
        // Not a uniqueness guarantee, but 100 identical draws from a
        // 32^6 space means the generator is broken.
        let first = generate_code();
        let any_different =
            (0..100).any(|_| generate_code() != first);
        assert!(any_different);
    }
}
