//! Random password generation for minted credentials.

use rand::Rng;
use rand::seq::IndexedRandom;

/// Characters a generated password is drawn from.
pub const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Length of every generated password.
pub const PASSWORD_LENGTH: usize = 12;

/// Generate a password of [`PASSWORD_LENGTH`] characters drawn uniformly from
/// [`PASSWORD_ALPHABET`] using the thread-local CSPRNG.
#[must_use]
pub fn generate_password() -> String {
    generate_password_with(&mut rand::rng())
}

/// Same as [`generate_password`] with a caller-supplied RNG.
pub fn generate_password_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PASSWORD_LENGTH)
        .filter_map(|_| PASSWORD_ALPHABET.choose(rng))
        .map(|&b| char::from(b))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_password_length_and_alphabet() {
        for _ in 0..200 {
            let password = generate_password();
            assert_eq!(password.len(), PASSWORD_LENGTH);
            assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_consecutive_passwords_differ() {
        let generated: HashSet<String> = (0..100).map(|_| generate_password()).collect();
        assert_eq!(generated.len(), 100);
    }

    #[test]
    fn test_alphabet_is_seventy_distinct_characters() {
        let distinct: HashSet<u8> = PASSWORD_ALPHABET.iter().copied().collect();
        assert_eq!(distinct.len(), 70);
        assert_eq!(PASSWORD_ALPHABET.len(), 70);
    }

    #[test]
    fn test_every_class_appears_across_many_passwords() {
        let all: String = (0..200).map(|_| generate_password()).collect();
        assert!(all.bytes().any(|b| b.is_ascii_uppercase()));
        assert!(all.bytes().any(|b| b.is_ascii_lowercase()));
        assert!(all.bytes().any(|b| b.is_ascii_digit()));
        assert!(all.bytes().any(|b| b"!@#$%^&*".contains(&b)));
    }
}
