//! One-time codes for password reset.

use std::fmt;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const CODE_LENGTH: usize = 6;

/// Six ASCII digits. `Debug` hides the value; the code is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OneTimeCode(String);

impl OneTimeCode {
    /// Draw a fresh code from a CSPRNG seeded with OS entropy.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = ChaCha20Rng::from_entropy();
        let n: u32 = rng.gen_range(0..1_000_000);
        Self(format!("{n:0width$}", width = CODE_LENGTH))
    }

    /// The digits, for handing to a notification channel.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against user input (surrounding
    /// whitespace ignored).
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.trim().as_bytes())
    }
}

impl fmt::Debug for OneTimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeCode(******)")
    }
}

/// Compare two byte strings without early exit on the first difference.
#[must_use]
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
impl OneTimeCode {
    pub(crate) fn fixed(digits: &str) -> Self {
        Self(digits.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_six_digits() {
        for _ in 0..50 {
            let code = OneTimeCode::generate();
            assert_eq!(code.expose().len(), CODE_LENGTH);
            assert!(code.expose().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_matching() {
        let code = OneTimeCode::fixed("004217");
        assert!(code.matches("004217"));
        assert!(code.matches(" 004217\n"));
        assert!(!code.matches("4217"));
        assert!(!code.matches("004218"));
        assert!(!code.matches(""));
    }

    #[test]
    fn test_debug_hides_digits() {
        let code = OneTimeCode::fixed("123456");
        assert!(!format!("{code:?}").contains("123456"));
    }
}
