//! Short-code generation and the uniqueness loop.

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use crate::base62::encode_into;
use crate::{CodeGenerator, CoreError, ShortCode, CODE_LENGTH};

/// Attempts allowed before giving up on finding a free code.
pub const MAX_ATTEMPTS: u32 = 5;

/// Draws codes from the operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> ShortCode {
        let mut out = String::with_capacity(CODE_LENGTH);
        // 2x oversampling; ~3% of bytes are rejected so one round almost always suffices.
        let mut buf = [0u8; CODE_LENGTH * 2];
        loop {
            OsRng.fill_bytes(&mut buf);
            if encode_into(&buf, CODE_LENGTH, &mut out) {
                return ShortCode::new_unchecked(out);
            }
        }
    }
}

/// Draw codes and offer each to `claim`, up to `max_attempts` draws in total.
///
/// `claim` returns `Some` once it owns the code and `None` when the code is
/// taken, whether it was already stored or lost to a concurrent insert. Store
/// errors are propagated immediately. When every draw is taken the caller gets
/// [`CoreError::UniquenessExhausted`]; no code is fabricated.
pub fn generate_unique_code<G, T, F>(
    generator: &G,
    max_attempts: u32,
    mut claim: F,
) -> Result<T, CoreError>
where
    G: CodeGenerator + ?Sized,
    F: FnMut(ShortCode) -> Result<Option<T>, CoreError>,
{
    for attempt in 1..=max_attempts {
        let code = generator.next_code();
        let shown = code.to_string();
        if let Some(claimed) = claim(code)? {
            return Ok(claimed);
        }
        debug!(code = %shown, attempt, "generated code already taken");
    }
    warn!(attempts = max_attempts, "code generation exhausted");
    Err(CoreError::UniquenessExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    use crate::is_code_format;

    /// Replays a fixed list of codes, then repeats the last one.
    pub(crate) struct ScriptedGenerator {
        codes: Mutex<VecDeque<&'static str>>,
        last: &'static str,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(codes: &[&'static str]) -> Self {
            Self {
                codes: Mutex::new(codes.iter().copied().collect()),
                last: codes.last().copied().unwrap_or("AAAAAA"),
            }
        }
    }

    impl CodeGenerator for ScriptedGenerator {
        fn next_code(&self) -> ShortCode {
            let next = self.codes.lock().unwrap().pop_front().unwrap_or(self.last);
            ShortCode::new(next).unwrap()
        }
    }

    #[test]
    fn random_codes_have_the_right_shape() {
        let g = RandomCodeGenerator::new();
        for _ in 0..200 {
            let c = g.next_code();
            assert!(is_code_format(c.as_str()), "{c}");
        }
    }

    #[test]
    fn random_codes_do_not_repeat_in_practice() {
        let g = RandomCodeGenerator::new();
        let codes: HashSet<_> = (0..1000).map(|_| g.next_code()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn returns_first_free_code() {
        let g = ScriptedGenerator::new(&["taken1", "taken2", "free01"]);
        let taken = ["taken1", "taken2"];
        let code = generate_unique_code(&g, MAX_ATTEMPTS, |c| {
            Ok((!taken.contains(&c.as_str())).then_some(c))
        })
        .expect("free code");
        assert_eq!(code.as_str(), "free01");
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let g = ScriptedGenerator::new(&["same00"]);
        let mut calls = 0;
        let err = generate_unique_code(&g, MAX_ATTEMPTS, |_| {
            calls += 1;
            Ok(None::<ShortCode>)
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::UniquenessExhausted { attempts: 5 }));
        assert_eq!(calls, 5);
    }

    #[test]
    fn propagates_store_errors() {
        let g = RandomCodeGenerator::new();
        let err = generate_unique_code(&g, MAX_ATTEMPTS, |_| {
            Err::<Option<ShortCode>, _>(CoreError::Repository("down".into()))
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Repository(_)));
    }
}
