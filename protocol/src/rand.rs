//! The single entry point for randomness used anywhere in this workspace (spec §4.1).
//!
//! No other module may call an RNG directly — `generate_random` is it. A failure here
//! is defined by spec §7 (`RngFailure`) to be fatal: rather than returning weak or
//! zeroed bytes, the process aborts. This mirrors the teacher's own posture of treating
//! `OsRng` failures as unrecoverable (`x25519-dalek`/`ed25519-dalek`'s own `OsRng`
//! callers panic on source failure); we make the abort explicit instead of relying on
//! an internal panic so the intent reads at the call site.

/// Fill and return `n` cryptographically secure random bytes.
///
/// Aborts the process on RNG failure. This is a deliberate violation of "always return
/// a Result" — per spec §5 and §7, `RngFailure` has no recovery path worth offering a
/// caller: continuing with degraded randomness is worse than stopping the process.
pub fn generate_random(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    if let Err(err) = getrandom::getrandom(&mut buf) {
        tracing::error!(%err, "RNG source failed; aborting process per spec RngFailure policy");
        std::process::abort();
    }
    buf
}

/// Fill a fixed-size array in place.
pub fn fill_random<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    if let Err(err) = getrandom::getrandom(&mut buf) {
        tracing::error!(%err, "RNG source failed; aborting process per spec RngFailure policy");
        std::process::abort();
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        assert_eq!(generate_random(32).len(), 32);
        assert_eq!(generate_random(0).len(), 0);
    }

    #[test]
    fn distinct_calls_differ() {
        let a = generate_random(32);
        let b = generate_random(32);
        assert_ne!(a, b, "two independent draws collided; RNG source is broken");
    }

    #[test]
    fn fill_random_array() {
        let a: [u8; 12] = fill_random();
        let b: [u8; 12] = fill_random();
        assert_ne!(a, b);
    }
}
