//! Internal helper macros.

/// Early-returns with the given error when the predicate does not hold.
///
/// Like `assert!`, but produces an `Err` instead of a panic, which keeps
/// validation checks in the decoders on the `Result` path.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
