// SPDX-License-Identifier: BSD-3-Clause
/// Structural rewrite failures are fatal for the affected method: the
/// transformation must never emit code that could violate verification.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("malformed method descriptor: {0}")]
    BadDescriptor(String),

    #[error("operand stack underflow at instruction {index} in {method}")]
    StackUnderflow { method: String, index: usize },

    /// Raised only in strict pairing mode; the default mode logs and
    /// proceeds with best-effort pairing.
    #[error("allocation pairing mismatch in {method}: pending {pending}, initializer owner {owner}")]
    PairingMismatch {
        method: String,
        pending: String,
        owner: String,
    },
}
