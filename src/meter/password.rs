//! Meter password handling.

use crate::constants::{OMNI_DEFAULT_PASSWORD, OMNI_PASSWORD_LEN};
use crate::error::MeterError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An eight digit meter password. Cleared from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    /// Validates and wraps a password.
    pub fn new(password: &str) -> Result<Self, MeterError> {
        if password.chars().count() != OMNI_PASSWORD_LEN {
            return Err(MeterError::Validation("Invalid password length.".into()));
        }
        if !password.chars().all(|c| c.is_ascii_digit()) {
            return Err(MeterError::Validation("Password must be numeric.".into()));
        }
        Ok(Password(password.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for Password {
    fn default() -> Self {
        Password(OMNI_DEFAULT_PASSWORD.to_string())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(********)")
    }
}

impl TryFrom<&str> for Password {
    type Error = MeterError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Password::new(value)
    }
}
