//! The numeric value oracles observe and report.

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

/// Bit width of the canonical observation domain.
///
/// Values live in the two's-complement range `[-2^191, 2^191 - 1]` and
/// serialize into exactly [`CANONICAL_LEN`] bytes, matching the width the
/// aggregation contract stores answers in.
pub const VALUE_BITS: u32 = 191;

/// Length of the canonical byte encoding.
pub const CANONICAL_LEN: usize = 24;

/// Errors producing or encoding observations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ObservationError {
    /// The value exceeds the canonical 192-bit two's-complement range
    #[error("observation out of range: {0}")]
    OutOfRange(BigInt),

    /// The missing sentinel has no numeric value or encoding
    #[error("observation is missing")]
    Missing,
}

/// A fixed-range signed observation, or the *missing* sentinel.
///
/// Missing observations arise when the data source times out or errors;
/// they are never signed, and a follower that fails to observe simply sits
/// the round's observation phase out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    value: Option<BigInt>,
}

impl Observation {
    /// Wrap a value, rejecting anything outside the canonical range.
    pub fn new(value: BigInt) -> Result<Self, ObservationError> {
        if value < Self::min_value() || value > Self::max_value() {
            return Err(ObservationError::OutOfRange(value));
        }
        Ok(Self { value: Some(value) })
    }

    /// The sentinel for "no observation could be made".
    pub fn missing() -> Self {
        Self { value: None }
    }

    /// Whether this is the missing sentinel.
    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }

    /// The numeric value, unless missing.
    pub fn value(&self) -> Option<&BigInt> {
        self.value.as_ref()
    }

    /// Smallest representable value, `-2^191`.
    pub fn min_value() -> BigInt {
        -(BigInt::one() << VALUE_BITS)
    }

    /// Largest representable value, `2^191 - 1`.
    pub fn max_value() -> BigInt {
        (BigInt::one() << VALUE_BITS) - 1
    }

    /// Strict total order used for sorting observation lists.
    ///
    /// Missing sorts below every numeric value.
    pub fn less(&self, other: &Observation) -> bool {
        match (&self.value, &other.value) {
            (None, None) => false,
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a < b,
        }
    }

    /// Whether this observation deviates from `other` by more than
    /// `alpha_ppb` parts per billion of `other`.
    ///
    /// A zero `other` is deviated from by any non-zero value. Missing
    /// observations never deviate.
    pub fn deviates(&self, other: &Observation, alpha_ppb: u64) -> bool {
        let (Some(a), Some(b)) = (&self.value, &other.value) else {
            return false;
        };
        if b.is_zero() {
            return !a.is_zero();
        }
        let difference = (a - b).abs() * BigInt::from(1_000_000_000u64);
        let threshold = b.abs() * BigInt::from(alpha_ppb);
        difference > threshold
    }

    /// Sign-extended big-endian two's-complement encoding, 24 bytes.
    ///
    /// This is the byte form mixed into every signature payload; it must be
    /// identical on every node for signatures to agree.
    pub fn canonical_bytes(&self) -> Result<[u8; CANONICAL_LEN], ObservationError> {
        let value = self.value.as_ref().ok_or(ObservationError::Missing)?;
        let bytes = value.to_signed_bytes_be();
        let fill = if value.sign() == Sign::Minus { 0xff } else { 0x00 };
        let mut out = [fill; CANONICAL_LEN];
        out[CANONICAL_LEN - bytes.len()..].copy_from_slice(&bytes);
        Ok(out)
    }
}

// Wire form: missing is null, a value is its minimal signed-magnitude byte
// string. Bounds are re-checked on decode so a peer cannot smuggle an
// out-of-range value past the constructor.
impl Serialize for Observation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.value {
            None => serializer.serialize_none(),
            Some(value) => serializer.serialize_some(&value.to_signed_bytes_be()),
        }
    }
}

impl<'de> Deserialize<'de> for Observation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: Option<Vec<u8>> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(Self::missing()),
            Some(bytes) => {
                if bytes.len() > CANONICAL_LEN {
                    return Err(serde::de::Error::custom("observation exceeds 192 bits"));
                }
                let value = BigInt::from_signed_bytes_be(&bytes);
                Observation::new(value).map_err(serde::de::Error::custom)
            }
        }
    }
}
