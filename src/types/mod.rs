//! Core type definitions for braidnode.
//!
//! All fundamental types are defined here with explicit byte layouts
//! and invariant documentation.

pub mod block;
pub mod event;
pub mod transaction;
pub mod units;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// 32-byte content hash identifying a block or transaction.
///
/// Ordered lexicographically over its bytes; the coloring pass relies on
/// this for deterministic tie-breaking between blocks at equal depth.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| HexError::InvalidHex)?;
        if bytes.len() != 32 {
            return Err(HexError::BadLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Ethereum-compatible 20-byte address.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| HexError::InvalidHex)?;
        if bytes.len() != 20 {
            return Err(HexError::BadLength {
                expected: 20,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Malformed hex input at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("invalid hex string")]
    InvalidHex,

    #[error("expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },
}

// ============================================================================
// NUMERIC TYPES
// ============================================================================

/// 256-bit unsigned integer for EVM compatibility.
///
/// Little-endian u64 limbs. Hand-rolled rather than pulled from
/// `primitive-types` to keep the arithmetic the executor depends on in
/// one auditable place.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0, 0, 0, 0]);
    pub const ONE: U256 = U256([1, 0, 0, 0]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(val: u64) -> Self {
        U256([val, 0, 0, 0])
    }

    pub fn from_u128(val: u128) -> Self {
        U256([val as u64, (val >> 64) as u64, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0, 0, 0, 0]
    }

    /// Low 64 bits, discarding the rest.
    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Low 128 bits, discarding the rest.
    pub fn low_u128(&self) -> u128 {
        (self.0[1] as u128) << 64 | self.0[0] as u128
    }

    /// Whether the value fits in a u64.
    pub fn fits_u64(&self) -> bool {
        self.0[1] == 0 && self.0[2] == 0 && self.0[3] == 0
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().rev().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().rev().enumerate() {
            let start = i * 8;
            *limb = u64::from_be_bytes(bytes[start..start + 8].try_into().unwrap());
        }
        U256(limbs)
    }

    /// Interpret up to 32 big-endian bytes as a value (shorter slices are
    /// left-padded with zeros, the EVM word convention).
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        let mut padded = [0u8; 32];
        let n = bytes.len().min(32);
        padded[32 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        U256::from_be_bytes(padded)
    }

    pub fn overflowing_add(self, other: Self) -> (Self, bool) {
        let mut result = [0u64; 4];
        let mut carry = false;
        for i in 0..4 {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            result[i] = sum;
            carry = c1 || c2;
        }
        (U256(result), carry)
    }

    pub fn wrapping_add(self, other: Self) -> Self {
        self.overflowing_add(other).0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        match self.overflowing_add(other) {
            (_, true) => None,
            (v, false) => Some(v),
        }
    }

    pub fn overflowing_sub(self, other: Self) -> (Self, bool) {
        let mut result = [0u64; 4];
        let mut borrow = false;
        for i in 0..4 {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            result[i] = diff;
            borrow = b1 || b2;
        }
        (U256(result), borrow)
    }

    pub fn wrapping_sub(self, other: Self) -> Self {
        self.overflowing_sub(other).0
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        match self.overflowing_sub(other) {
            (_, true) => None,
            (v, false) => Some(v),
        }
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        self.checked_sub(other).unwrap_or(U256::ZERO)
    }

    /// Schoolbook multiplication, truncated to 256 bits.
    pub fn wrapping_mul(self, other: Self) -> Self {
        let mut result = [0u64; 4];
        for i in 0..4 {
            if self.0[i] == 0 {
                continue;
            }
            let mut carry = 0u128;
            for j in 0..4 - i {
                let acc =
                    result[i + j] as u128 + (self.0[i] as u128) * (other.0[j] as u128) + carry;
                result[i + j] = acc as u64;
                carry = acc >> 64;
            }
        }
        U256(result)
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        let mut result = [0u64; 4];
        let mut overflow = false;
        for i in 0..4 {
            if self.0[i] == 0 {
                continue;
            }
            let mut carry = 0u128;
            for j in 0..4 {
                if i + j >= 4 {
                    if other.0[j] != 0 {
                        overflow = true;
                    }
                    continue;
                }
                let acc =
                    result[i + j] as u128 + (self.0[i] as u128) * (other.0[j] as u128) + carry;
                result[i + j] = acc as u64;
                carry = acc >> 64;
            }
            if carry != 0 {
                overflow = true;
            }
        }
        if overflow {
            None
        } else {
            Some(U256(result))
        }
    }

    fn bit(&self, index: usize) -> bool {
        self.0[index / 64] >> (index % 64) & 1 == 1
    }

    /// Number of significant bits.
    pub fn bits(&self) -> usize {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i + (64 - self.0[i].leading_zeros() as usize);
            }
        }
        0
    }

    /// Binary long division. Division by zero yields (0, 0), the EVM rule.
    pub fn div_rem(self, divisor: Self) -> (Self, Self) {
        if divisor.is_zero() {
            return (U256::ZERO, U256::ZERO);
        }
        if self < divisor {
            return (U256::ZERO, self);
        }
        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for i in (0..self.bits()).rev() {
            remainder = remainder.shl(1);
            if self.bit(i) {
                remainder.0[0] |= 1;
            }
            if remainder >= divisor {
                remainder = remainder.wrapping_sub(divisor);
                quotient.0[i / 64] |= 1 << (i % 64);
            }
        }
        (quotient, remainder)
    }

    /// Exponentiation by squaring, truncated to 256 bits.
    pub fn wrapping_pow(self, exp: Self) -> Self {
        let mut base = self;
        let mut result = U256::ONE;
        for i in 0..exp.bits() {
            if exp.bit(i) {
                result = result.wrapping_mul(base);
            }
            base = base.wrapping_mul(base);
        }
        result
    }

    pub fn bitand(self, other: Self) -> Self {
        U256([
            self.0[0] & other.0[0],
            self.0[1] & other.0[1],
            self.0[2] & other.0[2],
            self.0[3] & other.0[3],
        ])
    }

    pub fn bitor(self, other: Self) -> Self {
        U256([
            self.0[0] | other.0[0],
            self.0[1] | other.0[1],
            self.0[2] | other.0[2],
            self.0[3] | other.0[3],
        ])
    }

    pub fn bitxor(self, other: Self) -> Self {
        U256([
            self.0[0] ^ other.0[0],
            self.0[1] ^ other.0[1],
            self.0[2] ^ other.0[2],
            self.0[3] ^ other.0[3],
        ])
    }

    pub fn not(self) -> Self {
        U256([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }

    pub fn shl(self, shift: usize) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let limb_shift = shift / 64;
        let bit_shift = shift % 64;
        let mut result = [0u64; 4];
        for i in (limb_shift..4).rev() {
            result[i] = self.0[i - limb_shift] << bit_shift;
            if bit_shift > 0 && i > limb_shift {
                result[i] |= self.0[i - limb_shift - 1] >> (64 - bit_shift);
            }
        }
        U256(result)
    }

    pub fn shr(self, shift: usize) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let limb_shift = shift / 64;
        let bit_shift = shift % 64;
        let mut result = [0u64; 4];
        for i in 0..4 - limb_shift {
            result[i] = self.0[i + limb_shift] >> bit_shift;
            if bit_shift > 0 && i + limb_shift + 1 < 4 {
                result[i] |= self.0[i + limb_shift + 1] << (64 - bit_shift);
            }
        }
        U256(result)
    }

    /// The i-th byte counted from the most significant end (EVM BYTE).
    pub fn byte(&self, index: usize) -> u8 {
        if index >= 32 {
            return 0;
        }
        self.to_be_bytes()[index]
    }

    /// Parse a decimal string.
    pub fn from_dec_str(s: &str) -> Result<Self, NumericError> {
        if s.is_empty() {
            return Err(NumericError::Empty);
        }
        let mut value = U256::ZERO;
        let ten = U256::from_u64(10);
        for c in s.chars() {
            let digit = c.to_digit(10).ok_or(NumericError::InvalidDigit(c))? as u64;
            value = value
                .checked_mul(ten)
                .and_then(|v| v.checked_add(U256::from_u64(digit)))
                .ok_or(NumericError::Overflow)?;
        }
        Ok(value)
    }

    pub fn to_dec_string(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        let mut value = *self;
        let ten = U256::from_u64(10);
        while !value.is_zero() {
            let (q, r) = value.div_rem(ten);
            digits.push(b'0' + r.low_u64() as u8);
            value = q;
        }
        digits.reverse();
        String::from_utf8(digits).expect("ascii digits")
    }

    /// Parse a `0x`-prefixed (or bare) hex quantity of up to 64 digits.
    pub fn from_hex_str(s: &str) -> Result<Self, NumericError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        if raw.is_empty() {
            return Err(NumericError::Empty);
        }
        if raw.len() > 64 {
            return Err(NumericError::Overflow);
        }
        let mut value = U256::ZERO;
        for c in raw.chars() {
            let digit = c.to_digit(16).ok_or(NumericError::InvalidDigit(c))? as u64;
            value = value.shl(4);
            value.0[0] |= digit;
        }
        Ok(value)
    }

    /// Minimal `0x`-prefixed hex quantity (no leading zeros, `0x0` for zero).
    pub fn to_hex_string(&self) -> String {
        if self.is_zero() {
            return "0x0".to_string();
        }
        let full = hex::encode(self.to_be_bytes());
        let trimmed = full.trim_start_matches('0');
        format!("0x{}", trimmed)
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Limbs are little-endian: compare from the most significant.
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl From<u64> for U256 {
    fn from(val: u64) -> Self {
        U256::from_u64(val)
    }
}

impl From<u128> for U256 {
    fn from(val: u128) -> Self {
        U256::from_u128(val)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self.to_hex_string())
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dec_string())
    }
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U256::from_hex_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Numeric parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumericError {
    #[error("empty numeric string")]
    Empty,

    #[error("invalid digit: {0}")]
    InvalidDigit(char),

    #[error("value exceeds 256 bits")]
    Overflow,

    #[error("more than 18 fractional digits")]
    TooManyFractionalDigits,
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Hex serialization of u64 quantities (`0x`-prefixed, minimal digits).
pub mod hex_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim_start_matches("0x");
        u64::from_str_radix(s, 16).map_err(serde::de::Error::custom)
    }
}

/// Hex serialization of byte strings (`0x`-prefixed).
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim_start_matches("0x");
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Compute SHA-256 hash of input bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute Keccak-256 hash (Ethereum standard).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
