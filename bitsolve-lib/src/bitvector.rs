// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! This module defines a concrete bitvector type [BitVector] that can
//! represent bitvectors of width 1 up to 64. All arithmetic is
//! modular in the width of the operands, and binary operations
//! require both operands to have the same width.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Sub};

use crate::error::Error;

pub const MAX_WIDTH: u32 = 64;

macro_rules! write_bits {
    ($f: expr, $bits: expr, $len: expr) => {{
        if $len == 4 {
            write!($f, "{:x}", $bits & 0xF)?
        } else if $len % 4 == 0 {
            for i in (0..($len / 4)).rev() {
                write!($f, "{:x}", ($bits >> (i * 4)) & 0xF)?;
            }
        } else {
            for i in (0..$len).rev() {
                write!($f, "{:b}", ($bits >> i) & 0b1)?;
            }
        }
        Ok(())
    }};
}

/// Zero every bit of `bits` at index `len` or above.
#[inline(always)]
pub fn bzhi_u64(bits: u64, len: u32) -> u64 {
    let lt64_mask = ((len < 64) as u64).wrapping_neg();
    bits & (1u64.wrapping_shl(len) & lt64_mask).wrapping_sub(1)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    len: u32,
    bits: u64,
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len % 4 == 0 {
            write!(f, "#x")?
        } else {
            write!(f, "#b")?
        }
        write_bits!(f, self.bits, self.len)
    }
}

impl Not for BitVector {
    type Output = BitVector;

    fn not(self) -> Self::Output {
        BitVector { len: self.len, bits: bzhi_u64(!self.bits, self.len) }
    }
}

impl BitXor for BitVector {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: self.bits ^ rhs.bits }
    }
}

impl BitOr for BitVector {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: self.bits | rhs.bits }
    }
}

impl BitAnd for BitVector {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: self.bits & rhs.bits }
    }
}

impl Neg for BitVector {
    type Output = BitVector;

    fn neg(self) -> Self::Output {
        BitVector { len: self.len, bits: bzhi_u64(self.bits.wrapping_neg(), self.len) }
    }
}

impl Add<BitVector> for BitVector {
    type Output = BitVector;

    fn add(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: bzhi_u64(self.bits.wrapping_add(rhs.bits), self.len) }
    }
}

impl Sub<BitVector> for BitVector {
    type Output = BitVector;

    fn sub(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: bzhi_u64(self.bits.wrapping_sub(rhs.bits), self.len) }
    }
}

impl Mul<BitVector> for BitVector {
    type Output = BitVector;

    fn mul(self, rhs: Self) -> Self::Output {
        debug_assert!(self.len == rhs.len);
        BitVector { len: self.len, bits: bzhi_u64(self.bits.wrapping_mul(rhs.bits), self.len) }
    }
}

/// Bitvectors are ordered as unsigned integers. Comparing bitvectors
/// of different widths orders them by width first.
impl Ord for BitVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len.cmp(&other.len).then(self.bits.cmp(&other.bits))
    }
}

impl PartialOrd for BitVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl BitVector {
    pub fn new(bits: u64, len: u32) -> Self {
        assert!(len > 0 && len <= MAX_WIDTH);
        BitVector { len, bits: bzhi_u64(bits, len) }
    }

    /// Like [BitVector::new], but reports unsupported widths as an
    /// error rather than panicking.
    pub fn try_new(bits: u64, len: u32) -> Result<Self, Error> {
        if len == 0 || len > MAX_WIDTH {
            Err(Error::Unsupported(format!("bitvector width {} (supported widths are 1 to {})", len, MAX_WIDTH)))
        } else {
            Ok(BitVector { len, bits: bzhi_u64(bits, len) })
        }
    }

    pub fn zeros(len: u32) -> Self {
        Self::new(0, len)
    }

    pub fn one(len: u32) -> Self {
        Self::new(1, len)
    }

    pub fn ones(len: u32) -> Self {
        Self::new(u64::MAX, len)
    }

    pub fn from_bool(b: bool) -> Self {
        BitVector { len: 1, bits: b as u64 }
    }

    pub fn len(self) -> u32 {
        self.len
    }

    pub fn to_u64(self) -> u64 {
        self.bits
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub fn is_one(self) -> bool {
        self.bits == 1
    }

    pub fn is_ones(self) -> bool {
        self.bits == bzhi_u64(u64::MAX, self.len)
    }

    /// A width-1 bitvector used as a Boolean.
    pub fn is_true(self) -> bool {
        self.bits & 1 == 1
    }

    pub fn bit(self, n: u32) -> bool {
        n < self.len && (self.bits >> n) & 1 == 1
    }

    pub fn msb(self) -> bool {
        self.bit(self.len - 1)
    }

    pub fn inc(self) -> Self {
        self + Self::one(self.len)
    }

    pub fn dec(self) -> Self {
        self - Self::one(self.len)
    }

    /// Unsigned division, with division by zero giving all ones.
    pub fn udiv(self, rhs: Self) -> Self {
        debug_assert!(self.len == rhs.len);
        match self.bits.checked_div(rhs.bits) {
            Some(q) => BitVector { len: self.len, bits: q },
            None => Self::ones(self.len),
        }
    }

    /// Unsigned remainder, with `x urem 0 = x`.
    pub fn urem(self, rhs: Self) -> Self {
        debug_assert!(self.len == rhs.len);
        match self.bits.checked_rem(rhs.bits) {
            Some(r) => BitVector { len: self.len, bits: r },
            None => self,
        }
    }

    pub fn shl(self, rhs: Self) -> Self {
        if rhs.bits >= self.len as u64 {
            Self::zeros(self.len)
        } else {
            BitVector { len: self.len, bits: bzhi_u64(self.bits << rhs.bits, self.len) }
        }
    }

    pub fn lshr(self, rhs: Self) -> Self {
        if rhs.bits >= self.len as u64 {
            Self::zeros(self.len)
        } else {
            BitVector { len: self.len, bits: self.bits >> rhs.bits }
        }
    }

    pub fn ashr(self, rhs: Self) -> Self {
        let fill = if self.msb() { Self::ones(self.len) } else { Self::zeros(self.len) };
        if rhs.bits >= self.len as u64 {
            fill
        } else {
            let shifted = self.bits >> rhs.bits;
            let top = fill.bits & !bzhi_u64(u64::MAX, self.len - rhs.bits as u32);
            BitVector { len: self.len, bits: shifted | top }
        }
    }

    pub fn ult(self, rhs: Self) -> bool {
        self.bits < rhs.bits
    }

    pub fn slt(self, rhs: Self) -> bool {
        self.signed() < rhs.signed()
    }

    pub fn compare(self, rhs: Self) -> Ordering {
        self.bits.cmp(&rhs.bits)
    }

    pub fn signed(self) -> i64 {
        let shift = 64 - self.len;
        ((self.bits << shift) as i64) >> shift
    }

    /// `self` forms the high bits of the result.
    pub fn concat(self, low: Self) -> Result<Self, Error> {
        let len = self.len + low.len;
        if len > MAX_WIDTH {
            return Err(Error::Unsupported(format!("concatenation of width {}", len)));
        }
        Ok(BitVector { len, bits: (self.bits << low.len) | low.bits })
    }

    pub fn extract(self, hi: u32, lo: u32) -> Self {
        assert!(lo <= hi && hi < self.len);
        Self::new(self.bits >> lo, hi - lo + 1)
    }

    pub fn zero_extend(self, new_len: u32) -> Self {
        assert!(self.len <= new_len && new_len <= MAX_WIDTH);
        BitVector { len: new_len, bits: self.bits }
    }

    pub fn count_leading_zeros(self) -> u32 {
        self.bits.leading_zeros() - (64 - self.len)
    }

    /// Number of bits needed to represent the value as an unsigned
    /// integer.
    pub fn significant_bits(self) -> u32 {
        self.len - self.count_leading_zeros()
    }

    /// True if the unsigned value can be represented in `size` bits.
    pub fn fits_in_size(self, size: u32) -> bool {
        self.significant_bits() <= size
    }

    pub fn fits_in_u64(self) -> bool {
        self.fits_in_size(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bits() {
        assert_eq!(format!("{}", BitVector::zeros(4)), "#x0");
        assert_eq!(format!("{}", BitVector::zeros(8)), "#x00");
        assert_eq!(format!("{}", BitVector::ones(12)), "#xfff");
        assert_eq!(format!("{}", BitVector::new(0xDEAD_BEEF, 32)), "#xdeadbeef");
        assert_eq!(format!("{}", BitVector::new(0b101, 3)), "#b101");
        assert_eq!(format!("{}", BitVector::new(0b001, 3)), "#b001");
    }

    #[test]
    fn test_add_mul() {
        assert_eq!(BitVector::ones(64) + BitVector::one(64), BitVector::zeros(64));
        assert_eq!(BitVector::new(0xFF, 8) + BitVector::new(2, 8), BitVector::new(1, 8));
        assert_eq!(BitVector::new(3, 4) * BitVector::new(7, 4), BitVector::new(5, 4));
        assert_eq!(BitVector::new(3, 4) - BitVector::new(5, 4), BitVector::new(14, 4));
    }

    #[test]
    fn test_neg() {
        assert_eq!(-BitVector::new(0b000, 3), BitVector::new(0b000, 3));
        assert_eq!(-BitVector::new(0b001, 3), BitVector::new(0b111, 3));
        assert_eq!(-BitVector::new(0xFF, 8), BitVector::new(0x1, 8));
        assert_eq!(-BitVector::ones(64), BitVector::one(64));
    }

    #[test]
    fn test_not_is_neg_dec() {
        for bits in 0..16 {
            let bv = BitVector::new(bits, 4);
            assert_eq!(!bv, (-bv).dec())
        }
    }

    #[test]
    fn test_division() {
        assert_eq!(BitVector::new(7, 4).udiv(BitVector::new(2, 4)), BitVector::new(3, 4));
        assert_eq!(BitVector::new(7, 4).udiv(BitVector::zeros(4)), BitVector::ones(4));
        assert_eq!(BitVector::new(7, 4).urem(BitVector::new(2, 4)), BitVector::new(1, 4));
        assert_eq!(BitVector::new(7, 4).urem(BitVector::zeros(4)), BitVector::new(7, 4));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(BitVector::new(0b001, 3).shl(BitVector::new(2, 3)), BitVector::new(0b100, 3));
        assert_eq!(BitVector::new(0b001, 3).shl(BitVector::new(3, 3)), BitVector::new(0b000, 3));
        assert_eq!(BitVector::new(0b100, 3).lshr(BitVector::new(2, 3)), BitVector::new(0b001, 3));
        assert_eq!(BitVector::new(0b100, 3).ashr(BitVector::new(1, 3)), BitVector::new(0b110, 3));
        assert_eq!(BitVector::new(0b100, 3).ashr(BitVector::new(5, 3)), BitVector::new(0b111, 3));
        assert_eq!(BitVector::new(0b010, 3).ashr(BitVector::new(1, 3)), BitVector::new(0b001, 3));
        assert_eq!(BitVector::ones(64).lshr(BitVector::new(63, 64)), BitVector::one(64));
    }

    #[test]
    fn test_comparisons() {
        assert!(BitVector::new(1, 4).ult(BitVector::new(15, 4)));
        assert!(BitVector::new(15, 4).slt(BitVector::new(1, 4)));
        assert_eq!(BitVector::new(15, 4).signed(), -1);
        assert_eq!(BitVector::new(0x8000_0000_0000_0000, 64).signed(), i64::MIN);
    }

    #[test]
    fn test_concat_extract() {
        let bv = BitVector::new(0xA, 4).concat(BitVector::new(0x5, 4)).unwrap();
        assert_eq!(bv, BitVector::new(0xA5, 8));
        assert_eq!(bv.extract(7, 4), BitVector::new(0xA, 4));
        assert_eq!(bv.extract(3, 0), BitVector::new(0x5, 4));
        assert!(BitVector::ones(64).concat(BitVector::one(1)).is_err());
    }

    #[test]
    fn test_bit_counting() {
        assert_eq!(BitVector::new(1, 8).count_leading_zeros(), 7);
        assert_eq!(BitVector::new(0x10, 8).significant_bits(), 5);
        assert!(BitVector::ones(64).fits_in_u64());
        assert!(!BitVector::new(0x100, 16).fits_in_size(8));
        assert!(BitVector::try_new(0, 65).is_err());
    }
}
