//! Fixed-width canonical k-mer encoding.
//!
//! A k-mer is packed two bits per base into `ceil(2k/64)` 64-bit limbs,
//! most-significant limb first, bases left-shifted in as they're read so the
//! most recently added base occupies the low two bits of the last limb.

use crate::error::{CortexError, Result};

/// Maximum k-mer size this encoding supports, odd values only.
pub const MAX_K: usize = 63;
pub const MIN_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Forward,
    Reverse,
}

impl Orientation {
    pub fn as_index(self) -> usize {
        match self {
            Orientation::Forward => 0,
            Orientation::Reverse => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
}

impl Base {
    pub fn from_char(c: u8) -> Option<Base> {
        match c {
            b'A' | b'a' => Some(Base::A),
            b'C' | b'c' => Some(Base::C),
            b'G' | b'g' => Some(Base::G),
            b'T' | b't' => Some(Base::T),
            _ => None,
        }
    }

    pub fn to_char(self) -> u8 {
        match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
        }
    }

    pub fn complement(self) -> Base {
        match self {
            Base::A => Base::T,
            Base::C => Base::G,
            Base::G => Base::C,
            Base::T => Base::A,
        }
    }

    fn from_bits(bits: u64) -> Base {
        match bits & 0b11 {
            0 => Base::A,
            1 => Base::C,
            2 => Base::G,
            _ => Base::T,
        }
    }
}

/// A fixed-width k-mer. `limbs` always has exactly `ceil(2*k/64)` entries;
/// the bits beyond `2*k` in the highest-order limb are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Kmer {
    k: usize,
    limbs: Vec<u64>,
}

fn limbs_for_k(k: usize) -> usize {
    (2 * k).div_ceil(64)
}

/// Mask with the low `2k - 64*(limbs-1)` bits set, used to keep the
/// highest-order limb clamped after a shift.
fn top_limb_mask(k: usize) -> u64 {
    let total_bits = 2 * k;
    let n_limbs = limbs_for_k(k);
    let bits_in_top = total_bits - 64 * (n_limbs - 1);
    if bits_in_top >= 64 {
        u64::MAX
    } else {
        (1u64 << bits_in_top) - 1
    }
}

impl Kmer {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn limbs(&self) -> &[u64] {
        &self.limbs
    }

    /// Build a k-mer from an ASCII DNA string of exactly length `k`.
    pub fn from_ascii(seq: &[u8], k: usize) -> Result<Kmer> {
        if !(MIN_K..=MAX_K).contains(&k) || k % 2 == 0 {
            return Err(CortexError::InvalidArgument(format!(
                "kmer size {k} must be odd and in [{MIN_K}, {MAX_K}]"
            )));
        }
        if seq.len() != k {
            return Err(CortexError::InvalidArgument(format!(
                "expected {k} bases, got {}",
                seq.len()
            )));
        }
        let mut kmer = Kmer {
            k,
            limbs: vec![0u64; limbs_for_k(k)],
        };
        for &c in seq {
            let base = Base::from_char(c).ok_or_else(|| {
                CortexError::InvalidArgument(format!("non-ACGT base byte {c}"))
            })?;
            kmer.push_base_unchecked(base);
        }
        Ok(kmer)
    }

    /// Left-shift-and-append a base: equivalent to sliding the k-mer window
    /// one position forward along the read.
    fn push_base_unchecked(&mut self, base: Base) {
        let mut carry = base as u64;
        for limb in self.limbs.iter_mut().rev() {
            let new_carry = *limb >> 62;
            *limb = (*limb << 2) | carry;
            carry = new_carry;
        }
        let mask = top_limb_mask(self.k);
        self.limbs[0] &= mask;
    }

    pub fn push_base(&self, base: Base) -> Kmer {
        let mut next = self.clone();
        next.push_base_unchecked(base);
        next
    }

    /// Reverse complement: bases in reverse order, each complemented.
    pub fn revcomp(&self) -> Kmer {
        let bases: Vec<Base> = self.bases().map(Base::complement).rev().collect();
        let mut out = Kmer {
            k: self.k,
            limbs: vec![0u64; self.limbs.len()],
        };
        for base in bases {
            out.push_base_unchecked(base);
        }
        out
    }

    /// Iterate bases from the 5' end (first base added) to the 3' end.
    pub fn bases(&self) -> impl DoubleEndedIterator<Item = Base> + '_ {
        let k = self.k;
        (0..k).map(move |i| {
            let bit_pos = 2 * (k - 1 - i);
            let limb_idx_from_end = bit_pos / 64;
            let limb_idx = self.limbs.len() - 1 - limb_idx_from_end;
            let shift = bit_pos % 64;
            Base::from_bits(self.limbs[limb_idx] >> shift)
        })
    }

    pub fn to_ascii(&self) -> Vec<u8> {
        self.bases().map(Base::to_char).collect()
    }

    /// Canonical form: lexicographic min of self and its reverse complement,
    /// plus which orientation produced it.
    pub fn canonical(&self) -> (Kmer, Orientation) {
        let rc = self.revcomp();
        if self.limbs <= rc.limbs {
            (self.clone(), Orientation::Forward)
        } else {
            (rc, Orientation::Reverse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_ascii() {
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        assert_eq!(km.to_ascii(), b"ACGTA");
    }

    #[test]
    fn revcomp_of_palindrome() {
        // ACGT reverse complement is ACGT (k=4 is even and thus invalid, use
        // an odd palindrome-free case instead and check involution).
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let rc = km.revcomp();
        assert_eq!(rc.revcomp(), km);
    }

    #[test]
    fn canonical_is_deterministic_for_either_strand() {
        let fwd = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let rev = fwd.revcomp();
        let (c1, o1) = fwd.canonical();
        let (c2, o2) = rev.canonical();
        assert_eq!(c1, c2);
        assert_ne!(o1, o2);
    }

    #[test]
    fn push_base_slides_window() {
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let next = km.push_base(Base::C);
        assert_eq!(next.to_ascii(), b"CGTAC");
    }

    #[test]
    fn rejects_even_k() {
        assert!(Kmer::from_ascii(b"ACGT", 4).is_err());
    }

    #[test]
    fn rejects_non_acgt() {
        assert!(Kmer::from_ascii(b"ACGTN", 5).is_err());
    }

    #[test]
    fn wide_kmer_roundtrips_across_limb_boundary() {
        let seq = b"ACGTACGTACGTACGTACGTACGTACGTACGTA"; // 34 bases, odd, >32
        let km = Kmer::from_ascii(seq, seq.len()).unwrap();
        assert_eq!(km.to_ascii(), seq.to_vec());
        assert_eq!(km.limbs().len(), limbs_for_k(seq.len()));
    }
}
