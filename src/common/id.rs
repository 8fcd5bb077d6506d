//! Node Id or a lookup target in the 160-bit XOR metric space.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use rand::Rng;

/// The size of ids in bytes.
pub const ID_SIZE: usize = 20;
/// The size of ids in bits.
pub const ID_BITS: u8 = (ID_SIZE * 8) as u8;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash)]
/// Node Id or a lookup target.
///
/// Ids are compared as big-endian unsigned integers, so the [Ord] of two
/// [xor](Id::xor) results is the total order over XOR distances.
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; ID_SIZE] = rng.gen();

        Id(random_bytes)
    }

    /// Derive an [Id] from a unique input, a peer's transport address or a
    /// resource key string, by hashing it with SHA-1.
    pub fn derive(input: &str) -> Id {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(input.as_bytes());

        Id(hasher.digest().bytes())
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id, InvalidId> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(InvalidId::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp[..ID_SIZE].clone_from_slice(&bytes[..ID_SIZE]);

        Ok(Id(tmp))
    }

    /// The XOR of this Id and `other`, which read as a big-endian unsigned
    /// integer is the Kademlia distance between the two.
    pub fn xor(&self, other: &Id) -> Id {
        let mut result = [0_u8; ID_SIZE];

        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }

        Id(result)
    }

    /// The 0-indexed position, counted from the most significant bit, of the
    /// highest bit set in `self XOR other`, or `None` if the two are equal.
    pub fn first_differing_bit(&self, other: &Id) -> Option<u8> {
        for i in 0..ID_SIZE {
            let xor = self.0[i] ^ other.0[i];

            if xor != 0 {
                return Some(i as u8 * 8 + xor.leading_zeros() as u8);
            }
        }

        None
    }

    /// Simplified XOR distance between this Id and `other`: the bit length of
    /// their XOR, used as the routing table bucket index.
    ///
    /// Distance to self is 0.
    /// Distance to the furthest Id is 160.
    /// Distance to an Id with 5 leading matching bits is 155.
    pub fn distance(&self, other: &Id) -> u8 {
        self.first_differing_bit(other)
            .map(|bit| ID_BITS - bit)
            .unwrap_or(0)
    }

    /// Total order over `a` and `b` by their XOR distance to this Id.
    pub fn cmp_by_distance(&self, a: &Id, b: &Id) -> std::cmp::Ordering {
        a.xor(self).cmp(&b.xor(self))
    }

    /// Generate a random Id whose [distance](Id::distance) to this Id is
    /// exactly `bucket`, by copying this Id up to the differing bit, flipping
    /// that bit, and filling the lower-order bits randomly.
    ///
    /// Used to refresh a specific routing table bucket; `bucket` must be in
    /// `1..=160`.
    pub fn random_in_bucket(&self, bucket: u8) -> Id {
        debug_assert!((1..=ID_BITS).contains(&bucket));

        let flipped_bit = (ID_BITS - bucket) as usize;
        let byte = flipped_bit / 8;
        let bit = flipped_bit % 8;

        let mut rng = rand::thread_rng();
        let mut bytes: [u8; ID_SIZE] = rng.gen();

        bytes[..byte].copy_from_slice(&self.0[..byte]);

        let prefix_mask = !(0xff_u8 >> bit);
        let suffix_mask = 0x7f_u8 >> bit;
        let flip = 0x80_u8 >> bit;

        bytes[byte] =
            (self.0[byte] & prefix_mask) | ((self.0[byte] ^ flip) & flip) | (bytes[byte] & suffix_mask);

        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl FromStr for Id {
    type Err = InvalidId;

    /// Parse an Id from its fixed-width (40 characters) hex encoding.
    fn from_str(s: &str) -> Result<Id, InvalidId> {
        if s.len() != ID_SIZE * 2 {
            return Err(InvalidId::InvalidIdEncoding);
        }

        let mut bytes = [0_u8; ID_SIZE];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidId::InvalidIdEncoding)?;
        }

        Ok(Id(bytes))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors constructing an [Id] from external input.
pub enum InvalidId {
    /// Expected [ID_SIZE] bytes.
    #[error("Invalid id size, expected {ID_SIZE} bytes, got {0}")]
    InvalidIdSize(usize),

    /// Expected a fixed-width hex string of `2 * ID_SIZE` characters.
    #[error("Invalid id encoding, expected {} hex characters", ID_SIZE * 2)]
    InvalidIdEncoding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert_eq!(
            Id::from_bytes([0_u8; 7]),
            Err(InvalidId::InvalidIdSize(7))
        );
        assert_eq!(
            Id::from_bytes([0_u8; 21]),
            Err(InvalidId::InvalidIdSize(21))
        );
        assert!(Id::from_bytes([0_u8; ID_SIZE]).is_ok());
    }

    #[test]
    fn distance_to_self_is_zero() {
        for _ in 0..10 {
            let id = Id::random();

            assert_eq!(id.first_differing_bit(&id), None);
            assert_eq!(id.distance(&id), 0);
            assert_eq!(id.xor(&id), Id([0; ID_SIZE]));
        }
    }

    #[test]
    fn distance_is_symmetric() {
        for _ in 0..10 {
            let a = Id::random();
            let b = Id::random();

            assert_eq!(a.xor(&b), b.xor(&a));
            assert_eq!(a.distance(&b), b.distance(&a));
            assert_eq!(a.first_differing_bit(&b), b.first_differing_bit(&a));
        }
    }

    #[test]
    fn first_differing_bit_position() {
        let zero = Id([0; ID_SIZE]);

        let mut highest = [0_u8; ID_SIZE];
        highest[0] = 0b1000_0000;
        assert_eq!(zero.first_differing_bit(&Id(highest)), Some(0));
        assert_eq!(zero.distance(&Id(highest)), 160);

        let mut lowest = [0_u8; ID_SIZE];
        lowest[ID_SIZE - 1] = 1;
        assert_eq!(zero.first_differing_bit(&Id(lowest)), Some(159));
        assert_eq!(zero.distance(&Id(lowest)), 1);
    }

    #[test]
    fn hex_roundtrip() {
        let id = Id::random();
        let hex = id.to_string();

        assert_eq!(hex.len(), 40);
        assert_eq!(hex.parse::<Id>(), Ok(id));
    }

    #[test]
    fn hex_rejects_malformed() {
        assert!("deadbeef".parse::<Id>().is_err());
        assert!("zz".repeat(20).parse::<Id>().is_err());
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(Id::derive("+15550100"), Id::derive("+15550100"));
        assert_ne!(Id::derive("+15550100"), Id::derive("+15550101"));
    }

    #[test]
    fn random_in_bucket_lands_in_bucket() {
        let id = Id::random();

        for bucket in [1, 7, 8, 9, 64, 159, 160] {
            let target = id.random_in_bucket(bucket);

            assert_eq!(id.distance(&target), bucket);
        }
    }

    #[test]
    fn random_in_bucket_flips_a_set_boundary_bit() {
        // Boundary bits that are already 1 in self must end up 0 in the
        // target, otherwise the target falls into a lower bucket.
        let id = Id([0xff; ID_SIZE]);

        for bucket in 1..=ID_BITS {
            let target = id.random_in_bucket(bucket);

            assert_eq!(id.distance(&target), bucket, "bucket {}", bucket);
        }
    }
}
