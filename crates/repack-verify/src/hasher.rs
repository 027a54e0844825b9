pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// CRC-32 (IEEE) as stored in ZIP records, finalized big-endian.
#[derive(Default)]
pub struct Crc32Hasher(crc32fast::Hasher);

impl Hasher for Crc32Hasher {
    fn update(&mut self, data: &[u8]) { self.0.update(data); }
    fn finalize(self) -> Vec<u8> { Self::encode(self.0.finalize()) }
}

impl Crc32Hasher {
    pub fn new() -> Self { Self(crc32fast::Hasher::new()) }

    pub fn digest(data: &[u8]) -> Vec<u8> { Self::encode(crc32fast::hash(data)) }

    /// Byte form of a stored CRC, comparable with [`Hasher::finalize`].
    pub fn encode(crc: u32) -> Vec<u8> { crc.to_be_bytes().to_vec() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_of_known_input() {
        let mut hasher = Crc32Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hex::decode("0d4a1185").unwrap());
        assert_eq!(Crc32Hasher::digest(b"hello world"), Crc32Hasher::encode(0x0d4a_1185));
    }

    #[test]
    fn crc32_of_nothing_is_zero() {
        assert_eq!(Crc32Hasher::new().finalize(), vec![0, 0, 0, 0]);
    }
}
