use eio::{FromBytes, ReadExt, ToBytes};
use std::io::{Read, Result};

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn read<const N: usize, T: FromBytes<N>>(&self, stream: &mut impl Read) -> Result<T> {
        let mut buf = [0u8; N];
        stream.read_exact(&mut buf)?;
        self.decode(buf)
    }

    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// Decode consecutive values, `None` if `bytes` is not a whole number of values.
    pub fn decode_all<const N: usize, T: FromBytes<N>>(&self, bytes: &[u8]) -> Option<Vec<T>> {
        if bytes.len() % N != 0 {
            return None;
        }
        bytes
            .chunks_exact(N)
            .map(|chunk| {
                chunk
                    .try_into()
                    .ok()
                    .and_then(|arr| self.decode::<N, T>(arr).ok())
            })
            .collect()
    }

    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_respects_byte_order() {
        let bytes = [0x01, 0x02];
        assert_eq!(Endian::Little.decode::<2, u16>(bytes).unwrap(), 0x0201);
        assert_eq!(Endian::Big.decode::<2, u16>(bytes).unwrap(), 0x0102);
    }

    #[test]
    fn decode_all_rejects_partial_values() {
        let bytes = [0, 1, 0, 2];
        assert_eq!(Endian::Big.decode_all::<2, u16>(&bytes), Some(vec![1, 2]));
        assert_eq!(Endian::Big.decode_all::<2, u16>(&bytes[..3]), None);
    }

    #[test]
    fn encode_matches_decode() {
        let bytes = Endian::Big.encode(1.5_f32);
        assert_eq!(Endian::Big.decode::<4, f32>(bytes).unwrap(), 1.5);
    }
}
