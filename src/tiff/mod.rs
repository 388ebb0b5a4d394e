use std::collections::HashSet;
use std::fmt::Display;
use std::io::{self, Read, Seek};

mod endian;
mod error;
mod ifd;
mod tag;

pub use endian::Endian;
pub use error::TiffError;
pub use ifd::Ifd;
pub use tag::{Tag, TagId, TagType};

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Variant {
    Normal,
    Big,
}

impl Variant {
    fn read_offset<R: Read>(&self, endian: Endian, stream: &mut R) -> io::Result<u64> {
        match self {
            Variant::Normal => endian.read::<4, u32>(stream).map(|v| v as u64),
            Variant::Big => endian.read(stream),
        }
    }

    const fn offset_bytesize(&self) -> usize {
        match self {
            Variant::Normal => 4,
            Variant::Big => 8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tiff {
    pub endian: Endian,
    pub variant: Variant,
    pub ifds: Vec<Ifd>,
}

impl Tiff {
    pub fn open<R: Read + Seek>(stream: &mut R) -> Result<Self, TiffError> {
        let mut buf = [0; 4];
        stream.read_exact(&mut buf)?;

        let endian = match &buf[..2] {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        let variant = match &buf[2..4] {
            b"\0*" | b"*\0" => Variant::Normal,
            b"\0+" | b"+\0" => Variant::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        if Variant::Big == variant {
            // BigTIFFs have 4 extra bytes in the header
            let _offset_bytesize: u16 = endian.read(stream)?;
            let _: u16 = endian.read(stream)?;
        }

        let mut ifds = vec![];
        let mut visited = HashSet::new();
        let mut ifd_offset = variant.read_offset(endian, stream)?;
        while ifd_offset != 0 {
            if !visited.insert(ifd_offset) {
                return Err(TiffError::IfdLoop(ifd_offset));
            }
            let (ifd, next_offset) = Ifd::parse(stream, ifd_offset, endian, variant)?;
            ifd_offset = next_offset;
            ifds.push(ifd);
        }

        Ok(Self {
            endian,
            variant,
            ifds,
        })
    }
}

impl Display for Tiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, ifd) in self.ifds.iter().enumerate() {
            writeln!(f, "IFD {i}:")?;
            for tag in ifd.0.iter() {
                match tag.id() {
                    Some(id) => writeln!(f, "\t{id:?} {:?} x{}", tag.datatype, tag.count)?,
                    None => writeln!(f, "\t{} {:?} x{}", tag.code, tag.datatype, tag.count)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Little endian classic TIFF with one IFD holding ImageWidth=7 and BitsPerSample=[8,8,8]
    fn minimal() -> Vec<u8> {
        let mut b = vec![];
        b.extend_from_slice(b"II*\0");
        b.extend_from_slice(&8u32.to_le_bytes());
        b.extend_from_slice(&2u16.to_le_bytes());
        // ImageWidth, SHORT, 1, inline
        b.extend_from_slice(&0x0100u16.to_le_bytes());
        b.extend_from_slice(&3u16.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&[7, 0, 0, 0]);
        // BitsPerSample, SHORT, 3, at offset 38
        b.extend_from_slice(&0x0102u16.to_le_bytes());
        b.extend_from_slice(&3u16.to_le_bytes());
        b.extend_from_slice(&3u32.to_le_bytes());
        b.extend_from_slice(&38u32.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(b.len(), 38);
        b.extend_from_slice(&[8, 0, 8, 0, 8, 0]);
        b
    }

    #[test]
    fn parses_inline_and_offset_tags() {
        let tiff = Tiff::open(&mut Cursor::new(minimal())).unwrap();
        assert_eq!(tiff.endian, Endian::Little);
        assert_eq!(tiff.variant, Variant::Normal);
        assert_eq!(tiff.ifds.len(), 1);
        let ifd = &tiff.ifds[0];
        assert_eq!(ifd.get_tag_value::<u32>(TagId::ImageWidth).unwrap(), 7);
        assert_eq!(
            ifd.get_tag_values::<u16>(TagId::BitsPerSample).unwrap(),
            vec![8, 8, 8]
        );
        assert!(matches!(
            ifd.get_tag(TagId::TileWidth),
            Err(TiffError::MissingTag(TagId::TileWidth))
        ));
    }

    #[test]
    fn truncated_input_is_reported() {
        let bytes = minimal();
        let err = Tiff::open(&mut Cursor::new(&bytes[..30])).unwrap_err();
        assert!(err.is_truncated());
    }

    // Little endian BigTIFF header pointing at an IFD right after it
    fn big_header() -> Vec<u8> {
        let mut b = vec![];
        b.extend_from_slice(b"II+\0");
        b.extend_from_slice(&8u16.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&16u64.to_le_bytes());
        b
    }

    fn big_tag(b: &mut Vec<u8>, code: u16, datatype: u16, count: u64, value: u64) {
        b.extend_from_slice(&code.to_le_bytes());
        b.extend_from_slice(&datatype.to_le_bytes());
        b.extend_from_slice(&count.to_le_bytes());
        b.extend_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn huge_tag_count_fails_without_allocating() {
        let mut b = big_header();
        b.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = Tiff::open(&mut Cursor::new(b)).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn overflowing_value_count_is_invalid() {
        let mut b = big_header();
        b.extend_from_slice(&1u64.to_le_bytes());
        // ImageWidth as LONG8 with 2^62 values
        big_tag(&mut b, 0x0100, 16, 1 << 62, 64);
        b.extend_from_slice(&0u64.to_le_bytes());
        let err = Tiff::open(&mut Cursor::new(b)).unwrap_err();
        assert!(matches!(&err, TiffError::ReadError(e) if e.kind() == io::ErrorKind::InvalidData));
        assert!(!err.is_truncated());
    }

    #[test]
    fn oversized_tag_data_reads_as_truncated() {
        let mut b = big_header();
        b.extend_from_slice(&1u64.to_le_bytes());
        // 1 TiB of ASCII that the stream does not hold
        big_tag(&mut b, 0x010E, 2, 1 << 40, 44);
        b.extend_from_slice(&0u64.to_le_bytes());
        let err = Tiff::open(&mut Cursor::new(b)).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn ifd_chain_loop_is_rejected() {
        let mut b = vec![];
        b.extend_from_slice(b"II*\0");
        b.extend_from_slice(&8u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&8u32.to_le_bytes());
        let err = Tiff::open(&mut Cursor::new(b)).unwrap_err();
        assert!(matches!(err, TiffError::IfdLoop(8)));
    }

    #[test]
    fn rejects_non_tiff() {
        let err = Tiff::open(&mut Cursor::new(b"PNG\0\0\0\0\0".to_vec())).unwrap_err();
        assert!(matches!(err, TiffError::BadMagicBytes));
    }
}
