// https://docs.ogc.org/is/19-008r4/19-008r4.html#_geotiff_tags_for_coordinate_transformations

use super::Endian;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use num_traits::NumCast;

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, TryFromPrimitive, Eq, Hash)]
#[repr(u16)]
pub enum TagId {
    NewSubfileType = 0x00FE,
    ImageWidth = 0x0100,
    ImageHeight = 0x0101,
    BitsPerSample = 0x0102,
    Compression = 0x0103,
    PhotometricInterpretation = 0x0106,
    SamplesPerPixel = 0x0115,
    PlanarConfiguration = 0x011C,
    Predictor = 0x013D,
    TileWidth = 0x0142,
    TileLength = 0x0143,
    TileOffsets = 0x0144,
    TileByteCounts = 0x0145,
    SampleFormat = 0x0153,
    ModelPixelScale = 0x830E,
    ModelTiepoint = 0x8482,
    GeoKeyDirectory = 0x87AF,
    GdalNoData = 0xA481,
}

#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Ifd = 13,
    Long8 = 16,
    SLong8 = 17,
    Ifd8 = 18,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            TagType::Byte | TagType::Ascii | TagType::SByte | TagType::Undefined => 1,
            TagType::Short | TagType::SShort => 2,
            TagType::Long | TagType::SLong | TagType::Float | TagType::Ifd => 4,
            TagType::Rational | TagType::SRational | TagType::Double => 8,
            TagType::Long8 | TagType::SLong8 | TagType::Ifd8 => 8,
            TagType::Unknown => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tag {
    pub code: u16,
    pub datatype: TagType,
    pub count: usize,
    pub data: Vec<u8>,
    pub endian: Endian,
}

impl Tag {
    pub fn id(&self) -> Option<TagId> {
        TagId::try_from(self.code).ok()
    }

    /// All values cast to `T`, `None` if any value does not fit.
    pub fn values<T: NumCast>(&self) -> Option<Vec<T>> {
        self.data
            .chunks_exact(self.datatype.size_in_bytes())
            .map(|chunk| self.decode_one(chunk))
            .collect()
    }

    pub fn value<T: NumCast + Copy>(&self) -> Option<T> {
        self.values().and_then(|v: Vec<T>| v.first().copied())
    }

    pub fn ascii(&self) -> Option<String> {
        match self.datatype {
            TagType::Ascii => String::from_utf8(self.data.clone())
                .ok()
                .map(|s| s.trim_end_matches('\0').to_string()),
            _ => None,
        }
    }

    fn decode_one<T: NumCast>(&self, c: &[u8]) -> Option<T> {
        let e = self.endian;
        match self.datatype {
            TagType::Byte | TagType::Undefined | TagType::Ascii => T::from(c[0]),
            TagType::SByte => T::from(c[0] as i8),
            TagType::Short => T::from(e.decode::<2, u16>(c.try_into().ok()?).ok()?),
            TagType::SShort => T::from(e.decode::<2, i16>(c.try_into().ok()?).ok()?),
            TagType::Long | TagType::Ifd => T::from(e.decode::<4, u32>(c.try_into().ok()?).ok()?),
            TagType::SLong => T::from(e.decode::<4, i32>(c.try_into().ok()?).ok()?),
            TagType::Long8 | TagType::Ifd8 => {
                T::from(e.decode::<8, u64>(c.try_into().ok()?).ok()?)
            }
            TagType::SLong8 => T::from(e.decode::<8, i64>(c.try_into().ok()?).ok()?),
            TagType::Float => T::from(e.decode::<4, f32>(c.try_into().ok()?).ok()?),
            TagType::Double => T::from(e.decode::<8, f64>(c.try_into().ok()?).ok()?),
            TagType::Rational => {
                let n = e.decode::<4, u32>(c[..4].try_into().ok()?).ok()?;
                let d = e.decode::<4, u32>(c[4..].try_into().ok()?).ok()?;
                T::from(n as f64 / d as f64)
            }
            TagType::SRational => {
                let n = e.decode::<4, i32>(c[..4].try_into().ok()?).ok()?;
                let d = e.decode::<4, i32>(c[4..].try_into().ok()?).ok()?;
                T::from(n as f64 / d as f64)
            }
            TagType::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_cast_to_wider_types() {
        let tag = Tag {
            code: TagId::BitsPerSample.into(),
            datatype: TagType::Short,
            count: 2,
            data: vec![16, 0, 8, 0],
            endian: Endian::Little,
        };
        assert_eq!(tag.values::<u32>(), Some(vec![16, 8]));
        assert_eq!(tag.value::<u16>(), Some(16));
        assert_eq!(tag.id(), Some(TagId::BitsPerSample));
    }

    #[test]
    fn negative_values_do_not_cast_to_unsigned() {
        let tag = Tag {
            code: 0,
            datatype: TagType::SShort,
            count: 1,
            data: vec![0xFF, 0xFF],
            endian: Endian::Big,
        };
        assert_eq!(tag.value::<i32>(), Some(-1));
        assert_eq!(tag.value::<u32>(), None);
    }

    #[test]
    fn ascii_strips_terminator() {
        let tag = Tag {
            code: TagId::GdalNoData.into(),
            datatype: TagType::Ascii,
            count: 2,
            data: b"0\0".to_vec(),
            endian: Endian::Little,
        };
        assert_eq!(tag.ascii().as_deref(), Some("0"));
    }
}
