use super::{Endian, Tag, TagId, TagType, TiffError, Variant};
use num_traits::NumCast;
use std::io::{self, Read, Seek, SeekFrom};

// Upper bound on up-front allocation for counts read from the file
const MAX_PREALLOC: usize = 4096;

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[derive(Clone, Debug)]
pub struct Ifd(pub Vec<Tag>);

impl Ifd {
    pub fn parse<R: Read + Seek>(
        stream: &mut R,
        offset: u64,
        endian: Endian,
        variant: Variant,
    ) -> io::Result<(Ifd, u64)> {
        stream.seek(SeekFrom::Start(offset))?;

        let tag_count = match variant {
            Variant::Normal => endian.read::<2, u16>(stream)? as u64,
            Variant::Big => endian.read(stream)?,
        };

        let mut tags = Vec::with_capacity(tag_count.min(MAX_PREALLOC as u64) as usize);
        for _ in 0..tag_count {
            let code = endian.read(stream)?;
            let datatype: TagType = endian.read::<2, u16>(stream)?.into();
            let raw_count = variant.read_offset(endian, stream)?;

            let data_size = usize::try_from(raw_count)
                .ok()
                .and_then(|count| count.checked_mul(datatype.size_in_bytes()))
                .ok_or_else(|| invalid(format!("tag {code} count {raw_count} too large")))?;
            let count = raw_count as usize;
            let offset_size = variant.offset_bytesize();

            let data = if data_size > offset_size {
                // Value lives elsewhere in the file
                let data_offset = variant.read_offset(endian, stream)?;
                let pos = stream.stream_position()?;
                stream.seek(SeekFrom::Start(data_offset))?;
                // Only allocate what the stream actually holds
                let mut data = Vec::with_capacity(data_size.min(MAX_PREALLOC));
                (&mut *stream).take(data_size as u64).read_to_end(&mut data)?;
                if data.len() < data_size {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("tag {code} data ends after {} of {data_size} bytes", data.len()),
                    ));
                }
                stream.seek(SeekFrom::Start(pos))?;
                data
            } else {
                let mut data = vec![0; offset_size];
                stream.read_exact(&mut data)?;
                data.truncate(data_size);
                data
            };

            tags.push(Tag {
                code,
                datatype,
                count,
                data,
                endian,
            });
        }

        let next_ifd_offset = variant.read_offset(endian, stream)?;
        Ok((Ifd(tags), next_ifd_offset))
    }

    pub fn get_tag(&self, id: TagId) -> Result<&Tag, TiffError> {
        let code: u16 = id.into();
        self.0
            .iter()
            .find(|tag| tag.code == code)
            .ok_or(TiffError::MissingTag(id))
    }

    pub fn get_tag_values<T: NumCast>(&self, id: TagId) -> Result<Vec<T>, TiffError> {
        self.get_tag(id)?.values().ok_or(TiffError::BadTag(id))
    }

    pub fn get_tag_value<T: NumCast + Copy>(&self, id: TagId) -> Result<T, TiffError> {
        self.get_tag(id)?.value().ok_or(TiffError::BadTag(id))
    }

    /// Tag value or `default` when absent.
    pub fn tag_value_or<T: NumCast + Copy>(&self, id: TagId, default: T) -> Result<T, TiffError> {
        match self.get_tag(id) {
            Ok(tag) => tag.value().ok_or(TiffError::BadTag(id)),
            Err(_) => Ok(default),
        }
    }
}
