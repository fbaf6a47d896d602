//! Persisted Variable Image
//!
//! Binary format of the non-volatile variables as handed to storage.
//! All fields little-endian.
//!
//! # Binary Format
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0x00    8     Reserved (0)
//! 0x08    8     Magic 0x0161566966456255 ("UbEfiVa\x01")
//! 0x10    4     Total length including this header
//! 0x14    4     CRC32 of bytes [0x18, length)
//! 0x18    ...   Entries, each 8-byte aligned
//!
//! Entry:
//! 0x00    4     Data length
//! 0x04    4     Attributes
//! 0x08    8     Time (seconds since the Unix epoch)
//! 0x10    16    Vendor GUID
//! 0x20    N     Name, UTF-16LE, NUL terminated
//!  ...    L     Data
//!               Pad to 8 bytes
//! ```

use alloc::vec::Vec;

use crate::attributes::VarAttributes;
use crate::entry::{align8, VarEntry};
use crate::error::ImageError;
use crate::guid;
use crate::name::VarName;

/// "UbEfiVa\x01" read as a little-endian u64.
pub const IMAGE_MAGIC: u64 = 0x0161_5669_6645_6255;

/// Image header size
pub const IMAGE_HEADER_SIZE: usize = 24;

/// Entry header size (before the name)
pub const ENTRY_HEADER_SIZE: usize = 32;

/// Serialize the non-volatile entries of `entries`, in order.
pub fn encode<'a, I>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a VarEntry>,
{
    let mut image = alloc::vec![0u8; IMAGE_HEADER_SIZE];

    for entry in entries.into_iter().filter(|e| e.is_non_volatile()) {
        image.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        image.extend_from_slice(&entry.attributes.bits().to_le_bytes());
        image.extend_from_slice(&entry.time.to_le_bytes());
        image.extend_from_slice(&entry.vendor.to_bytes());
        for unit in entry.name.units() {
            image.extend_from_slice(&unit.to_le_bytes());
        }
        image.extend_from_slice(&[0, 0]);
        image.extend_from_slice(&entry.data);
        image.resize(align8(image.len()), 0);
    }

    let length = image.len();
    image[0x08..0x10].copy_from_slice(&IMAGE_MAGIC.to_le_bytes());
    image[0x10..0x14].copy_from_slice(&(length as u32).to_le_bytes());
    let crc = crc32(&image[IMAGE_HEADER_SIZE..]);
    image[0x14..0x18].copy_from_slice(&crc.to_le_bytes());
    image
}

/// Validate the header of `buf` and return the image length.
///
/// Does not look at entries.
pub fn check_header(buf: &[u8]) -> Result<usize, ImageError> {
    if buf.len() < IMAGE_HEADER_SIZE {
        return Err(ImageError::Truncated);
    }
    if read_u64(buf, 0x08) != IMAGE_MAGIC {
        return Err(ImageError::BadMagic);
    }
    let length = read_u32(buf, 0x10) as usize;
    if length < IMAGE_HEADER_SIZE || length > buf.len() {
        return Err(ImageError::BadLength);
    }
    Ok(length)
}

/// Parse an image. Any defect rejects the whole image.
pub fn decode(buf: &[u8]) -> Result<Vec<VarEntry>, ImageError> {
    let length = check_header(buf)?;
    let image = &buf[..length];
    if crc32(&image[IMAGE_HEADER_SIZE..]) != read_u32(image, 0x14) {
        return Err(ImageError::BadCrc);
    }

    let mut entries = Vec::new();
    let mut offset = IMAGE_HEADER_SIZE;
    while offset < length {
        let (entry, end) = decode_entry(image, offset)?;
        entries.push(entry);
        offset = align8(end);
    }
    Ok(entries)
}

fn decode_entry(image: &[u8], offset: usize) -> Result<(VarEntry, usize), ImageError> {
    let header = image
        .get(offset..offset + ENTRY_HEADER_SIZE)
        .ok_or(ImageError::BadEntry)?;
    let data_len = read_u32(header, 0x00) as usize;
    let attributes = VarAttributes::from_bits_retain(read_u32(header, 0x04));
    let time = read_u64(header, 0x08);
    let vendor = guid::read(&header[0x10..]).ok_or(ImageError::BadEntry)?;

    let name_start = offset + ENTRY_HEADER_SIZE;
    let mut units = Vec::new();
    let mut pos = name_start;
    loop {
        let pair = image.get(pos..pos + 2).ok_or(ImageError::BadEntry)?;
        pos += 2;
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    if units.is_empty() {
        return Err(ImageError::BadEntry);
    }

    let data = image
        .get(pos..pos + data_len)
        .ok_or(ImageError::BadEntry)?
        .to_vec();
    let entry = VarEntry {
        name: VarName::from_units(&units),
        vendor,
        attributes,
        time,
        data,
    };
    Ok((entry, pos + data_len))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

/// CRC32 (IEEE 802.3, reflected)
pub fn crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = generate_crc32_table();

    let mut crc = 0xFFFF_FFFF;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

const fn generate_crc32_table() -> [u32; 256] {
    const POLYNOMIAL: u32 = 0xEDB8_8320;
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::{Guid, EFI_GLOBAL_VARIABLE, EFI_IMAGE_SECURITY_DATABASE};
    use alloc::vec;

    fn entry(name: &str, vendor: Guid, attributes: VarAttributes, data: &[u8]) -> VarEntry {
        VarEntry {
            name: VarName::from(name),
            vendor,
            attributes,
            time: 0,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_image() {
        let image = encode(&[] as &[VarEntry]);
        assert_eq!(image.len(), IMAGE_HEADER_SIZE);
        assert_eq!(&image[8..16], b"UbEfiVa\x01");
        assert_eq!(decode(&image), Ok(vec![]));
    }

    #[test]
    fn test_roundtrip_skips_volatile() {
        let mut db = entry(
            "db",
            EFI_IMAGE_SECURITY_DATABASE,
            VarAttributes::AUTHENTICATED_NV_BS_RT,
            &[0xaa; 13],
        );
        db.time = 1_700_000_000;
        let entries = vec![
            entry("PlatformLang", EFI_GLOBAL_VARIABLE, VarAttributes::NV_BS_RT, b"en-US\0"),
            entry("SecureBoot", EFI_GLOBAL_VARIABLE, VarAttributes::BS_RT_RO, &[0]),
            db.clone(),
        ];

        let image = encode(&entries);
        assert_eq!(image.len() % 8, 0);
        let restored = decode(&image).unwrap();
        assert_eq!(restored, vec![entries[0].clone(), db]);
    }

    #[test]
    fn test_entry_layout() {
        let image = encode(&[entry("A", EFI_GLOBAL_VARIABLE, VarAttributes::NV_BS_RT, &[9, 8, 7])]);
        let e = &image[IMAGE_HEADER_SIZE..];
        assert_eq!(&e[0..4], &[3, 0, 0, 0]);
        assert_eq!(&e[4..8], &[7, 0, 0, 0]);
        assert_eq!(&e[16..32], &EFI_GLOBAL_VARIABLE.to_bytes());
        assert_eq!(&e[32..36], &[b'A', 0, 0, 0]);
        assert_eq!(&e[36..39], &[9, 8, 7]);
        assert_eq!(image.len(), IMAGE_HEADER_SIZE + 40);
    }

    #[test]
    fn test_rejects_corruption() {
        let image = encode(&[entry("A", EFI_GLOBAL_VARIABLE, VarAttributes::NV_BS_RT, &[1])]);

        let mut bad = image.clone();
        bad[IMAGE_HEADER_SIZE + 36] ^= 0xff;
        assert_eq!(decode(&bad), Err(ImageError::BadCrc));

        let mut bad = image.clone();
        bad[8] = 0;
        assert_eq!(decode(&bad), Err(ImageError::BadMagic));

        let mut bad = image.clone();
        bad[0x10..0x14].copy_from_slice(&4096u32.to_le_bytes());
        assert_eq!(decode(&bad), Err(ImageError::BadLength));

        assert_eq!(decode(&image[..10]), Err(ImageError::Truncated));
    }

    #[test]
    fn test_rejects_overrunning_entry() {
        let mut image = encode(&[entry("A", EFI_GLOBAL_VARIABLE, VarAttributes::NV_BS_RT, &[1])]);
        // Claim more data than the image holds, then fix the CRC.
        image[IMAGE_HEADER_SIZE..IMAGE_HEADER_SIZE + 4].copy_from_slice(&64u32.to_le_bytes());
        let crc = crc32(&image[IMAGE_HEADER_SIZE..]);
        image[0x14..0x18].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(decode(&image), Err(ImageError::BadEntry));
    }
}
