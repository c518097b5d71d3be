//! Application descriptor embedded at the start of a firmware image
//!
//! Layout (little endian), starting at [`APP_DESC_OFFSET`]:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 4    | magic word       |
//! | 4      | 4    | secure version   |
//! | 8      | 8    | reserved         |
//! | 16     | 32   | version          |
//! | 48     | 32   | project name     |
//! | 80     | 16   | compile time     |
//! | 96     | 16   | compile date     |
//! | 112    | 32   | SDK version      |
//! | 144    | 32   | ELF SHA-256      |

use otaflow_core::{ImageDescriptor, TransportError};

/// First byte of every valid image
pub const IMAGE_MAGIC: u8 = 0xE9;
/// Descriptor position: image header plus first segment header
pub const APP_DESC_OFFSET: usize = 0x20;
/// Marks a valid descriptor
pub const APP_DESC_MAGIC: u32 = 0xABCD_5432;
/// Bytes of the descriptor that are parsed
pub const APP_DESC_LEN: usize = 176;

/// Bytes needed from the start of the image to parse the descriptor
pub const DESCRIPTOR_PREFIX_LEN: usize = APP_DESC_OFFSET + APP_DESC_LEN;

/// Parse the descriptor from the first bytes of an image
///
/// # Errors
/// `NoDescriptor` if `image` is too short or the magic word does not match.
pub fn parse_app_descriptor(image: &[u8]) -> Result<ImageDescriptor, TransportError> {
    let desc = image
        .get(APP_DESC_OFFSET..DESCRIPTOR_PREFIX_LEN)
        .ok_or_else(|| {
            TransportError::NoDescriptor(format!(
                "image too short: {} of {DESCRIPTOR_PREFIX_LEN} bytes",
                image.len()
            ))
        })?;

    let magic = read_u32(desc, 0);
    if magic != APP_DESC_MAGIC {
        return Err(TransportError::NoDescriptor(format!(
            "bad magic word 0x{magic:08x}"
        )));
    }

    Ok(ImageDescriptor {
        secure_version: read_u32(desc, 4),
        version: c_string(&desc[16..48]),
        project_name: c_string(&desc[48..80]),
        compile_time: c_string(&desc[80..96]),
        compile_date: c_string(&desc[96..112]),
        sdk_version: c_string(&desc[112..144]),
        elf_sha256: hex::encode(&desc[144..176]),
    })
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(word)
}

/// NUL-terminated, possibly unterminated, fixed-width string
fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Build an image prefix carrying a descriptor, for tests
#[cfg(test)]
pub(crate) fn sample_image(version: &str, project: &str, len: usize) -> Vec<u8> {
    fn put(buf: &mut [u8], at: usize, width: usize, value: &str) {
        let bytes = value.as_bytes();
        let n = bytes.len().min(width);
        buf[at..at + n].copy_from_slice(&bytes[..n]);
    }

    let mut image = vec![0u8; len.max(DESCRIPTOR_PREFIX_LEN)];
    image[0] = IMAGE_MAGIC;
    let d = APP_DESC_OFFSET;
    image[d..d + 4].copy_from_slice(&APP_DESC_MAGIC.to_le_bytes());
    image[d + 4..d + 8].copy_from_slice(&3u32.to_le_bytes());
    put(&mut image, d + 16, 32, version);
    put(&mut image, d + 48, 32, project);
    put(&mut image, d + 80, 16, "12:30:00");
    put(&mut image, d + 96, 16, "Oct 19 2026");
    put(&mut image, d + 112, 32, "v5.2.1");
    image[d + 144..d + 176].fill(0xAB);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let image = sample_image("2.0.1", "light-controller", 1024);

        let desc = parse_app_descriptor(&image).unwrap();

        assert_eq!(desc.version, "2.0.1");
        assert_eq!(desc.project_name, "light-controller");
        assert_eq!(desc.secure_version, 3);
        assert_eq!(desc.compile_date, "Oct 19 2026");
        assert_eq!(desc.compile_time, "12:30:00");
        assert_eq!(desc.sdk_version, "v5.2.1");
        assert_eq!(desc.elf_sha256, "ab".repeat(32));
    }

    #[test]
    fn test_full_width_field_without_nul() {
        let long = "x".repeat(40);
        let image = sample_image(&long, "p", 0);

        let desc = parse_app_descriptor(&image).unwrap();

        assert_eq!(desc.version, "x".repeat(32));
    }

    #[test]
    fn test_rejects_short_image() {
        let err = parse_app_descriptor(&[IMAGE_MAGIC; 64]).unwrap_err();
        assert!(matches!(err, TransportError::NoDescriptor(_)));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut image = sample_image("1.0.0", "p", 0);
        image[APP_DESC_OFFSET] ^= 0xFF;

        let err = parse_app_descriptor(&image).unwrap_err();
        assert!(err.to_string().contains("bad magic word"));
    }
}
