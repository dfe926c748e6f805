//! Application-image descriptor inspection.
//!
//! An ESP application image starts with a fixed header (24 bytes), one
//! segment header (8 bytes), and then the application descriptor: magic
//! word, secure version, and fixed-width `version` / `project_name`
//! strings. Everything we need sits inside the first flash page, so the
//! fetch path can classify a download from its first chunk — before a
//! single byte hits the inactive slot.

/// First byte of every ESP application image.
pub const IMAGE_MAGIC: u8 = 0xE9;
/// Offset of the app descriptor from the start of the image.
pub const APP_DESC_OFFSET: usize = 0x20;
/// Magic word opening the app descriptor.
pub const APP_DESC_MAGIC: u32 = 0xABCD_5432;
/// Bytes required to read both descriptor strings.
pub const APP_DESC_MIN_PREFIX: usize = APP_DESC_OFFSET + 16 + 32 + 32;

const VERSION_OFFSET: usize = APP_DESC_OFFSET + 16;
const PROJECT_OFFSET: usize = VERSION_OFFSET + 32;

/// Identity strings carried by a firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub version: heapless::String<32>,
    pub project_name: heapless::String<32>,
}

/// Parse the descriptor out of an image prefix. Returns `None` when the
/// prefix is too short, is not an application image, or carries no
/// descriptor magic.
pub fn parse_app_descriptor(prefix: &[u8]) -> Option<AppDescriptor> {
    if prefix.len() < APP_DESC_MIN_PREFIX {
        return None;
    }
    if prefix[0] != IMAGE_MAGIC {
        return None;
    }
    let magic = u32::from_le_bytes([
        prefix[APP_DESC_OFFSET],
        prefix[APP_DESC_OFFSET + 1],
        prefix[APP_DESC_OFFSET + 2],
        prefix[APP_DESC_OFFSET + 3],
    ]);
    if magic != APP_DESC_MAGIC {
        return None;
    }
    Some(AppDescriptor {
        version: fixed_str(&prefix[VERSION_OFFSET..VERSION_OFFSET + 32])?,
        project_name: fixed_str(&prefix[PROJECT_OFFSET..PROJECT_OFFSET + 32])?,
    })
}

/// Decode a NUL-padded fixed-width field.
fn fixed_str(field: &[u8]) -> Option<heapless::String<32>> {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let s = core::str::from_utf8(&field[..len]).ok()?;
    heapless::String::try_from(s).ok()
}
