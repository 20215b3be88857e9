use crate::error::PlatformError;
use crate::spec::{Platform, PlatformDeclaration};

/// Named platform identifiers.
const PLATFORMS: &[(&str, u8)] = &[
    ("windows", 0),
    ("linux", 1),
    ("macos", 2),
    ("ios", 3),
    ("android", 4),
    ("web", 5),
];

/// Named architecture identifiers.
const ARCHS: &[(&str, u8)] = &[
    ("x86", 0),
    ("x86-64", 1),
    ("arm7", 2),
    ("arm64", 3),
    ("wasm", 4),
];

/// Named render API group identifiers.
const RENDER_API_GROUPS: &[(&str, u8)] = &[
    ("gl", 0),
    ("dx", 1),
    ("metal", 2),
    ("vulkan", 3),
];

/// Named render API identifiers.
const RENDER_APIS: &[(&str, u8)] = &[
    ("gles3", 0),
    ("gl4", 1),
    ("dx11", 2),
    ("dx12", 3),
    ("metal2", 4),
    ("vulkan1", 5),
];

/// Named quality levels.
const QUALITY_LEVELS: &[(&str, u8)] = &[("low", 0), ("medium", 1), ("high", 2)];

fn lookup(table: &[(&str, u8)], token: &str) -> Option<u8> {
    table
        .iter()
        .find(|(name, _)| token.eq_ignore_ascii_case(name))
        .map(|&(_, value)| value)
}

/// Parse a platform specification string.
///
/// A bare numeral (`0x` hex prefix, or decimal) is taken as the raw packed
/// bits. Anything else is split on space, comma, colon, semicolon and tab;
/// each recognized token ORs in its field value and unrecognized tokens
/// contribute nothing.
pub fn parse_spec(s: &str) -> Result<Platform, PlatformError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(PlatformError::Empty);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(bits) = u64::from_str_radix(hex, 16) {
            return Ok(Platform::from_bits(bits));
        }
    }
    if let Ok(bits) = s.parse::<u64>() {
        return Ok(Platform::from_bits(bits));
    }

    let mut bits = 0u64;
    for token in s.split([' ', ',', ':', ';', '\t']) {
        if token.is_empty() {
            continue;
        }
        let mut decl = PlatformDeclaration::default();
        if let Some(value) = lookup(PLATFORMS, token) {
            decl.platform = Some(value);
        } else if let Some(value) = lookup(ARCHS, token) {
            decl.arch = Some(value);
        } else if let Some(value) = lookup(RENDER_API_GROUPS, token) {
            decl.render_api_group = Some(value);
        } else if let Some(value) = lookup(RENDER_APIS, token) {
            decl.render_api = Some(value);
        } else if let Some(value) = lookup(QUALITY_LEVELS, token) {
            decl.quality_level = Some(value);
        }
        bits |= Platform::encode(decl).bits();
    }
    Ok(Platform::from_bits(bits))
}
