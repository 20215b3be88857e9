use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::parse;

/* Field layout, least significant byte first

bits     field
0-7      platform
8-15     architecture
16-23    render api group
24-31    render api
32-39    quality level
40-47    custom

Each byte stores value+1; an all-zero byte means the field is a wildcard.
*/

/// One 8-bit field of the packed variant, ordered least to most specific.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Field {
    Platform,
    Arch,
    RenderApiGroup,
    RenderApi,
    QualityLevel,
    Custom,
}

impl Field {
    /// All fields, most specific first (the reduction precedence order).
    pub(crate) const MOST_SPECIFIC_FIRST: [Field; 6] = [
        Field::Custom,
        Field::QualityLevel,
        Field::RenderApi,
        Field::RenderApiGroup,
        Field::Arch,
        Field::Platform,
    ];

    pub(crate) const fn shift(self) -> u64 {
        match self {
            Field::Platform => 0,
            Field::Arch => 8,
            Field::RenderApiGroup => 16,
            Field::RenderApi => 24,
            Field::QualityLevel => 32,
            Field::Custom => 40,
        }
    }

    pub(crate) const fn mask(self) -> u64 {
        0xff << self.shift()
    }
}

/// Largest encodable field value. Values are stored as `value + 1`, so the
/// stored byte never exceeds 254 and zero stays reserved for wildcards.
pub const FIELD_MAX: u8 = 253;

/// Decomposed platform variant declaration.
///
/// `None` fields are wildcards: they match any value in that dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDeclaration {
    pub platform: Option<u8>,
    pub arch: Option<u8>,
    pub render_api_group: Option<u8>,
    pub render_api: Option<u8>,
    pub quality_level: Option<u8>,
    pub custom: Option<u8>,
}

impl PlatformDeclaration {
    fn field(&self, field: Field) -> Option<u8> {
        match field {
            Field::Platform => self.platform,
            Field::Arch => self.arch,
            Field::RenderApiGroup => self.render_api_group,
            Field::RenderApi => self.render_api,
            Field::QualityLevel => self.quality_level,
            Field::Custom => self.custom,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut Option<u8> {
        match field {
            Field::Platform => &mut self.platform,
            Field::Arch => &mut self.arch,
            Field::RenderApiGroup => &mut self.render_api_group,
            Field::RenderApi => &mut self.render_api,
            Field::QualityLevel => &mut self.quality_level,
            Field::Custom => &mut self.custom,
        }
    }
}

/// Bit-packed platform variant.
///
/// Serializes as the raw `u64`; displays as hex.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Platform(u64);

impl Platform {
    /// The full wildcard: matches every variant, matched by every request.
    pub const WILDCARD: Platform = Platform(0);

    /// Pack a declaration.
    ///
    /// Fields outside `[0, FIELD_MAX]` are treated as wildcards.
    pub fn encode(decl: PlatformDeclaration) -> Self {
        let mut bits = 0u64;
        for field in Field::MOST_SPECIFIC_FIRST {
            if let Some(value) = decl.field(field) {
                if value <= FIELD_MAX {
                    bits |= ((value as u64) + 1) << field.shift();
                }
            }
        }
        Self(bits)
    }

    /// Unpack into a declaration. Zero bytes decode as wildcards.
    pub fn decompose(self) -> PlatformDeclaration {
        let mut decl = PlatformDeclaration::default();
        for field in Field::MOST_SPECIFIC_FIRST {
            let stored = ((self.0 & field.mask()) >> field.shift()) as u8;
            if stored != 0 {
                *decl.field_mut(field) = Some(stored - 1);
            }
        }
        decl
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_wildcard(self) -> bool {
        self.0 == 0
    }

    /// Specificity partial order: `true` when every field set in
    /// `reference` is set to the identical value in `self`. Fields unset in
    /// `reference` impose no constraint. Evaluated independently per field.
    pub fn is_equal_or_more_specific(self, reference: Platform) -> bool {
        Field::MOST_SPECIFIC_FIRST.iter().all(|field| {
            let ref_bits = reference.0 & field.mask();
            ref_bits == 0 || (self.0 & field.mask()) == ref_bits
        })
    }

    /// Strip the most specific set field, stepping one level towards the
    /// full wildcard. Returns [`Platform::WILDCARD`] once every field is
    /// stripped; repeated calls from any value reach the wildcard in at
    /// most six steps.
    ///
    /// `full_platform` is the specifier the caller started the reduction
    /// chain from; fields the chain never contained are ignored.
    pub fn reduce(self, full_platform: Platform) -> Self {
        let bits = self.0 & full_platform.0;
        for field in Field::MOST_SPECIFIC_FIRST {
            if bits & field.mask() != 0 {
                return Self(bits & !field.mask());
            }
        }
        Self::WILDCARD
    }

    /// Iterator over the fallback chain: this platform, then each
    /// reduction, ending with the full wildcard.
    pub fn fallback_chain(self) -> FallbackChain {
        FallbackChain {
            full: self,
            next: Some(self),
        }
    }
}

/// Iterator produced by [`Platform::fallback_chain`].
pub struct FallbackChain {
    full: Platform,
    next: Option<Platform>,
}

impl Iterator for FallbackChain {
    type Item = Platform;

    fn next(&mut self) -> Option<Platform> {
        let current = self.next?;
        self.next = if current.is_wildcard() {
            None
        } else {
            Some(current.reduce(self.full))
        };
        Some(current)
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    /// Parse a platform specification: either a bare numeral (hex with a
    /// `0x` prefix, or decimal) taken as the raw bits, or a token list.
    fn from_str(s: &str) -> Result<Self, PlatformError> {
        parse::parse_spec(s)
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Platform({:#x})", self.0)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decl(
        platform: Option<u8>,
        arch: Option<u8>,
        render_api_group: Option<u8>,
        render_api: Option<u8>,
        quality_level: Option<u8>,
        custom: Option<u8>,
    ) -> PlatformDeclaration {
        PlatformDeclaration {
            platform,
            arch,
            render_api_group,
            render_api,
            quality_level,
            custom,
        }
    }

    #[test]
    fn empty_declaration_encodes_to_wildcard() {
        assert_eq!(
            Platform::encode(PlatformDeclaration::default()),
            Platform::WILDCARD
        );
    }

    #[test]
    fn encode_stores_value_plus_one() {
        let p = Platform::encode(decl(Some(0), None, None, None, None, None));
        assert_eq!(p.bits(), 0x01);
        let p = Platform::encode(decl(None, None, None, None, None, Some(4)));
        assert_eq!(p.bits(), 0x05u64 << 40);
    }

    #[test]
    fn out_of_range_field_is_wildcard() {
        let p = Platform::encode(decl(Some(254), None, None, None, None, None));
        assert_eq!(p, Platform::WILDCARD);
        let p = Platform::encode(decl(Some(FIELD_MAX), None, None, None, None, None));
        assert_eq!(p.bits(), 254);
    }

    #[test]
    fn wildcard_reference_accepts_everything() {
        let specific = Platform::encode(decl(Some(3), Some(1), Some(2), Some(7), Some(1), Some(9)));
        assert!(specific.is_equal_or_more_specific(Platform::WILDCARD));
        assert!(Platform::WILDCARD.is_equal_or_more_specific(Platform::WILDCARD));
    }

    #[test]
    fn specificity_requires_exact_field_match() {
        let win = Platform::encode(decl(Some(1), None, None, None, None, None));
        let win_x64 = Platform::encode(decl(Some(1), Some(2), None, None, None, None));
        let mac = Platform::encode(decl(Some(2), None, None, None, None, None));

        assert!(win_x64.is_equal_or_more_specific(win));
        assert!(!win.is_equal_or_more_specific(win_x64));
        assert!(!mac.is_equal_or_more_specific(win));
        assert!(win.is_equal_or_more_specific(win));
    }

    #[test]
    fn specificity_checks_fields_independently() {
        // Same arch, different platform: not compatible.
        let a = Platform::encode(decl(Some(1), Some(2), None, None, None, None));
        let b = Platform::encode(decl(Some(3), Some(2), None, None, None, None));
        assert!(!a.is_equal_or_more_specific(b));
    }

    #[test]
    fn reduce_strips_most_specific_first() {
        let full = Platform::encode(decl(Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)));
        let step1 = full.reduce(full);
        assert_eq!(
            step1.decompose(),
            decl(Some(1), Some(2), Some(3), Some(4), Some(5), None)
        );
        let step2 = step1.reduce(full);
        assert_eq!(
            step2.decompose(),
            decl(Some(1), Some(2), Some(3), Some(4), None, None)
        );
    }

    #[test]
    fn reduce_reaches_wildcard_in_at_most_six_steps() {
        let full = Platform::encode(decl(Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)));
        let mut current = full;
        let mut steps = 0;
        while !current.is_wildcard() {
            let reduced = current.reduce(full);
            // Exactly one previously-set field stripped per step.
            let diff = current.bits() ^ reduced.bits();
            let fields_changed = (0..6).filter(|i| diff & (0xffu64 << (i * 8)) != 0).count();
            assert_eq!(fields_changed, 1);
            assert!(reduced.bits() < current.bits());
            current = reduced;
            steps += 1;
            assert!(steps <= 6);
        }
        assert_eq!(steps, 6);
    }

    #[test]
    fn reduce_of_wildcard_stays_wildcard() {
        assert_eq!(
            Platform::WILDCARD.reduce(Platform::WILDCARD),
            Platform::WILDCARD
        );
    }

    #[test]
    fn fallback_chain_ends_with_wildcard() {
        let p = Platform::encode(decl(Some(1), None, None, None, Some(2), None));
        let chain: Vec<Platform> = p.fallback_chain().collect();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], p);
        assert_eq!(
            chain[1],
            Platform::encode(decl(Some(1), None, None, None, None, None))
        );
        assert_eq!(chain[2], Platform::WILDCARD);
    }

    #[test]
    fn display_is_hex() {
        let p = Platform::from_bits(0x1ff);
        assert_eq!(p.to_string(), "1ff");
    }

    #[test]
    fn serde_is_transparent() {
        let p = Platform::from_bits(42);
        assert_eq!(serde_json::to_string(&p).unwrap(), "42");
    }

    proptest! {
        #[test]
        fn decode_encode_identity(
            platform in proptest::option::of(0u8..=FIELD_MAX),
            arch in proptest::option::of(0u8..=FIELD_MAX),
            render_api_group in proptest::option::of(0u8..=FIELD_MAX),
            render_api in proptest::option::of(0u8..=FIELD_MAX),
            quality_level in proptest::option::of(0u8..=FIELD_MAX),
            custom in proptest::option::of(0u8..=FIELD_MAX),
        ) {
            let d = decl(platform, arch, render_api_group, render_api, quality_level, custom);
            prop_assert_eq!(Platform::encode(d).decompose(), d);
        }

        #[test]
        fn reduction_terminates_for_any_bits(bits in any::<u64>()) {
            let full = Platform::from_bits(bits & 0x0000_ffff_ffff_ffff);
            let mut current = full;
            let mut steps = 0;
            while !current.is_wildcard() {
                current = current.reduce(full);
                steps += 1;
                prop_assert!(steps <= 6);
            }
        }

        #[test]
        fn reduced_is_less_specific(bits in 1u64..0x0000_ffff_ffff_ffffu64) {
            let full = Platform::from_bits(bits);
            let reduced = full.reduce(full);
            prop_assert!(full.is_equal_or_more_specific(reduced));
            prop_assert!(reduced.bits() != full.bits() || full.is_wildcard());
        }
    }
}
