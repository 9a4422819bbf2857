/// Selection pattern of the 2×2 pixels around one lattice point.
///
/// ```text
/// A B
/// C D
/// ```
///
/// Variants are named after the selected pixels; the discriminant is the
/// 4-bit code `A | B << 1 | C << 2 | D << 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Pattern {
    Empty = 0,
    A = 1,
    B = 2,
    AB = 3,
    C = 4,
    AC = 5,
    BC = 6,
    ABC = 7,
    D = 8,
    AD = 9,
    BD = 10,
    ABD = 11,
    CD = 12,
    ACD = 13,
    BCD = 14,
    Full = 15,
}

impl Pattern {
    pub(crate) const ALL: [Pattern; 16] = [
        Pattern::Empty,
        Pattern::A,
        Pattern::B,
        Pattern::AB,
        Pattern::C,
        Pattern::AC,
        Pattern::BC,
        Pattern::ABC,
        Pattern::D,
        Pattern::AD,
        Pattern::BD,
        Pattern::ABD,
        Pattern::CD,
        Pattern::ACD,
        Pattern::BCD,
        Pattern::Full,
    ];

    #[inline]
    pub(crate) fn from_corners(a: bool, b: bool, c: bool, d: bool) -> Self {
        let bits = a as usize | (b as usize) << 1 | (c as usize) << 2 | (d as usize) << 3;
        Self::ALL[bits]
    }
}
