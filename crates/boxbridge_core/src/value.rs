use std::fmt;

/// Primitive integer types an accessor can declare for a parameter.
///
/// Declaration order is the widening precedence: a value may always move to
/// a later kind of the same signedness family without a range check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntKind {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntKind {
    /// byte → short → int → long.
    pub const PRECEDENCE: [IntKind; 4] = [IntKind::U8, IntKind::I16, IntKind::I32, IntKind::I64];

    pub fn bounds(self) -> (i128, i128) {
        match self {
            Self::U8 => (u8::MIN as i128, u8::MAX as i128),
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U16 => (u16::MIN as i128, u16::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U32 => (u32::MIN as i128, u32::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
            Self::U64 => (u64::MIN as i128, u64::MAX as i128),
        }
    }

    pub fn holds(self, value: i128) -> bool {
        let (lo, hi) = self.bounds();
        value >= lo && value <= hi
    }

    /// Narrowest kind in [`IntKind::PRECEDENCE`] able to carry `value`.
    pub fn narrowest_for(value: i128) -> Option<IntKind> {
        Self::PRECEDENCE.into_iter().find(|kind| kind.holds(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    /// An enum value carried through its underlying integer type.
    Enum { repr: IntKind, raw: i64 },
}

impl Scalar {
    pub fn int_kind(&self) -> IntKind {
        match *self {
            Self::U8(_) => IntKind::U8,
            Self::I8(_) => IntKind::I8,
            Self::I16(_) => IntKind::I16,
            Self::U16(_) => IntKind::U16,
            Self::I32(_) => IntKind::I32,
            Self::U32(_) => IntKind::U32,
            Self::I64(_) => IntKind::I64,
            Self::U64(_) => IntKind::U64,
            Self::Enum { repr, .. } => repr,
        }
    }

    pub fn as_i128(&self) -> i128 {
        match *self {
            Self::U8(v) => v as i128,
            Self::I8(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::I64(v) => v as i128,
            Self::U64(v) => v as i128,
            Self::Enum { raw, .. } => raw as i128,
        }
    }

    /// Saturating view used when reading fields into the fixed field set.
    pub fn as_i64(&self) -> i64 {
        self.as_i128().clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Self::Enum { .. })
    }

    /// Builds a scalar of `kind` when `value` fits, `None` otherwise.
    pub fn of_kind(kind: IntKind, value: i128) -> Option<Scalar> {
        if !kind.holds(value) {
            return None;
        }
        Some(match kind {
            IntKind::U8 => Self::U8(value as u8),
            IntKind::I8 => Self::I8(value as i8),
            IntKind::I16 => Self::I16(value as i16),
            IntKind::U16 => Self::U16(value as u16),
            IntKind::I32 => Self::I32(value as i32),
            IntKind::U32 => Self::U32(value as u32),
            IntKind::I64 => Self::I64(value as i64),
            IntKind::U64 => Self::U64(value as u64),
        })
    }

    /// Whether this value is exactly what a parameter of `param` accepts,
    /// without any conversion.
    pub fn fits_exactly(&self, param: ParamKind) -> bool {
        match (self, param) {
            (Self::Enum { repr, .. }, ParamKind::Enum(expected)) => *repr == expected,
            (Self::Enum { .. }, _) => false,
            (_, ParamKind::Int(kind)) => self.int_kind() == kind,
            _ => false,
        }
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        i32::try_from(value)
            .map(Self::I32)
            .unwrap_or(Self::I64(value as i64))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enum { repr, raw } => write!(f, "{raw} as enum({repr:?})"),
            other => write!(f, "{}{:?}", other.as_i128(), other.int_kind()),
        }
    }
}

/// Declared parameter type of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Int(IntKind),
    /// Enum parameter with its underlying integer type.
    Enum(IntKind),
    /// An object parameter carrying a record (or the empty sentinel).
    Record,
}

impl ParamKind {
    pub fn is_integer_like(self) -> bool {
        matches!(self, Self::Int(_) | Self::Enum(_))
    }
}
