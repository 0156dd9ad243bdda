//! Transport-agnostic field codec.
//!
//! A checkpoint is a sequence of *fields*: primitives, primitive arrays,
//! composites (fixed-layout aggregates described by an explicit
//! [`CompositeLayout`]), composite arrays, and skippable optional fields.
//! The [`FieldSink`] / [`FieldSource`] traits are the seam between the
//! serializer and the two interchangeable backends: length-tagged frames
//! ([`frame`](super::frame)) and a flat byte stream
//! ([`stream`](super::stream)).
//!
//! All multi-byte values are little-endian on every backend.

use crate::error::{DeserializeError, SerializeError};

// ============================================================================
// Scalar kinds
// ============================================================================

/// Wire representation of a single scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// One byte, zero or nonzero.
    Bool,
    UInt8,
    Int32,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl ScalarKind {
    /// Encoded size in bytes.
    pub const fn size(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::UInt8 => 1,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 4,
            ScalarKind::UInt64 | ScalarKind::Float64 => 8,
        }
    }

    /// Canonical descriptor code, used in layout descriptors and frame tags.
    pub const fn code(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::UInt8 => "u8",
            ScalarKind::Int32 => "i32",
            ScalarKind::UInt32 => "u32",
            ScalarKind::UInt64 => "u64",
            ScalarKind::Float32 => "f32",
            ScalarKind::Float64 => "f64",
        }
    }
}

/// A value with a fixed little-endian wire representation.
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const KIND: ScalarKind;

    /// Append the wire bytes of `self` to `out`.
    fn encode(self, out: &mut Vec<u8>);

    /// Decode from exactly `Self::KIND.size()` bytes.
    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError>;
}

fn short_field(code: &str) -> DeserializeError {
    DeserializeError::CorruptField(format!("short {code} field"))
}

macro_rules! impl_scalar {
    ($ty:ty, $kind:expr) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = $kind;

            fn encode(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
                let arr = bytes
                    .try_into()
                    .map_err(|_| short_field($kind.code()))?;
                Ok(<$ty>::from_le_bytes(arr))
            }
        }
    };
}

impl_scalar!(u8, ScalarKind::UInt8);
impl_scalar!(i32, ScalarKind::Int32);
impl_scalar!(u32, ScalarKind::UInt32);
impl_scalar!(u64, ScalarKind::UInt64);
impl_scalar!(f32, ScalarKind::Float32);
impl_scalar!(f64, ScalarKind::Float64);

impl Scalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn encode(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(short_field("bool")),
        }
    }
}

// ============================================================================
// Composite layouts
// ============================================================================

/// One member of a composite layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Scalar(ScalarKind),
    /// Opaque value slot of fixed width (e.g. a threshold/leaf-output union).
    Slot(usize),
    /// Fixed-length byte field (NUL-padded text).
    Bytes(usize),
    /// One explicit padding byte, written as zero and ignored on read.
    Pad,
}

impl Member {
    pub const fn size(self) -> usize {
        match self {
            Member::Scalar(kind) => kind.size(),
            Member::Slot(width) => width,
            Member::Bytes(len) => len,
            Member::Pad => 1,
        }
    }

    fn push_code(self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Member::Scalar(kind) => out.push_str(kind.code()),
            // Writes are infallible on String.
            Member::Slot(width) => {
                let _ = write!(out, "v{width}");
            }
            Member::Bytes(len) => {
                let _ = write!(out, "s{len}");
            }
            Member::Pad => out.push('x'),
        }
    }
}

/// Explicit layout descriptor for a composite field.
///
/// The descriptor is the compatibility contract between writer and reader:
/// member kinds, sizes, and order must agree byte-for-byte. A mismatch is a
/// fatal decode error, not a recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeLayout {
    members: Vec<Member>,
    size: usize,
}

impl CompositeLayout {
    pub fn new(members: Vec<Member>) -> Self {
        let size = members.iter().map(|m| m.size()).sum();
        Self { members, size }
    }

    /// Encoded size of one composite record.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Canonical string form, e.g. `{i32 i32 u32 v4 u8 u8 bool}`.
    pub fn descriptor(&self) -> String {
        let mut out = String::with_capacity(2 + self.members.len() * 4);
        out.push('{');
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            member.push_code(&mut out);
        }
        out.push('}');
        out
    }
}

/// A fixed-layout aggregate encoded/decoded as one unit.
pub trait Composite: Sized {
    /// The layout descriptor this type encodes against.
    fn layout() -> CompositeLayout;

    /// Append the wire bytes of `self` to `out`.
    ///
    /// Must produce exactly `Self::layout().byte_size()` bytes.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from exactly `Self::layout().byte_size()` bytes.
    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError>;
}

// ============================================================================
// ByteReader
// ============================================================================

/// Sequential reader over a byte slice, used by composite decoders.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(DeserializeError::CorruptField(format!(
                "composite record shorter than its layout ({} bytes missing)",
                end - self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Decode the next scalar.
    pub fn scalar<T: Scalar>(&mut self) -> Result<T, DeserializeError> {
        let bytes = self.take(T::KIND.size())?;
        T::decode(bytes)
    }

    /// Skip `n` padding bytes.
    pub fn pad(&mut self, n: usize) -> Result<(), DeserializeError> {
        self.take(n).map(|_| ())
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

// ============================================================================
// Transport seams
// ============================================================================

/// Write side of a transport backend.
///
/// Each call produces exactly one transport-appropriate unit: a
/// length-tagged frame on the frame backend, raw implicitly-ordered bytes
/// on the stream backend.
pub trait FieldSink {
    fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<(), SerializeError>;

    fn write_scalar_array<T: Scalar>(&mut self, values: &[T]) -> Result<(), SerializeError>;

    fn write_composite<C: Composite>(&mut self, value: &C) -> Result<(), SerializeError>;

    fn write_composite_array<C: Composite>(&mut self, values: &[C]) -> Result<(), SerializeError>;

    /// Write one skippable optional field.
    ///
    /// The encoding must be self-describing on every backend so that a
    /// reader which does not understand the content can still discard it
    /// (see [`FieldSource::skip_optional_field`]).
    fn write_optional_field(&mut self, payload: &[u8]) -> Result<(), SerializeError>;
}

/// Read side of a transport backend.
pub trait FieldSource {
    fn read_scalar<T: Scalar>(&mut self) -> Result<T, DeserializeError>;

    fn read_scalar_array<T: Scalar>(&mut self) -> Result<Vec<T>, DeserializeError>;

    fn read_composite<C: Composite>(&mut self) -> Result<C, DeserializeError>;

    fn read_composite_array<C: Composite>(&mut self) -> Result<Vec<C>, DeserializeError>;

    /// Consume and discard exactly one field without materializing a value.
    ///
    /// This is the forward-compatibility mechanism: optional fields written
    /// by newer minor versions are skipped, never errors.
    fn skip_optional_field(&mut self) -> Result<(), DeserializeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes() {
        assert_eq!(ScalarKind::Bool.size(), 1);
        assert_eq!(ScalarKind::UInt8.size(), 1);
        assert_eq!(ScalarKind::Int32.size(), 4);
        assert_eq!(ScalarKind::UInt32.size(), 4);
        assert_eq!(ScalarKind::Float32.size(), 4);
        assert_eq!(ScalarKind::UInt64.size(), 8);
        assert_eq!(ScalarKind::Float64.size(), 8);
    }

    #[test]
    fn scalar_roundtrip() {
        fn roundtrip<T: Scalar>(value: T) {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            assert_eq!(buf.len(), T::KIND.size());
            assert_eq!(T::decode(&buf).unwrap(), value);
        }

        roundtrip(true);
        roundtrip(false);
        roundtrip(0xA5u8);
        roundtrip(-123i32);
        roundtrip(0xDEAD_BEEFu32);
        roundtrip(u64::MAX - 7);
        roundtrip(1.5f32);
        roundtrip(-2.25f64);
    }

    #[test]
    fn bool_decodes_any_nonzero() {
        assert!(bool::decode(&[7]).unwrap());
        assert!(!bool::decode(&[0]).unwrap());
    }

    #[test]
    fn layout_descriptor_and_size() {
        let layout = CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::UInt8),
            Member::Scalar(ScalarKind::Bool),
            Member::Pad,
            Member::Pad,
            Member::Scalar(ScalarKind::UInt32),
            Member::Slot(8),
            Member::Bytes(256),
        ]);
        assert_eq!(layout.descriptor(), "{u8 bool x x u32 v8 s256}");
        assert_eq!(layout.byte_size(), 1 + 1 + 2 + 4 + 8 + 256);
    }

    #[test]
    fn byte_reader_rejects_overrun() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert_eq!(reader.take(2).unwrap(), &[1, 2]);
        assert!(matches!(
            reader.take(2),
            Err(DeserializeError::CorruptField(_))
        ));
    }
}
