//! Byte-stream transport backend.
//!
//! Fields are raw little-endian bytes in a fixed, implicitly-ordered
//! layout over any `std::io::Read`/`Write`. There are no frame boundaries;
//! field sizes are implied by type, and arrays carry a u64 count prefix.
//!
//! Optional fields are the one exception to implicit sizing: they are
//! written self-describing (`[u8 kind tag][u64 byte length][payload]`) so
//! that [`skip_optional_field`](super::field::FieldSource::skip_optional_field)
//! can discard exactly one field without interpreting its content.
//!
//! Unlike the frame backend, this backend cannot verify layout descriptors;
//! a writer/reader disagreement manifests as a truncation or corrupt-field
//! error further into the artifact.

use std::io::{Read, Write};

use crate::error::{DeserializeError, SerializeError};

use super::field::{Composite, FieldSink, FieldSource, Scalar};

/// Reserved kind tag for opaque optional-field payloads.
const OPTIONAL_FIELD_OPAQUE: u8 = 0;

// ============================================================================
// Sink
// ============================================================================

/// Writes fields to a byte stream.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Hand back the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FieldSink for StreamSink<W> {
    fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<(), SerializeError> {
        let mut buf = Vec::with_capacity(T::KIND.size());
        value.encode(&mut buf);
        self.writer.write_all(&buf)?;
        Ok(())
    }

    fn write_scalar_array<T: Scalar>(&mut self, values: &[T]) -> Result<(), SerializeError> {
        self.write_scalar(values.len() as u64)?;
        let mut buf = Vec::with_capacity(values.len() * T::KIND.size());
        for value in values {
            value.encode(&mut buf);
        }
        self.writer.write_all(&buf)?;
        Ok(())
    }

    fn write_composite<C: Composite>(&mut self, value: &C) -> Result<(), SerializeError> {
        let mut buf = Vec::with_capacity(C::layout().byte_size());
        value.encode(&mut buf);
        self.writer.write_all(&buf)?;
        Ok(())
    }

    fn write_composite_array<C: Composite>(&mut self, values: &[C]) -> Result<(), SerializeError> {
        self.write_scalar(values.len() as u64)?;
        let mut buf = Vec::with_capacity(values.len() * C::layout().byte_size());
        for value in values {
            value.encode(&mut buf);
        }
        self.writer.write_all(&buf)?;
        Ok(())
    }

    fn write_optional_field(&mut self, payload: &[u8]) -> Result<(), SerializeError> {
        self.write_scalar(OPTIONAL_FIELD_OPAQUE)?;
        self.write_scalar(payload.len() as u64)?;
        self.writer.write_all(payload)?;
        Ok(())
    }
}

// ============================================================================
// Source
// ============================================================================

/// Reads fields from a byte stream.
#[derive(Debug)]
pub struct StreamSource<R: Read> {
    reader: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Hand back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), DeserializeError> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DeserializeError::Truncated {
                    expected: buf.len(),
                }
            } else {
                DeserializeError::Io(e)
            }
        })
    }

    /// Read a u64 array-length prefix, guarding the byte-size computation.
    fn read_len_prefix(&mut self, item_size: usize) -> Result<usize, DeserializeError> {
        let len: u64 = self.read_scalar()?;
        let len: usize = len
            .try_into()
            .map_err(|_| DeserializeError::CorruptField(format!("array length {len} too large")))?;
        len.checked_mul(item_size)
            .ok_or_else(|| DeserializeError::CorruptField(format!("array length {len} too large")))
    }
}

impl<R: Read> FieldSource for StreamSource<R> {
    fn read_scalar<T: Scalar>(&mut self) -> Result<T, DeserializeError> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..T::KIND.size()];
        self.fill(buf)?;
        T::decode(buf)
    }

    fn read_scalar_array<T: Scalar>(&mut self) -> Result<Vec<T>, DeserializeError> {
        let bytes = self.read_len_prefix(T::KIND.size())?;
        let mut buf = vec![0u8; bytes];
        self.fill(&mut buf)?;
        buf.chunks_exact(T::KIND.size()).map(T::decode).collect()
    }

    fn read_composite<C: Composite>(&mut self) -> Result<C, DeserializeError> {
        let mut buf = vec![0u8; C::layout().byte_size()];
        self.fill(&mut buf)?;
        C::decode(&buf)
    }

    fn read_composite_array<C: Composite>(&mut self) -> Result<Vec<C>, DeserializeError> {
        let layout = C::layout();
        let bytes = self.read_len_prefix(layout.byte_size())?;
        let mut buf = vec![0u8; bytes];
        self.fill(&mut buf)?;
        buf.chunks_exact(layout.byte_size()).map(C::decode).collect()
    }

    fn skip_optional_field(&mut self) -> Result<(), DeserializeError> {
        let _kind: u8 = self.read_scalar()?;
        let len: u64 = self.read_scalar()?;
        let copied = std::io::copy(&mut self.reader.by_ref().take(len), &mut std::io::sink())?;
        if copied != len {
            return Err(DeserializeError::Truncated {
                expected: (len - copied) as usize,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn scalar_and_array_roundtrip() {
        let mut sink = StreamSink::new(Vec::new());
        sink.write_scalar(-7i32).unwrap();
        sink.write_scalar_array(&[10u64, 20, 30]).unwrap();
        sink.write_scalar(true).unwrap();
        let bytes = sink.into_inner();

        let mut source = StreamSource::new(Cursor::new(bytes));
        assert_eq!(source.read_scalar::<i32>().unwrap(), -7);
        assert_eq!(source.read_scalar_array::<u64>().unwrap(), vec![10, 20, 30]);
        assert!(source.read_scalar::<bool>().unwrap());
    }

    #[test]
    fn skip_optional_field_resumes_at_next_field() {
        let mut sink = StreamSink::new(Vec::new());
        sink.write_optional_field(&[1, 2, 3, 4, 5]).unwrap();
        sink.write_scalar(99u32).unwrap();
        let bytes = sink.into_inner();

        let mut source = StreamSource::new(Cursor::new(bytes));
        source.skip_optional_field().unwrap();
        assert_eq!(source.read_scalar::<u32>().unwrap(), 99);
    }

    #[test]
    fn truncated_stream_is_fatal() {
        let mut sink = StreamSink::new(Vec::new());
        sink.write_scalar(0x0102_0304u32).unwrap();
        let mut bytes = sink.into_inner();
        bytes.truncate(2);

        let mut source = StreamSource::new(Cursor::new(bytes));
        assert!(matches!(
            source.read_scalar::<u32>(),
            Err(DeserializeError::Truncated { .. })
        ));
    }

    #[test]
    fn empty_array_roundtrip() {
        let mut sink = StreamSink::new(Vec::new());
        sink.write_scalar_array::<f64>(&[]).unwrap();
        let bytes = sink.into_inner();

        let mut source = StreamSource::new(Cursor::new(bytes));
        assert!(source.read_scalar_array::<f64>().unwrap().is_empty());
    }
}
