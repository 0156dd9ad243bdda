//! Buffer-frame transport backend.
//!
//! Every field is one [`Frame`]: a self-describing, length-tagged block
//! carrying its layout descriptor, item size, and item count. Frames are
//! suitable for zero-copy in-process handoff — the encoded model is a
//! `Vec<Frame>` whose buffers can be passed along wholesale.
//!
//! Because frames are self-describing, this backend verifies the layout
//! descriptor of every field it reads; a writer/reader disagreement
//! surfaces as [`DeserializeError::LayoutMismatch`].

use crate::error::{DeserializeError, SerializeError};

use super::field::{Composite, FieldSink, FieldSource, Scalar};

/// One length-tagged unit produced by the frame transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Layout descriptor of the items (scalar code or composite descriptor).
    pub descriptor: String,
    /// Size of one item in bytes.
    pub item_size: usize,
    /// Number of items.
    pub item_count: usize,
    /// Raw item data, `item_size * item_count` bytes.
    pub data: Vec<u8>,
}

// ============================================================================
// Sink
// ============================================================================

/// Collects fields into a sequence of frames.
#[derive(Debug, Default)]
pub struct FrameSink {
    frames: Vec<Frame>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand off the collected frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FieldSink for FrameSink {
    fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<(), SerializeError> {
        let mut data = Vec::with_capacity(T::KIND.size());
        value.encode(&mut data);
        self.frames.push(Frame {
            descriptor: T::KIND.code().to_string(),
            item_size: T::KIND.size(),
            item_count: 1,
            data,
        });
        Ok(())
    }

    fn write_scalar_array<T: Scalar>(&mut self, values: &[T]) -> Result<(), SerializeError> {
        let mut data = Vec::with_capacity(values.len() * T::KIND.size());
        for value in values {
            value.encode(&mut data);
        }
        self.frames.push(Frame {
            descriptor: T::KIND.code().to_string(),
            item_size: T::KIND.size(),
            item_count: values.len(),
            data,
        });
        Ok(())
    }

    fn write_composite<C: Composite>(&mut self, value: &C) -> Result<(), SerializeError> {
        let layout = C::layout();
        let mut data = Vec::with_capacity(layout.byte_size());
        value.encode(&mut data);
        debug_assert_eq!(data.len(), layout.byte_size());
        self.frames.push(Frame {
            descriptor: layout.descriptor(),
            item_size: layout.byte_size(),
            item_count: 1,
            data,
        });
        Ok(())
    }

    fn write_composite_array<C: Composite>(&mut self, values: &[C]) -> Result<(), SerializeError> {
        let layout = C::layout();
        let mut data = Vec::with_capacity(values.len() * layout.byte_size());
        for value in values {
            value.encode(&mut data);
        }
        debug_assert_eq!(data.len(), values.len() * layout.byte_size());
        self.frames.push(Frame {
            descriptor: layout.descriptor(),
            item_size: layout.byte_size(),
            item_count: values.len(),
            data,
        });
        Ok(())
    }

    fn write_optional_field(&mut self, payload: &[u8]) -> Result<(), SerializeError> {
        self.frames.push(Frame {
            descriptor: "u8".to_string(),
            item_size: 1,
            item_count: payload.len(),
            data: payload.to_vec(),
        });
        Ok(())
    }
}

// ============================================================================
// Source
// ============================================================================

/// Reads fields back out of a frame sequence.
#[derive(Debug)]
pub struct FrameSource<'a> {
    frames: &'a [Frame],
    cursor: usize,
}

impl<'a> FrameSource<'a> {
    pub fn new(frames: &'a [Frame]) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Number of frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }

    fn next_frame(&mut self) -> Result<&'a Frame, DeserializeError> {
        let frame = self
            .frames
            .get(self.cursor)
            .ok_or(DeserializeError::ExhaustedFrames)?;
        self.cursor += 1;
        if frame.data.len() != frame.item_size * frame.item_count {
            return Err(DeserializeError::CorruptField(format!(
                "frame data is {} bytes, tag says {} x {}",
                frame.data.len(),
                frame.item_size,
                frame.item_count
            )));
        }
        Ok(frame)
    }

    fn expect_frame(
        &mut self,
        descriptor: &str,
        item_size: usize,
        item_count: Option<usize>,
    ) -> Result<&'a Frame, DeserializeError> {
        let frame = self.next_frame()?;
        let matches = frame.descriptor == descriptor
            && frame.item_size == item_size
            && item_count.map_or(true, |n| frame.item_count == n);
        if !matches {
            return Err(DeserializeError::LayoutMismatch {
                expected: match item_count {
                    Some(n) => format!("{descriptor} x {n}"),
                    None => descriptor.to_string(),
                },
                found: format!("{} x {}", frame.descriptor, frame.item_count),
            });
        }
        Ok(frame)
    }
}

impl FieldSource for FrameSource<'_> {
    fn read_scalar<T: Scalar>(&mut self) -> Result<T, DeserializeError> {
        let frame = self.expect_frame(T::KIND.code(), T::KIND.size(), Some(1))?;
        T::decode(&frame.data)
    }

    fn read_scalar_array<T: Scalar>(&mut self) -> Result<Vec<T>, DeserializeError> {
        let frame = self.expect_frame(T::KIND.code(), T::KIND.size(), None)?;
        frame
            .data
            .chunks_exact(T::KIND.size())
            .map(T::decode)
            .collect()
    }

    fn read_composite<C: Composite>(&mut self) -> Result<C, DeserializeError> {
        let layout = C::layout();
        let frame = self.expect_frame(&layout.descriptor(), layout.byte_size(), Some(1))?;
        C::decode(&frame.data)
    }

    fn read_composite_array<C: Composite>(&mut self) -> Result<Vec<C>, DeserializeError> {
        let layout = C::layout();
        let frame = self.expect_frame(&layout.descriptor(), layout.byte_size(), None)?;
        frame
            .data
            .chunks_exact(layout.byte_size())
            .map(C::decode)
            .collect()
    }

    fn skip_optional_field(&mut self) -> Result<(), DeserializeError> {
        // Frames are self-describing; skipping is dropping one frame.
        self.next_frame().map(|_| ())
    }
}
