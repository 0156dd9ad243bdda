//! Checkpoint I/O: field codec, transport backends, and the
//! serializer/deserializer pair.
//!
//! # Artifact layout
//!
//! ```text
//! version triple (3 x i32)
//! threshold-type tag (u8) | leaf-output-type tag (u8)
//! tree count (u64)
//! feature count (i32) | task type (u8) | average-tree-output (bool)
//! task-parameter composite | model-parameter composite
//! model optional-field count (i32) + that many skippable fields
//! per tree:
//!   node count (i32) | has-categorical-split (bool)
//!   node composite array
//!   leaf-vector values | leaf ranges | category values | category ranges
//!   per-tree optional-field count + fields
//!   per-node optional-field count + fields
//! ```
//!
//! The same logical layout has two physical encodings: a sequence of
//! self-describing frames ([`frame`]) and a flat byte stream ([`stream`]).
//! Decoding either yields the same model.

pub mod deserializer;
pub mod field;
pub mod frame;
pub mod legacy;
pub mod serializer;
pub mod stream;

pub use deserializer::{AnyModel, Deserializer};
pub use frame::{Frame, FrameSink, FrameSource};
pub use legacy::LegacyModel;
pub use serializer::Serializer;
pub use stream::{StreamSink, StreamSource};
