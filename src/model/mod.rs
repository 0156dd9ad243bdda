//! In-memory model representation.
//!
//! A [`Model`] owns exactly one [`ModelVariant`] — a tagged union over the
//! closed set of supported (threshold, leaf output) numeric pairs. All code
//! that needs the concrete tree type goes through [`dispatch_model!`], the
//! explicit tag-to-operations table; nothing instantiates generics from
//! runtime values implicitly.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{DeserializeError, SerializeError};
use crate::io::deserializer::{AnyModel, Deserializer};
use crate::io::field::{
    ByteReader, Composite, CompositeLayout, Member, Scalar, ScalarKind,
};
use crate::io::frame::{Frame, FrameSink, FrameSource};
use crate::io::serializer::Serializer;
use crate::io::stream::{StreamSink, StreamSource};
use crate::version::Version;

pub mod tree;

pub use tree::{
    LeafOutputValue, Node, NodeValue, Operator, SplitFeatureType, ThresholdValue, Tree,
    TreeValidationError, ValueRange,
};

// ============================================================================
// Numeric type tags
// ============================================================================

/// Wire tag for a numeric representation.
///
/// Tag 0 is reserved (historically "invalid") and never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeInfo {
    UInt32 = 1,
    Float32 = 2,
    Float64 = 3,
}

impl TypeInfo {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::UInt32),
            2 => Some(Self::Float32),
            3 => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UInt32 => "uint32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the supported (threshold, leaf output) combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePair {
    Float32UInt32,
    Float32Float32,
    Float64UInt32,
    Float64Float64,
}

impl TypePair {
    /// Every supported pair, in tag order.
    pub const ALL: [TypePair; 4] = [
        TypePair::Float32UInt32,
        TypePair::Float32Float32,
        TypePair::Float64UInt32,
        TypePair::Float64Float64,
    ];

    /// Map two wire tags onto a supported pair.
    pub fn from_tags(threshold: TypeInfo, leaf_output: TypeInfo) -> Result<Self, DeserializeError> {
        match (threshold, leaf_output) {
            (TypeInfo::Float32, TypeInfo::UInt32) => Ok(Self::Float32UInt32),
            (TypeInfo::Float32, TypeInfo::Float32) => Ok(Self::Float32Float32),
            (TypeInfo::Float64, TypeInfo::UInt32) => Ok(Self::Float64UInt32),
            (TypeInfo::Float64, TypeInfo::Float64) => Ok(Self::Float64Float64),
            _ => Err(DeserializeError::UnsupportedTypePair {
                threshold,
                leaf_output,
            }),
        }
    }

    pub fn threshold_type(self) -> TypeInfo {
        match self {
            Self::Float32UInt32 | Self::Float32Float32 => TypeInfo::Float32,
            Self::Float64UInt32 | Self::Float64Float64 => TypeInfo::Float64,
        }
    }

    pub fn leaf_output_type(self) -> TypeInfo {
        match self {
            Self::Float32UInt32 | Self::Float64UInt32 => TypeInfo::UInt32,
            Self::Float32Float32 => TypeInfo::Float32,
            Self::Float64Float64 => TypeInfo::Float64,
        }
    }
}

// ============================================================================
// Task metadata
// ============================================================================

/// The learning task a model was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TaskType {
    BinaryClf = 0,
    #[default]
    Regressor = 1,
    MultiClf = 2,
    LearningToRank = 3,
    IsolationForest = 4,
}

impl TaskType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::BinaryClf),
            1 => Some(Self::Regressor),
            2 => Some(Self::MultiClf),
            3 => Some(Self::LearningToRank),
            4 => Some(Self::IsolationForest),
            _ => None,
        }
    }

    /// Textual code used in diagnostics and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BinaryClf => "binary_clf",
            Self::Regressor => "regressor",
            Self::MultiClf => "multi_clf",
            Self::LearningToRank => "learning_to_rank",
            Self::IsolationForest => "isolation_forest",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = DeserializeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_clf" => Ok(Self::BinaryClf),
            "regressor" => Ok(Self::Regressor),
            "multi_clf" => Ok(Self::MultiClf),
            "learning_to_rank" => Ok(Self::LearningToRank),
            "isolation_forest" => Ok(Self::IsolationForest),
            _ => Err(DeserializeError::UnknownTaskType(s.to_string())),
        }
    }
}

/// How leaf outputs are typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OutputType {
    #[default]
    Float = 0,
    Int = 1,
}

impl OutputType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Float),
            1 => Some(Self::Int),
            _ => None,
        }
    }
}

/// Task-specific parameters, written as one composite field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskParam {
    pub output_type: OutputType,
    /// Whether each class owns a dedicated grove of trees.
    pub grove_per_class: bool,
    pub num_class: u32,
    pub leaf_vector_size: u32,
}

impl Default for TaskParam {
    fn default() -> Self {
        Self {
            output_type: OutputType::Float,
            grove_per_class: false,
            num_class: 1,
            leaf_vector_size: 1,
        }
    }
}

impl Composite for TaskParam {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::UInt8),
            Member::Scalar(ScalarKind::Bool),
            Member::Scalar(ScalarKind::UInt32),
            Member::Scalar(ScalarKind::UInt32),
        ])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        (self.output_type as u8).encode(out);
        self.grove_per_class.encode(out);
        self.num_class.encode(out);
        self.leaf_vector_size.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let output_tag: u8 = reader.scalar()?;
        Ok(Self {
            output_type: OutputType::from_u8(output_tag).ok_or(
                DeserializeError::InvalidField {
                    field: "output_type",
                    value: output_tag as u64,
                },
            )?,
            grove_per_class: reader.scalar()?,
            num_class: reader.scalar()?,
            leaf_vector_size: reader.scalar()?,
        })
    }
}

/// Size of the prediction-transform name field on the wire.
pub const PRED_TRANSFORM_LEN: usize = 256;

/// A prediction-transform name longer than the fixed wire field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pred_transform name is {len} bytes; the checkpoint field holds {PRED_TRANSFORM_LEN}")]
pub struct PredTransformTooLong {
    pub len: usize,
}

/// Model-level prediction-transform parameters, one composite field.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParam {
    pred_transform: String,
    pub sigmoid_alpha: f32,
    pub ratio_c: f32,
    pub global_bias: f32,
}

impl Default for ModelParam {
    fn default() -> Self {
        Self {
            pred_transform: "identity".to_string(),
            sigmoid_alpha: 1.0,
            ratio_c: 1.0,
            global_bias: 0.0,
        }
    }
}

impl ModelParam {
    /// Name of the prediction transform applied by downstream consumers.
    #[inline]
    pub fn pred_transform(&self) -> &str {
        &self.pred_transform
    }

    /// Set the prediction-transform name, enforcing the wire field size.
    pub fn set_pred_transform(&mut self, name: &str) -> Result<(), PredTransformTooLong> {
        if name.len() > PRED_TRANSFORM_LEN {
            return Err(PredTransformTooLong { len: name.len() });
        }
        self.pred_transform = name.to_string();
        Ok(())
    }
}

impl Composite for ModelParam {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Bytes(PRED_TRANSFORM_LEN),
            Member::Scalar(ScalarKind::Float32),
            Member::Scalar(ScalarKind::Float32),
            Member::Scalar(ScalarKind::Float32),
        ])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let mut name = [0u8; PRED_TRANSFORM_LEN];
        // The setter enforces the bound.
        name[..self.pred_transform.len()].copy_from_slice(self.pred_transform.as_bytes());
        out.extend_from_slice(&name);
        self.sigmoid_alpha.encode(out);
        self.ratio_c.encode(out);
        self.global_bias.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let name_bytes = reader.take(PRED_TRANSFORM_LEN)?;
        let name_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(PRED_TRANSFORM_LEN);
        let pred_transform = std::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| {
                DeserializeError::CorruptField("pred_transform is not valid UTF-8".to_string())
            })?
            .to_string();
        Ok(Self {
            pred_transform,
            sigmoid_alpha: reader.scalar()?,
            ratio_c: reader.scalar()?,
            global_bias: reader.scalar()?,
        })
    }
}

// ============================================================================
// Forest and variant dispatch
// ============================================================================

/// Trees of one numeric instantiation, in original order.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest<T: ThresholdValue, L: LeafOutputValue> {
    pub trees: Vec<Tree<T, L>>,
}

impl<T: ThresholdValue, L: LeafOutputValue> Default for Forest<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ThresholdValue, L: LeafOutputValue> Forest<T, L> {
    pub fn new() -> Self {
        Self { trees: Vec::new() }
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn push(&mut self, tree: Tree<T, L>) {
        self.trees.push(tree);
    }
}

/// Tagged union over the supported numeric instantiations.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVariant {
    Float32UInt32(Forest<f32, u32>),
    Float32Float32(Forest<f32, f32>),
    Float64UInt32(Forest<f64, u32>),
    Float64Float64(Forest<f64, f64>),
}

/// Dispatch from a [`ModelVariant`] tag to its concrete forest.
///
/// ```ignore
/// let n = dispatch_model!(&model.variant, |forest| forest.n_trees());
/// ```
#[macro_export]
macro_rules! dispatch_model {
    ($variant:expr, |$forest:ident| $body:expr) => {
        match $variant {
            $crate::model::ModelVariant::Float32UInt32($forest) => $body,
            $crate::model::ModelVariant::Float32Float32($forest) => $body,
            $crate::model::ModelVariant::Float64UInt32($forest) => $body,
            $crate::model::ModelVariant::Float64Float64($forest) => $body,
        }
    };
}

impl ModelVariant {
    /// Allocate an empty forest of the given instantiation.
    pub fn empty(pair: TypePair) -> Self {
        match pair {
            TypePair::Float32UInt32 => Self::Float32UInt32(Forest::new()),
            TypePair::Float32Float32 => Self::Float32Float32(Forest::new()),
            TypePair::Float64UInt32 => Self::Float64UInt32(Forest::new()),
            TypePair::Float64Float64 => Self::Float64Float64(Forest::new()),
        }
    }

    pub fn type_pair(&self) -> TypePair {
        match self {
            Self::Float32UInt32(_) => TypePair::Float32UInt32,
            Self::Float32Float32(_) => TypePair::Float32Float32,
            Self::Float64UInt32(_) => TypePair::Float64UInt32,
            Self::Float64Float64(_) => TypePair::Float64Float64,
        }
    }

    pub fn n_trees(&self) -> usize {
        dispatch_model!(self, |forest| forest.n_trees())
    }
}

// ============================================================================
// Model
// ============================================================================

/// A decision-tree-ensemble model, ready to encode or freshly decoded.
///
/// `version` carries the artifact's stored triple after a decode; fresh
/// models are stamped with the current library version. Encoding always
/// writes the current version regardless of this field.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub version: Version,
    pub num_feature: i32,
    pub task_type: TaskType,
    /// Whether tree outputs are averaged rather than summed.
    pub average_tree_output: bool,
    pub task_param: TaskParam,
    pub param: ModelParam,
    pub variant: ModelVariant,
}

impl Model {
    /// Construct an empty model of the given numeric instantiation.
    pub fn new(pair: TypePair, task_type: TaskType) -> Self {
        Self {
            version: Version::CURRENT,
            num_feature: 0,
            task_type,
            average_tree_output: false,
            task_param: TaskParam::default(),
            param: ModelParam::default(),
            variant: ModelVariant::empty(pair),
        }
    }

    #[inline]
    pub fn type_pair(&self) -> TypePair {
        self.variant.type_pair()
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.variant.n_trees()
    }

    // ------------------------------------------------------------------
    // Transport entry points
    // ------------------------------------------------------------------

    /// Encode via the buffer-frame transport.
    pub fn to_frames(&self) -> Result<Vec<Frame>, SerializeError> {
        let mut serializer = Serializer::new(FrameSink::new());
        serializer.serialize(self)?;
        Ok(serializer.into_sink().into_frames())
    }

    /// Decode a current-format checkpoint from frames.
    pub fn from_frames(frames: &[Frame]) -> Result<Self, DeserializeError> {
        Deserializer::new(FrameSource::new(frames)).deserialize()
    }

    /// Decode from frames, surfacing legacy checkpoints structurally.
    pub fn any_from_frames(frames: &[Frame]) -> Result<AnyModel, DeserializeError> {
        Deserializer::new(FrameSource::new(frames)).deserialize_any()
    }

    /// Encode via the byte-stream transport.
    pub fn serialize_to<W: Write>(&self, writer: W) -> Result<(), SerializeError> {
        Serializer::new(StreamSink::new(writer)).serialize(self)
    }

    /// Decode a current-format checkpoint from a byte stream.
    pub fn deserialize_from<R: Read>(reader: R) -> Result<Self, DeserializeError> {
        Deserializer::new(StreamSource::new(reader)).deserialize()
    }

    /// Decode from a byte stream, surfacing legacy checkpoints structurally.
    pub fn deserialize_any_from<R: Read>(reader: R) -> Result<AnyModel, DeserializeError> {
        Deserializer::new(StreamSource::new(reader)).deserialize_any()
    }

    /// Write this model to a checkpoint file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SerializeError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.serialize_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a checkpoint file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeserializeError> {
        Self::deserialize_from(BufReader::new(File::open(path)?))
    }
}
