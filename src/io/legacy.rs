//! Frozen 3.9 legacy checkpoint layout.
//!
//! This layer reconstructs the one historical layout the current version
//! still knows how to read, for migration purposes only. The parse is
//! purely structural: record shapes, counts, and skip loops are honored
//! faithfully, but the legacy task-type and parameter records are *not*
//! remapped onto the current model — that conversion is an unresolved
//! extension point, surfaced by [`LegacyModel::migrate`] as unsupported.
//!
//! Nothing here ever writes a 3.9 checkpoint; the `Composite` encode
//! implementations exist so tests can craft legacy artifacts.

use crate::error::DeserializeError;
use crate::io::deserializer::{read_type_pair, skip_optional_fields};
use crate::io::field::{
    ByteReader, Composite, CompositeLayout, FieldSource, Member, Scalar, ScalarKind,
};
use crate::model::tree::{LeafOutputValue, NodeValue, ThresholdValue};
use crate::model::{Model, OutputType, TypePair, PRED_TRANSFORM_LEN};
use crate::version::Version;

/// Task type enumeration used by the 3.9 format (four variants; the
/// current format has five).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LegacyTaskType {
    /// Binary classifier or regressor; the legacy format did not
    /// distinguish the two.
    BinaryClfRegr = 0,
    MultiClfGrovePerClass = 1,
    MultiClfProbDistLeaf = 2,
    MultiClfCategLeaf = 3,
}

impl LegacyTaskType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::BinaryClfRegr),
            1 => Some(Self::MultiClfGrovePerClass),
            2 => Some(Self::MultiClfProbDistLeaf),
            3 => Some(Self::MultiClfCategLeaf),
            _ => None,
        }
    }
}

/// Task parameter record of the 3.9 format.
///
/// The two pad bytes after `grove_per_class` are part of the frozen layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyTaskParam {
    pub output_type: OutputType,
    pub grove_per_class: bool,
    pub num_class: u32,
    pub leaf_vector_size: u32,
}

impl Composite for LegacyTaskParam {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::UInt8),
            Member::Scalar(ScalarKind::Bool),
            Member::Pad,
            Member::Pad,
            Member::Scalar(ScalarKind::UInt32),
            Member::Scalar(ScalarKind::UInt32),
        ])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        (self.output_type as u8).encode(out);
        self.grove_per_class.encode(out);
        out.extend_from_slice(&[0, 0]);
        self.num_class.encode(out);
        self.leaf_vector_size.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let output_tag: u8 = reader.scalar()?;
        let output_type =
            OutputType::from_u8(output_tag).ok_or(DeserializeError::InvalidField {
                field: "legacy output_type",
                value: output_tag as u64,
            })?;
        let grove_per_class: bool = reader.scalar()?;
        reader.pad(2)?;
        Ok(Self {
            output_type,
            grove_per_class,
            num_class: reader.scalar()?,
            leaf_vector_size: reader.scalar()?,
        })
    }
}

/// Model parameter record of the 3.9 format.
///
/// The transform name is kept as raw bytes: legacy checkpoints are parsed
/// structurally, not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyModelParam {
    pub pred_transform: Vec<u8>,
    pub sigmoid_alpha: f32,
    pub ratio_c: f32,
    pub global_bias: f32,
}

impl LegacyModelParam {
    /// Transform name up to the first NUL, lossily decoded for diagnostics.
    pub fn pred_transform_lossy(&self) -> String {
        let len = self
            .pred_transform
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.pred_transform.len());
        String::from_utf8_lossy(&self.pred_transform[..len]).into_owned()
    }
}

impl Composite for LegacyModelParam {
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
        let len = self.pred_transform.len().min(PRED_TRANSFORM_LEN);
        name[..len].copy_from_slice(&self.pred_transform[..len]);
        out.extend_from_slice(&name);
        self.sigmoid_alpha.encode(out);
        self.ratio_c.encode(out);
        self.global_bias.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let pred_transform = reader.take(PRED_TRANSFORM_LEN)?.to_vec();
        Ok(Self {
            pred_transform,
            sigmoid_alpha: reader.scalar()?,
            ratio_c: reader.scalar()?,
            global_bias: reader.scalar()?,
        })
    }
}

/// Node record of the 3.9 format.
///
/// Field set and ordering differ incompatibly from the current record:
/// training statistics sit in the middle, the split-type tag precedes the
/// operator, and the presence flags trail. The tags are kept as raw bytes
/// because the legacy enumerations are frozen independently of the current
/// ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyNode<T: ThresholdValue, L: LeafOutputValue> {
    pub cleft: i32,
    pub cright: i32,
    pub sindex: u32,
    pub value: NodeValue<T, L>,
    pub data_count: u64,
    pub sum_hess: f64,
    pub gain: f64,
    pub split_type: u8,
    pub operator: u8,
    pub data_count_present: bool,
    pub sum_hess_present: bool,
    pub gain_present: bool,
    pub categories_list_right_child: bool,
}

fn slot_width<T: Scalar, L: Scalar>() -> usize {
    T::KIND.size().max(L::KIND.size())
}

impl<T: ThresholdValue, L: LeafOutputValue> Composite for LegacyNode<T, L> {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::Int32),
            Member::Scalar(ScalarKind::Int32),
            Member::Scalar(ScalarKind::UInt32),
            Member::Slot(slot_width::<T, L>()),
            Member::Scalar(ScalarKind::UInt64),
            Member::Scalar(ScalarKind::Float64),
            Member::Scalar(ScalarKind::Float64),
            Member::Scalar(ScalarKind::UInt8),
            Member::Scalar(ScalarKind::UInt8),
            Member::Scalar(ScalarKind::Bool),
            Member::Scalar(ScalarKind::Bool),
            Member::Scalar(ScalarKind::Bool),
            Member::Scalar(ScalarKind::Bool),
        ])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.cleft.encode(out);
        self.cright.encode(out);
        self.sindex.encode(out);

        let width = slot_width::<T, L>();
        let mut slot = Vec::with_capacity(width);
        match self.value {
            NodeValue::Threshold(t) => t.encode(&mut slot),
            NodeValue::LeafOutput(l) => l.encode(&mut slot),
        }
        slot.resize(width, 0);
        out.extend_from_slice(&slot);

        self.data_count.encode(out);
        self.sum_hess.encode(out);
        self.gain.encode(out);
        self.split_type.encode(out);
        self.operator.encode(out);
        self.data_count_present.encode(out);
        self.sum_hess_present.encode(out);
        self.gain_present.encode(out);
        self.categories_list_right_child.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let cleft: i32 = reader.scalar()?;
        let cright: i32 = reader.scalar()?;
        let sindex: u32 = reader.scalar()?;
        let slot = reader.take(slot_width::<T, L>())?;
        let value = if cleft == -1 {
            NodeValue::LeafOutput(L::decode(&slot[..L::KIND.size()])?)
        } else {
            NodeValue::Threshold(T::decode(&slot[..T::KIND.size()])?)
        };
        Ok(Self {
            cleft,
            cright,
            sindex,
            value,
            data_count: reader.scalar()?,
            sum_hess: reader.scalar()?,
            gain: reader.scalar()?,
            split_type: reader.scalar()?,
            operator: reader.scalar()?,
            data_count_present: reader.scalar()?,
            sum_hess_present: reader.scalar()?,
            gain_present: reader.scalar()?,
            categories_list_right_child: reader.scalar()?,
        })
    }
}

/// Tree record of the 3.9 format.
///
/// Leaf-vector spans use separate begin/end arrays; matching categories
/// use a single offset array, where the current format uses begin/end
/// ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTree<T: ThresholdValue, L: LeafOutputValue> {
    pub nodes: Vec<LegacyNode<T, L>>,
    pub has_categorical_split: bool,
    pub leaf_vector: Vec<L>,
    pub leaf_vector_begin: Vec<u64>,
    pub leaf_vector_end: Vec<u64>,
    pub matching_categories: Vec<u32>,
    pub matching_categories_offset: Vec<u64>,
}

/// Legacy trees of one numeric instantiation.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyTrees {
    Float32UInt32(Vec<LegacyTree<f32, u32>>),
    Float32Float32(Vec<LegacyTree<f32, f32>>),
    Float64UInt32(Vec<LegacyTree<f64, u32>>),
    Float64Float64(Vec<LegacyTree<f64, f64>>),
}

impl LegacyTrees {
    pub fn type_pair(&self) -> TypePair {
        match self {
            Self::Float32UInt32(_) => TypePair::Float32UInt32,
            Self::Float32Float32(_) => TypePair::Float32Float32,
            Self::Float64UInt32(_) => TypePair::Float64UInt32,
            Self::Float64Float64(_) => TypePair::Float64Float64,
        }
    }

    pub fn n_trees(&self) -> usize {
        match self {
            Self::Float32UInt32(trees) => trees.len(),
            Self::Float32Float32(trees) => trees.len(),
            Self::Float64UInt32(trees) => trees.len(),
            Self::Float64Float64(trees) => trees.len(),
        }
    }
}

/// A structurally parsed 3.9 checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyModel {
    pub version: Version,
    pub num_feature: i32,
    pub task_type: LegacyTaskType,
    pub average_tree_output: bool,
    pub task_param: LegacyTaskParam,
    pub param: LegacyModelParam,
    pub trees: LegacyTrees,
}

impl LegacyModel {
    #[inline]
    pub fn type_pair(&self) -> TypePair {
        self.trees.type_pair()
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.n_trees()
    }

    /// Convert this legacy checkpoint into a current [`Model`].
    ///
    /// Not yet supported: the mapping from the legacy four-variant task
    /// type and its parameter records onto the current five-variant model
    /// is undefined, and guessing it would silently change model
    /// semantics.
    pub fn migrate(self) -> Result<Model, DeserializeError> {
        Err(DeserializeError::LegacyMigration {
            stored: self.version,
        })
    }
}

/// Parse the body of a 3.9 checkpoint, version triple already consumed.
pub(crate) fn deserialize_legacy_model<S: FieldSource>(
    source: &mut S,
    stored: Version,
) -> Result<LegacyModel, DeserializeError> {
    // The type pair is in current encoding even on the legacy path.
    let pair = read_type_pair(source)?;
    let num_tree: u64 = source.read_scalar()?;

    let num_feature: i32 = source.read_scalar()?;
    let task_tag: u8 = source.read_scalar()?;
    let task_type = LegacyTaskType::from_u8(task_tag).ok_or(DeserializeError::InvalidField {
        field: "legacy task_type",
        value: task_tag as u64,
    })?;
    let average_tree_output: bool = source.read_scalar()?;
    let task_param: LegacyTaskParam = source.read_composite()?;
    let param: LegacyModelParam = source.read_composite()?;

    skip_optional_fields(source, "model")?;

    let trees = match pair {
        TypePair::Float32UInt32 => LegacyTrees::Float32UInt32(read_trees(source, num_tree)?),
        TypePair::Float32Float32 => LegacyTrees::Float32Float32(read_trees(source, num_tree)?),
        TypePair::Float64UInt32 => LegacyTrees::Float64UInt32(read_trees(source, num_tree)?),
        TypePair::Float64Float64 => LegacyTrees::Float64Float64(read_trees(source, num_tree)?),
    };

    Ok(LegacyModel {
        version: stored,
        num_feature,
        task_type,
        average_tree_output,
        task_param,
        param,
        trees,
    })
}

fn read_trees<S: FieldSource, T: ThresholdValue, L: LeafOutputValue>(
    source: &mut S,
    num_tree: u64,
) -> Result<Vec<LegacyTree<T, L>>, DeserializeError> {
    (0..num_tree).map(|_| read_tree(source)).collect()
}

fn read_tree<S: FieldSource, T: ThresholdValue, L: LeafOutputValue>(
    source: &mut S,
) -> Result<LegacyTree<T, L>, DeserializeError> {
    let num_nodes: i32 = source.read_scalar()?;
    let declared = u64::try_from(num_nodes).map_err(|_| {
        DeserializeError::CorruptField(format!("negative node count {num_nodes}"))
    })?;
    let has_categorical_split: bool = source.read_scalar()?;

    let nodes: Vec<LegacyNode<T, L>> = source.read_composite_array()?;
    if nodes.len() as u64 != declared {
        return Err(DeserializeError::CountMismatch {
            what: "node records",
            declared,
            actual: nodes.len() as u64,
        });
    }

    let leaf_vector: Vec<L> = source.read_scalar_array()?;
    let leaf_vector_begin: Vec<u64> = source.read_scalar_array()?;
    let leaf_vector_end: Vec<u64> = source.read_scalar_array()?;
    let matching_categories: Vec<u32> = source.read_scalar_array()?;
    let matching_categories_offset: Vec<u64> = source.read_scalar_array()?;

    skip_optional_fields(source, "tree")?;
    skip_optional_fields(source, "node")?;

    Ok(LegacyTree {
        nodes,
        has_categorical_split,
        leaf_vector,
        leaf_vector_begin,
        leaf_vector_end,
        matching_categories,
        matching_categories_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_task_param_layout_keeps_pad_bytes() {
        let layout = LegacyTaskParam::layout();
        assert_eq!(layout.descriptor(), "{u8 bool x x u32 u32}");
        assert_eq!(layout.byte_size(), 12);
    }

    #[test]
    fn legacy_task_param_roundtrip() {
        let param = LegacyTaskParam {
            output_type: OutputType::Float,
            grove_per_class: true,
            num_class: 3,
            leaf_vector_size: 1,
        };
        let mut buf = Vec::new();
        param.encode(&mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(LegacyTaskParam::decode(&buf).unwrap(), param);
    }

    #[test]
    fn legacy_node_layout_differs_from_current() {
        let legacy = <LegacyNode<f32, f32> as Composite>::layout();
        let current = <crate::model::Node<f32, f32> as Composite>::layout();
        assert_eq!(
            legacy.descriptor(),
            "{i32 i32 u32 v4 u64 f64 f64 u8 u8 bool bool bool bool}"
        );
        assert_ne!(legacy.descriptor(), current.descriptor());
    }

    #[test]
    fn legacy_node_roundtrip() {
        let node = LegacyNode::<f64, f64> {
            cleft: 1,
            cright: 2,
            sindex: 5 | (1 << 31),
            value: NodeValue::Threshold(0.75),
            data_count: 42,
            sum_hess: 1.5,
            gain: 0.25,
            split_type: 1,
            operator: 2,
            data_count_present: true,
            sum_hess_present: true,
            gain_present: true,
            categories_list_right_child: false,
        };
        let mut buf = Vec::new();
        node.encode(&mut buf);
        assert_eq!(buf.len(), <LegacyNode<f64, f64> as Composite>::layout().byte_size());
        assert_eq!(<LegacyNode<f64, f64> as Composite>::decode(&buf).unwrap(), node);
    }

    #[test]
    fn migrate_is_not_yet_supported() {
        let legacy = LegacyModel {
            version: Version::new(3, 9, 0),
            num_feature: 4,
            task_type: LegacyTaskType::BinaryClfRegr,
            average_tree_output: false,
            task_param: LegacyTaskParam {
                output_type: OutputType::Float,
                grove_per_class: false,
                num_class: 1,
                leaf_vector_size: 1,
            },
            param: LegacyModelParam {
                pred_transform: b"identity".to_vec(),
                sigmoid_alpha: 1.0,
                ratio_c: 1.0,
                global_bias: 0.0,
            },
            trees: LegacyTrees::Float32Float32(Vec::new()),
        };
        assert!(matches!(
            legacy.migrate(),
            Err(DeserializeError::LegacyMigration { .. })
        ));
    }
}
