//! Typed tree storage: node records plus per-node side arrays.
//!
//! A [`Tree`] is parameterized by its numeric pair — threshold type `T` and
//! leaf-output type `L` — and owns four variable-length side arrays: leaf
//! vector values and matching-category values, each partitioned per node by
//! a [`ValueRange`] array. Range arrays always carry one entry per node;
//! `begin[i] <= end[i] <= begin[i + 1]` holds for every decoded tree.

use thiserror::Error;

use crate::error::DeserializeError;
use crate::io::field::{
    ByteReader, Composite, CompositeLayout, Member, Scalar, ScalarKind,
};

/// Marker for types usable as split thresholds.
pub trait ThresholdValue: Scalar + PartialOrd {}

impl ThresholdValue for f32 {}
impl ThresholdValue for f64 {}

/// Marker for types usable as leaf outputs.
pub trait LeafOutputValue: Scalar {}

impl LeafOutputValue for u32 {}
impl LeafOutputValue for f32 {}
impl LeafOutputValue for f64 {}

/// Width of the node value slot: the wider of the two numeric types.
fn slot_width<T: Scalar, L: Scalar>() -> usize {
    T::KIND.size().max(L::KIND.size())
}

// ============================================================================
// Node tags
// ============================================================================

/// Comparison operator applied at a numerical split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Operator {
    #[default]
    None = 0,
    Eq = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl Operator {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Eq),
            2 => Some(Self::Lt),
            3 => Some(Self::Le),
            4 => Some(Self::Gt),
            5 => Some(Self::Ge),
            _ => None,
        }
    }
}

/// Kind of feature a node splits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SplitFeatureType {
    /// Leaf nodes split on nothing.
    #[default]
    None = 0,
    Numerical = 1,
    Categorical = 2,
}

impl SplitFeatureType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Numerical),
            2 => Some(Self::Categorical),
            _ => None,
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// Content of a node's value slot.
///
/// On the wire this is a single slot of `max(size T, size L)` bytes; which
/// interpretation applies is determined by the node kind (leaf or split).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeValue<T, L> {
    /// Split threshold of an internal node.
    Threshold(T),
    /// Output value of a leaf.
    LeafOutput(L),
}

const DEFAULT_LEFT_BIT: u32 = 1 << 31;

/// A left child index of -1 marks a leaf.
const LEAF_MARKER: i32 = -1;

/// One node record.
///
/// `sindex` packs the split feature index (low 31 bits) with the
/// default-branch direction for missing values (high bit).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<T: ThresholdValue, L: LeafOutputValue> {
    pub cleft: i32,
    pub cright: i32,
    sindex: u32,
    pub value: NodeValue<T, L>,
    pub operator: Operator,
    pub split_type: SplitFeatureType,
    /// Number of training samples that reached this node, if recorded.
    pub data_count: Option<u64>,
    /// Sum of Hessian values over those samples, if recorded.
    pub sum_hess: Option<f64>,
    /// Split gain, if recorded.
    pub gain: Option<f64>,
    /// Whether the node's matching-category list belongs to the right child.
    pub categories_list_right_child: bool,
}

impl<T: ThresholdValue, L: LeafOutputValue> Node<T, L> {
    /// Create a leaf node.
    pub fn leaf(value: L) -> Self {
        Self {
            cleft: LEAF_MARKER,
            cright: LEAF_MARKER,
            sindex: 0,
            value: NodeValue::LeafOutput(value),
            operator: Operator::None,
            split_type: SplitFeatureType::None,
            data_count: None,
            sum_hess: None,
            gain: None,
            categories_list_right_child: false,
        }
    }

    /// Create a numerical split node.
    pub fn numerical_split(
        feature: u32,
        operator: Operator,
        threshold: T,
        default_left: bool,
        cleft: i32,
        cright: i32,
    ) -> Self {
        Self {
            cleft,
            cright,
            sindex: pack_sindex(feature, default_left),
            value: NodeValue::Threshold(threshold),
            operator,
            split_type: SplitFeatureType::Numerical,
            data_count: None,
            sum_hess: None,
            gain: None,
            categories_list_right_child: false,
        }
    }

    /// Create a categorical split node. The category list itself lives in
    /// the tree's matching-categories array.
    pub fn categorical_split(
        feature: u32,
        default_left: bool,
        categories_list_right_child: bool,
        cleft: i32,
        cright: i32,
    ) -> Self {
        Self {
            cleft,
            cright,
            sindex: pack_sindex(feature, default_left),
            value: NodeValue::Threshold(T::default()),
            operator: Operator::None,
            split_type: SplitFeatureType::Categorical,
            data_count: None,
            sum_hess: None,
            gain: None,
            categories_list_right_child,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.cleft == LEAF_MARKER
    }

    /// Split feature index (low 31 bits of the packed field).
    #[inline]
    pub fn split_index(&self) -> u32 {
        self.sindex & !DEFAULT_LEFT_BIT
    }

    /// Default direction for missing values (true = left).
    #[inline]
    pub fn default_left(&self) -> bool {
        self.sindex & DEFAULT_LEFT_BIT != 0
    }
}

fn pack_sindex(feature: u32, default_left: bool) -> u32 {
    debug_assert!(feature < DEFAULT_LEFT_BIT, "feature index out of range");
    if default_left {
        feature | DEFAULT_LEFT_BIT
    } else {
        feature
    }
}

impl<T: ThresholdValue, L: LeafOutputValue> Composite for Node<T, L> {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::Int32),   // cleft
            Member::Scalar(ScalarKind::Int32),   // cright
            Member::Scalar(ScalarKind::UInt32),  // packed split index
            Member::Slot(slot_width::<T, L>()),  // threshold / leaf output
            Member::Scalar(ScalarKind::UInt8),   // operator
            Member::Scalar(ScalarKind::UInt8),   // split feature type
            Member::Scalar(ScalarKind::Bool),    // data_count present
            Member::Scalar(ScalarKind::Bool),    // sum_hess present
            Member::Scalar(ScalarKind::Bool),    // gain present
            Member::Scalar(ScalarKind::Bool),    // categories list right child
            Member::Scalar(ScalarKind::UInt64),  // data_count
            Member::Scalar(ScalarKind::Float64), // sum_hess
            Member::Scalar(ScalarKind::Float64), // gain
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

        (self.operator as u8).encode(out);
        (self.split_type as u8).encode(out);
        self.data_count.is_some().encode(out);
        self.sum_hess.is_some().encode(out);
        self.gain.is_some().encode(out);
        self.categories_list_right_child.encode(out);
        self.data_count.unwrap_or(0).encode(out);
        self.sum_hess.unwrap_or(0.0).encode(out);
        self.gain.unwrap_or(0.0).encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        let cleft: i32 = reader.scalar()?;
        let cright: i32 = reader.scalar()?;
        let sindex: u32 = reader.scalar()?;
        let slot = reader.take(slot_width::<T, L>())?;
        let operator_tag: u8 = reader.scalar()?;
        let split_tag: u8 = reader.scalar()?;
        let data_count_present: bool = reader.scalar()?;
        let sum_hess_present: bool = reader.scalar()?;
        let gain_present: bool = reader.scalar()?;
        let categories_list_right_child: bool = reader.scalar()?;
        let data_count: u64 = reader.scalar()?;
        let sum_hess: f64 = reader.scalar()?;
        let gain: f64 = reader.scalar()?;

        let value = if cleft == LEAF_MARKER {
            NodeValue::LeafOutput(L::decode(&slot[..L::KIND.size()])?)
        } else {
            NodeValue::Threshold(T::decode(&slot[..T::KIND.size()])?)
        };

        Ok(Self {
            cleft,
            cright,
            sindex,
            value,
            operator: Operator::from_u8(operator_tag).ok_or(DeserializeError::InvalidField {
                field: "operator",
                value: operator_tag as u64,
            })?,
            split_type: SplitFeatureType::from_u8(split_tag).ok_or(
                DeserializeError::InvalidField {
                    field: "split_type",
                    value: split_tag as u64,
                },
            )?,
            data_count: data_count_present.then_some(data_count),
            sum_hess: sum_hess_present.then_some(sum_hess),
            gain: gain_present.then_some(gain),
            categories_list_right_child,
        })
    }
}

// ============================================================================
// ValueRange
// ============================================================================

/// Half-open span `[begin, end)` of one node in a side array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueRange {
    pub begin: u64,
    pub end: u64,
}

impl ValueRange {
    #[inline]
    pub fn len(&self) -> usize {
        (self.end - self.begin) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl Composite for ValueRange {
    fn layout() -> CompositeLayout {
        CompositeLayout::new(vec![
            Member::Scalar(ScalarKind::UInt64),
            Member::Scalar(ScalarKind::UInt64),
        ])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.begin.encode(out);
        self.end.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let mut reader = ByteReader::new(bytes);
        Ok(Self {
            begin: reader.scalar()?,
            end: reader.scalar()?,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Structural invariant violations detected after decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeValidationError {
    #[error("{array} range array has {actual} entries for {expected} nodes")]
    RangeCount {
        array: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{array} ranges out of order at node {node}")]
    RangeOrder { array: &'static str, node: usize },

    #[error("{array} ranges exceed the value array length {len}")]
    RangeOutOfBounds { array: &'static str, len: usize },

    #[error("node {node} references out-of-bounds child {child}")]
    ChildOutOfBounds { node: usize, child: i32 },
}

fn check_ranges(
    array: &'static str,
    ranges: &[ValueRange],
    n_nodes: usize,
    values_len: usize,
) -> Result<(), TreeValidationError> {
    if ranges.len() != n_nodes {
        return Err(TreeValidationError::RangeCount {
            array,
            expected: n_nodes,
            actual: ranges.len(),
        });
    }
    for (node, range) in ranges.iter().enumerate() {
        if range.begin > range.end {
            return Err(TreeValidationError::RangeOrder { array, node });
        }
        if let Some(next) = ranges.get(node + 1) {
            if range.end > next.begin {
                return Err(TreeValidationError::RangeOrder { array, node });
            }
        }
        if range.end > values_len as u64 {
            return Err(TreeValidationError::RangeOutOfBounds {
                array,
                len: values_len,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tree
// ============================================================================

/// One decision tree: node array plus per-node side arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<T: ThresholdValue, L: LeafOutputValue> {
    nodes: Vec<Node<T, L>>,
    has_categorical_split: bool,
    leaf_vector: Vec<L>,
    leaf_vector_ranges: Vec<ValueRange>,
    matching_categories: Vec<u32>,
    matching_categories_ranges: Vec<ValueRange>,
}

impl<T: ThresholdValue, L: LeafOutputValue> Default for Tree<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ThresholdValue, L: LeafOutputValue> Tree<T, L> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            has_categorical_split: false,
            leaf_vector: Vec::new(),
            leaf_vector_ranges: Vec::new(),
            matching_categories: Vec::new(),
            matching_categories_ranges: Vec::new(),
        }
    }

    /// Assemble a tree from decoded parts. Callers run [`Tree::validate`].
    pub(crate) fn from_parts(
        nodes: Vec<Node<T, L>>,
        has_categorical_split: bool,
        leaf_vector: Vec<L>,
        leaf_vector_ranges: Vec<ValueRange>,
        matching_categories: Vec<u32>,
        matching_categories_ranges: Vec<ValueRange>,
    ) -> Self {
        Self {
            nodes,
            has_categorical_split,
            leaf_vector,
            leaf_vector_ranges,
            matching_categories,
            matching_categories_ranges,
        }
    }

    fn push(&mut self, node: Node<T, L>, leaf_values: &[L], categories: &[u32]) -> usize {
        let id = self.nodes.len();

        let begin = self.leaf_vector.len() as u64;
        self.leaf_vector.extend_from_slice(leaf_values);
        self.leaf_vector_ranges.push(ValueRange {
            begin,
            end: self.leaf_vector.len() as u64,
        });

        let begin = self.matching_categories.len() as u64;
        self.matching_categories.extend_from_slice(categories);
        self.matching_categories_ranges.push(ValueRange {
            begin,
            end: self.matching_categories.len() as u64,
        });

        self.nodes.push(node);
        id
    }

    /// Append a scalar leaf. Returns the new node's index.
    pub fn push_leaf(&mut self, value: L) -> usize {
        self.push(Node::leaf(value), &[], &[])
    }

    /// Append a leaf that predicts a vector of values.
    pub fn push_vector_leaf(&mut self, values: &[L]) -> usize {
        self.push(Node::leaf(L::default()), values, &[])
    }

    /// Append a numerical split node with explicit child indices.
    pub fn push_numerical_split(
        &mut self,
        feature: u32,
        operator: Operator,
        threshold: T,
        default_left: bool,
        cleft: usize,
        cright: usize,
    ) -> usize {
        self.push(
            Node::numerical_split(
                feature,
                operator,
                threshold,
                default_left,
                cleft as i32,
                cright as i32,
            ),
            &[],
            &[],
        )
    }

    /// Append a categorical split node with explicit child indices.
    ///
    /// `categories` is the matching-category list routed to the child named
    /// by `categories_list_right_child`.
    pub fn push_categorical_split(
        &mut self,
        feature: u32,
        default_left: bool,
        categories: &[u32],
        categories_list_right_child: bool,
        cleft: usize,
        cright: usize,
    ) -> usize {
        self.has_categorical_split = true;
        self.push(
            Node::categorical_split(
                feature,
                default_left,
                categories_list_right_child,
                cleft as i32,
                cright as i32,
            ),
            &[],
            categories,
        )
    }

    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn nodes(&self) -> &[Node<T, L>] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, id: usize) -> &Node<T, L> {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: usize) -> &mut Node<T, L> {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn is_leaf(&self, id: usize) -> bool {
        self.nodes[id].is_leaf()
    }

    /// Whether any split in this tree is categorical.
    #[inline]
    pub fn has_categorical_split(&self) -> bool {
        self.has_categorical_split
    }

    /// Leaf-vector values of one node.
    pub fn leaf_vector(&self, id: usize) -> &[L] {
        let range = self.leaf_vector_ranges[id];
        &self.leaf_vector[range.begin as usize..range.end as usize]
    }

    /// Matching-category values of one node.
    pub fn matching_categories(&self, id: usize) -> &[u32] {
        let range = self.matching_categories_ranges[id];
        &self.matching_categories[range.begin as usize..range.end as usize]
    }

    #[inline]
    pub(crate) fn leaf_vector_values(&self) -> &[L] {
        &self.leaf_vector
    }

    #[inline]
    pub(crate) fn leaf_vector_ranges(&self) -> &[ValueRange] {
        &self.leaf_vector_ranges
    }

    #[inline]
    pub(crate) fn matching_categories_values(&self) -> &[u32] {
        &self.matching_categories
    }

    #[inline]
    pub(crate) fn matching_categories_ranges(&self) -> &[ValueRange] {
        &self.matching_categories_ranges
    }

    /// Check the structural invariants of this tree.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.nodes.len();
        check_ranges(
            "leaf vector",
            &self.leaf_vector_ranges,
            n_nodes,
            self.leaf_vector.len(),
        )?;
        check_ranges(
            "matching categories",
            &self.matching_categories_ranges,
            n_nodes,
            self.matching_categories.len(),
        )?;

        for (id, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            for child in [node.cleft, node.cright] {
                if child < 0 || child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds { node: id, child });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_tree() -> Tree<f32, f32> {
        // root: feat0 < 0.5, leaves 1.0 / 2.0
        let mut tree = Tree::new();
        tree.push_numerical_split(0, Operator::Lt, 0.5, true, 1, 2);
        tree.push_leaf(1.0);
        tree.push_leaf(2.0);
        tree
    }

    #[test]
    fn builder_keeps_ranges_per_node() {
        let tree = simple_tree();
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.leaf_vector_ranges().len(), 3);
        assert_eq!(tree.matching_categories_ranges().len(), 3);
        tree.validate().unwrap();
    }

    #[test]
    fn sindex_packing() {
        let node: Node<f32, f32> = Node::numerical_split(17, Operator::Lt, 0.5, true, 1, 2);
        assert_eq!(node.split_index(), 17);
        assert!(node.default_left());

        let node: Node<f32, f32> = Node::numerical_split(17, Operator::Lt, 0.5, false, 1, 2);
        assert!(!node.default_left());
    }

    #[test]
    fn categorical_split_stores_categories() {
        let mut tree: Tree<f64, f64> = Tree::new();
        tree.push_categorical_split(3, false, &[1, 4, 9], true, 1, 2);
        tree.push_leaf(-1.0);
        tree.push_leaf(1.0);

        assert!(tree.has_categorical_split());
        assert_eq!(tree.matching_categories(0), &[1, 4, 9]);
        assert!(tree.matching_categories(1).is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn vector_leaf_values() {
        let mut tree: Tree<f32, f32> = Tree::new();
        tree.push_vector_leaf(&[0.25, 0.75]);
        assert_eq!(tree.leaf_vector(0), &[0.25, 0.75]);
        tree.validate().unwrap();
    }

    #[test]
    fn node_record_roundtrip_wide_slot() {
        // (f32, u32) slot is 4 bytes; (f64, u32) slot is 8.
        let mut node: Node<f64, u32> = Node::numerical_split(2, Operator::Ge, 1.25, false, 1, 2);
        node.data_count = Some(100);
        node.gain = Some(0.5);

        let layout = <Node<f64, u32> as Composite>::layout();
        assert_eq!(layout.descriptor(), "{i32 i32 u32 v8 u8 u8 bool bool bool bool u64 f64 f64}");

        let mut buf = Vec::new();
        node.encode(&mut buf);
        assert_eq!(buf.len(), layout.byte_size());

        let decoded = <Node<f64, u32> as Composite>::decode(&buf).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.sum_hess, None);
    }

    #[test]
    fn leaf_value_decoded_from_slot() {
        let node: Node<f32, u32> = Node::leaf(7);
        let mut buf = Vec::new();
        node.encode(&mut buf);

        let decoded = <Node<f32, u32> as Composite>::decode(&buf).unwrap();
        assert!(decoded.is_leaf());
        assert_eq!(decoded.value, NodeValue::LeafOutput(7));
    }

    #[test]
    fn validate_rejects_overlapping_ranges() {
        let tree: Tree<f32, f32> = Tree::from_parts(
            vec![Node::leaf(0.0), Node::leaf(1.0)],
            false,
            vec![0.5, 0.6],
            vec![ValueRange { begin: 0, end: 2 }, ValueRange { begin: 1, end: 2 }],
            Vec::new(),
            vec![ValueRange::default(), ValueRange::default()],
        );
        assert!(matches!(
            tree.validate(),
            Err(TreeValidationError::RangeOrder { node: 0, .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_bounds_child() {
        let tree: Tree<f32, f32> = Tree::from_parts(
            vec![Node::numerical_split(0, Operator::Lt, 0.5, true, 1, 9)],
            false,
            Vec::new(),
            vec![ValueRange::default()],
            Vec::new(),
            vec![ValueRange::default()],
        );
        assert!(matches!(
            tree.validate(),
            Err(TreeValidationError::ChildOutOfBounds { child: 9, .. })
        ));
    }
}
