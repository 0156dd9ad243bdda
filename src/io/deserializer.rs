//! Checkpoint decoder and version negotiation.
//!
//! The stored version triple is always read first; the negotiation outcome
//! (accept / warn / migrate / reject) is fixed before any body field is
//! touched. The numeric type pair is read next — in current encoding on
//! every path — and used to allocate the correctly-typed model, which is
//! then filled in by either the current-layout or the legacy-layout parse.

use tracing::warn;

use crate::error::DeserializeError;
use crate::io::field::FieldSource;
use crate::io::legacy::{self, LegacyModel};
use crate::model::tree::{LeafOutputValue, Node, ThresholdValue, Tree, ValueRange};
use crate::model::{
    Forest, Model, ModelParam, ModelVariant, TaskParam, TaskType, TypeInfo, TypePair,
};
use crate::version::{negotiate, Version, VersionAction};

/// Outcome of decoding a checkpoint of any readable version.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyModel {
    /// A current-format model.
    Current(Model),
    /// A structurally parsed 3.9 legacy checkpoint. Converting it into a
    /// current [`Model`] is a separate, currently unsupported step — see
    /// [`LegacyModel::migrate`].
    LegacyV3(LegacyModel),
}

/// Decodes a [`Model`] from a chosen transport source.
#[derive(Debug)]
pub struct Deserializer<S: FieldSource> {
    source: S,
}

impl<S: FieldSource> Deserializer<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Hand back the underlying source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Decode a checkpoint, requiring a current-format model.
    ///
    /// A 3.9 legacy checkpoint parses structurally but fails with
    /// [`DeserializeError::LegacyMigration`], since its task metadata has
    /// no defined mapping onto the current model.
    pub fn deserialize(&mut self) -> Result<Model, DeserializeError> {
        match self.deserialize_any()? {
            AnyModel::Current(model) => Ok(model),
            AnyModel::LegacyV3(legacy) => legacy.migrate(),
        }
    }

    /// Decode a checkpoint of any readable version.
    pub fn deserialize_any(&mut self) -> Result<AnyModel, DeserializeError> {
        let stored = Version::new(
            self.source.read_scalar()?,
            self.source.read_scalar()?,
            self.source.read_scalar()?,
        );

        match negotiate(stored) {
            VersionAction::Reject => Err(DeserializeError::UnsupportedVersion {
                stored,
                current: Version::CURRENT,
            }),
            VersionAction::LegacyMigrate => {
                warn!(
                    stored = %stored,
                    current = %Version::CURRENT,
                    "loading a legacy checkpoint; re-save the original model with the \
                     current version to use newer functionality"
                );
                let legacy = legacy::deserialize_legacy_model(&mut self.source, stored)?;
                Ok(AnyModel::LegacyV3(legacy))
            }
            VersionAction::WarnForward => {
                warn!(
                    stored = %stored,
                    current = %Version::CURRENT,
                    "checkpoint was written by a newer minor version; unknown optional \
                     fields will be skipped"
                );
                Ok(AnyModel::Current(self.deserialize_current(stored)?))
            }
            VersionAction::Accept => Ok(AnyModel::Current(self.deserialize_current(stored)?)),
        }
    }

    fn deserialize_current(&mut self, stored: Version) -> Result<Model, DeserializeError> {
        let pair = read_type_pair(&mut self.source)?;
        let num_tree: u64 = self.source.read_scalar()?;

        let num_feature: i32 = self.source.read_scalar()?;
        let task_tag: u8 = self.source.read_scalar()?;
        let task_type = TaskType::from_u8(task_tag).ok_or(DeserializeError::InvalidField {
            field: "task_type",
            value: task_tag as u64,
        })?;
        let average_tree_output: bool = self.source.read_scalar()?;
        let task_param: TaskParam = self.source.read_composite()?;
        let param: ModelParam = self.source.read_composite()?;

        // Extension slot 1: per-model optional fields.
        skip_optional_fields(&mut self.source, "model")?;

        // Explicit dispatch from the type-pair tag to the concrete
        // tree-container operations.
        let variant = match pair {
            TypePair::Float32UInt32 => ModelVariant::Float32UInt32(self.read_forest(num_tree)?),
            TypePair::Float32Float32 => ModelVariant::Float32Float32(self.read_forest(num_tree)?),
            TypePair::Float64UInt32 => ModelVariant::Float64UInt32(self.read_forest(num_tree)?),
            TypePair::Float64Float64 => ModelVariant::Float64Float64(self.read_forest(num_tree)?),
        };

        Ok(Model {
            version: stored,
            num_feature,
            task_type,
            average_tree_output,
            task_param,
            param,
            variant,
        })
    }

    fn read_forest<T: ThresholdValue, L: LeafOutputValue>(
        &mut self,
        num_tree: u64,
    ) -> Result<Forest<T, L>, DeserializeError> {
        let mut forest = Forest::new();
        for _ in 0..num_tree {
            forest.push(self.read_tree()?);
        }
        Ok(forest)
    }

    fn read_tree<T: ThresholdValue, L: LeafOutputValue>(
        &mut self,
    ) -> Result<Tree<T, L>, DeserializeError> {
        let num_nodes: i32 = self.source.read_scalar()?;
        let declared = u64::try_from(num_nodes).map_err(|_| {
            DeserializeError::CorruptField(format!("negative node count {num_nodes}"))
        })?;
        let has_categorical_split: bool = self.source.read_scalar()?;

        let nodes: Vec<Node<T, L>> = self.source.read_composite_array()?;
        if nodes.len() as u64 != declared {
            return Err(DeserializeError::CountMismatch {
                what: "node records",
                declared,
                actual: nodes.len() as u64,
            });
        }

        let leaf_vector: Vec<L> = self.source.read_scalar_array()?;
        let leaf_vector_ranges: Vec<ValueRange> = self.source.read_composite_array()?;
        let matching_categories: Vec<u32> = self.source.read_scalar_array()?;
        let matching_categories_ranges: Vec<ValueRange> = self.source.read_composite_array()?;

        // Extension slots 2 and 3: per-tree / per-node optional fields.
        skip_optional_fields(&mut self.source, "tree")?;
        skip_optional_fields(&mut self.source, "node")?;

        let tree = Tree::from_parts(
            nodes,
            has_categorical_split,
            leaf_vector,
            leaf_vector_ranges,
            matching_categories,
            matching_categories_ranges,
        );
        tree.validate()?;
        Ok(tree)
    }
}

/// Read the numeric type pair, always in current encoding.
pub(crate) fn read_type_pair<S: FieldSource>(source: &mut S) -> Result<TypePair, DeserializeError> {
    let threshold_tag: u8 = source.read_scalar()?;
    let leaf_tag: u8 = source.read_scalar()?;
    let threshold = TypeInfo::from_u8(threshold_tag).ok_or(DeserializeError::InvalidField {
        field: "threshold_type",
        value: threshold_tag as u64,
    })?;
    let leaf_output = TypeInfo::from_u8(leaf_tag).ok_or(DeserializeError::InvalidField {
        field: "leaf_output_type",
        value: leaf_tag as u64,
    })?;
    TypePair::from_tags(threshold, leaf_output)
}

/// Read an optional-field count and skip exactly that many fields.
pub(crate) fn skip_optional_fields<S: FieldSource>(
    source: &mut S,
    slot: &str,
) -> Result<(), DeserializeError> {
    let count: i32 = source.read_scalar()?;
    if count < 0 {
        return Err(DeserializeError::CorruptField(format!(
            "negative {slot} optional-field count {count}"
        )));
    }
    for _ in 0..count {
        source.skip_optional_field()?;
    }
    Ok(())
}
