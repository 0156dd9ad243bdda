//! Checkpoint encoder.
//!
//! Encoding is a pure function of the model's logical state plus the
//! current library version: two encodes of an unchanged model produce
//! byte-identical output on the same transport. The stored version triple
//! is always the *current* version, regardless of `model.version`.

use crate::dispatch_model;
use crate::error::SerializeError;
use crate::io::field::FieldSink;
use crate::model::tree::{LeafOutputValue, ThresholdValue, Tree};
use crate::model::Model;
use crate::version::{VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};

/// Encodes a [`Model`] into a chosen transport sink.
#[derive(Debug)]
pub struct Serializer<S: FieldSink> {
    sink: S,
}

impl<S: FieldSink> Serializer<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Hand back the sink with the encoded fields.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Encode the full checkpoint: header, then tree bodies.
    pub fn serialize(&mut self, model: &Model) -> Result<(), SerializeError> {
        self.serialize_header(model)?;
        self.serialize_trees(model)
    }

    /// Encode the header: version stamp, numeric type pair, tree count,
    /// task metadata, and the reserved per-model optional-field slot.
    pub fn serialize_header(&mut self, model: &Model) -> Result<(), SerializeError> {
        self.sink.write_scalar(VERSION_MAJOR)?;
        self.sink.write_scalar(VERSION_MINOR)?;
        self.sink.write_scalar(VERSION_PATCH)?;

        let pair = model.type_pair();
        self.sink.write_scalar(pair.threshold_type() as u8)?;
        self.sink.write_scalar(pair.leaf_output_type() as u8)?;

        self.sink.write_scalar(model.n_trees() as u64)?;

        self.sink.write_scalar(model.num_feature)?;
        self.sink.write_scalar(model.task_type as u8)?;
        self.sink.write_scalar(model.average_tree_output)?;
        self.sink.write_composite(&model.task_param)?;
        self.sink.write_composite(&model.param)?;

        // Extension slot 1: per-model optional fields. Reserved; the
        // current version never populates it.
        self.sink.write_scalar(0i32)?;
        Ok(())
    }

    /// Encode every tree, in order, validating the declared count.
    pub fn serialize_trees(&mut self, model: &Model) -> Result<(), SerializeError> {
        let declared = model.n_trees() as u64;
        dispatch_model!(&model.variant, |forest| {
            let actual = forest.n_trees() as u64;
            if actual != declared {
                return Err(SerializeError::TreeCountMismatch { declared, actual });
            }
            for tree in &forest.trees {
                self.serialize_tree(tree)?;
            }
            Ok(())
        })
    }

    fn serialize_tree<T: ThresholdValue, L: LeafOutputValue>(
        &mut self,
        tree: &Tree<T, L>,
    ) -> Result<(), SerializeError> {
        self.sink.write_scalar(tree.n_nodes() as i32)?;
        self.sink.write_scalar(tree.has_categorical_split())?;
        self.sink.write_composite_array(tree.nodes())?;
        self.sink.write_scalar_array(tree.leaf_vector_values())?;
        self.sink.write_composite_array(tree.leaf_vector_ranges())?;
        self.sink.write_scalar_array(tree.matching_categories_values())?;
        self.sink.write_composite_array(tree.matching_categories_ranges())?;

        // Extension slots 2 and 3: per-tree / per-node optional fields.
        self.sink.write_scalar(0i32)?;
        self.sink.write_scalar(0i32)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::frame::FrameSink;
    use crate::model::{TaskType, TypePair};
    use crate::version::VERSION_MAJOR;

    #[test]
    fn header_starts_with_version_stamp() {
        let model = Model::new(TypePair::Float32Float32, TaskType::Regressor);
        let mut serializer = Serializer::new(FrameSink::new());
        serializer.serialize(&model).unwrap();
        let frames = serializer.into_sink().into_frames();

        // version triple, two type tags, tree count, ...
        assert_eq!(frames[0].descriptor, "i32");
        assert_eq!(
            frames[0].data,
            VERSION_MAJOR.to_le_bytes().to_vec()
        );
        assert_eq!(frames[3].descriptor, "u8");
        assert_eq!(frames[5].descriptor, "u64");
    }

    #[test]
    fn empty_model_writes_reserved_slot() {
        let model = Model::new(TypePair::Float64Float64, TaskType::BinaryClf);
        let mut serializer = Serializer::new(FrameSink::new());
        serializer.serialize(&model).unwrap();
        let frames = serializer.into_sink().into_frames();

        // Last header field of a tree-less model is the reserved
        // per-model optional-field count, written as zero.
        let last = frames.last().unwrap();
        assert_eq!(last.descriptor, "i32");
        assert_eq!(last.data, 0i32.to_le_bytes().to_vec());
    }
}
