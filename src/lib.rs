//! canopy: portable versioned binary checkpoints for decision-tree
//! ensemble models.
//!
//! A [`Model`] — a tree ensemble parameterized by one of a closed set of
//! (threshold, leaf output) numeric pairs — round-trips through a
//! version-stamped binary artifact over either of two transports: an
//! in-memory sequence of framed buffers, or a sequential byte stream.
//!
//! Version compatibility: the stored major version must match the current
//! one, except for the single supported 3.9 legacy checkpoint (readable
//! structurally, with a warning). A newer stored *minor* version is
//! accepted with a warning; its unknown trailing fields are skipped via
//! the reserved optional-field slots.
//!
//! # Example
//!
//! ```ignore
//! use canopy::model::{Model, ModelVariant, TaskType, Tree, TypePair, Operator};
//!
//! let mut model = Model::new(TypePair::Float32Float32, TaskType::Regressor);
//! model.num_feature = 10;
//! if let ModelVariant::Float32Float32(forest) = &mut model.variant {
//!     let mut tree = Tree::new();
//!     tree.push_numerical_split(0, Operator::Lt, 0.5, true, 1, 2);
//!     tree.push_leaf(-1.0);
//!     tree.push_leaf(1.0);
//!     forest.push(tree);
//! }
//!
//! let mut bytes = Vec::new();
//! model.serialize_to(&mut bytes)?;
//! let restored = Model::deserialize_from(bytes.as_slice())?;
//! assert_eq!(restored, model);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod io;
pub mod model;
pub mod version;

pub use error::{DeserializeError, SerializeError};
pub use io::{AnyModel, Deserializer, Frame, LegacyModel, Serializer};
pub use model::{Model, ModelVariant, TaskType, TypeInfo, TypePair};
pub use version::Version;
