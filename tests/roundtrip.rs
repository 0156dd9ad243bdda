//! Round-trip and transport-equivalence tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use canopy::model::{
    Model, ModelVariant, Operator, OutputType, TaskType, Tree, TypePair,
};
use canopy::Version;

/// The worked example: (f32, f32), 10 features, regressor, one tree with
/// one internal split and two leaves.
fn regressor_example() -> Model {
    let mut model = Model::new(TypePair::Float32Float32, TaskType::Regressor);
    model.num_feature = 10;
    if let ModelVariant::Float32Float32(forest) = &mut model.variant {
        let mut tree = Tree::new();
        tree.push_numerical_split(3, Operator::Lt, 0.5, true, 1, 2);
        tree.push_leaf(-1.0);
        tree.push_leaf(1.0);
        forest.push(tree);
    }
    model
}

/// A multiclass model exercising vector leaves, categorical splits, and
/// optional training statistics.
fn multiclass_example() -> Model {
    let mut model = Model::new(TypePair::Float64Float64, TaskType::MultiClf);
    model.num_feature = 6;
    model.average_tree_output = true;
    model.task_param.num_class = 3;
    model.task_param.leaf_vector_size = 3;
    model.task_param.output_type = OutputType::Float;
    model.param.set_pred_transform("softmax").unwrap();
    model.param.global_bias = 0.5;

    if let ModelVariant::Float64Float64(forest) = &mut model.variant {
        let mut tree = Tree::new();
        tree.push_categorical_split(2, false, &[0, 3, 7], true, 1, 2);
        tree.push_vector_leaf(&[0.1, 0.2, 0.7]);
        tree.push_vector_leaf(&[0.6, 0.3, 0.1]);
        {
            let root = tree.node_mut(0);
            root.data_count = Some(1024);
            root.sum_hess = Some(256.5);
            root.gain = Some(0.125);
        }
        forest.push(tree);

        let mut tree = Tree::new();
        tree.push_numerical_split(5, Operator::Ge, -2.5, false, 1, 2);
        tree.push_vector_leaf(&[0.4, 0.4, 0.2]);
        tree.push_vector_leaf(&[0.2, 0.2, 0.6]);
        forest.push(tree);
    }
    model
}

/// A small model for each supported numeric instantiation.
fn model_for_pair(pair: TypePair) -> Model {
    let mut model = Model::new(pair, TaskType::Regressor);
    model.num_feature = 3;
    match &mut model.variant {
        ModelVariant::Float32UInt32(forest) => {
            let mut tree = Tree::new();
            tree.push_numerical_split(0, Operator::Lt, 0.5f32, true, 1, 2);
            tree.push_leaf(1u32);
            tree.push_leaf(2u32);
            forest.push(tree);
        }
        ModelVariant::Float32Float32(forest) => {
            let mut tree = Tree::new();
            tree.push_numerical_split(0, Operator::Lt, 0.5f32, true, 1, 2);
            tree.push_leaf(1.0f32);
            tree.push_leaf(2.0f32);
            forest.push(tree);
        }
        ModelVariant::Float64UInt32(forest) => {
            let mut tree = Tree::new();
            tree.push_numerical_split(0, Operator::Lt, 0.5f64, true, 1, 2);
            tree.push_leaf(1u32);
            tree.push_leaf(2u32);
            forest.push(tree);
        }
        ModelVariant::Float64Float64(forest) => {
            let mut tree = Tree::new();
            tree.push_numerical_split(0, Operator::Lt, 0.5f64, true, 1, 2);
            tree.push_leaf(1.0f64);
            tree.push_leaf(2.0f64);
            forest.push(tree);
        }
    }
    model
}

fn random_model(seed: u64) -> Model {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = Model::new(TypePair::Float32Float32, TaskType::BinaryClf);
    model.num_feature = 8;
    if let ModelVariant::Float32Float32(forest) = &mut model.variant {
        for _ in 0..rng.gen_range(3..12) {
            let mut tree = Tree::new();
            if rng.gen_bool(0.25) {
                let categories: Vec<u32> = (0..rng.gen_range(1..6)).map(|_| rng.gen_range(0..32)).collect();
                tree.push_categorical_split(
                    rng.gen_range(0..8),
                    rng.gen(),
                    &categories,
                    rng.gen(),
                    1,
                    2,
                );
            } else {
                tree.push_numerical_split(
                    rng.gen_range(0..8),
                    Operator::Lt,
                    rng.gen::<f32>() * 4.0 - 2.0,
                    rng.gen(),
                    1,
                    2,
                );
            }
            if rng.gen_bool(0.5) {
                let root = tree.node_mut(0);
                root.data_count = Some(rng.gen_range(1..100_000));
                root.sum_hess = Some(rng.gen::<f64>() * 100.0);
            }
            tree.push_leaf(rng.gen::<f32>() * 2.0 - 1.0);
            tree.push_leaf(rng.gen::<f32>() * 2.0 - 1.0);
            forest.push(tree);
        }
    }
    model
}

#[test]
fn frame_roundtrip_reproduces_regressor_example() {
    let model = regressor_example();
    let frames = model.to_frames().unwrap();
    let restored = Model::from_frames(&frames).unwrap();

    assert_eq!(restored, model);
    assert_eq!(restored.num_feature, 10);
    assert_eq!(restored.task_type, TaskType::Regressor);
    assert_eq!(restored.n_trees(), 1);
    if let ModelVariant::Float32Float32(forest) = &restored.variant {
        assert_eq!(forest.trees[0].n_nodes(), 3);
        assert!(forest.trees[0].is_leaf(1));
        assert!(!forest.trees[0].is_leaf(0));
    } else {
        panic!("wrong variant");
    }
}

#[test]
fn stream_roundtrip_reproduces_regressor_example() {
    let model = regressor_example();
    let mut bytes = Vec::new();
    model.serialize_to(&mut bytes).unwrap();
    let restored = Model::deserialize_from(bytes.as_slice()).unwrap();
    assert_eq!(restored, model);
}

#[test]
fn roundtrip_every_supported_type_pair() {
    for pair in TypePair::ALL {
        let model = model_for_pair(pair);

        let frames = model.to_frames().unwrap();
        assert_eq!(Model::from_frames(&frames).unwrap(), model, "{pair:?} via frames");

        let mut bytes = Vec::new();
        model.serialize_to(&mut bytes).unwrap();
        assert_eq!(
            Model::deserialize_from(bytes.as_slice()).unwrap(),
            model,
            "{pair:?} via stream"
        );
    }
}

#[test]
fn roundtrip_vector_leaves_categories_and_stats() {
    let model = multiclass_example();
    let mut bytes = Vec::new();
    model.serialize_to(&mut bytes).unwrap();
    let restored = Model::deserialize_from(bytes.as_slice()).unwrap();
    assert_eq!(restored, model);

    if let ModelVariant::Float64Float64(forest) = &restored.variant {
        let tree = &forest.trees[0];
        assert!(tree.has_categorical_split());
        assert_eq!(tree.matching_categories(0), &[0, 3, 7]);
        assert_eq!(tree.leaf_vector(1), &[0.1, 0.2, 0.7]);
        assert_eq!(tree.node(0).data_count, Some(1024));
        assert_eq!(tree.node(0).gain, Some(0.125));
        assert_eq!(tree.node(1).data_count, None);
    } else {
        panic!("wrong variant");
    }
}

#[test]
fn transport_equivalence() {
    let model = multiclass_example();

    let frames = model.to_frames().unwrap();
    let from_frames = Model::from_frames(&frames).unwrap();

    let mut bytes = Vec::new();
    model.serialize_to(&mut bytes).unwrap();
    let from_stream = Model::deserialize_from(bytes.as_slice()).unwrap();

    assert_eq!(from_frames, from_stream);
    assert_eq!(from_frames, model);
}

#[test]
fn encoding_is_deterministic() {
    let model = multiclass_example();

    let mut first = Vec::new();
    model.serialize_to(&mut first).unwrap();
    let mut second = Vec::new();
    model.serialize_to(&mut second).unwrap();
    assert_eq!(first, second);

    assert_eq!(model.to_frames().unwrap(), model.to_frames().unwrap());
}

#[test]
fn randomized_forests_roundtrip() {
    for seed in [1u64, 7, 42, 2024] {
        let model = random_model(seed);
        let mut bytes = Vec::new();
        model.serialize_to(&mut bytes).unwrap();
        let restored = Model::deserialize_from(bytes.as_slice()).unwrap();
        assert_eq!(restored, model, "seed {seed}");
    }
}

#[test]
fn save_and_load_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.cnpy");

    let model = regressor_example();
    model.save(&path).unwrap();
    let loaded = Model::load(&path).unwrap();
    assert_eq!(loaded, model);
}

#[test]
fn decoded_version_is_the_encode_time_stamp() {
    // The stored triple always reflects encode time, not the model field.
    let mut model = regressor_example();
    model.version = Version::new(4, 0, 3);

    let mut bytes = Vec::new();
    model.serialize_to(&mut bytes).unwrap();
    let restored = Model::deserialize_from(bytes.as_slice()).unwrap();
    assert_eq!(restored.version, Version::CURRENT);
}
