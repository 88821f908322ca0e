mod common;

use common::{TOLERANCE, model, random_cluster, random_crystal};
use graphite::core::geometry::transform::random_rotation;
use graphite::core::models::batch::Batch;
use graphite::core::nn::aggregation::Aggregation;
use graphite::engine::progress::ProgressReporter;
use graphite::workflows::predict;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const AGGREGATIONS: [Aggregation; 3] = [Aggregation::Sum, Aggregation::Mean, Aggregation::Max];

#[test]
fn pooled_readout_is_permutation_invariant() {
    let mut rng = StdRng::seed_from_u64(21);
    for equivariant in [false, true] {
        for aggregation in AGGREGATIONS {
            let model = model(equivariant, aggregation);
            let structure = random_cluster(3, 12, 4.0);
            let mut order: Vec<usize> = (0..structure.len()).collect();
            order.shuffle(&mut rng);
            let permuted = structure.permuted(&order).unwrap();

            let a = model.predict(&structure, Some(0.2)).unwrap();
            let b = model.predict(&permuted, Some(0.2)).unwrap();
            assert!(
                (a.graph_scalars[0] - b.graph_scalars[0]).abs() < TOLERANCE,
                "{aggregation:?}, equivariant={equivariant}"
            );
            // Per-atom outputs follow their atoms.
            for (new, &old) in order.iter().enumerate() {
                assert!((a.node_scalars[old] - b.node_scalars[new]).abs() < TOLERANCE);
                assert!((a.node_vectors[old] - b.node_vectors[new]).norm() < TOLERANCE);
            }
        }
    }
}

#[test]
fn vector_outputs_rotate_with_the_structure() {
    for equivariant in [false, true] {
        for aggregation in AGGREGATIONS {
            let model = model(equivariant, aggregation);
            let structure = random_cluster(8, 10, 4.0);
            let rotation = random_rotation(&mut StdRng::seed_from_u64(99));
            let moved = structure
                .transformed(&rotation, &Vector3::new(-3.0, 0.5, 7.0))
                .unwrap();

            let a = model.predict(&structure, Some(1.5)).unwrap();
            let b = model.predict(&moved, Some(1.5)).unwrap();
            assert!((&a.graph_scalars - &b.graph_scalars).norm() < TOLERANCE);
            assert!((&a.node_scalars - &b.node_scalars).norm() < TOLERANCE);
            for (va, vb) in a.node_vectors.iter().zip(&b.node_vectors) {
                assert!((rotation * va - vb).norm() < TOLERANCE);
            }
        }
    }
}

#[test]
fn rotating_a_crystal_with_its_cell_preserves_scalars() {
    let model = model(true, Aggregation::Mean);
    let crystal = random_crystal(4, 6, 5.0);
    let rotation = random_rotation(&mut StdRng::seed_from_u64(5));
    let moved = crystal.transformed(&rotation, &Vector3::zeros()).unwrap();

    let a = model.predict(&crystal, None).unwrap();
    let b = model.predict(&moved, None).unwrap();
    assert!((a.graph_scalars[0] - b.graph_scalars[0]).abs() < TOLERANCE);
    for (va, vb) in a.node_vectors.iter().zip(&b.node_vectors) {
        assert!((rotation * va - vb).norm() < TOLERANCE);
    }
}

#[test]
fn batched_readout_equals_independent_readouts() {
    for aggregation in AGGREGATIONS {
        let model = model(true, aggregation);
        let structures = [
            random_cluster(1, 5, 3.0),
            random_crystal(2, 7, 4.5),
            random_cluster(3, 1, 1.0),
        ];
        let graphs: Vec<_> = structures.iter().map(|s| model.build_graph(s)).collect();
        let joint = model.forward(&Batch::assemble(&graphs).unwrap(), Some(0.4)).unwrap();

        for (idx, structure) in structures.iter().enumerate() {
            let alone = model.predict(structure, Some(0.4)).unwrap();
            assert!((joint.graph_scalars[idx] - alone.graph_scalars[0]).abs() < TOLERANCE);
        }

        let per_structure =
            predict::run(&model, &structures, Some(0.4), 2, &ProgressReporter::new()).unwrap();
        for (prediction, structure) in per_structure.iter().zip(&structures) {
            assert_eq!(prediction.node_vectors.len(), structure.len());
        }
    }
}
