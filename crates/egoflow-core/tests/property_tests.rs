//! Property-based tests for the masking / scatter layout.
//!
//! These hold for any batch geometry and any activity pattern:
//! - the scatter writes exactly the slots the mask marks active
//! - an all-inactive timestep leaves its placeholder row at zero
//! - extract followed by an identity scatter reproduces the active features

use egoflow_core::{extract, flat_index, EgoMask, EmbeddingPlaceholder};
use ndarray::{Array2, Array3, Axis};
use proptest::prelude::*;

/// `(B, T, N)` mask plus matching `(T, B*N, D)` features and `(T, B*N, B*N)` adjacency.
fn arb_batch() -> impl Strategy<Value = (Array3<bool>, Array3<f32>, Array3<f32>)> {
    (1usize..4, 1usize..5, 1usize..6, 1usize..4).prop_flat_map(|(b, t, n, d)| {
        let slots = b * n;
        (
            prop::collection::vec(any::<bool>(), b * t * n),
            prop::collection::vec(-10.0f32..10.0, t * slots * d),
            prop::collection::vec(prop::bool::weighted(0.3), t * slots * slots),
        )
            .prop_map(move |(mask, feats, adj)| {
                let mask = Array3::from_shape_vec((b, t, n), mask).unwrap();
                let feats = Array3::from_shape_vec((t, slots, d), feats).unwrap();
                let adj = Array3::from_shape_vec((t, slots, slots), adj)
                    .unwrap()
                    .mapv(|e| if e { 1.0 } else { 0.0 });
                (mask, feats, adj)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn written_slots_equal_mask_row((mask, feats, adj) in arb_batch()) {
        let ego = EgoMask::new(mask);
        let flat = ego.flatten();
        let (t, slots, d) = feats.dim();
        let mut placeholder = EmbeddingPlaceholder::zeros(t, slots, d);

        for ti in 0..t {
            let sub = extract(
                ti,
                flat.row(ti),
                feats.index_axis(Axis(0), ti),
                adj.index_axis(Axis(0), ti),
            ).unwrap();
            if sub.is_empty() {
                continue;
            }
            placeholder.write_subgraph(&sub, sub.features.view()).unwrap();
        }

        for ti in 0..t {
            let expected = flat.active_indices(ti);
            let written = placeholder.written_indices(ti).map(<[usize]>::to_vec).unwrap_or_default();
            prop_assert_eq!(written, expected);
        }
    }

    #[test]
    fn inactive_timestep_row_stays_zero((mask, feats, adj) in arb_batch(), silent in 0usize..5) {
        let mut mask = mask;
        let t = mask.len_of(Axis(1));
        let silent = silent % t;
        mask.index_axis_mut(Axis(1), silent).fill(false);

        let flat = EgoMask::new(mask).flatten();
        let (_, slots, d) = feats.dim();
        let mut placeholder = EmbeddingPlaceholder::zeros(t, slots, d);
        for ti in 0..t {
            let sub = extract(
                ti,
                flat.row(ti),
                feats.index_axis(Axis(0), ti),
                adj.index_axis(Axis(0), ti),
            ).unwrap();
            if !sub.is_empty() {
                placeholder.write_subgraph(&sub, sub.features.view()).unwrap();
            }
        }
        prop_assert!(placeholder.written_indices(silent).is_none());
        prop_assert!(placeholder.row(silent).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn identity_scatter_round_trips((mask, feats, adj) in arb_batch()) {
        let ego = EgoMask::new(mask);
        let flat = ego.flatten();
        let n = ego.nodes();
        let (t, slots, d) = feats.dim();
        let mut placeholder = EmbeddingPlaceholder::zeros(t, slots, d);

        for ti in 0..t {
            let sub = extract(
                ti,
                flat.row(ti),
                feats.index_axis(Axis(0), ti),
                adj.index_axis(Axis(0), ti),
            ).unwrap();
            prop_assert!(sub.edges.validate(sub.n_active()).is_ok());
            if !sub.is_empty() {
                placeholder.write_subgraph(&sub, sub.features.view()).unwrap();
            }
        }

        for b in 0..ego.batch_size() {
            for ti in 0..t {
                for node in 0..n {
                    let slot = flat_index(b, node, n);
                    let got = placeholder.row(ti).row(slot).to_owned();
                    if ego.is_active(b, ti, node) {
                        prop_assert_eq!(got, feats.index_axis(Axis(0), ti).row(slot).to_owned());
                    } else {
                        prop_assert_eq!(got, Array2::<f32>::zeros((1, d)).row(0).to_owned());
                    }
                }
            }
        }
    }
}
