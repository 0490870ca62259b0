use ndarray::{Array2, Array3};
use quickcheck_macros::quickcheck;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use scan_depth::{DepthCompletion, DepthCompletionSettings, Smoothing};

fn noisy_depth(rng: &mut Pcg64, height: usize, width: usize, hole_ratio: f64) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |_| {
        if rng.gen_bool(hole_ratio) {
            0.0
        } else {
            rng.gen_range(0.5f32..8.0)
        }
    })
}

#[test]
fn fully_valid_input_is_a_fixed_point() {
    let mut rng = Pcg64::from_seed([5; 32]);
    let depth = noisy_depth(&mut rng, 24, 32, 0.0);
    let confidence = Array2::from_elem(depth.dim(), 1.0f32);
    let completion = DepthCompletion::default();

    let once = completion
        .complete(depth.view(), Some(confidence.view()))
        .unwrap();
    let twice = completion
        .complete(once.view(), Some(confidence.view()))
        .unwrap();
    assert_eq!(once, depth);
    assert_eq!(twice, depth);
}

#[test]
fn batch_matches_single_frames() {
    let mut rng = Pcg64::from_seed([7; 32]);
    let frames: Vec<_> = (0..3).map(|_| noisy_depth(&mut rng, 20, 20, 0.3)).collect();
    let mut stack = Array3::zeros((3, 20, 20));
    for (mut slot, frame) in stack.outer_iter_mut().zip(&frames) {
        slot.assign(frame);
    }
    let completion = DepthCompletion::default();
    let batch = completion.complete_batch(stack.view(), None).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        let single = completion.complete(frame.view(), None).unwrap();
        assert_eq!(batch.index_axis(ndarray::Axis(0), i), single);
    }
}

#[test]
fn no_holes_remain_after_completion() {
    let mut rng = Pcg64::from_seed([9; 32]);
    let depth = noisy_depth(&mut rng, 48, 64, 0.4);
    let out = DepthCompletion::default().complete(depth.view(), None).unwrap();
    assert!(out.iter().all(|&d| d.is_finite() && d > 0.0));
}

#[quickcheck]
fn valid_pixels_are_restored_exactly(seed: u64, hole_percent: u8, gaussian: bool) -> bool {
    let mut rng = Pcg64::new(seed as u128, 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96);
    let hole_ratio = (hole_percent % 90) as f64 / 100.0;
    let depth = noisy_depth(&mut rng, 16, 20, hole_ratio);
    let confidence = Array2::from_shape_fn(depth.dim(), |_| rng.gen_range(0.0f32..1.0));

    let settings = DepthCompletionSettings {
        smoothing: if gaussian {
            Smoothing::Gaussian {
                kernel_size: 5,
                sigma: 0.0,
            }
        } else {
            Smoothing::default()
        },
        ..Default::default()
    };
    let threshold = settings.confidence_threshold;
    let out = DepthCompletion::new(settings)
        .complete(depth.view(), Some(confidence.view()))
        .unwrap();

    depth
        .indexed_iter()
        .filter(|&(idx, &d)| d > 0.0 && confidence[idx] >= threshold)
        .all(|(idx, &d)| out[idx].to_bits() == d.to_bits())
}
