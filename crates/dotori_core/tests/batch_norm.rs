use dotori_core::{
    error::DotoriError,
    op::batch_norm::BatchNormForward,
    prelude::*,
};
use half::f16;

const EPS: f64 = 1e-5;

fn approx(values: Vec<f64>, digits: i32) -> Vec<f64> {
    let b = 10f64.powi(digits);
    values.iter().map(|v| (v * b).round() / b).collect()
}

/// Deterministic test signal, varied enough to give every channel its own
/// statistics.
fn signal(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i as f32) * 0.37).sin() + (i % 7) as f32 * 0.25).collect()
}

/// Per-channel biased/unbiased statistics over axes {0, 2, 3} of an
/// (n, c, h, w) signal, computed directly in f64.
fn spatial_stats(data: &[f32], n: usize, c: usize, h: usize, w: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let group = (n * h * w) as f64;
    let mut mean = vec![0.0f64; c];
    for bi in 0..n {
        for ci in 0..c {
            for i in 0..h * w {
                mean[ci] += data[(bi * c + ci) * h * w + i] as f64;
            }
        }
    }
    for value in mean.iter_mut() {
        *value /= group;
    }

    let mut var = vec![0.0f64; c];
    for bi in 0..n {
        for ci in 0..c {
            for i in 0..h * w {
                let centered = data[(bi * c + ci) * h * w + i] as f64 - mean[ci];
                var[ci] += centered * centered;
            }
        }
    }
    for value in var.iter_mut() {
        *value /= group;
    }

    let unbiased: Vec<f64> = var.iter().map(|&v| v * group / (group - 1.0)).collect();
    (mean, var, unbiased)
}

fn spatial_inputs(dtype: DType) -> (Tensor, Tensor, Tensor, Tensor, Tensor, Vec<f32>) {
    let data = signal(8 * 3 * 16 * 16);
    let x = Tensor::from_vec(data.clone(), [8, 3, 16, 16], Device::CPU)
        .unwrap()
        .to_dtype(dtype)
        .unwrap();
    let gamma = Tensor::ones([3], dtype, Device::CPU).unwrap();
    let beta = Tensor::zeros([3], dtype, Device::CPU).unwrap();
    let running_mean = Tensor::zeros([3], dtype, Device::CPU).unwrap();
    let running_var = Tensor::ones([3], dtype, Device::CPU).unwrap();
    (x, gamma, beta, running_mean, running_var, data)
}

#[test]
fn spatial_forward_end_to_end() {
    let (x, gamma, beta, running_mean, running_var, data) = spatial_inputs(DType::F32);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();

    assert_eq!(y.shape().dims(), &[8, 3, 16, 16]);
    assert_eq!(y.dtype(), DType::F32);

    let (mean, var, unbiased) = spatial_stats(&data, 8, 3, 16, 16);

    // Running statistics are blended in place with weight 1 - decay.
    let got_mean = batch_norm_stat(&running_mean);
    let got_var = batch_norm_stat(&running_var);
    for ci in 0..3 {
        let expected_mean = 0.9 * 0.0 + 0.1 * mean[ci];
        let expected_var = 0.9 * 1.0 + 0.1 * unbiased[ci];
        assert!((got_mean[ci] - expected_mean).abs() < 1e-5, "channel {ci}");
        assert!((got_var[ci] - expected_var).abs() < 1e-5, "channel {ci}");
    }

    // Normalized output has zero mean and unit variance per channel when
    // gamma is one and beta is zero.
    let y_data = y.to_f64_vec().unwrap();
    let mut y_f32 = Vec::with_capacity(y_data.len());
    for v in &y_data {
        y_f32.push(*v as f32);
    }
    let (y_mean, y_var, _) = spatial_stats(&y_f32, 8, 3, 16, 16);
    assert_eq!(approx(y_mean, 4), vec![0.0; 3]);
    assert_eq!(approx(y_var, 3), vec![1.0; 3]);

    // Per-call statistics are cached with the parameter shape.
    let (saved_mean, saved_inv_var) = batch_norm.saved_stats().unwrap();
    assert_eq!(saved_mean.shape().dims(), &[3]);
    assert_eq!(saved_inv_var.shape().dims(), &[3]);
    let saved_mean = saved_mean.to_f64_vec().unwrap();
    let saved_inv_var = saved_inv_var.to_f64_vec().unwrap();
    for ci in 0..3 {
        assert!((saved_mean[ci] - mean[ci]).abs() < 1e-5);
        assert!((saved_inv_var[ci] - 1.0 / (var[ci] + EPS).sqrt()).abs() < 1e-4);
    }
}

fn batch_norm_stat(tensor: &Tensor) -> Vec<f64> {
    tensor.to_f64_vec().unwrap()
}

#[test]
fn per_activation_forward_end_to_end() {
    let data = signal(8 * 3 * 16 * 16);
    let x = Tensor::from_vec(data, [8, 3, 16, 16], Device::CPU).unwrap();
    let gamma = Tensor::ones([1, 3, 16, 16], DType::F32, Device::CPU).unwrap();
    let beta = Tensor::zeros([1, 3, 16, 16], DType::F32, Device::CPU).unwrap();
    let running_mean = Tensor::zeros([1, 3, 16, 16], DType::F32, Device::CPU).unwrap();
    let running_var = Tensor::ones([1, 3, 16, 16], DType::F32, Device::CPU).unwrap();

    let mut batch_norm = CpuDevice.batch_norm_forward();
    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0])
        .unwrap();

    assert_eq!(y.shape().dims(), &[8, 3, 16, 16]);

    // Per-activation mode keeps one statistic per remaining position.
    let (saved_mean, _) = batch_norm.saved_stats().unwrap();
    assert_eq!(saved_mean.size(), 3 * 16 * 16);
}

#[test]
fn channel_last_input_goes_through_flattened_view() {
    let data = signal(5 * 4);
    let x = Tensor::from_vec(data.clone(), [5, 4], Device::CPU).unwrap();
    let gamma = Tensor::ones([4], DType::F32, Device::CPU).unwrap();
    let beta = Tensor::zeros([4], DType::F32, Device::CPU).unwrap();
    let running_mean = Tensor::zeros([4], DType::F32, Device::CPU).unwrap();
    let running_var = Tensor::ones([4], DType::F32, Device::CPU).unwrap();

    let mut batch_norm = CpuDevice.batch_norm_forward();
    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0])
        .unwrap();

    assert_eq!(y.shape().dims(), &[5, 4]);
    assert_eq!(y.size(), x.size());

    // Column means of the output are zero: the (5, 4) input was
    // normalized as (5, 4, 1, 1).
    let y_data = y.to_f64_vec().unwrap();
    for col in 0..4 {
        let mean: f64 = (0..5).map(|row| y_data[row * 4 + col]).sum::<f64>() / 5.0;
        assert!(mean.abs() < 1e-5);
    }
}

#[test]
fn epsilon_below_minimum_is_rejected_before_any_update() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    let result = batch_norm.forward(&x, &gamma, &beta, &running_mean, &running_var, 1e-6, 0.9, &[0, 2, 3]);
    assert!(matches!(result, Err(DotoriError::EpsilonTooSmall { .. })));

    // No partial update happened and nothing was cached.
    assert_eq!(batch_norm_stat(&running_mean), vec![0.0; 3]);
    assert_eq!(batch_norm_stat(&running_var), vec![1.0; 3]);
    assert!(batch_norm.saved_stats().is_none());
}

#[test]
fn non_contiguous_running_stats_are_rejected() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);
    let broadcast_mean = Tensor::zeros([1], DType::F32, Device::CPU)
        .unwrap()
        .broadcast_to([3])
        .unwrap();
    let broadcast_var = Tensor::ones([1], DType::F32, Device::CPU)
        .unwrap()
        .broadcast_to([3])
        .unwrap();

    let mut batch_norm = CpuDevice.batch_norm_forward();

    let result = batch_norm.forward(&x, &gamma, &beta, &broadcast_mean, &running_var, EPS, 0.9, &[0, 2, 3]);
    assert!(matches!(
        result,
        Err(DotoriError::RunningStatNotContiguous { stat: "running mean" })
    ));

    let result = batch_norm.forward(&x, &gamma, &beta, &running_mean, &broadcast_var, EPS, 0.9, &[0, 2, 3]);
    assert!(matches!(
        result,
        Err(DotoriError::RunningStatNotContiguous { stat: "running variance" })
    ));
}

#[test]
fn matching_dtype_updates_caller_buffers_directly() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);

    // Keep an aliasing view of the caller's buffer; an in-place update
    // through the op must be visible through it.
    let mean_alias = running_mean.clone();

    let mut batch_norm = CpuDevice.batch_norm_forward();
    batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();

    assert!(mean_alias.shares_storage_with(&running_mean));
    assert_ne!(batch_norm_stat(&mean_alias), vec![0.0; 3]);
}

#[test]
fn f64_parameters_stay_f64() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F64);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();

    assert_eq!(y.dtype(), DType::F64);
    assert_eq!(running_mean.dtype(), DType::F64);
    let (saved_mean, _) = batch_norm.saved_stats().unwrap();
    assert_eq!(saved_mean.dtype(), DType::F64);
    assert_ne!(batch_norm_stat(&running_mean), vec![0.0; 3]);
}

#[test]
fn f16_input_writes_running_stats_back_in_f16() {
    let (x, gamma, beta, running_mean, running_var, data) = spatial_inputs(DType::F16);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();

    // Output keeps the input dtype; parameters were widened internally.
    assert_eq!(y.dtype(), DType::F16);
    assert_eq!(running_mean.dtype(), DType::F16);
    let (saved_mean, saved_inv_var) = batch_norm.saved_stats().unwrap();
    assert_eq!(saved_mean.dtype(), DType::F32);
    assert_eq!(saved_inv_var.dtype(), DType::F32);

    // The caller's f16 buffers reflect the exponentially-averaged update,
    // to within the f16 round-trip of the cast data.
    let f16_data: Vec<f32> = data.iter().map(|&v| f16::from_f32(v).to_f32()).collect();
    let (mean, _, unbiased) = spatial_stats(&f16_data, 8, 3, 16, 16);
    let got_mean = batch_norm_stat(&running_mean);
    let got_var = batch_norm_stat(&running_var);
    for ci in 0..3 {
        let expected_mean = 0.1 * mean[ci];
        let expected_var = 0.9 + 0.1 * unbiased[ci];
        assert!((got_mean[ci] - expected_mean).abs() < 1e-2, "channel {ci}");
        assert!((got_var[ci] - expected_var).abs() < 1e-2, "channel {ci}");
    }
}

#[test]
fn cache_is_overwritten_by_the_next_forward() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();
    let first_mean = batch_norm.saved_stats().unwrap().0.to_f64_vec().unwrap();

    let shifted = Tensor::full([8, 3, 16, 16], DType::F32, 5.0, Device::CPU).unwrap();
    batch_norm
        .forward(&shifted, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();
    let second_mean = batch_norm.saved_stats().unwrap().0.to_f64_vec().unwrap();

    assert_ne!(first_mean, second_mean);
    assert_eq!(approx(second_mean, 4), vec![5.0; 3]);
}

#[test]
fn invalid_axes_are_rejected() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);
    let mut batch_norm = CpuDevice.batch_norm_forward();

    let result = batch_norm.forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 9]);
    assert!(matches!(result, Err(DotoriError::InvalidAxis { axis: 9, ndim: 4 })));
}

#[test]
fn backward_is_an_explicit_capability_gate() {
    let (x, gamma, beta, running_mean, running_var, _) = spatial_inputs(DType::F32);
    let mut batch_norm = CpuDevice.batch_norm_forward();
    let y = batch_norm
        .forward(&x, &gamma, &beta, &running_mean, &running_var, EPS, 0.9, &[0, 2, 3])
        .unwrap();

    // Gradients are not produced; the call must fail loudly instead of
    // returning empty tensors.
    let gy = y.zeros_like().unwrap();
    assert!(matches!(
        batch_norm.backward(&x, &gamma, &gy, EPS, &[0, 2, 3]),
        Err(DotoriError::NotImplemented(_))
    ));
    assert!(matches!(
        batch_norm.double_backward(&gy, &gamma, &beta),
        Err(DotoriError::NotImplemented(_))
    ));
}

#[test]
fn forward_object_construction_is_per_call_site() {
    let first = CpuDevice.batch_norm_forward();
    let second = CpuDevice.batch_norm_forward();
    assert!(first.saved_stats().is_none());
    assert!(second.saved_stats().is_none());

    let _ = BatchNormForward::new(dotori_core::be_cpu::norm::CpuNormalization);
}
