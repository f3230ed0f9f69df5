/// Quantize a requested intensity to the `steps` discrete levels the hardware
/// supports.
///
/// The value is clamped to `[0, 1]` and rounded half-to-even to the nearest
/// `1/steps`. A positive request never rounds down to silence: it is raised to
/// the lowest non-zero level instead.
pub fn quantize(raw: f64, steps: u32) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }

    let steps = f64::from(steps.max(1));
    let clamped = raw.clamp(0.0, 1.0);
    let quantized = (clamped * steps).round_ties_even() / steps;

    if quantized == 0.0 && clamped > 0.0 {
        1.0 / steps
    } else {
        quantized
    }
}

#[cfg(test)]
mod tests {
    use super::quantize;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn twenty_steps() {
        assert!(approx(quantize(0.5, 20), 0.5));
        assert!(approx(quantize(0.03, 20), 0.05));
        assert!(approx(quantize(0.0, 20), 0.0));
        assert!(approx(quantize(0.26, 20), 0.25));
        assert!(approx(quantize(0.99, 20), 1.0));
    }

    #[test]
    fn tiny_positive_is_raised() {
        assert!(approx(quantize(0.001, 20), 0.05));
        // 0.5 of a step rounds to the even level (zero), then is raised
        assert!(approx(quantize(0.025, 20), 0.05));
    }

    #[test]
    fn clamps_out_of_range() {
        assert!(approx(quantize(1.7, 20), 1.0));
        assert!(approx(quantize(-0.3, 20), 0.0));
        assert_eq!(quantize(f64::NAN, 20), 0.0);
    }

    #[test]
    fn other_step_counts() {
        assert!(approx(quantize(0.3, 4), 0.25));
        assert!(approx(quantize(0.1, 4), 0.25));
        assert!(approx(quantize(0.4, 1), 1.0));
        // zero steps behaves like one
        assert!(approx(quantize(0.2, 0), 1.0));
    }
}
