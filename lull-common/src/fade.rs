//! Fade ramp math for the sleep-timer fade-out
//!
//! The fade is a linear interpolation from the current volume down to zero
//! across a fixed number of discrete steps. Computing the whole ramp up
//! front keeps the timer task trivial: one volume write per step.

/// Volume levels for a linear fade across `steps` discrete steps.
///
/// The returned vector has exactly `steps` entries, strictly progressing
/// from just below `from` to exactly `to`. An empty ramp is returned for
/// `steps == 0`.
pub fn linear_ramp(from: f32, to: f32, steps: u32) -> Vec<f32> {
    if steps == 0 {
        return Vec::new();
    }
    let from = from.clamp(0.0, 1.0);
    let to = to.clamp(0.0, 1.0);

    (1..=steps)
        .map(|step| {
            let t = step as f32 / steps as f32;
            from + (to - from) * t
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_length_and_endpoint() {
        let ramp = linear_ramp(1.0, 0.0, 20);
        assert_eq!(ramp.len(), 20);
        assert_eq!(*ramp.last().unwrap(), 0.0);
    }

    #[test]
    fn test_ramp_is_monotonically_decreasing() {
        let ramp = linear_ramp(0.8, 0.0, 20);
        for pair in ramp.windows(2) {
            assert!(pair[1] < pair[0], "ramp not decreasing: {:?}", pair);
        }
    }

    #[test]
    fn test_ramp_midpoint() {
        let ramp = linear_ramp(1.0, 0.0, 10);
        assert!((ramp[4] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ramp_from_partial_volume() {
        let ramp = linear_ramp(0.5, 0.0, 5);
        assert!((ramp[0] - 0.4).abs() < 1e-6);
        assert_eq!(*ramp.last().unwrap(), 0.0);
    }

    #[test]
    fn test_zero_steps_yields_empty_ramp() {
        assert!(linear_ramp(1.0, 0.0, 0).is_empty());
    }

    #[test]
    fn test_inputs_are_clamped() {
        let ramp = linear_ramp(2.0, -1.0, 4);
        assert!(ramp[0] <= 1.0);
        assert_eq!(*ramp.last().unwrap(), 0.0);
    }
}
