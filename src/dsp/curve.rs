use crate::{EPSILON, FPS};

/*
ADSR Curve Segments
===================

An envelope curve is rendered one segment at a time. A segment is the part
of a pure 0-to-1 curve between two frame offsets, measured from the frame
at which the segment's state (attack, decay, release) began:

    value
      1.0 ┤           ____------
          │      _--´
          │    /
          │   /
      0.0 └──┴────────┴─────────→ frame
           start      end

`dt` is the time the full curve takes to travel from 0 to 1. The curve is
sampled on the grid t/df for t in start+1..=end, where df = ceil(dt · FPS),
so that rendering a curve in several consecutive (start, end) windows yields
exactly the same samples as rendering it in one call.

The exponential family maps the same grid through

    value = (1 − exp(x · ln(th))) / (1 − th)

which approaches 1 asymptotically but is guaranteed to get within `th` of 1
by `dt`, so segment-completion detection works identically for both shapes.

The envelope state machine rescales these pure curves from an arbitrary
start value to the segment target (1 for attack, sustain·start for decay,
0 for release).
*/

/// Compute a window of a linear 0-to-1 curve.
///
/// `dt` is the time the full curve takes, in seconds; `start` and `end` are
/// frame offsets from the beginning of the curve. Returns one sample per
/// frame in `start..end`, truncated at the curve's natural length.
pub fn linear_curve(dt: f64, start: u64, end: u64) -> Vec<f64> {
    let df = (dt * FPS as f64).ceil().max(1.0) as u64;
    let end = end.min(df);
    let start = start + 1;

    if end < start {
        return Vec::new();
    }

    let df = df as f64;
    (start..=end).map(|t| t as f64 / df).collect()
}

/// Compute a window of an exponential 0-to-1 curve.
///
/// Same sampling grid as [`linear_curve`], mapped through
/// `(1 − exp(x·ln(th))) / (1 − th)`. The curve reaches within `threshold`
/// of 1 by `dt`.
pub fn exponential_curve(dt: f64, start: u64, end: u64, threshold: f64) -> Vec<f64> {
    let ln_th = threshold.ln();

    linear_curve(dt, start, end)
        .into_iter()
        .map(|x| (1.0 - (x * ln_th).exp()) / (1.0 - threshold))
        .collect()
}

/// Returns true when the final sample of a segment window is close enough
/// to 1 to consider the segment complete.
pub fn segment_complete(last_sample: f64) -> bool {
    last_sample >= 1.0 - EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_reaches_one_at_dt() {
        let dt = 0.01;
        let df = (dt * FPS as f64).ceil() as u64;
        let curve = linear_curve(dt, 0, df);

        assert_eq!(curve.len(), df as usize);
        assert!((curve[0] - 1.0 / df as f64).abs() < 1e-12);
        assert!(segment_complete(*curve.last().unwrap()));
    }

    #[test]
    fn windowed_rendering_matches_single_call() {
        let dt = 0.005;
        let df = (dt * FPS as f64).ceil() as u64;

        let whole = linear_curve(dt, 0, df);
        let mut windowed = linear_curve(dt, 0, df / 2);
        windowed.extend(linear_curve(dt, df / 2, df));

        assert_eq!(whole, windowed);
    }

    #[test]
    fn zero_duration_completes_in_one_sample() {
        let curve = linear_curve(0.0, 0, 128);
        assert_eq!(curve, vec![1.0]);
    }

    #[test]
    fn window_past_curve_end_is_empty() {
        let dt = 0.001;
        let df = (dt * FPS as f64).ceil() as u64;
        assert!(linear_curve(dt, df, df + 64).is_empty());
    }

    #[test]
    fn exponential_reaches_within_threshold_by_dt() {
        let dt = 0.1;
        let th = 0.01;
        let df = (dt * FPS as f64).ceil() as u64;
        let curve = exponential_curve(dt, 0, df, th);

        let last = *curve.last().unwrap();
        assert!(segment_complete(last), "got {last}");
        assert!(curve.windows(2).all(|w| w[1] > w[0]), "curve must be monotonic");
    }
}
