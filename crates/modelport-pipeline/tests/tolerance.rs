use modelport_core::{IOName, Shape, Tensor};
use modelport_pipeline::{read_tolerance_results, write_tolerance_results, ToleranceTracker};

fn t(values: &[f32]) -> Tensor {
    Tensor::from_f32s(Shape::from_slice(&[values.len()]), values).unwrap()
}

#[test]
fn tolerances_start_at_zero() {
    let tracker = ToleranceTracker::new([IOName::new("out")]);
    let tol = tracker.get(&IOName::new("out")).unwrap();
    assert_eq!(tol.atol, 0.0);
    assert_eq!(tol.rtol, 0.0);
}

#[test]
fn tolerances_are_non_decreasing_and_non_negative() {
    let name = IOName::new("out");
    let mut tracker = ToleranceTracker::new([name.clone()]);

    let reference = t(&[1.0, 2.0, 3.0]);
    let comparisons = [
        t(&[1.5, 2.0, 3.0]), // large deviation first
        t(&[1.0, 2.0, 3.0]), // exact match must not shrink anything
        t(&[1.1, 2.0, 3.0]), // small deviation must not shrink anything
    ];

    let mut prev = tracker.get(&name).unwrap();
    for comparison in &comparisons {
        tracker.update(&name, &reference, comparison).unwrap();
        let cur = tracker.get(&name).unwrap();
        assert!(cur.atol >= prev.atol);
        assert!(cur.rtol >= prev.rtol);
        assert!(cur.atol >= 0.0);
        assert!(cur.rtol >= 0.0);
        prev = cur;
    }

    // Worst case came from the first comparison and must still be
    // reported at the end.
    assert!((prev.atol - 0.5).abs() < 1e-12);
    assert!((prev.rtol - 0.5 / 1.5).abs() < 1e-12);
}

#[test]
fn identical_runs_report_exactly_zero() {
    let name = IOName::new("logits");
    let mut tracker = ToleranceTracker::new([name.clone()]);

    for values in [&[0.0f32, 1.0, -2.5][..], &[4.0, 5.0, 6.0]] {
        tracker.update(&name, &t(values), &t(values)).unwrap();
    }

    let tol = tracker.get(&name).unwrap();
    assert_eq!(tol.atol, 0.0);
    assert_eq!(tol.rtol, 0.0);
}

#[test]
fn zero_comparison_value_drives_rtol_to_infinity() {
    // Documented caveat: relative error divides by the comparison
    // value without a guard.
    let name = IOName::new("out");
    let mut tracker = ToleranceTracker::new([name.clone()]);

    tracker
        .update(&name, &t(&[1.0, 1.0]), &t(&[0.0, 1.0]))
        .unwrap();

    let tol = tracker.get(&name).unwrap();
    assert_eq!(tol.atol, 1.0);
    assert!(tol.rtol.is_infinite());
}

#[test]
fn matching_zeros_leave_rtol_finite() {
    // 0/0 is NaN, and the max-reduction discards NaN operands, so a
    // pair of exact zeros contributes nothing to either tolerance.
    let name = IOName::new("out");
    let mut tracker = ToleranceTracker::new([name.clone()]);

    tracker
        .update(&name, &t(&[0.0, 2.0]), &t(&[0.0, 2.5]))
        .unwrap();

    let tol = tracker.get(&name).unwrap();
    assert!((tol.atol - 0.5).abs() < 1e-12);
    assert!((tol.rtol - 0.5 / 2.5).abs() < 1e-12);

    // All-zero tensors on both sides keep the tracker at its floor.
    let mut all_zero = ToleranceTracker::new([name.clone()]);
    all_zero.update(&name, &t(&[0.0, 0.0]), &t(&[0.0, 0.0])).unwrap();
    let tol = all_zero.get(&name).unwrap();
    assert_eq!(tol.atol, 0.0);
    assert_eq!(tol.rtol, 0.0);
    assert!(!tol.rtol.is_nan());
}

#[test]
fn updating_an_untracked_output_fails() {
    let mut tracker = ToleranceTracker::new([IOName::new("out")]);
    let err = tracker.update(&IOName::new("other"), &t(&[1.0]), &t(&[1.0]));
    assert!(err.is_err());
}

#[test]
fn result_file_round_trips() {
    let name_a = IOName::new("scores");
    let name_b = IOName::new("boxes");
    let mut tracker = ToleranceTracker::new([name_a.clone(), name_b.clone()]);

    tracker
        .update(&name_a, &t(&[1.0, 2.0]), &t(&[1.25, 2.0]))
        .unwrap();
    tracker
        .update(&name_b, &t(&[10.0]), &t(&[10.0]))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("correctness_results.json");

    let results = tracker.to_results();
    write_tolerance_results(&path, &results).unwrap();
    let parsed = read_tolerance_results(&path).unwrap();

    assert_eq!(parsed, results);
    assert!((parsed["scores"].atol - 0.25).abs() < 1e-12);
    assert_eq!(parsed["boxes"].atol, 0.0);
}
