use modelport_core::{DType, IOName, Sample, Shape, Tensor};
use modelport_pipeline::{SampleFile, SampleStore, CORRECTNESS_SAMPLES, PROFILING_SAMPLE};

fn sample(seed: f32) -> Sample {
    Sample::from_iter([
        (
            IOName::new("input__0"),
            Tensor::from_f32s(Shape::from_slice(&[1, 2]), &[seed, seed + 1.0]).unwrap(),
        ),
        (
            IOName::new("input__1"),
            Tensor::from_f64s(DType::I64, Shape::from_slice(&[1]), &[seed as f64]).unwrap(),
        ),
    ])
}

#[test]
fn save_and_load_preserve_order_and_batch_dim() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());

    let samples = vec![sample(0.0), sample(10.0), sample(20.0)];
    let file = SampleFile::new(Some(0), &samples).unwrap();
    store.save(CORRECTNESS_SAMPLES, &file).unwrap();

    let loaded = store.load(CORRECTNESS_SAMPLES).unwrap();
    assert_eq!(loaded.batch_dim, Some(0));
    assert_eq!(loaded.len(), 3);

    let decoded = loaded.samples().unwrap();
    for (idx, sample) in decoded.iter().enumerate() {
        // Tensor order inside each sample is preserved too.
        assert_eq!(sample.0[0].0, IOName::new("input__0"));
        assert_eq!(sample.0[1].0, IOName::new("input__1"));

        let first = sample.get(&IOName::new("input__0")).unwrap();
        assert_eq!(first.dtype, DType::F32);
        assert_eq!(first.shape, Shape::from_slice(&[1, 2]));
        assert_eq!(
            first.to_f64_vec().unwrap(),
            vec![idx as f64 * 10.0, idx as f64 * 10.0 + 1.0]
        );
    }
}

#[test]
fn roles_map_to_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());

    store
        .save(CORRECTNESS_SAMPLES, &SampleFile::new(None, &[sample(0.0)]).unwrap())
        .unwrap();
    store
        .save(PROFILING_SAMPLE, &SampleFile::new(Some(0), &[sample(1.0)]).unwrap())
        .unwrap();

    assert!(store.path_for(CORRECTNESS_SAMPLES).is_file());
    assert!(store.path_for(PROFILING_SAMPLE).is_file());
    assert_ne!(
        store.path_for(CORRECTNESS_SAMPLES),
        store.path_for(PROFILING_SAMPLE)
    );

    let profiling = store.load(PROFILING_SAMPLE).unwrap();
    assert_eq!(profiling.batch_dim, Some(0));
    assert_eq!(profiling.len(), 1);
}

#[test]
fn loading_a_missing_role_fails_with_path_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = SampleStore::new(dir.path());

    let err = store.load("no_such_role").unwrap_err();
    assert!(format!("{err:#}").contains("no_such_role"));
}
