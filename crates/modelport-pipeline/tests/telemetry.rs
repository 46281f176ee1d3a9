use modelport_pipeline::GpuTelemetry;

#[test]
fn failed_init_degrades_to_unavailable() {
    let telemetry = GpuTelemetry::with_command("modelport-no-such-telemetry-tool");

    assert!(!telemetry.is_available());
    assert_eq!(telemetry.gpu_count(), 0);
    assert_eq!(telemetry.gpu_clock(), None);
}

#[test]
fn queries_never_panic_after_shutdown() {
    let mut telemetry = GpuTelemetry::with_command("modelport-no-such-telemetry-tool");

    telemetry.shutdown();
    // Shutdown is idempotent.
    telemetry.shutdown();

    assert_eq!(telemetry.gpu_count(), 0);
    assert_eq!(telemetry.gpu_clock(), None);
}

#[cfg(unix)]
#[test]
fn gpu_count_is_cached_at_acquisition() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let calls = dir.path().join("calls");
    let script = dir.path().join("fake-smi");
    // Reports two devices and logs every invocation.
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$@\" >> {calls}\necho 0\necho 1\n",
            calls = calls.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let telemetry = GpuTelemetry::with_command(script.to_str().unwrap());
    assert!(telemetry.is_available());

    for _ in 0..3 {
        assert_eq!(telemetry.gpu_count(), 2);
    }

    // Only acquisition spawned the tool; the count queries were
    // answered from the handle.
    let logged = std::fs::read_to_string(&calls).unwrap();
    assert_eq!(logged.lines().count(), 1);
}

#[test]
fn shutdown_disables_a_live_handle() {
    // Whether or not the real tool is present on this machine, a
    // released handle must report unavailable.
    let mut telemetry = GpuTelemetry::init();
    telemetry.shutdown();

    assert!(!telemetry.is_available());
    assert_eq!(telemetry.gpu_count(), 0);
    assert_eq!(telemetry.gpu_clock(), None);
}
