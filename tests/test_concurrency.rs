mod common;

use common::*;
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[test]
fn test_model_loads_once_under_concurrent_first_calls() {
    let (config, _dir) = config_with_model();
    let boxes = vec![raw_box(10.0, 10.0, 60.0, 60.0, 0.8, 1)];
    let loader = ScriptedLoader::slow(
        ScriptedBackend::new(leak_names(), Behavior::Boxes(boxes)),
        Duration::from_millis(50),
    );
    let detector = detector(config, loader.clone());
    let bytes = encode_png(&blank_image(96, 96));

    let workers = 8;
    let barrier = Barrier::new(workers);
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    detector.detect(&bytes)
                })
            })
            .collect();

        for handle in handles {
            let result = handle.join().expect("worker panicked").expect("detection failed");
            assert_eq!(result.leak_type, LeakCategory::BurstPipe);
        }
    });

    assert_eq!(loader.load_count(), 1);
    assert_eq!(loader.predict_count(), workers);
    assert!(detector.model().is_loaded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_detection_runs_off_the_async_runtime() -> anyhow::Result<()> {
    let (config, _dir) = config_with_model();
    let loader = ScriptedLoader::new(ScriptedBackend::new(leak_names(), Behavior::Fail));
    let detector = Arc::new(detector(config, loader));

    let tasks: Vec<_> = [burst_image(), rust_image()]
        .iter()
        .map(|img| tokio::spawn(detector.clone().detect_blocking_task(encode_png(img))))
        .collect();

    let mut leak_types = Vec::new();
    for task in tasks {
        leak_types.push(task.await??.leak_type);
    }
    assert_eq!(leak_types, vec![LeakCategory::BurstPipe, LeakCategory::RustCorrosion]);
    Ok(())
}

#[tokio::test]
async fn test_bad_upload_surfaces_through_worker() {
    let (config, _dir) = config_with_model();
    let loader = ScriptedLoader::new(ScriptedBackend::new(leak_names(), Behavior::Boxes(vec![])));
    let detector = Arc::new(detector(config, loader));

    let err = detector.detect_blocking_task(Vec::new()).await.unwrap_err();
    assert!(matches!(err, LeakError::Decode(DecodeError::Empty)));
}
