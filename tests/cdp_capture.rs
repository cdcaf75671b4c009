#![cfg(feature = "cdp")]

//! Real browser runs. These need Chrome/Chromium on the machine.

use mailproof::artifacts::ArtifactStore;
use mailproof::cdp::CdpLauncher;
use mailproof::document::DocumentLoader;
use mailproof::orchestrator::CaptureOrchestrator;
use mailproof::{CaptureConfig, CaptureResult, ViewportSet, ViewportSpec};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><style>@media (max-width: 400px) { .box { background: #00f !important; } }</style></head>
<body style="margin:0">
<div class="box" style="width:100%;height:60px;background:#f00"></div>
<p>Hello subscriber</p>
</body>
</html>"#;

#[test]
#[ignore] // Requires Chrome to be installed
fn captures_each_viewport_at_its_size() {
    let scratch = tempfile::tempdir().unwrap();
    let shots = tempfile::tempdir().unwrap();
    let orchestrator = CaptureOrchestrator::new(
        CdpLauncher::new(CaptureConfig::default()),
        DocumentLoader::new(Some(scratch.path().to_path_buf())),
        ArtifactStore::new(shots.path(), "/static/screenshots"),
    );
    let viewports = ViewportSet::new(vec![
        ViewportSpec::new("wide", 800, 600, "Wide"),
        ViewportSpec::new("narrow", 360, 640, "Narrow"),
    ])
    .unwrap();

    let results = orchestrator.run(TEMPLATE, &viewports, "chrome");
    assert_eq!(results.len(), 2);

    for (result, (width, height)) in results.iter().zip([(800, 600), (360, 640)]) {
        match result {
            CaptureResult::Success { artifact_path, .. } => {
                let img = image::open(artifact_path).expect("artifact decodes").to_rgb8();
                assert_eq!(img.dimensions(), (width, height));
            }
            other => panic!("capture failed: {:?}", other),
        }
    }

    // the narrow viewport picks up the media query
    let narrow = image::open(shots.path().join("chrome_narrow.png")).unwrap().to_rgb8();
    let px = narrow.get_pixel(10, 10);
    assert!(px[2] > 200 && px[0] < 50, "expected blue, got {:?}", px);

    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[test]
#[ignore] // Requires Chrome to be installed
fn missing_binary_is_engine_unavailable() {
    let config = CaptureConfig {
        chrome_path: Some("/nonexistent/chrome".into()),
        ..CaptureConfig::default()
    };
    let scratch = tempfile::tempdir().unwrap();
    let shots = tempfile::tempdir().unwrap();
    let orchestrator = CaptureOrchestrator::new(
        CdpLauncher::new(config),
        DocumentLoader::new(Some(scratch.path().to_path_buf())),
        ArtifactStore::new(shots.path(), "/s"),
    );

    let results = orchestrator.run(TEMPLATE, &ViewportSet::default(), "none");
    assert!(results.is_empty());
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}
