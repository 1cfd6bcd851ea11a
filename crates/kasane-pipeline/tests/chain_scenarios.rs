//! End-to-end chain scenarios: lazy recompute across a realistic chain
//! and pipeline-file round-trips through a real directory move.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use kasane_pipeline::params::{BlurParams, ThresholdParams};
use kasane_pipeline::{Chain, DisplayImage, Frame, Stage, StageKind, StageParams};

/// Encode a small PNG with a vertical black/white boundary.
fn sharp_edge_png(width: u32, height: u32) -> Vec<u8> {
    let img = Frame::from_fn(width, height, |x, _y| {
        if x < width / 2 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    });
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgba8,
    )
    .unwrap();
    buf
}

/// A stage that runs the real built-in filter but logs every invocation
/// together with the params it saw.
fn observed_stage(
    kind: StageKind,
    params: StageParams,
    log: &Arc<Mutex<Vec<(StageKind, StageParams)>>>,
) -> Stage {
    let log = Arc::clone(log);
    Stage::with_filter(
        kind,
        params,
        Arc::new(move |frame, params| {
            log.lock().unwrap().push((kind, params.clone()));
            kind.apply(frame, params)
        }),
    )
}

#[test]
fn blur_threshold_scenario_recomputes_only_downstream() {
    let log: Arc<Mutex<Vec<(StageKind, StageParams)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut chain = Chain::new();
    chain.set_root_image(sharp_edge_png(16, 16), Some(PathBuf::from("x.png")));
    let blur = chain
        .push_stage(observed_stage(
            StageKind::Blur,
            StageParams::Blur(BlurParams { sigma: 3.0 }),
            &log,
        ))
        .unwrap();
    let threshold = chain
        .push_stage(observed_stage(
            StageKind::Threshold,
            StageParams::Threshold(ThresholdParams { threshold: 128 }),
            &log,
        ))
        .unwrap();

    // First pull: decode once, blur once with sigma=3, threshold once
    // with t=128, result cached on the threshold stage.
    let first = chain.image_at(threshold).unwrap();
    {
        let calls = log.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            (StageKind::Blur, StageParams::Blur(BlurParams { sigma: 3.0 })),
        );
        assert_eq!(
            calls[1],
            (
                StageKind::Threshold,
                StageParams::Threshold(ThresholdParams { threshold: 128 }),
            ),
        );
    }
    assert!(matches!(
        chain.display_image(threshold),
        DisplayImage::Fresh(_)
    ));

    let root_before = chain.image_at(0).unwrap();
    log.lock().unwrap().clear();

    // Retune the blur: blur and threshold stale, root untouched.
    chain
        .set_params(blur, StageParams::Blur(BlurParams { sigma: 5.0 }))
        .unwrap();
    assert_eq!(chain.dirty_at(blur), Some(true));
    assert_eq!(chain.dirty_at(threshold), Some(true));
    assert_eq!(chain.dirty_at(0), Some(false));

    let second = chain.image_at(threshold).unwrap();
    {
        let calls = log.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            (StageKind::Blur, StageParams::Blur(BlurParams { sigma: 5.0 })),
        );
        assert_eq!(calls[1].0, StageKind::Threshold);
    }

    // The root cache was reused, not re-decoded.
    let root_after = chain.image_at(0).unwrap();
    assert!(Arc::ptr_eq(&root_before, &root_after));
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn pipeline_file_survives_a_directory_move() {
    // Build proj/ with an image and a pipeline file referencing it
    // relatively, then move the whole directory and reload.
    let scratch = std::env::temp_dir().join(format!(
        "kasane-move-test-{}",
        std::process::id()
    ));
    let proj = scratch.join("proj");
    let proj2 = scratch.join("proj2");
    std::fs::create_dir_all(proj.join("images")).unwrap();

    let png = sharp_edge_png(12, 12);
    std::fs::write(proj.join("images/a.png"), &png).unwrap();

    let mut chain = Chain::new();
    chain.set_root_image(png, Some(proj.join("images/a.png")));
    chain
        .push(StageKind::Blur, StageParams::Blur(BlurParams { sigma: 2.0 }))
        .unwrap();

    let json = kasane_pipeline::codec::to_json_string(&chain, &proj).unwrap();
    std::fs::write(proj.join("pipe.json"), &json).unwrap();

    // Move the directory wholesale.
    std::fs::rename(&proj, &proj2).unwrap();

    let moved_json = std::fs::read_to_string(proj2.join("pipe.json")).unwrap();
    let mut restored = kasane_pipeline::codec::from_json_str(&moved_json, &proj2).unwrap();

    assert_eq!(restored.root_path(), proj2.join("images/a.png").as_path());
    let bytes = std::fs::read(restored.root_path()).unwrap();
    restored.set_root_image(bytes, None);
    assert!(restored.image_at(1).is_ok());

    std::fs::remove_dir_all(&scratch).unwrap();
}

#[test]
fn load_failure_leaves_no_partial_chain() {
    let json = r#"[
        {"tabName": "source", "params": {"path": "a.png"}},
        {"tabName": "blur", "params": {"sigma": 2.0}},
        {"tabName": "perspective", "params": {}}
    ]"#;
    let result = kasane_pipeline::codec::from_json_str(json, Path::new("/p"));
    assert!(result.is_err(), "unknown kind must fail the whole load");
}
