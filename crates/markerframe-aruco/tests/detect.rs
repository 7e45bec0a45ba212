use approx::assert_relative_eq;
use markerframe_aruco::{
    builtin_dictionary, rotate_code_u64, ArucoDetector, ArucoParams, Dictionary,
};
use markerframe_core::{GrayImage, MarkerDetector};
use nalgebra::Point2;

const CODE_A: u64 = 0x8013;
const CODE_B: u64 = 0x1268;

fn test_dictionary() -> Dictionary {
    Dictionary::new("TEST_4X4", 4, 1, vec![CODE_A, CODE_B]).expect("dictionary")
}

/// Draw a bordered 4x4 marker with its top-left outline corner at `(x0, y0)`.
fn draw_marker(img: &mut GrayImage, code: u64, x0: usize, y0: usize, cell: usize) {
    for cy in 0..6 {
        for cx in 0..6 {
            let border = cx == 0 || cy == 0 || cx == 5 || cy == 5;
            let bit = !border && (code >> ((cy - 1) * 4 + (cx - 1))) & 1 == 1;
            if border || bit {
                img.fill_rect(x0 + cx * cell, y0 + cy * cell, cell, cell, 0);
            }
        }
    }
}

fn assert_corners(got: &[Point2<f32>; 4], want: [(f32, f32); 4]) {
    for (g, (x, y)) in got.iter().zip(want) {
        assert_relative_eq!(g.x, x, epsilon = 1e-3);
        assert_relative_eq!(g.y, y, epsilon = 1e-3);
    }
}

#[test]
fn detects_upright_marker_with_top_left_first() {
    let mut img = GrayImage::new(120, 120, 255);
    draw_marker(&mut img, CODE_A, 30, 30, 10);

    let detector = ArucoDetector::new(test_dictionary(), ArucoParams::default());
    let det = detector.detect_markers(&img.view());

    assert_eq!(det.markers.len(), 1);
    let m = &det.markers[0];
    assert_eq!(m.id, 0);
    assert_eq!(m.hamming, 0);
    assert_corners(&m.corners, [(30.0, 30.0), (90.0, 30.0), (90.0, 90.0), (30.0, 90.0)]);
    assert!(det.rejected.is_empty());
}

#[test]
fn rotated_print_moves_corner_zero() {
    let mut img = GrayImage::new(120, 120, 255);
    // marker B turned a quarter clockwise: its top-left is drawn top-right
    draw_marker(&mut img, rotate_code_u64(CODE_B, 4, 1), 30, 30, 10);

    let detector = ArucoDetector::new(test_dictionary(), ArucoParams::default());
    let det = detector.detect_markers(&img.view());

    assert_eq!(det.markers.len(), 1);
    assert_eq!(det.markers[0].id, 1);
    assert_corners(
        &det.markers[0].corners,
        [(90.0, 30.0), (90.0, 90.0), (30.0, 90.0), (30.0, 30.0)],
    );
    assert!(det.rejected.is_empty(), "payload blobs must not be reported");
}

#[test]
fn trait_output_is_sorted_by_id() {
    let mut img = GrayImage::new(200, 120, 255);
    draw_marker(&mut img, CODE_B, 30, 30, 10);
    draw_marker(&mut img, CODE_A, 110, 30, 10);

    let detector = ArucoDetector::new(test_dictionary(), ArucoParams::default());
    let raw = detector.detect_raw(&img.view());
    assert_eq!(raw.ids, vec![1, 0]);

    let det = detector.detect(&img.view()).expect("consistent output");
    assert_eq!(det.ids(), vec![0, 1]);
    assert_relative_eq!(det.observations[0].corners[0].x, 110.0, epsilon = 1e-3);
    assert_relative_eq!(det.observations[1].corners[0].x, 30.0, epsilon = 1e-3);
}

#[test]
fn blank_square_is_a_rejected_candidate() {
    let mut img = GrayImage::new(120, 120, 255);
    img.fill_rect(30, 30, 60, 60, 0);

    let detector = ArucoDetector::new(test_dictionary(), ArucoParams::default());
    let det = detector.detect(&img.view()).expect("consistent output");
    assert!(det.is_empty());
    assert_eq!(det.rejected.len(), 1);
}

#[test]
fn empty_image_yields_nothing() {
    let img = GrayImage::new(64, 48, 255);
    let detector = ArucoDetector::new(test_dictionary(), ArucoParams::default());
    let det = detector.detect(&img.view()).expect("consistent output");
    assert!(det.is_empty());
    assert!(det.rejected.is_empty());
}

#[test]
fn loads_dictionary_and_partial_params_from_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dict_path = dir.path().join("dict.json");
    let params_path = dir.path().join("params.json");
    std::fs::write(
        &dict_path,
        serde_json::to_string(&test_dictionary()).expect("serialize"),
    )
    .expect("write dict");
    std::fs::write(&params_path, r#"{ "threshold": 100, "quad": { "min_side_px": 20.0 } }"#)
        .expect("write params");

    let detector = ArucoDetector::from_config(
        dict_path.to_str().expect("utf8 path"),
        Some(params_path.as_path()),
    )
    .expect("load");
    assert_eq!(detector.params().threshold, Some(100));
    assert_eq!(detector.params().quad.min_side_px, 20.0);
    assert_eq!(detector.params().quad.min_area_px, 64);
    assert_eq!(detector.dictionary().name, "TEST_4X4");

    let mut img = GrayImage::new(120, 120, 255);
    draw_marker(&mut img, CODE_A, 30, 30, 10);
    assert_eq!(detector.detect(&img.view()).expect("ok").ids(), vec![0]);
}

#[test]
fn builtin_opencv_dictionary_decodes_printed_ids() {
    let dict = builtin_dictionary("DICT_4X4_50").expect("builtin");
    let mut img = GrayImage::new(200, 120, 255);
    draw_marker(&mut img, dict.codes[3], 20, 30, 10);
    draw_marker(&mut img, rotate_code_u64(dict.codes[17], 4, 2), 110, 30, 10);

    let detector = ArucoDetector::from_config("DICT_4X4_50", None).expect("detector");
    let det = detector.detect(&img.view()).expect("ok");
    assert_eq!(det.ids(), vec![3, 17]);
}
