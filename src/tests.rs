use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::dispatcher::{apply, from_fn};
use crate::errors::{ErrorCategory, FilterError};
use crate::filters::FilterKind;
use crate::histogram::{Channel, Histogram};
use crate::partition::{partition, Band};
use crate::pixel_buffer::PixelBuffer;
use crate::session::Session;
use crate::settings::Settings;

#[test]
fn four_rows_three_workers_end_to_end() {
    let mut buffer = PixelBuffer::new(4, 4).unwrap();
    let seen = Mutex::new(Vec::new());

    let result = apply(
        &mut buffer,
        3,
        &from_fn(|band| {
            seen.lock().unwrap().push(band.band());
            Ok(())
        }),
    )
    .unwrap();

    let expected = vec![Band::new(0, 2), Band::new(2, 3), Band::new(3, 4)];
    assert_eq!(result.bands, expected);

    let mut seen = seen.into_inner().unwrap();
    seen.sort_by_key(|b| b.start_row);
    assert_eq!(seen, expected);
}

#[test]
fn identity_keeps_bytes_and_histogram() {
    let data = vec![0, 64, 128, 255, 1, 2, 30, 40, 50, 200, 100, 0];
    let mut buffer = PixelBuffer::from_bgr(2, 2, data.clone()).unwrap();
    let before = Histogram::compute(&buffer);

    let result = apply(&mut buffer, 2, &FilterKind::Identity).unwrap();

    assert!(result.is_complete());
    assert_eq!(buffer.data(), data.as_slice());
    assert_eq!(Histogram::compute(&buffer), before);
}

#[test]
fn completeness_holds_with_failures() {
    for (height, workers) in [(10, 3), (5, 10), (64, 64), (100, 7)] {
        let mut buffer = PixelBuffer::new(3, height).unwrap();
        let result = apply(
            &mut buffer,
            workers,
            &from_fn(|band| {
                if band.start_row() % 2 == 0 {
                    Ok(())
                } else {
                    Err(crate::errors::BandError::Failed("odd start".to_string()))
                }
            }),
        )
        .unwrap();

        let bands = partition(height, workers);
        assert_eq!(result.bands_attempted(), bands.len());
        assert_eq!(result.bands_completed as usize + result.failures.len(), bands.len());
        let failed: Vec<Band> = result.failures.iter().map(|f| f.band).collect();
        let expected: Vec<Band> = bands.into_iter().filter(|b| b.start_row % 2 == 1).collect();
        assert_eq!(failed, expected);
    }
}

#[test]
fn histogram_is_conserved_by_filtering() {
    let mut buffer = PixelBuffer::new(13, 11).unwrap();
    buffer.set_pixel(6, 5, [255, 255, 255]);

    apply(&mut buffer, 4, &FilterKind::Gaussian).unwrap();

    let histogram = Histogram::compute(&buffer);
    for channel in Channel::ALL {
        assert_eq!(histogram.total(channel), 13 * 11);
    }
}

#[test]
fn session_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.png");
    let source = PixelBuffer::filled(8, 6, [20, 40, 60]).unwrap();
    source.to_rgb_image().unwrap().save(&input).unwrap();

    let mut session = Session::new(Settings { worker_count: 3, ..Settings::default() });
    session.load(&input).unwrap();
    let before = session.histogram_before().unwrap();

    session.apply_filter(&FilterKind::BoxBlur).unwrap();
    let after = session.histogram_after().unwrap();
    // A uniform image is a fixed point of the blur
    assert_eq!(before, after);

    let source_bytes = std::fs::read(&input).unwrap();
    for target in [input.clone(), dir.path().join(".").join("input.png")] {
        let err = session.save(&target).unwrap_err();
        assert!(matches!(err, FilterError::OverwriteSource { .. }));
    }
    assert_eq!(std::fs::read(&input).unwrap(), source_bytes);

    let output = session.default_output_path().unwrap();
    assert_eq!(output, dir.path().join("input_processed.png"));
    session.save(&output).unwrap();

    let mut reloaded = Session::new(Settings::default());
    assert_eq!(reloaded.load(&output).unwrap(), &source);
}

#[test]
fn load_failure_keeps_the_current_image() {
    let mut session = Session::new(Settings::default());
    session.load_buffer(PathBuf::from("/images/a.png"), PixelBuffer::new(2, 2).unwrap());

    let err = session.load(Path::new("/images/missing.png")).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Input);
    assert_eq!(session.source_path(), Some(Path::new("/images/a.png")));
}

#[test]
fn test_error_messages() {
    let error = FilterError::FileTooLarge {
        path: PathBuf::from("/photos/huge.png"),
        size_mb: 250,
        limit_mb: 100,
    };

    assert_eq!(error.category(), ErrorCategory::Input);
    assert_eq!(error.error_code(), "FILE_TOO_LARGE");

    let user_msg = error.user_message();
    assert!(user_msg.contains("250MB (max 100MB)"));
    assert!(user_msg.contains("max_file_size_mb"));

    let band = FilterError::BandFailure { start_row: 4, end_row: 8, reason: "filter returned status 2".to_string() };
    assert_eq!(band.category(), ErrorCategory::BandFailure);
    assert!(band.to_string().contains("rows 4..8"));

    let rejected = FilterError::DispatchRejected { reason: "worker count must be at least 1".to_string() };
    assert_eq!(rejected.category(), ErrorCategory::DispatchRejected);

    let encode = FilterError::EncodeError { path: PathBuf::from("out.png"), message: "disk full".to_string() };
    assert_eq!(encode.category(), ErrorCategory::Encode);
    assert_eq!(
        FilterError::DecodingError { path: PathBuf::from("x.jpg"), message: String::new() }.category(),
        ErrorCategory::Decode
    );
}
