mod common;

use std::fs;
use std::sync::Arc;

use common::{RedDetector, WITH_TAB, WITHOUT_TAB, test_config, write_image};
use image::imageops::FilterType;
use tabsort::SortPipeline;
use tabsort::detection::{LetterboxGeometry, letterbox_file, pad_directory};
use tabsort::sorting::{list_files, revert_sorted};

#[test]
fn test_sort_moves_images_into_bins() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let config = test_config(root.path());
    let images = &config.paths.images_dir;
    write_image(images, "v1_1_0_0.jpg", 120, 80, WITH_TAB);
    write_image(images, "v1_2_0_0.jpg", 80, 120, WITHOUT_TAB);
    write_image(images, "v1_3_0_1.jpg", 50, 50, WITH_TAB);
    fs::write(images.join("broken.jpg"), b"not an image")?;
    fs::write(images.join("notes.txt"), b"ignored")?;

    let pipeline = SortPipeline::new(Arc::new(RedDetector), config.sort_dirs())
        .with_settings(config.sort_settings());
    let summary = pipeline.run(images)?;

    assert_eq!(summary.present, 2);
    assert_eq!(summary.absent, 1);
    assert_eq!(summary.batch.processed, 3);
    assert_eq!(summary.batch.skipped, 1);
    assert_eq!(summary.batch.failed, 0);

    let dirs = config.sort_dirs();
    assert!(dirs.present.join("v1_1_0_0.jpg").exists());
    assert!(dirs.present.join("v1_3_0_1.jpg").exists());
    assert!(dirs.absent.join("v1_2_0_0.jpg").exists());
    // the corrupt file and the non-image stay put
    assert!(images.join("broken.jpg").exists());
    assert!(images.join("notes.txt").exists());
    Ok(())
}

#[test]
fn test_threshold_override_changes_labels() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let config = test_config(root.path());
    write_image(&config.paths.images_dir, "a.jpg", 64, 64, WITH_TAB);

    let pipeline = SortPipeline::new(Arc::new(RedDetector), config.sort_dirs())
        .with_settings(config.sort_settings())
        .with_threshold(1.0);
    let summary = pipeline.run(&config.paths.images_dir)?;

    assert_eq!(summary.absent, 1);
    assert!(config.sort_dirs().absent.join("a.jpg").exists());
    Ok(())
}

#[test]
fn test_sort_then_revert_restores_input() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let config = test_config(root.path());
    let images = &config.paths.images_dir;
    for i in 0..4 {
        let red = if i % 2 == 0 { WITH_TAB } else { WITHOUT_TAB };
        write_image(images, &format!("{}.jpg", i), 40, 30, red);
    }

    let dirs = config.sort_dirs();
    SortPipeline::new(Arc::new(RedDetector), dirs.clone())
        .with_settings(config.sort_settings())
        .run(images)?;
    assert!(list_files(images)?.is_empty());

    let summary = revert_sorted(images, &dirs)?;
    assert_eq!(summary.processed, 4);
    assert_eq!(list_files(images)?.len(), 4);
    assert!(list_files(&dirs.present)?.is_empty());
    assert!(list_files(&dirs.absent)?.is_empty());
    Ok(())
}

#[test]
fn test_debug_output_written() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let config = test_config(root.path());
    write_image(&config.paths.images_dir, "can.jpg", 90, 60, WITH_TAB);
    let debug_dir = root.path().join("debug");

    SortPipeline::new(Arc::new(RedDetector), config.sort_dirs())
        .with_settings(config.sort_settings())
        .with_debug(debug_dir.clone())?
        .run(&config.paths.images_dir)?;

    let letterboxed = image::open(debug_dir.join("01_letterbox/can.png"))?;
    assert_eq!((letterboxed.width(), letterboxed.height()), (64, 64));
    let annotated = image::open(debug_dir.join("02_detections/can.png"))?;
    assert_eq!((annotated.width(), annotated.height()), (90, 60));
    Ok(())
}

#[test]
fn test_pad_directory_matches_letterbox_geometry() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let input = root.path().join("raw");
    let output = root.path().join("640_padded_data");
    write_image(&input, "tall.jpg", 300, 600, WITH_TAB);
    write_image(&input.join("sub"), "wide.png", 1000, 500, WITH_TAB);

    let summary = pad_directory(&input, &output, 640, FilterType::Lanczos3)?;
    assert_eq!(summary.processed, 2);

    let tall = image::open(output.join("tall.jpg"))?;
    assert_eq!((tall.width(), tall.height()), (640, 640));
    let wide = image::open(output.join("sub/wide.jpg"))?;
    assert_eq!((wide.width(), wide.height()), (640, 640));

    let geometry = LetterboxGeometry::compute(300, 600, 640)?;
    assert_eq!((geometry.resized_width, geometry.resized_height), (320, 640));
    assert_eq!((geometry.pad_x, geometry.pad_y), (160, 0));

    let boxed = letterbox_file(&input.join("tall.jpg"), 640, FilterType::Triangle)?;
    // padding is black, content is not
    assert_eq!(boxed.image.get_pixel(10, 320).0, [0, 0, 0]);
    assert!(boxed.image.get_pixel(320, 320).0[0] > 200);
    Ok(())
}
