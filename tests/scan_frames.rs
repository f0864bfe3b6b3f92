use std::fs;
use std::path::Path;

use corner_pin_player::error::Error;
use corner_pin_player::scan::{discover_frames, is_frame_file};

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"").unwrap();
}

#[test]
fn frames_come_back_in_file_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["frame_0003.png", "frame_0001.png", "frame_0002.PNG"] {
        touch(dir.path(), name);
    }

    let frames = discover_frames(dir.path()).unwrap();
    let names: Vec<_> = frames
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["frame_0001.png", "frame_0002.PNG", "frame_0003.png"]);
}

#[test]
fn hidden_nested_and_foreign_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "a.jpg");
    touch(dir.path(), ".b.jpg");
    touch(dir.path(), "notes.txt");
    fs::create_dir(dir.path().join("sub")).unwrap();
    touch(&dir.path().join("sub"), "c.jpg");

    let frames = discover_frames(dir.path()).unwrap();
    assert_eq!(frames, vec![dir.path().join("a.jpg")]);
}

#[test]
fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "readme.md");
    assert!(matches!(
        discover_frames(dir.path()),
        Err(Error::EmptyClip(_))
    ));
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(discover_frames(&missing), Err(Error::BadClipDir(_))));

    touch(dir.path(), "file.png");
    assert!(matches!(
        discover_frames(&dir.path().join("file.png")),
        Err(Error::BadClipDir(_))
    ));
}

#[test]
fn frame_extensions() {
    assert!(is_frame_file(Path::new("x.webp")));
    assert!(is_frame_file(Path::new("x.JPEG")));
    assert!(!is_frame_file(Path::new("x.mp4")));
    assert!(!is_frame_file(Path::new("x")));
}
