use std::fs;

use ndarray::Array2;
use tempfile::tempdir;

use xdfio::{Channel, FileType, Mode, Session, XdfError};

/// Writes a small two-channel EDF recording and returns its sample data.
fn write_reference(path: &std::path::Path, ns: usize) -> Array2<f64> {
    let data = Array2::from_shape_fn((ns, 2), |(i, c)| {
        ((i as f64 / 50.0).sin() + c as f64) * 0.5
    });

    let mut session = Session::open(path, Mode::Write, Some(FileType::Edf)).unwrap();
    session.set_sample_rate(100.0).unwrap();
    session
        .add_channel(Channel::new("ch0", -2.0, 2.0, "uV"))
        .unwrap();
    session
        .add_channel(Channel::new("ch1", -2.0, 2.0, "uV"))
        .unwrap();
    session.write(data.view()).unwrap();
    session.close().unwrap();
    data
}

#[test]
fn mode_strings_parse() {
    assert_eq!("r".parse::<Mode>().unwrap(), Mode::Read);
    assert_eq!("wx".parse::<Mode>().unwrap(), Mode::WriteExclusive);
    assert!(matches!(
        "rw".parse::<Mode>(),
        Err(XdfError::InvalidMode(_))
    ));
}

#[test]
fn write_mode_requires_a_filetype() {
    let dir = tempdir().unwrap();
    let err = Session::open(dir.path().join("a.edf"), Mode::Write, None).unwrap_err();
    assert!(matches!(err, XdfError::FileTypeRequired));
}

#[test]
fn reading_a_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = Session::open(dir.path().join("nope.edf"), Mode::Read, None).unwrap_err();
    assert!(matches!(err, XdfError::Io(_)));
}

#[test]
fn unrecognized_content_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("junk.dat");
    fs::write(&path, b"certainly not a biosignal recording").unwrap();
    let err = Session::open(&path, Mode::Read, None).unwrap_err();
    assert!(matches!(err, XdfError::UnknownFileType(_)));
}

#[test]
fn gdf1_write_fails_at_open_before_any_io() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("old.gdf");
    let err = Session::open(&path, Mode::Write, Some(FileType::Gdf1)).unwrap_err();
    assert!(matches!(err, XdfError::WriteUnsupported(FileType::Gdf1)));
    // rejected before the file was created
    assert!(!path.exists());
}

#[test]
fn write_exclusive_refuses_existing_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("taken.bdf");
    fs::write(&path, b"").unwrap();

    let err = Session::open(&path, Mode::WriteExclusive, Some(FileType::Bdf)).unwrap_err();
    assert!(matches!(err, XdfError::FileExists(_)));
}

#[test]
fn write_exclusive_creates_missing_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fresh.bdf");

    let mut session = Session::open(&path, Mode::WriteExclusive, Some(FileType::Bdf)).unwrap();
    session.set_sample_rate(10.0).unwrap();
    session
        .add_channel(Channel::new("ch0", -1.0, 1.0, ""))
        .unwrap();
    session.write(Array2::zeros((10, 1)).view()).unwrap();
    session.close().unwrap();
    assert!(path.exists());
}

#[test]
fn chunk_validation_happens_before_io() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.edf");
    write_reference(&path, 200);

    let mut session = Session::open(&path, Mode::Read, None).unwrap();
    assert_eq!(session.total_samples(), 200);

    for (start, end) in [(-1, 10), (10, 5), (0, 200), (190, 4000)] {
        let err = session.read_chunk(start, end).unwrap_err();
        match err {
            XdfError::ChunkOutOfRange { total, .. } => assert_eq!(total, 200),
            other => panic!("expected a range error, got {other}"),
        }
    }

    // boundaries are inclusive
    assert_eq!(session.read_chunk(0, 199).unwrap().nrows(), 200);
    assert_eq!(session.read_chunk(16, 24).unwrap().nrows(), 9);
}

#[test]
fn unknown_channel_names_the_offender() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.edf");
    write_reference(&path, 100);

    let mut session = Session::open(&path, Mode::Read, None).unwrap();
    let err = session.read_channels(&["ch0", "ch7"], None).unwrap_err();
    assert!(matches!(err, XdfError::UnknownChannel(name) if name == "ch7"));
}

#[test]
fn channel_selection_follows_requested_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.edf");
    let data = write_reference(&path, 100);

    let mut session = Session::open(&path, Mode::Read, None).unwrap();
    let swapped = session.read_channels(&["ch1", "ch0"], None).unwrap();
    let stored = session.read().unwrap();

    assert_eq!(swapped.column(0), stored.column(1));
    assert_eq!(swapped.column(1), stored.column(0));

    // duplicates are allowed
    let doubled = session.read_channels(&["ch0", "ch0", "ch1"], None).unwrap();
    assert_eq!(doubled.ncols(), 3);
    assert_eq!(doubled.column(0), doubled.column(1));

    // empty selection keeps the row count
    let none = session.read_channels(&[], Some((0, 9))).unwrap();
    assert_eq!(none.dim(), (10, 0));

    assert_eq!(stored.dim(), data.dim());
}

#[test]
fn repeated_reads_are_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.edf");
    write_reference(&path, 150);

    let mut session = Session::open(&path, Mode::Read, None).unwrap();
    let first = session.read_chunk(20, 80).unwrap();
    let second = session.read_chunk(20, 80).unwrap();
    assert_eq!(first, second);
}

#[test]
fn wrong_direction_calls_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ref.edf");
    write_reference(&path, 50);

    let mut reader = Session::open(&path, Mode::Read, None).unwrap();
    assert!(matches!(
        reader.write(Array2::zeros((1, 2)).view()),
        Err(XdfError::ModeMismatch(_))
    ));
    assert!(matches!(
        reader.add_channel(Channel::new("x", 0.0, 1.0, "")),
        Err(XdfError::ModeMismatch(_))
    ));
    assert!(matches!(
        reader.set_sample_rate(5.0),
        Err(XdfError::ModeMismatch(_))
    ));

    let w = dir.path().join("w.edf");
    let mut writer = Session::open(&w, Mode::Write, Some(FileType::Edf)).unwrap();
    assert!(matches!(writer.read(), Err(XdfError::ModeMismatch(_))));
}

#[test]
fn metadata_freezes_at_first_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frozen.edf");

    let mut session = Session::open(&path, Mode::Write, Some(FileType::Edf)).unwrap();
    session.set_sample_rate(100.0).unwrap();
    session.set_subject_desc("frozen subject").unwrap();
    session
        .add_channel(Channel::new("ch0", -2.0, 2.0, "uV"))
        .unwrap();
    session.write(Array2::zeros((5, 1)).view()).unwrap();

    assert!(matches!(
        session.set_sample_rate(200.0),
        Err(XdfError::Frozen("sample_rate"))
    ));
    assert!(matches!(
        session.add_channel(Channel::new("late", 0.0, 1.0, "")),
        Err(XdfError::Frozen("channels"))
    ));
    assert!(matches!(
        session.set_subject_desc("other"),
        Err(XdfError::Frozen("subject_desc"))
    ));

    // appends are still fine
    session.write(Array2::zeros((5, 1)).view()).unwrap();
    assert_eq!(session.total_samples(), 10);
}

#[test]
fn channel_count_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mismatch.edf");

    let mut session = Session::open(&path, Mode::Write, Some(FileType::Edf)).unwrap();
    session.set_sample_rate(10.0).unwrap();
    session
        .add_channel(Channel::new("ch0", -2.0, 2.0, "uV"))
        .unwrap();
    session
        .add_channel(Channel::new("ch1", -2.0, 2.0, "uV"))
        .unwrap();

    let err = session.write(Array2::zeros((4, 3)).view()).unwrap_err();
    assert!(matches!(
        err,
        XdfError::ChannelCountMismatch {
            expected: 2,
            actual: 3
        }
    ));
}

#[test]
fn close_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("closed.edf");
    write_reference(&path, 20);

    let mut session = Session::open(&path, Mode::Read, None).unwrap();
    session.close().unwrap();
    session.close().unwrap();
    assert!(matches!(session.read(), Err(XdfError::SessionClosed)));
}

#[test]
fn drop_completes_a_write_session() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dropped.edf");

    {
        let mut session = Session::open(&path, Mode::Write, Some(FileType::Edf)).unwrap();
        session.set_sample_rate(10.0).unwrap();
        session
            .add_channel(Channel::new("ch0", -2.0, 2.0, "uV"))
            .unwrap();
        session.write(Array2::zeros((10, 1)).view()).unwrap();
        // no explicit close
    }

    let mut reopened = Session::open(&path, Mode::Read, None).unwrap();
    assert_eq!(reopened.total_samples(), 10);
    assert_eq!(reopened.read().unwrap().dim(), (10, 1));
}

#[test]
fn read_session_reports_stored_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meta.edf");
    write_reference(&path, 100);

    let session = Session::open(&path, Mode::Read, None).unwrap();
    assert_eq!(session.mode(), Mode::Read);
    assert_eq!(session.filetype(), FileType::Edf);
    assert_eq!(session.filename(), path.as_path());
    assert_eq!(session.sample_rate(), 100.0);
    assert!(!session.is_empty());

    let names: Vec<&str> = session.channels().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["ch0", "ch1"]);
    assert_eq!(session.channels()[0].unit, "uV");
}

#[test]
fn requested_filetype_must_match_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mine.edf");
    write_reference(&path, 20);

    assert!(Session::open(&path, Mode::Read, Some(FileType::Edf)).is_ok());
    let err = Session::open(&path, Mode::Read, Some(FileType::Bdf)).unwrap_err();
    assert!(matches!(err, XdfError::InvalidFormat(_)));
}
