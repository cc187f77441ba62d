//! Byte-level format engines behind a narrow trait boundary.
//!
//! The session layer never touches header layout, record sizing or
//! physical/digital scaling; it reaches the format engines only through
//! [`Codec`] and the `open_reader`/`open_writer` registry below.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::error::{Result, XdfError};
use crate::types::{Channel, FileType, Mode};

pub(crate) mod ebdf;
pub(crate) mod gdf;

use ebdf::{EbdfReader, EbdfWriter};
use gdf::{GdfReader, GdfWriter};

/// Metadata a write session hands to its codec at the first write.
pub(crate) struct RecordingConfig {
    pub channels: Vec<Channel>,
    pub sample_rate: f64,
    pub record_time: NaiveDateTime,
    pub subject_desc: String,
    pub session_desc: String,
}

/// Metadata a read codec reports once the header is parsed.
pub(crate) struct RecordingInfo {
    pub file_type: FileType,
    pub channels: Vec<Channel>,
    pub sample_rate: f64,
    pub record_time: NaiveDateTime,
    pub subject_desc: String,
    pub session_desc: String,
    pub total_samples: u64,
}

/// One open format engine.
///
/// Readers implement `read_block`, writers implement `configure` and
/// `append_block`; the session's mode gating keeps each side on its own
/// methods. `finish` completes the file (padding the last record and
/// patching the record count for writers) and must be callable exactly
/// once, after which the engine drops its file handle.
pub(crate) trait Codec {
    fn configure(&mut self, cfg: &RecordingConfig) -> Result<()>;
    fn append_block(&mut self, block: ArrayView2<'_, f64>) -> Result<()>;
    fn read_block(&mut self, start: u64, count: usize) -> Result<Array2<f64>>;
    fn finish(&mut self) -> Result<()>;
}

/// Identifies a format from the first 8 bytes of a file.
///
/// EDF and EDF+ share a magic key; the header reserved field settles the
/// variant during parsing.
pub(crate) fn guess_filetype(magic: &[u8; 8]) -> Option<FileType> {
    if magic == b"0       " {
        Some(FileType::Edf)
    } else if magic[0] == 0xFF && &magic[1..] == b"BIOSEMI" {
        Some(FileType::Bdf)
    } else if magic.starts_with(b"GDF 1.") {
        Some(FileType::Gdf1)
    } else if magic.starts_with(b"GDF 2.") {
        Some(FileType::Gdf2)
    } else {
        None
    }
}

/// Collapses the EDF variants to the type their magic key identifies.
fn magic_family(filetype: FileType) -> FileType {
    match filetype {
        FileType::EdfPlus => FileType::Edf,
        other => other,
    }
}

/// Opens a file for reading, auto-detecting the format and checking it
/// against `requested` if one was given. Returns the engine and the
/// parsed recording metadata.
pub(crate) fn open_reader(
    path: &Path,
    requested: Option<FileType>,
) -> Result<(Box<dyn Codec>, RecordingInfo)> {
    let file = File::open(path)?;

    let mut magic = [0u8; 8];
    read_magic(&file, &mut magic)?;

    let detected = guess_filetype(&magic).ok_or_else(|| {
        XdfError::UnknownFileType(format!("{}: unrecognized file content", path.display()))
    })?;

    if let Some(requested) = requested {
        if magic_family(requested) != detected {
            return Err(XdfError::InvalidFormat(format!(
                "{} is a {} file, not {}",
                path.display(),
                detected,
                requested
            )));
        }
    }

    let (codec, info): (Box<dyn Codec>, RecordingInfo) = match detected {
        FileType::Edf | FileType::EdfPlus | FileType::Bdf => {
            let (reader, info) = EbdfReader::open(file, detected)?;
            (Box::new(reader), info)
        }
        FileType::Gdf1 | FileType::Gdf2 => {
            let (reader, info) = GdfReader::open(file, detected)?;
            (Box::new(reader), info)
        }
    };

    // The magic key cannot tell EDF from EDF+, so an exact request is
    // re-checked against the parsed header.
    if let Some(requested) = requested {
        if requested != info.file_type {
            return Err(XdfError::InvalidFormat(format!(
                "{} is a {} file, not {}",
                path.display(),
                info.file_type,
                requested
            )));
        }
    }

    debug!(
        path = %path.display(),
        filetype = %info.file_type,
        channels = info.channels.len(),
        total_samples = info.total_samples,
        "opened recording for reading"
    );
    Ok((codec, info))
}

/// Creates a file for writing in the requested format.
///
/// Fails before touching the filesystem when no encoder exists for the
/// format (GDF1), and with a file-exists condition for `WriteExclusive`
/// on an existing path.
pub(crate) fn open_writer(path: &Path, mode: Mode, filetype: FileType) -> Result<Box<dyn Codec>> {
    if !filetype.supports_write() {
        return Err(XdfError::WriteUnsupported(filetype));
    }

    let file = match mode {
        Mode::Write => File::create(path)?,
        Mode::WriteExclusive => OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    XdfError::FileExists(path.display().to_string())
                } else {
                    XdfError::Io(e)
                }
            })?,
        Mode::Read => return Err(XdfError::ModeMismatch("writing")),
    };

    debug!(path = %path.display(), %filetype, "created recording for writing");
    match filetype {
        FileType::Edf | FileType::EdfPlus | FileType::Bdf => {
            Ok(Box::new(EbdfWriter::new(file, filetype)))
        }
        FileType::Gdf2 => Ok(Box::new(GdfWriter::new(file))),
        FileType::Gdf1 => unreachable!("rejected above"),
    }
}

fn read_magic(mut file: &File, magic: &mut [u8; 8]) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.read_exact(magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Linear physical/digital conversion for one channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearScale {
    bit_value: f64,
    offset: f64,
    digital_min: f64,
    digital_max: f64,
}

impl LinearScale {
    pub fn new(
        physical_min: f64,
        physical_max: f64,
        digital_min: f64,
        digital_max: f64,
    ) -> Result<Self> {
        if physical_min == physical_max {
            return Err(XdfError::PhysicalMinEqualsMax);
        }
        if digital_min == digital_max {
            return Err(XdfError::InvalidFormat(
                "digital min equals digital max".to_string(),
            ));
        }
        let bit_value = (physical_max - physical_min) / (digital_max - digital_min);
        Ok(LinearScale {
            bit_value,
            offset: physical_max / bit_value - digital_max,
            digital_min,
            digital_max,
        })
    }

    pub fn to_physical(&self, digital: f64) -> f64 {
        let clamped = digital.max(self.digital_min).min(self.digital_max);
        self.bit_value * (self.offset + clamped)
    }

    pub fn to_digital(&self, physical: f64) -> f64 {
        let digital = (physical / self.bit_value - self.offset).round();
        digital.max(self.digital_min).min(self.digital_max)
    }
}
