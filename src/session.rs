//! Session: the caller-facing access layer over one recording file.
//!
//! A `Session` owns a single open file and validates every request —
//! sample ranges, channel names, channel counts, lifecycle state —
//! before the format engine touches any bytes. Write sessions go
//! through two phases: metadata (sampling rate, channels, descriptive
//! text) is mutable until the first block of samples is written, after
//! which the on-disk record structure is fixed and only appends are
//! allowed.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::codec::{self, Codec, RecordingConfig};
use crate::error::{Result, XdfError};
use crate::types::{Channel, FileType, Mode};

/// An open recording file.
///
/// Reading auto-detects the format from the file content; writing
/// requires an explicit format choice. The file handle is released when
/// the session is dropped or [`close`](Session::close) is called,
/// whichever comes first.
///
/// ```no_run
/// use xdfio::{Channel, FileType, Mode, Session};
///
/// let mut session = Session::open("recording.bdf", Mode::Write, Some(FileType::Bdf))?;
/// session.set_sample_rate(256.0)?;
/// session.add_channel(Channel::new("EEG C3", -261.9, 261.9, "uV"))?;
/// session.write(ndarray::Array2::zeros((256, 1)).view())?;
/// session.close()?;
/// # Ok::<(), xdfio::XdfError>(())
/// ```
pub struct Session {
    path: PathBuf,
    mode: Mode,
    filetype: FileType,
    codec: Option<Box<dyn Codec>>,
    channels: Vec<Channel>,
    sample_rate: f64,
    record_time: NaiveDateTime,
    subject_desc: String,
    session_desc: String,
    total_samples: u64,
    /// Set once the record structure is fixed: immediately for read
    /// sessions, at the first write for write sessions.
    committed: bool,
}

impl Session {
    /// Opens a recording file.
    ///
    /// In read mode `filetype` restricts which format is accepted;
    /// `None` accepts any recognized format. In the write modes a
    /// format must be given, and the session starts with no channels
    /// and no samples.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode, filetype: Option<FileType>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match mode {
            Mode::Read => {
                let (codec, info) = codec::open_reader(&path, filetype)?;
                Ok(Session {
                    path,
                    mode,
                    filetype: info.file_type,
                    codec: Some(codec),
                    channels: info.channels,
                    sample_rate: info.sample_rate,
                    record_time: info.record_time,
                    subject_desc: info.subject_desc,
                    session_desc: info.session_desc,
                    total_samples: info.total_samples,
                    committed: true,
                })
            }
            Mode::Write | Mode::WriteExclusive => {
                let filetype = filetype.ok_or(XdfError::FileTypeRequired)?;
                let codec = codec::open_writer(&path, mode, filetype)?;
                Ok(Session {
                    path,
                    mode,
                    filetype,
                    codec: Some(codec),
                    channels: Vec::new(),
                    sample_rate: 0.0,
                    record_time: chrono::Local::now().naive_local(),
                    subject_desc: String::new(),
                    session_desc: String::new(),
                    total_samples: 0,
                    committed: false,
                })
            }
        }
    }

    pub fn filename(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn filetype(&self) -> FileType {
        self.filetype
    }

    /// Number of samples per channel in the recording.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn len(&self) -> u64 {
        self.total_samples
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Channel descriptors in on-disk column order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn subject_desc(&self) -> &str {
        &self.subject_desc
    }

    pub fn session_desc(&self) -> &str {
        &self.session_desc
    }

    /// Start time of the recording.
    pub fn record_time(&self) -> NaiveDateTime {
        self.record_time
    }

    /// Appends a channel descriptor. Channel order defines on-disk
    /// column order.
    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        self.writable("channels")?;
        if self.channels.len() >= crate::MAX_CHANNELS {
            return Err(XdfError::InvalidFormat(format!(
                "too many channels (maximum {})",
                crate::MAX_CHANNELS
            )));
        }
        self.channels.push(channel);
        Ok(())
    }

    pub fn set_sample_rate(&mut self, rate: f64) -> Result<()> {
        self.writable("sample_rate")?;
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(XdfError::InvalidFormat(format!(
                "invalid sampling rate: {}",
                rate
            )));
        }
        self.sample_rate = rate;
        Ok(())
    }

    pub fn set_subject_desc(&mut self, desc: &str) -> Result<()> {
        self.writable("subject_desc")?;
        self.subject_desc = desc.to_string();
        Ok(())
    }

    pub fn set_session_desc(&mut self, desc: &str) -> Result<()> {
        self.writable("session_desc")?;
        self.session_desc = desc.to_string();
        Ok(())
    }

    pub fn set_record_time(&mut self, time: NaiveDateTime) -> Result<()> {
        self.writable("record_time")?;
        self.record_time = time;
        Ok(())
    }

    /// Reads the whole recording, all channels in stored order.
    pub fn read(&mut self) -> Result<Array2<f64>> {
        self.read_impl(None, None)
    }

    /// Reads an inclusive sample range `[start, end]`, all channels.
    pub fn read_chunk(&mut self, start: i64, end: i64) -> Result<Array2<f64>> {
        self.read_impl(None, Some((start, end)))
    }

    /// Reads selected channels, in the requested order.
    ///
    /// The result's columns follow `names` exactly; names may repeat or
    /// cover only a subset of the stored channels. An optional chunk
    /// restricts the sample range as in [`read_chunk`](Session::read_chunk).
    pub fn read_channels(
        &mut self,
        names: &[&str],
        chunk: Option<(i64, i64)>,
    ) -> Result<Array2<f64>> {
        self.read_impl(Some(names), chunk)
    }

    fn read_impl(
        &mut self,
        names: Option<&[&str]>,
        chunk: Option<(i64, i64)>,
    ) -> Result<Array2<f64>> {
        if self.mode.is_write() {
            return Err(XdfError::ModeMismatch("reading"));
        }

        // Resolve the column selection before any I/O. A name matches
        // the first stored channel carrying it.
        let indices: Vec<usize> = match names {
            Some(names) => names
                .iter()
                .map(|name| {
                    self.channels
                        .iter()
                        .position(|ch| ch.name == *name)
                        .ok_or_else(|| XdfError::UnknownChannel((*name).to_string()))
                })
                .collect::<Result<_>>()?,
            None => (0..self.channels.len()).collect(),
        };

        // Validate the range before any I/O as well.
        let (start, end) = chunk.unwrap_or((0, self.total_samples as i64 - 1));
        if chunk.is_none() && self.total_samples == 0 {
            return Ok(Array2::zeros((0, indices.len())));
        }
        if start < 0 || end < start || end >= self.total_samples as i64 {
            return Err(XdfError::ChunkOutOfRange {
                start,
                end,
                total: self.total_samples,
            });
        }

        let codec = self.codec.as_mut().ok_or(XdfError::SessionClosed)?;
        let count = (end - start + 1) as usize;
        let block = codec.read_block(start as u64, count)?;
        debug!(
            path = %self.path.display(),
            start,
            end,
            channels = indices.len(),
            "read block"
        );
        Ok(block.select(Axis(1), &indices))
    }

    /// Appends a block of samples shaped (rows, channels).
    ///
    /// The first write freezes the session metadata and fixes the
    /// on-disk record structure; every write must match the declared
    /// channel count. Any memory layout is accepted, so a transposed
    /// view writes the same bytes as its contiguous equivalent.
    pub fn write(&mut self, data: ArrayView2<'_, f64>) -> Result<()> {
        if !self.mode.is_write() {
            return Err(XdfError::ModeMismatch("writing"));
        }
        if self.codec.is_none() {
            return Err(XdfError::SessionClosed);
        }

        if !self.channels.is_empty() && data.ncols() != self.channels.len() {
            return Err(XdfError::ChannelCountMismatch {
                expected: self.channels.len(),
                actual: data.ncols(),
            });
        }

        if !self.committed {
            let cfg = RecordingConfig {
                channels: self.channels.clone(),
                sample_rate: self.sample_rate,
                record_time: self.record_time,
                subject_desc: self.subject_desc.clone(),
                session_desc: self.session_desc.clone(),
            };
            let codec = self.codec.as_mut().ok_or(XdfError::SessionClosed)?;
            codec.configure(&cfg)?;
            self.committed = true;
        }

        let normalized = data.as_standard_layout();
        let codec = self.codec.as_mut().ok_or(XdfError::SessionClosed)?;
        codec.append_block(normalized.view())?;
        self.total_samples += data.nrows() as u64;
        debug!(
            path = %self.path.display(),
            rows = data.nrows(),
            total_samples = self.total_samples,
            "appended block"
        );
        Ok(())
    }

    /// Releases the file, completing the header for write sessions.
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut codec) = self.codec.take() {
            codec.finish()?;
            debug!(path = %self.path.display(), "closed session");
        }
        Ok(())
    }

    fn writable(&self, field: &'static str) -> Result<()> {
        if !self.mode.is_write() {
            return Err(XdfError::ModeMismatch("writing"));
        }
        if self.committed {
            return Err(XdfError::Frozen(field));
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut codec) = self.codec.take() {
            if let Err(e) = codec.finish() {
                warn!(path = %self.path.display(), error = %e, "error closing session");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("filetype", &self.filetype)
            .field("channels", &self.channels.len())
            .field("total_samples", &self.total_samples)
            .field("closed", &self.codec.is_none())
            .finish()
    }
}
