//! # xdfio
//!
//! A pure Rust library for reading and writing multichannel biosignal
//! recordings in the EDF, EDF+, BDF and GDF file formats.
//!
//! All formats are exposed through one [`Session`] type: open a file,
//! and read or write dense blocks of double-precision samples. The
//! per-format byte layout (headers, record sizing, physical/digital
//! scaling, auto-detection) lives behind the session and never leaks
//! into the caller-facing API.
//!
//! ## Quick Start
//!
//! ### Reading a recording
//!
//! ```no_run
//! use xdfio::{Mode, Session};
//!
//! fn main() -> xdfio::Result<()> {
//!     // Format is auto-detected from the file content
//!     let mut session = Session::open("sleep_study.bdf", Mode::Read, None)?;
//!
//!     println!("format: {}", session.filetype());
//!     println!("channels: {}", session.channels().len());
//!     println!("duration: {:.1} s",
//!         session.total_samples() as f64 / session.sample_rate());
//!
//!     // All channels, samples 0..=999
//!     let block = session.read_chunk(0, 999)?;
//!     println!("read {} samples x {} channels", block.nrows(), block.ncols());
//!
//!     // Selected channels, in the requested order
//!     let pair = session.read_channels(&["EEG C4", "EEG C3"], None)?;
//!     assert_eq!(pair.ncols(), 2);
//!     Ok(())
//! }
//! ```
//!
//! ### Creating a recording
//!
//! ```no_run
//! use ndarray::Array2;
//! use xdfio::{Channel, FileType, Mode, Session};
//!
//! fn main() -> xdfio::Result<()> {
//!     let mut session = Session::open("output.edf", Mode::Write, Some(FileType::Edf))?;
//!
//!     // Metadata is mutable until the first write
//!     session.set_sample_rate(256.0)?;
//!     session.set_subject_desc("subject 042")?;
//!     session.add_channel(Channel::new("EEG Fp1", -200.0, 200.0, "uV"))?;
//!     session.add_channel(Channel::new("EEG Fp2", -200.0, 200.0, "uV"))?;
//!
//!     // One second of data: rows are samples, columns are channels
//!     let block = Array2::<f64>::zeros((256, 2));
//!     session.write(block.view())?;
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Formats
//!
//! | Name | Read | Write | Sample storage |
//! |--------|------|-------|----------------|
//! | `edf` | yes | yes | 16-bit integer |
//! | `edfp` | yes | yes | 16-bit integer |
//! | `bdf` | yes | yes | 24-bit integer |
//! | `gdf1` | yes | no | per-channel typed |
//! | `gdf` | yes | yes | 64-bit float |
//!
//! Integer formats quantize values to the declared physical range;
//! see [`Channel`] for the per-channel bounds. The GDF2 encoder stores
//! raw 64-bit floats, so written values read back exactly.

pub mod error;
pub mod session;
pub mod types;
pub mod utils;

pub(crate) mod codec;

pub use error::{Result, XdfError};
pub use session::Session;
pub use types::{Channel, FieldValue, FileType, Mode};

/// Time unit of record durations: 100 nanoseconds.
pub const TIME_DIMENSION: i64 = 10_000_000;
/// Upper bound on channels per recording.
pub const MAX_CHANNELS: usize = 4096;

/// Returns the library version.
///
/// ```
/// let version = xdfio::version();
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
