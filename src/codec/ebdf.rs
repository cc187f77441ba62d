//! EDF, EDF+ and BDF format engine.
//!
//! The three variants share one layout: a 256-byte ASCII header, 256
//! ASCII bytes per signal (field-major), then fixed-size data records of
//! little-endian integer samples, channel-major within each record. EDF
//! and EDF+ store 16-bit samples, BDF stores 24-bit samples. The record
//! count lives at byte 236 and is patched when the file is completed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

use super::{Codec, LinearScale, RecordingConfig, RecordingInfo};
use crate::error::{Result, XdfError};
use crate::types::{Channel, FileType};
use crate::utils::{ascii_field, atof_nonlocalized, atoi_nonlocalized, fmt_float8, parse_edf_time};
use crate::TIME_DIMENSION;

const NUMREC_FIELD_LOC: u64 = 236;

const EDF_DIGITAL_MIN: i32 = -32768;
const EDF_DIGITAL_MAX: i32 = 32767;
const BDF_DIGITAL_MIN: i32 = -8388608;
const BDF_DIGITAL_MAX: i32 = 8388607;

fn sample_width(filetype: FileType) -> usize {
    match filetype {
        FileType::Bdf => 3,
        _ => 2,
    }
}

fn digital_range(filetype: FileType) -> (i32, i32) {
    match filetype {
        FileType::Bdf => (BDF_DIGITAL_MIN, BDF_DIGITAL_MAX),
        _ => (EDF_DIGITAL_MIN, EDF_DIGITAL_MAX),
    }
}

/// Writes EDF/EDF+/BDF files.
///
/// The header is written at `configure` time with a record count of -1;
/// sample rows are buffered until a full record is available and the last
/// partial record is zero-padded at `finish`, which also patches the real
/// record count. Samples are never dropped.
pub(crate) struct EbdfWriter {
    file: Option<BufWriter<File>>,
    variant: FileType,
    scales: Vec<LinearScale>,
    nch: usize,
    samples_per_record: usize,
    records_written: i64,
    /// Row-major partial record, always shorter than one full record.
    pending: Vec<f64>,
    configured: bool,
}

impl EbdfWriter {
    pub fn new(file: File, variant: FileType) -> Self {
        EbdfWriter {
            file: Some(BufWriter::new(file)),
            variant,
            scales: Vec::new(),
            nch: 0,
            samples_per_record: 0,
            records_written: 0,
            pending: Vec::new(),
            configured: false,
        }
    }

    fn write_header(&mut self, cfg: &RecordingConfig) -> Result<()> {
        let nch = cfg.channels.len();
        let header_size = (nch + 1) * 256;

        let mut main_header = vec![b' '; 256];

        match self.variant {
            FileType::Bdf => {
                main_header[0] = 0xFF;
                main_header[1..8].copy_from_slice(b"BIOSEMI");
            }
            _ => main_header[0..8].copy_from_slice(b"0       "),
        }

        crate::utils::put_ascii(&mut main_header[8..88], &cfg.subject_desc);
        crate::utils::put_ascii(&mut main_header[88..168], &cfg.session_desc);

        let date = cfg.record_time.date();
        let time = cfg.record_time.time();
        let date_str = format!(
            "{:02}.{:02}.{:02}",
            date.day(),
            date.month(),
            date.year().rem_euclid(100)
        );
        main_header[168..176].copy_from_slice(date_str.as_bytes());
        let time_str = format!(
            "{:02}.{:02}.{:02}",
            time.hour(),
            time.minute(),
            time.second()
        );
        main_header[176..184].copy_from_slice(time_str.as_bytes());

        crate::utils::put_ascii(&mut main_header[184..192], &header_size.to_string());

        match self.variant {
            FileType::EdfPlus => main_header[192..197].copy_from_slice(b"EDF+C"),
            FileType::Bdf => main_header[192..197].copy_from_slice(b"24BIT"),
            _ => {}
        }

        // Record count is unknown until the file is completed.
        crate::utils::put_ascii(&mut main_header[236..244], "-1");
        crate::utils::put_ascii(&mut main_header[244..252], "1");
        crate::utils::put_ascii(&mut main_header[252..256], &nch.to_string());

        let writer = self.file.as_mut().ok_or(XdfError::SessionClosed)?;
        writer.write_all(&main_header)?;

        // Signal headers are field-major: each field for all signals in a
        // row, in storage order.
        let mut field = [0u8; 80];
        for ch in &cfg.channels {
            crate::utils::put_ascii(&mut field[..16], &ch.name);
            writer.write_all(&field[..16])?;
        }
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..80], "");
            writer.write_all(&field[..80])?;
        }
        for ch in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &ch.unit);
            writer.write_all(&field[..8])?;
        }
        for ch in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &fmt_float8(ch.physical_min));
            writer.write_all(&field[..8])?;
        }
        for ch in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &fmt_float8(ch.physical_max));
            writer.write_all(&field[..8])?;
        }
        let (dmin, dmax) = digital_range(self.variant);
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &dmin.to_string());
            writer.write_all(&field[..8])?;
        }
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &dmax.to_string());
            writer.write_all(&field[..8])?;
        }
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..80], "");
            writer.write_all(&field[..80])?;
        }
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..8], &self.samples_per_record.to_string());
            writer.write_all(&field[..8])?;
        }
        for _ in &cfg.channels {
            crate::utils::put_ascii(&mut field[..32], "");
            writer.write_all(&field[..32])?;
        }

        Ok(())
    }

    /// Converts the buffered row-major record to the on-disk channel-major
    /// layout and writes it out.
    fn flush_record(&mut self) -> Result<()> {
        let width = sample_width(self.variant);
        let writer = self.file.as_mut().ok_or(XdfError::SessionClosed)?;

        for (c, scale) in self.scales.iter().enumerate() {
            for s in 0..self.samples_per_record {
                let digital = scale.to_digital(self.pending[s * self.nch + c]) as i32;
                let bytes = digital.to_le_bytes();
                writer.write_all(&bytes[..width])?;
            }
        }

        self.pending.clear();
        self.records_written += 1;
        Ok(())
    }
}

impl Codec for EbdfWriter {
    fn configure(&mut self, cfg: &RecordingConfig) -> Result<()> {
        if cfg.channels.is_empty() {
            return Err(XdfError::InvalidFormat(
                "at least one channel must be declared before writing".to_string(),
            ));
        }
        if !(cfg.sample_rate > 0.0) {
            return Err(XdfError::InvalidFormat(
                "sampling rate must be set before writing".to_string(),
            ));
        }

        self.nch = cfg.channels.len();
        self.samples_per_record = (cfg.sample_rate.round() as usize).max(1);

        let (dmin, dmax) = digital_range(self.variant);
        self.scales = cfg
            .channels
            .iter()
            .map(|ch| LinearScale::new(ch.physical_min, ch.physical_max, dmin as f64, dmax as f64))
            .collect::<Result<Vec<_>>>()?;

        self.write_header(cfg)?;
        self.pending.reserve(self.samples_per_record * self.nch);
        self.configured = true;
        debug!(
            filetype = %self.variant,
            channels = self.nch,
            samples_per_record = self.samples_per_record,
            "wrote header"
        );
        Ok(())
    }

    fn append_block(&mut self, block: ArrayView2<'_, f64>) -> Result<()> {
        if !self.configured {
            return Err(XdfError::InvalidFormat(
                "codec used before configuration".to_string(),
            ));
        }

        for row in block.rows() {
            self.pending.extend(row.iter().copied());
            if self.pending.len() == self.samples_per_record * self.nch {
                self.flush_record()?;
            }
        }
        Ok(())
    }

    fn read_block(&mut self, _start: u64, _count: usize) -> Result<Array2<f64>> {
        Err(XdfError::ModeMismatch("reading"))
    }

    fn finish(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }

        if self.configured {
            if !self.pending.is_empty() {
                // zero-pad the trailing partial record
                self.pending.resize(self.samples_per_record * self.nch, 0.0);
                self.flush_record()?;
            }

            let writer = self.file.take().ok_or(XdfError::SessionClosed)?;
            let mut file = writer
                .into_inner()
                .map_err(|e| XdfError::Io(e.into_error()))?;
            file.seek(SeekFrom::Start(NUMREC_FIELD_LOC))?;
            file.write_all(format!("{:<8}", self.records_written).as_bytes())?;
            file.flush()?;
            debug!(records = self.records_written, "completed file");
        } else if let Some(mut writer) = self.file.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Reads EDF/EDF+/BDF files.
pub(crate) struct EbdfReader {
    file: BufReader<File>,
    variant: FileType,
    scales: Vec<LinearScale>,
    /// Byte offset of each visible channel's first sample within a record.
    channel_offsets: Vec<usize>,
    samples_per_record: usize,
    records_in_file: i64,
    record_size: usize,
    header_size: usize,
}

impl EbdfReader {
    /// Parses the header and reports the recording metadata. `detected`
    /// is the magic-key family (`Edf` or `Bdf`); the EDF+ variant is
    /// resolved from the reserved field here.
    pub fn open(file: File, detected: FileType) -> Result<(Self, RecordingInfo)> {
        let mut reader = BufReader::new(file);

        let mut main_header = vec![0u8; 256];
        reader.read_exact(&mut main_header)?;

        let variant = if detected == FileType::Edf {
            let reserved = ascii_field(&main_header[192..236]);
            if reserved.starts_with("EDF+D") {
                return Err(XdfError::InvalidFormat(
                    "discontinuous EDF+ files are not supported".to_string(),
                ));
            }
            if reserved.starts_with("EDF+C") {
                FileType::EdfPlus
            } else {
                FileType::Edf
            }
        } else {
            FileType::Bdf
        };

        let total_signals = atoi_nonlocalized(&ascii_field(&main_header[252..256]));
        if total_signals < 1 || total_signals > crate::MAX_CHANNELS as i32 {
            return Err(XdfError::InvalidFormat(format!(
                "invalid number of signals: {}",
                total_signals
            )));
        }

        let expected_header_size = (total_signals + 1) * 256;
        let header_size = atoi_nonlocalized(&ascii_field(&main_header[184..192]));
        if header_size != expected_header_size {
            return Err(XdfError::InvalidFormat(format!(
                "invalid header size: {}",
                header_size
            )));
        }

        let subject_desc = ascii_field(&main_header[8..88]);
        let session_desc = ascii_field(&main_header[88..168]);

        let record_time = parse_datetime(
            &ascii_field(&main_header[168..176]),
            &ascii_field(&main_header[176..184]),
        )?;

        let records_in_file = atoi_nonlocalized(&ascii_field(&main_header[236..244])) as i64;
        let record_duration = parse_edf_time(&ascii_field(&main_header[244..252]))?;
        if record_duration <= 0 {
            return Err(XdfError::InvalidFormat(
                "invalid record duration".to_string(),
            ));
        }

        let mut signal_header = vec![0u8; total_signals as usize * 256];
        reader.read_exact(&mut signal_header)?;

        let (channels, scales, channel_offsets, samples_per_record, record_size) =
            parse_signals(&signal_header, total_signals as usize, variant)?;

        let sample_rate =
            samples_per_record as f64 * TIME_DIMENSION as f64 / record_duration as f64;
        let total_samples = samples_per_record as u64 * records_in_file.max(0) as u64;

        let info = RecordingInfo {
            file_type: variant,
            channels,
            sample_rate,
            record_time,
            subject_desc,
            session_desc,
            total_samples,
        };

        Ok((
            EbdfReader {
                file: reader,
                variant,
                scales,
                channel_offsets,
                samples_per_record,
                records_in_file,
                record_size,
                header_size: header_size as usize,
            },
            info,
        ))
    }
}

impl Codec for EbdfReader {
    fn configure(&mut self, _cfg: &RecordingConfig) -> Result<()> {
        Err(XdfError::ModeMismatch("writing"))
    }

    fn append_block(&mut self, _block: ArrayView2<'_, f64>) -> Result<()> {
        Err(XdfError::ModeMismatch("writing"))
    }

    fn read_block(&mut self, start: u64, count: usize) -> Result<Array2<f64>> {
        let nch = self.scales.len();
        let mut out = Array2::zeros((count, nch));
        if count == 0 {
            return Ok(out);
        }

        let spr = self.samples_per_record as u64;
        let end = start + count as u64 - 1;
        if end >= spr * self.records_in_file.max(0) as u64 {
            return Err(XdfError::ChunkOutOfRange {
                start: start as i64,
                end: end as i64,
                total: spr * self.records_in_file.max(0) as u64,
            });
        }

        let width = sample_width(self.variant);
        let mut record = vec![0u8; self.record_size];

        for rec in (start / spr)..=(end / spr) {
            self.file.seek(SeekFrom::Start(
                self.header_size as u64 + rec * self.record_size as u64,
            ))?;
            self.file.read_exact(&mut record)?;

            let row_lo = start.max(rec * spr);
            let row_hi = end.min(rec * spr + spr - 1);
            for (c, scale) in self.scales.iter().enumerate() {
                let base = self.channel_offsets[c];
                for row in row_lo..=row_hi {
                    let s = (row - rec * spr) as usize;
                    let digital = decode_sample(&record[base + s * width..], width);
                    out[[(row - start) as usize, c]] = scale.to_physical(digital as f64);
                }
            }
        }

        Ok(out)
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

fn decode_sample(bytes: &[u8], width: usize) -> i32 {
    match width {
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        _ => {
            // 24-bit little-endian two's complement
            let ext = if bytes[2] & 0x80 != 0 { 0xFF } else { 0x00 };
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], ext])
        }
    }
}

/// Parses the field-major signal headers, skipping annotation signals
/// while keeping their space in the record layout.
#[allow(clippy::type_complexity)]
fn parse_signals(
    signal_header: &[u8],
    total_signals: usize,
    variant: FileType,
) -> Result<(Vec<Channel>, Vec<LinearScale>, Vec<usize>, usize, usize)> {
    let mut channels = Vec::new();
    let mut scales = Vec::new();
    let mut channel_offsets = Vec::new();
    let mut samples_per_record = 0usize;
    let mut buffer_offset = 0usize;
    let width = sample_width(variant);

    for i in 0..total_signals {
        let label = ascii_field(&signal_header[i * 16..i * 16 + 16]);
        let is_annotation = label == "EDF Annotations" || label == "BDF Annotations";

        let unit_start = total_signals * 96 + i * 8;
        let unit = ascii_field(&signal_header[unit_start..unit_start + 8]);

        let pmin_start = total_signals * 104 + i * 8;
        let physical_min = atof_nonlocalized(&ascii_field(&signal_header[pmin_start..pmin_start + 8]));
        let pmax_start = total_signals * 112 + i * 8;
        let physical_max = atof_nonlocalized(&ascii_field(&signal_header[pmax_start..pmax_start + 8]));

        let dmin_start = total_signals * 120 + i * 8;
        let digital_min = atoi_nonlocalized(&ascii_field(&signal_header[dmin_start..dmin_start + 8]));
        let dmax_start = total_signals * 128 + i * 8;
        let digital_max = atoi_nonlocalized(&ascii_field(&signal_header[dmax_start..dmax_start + 8]));

        let spr_start = total_signals * 216 + i * 8;
        let spr = atoi_nonlocalized(&ascii_field(&signal_header[spr_start..spr_start + 8]));
        if spr < 1 {
            return Err(XdfError::InvalidFormat(format!(
                "invalid samples per record for signal {}",
                i
            )));
        }

        if !is_annotation {
            if samples_per_record == 0 {
                samples_per_record = spr as usize;
            } else if samples_per_record != spr as usize {
                return Err(XdfError::InvalidFormat(
                    "signals have mismatched sampling rates".to_string(),
                ));
            }

            channels.push(Channel::new(&label, physical_min, physical_max, &unit));
            scales.push(LinearScale::new(
                physical_min,
                physical_max,
                digital_min as f64,
                digital_max as f64,
            )?);
            channel_offsets.push(buffer_offset);
        }

        buffer_offset += spr as usize * width;
    }

    if channels.is_empty() {
        return Err(XdfError::InvalidFormat(
            "file contains no data signals".to_string(),
        ));
    }

    Ok((channels, scales, channel_offsets, samples_per_record, buffer_offset))
}

fn parse_datetime(date_str: &str, time_str: &str) -> Result<NaiveDateTime> {
    let bad = || XdfError::InvalidFormat("invalid start date or time".to_string());

    let date_parts: Vec<&str> = date_str.split('.').collect();
    if date_parts.len() != 3 {
        return Err(bad());
    }
    let day = atoi_nonlocalized(date_parts[0]);
    let month = atoi_nonlocalized(date_parts[1]);
    let year = {
        // EDF's two-digit year pivots at 1985
        let yy = atoi_nonlocalized(date_parts[2]);
        if yy > 84 {
            1900 + yy
        } else {
            2000 + yy
        }
    };
    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or_else(bad)?;

    let time_parts: Vec<&str> = time_str.split('.').collect();
    if time_parts.len() != 3 {
        return Err(bad());
    }
    let time = NaiveTime::from_hms_opt(
        atoi_nonlocalized(time_parts[0]) as u32,
        atoi_nonlocalized(time_parts[1]) as u32,
        atoi_nonlocalized(time_parts[2]) as u32,
    )
    .ok_or_else(bad)?;

    Ok(NaiveDateTime::new(date, time))
}
