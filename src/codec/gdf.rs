//! GDF version 1 and 2 format engine.
//!
//! GDF headers are binary little-endian: a 256-byte file header followed
//! by 256 bytes per channel laid out field-major, then fixed-size data
//! records. Unlike EDF, each channel declares its own sample type; the
//! encoder always stores 64-bit floats with a digital range equal to the
//! physical range, so values survive a round trip unchanged. GDF1 files
//! can be decoded but not encoded.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use chrono::{DateTime, NaiveDateTime};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

use super::{Codec, LinearScale, RecordingConfig, RecordingInfo};
use crate::error::{Result, XdfError};
use crate::types::{Channel, FileType};
use crate::utils::{ascii_field, put_ascii};

const NUMREC_FIELD_LOC: u64 = 236;

// Sample type codes shared by GDF1 and GDF2.
const TYPE_INT8: u32 = 1;
const TYPE_UINT8: u32 = 2;
const TYPE_INT16: u32 = 3;
const TYPE_UINT16: u32 = 4;
const TYPE_INT32: u32 = 5;
const TYPE_UINT32: u32 = 6;
const TYPE_INT64: u32 = 7;
const TYPE_UINT64: u32 = 8;
const TYPE_FLOAT32: u32 = 16;
const TYPE_FLOAT64: u32 = 17;

fn type_width(code: u32) -> Option<usize> {
    match code {
        TYPE_INT8 | TYPE_UINT8 => Some(1),
        TYPE_INT16 | TYPE_UINT16 => Some(2),
        TYPE_INT32 | TYPE_UINT32 | TYPE_FLOAT32 => Some(4),
        TYPE_INT64 | TYPE_UINT64 | TYPE_FLOAT64 => Some(8),
        _ => None,
    }
}

/// GDF2 timestamps count days since year 0, scaled by 2^32.
const GDF2_EPOCH_DAYS: f64 = 719_529.0;
const GDF2_TIME_SCALE: f64 = 4_294_967_296.0;

fn time_to_gdf2(t: NaiveDateTime) -> u64 {
    let posix = t.and_utc().timestamp() as f64;
    ((posix / 86_400.0 + GDF2_EPOCH_DAYS) * GDF2_TIME_SCALE) as u64
}

fn gdf2_to_time(raw: u64) -> NaiveDateTime {
    let posix = (raw as f64 / GDF2_TIME_SCALE - GDF2_EPOCH_DAYS) * 86_400.0;
    DateTime::from_timestamp(posix.round() as i64, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Writes GDF2 files.
pub(crate) struct GdfWriter {
    file: Option<BufWriter<File>>,
    /// Per-channel clamping bounds; samples are stored as raw f64.
    bounds: Vec<(f64, f64)>,
    nch: usize,
    samples_per_record: usize,
    records_written: i64,
    pending: Vec<f64>,
    configured: bool,
}

impl GdfWriter {
    pub fn new(file: File) -> Self {
        GdfWriter {
            file: Some(BufWriter::new(file)),
            bounds: Vec::new(),
            nch: 0,
            samples_per_record: 0,
            records_written: 0,
            pending: Vec::new(),
            configured: false,
        }
    }

    fn write_header(&mut self, cfg: &RecordingConfig) -> Result<()> {
        let nch = cfg.channels.len();
        let writer = self.file.as_mut().ok_or(XdfError::SessionClosed)?;

        let mut header = vec![0u8; 256];
        header[0..8].copy_from_slice(b"GDF 2.00");
        put_ascii(&mut header[8..74], &cfg.subject_desc);
        // bytes 74..88: reserved and subject attributes, left zeroed
        put_ascii(&mut header[88..152], &cfg.session_desc);
        // bytes 152..168: location, unused
        header[168..176].copy_from_slice(&time_to_gdf2(cfg.record_time).to_le_bytes());
        // bytes 176..184: birthday, unused
        header[184..186].copy_from_slice(&(nch as u16 + 1).to_le_bytes());
        // bytes 186..236: patient classification, equipment id, head
        // geometry, all unused
        header[236..244].copy_from_slice(&(-1i64).to_le_bytes());
        let (num, den) = record_duration_ratio(1.0);
        header[244..248].copy_from_slice(&num.to_le_bytes());
        header[248..252].copy_from_slice(&den.to_le_bytes());
        header[252..254].copy_from_slice(&(nch as u16).to_le_bytes());
        writer.write_all(&header)?;

        // Channel fields, field-major like the EDF family.
        let mut field = [0u8; 80];
        for ch in &cfg.channels {
            put_ascii(&mut field[..16], &ch.name);
            writer.write_all(&field[..16])?;
        }
        for _ in &cfg.channels {
            put_ascii(&mut field[..80], "");
            writer.write_all(&field[..80])?;
        }
        for ch in &cfg.channels {
            put_ascii(&mut field[..6], &ch.unit);
            writer.write_all(&field[..6])?;
        }
        for _ in &cfg.channels {
            writer.write_all(&0u16.to_le_bytes())?; // dimension code
        }
        for ch in &cfg.channels {
            writer.write_all(&ch.physical_min.to_le_bytes())?;
        }
        for ch in &cfg.channels {
            writer.write_all(&ch.physical_max.to_le_bytes())?;
        }
        // Digital range mirrors the physical one so conversion is the
        // identity.
        for ch in &cfg.channels {
            writer.write_all(&ch.physical_min.to_le_bytes())?;
        }
        for ch in &cfg.channels {
            writer.write_all(&ch.physical_max.to_le_bytes())?;
        }
        for _ in &cfg.channels {
            put_ascii(&mut field[..68], "");
            writer.write_all(&field[..68])?;
        }
        for _ in 0..3 {
            // lowpass, highpass and notch cutoffs
            for _ in &cfg.channels {
                writer.write_all(&f32::NAN.to_le_bytes())?;
            }
        }
        for _ in &cfg.channels {
            writer.write_all(&(self.samples_per_record as i32).to_le_bytes())?;
        }
        for _ in &cfg.channels {
            writer.write_all(&TYPE_FLOAT64.to_le_bytes())?;
        }
        for _ in &cfg.channels {
            writer.write_all(&[0u8; 12])?; // electrode position
        }
        for _ in &cfg.channels {
            writer.write_all(&[255u8])?; // impedance, unknown
        }
        for _ in &cfg.channels {
            writer.write_all(&[0u8; 19])?;
        }

        Ok(())
    }

    fn flush_record(&mut self) -> Result<()> {
        let writer = self.file.as_mut().ok_or(XdfError::SessionClosed)?;

        for (c, &(lo, hi)) in self.bounds.iter().enumerate() {
            for s in 0..self.samples_per_record {
                let v = self.pending[s * self.nch + c].max(lo).min(hi);
                writer.write_all(&v.to_le_bytes())?;
            }
        }

        self.pending.clear();
        self.records_written += 1;
        Ok(())
    }
}

impl Codec for GdfWriter {
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

        for ch in &cfg.channels {
            if ch.physical_min == ch.physical_max {
                return Err(XdfError::PhysicalMinEqualsMax);
            }
            if ch.physical_min > ch.physical_max {
                return Err(XdfError::InvalidFormat(format!(
                    "channel {}: physical minimum exceeds maximum",
                    ch.name
                )));
            }
        }

        self.nch = cfg.channels.len();
        self.samples_per_record = (cfg.sample_rate.round() as usize).max(1);
        self.bounds = cfg
            .channels
            .iter()
            .map(|ch| (ch.physical_min, ch.physical_max))
            .collect();

        self.write_header(cfg)?;
        self.pending.reserve(self.samples_per_record * self.nch);
        self.configured = true;
        debug!(
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
                self.pending.resize(self.samples_per_record * self.nch, 0.0);
                self.flush_record()?;
            }

            let writer = self.file.take().ok_or(XdfError::SessionClosed)?;
            let mut file = writer
                .into_inner()
                .map_err(|e| XdfError::Io(e.into_error()))?;
            file.seek(SeekFrom::Start(NUMREC_FIELD_LOC))?;
            file.write_all(&self.records_written.to_le_bytes())?;
            file.flush()?;
            debug!(records = self.records_written, "completed file");
        } else if let Some(mut writer) = self.file.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn record_duration_ratio(seconds: f64) -> (u32, u32) {
    if seconds >= 1.0 {
        (seconds as u32, 1)
    } else {
        (1, (1.0 / seconds) as u32)
    }
}

struct GdfChannelLayout {
    scale: LinearScale,
    sample_type: u32,
    /// Byte offset of the channel's first sample within a record.
    offset: usize,
}

/// Reads GDF1 and GDF2 files.
pub(crate) struct GdfReader {
    file: BufReader<File>,
    layouts: Vec<GdfChannelLayout>,
    samples_per_record: usize,
    records_in_file: i64,
    record_size: usize,
    header_size: usize,
}

impl GdfReader {
    pub fn open(file: File, detected: FileType) -> Result<(Self, RecordingInfo)> {
        let mut reader = BufReader::new(file);

        let mut header = vec![0u8; 256];
        reader.read_exact(&mut header)?;

        let parsed = match detected {
            FileType::Gdf1 => parse_gdf1_header(&header)?,
            _ => parse_gdf2_header(&header)?,
        };

        if parsed.nch < 1 || parsed.nch > crate::MAX_CHANNELS {
            return Err(XdfError::InvalidFormat(format!(
                "invalid number of channels: {}",
                parsed.nch
            )));
        }
        if !(parsed.record_duration > 0.0) {
            return Err(XdfError::InvalidFormat(
                "invalid record duration".to_string(),
            ));
        }

        let mut channel_header = vec![0u8; parsed.nch * 256];
        reader.read_exact(&mut channel_header)?;

        let (channels, layouts, samples_per_record, record_size) =
            parse_gdf_channels(&channel_header, parsed.nch, detected)?;

        let sample_rate = samples_per_record as f64 / parsed.record_duration;
        let total_samples = samples_per_record as u64 * parsed.records_in_file.max(0) as u64;

        let info = RecordingInfo {
            file_type: detected,
            channels,
            sample_rate,
            record_time: parsed.record_time,
            subject_desc: parsed.subject_desc,
            session_desc: parsed.session_desc,
            total_samples,
        };

        Ok((
            GdfReader {
                file: reader,
                layouts,
                samples_per_record,
                records_in_file: parsed.records_in_file,
                record_size,
                header_size: (parsed.nch + 1) * 256,
            },
            info,
        ))
    }
}

impl Codec for GdfReader {
    fn configure(&mut self, _cfg: &RecordingConfig) -> Result<()> {
        Err(XdfError::ModeMismatch("writing"))
    }

    fn append_block(&mut self, _block: ArrayView2<'_, f64>) -> Result<()> {
        Err(XdfError::ModeMismatch("writing"))
    }

    fn read_block(&mut self, start: u64, count: usize) -> Result<Array2<f64>> {
        let nch = self.layouts.len();
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

        let mut record = vec![0u8; self.record_size];

        for rec in (start / spr)..=(end / spr) {
            self.file.seek(SeekFrom::Start(
                self.header_size as u64 + rec * self.record_size as u64,
            ))?;
            self.file.read_exact(&mut record)?;

            let row_lo = start.max(rec * spr);
            let row_hi = end.min(rec * spr + spr - 1);
            for (c, layout) in self.layouts.iter().enumerate() {
                let width = type_width(layout.sample_type).unwrap_or(8);
                for row in row_lo..=row_hi {
                    let s = (row - rec * spr) as usize;
                    let raw =
                        decode_sample(&record[layout.offset + s * width..], layout.sample_type);
                    out[[(row - start) as usize, c]] = layout.scale.to_physical(raw);
                }
            }
        }

        Ok(out)
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

fn decode_sample(bytes: &[u8], sample_type: u32) -> f64 {
    match sample_type {
        TYPE_INT8 => bytes[0] as i8 as f64,
        TYPE_UINT8 => bytes[0] as f64,
        TYPE_INT16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        TYPE_UINT16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        TYPE_INT32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        TYPE_UINT32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        TYPE_INT64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            i64::from_le_bytes(buf) as f64
        }
        TYPE_UINT64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(buf) as f64
        }
        TYPE_FLOAT32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(buf)
        }
    }
}

struct GdfHeader {
    subject_desc: String,
    session_desc: String,
    record_time: NaiveDateTime,
    records_in_file: i64,
    record_duration: f64,
    nch: usize,
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(buf)
}

fn le_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buf)
}

fn parse_gdf1_header(header: &[u8]) -> Result<GdfHeader> {
    let subject_desc = ascii_field(&header[8..88]);
    let session_desc = ascii_field(&header[88..168]);

    // 16-character timestamp, centisecond digits dropped
    let timestring = ascii_field(&header[168..184]);
    let record_time = NaiveDateTime::parse_from_str(
        timestring.get(..14).unwrap_or(""),
        "%Y%m%d%H%M%S",
    )
    .unwrap_or_default();

    let records_in_file = le_i64(&header[236..244]);
    let dur_num = le_u32(&header[244..248]);
    let dur_den = le_u32(&header[248..252]);
    if dur_den == 0 {
        return Err(XdfError::InvalidFormat(
            "invalid record duration".to_string(),
        ));
    }
    let nch = le_u32(&header[252..256]) as usize;

    Ok(GdfHeader {
        subject_desc,
        session_desc,
        record_time,
        records_in_file,
        record_duration: dur_num as f64 / dur_den as f64,
        nch,
    })
}

fn parse_gdf2_header(header: &[u8]) -> Result<GdfHeader> {
    let subject_desc = ascii_field(&header[8..74]);
    let session_desc = ascii_field(&header[88..152]);

    let mut raw_time = [0u8; 8];
    raw_time.copy_from_slice(&header[168..176]);
    let record_time = gdf2_to_time(u64::from_le_bytes(raw_time));

    let records_in_file = le_i64(&header[236..244]);
    let dur_num = le_u32(&header[244..248]);
    let dur_den = le_u32(&header[248..252]);
    if dur_den == 0 {
        return Err(XdfError::InvalidFormat(
            "invalid record duration".to_string(),
        ));
    }
    let nch = u16::from_le_bytes([header[252], header[253]]) as usize;

    Ok(GdfHeader {
        subject_desc,
        session_desc,
        record_time,
        records_in_file,
        record_duration: dur_num as f64 / dur_den as f64,
        nch,
    })
}

/// Parses the field-major channel blocks. GDF1 stores digital bounds as
/// 64-bit integers and 8-byte units, GDF2 as 64-bit floats and 6-byte
/// units with a dimension code.
#[allow(clippy::type_complexity)]
fn parse_gdf_channels(
    block: &[u8],
    nch: usize,
    variant: FileType,
) -> Result<(Vec<Channel>, Vec<GdfChannelLayout>, usize, usize)> {
    let mut channels = Vec::with_capacity(nch);
    let mut layouts = Vec::with_capacity(nch);
    let mut samples_per_record = 0usize;
    let mut offset = 0usize;

    // The two layouts agree on where the numeric bounds, the rate and
    // the type codes live; only the unit width and the digital bound
    // encoding differ.
    let unit_len = if variant == FileType::Gdf1 { 8 } else { 6 };
    let unit_base = nch * 96;
    let pmin_base = nch * 104;
    let spr_base = nch * 216;
    let type_base = nch * 220;

    for i in 0..nch {
        let name = ascii_field(&block[i * 16..i * 16 + 16]);
        let unit = ascii_field(&block[unit_base + i * unit_len..unit_base + (i + 1) * unit_len]);

        let physical_min = le_f64(&block[pmin_base + i * 8..]);
        let physical_max = le_f64(&block[pmin_base + nch * 8 + i * 8..]);
        let (digital_min, digital_max) = match variant {
            FileType::Gdf1 => (
                le_i64(&block[pmin_base + nch * 16 + i * 8..]) as f64,
                le_i64(&block[pmin_base + nch * 24 + i * 8..]) as f64,
            ),
            _ => (
                le_f64(&block[pmin_base + nch * 16 + i * 8..]),
                le_f64(&block[pmin_base + nch * 24 + i * 8..]),
            ),
        };

        let spr = le_u32(&block[spr_base + i * 4..]) as usize;
        if spr < 1 {
            return Err(XdfError::InvalidFormat(format!(
                "invalid samples per record for channel {}",
                i
            )));
        }
        if samples_per_record == 0 {
            samples_per_record = spr;
        } else if samples_per_record != spr {
            return Err(XdfError::InvalidFormat(
                "channels have mismatched sampling rates".to_string(),
            ));
        }

        let sample_type = le_u32(&block[type_base + i * 4..]);
        let width = type_width(sample_type).ok_or_else(|| {
            XdfError::InvalidFormat(format!("unsupported sample type code {}", sample_type))
        })?;

        channels.push(Channel::new(&name, physical_min, physical_max, &unit));
        layouts.push(GdfChannelLayout {
            scale: LinearScale::new(physical_min, physical_max, digital_min, digital_max)?,
            sample_type,
            offset,
        });
        offset += spr * width;
    }

    Ok((channels, layouts, samples_per_record, offset))
}
