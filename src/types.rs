use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, XdfError};

/// Access mode of a [`Session`](crate::Session).
///
/// `Write` truncates an existing file, `WriteExclusive` refuses to open a
/// path that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    WriteExclusive,
}

impl Mode {
    pub fn is_write(self) -> bool {
        matches!(self, Mode::Write | Mode::WriteExclusive)
    }
}

impl FromStr for Mode {
    type Err = XdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" | "r" => Ok(Mode::Read),
            "write" | "w" => Ok(Mode::Write),
            "wx" | "xw" => Ok(Mode::WriteExclusive),
            _ => Err(XdfError::InvalidMode(s.to_string())),
        }
    }
}

/// On-disk format of a recording.
///
/// `Gdf2` is spelled `"gdf"` in string form, matching the original
/// xdffileio bindings where `gdf` is an alias for the current GDF revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Edf,
    EdfPlus,
    Bdf,
    Gdf1,
    Gdf2,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Edf => "edf",
            FileType::EdfPlus => "edfp",
            FileType::Bdf => "bdf",
            FileType::Gdf1 => "gdf1",
            FileType::Gdf2 => "gdf",
        }
    }

    /// Whether an encoder exists for this format. GDF1 can only be read.
    pub fn supports_write(self) -> bool {
        !matches!(self, FileType::Gdf1)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = XdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "edf" => Ok(FileType::Edf),
            "edfp" => Ok(FileType::EdfPlus),
            "bdf" => Ok(FileType::Bdf),
            "gdf1" => Ok(FileType::Gdf1),
            "gdf2" | "gdf" => Ok(FileType::Gdf2),
            _ => Err(XdfError::UnknownFileType(s.to_string())),
        }
    }
}

/// Value of a single [`Channel`] field, for the mapping-like view.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

/// Description of one channel of a recording.
///
/// A channel descriptor carries exactly four fields: `name`,
/// `physical_min`, `physical_max` and `unit`. The struct fields are public
/// and may be reassigned freely; the [`get`](Channel::get) /
/// [`set`](Channel::set) / [`fields`](Channel::fields) mapping-like view
/// exists for ergonomic comparison against plain key/value literals and
/// rejects any key outside the fixed schema.
///
/// Descriptors are created independently and appended to a write session
/// before the first write; read sessions build them from the file header.
/// Name uniqueness within a session is expected but not enforced.
///
/// # Examples
///
/// ```rust
/// use xdfio::Channel;
///
/// let mut ch = Channel::new("EEG Fp1", -200.0, 200.0, "uV");
/// ch.set("name", "EEG Fp2".into()).unwrap();
/// assert!(ch.set("prefilter", "HP:0.1Hz".into()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub unit: String,
}

impl Channel {
    /// The fixed schema, in declaration order.
    pub const FIELDS: [&'static str; 4] = ["name", "physical_min", "physical_max", "unit"];

    pub fn new(name: &str, physical_min: f64, physical_max: f64, unit: &str) -> Self {
        Channel {
            name: name.to_string(),
            physical_min,
            physical_max,
            unit: unit.to_string(),
        }
    }

    /// Looks up a field by name. Returns `None` for names outside the
    /// schema.
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        match field {
            "name" => Some(FieldValue::Text(self.name.clone())),
            "physical_min" => Some(FieldValue::Number(self.physical_min)),
            "physical_max" => Some(FieldValue::Number(self.physical_max)),
            "unit" => Some(FieldValue::Text(self.unit.clone())),
            _ => None,
        }
    }

    /// Reassigns an existing field.
    ///
    /// Fails with [`XdfError::FixedSchema`] for a field name outside the
    /// schema (the descriptor shape cannot change) and with
    /// [`XdfError::FieldType`] when the value kind does not match the
    /// field.
    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<()> {
        match (field, value) {
            ("name", FieldValue::Text(s)) => self.name = s,
            ("unit", FieldValue::Text(s)) => self.unit = s,
            ("physical_min", FieldValue::Number(v)) => self.physical_min = v,
            ("physical_max", FieldValue::Number(v)) => self.physical_max = v,
            ("name", _) => return Err(XdfError::FieldType { field: "name" }),
            ("unit", _) => return Err(XdfError::FieldType { field: "unit" }),
            ("physical_min", _) => return Err(XdfError::FieldType { field: "physical_min" }),
            ("physical_max", _) => return Err(XdfError::FieldType { field: "physical_max" }),
            (other, _) => return Err(XdfError::FixedSchema(other.to_string())),
        }
        Ok(())
    }

    /// Iterates over `(field, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldValue)> + '_ {
        Self::FIELDS
            .iter()
            .map(move |&f| (f, self.get(f).unwrap_or(FieldValue::Number(f64::NAN))))
    }
}

impl PartialEq<HashMap<&str, FieldValue>> for Channel {
    fn eq(&self, map: &HashMap<&str, FieldValue>) -> bool {
        map.len() == Self::FIELDS.len()
            && self
                .fields()
                .all(|(name, value)| map.get(name) == Some(&value))
    }
}

impl PartialEq<Channel> for HashMap<&str, FieldValue> {
    fn eq(&self, ch: &Channel) -> bool {
        ch == self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!("r".parse::<Mode>().unwrap(), Mode::Read);
        assert_eq!("write".parse::<Mode>().unwrap(), Mode::Write);
        assert_eq!("wx".parse::<Mode>().unwrap(), Mode::WriteExclusive);
        assert_eq!("xw".parse::<Mode>().unwrap(), Mode::WriteExclusive);
        assert!("append".parse::<Mode>().is_err());
    }

    #[test]
    fn parse_filetypes() {
        assert_eq!("edf".parse::<FileType>().unwrap(), FileType::Edf);
        assert_eq!("gdf".parse::<FileType>().unwrap(), FileType::Gdf2);
        assert_eq!("gdf2".parse::<FileType>().unwrap(), FileType::Gdf2);
        assert_eq!(FileType::Gdf2.to_string(), "gdf");
        assert!("vhdr".parse::<FileType>().is_err());
    }

    #[test]
    fn channel_mapping_view() {
        let mut ch = Channel::new("ch", -2.0, 2.0, "uV");
        assert_eq!(ch.get("physical_max"), Some(FieldValue::Number(2.0)));
        assert_eq!(ch.get("gain"), None);

        ch.set("physical_min", (-4.0).into()).unwrap();
        assert_eq!(ch.physical_min, -4.0);

        assert!(matches!(
            ch.set("gain", 1.0.into()),
            Err(XdfError::FixedSchema(_))
        ));
        assert!(matches!(
            ch.set("name", 1.0.into()),
            Err(XdfError::FieldType { field: "name" })
        ));
    }
}
