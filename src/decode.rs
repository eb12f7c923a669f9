//! Decoding of the vendor numeric encodings found in meter blocks.
//!
//! Every meter occupies four bytes in the meter block. How those bytes are
//! interpreted is selected by the meter's format byte, negotiated once from
//! the identification block (see [`crate::schema`]):
//!
//! | format            | meaning                                          |
//! |-------------------|--------------------------------------------------|
//! | `0xF0`            | plain 32 bit integer                             |
//! | `0xF1..=0xFF`     | signed fixed point, `format & 0x0F` fractional bits |
//! | `0x01..=0x97`     | IEEE-754 binary32, `format` also gives width/precision |
//! | `0xE2`            | duration in seconds                              |
//! | `0xE0`            | packed date                                      |
//! | `0xE1`            | packed time of day                               |
//!
//! All multi-byte quantities are little endian. Decoding never panics; input
//! that cannot be interpreted yields [`DecodedValue::Unknown`].

use core::fmt;

use log::warn;

/// Format byte of a meter that the device does not provide.
pub const FORMAT_ABSENT: u8 = 0x00;
/// Highest format byte denoting an IEEE-754 float.
pub const FORMAT_FLOAT_MAX: u8 = 0x97;
/// Packed date.
pub const FORMAT_DATE: u8 = 0xE0;
/// Packed time of day.
pub const FORMAT_TIME: u8 = 0xE1;
/// Duration in seconds.
pub const FORMAT_SECONDS: u8 = 0xE2;
/// Plain integer. `0xF1..=0xFF` are fixed point.
pub const FORMAT_LONG: u8 = 0xF0;

/// Width of one meter in the meter block.
pub const METER_WIDTH: usize = 4;

/// A decoded meter value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DecodedValue {
    Integer(i64),
    Fixed(f64),
    /// NaN and the infinities decode to the corresponding `f64` specials.
    Float(f64),
    /// Seconds.
    Duration(u32),
    Date(MeterDate),
    Time(MeterTime),
    Unknown,
}

/// The two date layouts a device may report under format `0xE0`.
///
/// The top bit of the fourth byte selects the Julian layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MeterDate {
    Calendar {
        day: u8,
        month: u8,
        year: u8,
        century: u8,
    },
    Julian {
        century: u8,
        year: u8,
        day_of_year: u16,
    },
}

/// Time of day as reported under format `0xE1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeterTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub hundredths: u8,
}

/// Read a little endian 16 bit word, if two bytes are available.
pub fn get_word(raw: &[u8]) -> Option<u16> {
    match raw {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Read a little endian 32 bit word, if four bytes are available.
pub fn get_long(raw: &[u8]) -> Option<u32> {
    match raw {
        [a, b, c, d, ..] => Some(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Decode a little endian IEEE-754 single precision value.
///
/// Sign, exponent and mantissa are extracted explicitly so the result does not
/// depend on the host's float representation.
pub fn get_float(raw: &[u8]) -> Option<f64> {
    let bits = get_long(raw)?;
    let negative = bits & 0x8000_0000 != 0;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    let magnitude = match (exponent, mantissa) {
        (255, 0) => f64::INFINITY,
        (255, _) => return Some(f64::NAN),
        (0, 0) => return Some(0.0),
        (0, m) => ldexp(f64::from(m), -149),
        (e, m) => ldexp(f64::from(m | 0x0080_0000), e - 150),
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn ldexp(mantissa: f64, exponent: i32) -> f64 {
    mantissa * 2f64.powi(exponent)
}

/// Decode one meter from its raw bytes according to `format`.
pub fn decode(raw: &[u8], format: u8) -> DecodedValue {
    let bytes = match raw {
        [a, b, c, d, ..] => [*a, *b, *c, *d],
        _ => {
            warn!(
                "meter with format {:#04x} needs 4 bytes, got {}",
                format,
                raw.len()
            );
            return DecodedValue::Unknown;
        }
    };
    let long = u32::from_le_bytes(bytes);

    match format {
        FORMAT_ABSENT => DecodedValue::Unknown,
        FORMAT_LONG => DecodedValue::Integer(i64::from(long)),
        // fixed point values are two's complement, plain longs are not
        f if f & 0xF0 == 0xF0 => {
            let signed = i32::from_le_bytes(bytes);
            DecodedValue::Fixed(ldexp(f64::from(signed), -i32::from(f & 0x0F)))
        }
        f if f <= FORMAT_FLOAT_MAX => match get_float(&bytes) {
            Some(value) => DecodedValue::Float(value),
            None => DecodedValue::Unknown,
        },
        FORMAT_SECONDS => DecodedValue::Duration(long),
        FORMAT_DATE => {
            let [dd, mm, yy, cc] = bytes;
            if cc & 0x80 != 0 {
                DecodedValue::Date(MeterDate::Julian {
                    century: cc & 0x7F,
                    year: yy,
                    day_of_year: u16::from_le_bytes([dd, mm]),
                })
            } else {
                DecodedValue::Date(MeterDate::Calendar {
                    day: dd,
                    month: mm,
                    year: yy,
                    century: cc,
                })
            }
        }
        FORMAT_TIME => {
            let [cc, ss, mm, hh] = bytes;
            DecodedValue::Time(MeterTime {
                hours: hh,
                minutes: mm,
                seconds: ss,
                hundredths: cc,
            })
        }
        _ => {
            warn!("unknown meter format {:#04x}", format);
            DecodedValue::Unknown
        }
    }
}

/// Render one meter as text, the way a status display shows it.
///
/// Floats use the field width and precision carried in the format byte,
/// fixed point values get two decimals and unknown formats render as `???`.
/// A meter the device does not provide renders as an empty string.
pub fn render(raw: &[u8], format: u8) -> String {
    if format == FORMAT_ABSENT {
        return String::new();
    }
    match decode(raw, format) {
        DecodedValue::Float(value) => {
            let width = usize::from(format >> 4);
            let precision = usize::from(format & 0x0F);
            format!("{:width$.precision$}", value, width = width, precision = precision)
        }
        other => other.to_string(),
    }
}

impl DecodedValue {
    /// Numeric value of the meter, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Integer(v) => Some(v as f64),
            Self::Fixed(v) | Self::Float(v) => Some(v),
            Self::Duration(v) => Some(f64::from(v)),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Fixed(v) => write!(f, "{:.2}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Duration(v) => write!(f, "{}", v),
            Self::Date(d) => fmt::Display::fmt(d, f),
            Self::Time(t) => fmt::Display::fmt(t, f),
            Self::Unknown => f.write_str("???"),
        }
    }
}

impl fmt::Display for MeterDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Calendar {
                day,
                month,
                year,
                century,
            } => write!(f, "{:2}/{:2}/{:2}{:2}", day, month, century, year),
            Self::Julian {
                century,
                year,
                day_of_year,
            } => write!(f, "{:2}{:2}:{:3}", century, year, day_of_year),
        }
    }
}

impl fmt::Display for MeterTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:2}:{:2}:{:2}.{:2}",
            self.hours, self.minutes, self.seconds, self.hundredths
        )
    }
}
