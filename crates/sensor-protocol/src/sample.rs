//! Sensor Samples and Per-Kind Codecs
//!
//! Samples are stored in ring buffers as fixed-stride little-endian records.
//! Each sample-carrying kind registers one [`SampleCodec`] in a static table;
//! the layout is `timestamp: u64` followed by the kind's `f32` fields.

use crate::error::{NcsError, NcsResult};
use crate::kind::SensorKind;
use serde::{Deserialize, Serialize};

/// Three-axis sample (gyro, accelerometer, magnetometer)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Hub timer ticks
    pub timestamp: u64,
}

/// Gravity vector together with the linear acceleration it was separated from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GravitySample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub linear_x: f32,
    pub linear_y: f32,
    pub linear_z: f32,
    /// Hub timer ticks
    pub timestamp: u64,
}

/// A decoded sample, tagged by kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    Gyro(VectorSample),
    Accelerometer(VectorSample),
    Gravity(GravitySample),
    Magnetometer(VectorSample),
}

impl Sample {
    /// Kind this sample belongs to
    pub fn kind(&self) -> SensorKind {
        match self {
            Sample::Gyro(_) => SensorKind::Gyro,
            Sample::Accelerometer(_) => SensorKind::Accelerometer,
            Sample::Gravity(_) => SensorKind::Gravity,
            Sample::Magnetometer(_) => SensorKind::Magnetometer,
        }
    }

    /// Embedded timestamp
    pub fn timestamp(&self) -> u64 {
        match self {
            Sample::Gyro(s) | Sample::Accelerometer(s) | Sample::Magnetometer(s) => s.timestamp,
            Sample::Gravity(s) => s.timestamp,
        }
    }

    /// Build a sample from the raw value list of a hub event
    pub fn from_values(kind: SensorKind, values: &[f32], timestamp: u64) -> NcsResult<Self> {
        let need = match kind {
            SensorKind::Gravity => 6,
            SensorKind::Gyro | SensorKind::Accelerometer | SensorKind::Magnetometer => 3,
            SensorKind::GyroCal | SensorKind::MagCal => {
                return Err(NcsError::Unsupported(kind.to_string()));
            }
        };
        if values.len() < need {
            return Err(NcsError::InvalidArgument(format!(
                "{} sample needs {} values, got {}",
                kind,
                need,
                values.len()
            )));
        }

        let vector = VectorSample {
            x: values[0],
            y: values[1],
            z: values[2],
            timestamp,
        };
        Ok(match kind {
            SensorKind::Gyro => Sample::Gyro(vector),
            SensorKind::Accelerometer => Sample::Accelerometer(vector),
            SensorKind::Magnetometer => Sample::Magnetometer(vector),
            _ => Sample::Gravity(GravitySample {
                x: values[0],
                y: values[1],
                z: values[2],
                linear_x: values[3],
                linear_y: values[4],
                linear_z: values[5],
                timestamp,
            }),
        })
    }

    /// Subtract a calibration bias from the three primary axes
    pub fn apply_bias(&mut self, bias: [f32; 3]) {
        let (x, y, z) = match self {
            Sample::Gyro(s) | Sample::Accelerometer(s) | Sample::Magnetometer(s) => {
                (&mut s.x, &mut s.y, &mut s.z)
            }
            Sample::Gravity(s) => (&mut s.x, &mut s.y, &mut s.z),
        };
        *x -= bias[0];
        *y -= bias[1];
        *z -= bias[2];
    }
}

/// Encoder/decoder for one sample kind
pub struct SampleCodec {
    /// Kind handled by this codec
    pub kind: SensorKind,
    /// Bytes per stored sample
    pub stride: usize,
    encode: fn(&Sample, &mut [u8]),
    decode: fn(&[u8]) -> Sample,
}

impl SampleCodec {
    /// Encode `sample` into `out`, which must be exactly one stride long
    pub fn encode(&self, sample: &Sample, out: &mut [u8]) -> NcsResult<()> {
        if sample.kind() != self.kind {
            return Err(NcsError::InvalidArgument(format!(
                "{} sample written to {} codec",
                sample.kind(),
                self.kind
            )));
        }
        self.check_len(out.len())?;
        (self.encode)(sample, out);
        Ok(())
    }

    /// Decode one stored record
    pub fn decode(&self, bytes: &[u8]) -> NcsResult<Sample> {
        self.check_len(bytes.len())?;
        Ok((self.decode)(bytes))
    }

    /// Read only the timestamp of a stored record
    pub fn timestamp(&self, bytes: &[u8]) -> NcsResult<u64> {
        self.check_len(bytes.len())?;
        Ok(read_u64(bytes, 0))
    }

    fn check_len(&self, len: usize) -> NcsResult<()> {
        if len != self.stride {
            return Err(NcsError::Codec(format!(
                "{} record is {} bytes, expected {}",
                self.kind, len, self.stride
            )));
        }
        Ok(())
    }
}

const VECTOR_STRIDE: usize = 8 + 3 * 4;
const GRAVITY_STRIDE: usize = 8 + 6 * 4;

static CODECS: [SampleCodec; 4] = [
    SampleCodec {
        kind: SensorKind::Gyro,
        stride: VECTOR_STRIDE,
        encode: encode_vector,
        decode: decode_gyro,
    },
    SampleCodec {
        kind: SensorKind::Accelerometer,
        stride: VECTOR_STRIDE,
        encode: encode_vector,
        decode: decode_accel,
    },
    SampleCodec {
        kind: SensorKind::Gravity,
        stride: GRAVITY_STRIDE,
        encode: encode_gravity,
        decode: decode_gravity,
    },
    SampleCodec {
        kind: SensorKind::Magnetometer,
        stride: VECTOR_STRIDE,
        encode: encode_vector,
        decode: decode_mag,
    },
];

/// Codec for a sample-carrying kind; `None` for calibration-only kinds
pub fn codec(kind: SensorKind) -> Option<&'static SampleCodec> {
    CODECS.iter().find(|codec| codec.kind == kind)
}

fn encode_vector(sample: &Sample, out: &mut [u8]) {
    if let Sample::Gyro(s) | Sample::Accelerometer(s) | Sample::Magnetometer(s) = sample {
        out[0..8].copy_from_slice(&s.timestamp.to_le_bytes());
        write_f32s(&mut out[8..], &[s.x, s.y, s.z]);
    }
}

fn decode_vector(bytes: &[u8]) -> VectorSample {
    VectorSample {
        timestamp: read_u64(bytes, 0),
        x: read_f32(bytes, 8),
        y: read_f32(bytes, 12),
        z: read_f32(bytes, 16),
    }
}

fn decode_gyro(bytes: &[u8]) -> Sample {
    Sample::Gyro(decode_vector(bytes))
}

fn decode_accel(bytes: &[u8]) -> Sample {
    Sample::Accelerometer(decode_vector(bytes))
}

fn decode_mag(bytes: &[u8]) -> Sample {
    Sample::Magnetometer(decode_vector(bytes))
}

fn encode_gravity(sample: &Sample, out: &mut [u8]) {
    if let Sample::Gravity(s) = sample {
        out[0..8].copy_from_slice(&s.timestamp.to_le_bytes());
        write_f32s(
            &mut out[8..],
            &[s.x, s.y, s.z, s.linear_x, s.linear_y, s.linear_z],
        );
    }
}

fn decode_gravity(bytes: &[u8]) -> Sample {
    Sample::Gravity(GravitySample {
        timestamp: read_u64(bytes, 0),
        x: read_f32(bytes, 8),
        y: read_f32(bytes, 12),
        z: read_f32(bytes, 16),
        linear_x: read_f32(bytes, 20),
        linear_y: read_f32(bytes, 24),
        linear_z: read_f32(bytes, 28),
    })
}

fn write_f32s(out: &mut [u8], values: &[f32]) {
    for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(raw)
}
