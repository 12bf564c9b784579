// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Minimal on-disk volume container.
//!
//! A volume is stored as `<stem>.json`, a [`RawHeader`], next to `<stem>.bin`,
//! the little-endian samples in `(inline, crossline, depth)` C order.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SeismicError, SeismicResult, SourceError};
use crate::pipeline::{AttributeKind, AttributeWriter};
use crate::source::{try_buffer, TraceSource};
use crate::volume::{GeometryMetadata, SampleFormat, Volume};

/// JSON sidecar describing a `.bin` sample file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawHeader {
    /// `(inline, crossline, depth)` sample counts.
    pub shape: [usize; 3],
    pub sample_interval: f32,
    /// Sample encoding code, see [`SampleFormat`].
    pub format: u16,
    /// Geometry of the run that produced this volume, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryMetadata>,
}

impl RawHeader {
    pub fn read(path: &Path) -> SeismicResult<Self> {
        let text = fs::read_to_string(path)?;
        let header: RawHeader = serde_json::from_str(&text)?;
        header.byte_len()?;
        Ok(header)
    }

    pub fn sample_format(&self) -> SeismicResult<SampleFormat> {
        SampleFormat::from_code(self.format).ok_or_else(|| {
            SeismicError::config(
                "sample format",
                self.format.to_string(),
                "expected 1, 2, 3, 5, 6 or 8",
            )
        })
    }

    /// Number of samples in the cube. Shapes whose count overflows `usize`
    /// are rejected.
    pub fn samples(&self) -> SeismicResult<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| self.oversized())
    }

    /// Length of the `.bin` file this header describes.
    pub fn byte_len(&self) -> SeismicResult<usize> {
        let width = self.sample_format()?.byte_width();
        self.samples()?
            .checked_mul(width)
            .ok_or_else(|| self.oversized())
    }

    fn oversized(&self) -> SeismicError {
        SeismicError::config(
            "volume shape",
            format!("{:?}", self.shape),
            "sample count does not fit in memory addressing",
        )
    }
}

/// Sample file that accompanies a header path.
pub fn data_path(header: &Path) -> PathBuf {
    header.with_extension("bin")
}

/// Trace source over a raw container. Samples of any supported encoding are
/// widened to `f32` as they are read.
#[derive(Debug)]
pub struct RawVolumeSource {
    header: RawHeader,
    format: SampleFormat,
    samples: usize,
    byte_len: usize,
    data_path: PathBuf,
    file: Mutex<File>,
}

impl RawVolumeSource {
    /// Opens `<stem>.json` and checks that `<stem>.bin` holds exactly the
    /// declared number of samples.
    pub fn open(header_path: impl AsRef<Path>) -> SeismicResult<Self> {
        let header_path = header_path.as_ref();
        let header = RawHeader::read(header_path)?;
        let format = header.sample_format()?;
        let samples = header.samples()?;
        let byte_len = header.byte_len()?;
        let data_path = data_path(header_path);
        let file = File::open(&data_path)?;

        let expected = byte_len as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(SourceError::Corrupt(format!(
                "{} holds {actual} bytes, header declares {expected}",
                data_path.display()
            ))
            .into());
        }
        info!(path = %data_path.display(), shape = ?header.shape, ?format, "opened raw volume");
        Ok(Self {
            header,
            format,
            samples,
            byte_len,
            data_path,
            file: Mutex::new(file),
        })
    }

    pub fn header(&self) -> &RawHeader {
        &self.header
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn read_at(&self, offset: u64, bytes: &mut [u8]) -> Result<(), SourceError> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| SourceError::Corrupt("raw volume reader poisoned".into()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(bytes)?;
        Ok(())
    }
}

impl TraceSource for RawVolumeSource {
    type Sample = f32;

    fn extent(&self) -> [usize; 3] {
        self.header.shape
    }

    fn sample_interval(&self) -> f32 {
        self.header.sample_interval
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn read_volume(&self) -> Result<Array3<f32>, SourceError> {
        let width = self.format.byte_width();
        let samples = self.samples;
        let mut bytes = try_buffer::<u8>(self.byte_len)?;
        bytes.resize(self.byte_len, 0);
        self.read_at(0, &mut bytes)?;

        let mut values = try_buffer::<f32>(samples)?;
        values.extend(bytes.chunks_exact(width).map(|raw| decode(self.format, raw)));
        debug!(samples, "raw bulk read");
        let [ni, nx, nz] = self.header.shape;
        Array3::from_shape_vec((ni, nx, nz), values)
            .map_err(|err| SourceError::Corrupt(err.to_string()))
    }

    /// Raw bytes plus the decoded `f32` cube, both live during a bulk read.
    fn volume_bytes(&self) -> usize {
        self.samples
            .checked_mul(std::mem::size_of::<f32>())
            .and_then(|decoded| decoded.checked_add(self.byte_len))
            .unwrap_or(usize::MAX)
    }

    fn read_trace(&self, inline: usize, crossline: usize) -> Result<Vec<f32>, SourceError> {
        let [ni, nx, nz] = self.header.shape;
        if inline >= ni || crossline >= nx {
            return Err(SourceError::TraceOutOfRange { inline, crossline });
        }
        let width = self.format.byte_width();
        let offset = ((inline * nx + crossline) * nz * width) as u64;
        let mut bytes = vec![0u8; nz * width];
        self.read_at(offset, &mut bytes)?;
        Ok(bytes
            .chunks_exact(width)
            .map(|raw| decode(self.format, raw))
            .collect())
    }
}

fn decode(format: SampleFormat, raw: &[u8]) -> f32 {
    match format {
        SampleFormat::IeeeFloat32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        SampleFormat::IbmFloat32 => {
            ibm_to_f32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        SampleFormat::Int32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f32,
        SampleFormat::Int16 => i16::from_le_bytes([raw[0], raw[1]]) as f32,
        SampleFormat::Int8 => raw[0] as i8 as f32,
        SampleFormat::IeeeFloat64 => {
            let mut word = [0u8; 8];
            word.copy_from_slice(&raw[..8]);
            f64::from_le_bytes(word) as f32
        }
    }
}

/// IBM System/360 single precision: sign, base-16 exponent biased by 64,
/// 24-bit fraction.
fn ibm_to_f32(bits: u32) -> f32 {
    let sign = if bits >> 31 == 1 { -1.0f64 } else { 1.0 };
    let exponent = ((bits >> 24) & 0x7f) as i32 - 64;
    let fraction = (bits & 0x00ff_ffff) as f64 / (1u32 << 24) as f64;
    (sign * fraction * 16f64.powi(exponent)) as f32
}

/// Writes `volume` as IEEE `f32` samples at `<stem>.bin` plus a header at
/// `header_path`.
pub fn write_raw_volume(
    header_path: impl AsRef<Path>,
    volume: &Volume,
    sample_interval: f32,
    geometry: Option<&GeometryMetadata>,
) -> SeismicResult<RawHeader> {
    let header_path = header_path.as_ref();
    let header = RawHeader {
        shape: volume.shape(),
        sample_interval,
        format: SampleFormat::IeeeFloat32.code(),
        geometry: geometry.cloned(),
    };

    let mut out = BufWriter::new(File::create(data_path(header_path))?);
    for value in volume.array().iter() {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()?;
    fs::write(header_path, serde_json::to_string_pretty(&header)?)?;
    debug!(path = %header_path.display(), shape = ?header.shape, "raw volume written");
    Ok(header)
}

/// Writes every attribute into a directory as `<stem>.json` + `<stem>.bin`.
#[derive(Debug)]
pub struct RawVolumeWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl RawVolumeWriter {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> SeismicResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Header paths written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl AttributeWriter for RawVolumeWriter {
    fn write(
        &mut self,
        kind: AttributeKind,
        volume: &Volume,
        geometry: &GeometryMetadata,
    ) -> SeismicResult<()> {
        let header_path = self.dir.join(format!("{}.json", kind.stem()));
        write_raw_volume(&header_path, volume, geometry.sample_interval, Some(geometry))?;
        info!(attribute = %kind, path = %header_path.display(), "attribute written");
        self.written.push(header_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load, LoadPath, LoadRequest, LoaderOptions};
    use crate::params::parse_range;
    use tempfile::tempdir;

    fn ramp() -> Volume {
        Volume::from_array(Array3::from_shape_fn((3, 4, 5), |(i, j, k)| {
            (i * 100 + j * 10 + k) as f32 - 0.5
        }))
    }

    #[test]
    fn written_volume_reads_back_by_bulk_and_trace() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("ramp.json");
        write_raw_volume(&header_path, &ramp(), 4.0, None).unwrap();

        let source = RawVolumeSource::open(&header_path).unwrap();
        assert_eq!(source.extent(), [3, 4, 5]);
        assert_eq!(source.format(), SampleFormat::IeeeFloat32);
        assert_eq!(source.read_volume().unwrap(), ramp().into_array());
        assert_eq!(
            source.read_trace(2, 3).unwrap(),
            vec![229.5, 230.5, 231.5, 232.5, 233.5]
        );
        assert!(matches!(
            source.read_trace(3, 0),
            Err(SourceError::TraceOutOfRange { inline: 3, .. })
        ));
    }

    #[test]
    fn int16_samples_are_widened() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("ints.json");
        let header = RawHeader {
            shape: [2, 2, 3],
            sample_interval: 2.0,
            format: SampleFormat::Int16.code(),
            geometry: None,
        };
        fs::write(&header_path, serde_json::to_string(&header).unwrap()).unwrap();
        let bytes: Vec<u8> = (0..12i16).flat_map(|v| (v - 6).to_le_bytes()).collect();
        fs::write(data_path(&header_path), bytes).unwrap();

        let source = RawVolumeSource::open(&header_path).unwrap();
        let request = LoadRequest {
            crossline: Some(parse_range("1:2").unwrap()),
            ..LoadRequest::default()
        };
        let options = LoaderOptions {
            memory_budget_bytes: Some(0),
            ..LoaderOptions::default()
        };
        let loaded = load(&source, &request, &options).unwrap();
        assert_eq!(loaded.path, LoadPath::Incremental);
        assert_eq!(loaded.geometry.format, 3);
        assert_eq!(
            loaded.volume.into_array().into_raw_vec(),
            vec![-3.0, -2.0, -1.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn truncated_sample_file_is_rejected() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("short.json");
        write_raw_volume(&header_path, &ramp(), 4.0, None).unwrap();
        let path = data_path(&header_path);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            RawVolumeSource::open(&header_path),
            Err(SeismicError::Source(SourceError::Corrupt(_)))
        ));
    }

    #[test]
    fn unknown_format_code_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("odd.json");
        fs::write(
            &header_path,
            r#"{"shape":[1,1,1],"sample_interval":1.0,"format":4}"#,
        )
        .unwrap();
        assert!(RawVolumeSource::open(&header_path).unwrap_err().is_configuration());
    }

    #[test]
    fn overflowing_shape_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("huge.json");
        let header = RawHeader {
            shape: [usize::MAX / 2, 4, 4],
            sample_interval: 4.0,
            format: SampleFormat::IeeeFloat32.code(),
            geometry: None,
        };
        fs::write(&header_path, serde_json::to_string(&header).unwrap()).unwrap();
        fs::write(data_path(&header_path), [0u8; 16]).unwrap();

        assert!(header.samples().unwrap_err().is_configuration());
        let err = RawVolumeSource::open(&header_path).unwrap_err();
        assert!(err.is_configuration(), "{err}");

        let wide = RawHeader {
            shape: [usize::MAX / 4, 1, 1],
            format: SampleFormat::IeeeFloat64.code(),
            ..header
        };
        assert!(wide.samples().is_ok());
        assert!(wide.byte_len().unwrap_err().is_configuration());
    }

    #[test]
    fn bulk_estimate_counts_raw_and_decoded_buffers() {
        let dir = tempdir().unwrap();
        let header_path = dir.path().join("doubles.json");
        let header = RawHeader {
            shape: [2, 2, 4],
            sample_interval: 4.0,
            format: SampleFormat::IeeeFloat64.code(),
            geometry: None,
        };
        fs::write(&header_path, serde_json::to_string(&header).unwrap()).unwrap();
        let bytes: Vec<u8> = (0..16).flat_map(|v| (v as f64).to_le_bytes()).collect();
        fs::write(data_path(&header_path), bytes).unwrap();

        let source = RawVolumeSource::open(&header_path).unwrap();
        assert_eq!(source.volume_bytes(), 16 * 8 + 16 * 4);

        let options = LoaderOptions {
            memory_budget_bytes: Some(128),
            ..LoaderOptions::default()
        };
        let loaded = load(&source, &LoadRequest::default(), &options).unwrap();
        assert_eq!(loaded.path, LoadPath::Incremental);
        assert_eq!(loaded.volume.get([1, 1, 3]), Some(15.0));

        let options = LoaderOptions {
            memory_budget_bytes: Some(192),
            ..LoaderOptions::default()
        };
        let loaded = load(&source, &LoadRequest::default(), &options).unwrap();
        assert_eq!(loaded.path, LoadPath::Bulk);
    }

    #[test]
    fn ibm_floats_decode() {
        assert_eq!(ibm_to_f32(0x4110_0000), 1.0);
        assert_eq!(ibm_to_f32(0xC276_A000), -118.625);
        assert_eq!(ibm_to_f32(0), 0.0);
    }

    #[test]
    fn writer_names_files_after_the_attribute() {
        let dir = tempdir().unwrap();
        let mut writer = RawVolumeWriter::new(dir.path().join("out")).unwrap();
        let geometry = GeometryMetadata {
            original_shape: [3, 4, 5],
            cropped_shape: [3, 4, 5],
            inline_range: parse_range("0:3").unwrap(),
            crossline_range: parse_range("0:4").unwrap(),
            depth_range: parse_range("0:5").unwrap(),
            sample_interval: 4.0,
            format: 5,
            permutation: None,
        };
        writer
            .write(AttributeKind::Coherence, &ramp(), &geometry)
            .unwrap();
        let header_path = dir.path().join("out").join("coherence.json");
        assert_eq!(writer.written(), &[header_path.clone()]);
        let header = RawHeader::read(&header_path).unwrap();
        assert_eq!(header.geometry, Some(geometry));
        assert_eq!(header.sample_interval, 4.0);
    }
}
