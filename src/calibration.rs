// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-laser calibration store.
//!
//! Velodyne sensors ship with a calibration describing every laser's
//! geometry and intensity response. The decoder needs it to turn raw
//! distance and rotation readings into Cartesian points.
//!
//! # Source Format
//!
//! The YAML schema is the one produced by the Velodyne ROS tooling. Angles
//! are in radians and distances in meters:
//!
//! ```yaml
//! num_lasers: 32
//! distance_resolution: 0.002
//! lasers:
//! - {laser_id: 0, rot_correction: 0.0, vert_correction: -0.5353,
//!    dist_correction: 0.0, dist_correction_x: 0.0, dist_correction_y: 0.0,
//!    vert_offset_correction: 0.0, horiz_offset_correction: 0.0,
//!    focal_distance: 0.0, focal_slope: 0.0,
//!    min_intensity: 0, max_intensity: 255}
//! ```
//!
//! The same keys are accepted as JSON. `num_lasers` defaults to the number
//! of entries and `distance_resolution` to 2 mm. Entries may be omitted for
//! some channels; points from those channels are dropped during decoding.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::calibration::Calibration;
//!
//! let calibration = Calibration::load("hdl32e.yaml")?;
//! if let Some(laser) = calibration.lookup(7) {
//!     println!("laser 7 elevation: {} rad", laser.vert_correction);
//! }
//! ```

use crate::lidar::SensorModel;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// Default distance resolution in meters (2mm)
pub const DEFAULT_DISTANCE_RESOLUTION: f32 = 0.002;

/// Focal distance normalisation used by the intensity correction
const FOCAL_DISTANCE_SCALE: f32 = 13100.0;

/// Errors raised while loading or validating a calibration.
#[derive(Debug)]
pub enum CalibrationError {
    /// The calibration file could not be read
    Io(std::io::Error),
    /// YAML syntax or schema error
    Yaml(serde_yaml::Error),
    /// JSON syntax or schema error
    Json(serde_json::Error),
    /// The file extension does not name a known format
    UnsupportedFormat(String),
    /// No supported sensor model has this many lasers
    UnsupportedLaserCount(usize),
    /// A laser id is outside `[0, num_lasers)`
    ChannelOutOfRange { laser_id: u32, num_lasers: usize },
    /// A laser id appears more than once
    DuplicateChannel(u32),
    /// A numeric parameter is NaN or infinite
    NonFinite { laser_id: u32, field: &'static str },
    /// `min_intensity` exceeds `max_intensity`
    InvalidIntensityRange { laser_id: u32, min: f32, max: f32 },
    /// The distance resolution is not a positive finite number
    InvalidDistanceResolution(f32),
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalibrationError::Io(err) => Some(err),
            CalibrationError::Yaml(err) => Some(err),
            CalibrationError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalibrationError::Io(err) => write!(f, "I/O error: {}", err),
            CalibrationError::Yaml(err) => write!(f, "YAML error: {}", err),
            CalibrationError::Json(err) => write!(f, "JSON error: {}", err),
            CalibrationError::UnsupportedFormat(ext) => {
                write!(f, "unsupported calibration format: {}", ext)
            }
            CalibrationError::UnsupportedLaserCount(n) => {
                write!(f, "unsupported number of lasers: {}", n)
            }
            CalibrationError::ChannelOutOfRange {
                laser_id,
                num_lasers,
            } => write!(
                f,
                "laser {} out of range for {} lasers",
                laser_id, num_lasers
            ),
            CalibrationError::DuplicateChannel(id) => write!(f, "duplicate laser {}", id),
            CalibrationError::NonFinite { laser_id, field } => {
                write!(f, "laser {} has non-finite {}", laser_id, field)
            }
            CalibrationError::InvalidIntensityRange { laser_id, min, max } => write!(
                f,
                "laser {} intensity range {}..{} is empty",
                laser_id, min, max
            ),
            CalibrationError::InvalidDistanceResolution(res) => {
                write!(f, "invalid distance resolution: {}", res)
            }
        }
    }
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::Io(err)
    }
}

impl From<serde_yaml::Error> for CalibrationError {
    fn from(err: serde_yaml::Error) -> Self {
        CalibrationError::Yaml(err)
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Json(err)
    }
}

fn default_max_intensity() -> f32 {
    255.0
}

/// Calibration parameters for one laser as they appear in the source file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LaserParams {
    pub laser_id: u32,
    #[serde(default)]
    pub rot_correction: f32,
    #[serde(default)]
    pub vert_correction: f32,
    #[serde(default)]
    pub dist_correction: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist_correction_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist_correction_y: Option<f32>,
    #[serde(default)]
    pub vert_offset_correction: f32,
    #[serde(default)]
    pub horiz_offset_correction: f32,
    #[serde(default)]
    pub focal_distance: f32,
    #[serde(default)]
    pub focal_slope: f32,
    #[serde(default)]
    pub min_intensity: f32,
    #[serde(default = "default_max_intensity")]
    pub max_intensity: f32,
}

impl LaserParams {
    /// Parameters for a laser with the given elevation and no corrections.
    pub fn new(laser_id: u32, vert_correction: f32) -> Self {
        Self {
            laser_id,
            vert_correction,
            max_intensity: 255.0,
            ..Default::default()
        }
    }
}

/// Contents of a calibration file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CalibrationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_lasers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_resolution: Option<f32>,
    pub lasers: Vec<LaserParams>,
}

/// Near-field distance corrections along the X and Y axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoPointCorrection {
    pub dist_correction_x: f32,
    pub dist_correction_y: f32,
}

/// Validated corrections for one laser channel.
///
/// Trigonometric terms are computed once at load time.
#[derive(Clone, Debug, PartialEq)]
pub struct LaserCorrection {
    pub laser_id: u16,
    /// Horizontal angle correction (radians)
    pub rot_correction: f32,
    /// Vertical angle (radians)
    pub vert_correction: f32,
    /// Far-field distance correction (meters)
    pub dist_correction: f32,
    pub two_point: Option<TwoPointCorrection>,
    pub vert_offset_correction: f32,
    pub horiz_offset_correction: f32,
    pub focal_distance: f32,
    pub focal_slope: f32,
    pub min_intensity: f32,
    pub max_intensity: f32,
    pub(crate) cos_rot_correction: f32,
    pub(crate) sin_rot_correction: f32,
    pub(crate) cos_vert_correction: f32,
    pub(crate) sin_vert_correction: f32,
    pub(crate) focal_offset: f32,
}

impl LaserCorrection {
    fn from_params(params: &LaserParams) -> Result<Self, CalibrationError> {
        let id = params.laser_id;
        let fields = [
            ("rot_correction", params.rot_correction),
            ("vert_correction", params.vert_correction),
            ("dist_correction", params.dist_correction),
            ("dist_correction_x", params.dist_correction_x.unwrap_or(0.0)),
            ("dist_correction_y", params.dist_correction_y.unwrap_or(0.0)),
            ("vert_offset_correction", params.vert_offset_correction),
            ("horiz_offset_correction", params.horiz_offset_correction),
            ("focal_distance", params.focal_distance),
            ("focal_slope", params.focal_slope),
            ("min_intensity", params.min_intensity),
            ("max_intensity", params.max_intensity),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(CalibrationError::NonFinite {
                laser_id: id,
                field: *field,
            });
        }

        if params.min_intensity > params.max_intensity {
            return Err(CalibrationError::InvalidIntensityRange {
                laser_id: id,
                min: params.min_intensity,
                max: params.max_intensity,
            });
        }

        // Both near-field values are required for the interpolation.
        let two_point = match (params.dist_correction_x, params.dist_correction_y) {
            (Some(x), Some(y)) => Some(TwoPointCorrection {
                dist_correction_x: x,
                dist_correction_y: y,
            }),
            _ => None,
        };

        let focal = 1.0 - params.focal_distance / FOCAL_DISTANCE_SCALE;

        Ok(Self {
            laser_id: id as u16,
            rot_correction: params.rot_correction,
            vert_correction: params.vert_correction,
            dist_correction: params.dist_correction,
            two_point,
            vert_offset_correction: params.vert_offset_correction,
            horiz_offset_correction: params.horiz_offset_correction,
            focal_distance: params.focal_distance,
            focal_slope: params.focal_slope,
            min_intensity: params.min_intensity,
            max_intensity: params.max_intensity,
            cos_rot_correction: params.rot_correction.cos(),
            sin_rot_correction: params.rot_correction.sin(),
            cos_vert_correction: params.vert_correction.cos(),
            sin_vert_correction: params.vert_correction.sin(),
            focal_offset: 256.0 * focal * focal,
        })
    }
}

/// Immutable calibration store indexed by laser channel id.
///
/// Loaded once at startup and shared read-only (typically behind an `Arc`)
/// by every decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    model: SensorModel,
    distance_resolution: f32,
    lasers: Vec<Option<LaserCorrection>>,
}

impl Calibration {
    /// Load a calibration file, choosing the parser from the extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&std::fs::read_to_string(path)?),
            "json" => Self::from_json_str(&std::fs::read_to_string(path)?),
            _ => Err(CalibrationError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }

    /// Parse and validate a YAML calibration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CalibrationError> {
        let params: CalibrationParams = serde_yaml::from_str(yaml)?;
        Self::from_params(&params)
    }

    /// Parse and validate a JSON calibration.
    pub fn from_json_str(json: &str) -> Result<Self, CalibrationError> {
        let params: CalibrationParams = serde_json::from_str(json)?;
        Self::from_params(&params)
    }

    /// Validate already-parsed parameters.
    pub fn from_params(params: &CalibrationParams) -> Result<Self, CalibrationError> {
        let num_lasers = params.num_lasers.unwrap_or(params.lasers.len());
        let model = SensorModel::from_num_lasers(num_lasers)
            .ok_or(CalibrationError::UnsupportedLaserCount(num_lasers))?;

        let distance_resolution = params
            .distance_resolution
            .unwrap_or(DEFAULT_DISTANCE_RESOLUTION);
        if !distance_resolution.is_finite() || distance_resolution <= 0.0 {
            return Err(CalibrationError::InvalidDistanceResolution(
                distance_resolution,
            ));
        }

        let mut lasers = vec![None; num_lasers];
        for laser in &params.lasers {
            let slot = lasers.get_mut(laser.laser_id as usize).ok_or(
                CalibrationError::ChannelOutOfRange {
                    laser_id: laser.laser_id,
                    num_lasers,
                },
            )?;
            if slot.is_some() {
                return Err(CalibrationError::DuplicateChannel(laser.laser_id));
            }
            *slot = Some(LaserCorrection::from_params(laser)?);
        }

        Ok(Self {
            model,
            distance_resolution,
            lasers,
        })
    }

    /// Corrections for a channel, or `None` when the channel is unknown.
    #[inline]
    pub fn lookup(&self, channel: usize) -> Option<&LaserCorrection> {
        self.lasers.get(channel).and_then(Option::as_ref)
    }

    /// Sensor model implied by the laser count.
    pub fn model(&self) -> SensorModel {
        self.model
    }

    /// Number of channels of the sensor model.
    pub fn num_lasers(&self) -> usize {
        self.lasers.len()
    }

    /// Number of channels with calibration entries.
    pub fn len(&self) -> usize {
        self.lasers.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw distance unit in meters.
    pub fn distance_resolution(&self) -> f32 {
        self.distance_resolution
    }

    /// Calibrated channels in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &LaserCorrection> {
        self.lasers.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HDL32_YAML: &str = r#"
num_lasers: 32
distance_resolution: 0.002
lasers:
- {laser_id: 0, rot_correction: 0.0, vert_correction: -0.5352924815866609, dist_correction: 0.0, dist_correction_x: 0.0, dist_correction_y: 0.0, vert_offset_correction: 0.0, horiz_offset_correction: 0.0, focal_distance: 0.0, focal_slope: 0.0, min_intensity: 0, max_intensity: 255}
- {laser_id: 1, rot_correction: 0.0, vert_correction: -0.1628392174657417, dist_correction: 0.0, vert_offset_correction: 0.0, horiz_offset_correction: 0.0}
- {laser_id: 31, vert_correction: 0.18622663118779495}
"#;

    fn params(n: u32) -> CalibrationParams {
        CalibrationParams {
            num_lasers: Some(n as usize),
            distance_resolution: None,
            lasers: (0..n).map(|id| LaserParams::new(id, 0.0)).collect(),
        }
    }

    #[test]
    fn test_load_yaml() {
        let calibration = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        assert_eq!(calibration.model(), SensorModel::Hdl32e);
        assert_eq!(calibration.num_lasers(), 32);
        assert_eq!(calibration.len(), 3);
        assert_eq!(calibration.distance_resolution(), 0.002);

        let laser = calibration.lookup(0).unwrap();
        assert!((laser.vert_correction + 0.5352925).abs() < 1e-6);
        assert!(laser.two_point.is_some());
        assert_eq!(laser.max_intensity, 255.0);

        // Defaults apply to missing keys.
        let laser = calibration.lookup(31).unwrap();
        assert_eq!(laser.dist_correction, 0.0);
        assert!(laser.two_point.is_none());
        assert_eq!(laser.min_intensity, 0.0);
        assert_eq!(laser.max_intensity, 255.0);
    }

    #[test]
    fn test_lookup_unknown_channel() {
        let calibration = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        assert!(calibration.lookup(2).is_none());
        assert!(calibration.lookup(32).is_none());
        assert!(calibration.lookup(usize::MAX).is_none());
    }

    #[test]
    fn test_iter_in_id_order() {
        let calibration = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        let ids: Vec<u16> = calibration.iter().map(|l| l.laser_id).collect();
        assert_eq!(ids, vec![0, 1, 31]);
    }

    #[test]
    fn test_num_lasers_defaults_to_entry_count() {
        let mut p = params(16);
        p.num_lasers = None;
        let calibration = Calibration::from_params(&p).unwrap();
        assert_eq!(calibration.model(), SensorModel::Vlp16);
        assert_eq!(calibration.len(), 16);
    }

    #[test]
    fn test_unsupported_laser_count() {
        let result = Calibration::from_params(&params(64));
        assert!(matches!(
            result,
            Err(CalibrationError::UnsupportedLaserCount(64))
        ));
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut p = params(16);
        p.lasers.push(LaserParams::new(16, 0.0));
        let result = Calibration::from_params(&p);
        assert!(matches!(
            result,
            Err(CalibrationError::ChannelOutOfRange {
                laser_id: 16,
                num_lasers: 16
            })
        ));
    }

    #[test]
    fn test_duplicate_channel() {
        let mut p = params(32);
        p.lasers[5].laser_id = 4;
        let result = Calibration::from_params(&p);
        assert!(matches!(result, Err(CalibrationError::DuplicateChannel(4))));
    }

    #[test]
    fn test_non_finite_field() {
        let mut p = params(32);
        p.lasers[3].vert_correction = f32::NAN;
        let result = Calibration::from_params(&p);
        assert!(matches!(
            result,
            Err(CalibrationError::NonFinite {
                laser_id: 3,
                field: "vert_correction"
            })
        ));

        let mut p = params(32);
        p.lasers[7].dist_correction_x = Some(f32::INFINITY);
        p.lasers[7].dist_correction_y = Some(0.0);
        assert!(matches!(
            Calibration::from_params(&p),
            Err(CalibrationError::NonFinite {
                laser_id: 7,
                field: "dist_correction_x"
            })
        ));
    }

    #[test]
    fn test_yaml_nan_rejected() {
        let yaml = "num_lasers: 16\nlasers:\n- {laser_id: 0, dist_correction: .nan}\n";
        assert!(matches!(
            Calibration::from_yaml_str(yaml),
            Err(CalibrationError::NonFinite { laser_id: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_intensity_range() {
        let mut p = params(16);
        p.lasers[0].min_intensity = 200.0;
        p.lasers[0].max_intensity = 100.0;
        assert!(matches!(
            Calibration::from_params(&p),
            Err(CalibrationError::InvalidIntensityRange { laser_id: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_distance_resolution() {
        let mut p = params(16);
        p.distance_resolution = Some(0.0);
        assert!(matches!(
            Calibration::from_params(&p),
            Err(CalibrationError::InvalidDistanceResolution(_))
        ));
    }

    #[test]
    fn test_malformed_source() {
        assert!(matches!(
            Calibration::from_yaml_str("lasers: [ {laser_id: "),
            Err(CalibrationError::Yaml(_))
        ));
        assert!(matches!(
            Calibration::from_json_str("{\"lasers\": 3}"),
            Err(CalibrationError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Calibration::load("/nonexistent/calibration.yaml");
        assert!(matches!(result, Err(CalibrationError::Io(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result = Calibration::load("/nonexistent/calibration.ini");
        assert!(matches!(result, Err(CalibrationError::UnsupportedFormat(_))));

        // An existing file is rejected by extension before it is parsed.
        let result = Calibration::load("Cargo.toml");
        assert!(matches!(result, Err(CalibrationError::UnsupportedFormat(_))));

        let result = Calibration::load("testdata/32db");
        assert!(matches!(result, Err(CalibrationError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_extension_case_insensitive() {
        let path = std::env::temp_dir().join("edgefirst_velodyne_calibration.YML");
        std::fs::write(&path, HDL32_YAML).unwrap();
        let result = Calibration::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(result.unwrap().model(), SensorModel::Hdl32e);
    }

    #[test]
    fn test_json_matches_yaml() {
        let yaml = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        let params: CalibrationParams = serde_yaml::from_str(HDL32_YAML).unwrap();
        let json = serde_json::to_string(&params).unwrap();
        let json = Calibration::from_json_str(&json).unwrap();
        assert_eq!(yaml, json);
    }

    #[test]
    fn test_load_is_idempotent() {
        let a = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        let b = Calibration::from_yaml_str(HDL32_YAML).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_precomputed_trig() {
        let mut p = params(16);
        p.lasers[2].vert_correction = 0.25;
        p.lasers[2].rot_correction = -0.1;
        let calibration = Calibration::from_params(&p).unwrap();
        let laser = calibration.lookup(2).unwrap();
        assert!((laser.cos_vert_correction - 0.25f32.cos()).abs() < 1e-6);
        assert!((laser.sin_vert_correction - 0.25f32.sin()).abs() < 1e-6);
        assert!((laser.cos_rot_correction - (-0.1f32).cos()).abs() < 1e-6);
        assert!((laser.sin_rot_correction - (-0.1f32).sin()).abs() < 1e-6);
        // focal_distance 0 gives the full 256 offset
        assert_eq!(laser.focal_offset, 256.0);
    }
}
