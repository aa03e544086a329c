//! Controller tuning, persisted as XML.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CameraError;
use crate::random::DelaySpec;
use crate::scheduler::TaskScheduler;

fn default_axis_workers() -> usize {
    TaskScheduler::DEFAULT_AXIS_WORKERS
}

/// Tolerances, timing and host ranges used by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "CameraSteerSettings")]
pub struct ControllerSettings {
    /// Yaw tolerance as a fraction of a full turn (0.015 = 5.4 degrees)
    #[serde(rename = "yawTolerance")]
    pub yaw_tolerance: f64,

    /// Lowest yaw tolerance a caller may request
    #[serde(rename = "yawToleranceFloor")]
    pub yaw_tolerance_floor: f64,

    /// Pitch tolerance as a fraction of the normalised range
    #[serde(rename = "pitchTolerance")]
    pub pitch_tolerance: f64,

    /// Lowest pitch tolerance a caller may request
    #[serde(rename = "pitchToleranceFloor")]
    pub pitch_tolerance_floor: f64,

    /// Delay between orientation polls while a key is held
    #[serde(rename = "pollDelay", default)]
    pub poll_delay: DelaySpec,

    /// Size of the axis worker pool
    #[serde(rename = "axisWorkers", default = "default_axis_workers")]
    pub axis_workers: usize,

    /// Raw yaw units per full turn reported by the host
    #[serde(rename = "rawYawMax")]
    pub raw_yaw_max: i32,

    /// Raw pitch at the lowest camera angle
    #[serde(rename = "rawPitchMin")]
    pub raw_pitch_min: f64,

    /// Raw pitch at the highest camera angle
    #[serde(rename = "rawPitchMax")]
    pub raw_pitch_max: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            yaw_tolerance: 0.015,
            yaw_tolerance_floor: 0.015,
            pitch_tolerance: 0.01,
            pitch_tolerance_floor: 0.01,
            poll_delay: DelaySpec::default(),
            axis_workers: default_axis_workers(),
            raw_yaw_max: 2048,
            raw_pitch_min: 128.0,
            raw_pitch_max: 383.0,
        }
    }
}

impl ControllerSettings {
    /// Check every field is usable by the controller.
    pub fn validate(&self) -> Result<(), CameraError> {
        let tolerances = [
            ("yaw tolerance", self.yaw_tolerance),
            ("yaw tolerance floor", self.yaw_tolerance_floor),
            ("pitch tolerance", self.pitch_tolerance),
            ("pitch tolerance floor", self.pitch_tolerance_floor),
        ];
        for (name, value) in tolerances {
            if !(0.0..1.0).contains(&value) {
                return Err(CameraError::InvalidArgument(format!(
                    "{} must lie within [0, 1), got {}",
                    name, value
                )));
            }
        }

        self.poll_delay.validate()?;

        if self.axis_workers == 0 {
            return Err(CameraError::InvalidArgument(
                "at least one axis worker is required".to_string(),
            ));
        }
        if self.raw_yaw_max <= 0 {
            return Err(CameraError::InvalidArgument(format!(
                "raw yaw range must be positive, got {}",
                self.raw_yaw_max
            )));
        }
        if !(self.raw_pitch_max > self.raw_pitch_min) {
            return Err(CameraError::InvalidArgument(format!(
                "raw pitch range is empty ({}..{})",
                self.raw_pitch_min, self.raw_pitch_max
            )));
        }
        Ok(())
    }

    /// Yaw tolerance to use for a request, never below the floor.
    pub fn effective_yaw_tolerance(&self, requested: Option<f64>) -> f64 {
        requested
            .unwrap_or(self.yaw_tolerance)
            .max(self.yaw_tolerance_floor)
    }

    /// Pitch tolerance to use for a request, never below the floor.
    pub fn effective_pitch_tolerance(&self, requested: Option<f64>) -> f64 {
        requested
            .unwrap_or(self.pitch_tolerance)
            .max(self.pitch_tolerance_floor)
    }

    /// Load and validate settings from an XML file.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        settings.validate().map_err(SettingsError::Invalid)?;
        tracing::info!("Loaded controller settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to an XML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Get the settings file path in the user config directory
    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("CameraSteer");
            p.push("settings.xml");
            p
        })
    }

    /// Load from the config directory, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring settings at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to the config directory.
    pub fn save_default(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::default_path() else {
            return Err(SettingsError::NoConfigDir);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }
        self.save_to_file(&path)
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
    #[error("Invalid settings: {0}")]
    Invalid(CameraError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.yaw_tolerance, 0.015);
        assert_eq!(settings.poll_delay, DelaySpec::new(15, 10, 20));
        assert_eq!(settings.axis_workers, 2);
        settings.validate().unwrap();
    }

    #[test]
    fn test_tolerance_floor() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.effective_yaw_tolerance(Some(0.001)), 0.015);
        assert_eq!(settings.effective_yaw_tolerance(Some(0.05)), 0.05);
        assert_eq!(settings.effective_yaw_tolerance(Some(f64::NAN)), 0.015);
        assert_eq!(settings.effective_yaw_tolerance(None), 0.015);
        assert_eq!(settings.effective_pitch_tolerance(Some(-1.0)), 0.01);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = ControllerSettings::default();
        settings.poll_delay = DelaySpec::new(25, 10, 20);
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.raw_pitch_max = settings.raw_pitch_min;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.yaw_tolerance = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.axis_workers = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_xml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");

        let mut settings = ControllerSettings::default();
        settings.pitch_tolerance = 0.02;
        settings.poll_delay = DelaySpec::new(30, 20, 45);
        settings.save_to_file(&path).unwrap();

        let loaded = ControllerSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_rejects_invalid_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");
        let mut settings = ControllerSettings::default();
        settings.poll_delay = DelaySpec::new(5, 10, 20);
        settings.save_to_file(&path).unwrap();

        assert!(matches!(
            ControllerSettings::load_from_file(&path),
            Err(SettingsError::Invalid(CameraError::InvalidArgument(_)))
        ));
    }
}
