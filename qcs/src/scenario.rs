//! Session configuration, loaded from a TOML scenario file.

use serde::Deserialize;
use std::{collections::HashSet, fs, path::Path};

use crate::camera::{CameraModel, CameraSpec, FootprintBasis};
use crate::units::{Angle, Length, Time};

#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub name: Option<String>,
    /// Name of the observer vehicle.
    pub observer: String,
    /// Names of the tracked ground vehicles.
    pub targets: Vec<String>,
    /// Working altitude the observer holds for the whole session.
    pub altitude_m: f64,
    /// Control tick period, e.g. "500ms".
    #[serde(default = "default_tick_period")]
    pub tick_period: String,
    #[serde(default = "default_standoff_margin")]
    pub standoff_margin_m: f64,
    #[serde(default = "default_coverage_margin")]
    pub coverage_margin_m: f64,
    /// Coverage is reported to the log every this many ticks (monitor).
    #[serde(default = "default_report_interval")]
    pub coverage_report_interval: u32,
    pub camera: Camera,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Camera {
    pub sensor_width_mm: f64,
    pub sensor_height_mm: f64,
    pub focal_length_mm: f64,
    /// Session-calibrated field of view. When absent the footprint runs on
    /// the angles derived from the optics.
    pub fov_override_deg: Option<f64>,
}

fn default_tick_period() -> String {
    "500ms".to_owned()
}

fn default_standoff_margin() -> f64 {
    2.0
}

fn default_coverage_margin() -> f64 {
    4.0
}

fn default_report_interval() -> u32 {
    10
}

impl Config {
    /// The field-exercise session the scripts were written against.
    pub fn nominal() -> Self {
        Config {
            name: Some("field exercise 1".to_owned()),
            observer: "GODOT".to_owned(),
            targets: vec!["DJANGO".to_owned(), "SUSAN".to_owned(), "ANTON".to_owned()],
            altitude_m: 30.0,
            tick_period: default_tick_period(),
            standoff_margin_m: default_standoff_margin(),
            coverage_margin_m: default_coverage_margin(),
            coverage_report_interval: default_report_interval(),
            camera: Camera {
                sensor_width_mm: 255.0,
                sensor_height_mm: 255.0,
                focal_length_mm: 93.09,
                fov_override_deg: Some(768.0),
            },
        }
    }

    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Self {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).expect("Failed to read scenario file");
                Self::from_str_checked(&content)
            }
            None => Self::nominal(),
        }
    }

    pub fn from_str_checked(s: &str) -> Self {
        let cfg: Config = toml::from_str(s).expect("Failed to parse scenario file");

        assert!(
            !cfg.observer.trim().is_empty(),
            "Scenario must name an observer"
        );
        assert!(
            !cfg.targets.is_empty(),
            "Scenario must name at least one target"
        );
        let mut names = HashSet::new();
        for name in cfg.targets.iter() {
            if !names.insert(name) {
                panic!("Duplicate scenario entry for target '{name}'");
            }
        }
        assert!(
            cfg.altitude_m > 0.0,
            "Scenario altitude must be positive, got {}",
            cfg.altitude_m
        );
        assert!(
            cfg.camera.focal_length_mm > 0.0
                && cfg.camera.sensor_width_mm > 0.0
                && cfg.camera.sensor_height_mm > 0.0,
            "Scenario camera dimensions must be positive"
        );
        assert!(
            cfg.coverage_report_interval > 0,
            "Scenario coverage-report-interval must be positive"
        );
        // Fail on a bad period at load time, not mid-session
        humantime::parse_duration(&cfg.tick_period).expect("Invalid scenario tick-period");

        cfg
    }

    pub fn tick_period(&self) -> Time {
        let duration = humantime::parse_duration(&self.tick_period)
            .expect("tick-period was validated at load time");
        Time::from_duration(duration)
    }

    pub fn altitude(&self) -> Length {
        Length::from_meters(self.altitude_m)
    }

    pub fn standoff_margin(&self) -> Length {
        Length::from_meters(self.standoff_margin_m)
    }

    pub fn coverage_margin(&self) -> Length {
        Length::from_meters(self.coverage_margin_m)
    }

    pub fn camera_model(&self) -> CameraModel {
        let basis = match self.camera.fov_override_deg {
            Some(deg) => FootprintBasis::Fixed(Angle::from_degrees(deg)),
            None => FootprintBasis::DerivedOptics,
        };
        CameraModel::new(
            CameraSpec {
                sensor_width: Length::from_millimeters(self.camera.sensor_width_mm),
                sensor_height: Length::from_millimeters(self.camera.sensor_height_mm),
                focal_length: Length::from_millimeters(self.camera.focal_length_mm),
            },
            basis,
        )
    }
}
