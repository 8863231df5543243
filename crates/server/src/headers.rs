//! Header access for spooled exposures.
//!
//! The ingest side extracts the handful of header cards the trigger needs
//! (`CMPLTEXP`, `NEXP`, `DPRTYPE`) into a JSON sidecar next to each frame:
//! `<spool>/<night>/<file>.json` for `<file>.fits`. Reading the sidecar
//! instead of the frame keeps FITS parsing out of this service.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use nightwatch_core::{
    CalibrationType, Exposure, ExposureClass, HeaderReader, SequenceCounters,
};

#[derive(Debug, Deserialize)]
struct SidecarHeader {
    #[serde(default)]
    cmpltexp: Option<u32>,
    #[serde(default)]
    nexp: Option<u32>,
    #[serde(default)]
    dprtype: Option<String>,
}

pub struct SidecarHeaders {
    spool_dir: PathBuf,
}

impl SidecarHeaders {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    fn read(&self, exposure: &Exposure) -> Option<SidecarHeader> {
        let path = self
            .spool_dir
            .join(exposure.night())
            .join(exposure.raw_filename())
            .with_extension("json");
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read header sidecar {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!("Malformed header sidecar {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn classify_dprtype(dprtype: &str) -> ExposureClass {
    match dprtype {
        "DARK_DARK" => ExposureClass::Calibration(CalibrationType::DarkDark),
        "DARK_FLAT" => ExposureClass::Calibration(CalibrationType::DarkFlat),
        "FLAT_DARK" => ExposureClass::Calibration(CalibrationType::FlatDark),
        "FLAT_FLAT" => ExposureClass::Calibration(CalibrationType::FlatFlat),
        "FP_FP" => ExposureClass::Calibration(CalibrationType::FpFp),
        "HCONE_HCONE" => ExposureClass::Calibration(CalibrationType::HcOneHcOne),
        other if other.starts_with("OBJ_") => ExposureClass::Object,
        _ => ExposureClass::Unknown,
    }
}

impl HeaderReader for SidecarHeaders {
    fn sequence_counters(&self, exposure: &Exposure) -> Option<SequenceCounters> {
        let header = self.read(exposure)?;
        match (header.cmpltexp, header.nexp) {
            (Some(index), Some(total)) => Some(SequenceCounters::new(index, total)),
            _ => None,
        }
    }

    fn classify(&self, exposure: &Exposure) -> ExposureClass {
        match self.read(exposure).and_then(|h| h.dprtype) {
            Some(dprtype) => classify_dprtype(&dprtype),
            None => ExposureClass::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sidecar(dir: &std::path::Path, night: &str, name: &str, json: &str) {
        let night_dir = dir.join(night);
        std::fs::create_dir_all(&night_dir).unwrap();
        std::fs::write(night_dir.join(name), json).unwrap();
    }

    #[test]
    fn test_counters_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        sidecar(
            dir.path(),
            "n1",
            "a.json",
            r#"{"cmpltexp": 2, "nexp": 4, "dprtype": "DARK_DARK"}"#,
        );

        let headers = SidecarHeaders::new(dir.path());
        let exposure = Exposure::new("n1", "a.fits");
        assert_eq!(
            headers.sequence_counters(&exposure),
            Some(SequenceCounters::new(2, 4))
        );
        assert_eq!(
            headers.classify(&exposure),
            ExposureClass::Calibration(CalibrationType::DarkDark)
        );
    }

    #[test]
    fn test_missing_sidecar_degrades_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let headers = SidecarHeaders::new(dir.path());
        let exposure = Exposure::new("n1", "a.fits");
        assert_eq!(headers.sequence_counters(&exposure), None);
        assert_eq!(headers.classify(&exposure), ExposureClass::Unknown);
    }

    #[test]
    fn test_partial_counters_are_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        sidecar(dir.path(), "n1", "a.json", r#"{"cmpltexp": 2}"#);

        let headers = SidecarHeaders::new(dir.path());
        assert_eq!(
            headers.sequence_counters(&Exposure::new("n1", "a.fits")),
            None
        );
    }

    #[test]
    fn test_object_and_unknown_dprtypes() {
        assert_eq!(classify_dprtype("OBJ_FP"), ExposureClass::Object);
        assert_eq!(classify_dprtype("OBJ_DARK"), ExposureClass::Object);
        assert_eq!(classify_dprtype("SOMETHING_ELSE"), ExposureClass::Unknown);
    }
}
