//! Phase calibration and piezoresponse.
//!
//! Raw phases are corrected onto the user pair `(pha_fwd, pha_rev)` from the
//! peaks of a circular histogram, then projected with the amplitude into a
//! signed piezoresponse. Phases are in degrees; radian sources are converted
//! before they reach this module.

pub mod calibration;
mod histogram;

pub use calibration::{
    find_peaks, is_counterclockwise, piezoresponse, polarity, PeakMethod, PhaFunc,
    PhaseCalibration, PhaseCorrection, PhaseOptions, PhasePeaks,
};
