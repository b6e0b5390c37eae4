pub mod analyser;
pub mod capture;
pub mod decoder;
pub mod encoder;
pub mod playback;
pub mod resample;
