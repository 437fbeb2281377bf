//! Module de capture audio
//!
//! Liste les périphériques d'entrée et lit des blocs i16 de taille fixe.

mod device;
mod microphone;
mod source;
#[cfg(test)]
pub mod testing;

pub use device::InputDevice;
pub use microphone::{AudioConfig, CpalBackend, MicrophoneError};
pub use source::{AudioBackend, SampleSource};

#[cfg(test)]
pub use source::MockAudioBackend;
