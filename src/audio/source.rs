//! Traits entre le moniteur et le sous-système audio de la plateforme

use super::{AudioConfig, InputDevice, MicrophoneError};

/// Stream d'entrée actif livrant des échantillons i16 mono
///
/// Le drop de la source ferme le stream sous-jacent.
pub trait SampleSource {
    /// Bloque jusqu'à ce que `block` soit entièrement rempli
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), MicrophoneError>;
}

/// Sous-système audio de la plateforme
#[cfg_attr(test, mockall::automock)]
pub trait AudioBackend: Send + Sync {
    /// Liste les périphériques ayant au moins un canal d'entrée
    ///
    /// Retourne une liste vide si le sous-système ne remonte rien.
    fn input_devices(&self) -> Vec<InputDevice>;

    /// Ouvre un stream d'entrée sur le périphérique d'index donné
    ///
    /// Appelé depuis le thread de surveillance, qui possède ensuite le stream.
    fn open_input(
        &self,
        device: usize,
        config: &AudioConfig,
    ) -> Result<Box<dyn SampleSource>, MicrophoneError>;
}
