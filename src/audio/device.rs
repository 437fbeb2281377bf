//! Descripteurs des périphériques d'entrée

use std::fmt;

/// Périphérique d'entrée audio tel que listé par la plateforme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    /// Position du périphérique dans la liste de l'hôte
    pub index: usize,
    /// Nom lisible
    pub name: String,
}

impl InputDevice {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.name)
    }
}
