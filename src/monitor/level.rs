//! Mesure du niveau crête

/// Pleine échelle d'un échantillon signé 16 bits
const FULL_SCALE: f32 = 32768.0;

/// Volume d'un bloc en pourcentage de la pleine échelle, pondéré par la sensibilité
///
/// Prend le plus grand échantillon signé puis sa valeur absolue: un bloc dont
/// l'excursion la plus forte est négative donne un niveau faible. Un bloc vide donne 0.
pub fn peak_level(samples: &[i16], sensitivity: f32) -> f32 {
    let peak = samples
        .iter()
        .copied()
        .max()
        .map(i16::unsigned_abs)
        .unwrap_or(0);

    peak as f32 * sensitivity / FULL_SCALE * 100.0
}
