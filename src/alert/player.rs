//! Lecture de l'alerte
//!
//! Chaque alerte confie le fichier son au lecteur en ligne de commande de la
//! plateforme, dans un processus enfant: le cycle de surveillance n'attend
//! jamais la fin de la lecture.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Configuration de la lecture du son
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Fichier son, relatif au répertoire courant
    pub sound_path: PathBuf,
    /// Exécutable du lecteur suivi de ses arguments; le chemin du son est ajouté à la fin
    pub player: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sound_path: PathBuf::from("beep.mp3"),
            player: default_player(),
        }
    }
}

#[cfg(target_os = "macos")]
fn default_player() -> Vec<String> {
    vec!["afplay".to_string()]
}

#[cfg(not(target_os = "macos"))]
fn default_player() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

/// Erreurs de lecture de l'alerte
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Fichier son introuvable: {0}")]
    SoundNotFound(String),

    #[error("Impossible de lancer le lecteur audio: {0}")]
    Spawn(String),
}

/// Ce qui produit le son d'alerte
///
/// `play` doit rendre la main immédiatement: il est appelé depuis le cycle de surveillance.
#[cfg_attr(test, mockall::automock)]
pub trait AlertPlayer: Send + Sync {
    /// Lance le son d'alerte sans attendre sa fin
    fn play(&self) -> Result<(), AlertError>;

    /// Coupe un son encore en cours (fermeture de l'application)
    fn silence(&self);

    /// Description courte pour les logs
    fn describe(&self) -> String;
}

/// Joue un fichier son via un processus lecteur externe
#[derive(Debug)]
pub struct SoundFile {
    path: PathBuf,
    player: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl SoundFile {
    /// Vérifie que le fichier existe avant de l'accepter
    pub fn load(path: impl AsRef<Path>, player: Vec<String>) -> Result<Self, AlertError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AlertError::SoundNotFound(path.display().to_string()));
        }
        if player.is_empty() {
            return Err(AlertError::Spawn("aucune commande de lecteur configurée".to_string()));
        }

        tracing::info!("Son d'alerte: {} (lecteur: {})", path.display(), player[0]);

        Ok(Self {
            path: path.to_path_buf(),
            player,
            current: Mutex::new(None),
        })
    }

    /// Ligne de commande complète d'une lecture
    fn command_line(&self) -> Vec<String> {
        let mut args = self.player.clone();
        args.push(self.path.display().to_string());
        args
    }

    /// Vrai tant que le dernier lecteur lancé tourne encore
    fn is_playing(&self) -> bool {
        self.current
            .lock()
            .ok()
            .and_then(|mut slot| slot.as_mut().map(|child| matches!(child.try_wait(), Ok(None))))
            .unwrap_or(false)
    }
}

/// Arrête un lecteur et récupère son statut de sortie
fn end_child(mut child: Child) {
    if matches!(child.try_wait(), Ok(None)) {
        if let Err(e) = child.kill() {
            tracing::warn!("Impossible d'arrêter le lecteur audio: {}", e);
        }
    }
    if let Err(e) = child.wait() {
        tracing::warn!("Erreur d'attente du lecteur audio: {}", e);
    }
}

impl AlertPlayer for SoundFile {
    fn play(&self) -> Result<(), AlertError> {
        let args = self.command_line();
        let child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AlertError::Spawn(format!("{}: {}", args[0], e)))?;

        // Le nouveau son remplace le précédent
        let previous = match self.current.lock() {
            Ok(mut slot) => slot.replace(child),
            Err(_) => Some(child),
        };
        if let Some(previous) = previous {
            end_child(previous);
        }

        Ok(())
    }

    fn silence(&self) {
        let child = self.current.lock().ok().and_then(|mut slot| slot.take());
        if let Some(child) = child {
            end_child(child);
            tracing::debug!("Lecteur audio arrêté");
        }
    }

    fn describe(&self) -> String {
        format!("fichier son {}", self.path.display())
    }
}

impl Drop for SoundFile {
    fn drop(&mut self) {
        self.silence();
    }
}

/// Fait sonner la cloche du terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AlertPlayer for TerminalBell {
    fn play(&self) -> Result<(), AlertError> {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
        Ok(())
    }

    fn silence(&self) {}

    fn describe(&self) -> String {
        "cloche du terminal".to_string()
    }
}

/// Construit le lecteur configuré, ou la cloche du terminal si le fichier son
/// est inutilisable
pub fn player_from_config(config: &AlertConfig) -> Arc<dyn AlertPlayer> {
    match SoundFile::load(&config.sound_path, config.player.clone()) {
        Ok(sound) => Arc::new(sound),
        Err(e) => {
            tracing::warn!("{}, les alertes utiliseront la cloche du terminal", e);
            Arc::new(TerminalBell)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn temp_sound(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "stop-yelling-{}-{}.mp3",
            name,
            std::process::id()
        ));
        std::fs::write(&path, b"ID3").expect("write temp sound");
        path
    }

    #[test]
    fn load_rejects_missing_file() {
        let result = SoundFile::load("definitely/not/here.mp3", default_player());
        assert!(matches!(result, Err(AlertError::SoundNotFound(_))));
    }

    #[test]
    fn load_rejects_empty_player() {
        let path = temp_sound("empty-player");
        let result = SoundFile::load(&path, Vec::new());
        assert!(matches!(result, Err(AlertError::Spawn(_))));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn command_line_appends_sound_path() {
        let path = temp_sound("command-line");
        let sound = SoundFile::load(&path, vec!["player".into(), "-q".into()]).unwrap();
        assert_eq!(
            sound.command_line(),
            vec!["player".to_string(), "-q".to_string(), path.display().to_string()]
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn play_reports_missing_player_binary() {
        let path = temp_sound("missing-binary");
        let sound = SoundFile::load(&path, vec!["no-such-player-binary-xyz".into()]).unwrap();
        assert!(matches!(sound.play(), Err(AlertError::Spawn(_))));
        let _ = std::fs::remove_file(path);
    }

    // `sh -c 'sleep 5' beep <fichier>` joue un "son" de cinq secondes
    #[cfg(unix)]
    fn long_sound(name: &str) -> (SoundFile, PathBuf) {
        let path = temp_sound(name);
        let player = vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 5".to_string(),
            "beep".to_string(),
        ];
        (SoundFile::load(&path, player).unwrap(), path)
    }

    #[cfg(unix)]
    #[test]
    fn silence_kills_sound_still_playing() {
        let (sound, path) = long_sound("silence");
        sound.play().unwrap();
        assert!(sound.is_playing());

        let started = Instant::now();
        sound.silence();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!sound.is_playing());

        sound.silence();
        let _ = std::fs::remove_file(path);
    }

    #[cfg(unix)]
    #[test]
    fn new_alert_replaces_previous_sound() {
        let (sound, path) = long_sound("replace");
        let started = Instant::now();
        sound.play().unwrap();
        sound.play().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(sound.is_playing());

        drop(sound);
        assert!(started.elapsed() < Duration::from_secs(4));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_asset_falls_back_to_bell() {
        let config = AlertConfig {
            sound_path: PathBuf::from("definitely/not/here.mp3"),
            ..Default::default()
        };
        let player = player_from_config(&config);
        assert_eq!(player.describe(), "cloche du terminal");
        assert!(player.play().is_ok());
        player.silence();
    }

    #[test]
    fn default_config_points_at_beep() {
        let config = AlertConfig::default();
        assert_eq!(config.sound_path, PathBuf::from("beep.mp3"));
        assert!(!config.player.is_empty());
    }
}
