//! Front-end console, une commande par ligne

use super::{ControlError, ControlSurface, StatusResponse};
use crate::monitor::MonitorEvent;
use std::str::FromStr;

pub const HELP: &str = "\
Commandes:
  devices            liste les périphériques d'entrée
  select <index>     choisit le périphérique d'entrée
  sensitivity <0-1>  pondère le niveau mesuré
  threshold <n>      alerte au-dessus de ce niveau
  start              démarre la surveillance
  stop               arrête la surveillance
  status             affiche les réglages et le niveau actuel
  help               affiche cette aide
  quit               arrête et quitte";

/// Commande console analysée
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Devices,
    Select(usize),
    Sensitivity(f32),
    Threshold(String),
    Start,
    Stop,
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (name, args) = match words.split_first() {
            Some((name, args)) => (name.to_lowercase(), args),
            None => return Err("Commande vide".to_string()),
        };

        let command = match name.as_str() {
            "devices" | "list" => ConsoleCommand::Devices,
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "select" | "device" | "sensitivity" | "threshold" | "peak" => {
                return parse_with_argument(&name, args);
            }
            other => return Err(format!("Commande inconnue: {} (essayez 'help')", other)),
        };

        if !args.is_empty() {
            return Err(format!("'{}' ne prend pas d'argument", name));
        }
        Ok(command)
    }
}

fn parse_with_argument(name: &str, args: &[&str]) -> Result<ConsoleCommand, String> {
    let arg = match args {
        [arg] => *arg,
        [] => return Err(format!("'{}' attend une valeur", name)),
        _ => return Err(format!("'{}' attend une seule valeur", name)),
    };

    match name {
        "select" | "device" => arg
            .parse()
            .map(ConsoleCommand::Select)
            .map_err(|_| format!("Index de périphérique invalide: {}", arg)),
        "sensitivity" => match arg.parse::<f32>() {
            // Contrairement à un curseur, la saisie n'est pas bornée
            Ok(value) if value.is_finite() => Ok(ConsoleCommand::Sensitivity(value.clamp(0.0, 1.0))),
            _ => Err(format!("Sensibilité invalide: {}", arg)),
        },
        _ => Ok(ConsoleCommand::Threshold(arg.to_string())),
    }
}

/// Ce que le front-end fait après une commande
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue(String),
    Quit,
}

/// Exécute une commande sur la surface de contrôle
pub async fn execute(
    surface: &mut ControlSurface,
    command: ConsoleCommand,
) -> Result<Flow, ControlError> {
    let output = match command {
        ConsoleCommand::Devices => render_devices(surface),
        ConsoleCommand::Select(index) => {
            let device = surface.select_device(index).await?;
            format!("Périphérique sélectionné: {}", device)
        }
        ConsoleCommand::Sensitivity(value) => {
            surface.set_sensitivity(value).await;
            format!("Sensibilité: {:.2}", value)
        }
        ConsoleCommand::Threshold(input) => {
            let threshold = surface.set_threshold(&input).await?;
            format!("Seuil: {}", threshold)
        }
        ConsoleCommand::Start => {
            surface.start().await?;
            "Surveillance démarrée".to_string()
        }
        ConsoleCommand::Stop => {
            if surface.stop().await {
                "Surveillance arrêtée".to_string()
            } else {
                "Surveillance inactive".to_string()
            }
        }
        ConsoleCommand::Status => render_status(&surface.status().await),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => return Ok(Flow::Quit),
    };
    Ok(Flow::Continue(output))
}

pub fn render_devices(surface: &ControlSurface) -> String {
    let devices = surface.list_devices();
    if devices.is_empty() {
        return "Aucun périphérique d'entrée trouvé".to_string();
    }
    devices
        .iter()
        .map(|device| format!("  {}", device))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_status(status: &StatusResponse) -> String {
    let device = status
        .device
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "aucun".to_string());
    format!(
        "Périphérique: {}\nSensibilité: {:.2}\nSeuil: {}\n{}\nSurveillance: {}{}",
        device,
        status.sensitivity,
        status.threshold,
        render_level(status.level),
        if status.monitoring { "oui" } else { "non" },
        if status.cooldown_active { " (pause)" } else { "" },
    )
}

pub fn render_level(level: f32) -> String {
    format!("Niveau actuel: {:.2}", level)
}

/// Texte affiché pour une notification, `None` pour celles qui restent muettes
pub fn render_event(event: &MonitorEvent) -> Option<String> {
    match event {
        MonitorEvent::Started { device } => Some(format!("Écoute du périphérique {}", device)),
        MonitorEvent::Level(level) => Some(render_level(*level)),
        MonitorEvent::Alert { level } => Some(format!("Trop fort ! ({:.2})", level)),
        MonitorEvent::CooldownEnded => None,
        MonitorEvent::Failed(reason) => Some(format!("Échec de la surveillance: {}", reason)),
        MonitorEvent::Stopped => Some("Surveillance arrêtée".to_string()),
    }
}
