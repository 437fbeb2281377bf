//! Capture audio depuis le microphone
//!
//! Utilise cpal pour la capture cross-platform et ringbuf pour transmettre
//! les échantillons du callback audio au thread de surveillance.

use super::{AudioBackend, InputDevice, SampleSource};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};
use ringbuf::{traits::*, HeapRb};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Configuration audio pour la capture
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Taux d'échantillonnage demandé au périphérique
    pub sample_rate: u32,
    /// Nombre de canaux livrés au moniteur (1 = mono)
    pub channels: u16,
    /// Taille d'un bloc en échantillons
    pub block_size: usize,
    /// Attente maximale d'un bloc complet avant d'abandonner le périphérique
    pub read_timeout: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            block_size: 1024,
            read_timeout: Duration::from_secs(2),
        }
    }
}

impl AudioConfig {
    /// Durée couverte par un bloc
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Erreurs liées à la capture microphone
#[derive(Error, Debug)]
pub enum MicrophoneError {
    #[error("Périphérique audio {0} introuvable")]
    DeviceNotFound(usize),

    #[error("Erreur de configuration: {0}")]
    ConfigError(String),

    #[error("Erreur de stream: {0}")]
    StreamError(String),

    #[error("Aucun audio reçu depuis {0:?}")]
    Timeout(Duration),
}

/// Intervalle de scrutation en attendant que le callback remplisse un bloc
const READ_POLL: Duration = Duration::from_millis(5);

/// Blocs conservés dans le ring buffer avant que le callback ne jette des échantillons
const RING_BLOCKS: usize = 8;

/// Erreur signalée par le callback d'erreur cpal
type FailureSlot = Arc<Mutex<Option<String>>>;

/// Sous-système audio basé sur l'hôte cpal par défaut
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn input_devices(&self) -> Vec<InputDevice> {
        let host = cpal::default_host();
        host.devices()
            .map(|devices| {
                devices
                    .enumerate()
                    .filter(|(_, device)| has_input(device))
                    .map(|(index, device)| {
                        let name = device
                            .name()
                            .unwrap_or_else(|_| format!("Périphérique inconnu {}", index));
                        InputDevice::new(index, name)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn open_input(
        &self,
        device: usize,
        config: &AudioConfig,
    ) -> Result<Box<dyn SampleSource>, MicrophoneError> {
        let input = MicrophoneInput::open(device, config)?;
        Ok(Box::new(input))
    }
}

fn has_input(device: &Device) -> bool {
    device
        .supported_input_configs()
        .map(|mut configs| configs.next().is_some())
        .unwrap_or(false)
}

/// Lecture bloquante de blocs depuis le ring buffer alimenté par le callback
pub struct BlockReader {
    consumer: ringbuf::HeapCons<i16>,
    failure: FailureSlot,
    read_timeout: Duration,
}

impl BlockReader {
    pub fn new(consumer: ringbuf::HeapCons<i16>, failure: FailureSlot, read_timeout: Duration) -> Self {
        Self {
            consumer,
            failure,
            read_timeout,
        }
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl SampleSource for BlockReader {
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), MicrophoneError> {
        // Garder un niveau à jour: jeter ce qui s'est accumulé pendant la pause
        let stale = self.consumer.occupied_len().saturating_sub(block.len());
        if stale > 0 {
            self.consumer.skip(stale);
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;
        while filled < block.len() {
            filled += self.consumer.pop_slice(&mut block[filled..]);
            if filled == block.len() {
                break;
            }
            if let Some(message) = self.take_failure() {
                return Err(MicrophoneError::StreamError(message));
            }
            if Instant::now() >= deadline {
                return Err(MicrophoneError::Timeout(self.read_timeout));
            }
            std::thread::sleep(READ_POLL);
        }
        Ok(())
    }
}

/// Stream d'entrée sur un périphérique, possédé par le thread de surveillance
pub struct MicrophoneInput {
    stream: Stream,
    reader: BlockReader,
}

impl MicrophoneInput {
    /// Ouvre et démarre un stream mono i16 sur le périphérique `index`
    pub fn open(index: usize, config: &AudioConfig) -> Result<Self, MicrophoneError> {
        let host = cpal::default_host();
        let mut devices = host
            .devices()
            .map_err(|e| MicrophoneError::ConfigError(e.to_string()))?;
        let device = devices
            .nth(index)
            .ok_or(MicrophoneError::DeviceNotFound(index))?;

        tracing::info!("Périphérique audio: {:?}", device.name());

        let supported = choose_config(&device, config)?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        tracing::info!(
            "Config audio: {}Hz {}ch {:?} -> mono i16, {} échantillons par bloc ({:?})",
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format,
            config.block_size,
            config.block_duration()
        );

        let rb = HeapRb::<i16>::new(config.block_size.max(1) * RING_BLOCKS);
        let (producer, consumer) = rb.split();
        let failure: FailureSlot = Arc::new(Mutex::new(None));

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, producer, failure.clone())
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, producer, failure.clone())
            }
            SampleFormat::I32 => {
                build_stream::<i32>(&device, &stream_config, producer, failure.clone())
            }
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, producer, failure.clone())
            }
            other => Err(MicrophoneError::ConfigError(format!(
                "Format d'échantillon non supporté: {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| MicrophoneError::StreamError(e.to_string()))?;

        tracing::info!("Capture audio démarrée");

        Ok(Self {
            stream,
            reader: BlockReader::new(consumer, failure, config.read_timeout),
        })
    }
}

impl SampleSource for MicrophoneInput {
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), MicrophoneError> {
        self.reader.read_block(block)
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("Impossible de mettre le stream en pause: {}", e);
        }
        tracing::info!("Capture audio arrêtée");
    }
}

/// Choisit une configuration supportée contenant le taux demandé,
/// en préférant les échantillons i16 et le nombre de canaux le plus proche
fn choose_config(
    device: &Device,
    config: &AudioConfig,
) -> Result<SupportedStreamConfig, MicrophoneError> {
    let target = SampleRate(config.sample_rate);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| MicrophoneError::ConfigError(e.to_string()))?;

    let best = ranges
        .filter(|range| range.min_sample_rate() <= target && target <= range.max_sample_rate())
        .min_by_key(|range| {
            (
                range.sample_format() != SampleFormat::I16,
                range.channels().abs_diff(config.channels),
            )
        })
        .map(|range| range.with_sample_rate(target));

    match best {
        Some(supported) => Ok(supported),
        None => {
            tracing::warn!(
                "{}Hz non supporté par le périphérique, utilisation de sa configuration par défaut",
                config.sample_rate
            );
            device
                .default_input_config()
                .map_err(|e| MicrophoneError::ConfigError(e.to_string()))
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: ringbuf::HeapProd<i16>,
    failure: FailureSlot,
) -> Result<Stream, MicrophoneError>
where
    T: SizedSample + Send + 'static,
    i16: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let _ = producer.try_push(downmix(frame));
                }
            },
            move |err| {
                tracing::error!("Erreur stream audio: {}", err);
                if let Ok(mut slot) = failure.lock() {
                    *slot = Some(err.to_string());
                }
            },
            None,
        )
        .map_err(|e| MicrophoneError::StreamError(e.to_string()))
}

/// Moyenne d'une trame entrelacée en un seul échantillon i16
fn downmix<T>(frame: &[T]) -> i16
where
    T: Sample,
    i16: FromSample<T>,
{
    if frame.is_empty() {
        return 0;
    }
    let sum: i32 = frame
        .iter()
        .map(|&sample| i16::from_sample(sample) as i32)
        .sum();
    (sum / frame.len() as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(capacity: usize, timeout: Duration) -> (ringbuf::HeapProd<i16>, BlockReader, FailureSlot) {
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let failure: FailureSlot = Arc::new(Mutex::new(None));
        let reader = BlockReader::new(consumer, failure.clone(), timeout);
        (producer, reader, failure)
    }

    #[test]
    fn default_config_matches_reference_stream() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 1024);
    }

    #[test]
    fn block_duration_is_about_23ms() {
        let millis = AudioConfig::default().block_duration().as_secs_f64() * 1000.0;
        assert!((millis - 23.22).abs() < 0.01, "got {}", millis);
    }

    #[test]
    fn reads_a_full_block() {
        let (mut producer, mut reader, _) = reader(16, Duration::from_millis(200));
        producer.push_slice(&[1, 2, 3, 4]);

        let mut block = [0i16; 4];
        reader.read_block(&mut block).unwrap();
        assert_eq!(block, [1, 2, 3, 4]);
    }

    #[test]
    fn short_fill_times_out() {
        let timeout = Duration::from_millis(50);
        let (mut producer, mut reader, _) = reader(16, timeout);
        producer.push_slice(&[1, 2]);

        let started = Instant::now();
        let mut block = [0i16; 4];
        let result = reader.read_block(&mut block);

        assert!(matches!(result, Err(MicrophoneError::Timeout(d)) if d == timeout));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout, "returned after {:?}", elapsed);
        assert!(elapsed < timeout * 10, "returned after {:?}", elapsed);
    }

    #[test]
    fn callback_failure_becomes_stream_error() {
        let (_producer, mut reader, failure) = reader(16, Duration::from_secs(5));
        *failure.lock().unwrap() = Some("périphérique débranché".to_string());

        let mut block = [0i16; 4];
        let result = reader.read_block(&mut block);
        assert!(matches!(result, Err(MicrophoneError::StreamError(msg)) if msg.contains("débranché")));
        assert!(failure.lock().unwrap().is_none());
    }

    #[test]
    fn backlog_is_dropped_and_newest_block_kept() {
        let (mut producer, mut reader, _) = reader(16, Duration::from_millis(200));
        producer.push_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut block = [0i16; 4];
        reader.read_block(&mut block).unwrap();
        assert_eq!(block, [9, 10, 11, 12]);
    }

    #[test]
    fn block_arriving_in_pieces_is_assembled() {
        let (mut producer, mut reader, _) = reader(16, Duration::from_secs(2));
        producer.push_slice(&[1, 2]);

        let feeder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push_slice(&[3]);
            std::thread::sleep(Duration::from_millis(20));
            producer.push_slice(&[4, 5]);
            producer
        });

        let mut block = [0i16; 5];
        reader.read_block(&mut block).unwrap();
        assert_eq!(block, [1, 2, 3, 4, 5]);
        feeder.join().unwrap();
    }

    #[test]
    fn downmix_passes_mono_through() {
        assert_eq!(downmix(&[1234i16]), 1234);
        assert_eq!(downmix(&[i16::MIN]), i16::MIN);
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        assert_eq!(downmix(&[1000i16, 3000]), 2000);
        assert_eq!(downmix(&[i16::MAX, i16::MAX]), i16::MAX);
    }

    #[test]
    fn downmix_converts_float_samples() {
        assert_eq!(downmix(&[0.0f32, 0.0]), 0);
        assert!(downmix(&[0.5f32, 0.5]) > 16000);
        assert!(downmix(&[-0.5f32]) < -16000);
    }

    #[test]
    fn downmix_of_empty_frame_is_silence() {
        let empty: [i16; 0] = [];
        assert_eq!(downmix(&empty), 0);
    }
}
