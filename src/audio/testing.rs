//! Sources audio scriptées pour les tests

use super::{InputDevice, MicrophoneError, MockAudioBackend, SampleSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Source produisant des blocs identiques avec un seul échantillon crête
pub struct ScriptedSource {
    peak: i16,
    fail_after: Option<usize>,
    reads: usize,
    drops: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(peak: i16, fail_after: Option<usize>, drops: Arc<AtomicUsize>) -> Self {
        Self {
            peak,
            fail_after,
            reads: 0,
            drops,
        }
    }
}

impl SampleSource for ScriptedSource {
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), MicrophoneError> {
        if self.fail_after.is_some_and(|limit| self.reads >= limit) {
            return Err(MicrophoneError::StreamError("périphérique débranché".to_string()));
        }
        self.reads += 1;
        block.fill(0);
        if let Some(first) = block.first_mut() {
            *first = self.peak;
        }
        Ok(())
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Périphériques remontés par [`scripted_backend`]
pub fn scripted_devices() -> Vec<InputDevice> {
    vec![
        InputDevice::new(0, "Built-in Microphone"),
        InputDevice::new(2, "USB Headset"),
    ]
}

/// Backend listant [`scripted_devices`] et ouvrant des [`ScriptedSource`]
pub fn scripted_backend(
    peak: i16,
    fail_after: Option<usize>,
    drops: Arc<AtomicUsize>,
) -> MockAudioBackend {
    let mut backend = MockAudioBackend::new();
    backend.expect_input_devices().returning(scripted_devices);
    backend.expect_open_input().returning(move |_, _| {
        Ok(Box::new(ScriptedSource::new(peak, fail_after, Arc::clone(&drops))) as Box<dyn SampleSource>)
    });
    backend
}
