use std::sync::Arc;

use imp_audio::{AudioOutput, CpalOutput, OutputConfig};
use imp_engine::{Mixer, NoCommands, PlaybackPosition, SeekError, Sequencer, StateUpdate, Transport};
use imp_formats::LoadWarning;
use imp_ir::Module;

use crate::player::Player;
use crate::{wav, PlayerConfig, PlayerError};

/// Frames rendered per pass when bouncing offline.
const RENDER_BLOCK: usize = 4096;

/// Headless player: owns a loaded module and, while started, an open
/// audio output.
pub struct Controller {
    module: Arc<Module>,
    warnings: Vec<LoadWarning>,
    config: PlayerConfig,
    session: Option<Session>,
}

struct Session {
    player: Player,
    output: CpalOutput,
}

impl Controller {
    /// Parse a module file of any supported dialect.
    pub fn load(data: &[u8], config: PlayerConfig) -> Result<Self, PlayerError> {
        config.validate()?;
        let report = imp_formats::load_with_report(data)?;
        tracing::info!(
            title = report.module.title(),
            format = report.module.format().name(),
            warnings = report.warnings.len(),
            "module loaded"
        );
        Ok(Self {
            module: Arc::new(report.module),
            warnings: report.warnings,
            config,
            session: None,
        })
    }

    pub fn new(module: Module, config: PlayerConfig) -> Result<Self, PlayerError> {
        config.validate()?;
        Ok(Self { module: Arc::new(module), warnings: Vec::new(), config, session: None })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Damage repaired while loading.
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // --- Real-time playback ---

    /// Open the audio output if needed and start playing.
    pub fn start(&mut self) -> Result<(), PlayerError> {
        if let Some(session) = self.session.as_mut() {
            session.output.start()?;
            return session.player.play();
        }

        let (mut player, source) = Player::new(Arc::clone(&self.module), self.config)?;
        let output_config = OutputConfig {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        };
        let mut output = CpalOutput::open(output_config, source)?;
        player.play()?;
        output.start()?;
        self.session = Some(Session { player, output });
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlayerError> {
        match self.session.as_mut() {
            Some(session) => session.player.pause(),
            None => Ok(()),
        }
    }

    pub fn resume(&mut self) -> Result<(), PlayerError> {
        match self.session.as_mut() {
            Some(session) => session.player.play(),
            None => Ok(()),
        }
    }

    /// Rewind to the start. The output stays open.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        match self.session.as_mut() {
            Some(session) => session.player.stop(),
            None => Ok(()),
        }
    }

    pub fn seek(&mut self, order: u16, row: u16) -> Result<(), PlayerError> {
        match self.session.as_mut() {
            Some(session) => session.player.seek(order, row),
            None => Err(SeekError::InvalidState.into()),
        }
    }

    /// Drain pending state updates.
    pub fn poll(&mut self) -> Vec<StateUpdate> {
        self.session
            .as_mut()
            .map(|session| session.player.updates().collect())
            .unwrap_or_default()
    }

    pub fn position(&self) -> Option<PlaybackPosition> {
        self.session.as_ref().and_then(|session| session.player.latest())
    }

    pub fn transport(&self) -> Transport {
        self.session
            .as_ref()
            .map_or(Transport::Stopped, |session| session.player.transport())
    }

    pub fn is_finished(&self) -> bool {
        self.transport() == Transport::Finished
    }

    /// Updates lost because nobody polled in time.
    pub fn dropped_updates(&self) -> u64 {
        self.session.as_ref().map_or(0, |session| session.player.dropped_updates())
    }

    /// Close the audio output. Playback state is discarded.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::info!("playback closed");
        }
    }

    // --- Offline rendering ---

    /// Render the song from the start until it finishes or `max_seconds`
    /// of audio exist, as interleaved PCM.
    pub fn render(&self, max_seconds: u32) -> Vec<i16> {
        let channels = self.config.channels as usize;
        let max_frames = self.config.sample_rate as usize * max_seconds as usize;

        let mut sequencer = Sequencer::new(Arc::clone(&self.module), self.config.sample_rate);
        sequencer.set_master_volume(self.config.master_gain());
        sequencer.play(&mut ());
        let mut mixer = Mixer::new(sequencer, self.config.channels);

        let mut pcm = Vec::new();
        let mut block = vec![0i16; RENDER_BLOCK * channels];
        while pcm.len() < max_frames * channels {
            let frames = RENDER_BLOCK.min(max_frames - pcm.len() / channels);
            let produced = mixer.render(&mut block[..frames * channels], &mut NoCommands, &mut ());
            pcm.extend_from_slice(&block[..produced * channels]);
            if produced < frames {
                break;
            }
        }
        tracing::debug!(
            frames = pcm.len() / channels,
            ticks = mixer.ticks_elapsed(),
            finished = mixer.sequencer().transport() == Transport::Finished,
            "offline render done"
        );
        pcm
    }

    pub fn render_to_wav(&self, max_seconds: u32) -> Vec<u8> {
        let pcm = self.render(max_seconds);
        wav::samples_to_wav(&pcm, self.config.channels, self.config.sample_rate)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.close();
    }
}
