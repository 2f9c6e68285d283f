//! Cross-thread playback: a control-side [`Player`] handle and the
//! audio-side [`PlaybackSource`] it talks to.
//!
//! Commands and updates travel through two bounded SPSC rings. Neither side
//! ever waits on the other: a full command ring is reported to the caller,
//! and a full update ring drops the update. A single-word mailbox always
//! holds the newest position and transport, so a slow reader never loses
//! track of where playback is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use imp_audio::PcmSource;
use imp_engine::{
    Command, CommandSource, Mixer, PlaybackPosition, SeekError, Sequencer, StateSink, StateUpdate,
    Transport,
};
use imp_ir::{Module, OrderEntry};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::{PlayerConfig, PlayerError};

const TRANSPORT_SHIFT: u32 = 48;
const HAS_POSITION: u64 = 1 << 63;
const POSITION_MASK: u64 = (1 << TRANSPORT_SHIFT) - 1;

fn transport_code(transport: Transport) -> u64 {
    match transport {
        Transport::Stopped => 0,
        Transport::Playing => 1,
        Transport::Paused => 2,
        Transport::Finished => 3,
    }
}

fn transport_from_code(code: u64) -> Transport {
    match code & 0xFF {
        1 => Transport::Playing,
        2 => Transport::Paused,
        3 => Transport::Finished,
        _ => Transport::Stopped,
    }
}

/// State shared by both halves.
#[derive(Debug, Default)]
struct Shared {
    /// Position in the low 48 bits, transport above, `HAS_POSITION` on top.
    mailbox: AtomicU64,
    dropped: AtomicU64,
}

/// Control-side handle. Every method returns immediately.
pub struct Player {
    module: Arc<Module>,
    commands: HeapProd<Command>,
    updates: HeapCons<StateUpdate>,
    shared: Arc<Shared>,
    requested: Transport,
}

impl Player {
    /// Create a player and the source an audio callback should pull from.
    pub fn new(
        module: Arc<Module>,
        config: PlayerConfig,
    ) -> Result<(Player, PlaybackSource), PlayerError> {
        config.validate()?;

        let (command_tx, command_rx) = HeapRb::<Command>::new(config.command_capacity).split();
        let (update_tx, update_rx) = HeapRb::<StateUpdate>::new(config.update_capacity).split();
        let shared = Arc::new(Shared::default());

        let mut sequencer = Sequencer::new(Arc::clone(&module), config.sample_rate);
        sequencer.set_master_volume(config.master_gain());
        let source = PlaybackSource {
            mixer: Mixer::new(sequencer, config.channels),
            commands: CommandReceiver(command_rx),
            updates: UpdateSender { producer: update_tx, shared: Arc::clone(&shared) },
        };

        tracing::debug!(
            title = module.title(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "player created"
        );
        let player = Player {
            module,
            commands: command_tx,
            updates: update_rx,
            shared,
            requested: Transport::Stopped,
        };
        Ok((player, source))
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.send(Command::Play)?;
        self.requested = Transport::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlayerError> {
        self.send(Command::Pause)?;
        self.requested = Transport::Paused;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), PlayerError> {
        self.send(Command::Stop)?;
        self.requested = Transport::Stopped;
        Ok(())
    }

    /// Queue a jump to `row` of order entry `order`.
    ///
    /// Checked here against the module and the last requested transport, so
    /// a refused seek never reaches the audio thread.
    pub fn seek(&mut self, order: u16, row: u16) -> Result<(), PlayerError> {
        if self.requested == Transport::Stopped || self.transport() == Transport::Finished {
            return Err(SeekError::InvalidState.into());
        }
        let out_of_range = SeekError::OutOfRange { order, row };
        let rows = match self.module.order.get(order as usize) {
            Some(&OrderEntry::Pattern(p)) => self.module.num_rows(p as usize),
            _ => None,
        };
        match rows {
            Some(rows) if row < rows => self.send(Command::Seek { order, row }),
            _ => Err(out_of_range.into()),
        }
    }

    /// Pending updates, oldest first.
    pub fn updates(&mut self) -> impl Iterator<Item = StateUpdate> + '_ {
        std::iter::from_fn(move || self.updates.try_pop())
    }

    /// The newest row published, if any row has played since the last stop.
    pub fn latest(&self) -> Option<PlaybackPosition> {
        let word = self.shared.mailbox.load(Ordering::Acquire);
        (word & HAS_POSITION != 0).then(|| PlaybackPosition::unpack(word & POSITION_MASK))
    }

    /// The newest transport published by the audio side.
    pub fn transport(&self) -> Transport {
        transport_from_code(self.shared.mailbox.load(Ordering::Acquire) >> TRANSPORT_SHIFT)
    }

    /// Updates discarded because the update ring was full.
    pub fn dropped_updates(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn send(&mut self, command: Command) -> Result<(), PlayerError> {
        self.commands.try_push(command).map_err(|_| PlayerError::QueueFull)
    }
}

struct CommandReceiver(HeapCons<Command>);

impl CommandSource for CommandReceiver {
    fn next_command(&mut self) -> Option<Command> {
        self.0.try_pop()
    }
}

struct UpdateSender {
    producer: HeapProd<StateUpdate>,
    shared: Arc<Shared>,
}

impl StateSink for UpdateSender {
    fn publish(&mut self, update: StateUpdate) {
        // Only this side writes the mailbox, so load-modify-store is enough.
        let word = self.shared.mailbox.load(Ordering::Relaxed);
        let word = match update {
            StateUpdate::Position(position) => {
                (word & !POSITION_MASK) | position.pack() | HAS_POSITION
            }
            StateUpdate::Transport(Transport::Stopped) => 0,
            StateUpdate::Transport(transport) => {
                let code = transport_code(transport) << TRANSPORT_SHIFT;
                (word & (POSITION_MASK | HAS_POSITION)) | code
            }
        };
        self.shared.mailbox.store(word, Ordering::Release);

        if self.producer.try_push(update).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Audio-side half: owns the mixer and all playback state.
pub struct PlaybackSource {
    mixer: Mixer,
    commands: CommandReceiver,
    updates: UpdateSender,
}

impl PlaybackSource {
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Render into `out`; see [`Mixer::render`].
    pub fn render(&mut self, out: &mut [i16]) -> usize {
        self.mixer.render(out, &mut self.commands, &mut self.updates)
    }
}

impl PcmSource for PlaybackSource {
    fn fill(&mut self, out: &mut [i16]) {
        self.render(out);
    }
}
