//! decoder/mod.rs
//! Decode session: owns the transport, caches, block cursor, validation
//! queue and counters.
//!
//! Lifecycle mirrors the encoder: `new` -> `start` -> reads -> `finish`.
//! `start` reads the version byte and accepts anything from `MIN_VERSION`
//! up to the configured version.

pub mod graph;
pub mod input;
pub mod validation;

use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use tracing::debug;

use crate::cache::SlotCache;
use crate::collab::Collaborators;
use crate::config::EngineConfig;
use crate::constants::{verify_version, MIN_VERSION};
use crate::descriptor::{DescriptorRef, Level};
use crate::framing::BlockReader;
use crate::io::RawInput;
use crate::model::{ObjectRef, Value};
use crate::telemetry::{SessionCounters, SessionSnapshot, SessionTimer};
use crate::types::{Result, WireError};

pub use validation::ValidationQueue;

/// The object and level whose custom read hook is running.
#[derive(Debug, Clone)]
pub(crate) struct ReadFrame {
    pub obj: ObjectRef,
    pub level: Level,
}

pub struct Decoder<R: Read> {
    pub(crate) input: RawInput<R>,
    pub(crate) config: EngineConfig,
    pub(crate) collab: Collaborators,
    pub(crate) version: u8,
    pub(crate) instances: SlotCache<Value>,
    pub(crate) classes: SlotCache<DescriptorRef>,
    pub(crate) serial_classes: SlotCache<DescriptorRef>,
    pub(crate) plans: HashMap<usize, Rc<[Level]>>,
    pub(crate) blocks: BlockReader,
    pub(crate) depth: usize,
    pub(crate) frame: Option<ReadFrame>,
    pub(crate) validations: ValidationQueue,
    pub(crate) counters: SessionCounters,
    pub(crate) timer: SessionTimer,
    started: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, config: EngineConfig, collab: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            input: RawInput::new(reader),
            version: config.version,
            config,
            collab,
            instances: SlotCache::new(),
            classes: SlotCache::new(),
            serial_classes: SlotCache::new(),
            plans: HashMap::new(),
            blocks: BlockReader::default(),
            depth: 0,
            frame: None,
            validations: ValidationQueue::new(),
            counters: SessionCounters::default(),
            timer: SessionTimer::new(),
            started: false,
        })
    }

    /// Begin a session: reset state, read and check the version byte.
    pub fn start(&mut self) -> Result<()> {
        self.reset_caches();
        self.blocks = BlockReader::default();
        self.depth = 0;
        self.frame = None;
        self.validations.clear();
        self.counters = SessionCounters::default();
        self.input.reset_count();
        self.timer.start();
        let raw = self.input.read_u8()?;
        let version = verify_version(raw)?;
        if version > self.config.version {
            return Err(WireError::CorruptStream(format!(
                "stream version {} exceeds configured maximum {} (minimum {})",
                version, self.config.version, MIN_VERSION
            )));
        }
        self.version = version;
        self.started = true;
        debug!(version, "decode session start");
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.ensure_started()?;
        if self.depth > 0 || !self.blocks.is_raw() {
            return Err(WireError::Hook("finish called inside an open hook scope".into()));
        }
        self.timer.stop();
        self.started = false;
        self.counters.bytes = self.input.bytes_read();
        debug!(
            bytes = self.counters.bytes,
            objects = self.counters.new_objects,
            drained = self.counters.drained_bytes,
            "decode session finish"
        );
        Ok(())
    }

    /// Version negotiated by `start`.
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        self.counters.bytes = self.input.bytes_read();
        SessionSnapshot::from(self.version, &self.counters, &self.timer)
    }

    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    pub(crate) fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(WireError::Hook("decoder used before start()".into()))
        }
    }

    pub(crate) fn clear_instances(&mut self) {
        self.instances.clear();
        self.counters.cache_clears += 1;
        debug!("decoder instance cache cleared");
    }

    pub(crate) fn clear_types(&mut self) {
        self.reset_caches();
        self.counters.cache_clears += 1;
        debug!("decoder type cache cleared");
    }

    fn reset_caches(&mut self) {
        self.instances.clear();
        self.classes.clear();
        self.serial_classes.clear();
        self.plans.clear();
    }
}
