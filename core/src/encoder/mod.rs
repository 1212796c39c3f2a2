//! encoder/mod.rs
//! Encode session: owns the transport, caches, block writer and counters.
//!
//! Lifecycle: `new` -> `start` -> writes -> `finish`, repeatable. `start`
//! resets every piece of per-session state and writes the version byte.

pub mod graph;
pub mod output;

use std::io::Write;

use tracing::debug;

use crate::cache::InternCache;
use crate::collab::Collaborators;
use crate::config::EngineConfig;
use crate::constants::Tag;
use crate::framing::BlockWriter;
use crate::io::RawOutput;
use crate::model::{ObjectRef, TypeRef, Value};
use crate::telemetry::{SessionCounters, SessionSnapshot, SessionTimer};
use crate::types::{Result, WireError};

/// The object and hierarchy level whose custom write hook is running.
#[derive(Debug, Clone)]
pub(crate) struct HookFrame {
    pub obj: ObjectRef,
    pub level: TypeRef,
}

pub struct Encoder<W: Write> {
    pub(crate) out: RawOutput<W>,
    pub(crate) config: EngineConfig,
    pub(crate) collab: Collaborators,
    pub(crate) instances: InternCache<Value>,
    pub(crate) classes: InternCache<TypeRef>,
    pub(crate) serial_classes: InternCache<TypeRef>,
    pub(crate) blocks: BlockWriter,
    pub(crate) depth: usize,
    pub(crate) frame: Option<HookFrame>,
    pub(crate) counters: SessionCounters,
    pub(crate) timer: SessionTimer,
    started: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, config: EngineConfig, collab: Collaborators) -> Result<Self> {
        config.validate()?;
        let block_size = config.block_size;
        Ok(Self {
            out: RawOutput::new(writer),
            config,
            collab,
            instances: InternCache::new(),
            classes: InternCache::new(),
            serial_classes: InternCache::new(),
            blocks: BlockWriter::new(block_size),
            depth: 0,
            frame: None,
            counters: SessionCounters::default(),
            timer: SessionTimer::new(),
            started: false,
        })
    }

    /// Begin a session: reset state and write the version byte.
    pub fn start(&mut self) -> Result<()> {
        self.instances.clear();
        self.classes.clear();
        self.serial_classes.clear();
        self.blocks.reset(self.config.block_size);
        self.depth = 0;
        self.frame = None;
        self.counters = SessionCounters::default();
        self.out.reset_count();
        self.timer.start();
        self.out.put_u8(self.config.version)?;
        self.started = true;
        debug!(version = self.config.version, "encode session start");
        Ok(())
    }

    /// End the session and flush the transport.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_started()?;
        if self.blocks.depth() > 0 || self.depth > 0 {
            return Err(WireError::Hook("finish called inside an open hook scope".into()));
        }
        self.out.flush()?;
        self.timer.stop();
        self.started = false;
        self.counters.bytes = self.out.bytes_written();
        debug!(
            bytes = self.counters.bytes,
            objects = self.counters.new_objects,
            back_refs = self.counters.back_refs(),
            "encode session finish"
        );
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.config.version
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn snapshot(&mut self) -> SessionSnapshot {
        self.counters.bytes = self.out.bytes_written();
        SessionSnapshot::from(self.config.version, &self.counters, &self.timer)
    }

    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    /// Forget every written instance; later writes of them are new records.
    pub fn clear_instance_cache(&mut self) -> Result<()> {
        self.ensure_top_level("clear_instance_cache")?;
        self.out.put_tag(Tag::ClearInstanceCache)?;
        self.instances.clear();
        self.counters.cache_clears += 1;
        debug!("encoder instance cache cleared");
        Ok(())
    }

    /// Forget every written type descriptor, and every instance with them.
    pub fn clear_type_cache(&mut self) -> Result<()> {
        self.ensure_top_level("clear_type_cache")?;
        self.out.put_tag(Tag::ClearClassCache)?;
        self.classes.clear();
        self.serial_classes.clear();
        self.instances.clear();
        self.counters.cache_clears += 1;
        debug!("encoder type cache cleared");
        Ok(())
    }

    pub(crate) fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(WireError::Hook("encoder used before start()".into()))
        }
    }

    fn ensure_top_level(&self, op: &str) -> Result<()> {
        self.ensure_started()?;
        if self.depth > 0 || self.blocks.depth() > 0 {
            return Err(WireError::Hook(format!("{} is only valid between top-level writes", op)));
        }
        Ok(())
    }
}
