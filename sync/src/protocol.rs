use std::any::Any;
use std::time::Duration;

use undine_serde::BitBuffer;

use crate::codec::{
    register_option_of, register_vec_of, CodecContext, CodecError, DeltaKinds, DisposalError,
    FloatStrategy, ValueKinds,
};
use crate::delta::compression_config::CompressionConfig;

pub mod error;
pub use error::ProtocolError;

/// Tuning knobs for snapshot history retention.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Snapshots older than this are dropped once a history overflows,
    /// even if the peer never acknowledged anything newer.
    pub history_max_age: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_max_age: Duration::from_secs(3),
        }
    }
}

// Protocol
//
// Collects value codecs, delta codecs and connection settings, then locks.
// Registries keep the first registration per type, so anything the
// application adds before `lock()` takes precedence over the built-in
// defaults filled in at lock time.
pub struct Protocol {
    pub value_kinds: ValueKinds,
    pub delta_kinds: DeltaKinds,
    /// Configuration used to control compression parameters
    pub compression: Option<CompressionConfig>,
    pub sync: SyncConfig,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            value_kinds: ValueKinds::new(),
            delta_kinds: DeltaKinds::new(),
            compression: None,
            sync: SyncConfig::default(),
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Registers a full-value codec for `T`.
    pub fn add_value<T, W, R>(&mut self, writer: W, reader: R) -> &mut Self
    where
        T: Any + Send + Default,
        W: Fn(&ValueKinds, &mut BitBuffer<'_>, &T) -> Result<(), CodecError> + Send + Sync + 'static,
        R: Fn(&ValueKinds, &mut BitBuffer<'_>) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.check_lock();
        self.value_kinds.register_writer::<T, W>(writer);
        self.value_kinds.register_reader::<T, R>(reader);
        self
    }

    /// Registers a delta codec for `T`, replacing the structural fallback.
    pub fn add_delta<T, W, R>(&mut self, writer: W, reader: R) -> &mut Self
    where
        T: Any + Send,
        W: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T, &T) -> Result<bool, CodecError>
            + Send
            + Sync
            + 'static,
        R: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T) -> Result<(bool, T), CodecError>
            + Send
            + Sync
            + 'static,
    {
        self.check_lock();
        self.delta_kinds.register::<T, W, R>(writer, reader);
        self
    }

    /// Registers float delta codecs with the given strategy, overriding
    /// the default [`FloatStrategy::Adaptive`] with three digits.
    pub fn add_float_delta(&mut self, strategy: FloatStrategy) -> &mut Self {
        self.check_lock();
        crate::codec::register_float_deltas(&mut self.delta_kinds, strategy);
        self
    }

    /// Registers value and delta codecs for `Option<T>`.
    pub fn add_option_of<T: Any + Send + Default>(&mut self) -> &mut Self {
        self.check_lock();
        register_option_of::<T>(&mut self.value_kinds, &mut self.delta_kinds);
        self
    }

    /// Registers a value codec for `Vec<T>`.
    pub fn add_vec_of<T: Any + Send + Default>(&mut self) -> &mut Self {
        self.check_lock();
        register_vec_of::<T>(&mut self.value_kinds);
        self
    }

    /// Registers a release hook run when a snapshot of `T` is pruned.
    pub fn add_disposer<T, F>(&mut self, disposer: F) -> &mut Self
    where
        T: Any + Send + Default,
        F: Fn(&mut T) -> Result<(), DisposalError> + Send + Sync + 'static,
    {
        self.check_lock();
        self.value_kinds.register_disposer::<T, F>(disposer);
        self
    }

    pub fn compression(&mut self, config: CompressionConfig) -> &mut Self {
        self.check_lock();
        self.compression = Some(config);
        self
    }

    pub fn history_max_age(&mut self, duration: Duration) -> &mut Self {
        self.check_lock();
        self.sync.history_max_age = duration;
        self
    }

    // Non-panicking builder methods

    pub fn try_add_value<T, W, R>(&mut self, writer: W, reader: R) -> Result<&mut Self, ProtocolError>
    where
        T: Any + Send + Default,
        W: Fn(&ValueKinds, &mut BitBuffer<'_>, &T) -> Result<(), CodecError> + Send + Sync + 'static,
        R: Fn(&ValueKinds, &mut BitBuffer<'_>) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.try_check_lock()?;
        self.value_kinds.register_writer::<T, W>(writer);
        self.value_kinds.register_reader::<T, R>(reader);
        Ok(self)
    }

    pub fn try_add_delta<T, W, R>(&mut self, writer: W, reader: R) -> Result<&mut Self, ProtocolError>
    where
        T: Any + Send,
        W: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T, &T) -> Result<bool, CodecError>
            + Send
            + Sync
            + 'static,
        R: Fn(&CodecContext<'_>, &mut BitBuffer<'_>, &T) -> Result<(bool, T), CodecError>
            + Send
            + Sync
            + 'static,
    {
        self.try_check_lock()?;
        self.delta_kinds.register::<T, W, R>(writer, reader);
        Ok(self)
    }

    pub fn try_add_float_delta(&mut self, strategy: FloatStrategy) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        crate::codec::register_float_deltas(&mut self.delta_kinds, strategy);
        Ok(self)
    }

    pub fn try_add_option_of<T: Any + Send + Default>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        register_option_of::<T>(&mut self.value_kinds, &mut self.delta_kinds);
        Ok(self)
    }

    pub fn try_add_vec_of<T: Any + Send + Default>(&mut self) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        register_vec_of::<T>(&mut self.value_kinds);
        Ok(self)
    }

    pub fn try_add_disposer<T, F>(&mut self, disposer: F) -> Result<&mut Self, ProtocolError>
    where
        T: Any + Send + Default,
        F: Fn(&mut T) -> Result<(), DisposalError> + Send + Sync + 'static,
    {
        self.try_check_lock()?;
        self.value_kinds.register_disposer::<T, F>(disposer);
        Ok(self)
    }

    pub fn try_compression(&mut self, config: CompressionConfig) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.compression = Some(config);
        Ok(self)
    }

    pub fn try_history_max_age(&mut self, duration: Duration) -> Result<&mut Self, ProtocolError> {
        self.try_check_lock()?;
        self.sync.history_max_age = duration;
        Ok(self)
    }

    pub fn try_lock(&mut self) -> Result<(), ProtocolError> {
        self.try_check_lock()?;
        self.fill_defaults();
        self.locked = true;
        Ok(())
    }

    pub fn lock(&mut self) {
        self.check_lock();
        self.fill_defaults();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks if protocol is locked without panicking
    /// Returns Err if protocol is locked
    pub fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }

    /// Checks if protocol is locked, panics if it is
    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    pub fn build(&mut self) -> Self {
        std::mem::take(self)
    }

    // First-wins registration makes this safe to run after the
    // application's own additions: occupied slots stay as they are.
    fn fill_defaults(&mut self) {
        crate::codec::register_defaults(
            &mut self.value_kinds,
            &mut self.delta_kinds,
            FloatStrategy::Adaptive { digits: 3 },
        );
    }
}
