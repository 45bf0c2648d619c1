/// Configuration used to control compression of outgoing batches. Both
/// sides of a connection must agree on it, dictionary included.
#[derive(Clone)]
pub struct CompressionConfig {
    pub mode: CompressionMode,
}

impl CompressionConfig {
    pub fn new(mode: CompressionMode) -> Self {
        Self { mode }
    }
}

#[derive(Clone)]
pub enum CompressionMode {
    /// Compression level, from -7 (fastest) to 22 (smallest). Levels above
    /// 20 should be used with caution, as they require more memory.
    Default(i32),
    /// Compression with a pre-trained dictionary, which pays off for the
    /// small payloads typical of delta batches. The dictionary itself must
    /// be distributed to both sides out of band.
    Dictionary(i32, Vec<u8>),
}
