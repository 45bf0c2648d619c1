cfg_if! {
    if #[cfg(feature = "zstd_support")]
    {
        use log::info;
        use zstd::bulk::Compressor;

        use super::compression_config::CompressionMode;
        use super::error::EncoderError;

        /// Compresses batch bodies. Owns its output between calls so
        /// steady-state flushing does not allocate.
        pub struct Encoder {
            result: Vec<u8>,
            compressor: Compressor<'static>,
        }

        impl Encoder {
            /// Try to create a new Encoder with the specified compression mode
            pub fn try_new(mode: &CompressionMode) -> Result<Self, EncoderError> {
                let compressor = match mode {
                    CompressionMode::Default(level) => Compressor::new(*level)
                        .map_err(|_| EncoderError::CreationFailed { level: *level })?,
                    CompressionMode::Dictionary(level, dictionary) => {
                        let compressor = Compressor::with_dictionary(*level, dictionary)
                            .map_err(|_| EncoderError::DictionaryCreationFailed { level: *level })?;
                        info!("Compression dictionary loaded ({} bytes)", dictionary.len());
                        compressor
                    }
                };

                Ok(Self {
                    result: Vec::new(),
                    compressor,
                })
            }

            /// Create a new Encoder with the specified compression mode
            ///
            /// # Panics
            /// Panics if the compressor cannot be created with the given configuration
            pub fn new(mode: &CompressionMode) -> Self {
                Self::try_new(mode).expect("Failed to create Encoder")
            }

            /// Try to encode a payload, returning error on compression failure.
            /// The caller compares lengths and keeps the original when
            /// compression did not shrink it.
            pub fn try_encode(&mut self, payload: &[u8]) -> Result<&[u8], EncoderError> {
                self.result = self.compressor.compress(payload).map_err(|_| {
                    EncoderError::CompressionFailed {
                        payload_size: payload.len(),
                    }
                })?;
                Ok(&self.result)
            }

            /// Encode a payload
            ///
            /// # Panics
            /// Panics if compression fails
            pub fn encode(&mut self, payload: &[u8]) -> &[u8] {
                self.try_encode(payload).expect("Failed to encode payload")
            }
        }
    }
    else
    {
        use super::compression_config::CompressionMode;
        use super::error::EncoderError;

        pub struct Encoder {
            result: Vec<u8>,
        }

        impl Encoder {
            pub fn try_new(_: &CompressionMode) -> Result<Self, EncoderError> {
                Ok(Self {
                    result: Vec::new(),
                })
            }

            pub fn new(mode: &CompressionMode) -> Self {
                Self::try_new(mode).expect("Failed to create Encoder")
            }

            pub fn try_encode(&mut self, payload: &[u8]) -> Result<&[u8], EncoderError> {
                self.result = payload.to_vec();
                Ok(&self.result)
            }

            pub fn encode(&mut self, payload: &[u8]) -> &[u8] {
                self.try_encode(payload).expect("Failed to encode payload")
            }
        }
    }
}
