use std::fmt::Debug;

use super::error::SaslError;

/// Security context negotiated by a successful exchange.
///
/// With a strength of 0 no layer is installed and buffers go through
/// untouched. Otherwise buffers are cut in frames of at most `max_buffer`
/// bytes, each one handed to the mechanism's primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityLayer {
    strength: u32,
    max_buffer: usize,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encode,
    Decode,
}

impl SecurityLayer {
    pub fn new(strength: u32, max_buffer: usize) -> Self {
        Self {
            strength,
            max_buffer,
        }
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    pub fn is_active(&self) -> bool {
        self.strength > 0
    }

    /// Protect outgoing application data.
    pub fn encode<F, E>(&self, input: &[u8], transform: F) -> Result<Vec<u8>, SaslError>
    where
        F: FnMut(&[u8]) -> Result<Vec<u8>, E>,
        E: Debug,
    {
        self.process(Direction::Encode, input, transform)
    }

    /// Unwrap incoming application data.
    pub fn decode<F, E>(&self, input: &[u8], transform: F) -> Result<Vec<u8>, SaslError>
    where
        F: FnMut(&[u8]) -> Result<Vec<u8>, E>,
        E: Debug,
    {
        self.process(Direction::Decode, input, transform)
    }

    fn process<F, E>(
        &self,
        dir: Direction,
        input: &[u8],
        mut transform: F,
    ) -> Result<Vec<u8>, SaslError>
    where
        F: FnMut(&[u8]) -> Result<Vec<u8>, E>,
        E: Debug,
    {
        if !self.is_active() {
            return Ok(input.to_vec());
        }

        // a zero sized frame would never make progress, take it as unbounded
        let frame = match self.max_buffer {
            0 => input.len().max(1),
            n => n,
        };

        let mut out = Vec::with_capacity(input.len());
        for (idx, chunk) in input.chunks(frame).enumerate() {
            match transform(chunk) {
                Ok(data) => out.extend_from_slice(&data),
                Err(e) => {
                    tracing::error!(direction=?dir, chunk=idx, err=?e, "Security layer rejected a frame");
                    return Err(SaslError::SecureLayerError);
                }
            }
        }
        Ok(out)
    }
}
