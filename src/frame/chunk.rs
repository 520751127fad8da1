//! LZMA2 chunk headers and the reset-state rules shared by every encoder and
//! decoder in the crate.
//!
//! Wire layout:
//!
//! | control        | meaning                                              |
//! |----------------|------------------------------------------------------|
//! | `0x00`         | end of stream                                        |
//! | `0x01`         | raw chunk, dictionary reset                          |
//! | `0x02`         | raw chunk, no reset                                  |
//! | `0x03..=0x7F`  | invalid                                              |
//! | `0x80..=0xFF`  | compressed chunk; bits 5–6 reset state, bits 0–4 are |
//! |                | bits 16–20 of `uncompressed − 1`                     |
//!
//! Raw chunks carry `size − 1` as a big-endian `u16`. Compressed chunks carry
//! the low 16 bits of `uncompressed − 1`, then `compressed − 1`, both
//! big-endian, then the properties byte when the reset state is at least
//! [`ResetState::Props`].

use std::io::Read;

use crate::error::{Lzma2Error, Result};
pub use crate::lzma::LzmaProps;

// ─────────────────────────────────────────────────────────────────────────────
// Limits and control bytes
// ─────────────────────────────────────────────────────────────────────────────

/// Largest compressed payload of one chunk, and largest raw chunk.
pub const COMPRESSED_SIZE_MAX: usize = 1 << 16;

/// Largest uncompressed size of one compressed chunk.
pub const UNCOMPRESSED_SIZE_MAX: usize = 1 << 21;

/// Control byte terminating a stream.
pub const END_MARKER: u8 = 0x00;

const RAW_DICT_RESET: u8 = 0x01;
const RAW_CONTINUE: u8 = 0x02;
const COMPRESSED_FLAG: u8 = 0x80;

// ─────────────────────────────────────────────────────────────────────────────
// ResetState
// ─────────────────────────────────────────────────────────────────────────────

/// How much decoder state a compressed chunk discards before decoding.
///
/// Each level implies the ones below it: a dictionary reset also resets the
/// properties and the coder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResetState {
    /// Keep the coder state from the previous chunk.
    Continue = 0,
    /// Reset probabilities, reps and the state machine.
    State = 1,
    /// State reset with new properties; the properties byte follows.
    Props = 2,
    /// Props reset that also empties the dictionary.
    Dict = 3,
}

impl ResetState {
    fn from_control(control: u8) -> ResetState {
        match (control >> 5) & 0x03 {
            0 => ResetState::Continue,
            1 => ResetState::State,
            2 => ResetState::Props,
            _ => ResetState::Dict,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChunkHeader
// ─────────────────────────────────────────────────────────────────────────────

/// One parsed chunk header. The payload (if any) follows it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHeader {
    /// `0x00`: the stream ends here.
    End,
    /// Stored bytes.
    Uncompressed {
        /// `true` for control `0x01`.
        dict_reset: bool,
        /// Payload size, 1..=65 536.
        size: usize,
    },
    /// LZMA-coded bytes.
    Compressed {
        reset: ResetState,
        /// Decoded size, 1..=2 MiB.
        uncompressed_size: usize,
        /// Payload size, 1..=64 KiB.
        compressed_size: usize,
        /// Present exactly when `reset >= ResetState::Props`.
        props: Option<LzmaProps>,
    },
}

impl ChunkHeader {
    /// Control byte of this header.
    pub fn control_byte(&self) -> u8 {
        match *self {
            ChunkHeader::End => END_MARKER,
            ChunkHeader::Uncompressed { dict_reset, .. } => {
                if dict_reset {
                    RAW_DICT_RESET
                } else {
                    RAW_CONTINUE
                }
            }
            ChunkHeader::Compressed {
                reset,
                uncompressed_size,
                ..
            } => COMPRESSED_FLAG | ((reset as u8) << 5) | (((uncompressed_size - 1) >> 16) as u8 & 0x1F),
        }
    }

    /// Size of the encoded header in bytes.
    pub fn encoded_len(&self) -> usize {
        match *self {
            ChunkHeader::End => 1,
            ChunkHeader::Uncompressed { .. } => 3,
            ChunkHeader::Compressed { props: Some(_), .. } => 6,
            ChunkHeader::Compressed { props: None, .. } => 5,
        }
    }

    /// Bytes that follow the header on the wire.
    pub fn payload_len(&self) -> usize {
        match *self {
            ChunkHeader::End => 0,
            ChunkHeader::Uncompressed { size, .. } => size,
            ChunkHeader::Compressed {
                compressed_size, ..
            } => compressed_size,
        }
    }

    /// Bytes this chunk decodes to.
    pub fn uncompressed_len(&self) -> usize {
        match *self {
            ChunkHeader::End => 0,
            ChunkHeader::Uncompressed { size, .. } => size,
            ChunkHeader::Compressed {
                uncompressed_size, ..
            } => uncompressed_size,
        }
    }

    /// True when the chunk empties the dictionary, i.e. starts an
    /// independently decodable group.
    pub fn is_dict_reset(&self) -> bool {
        matches!(
            self,
            ChunkHeader::Uncompressed {
                dict_reset: true,
                ..
            } | ChunkHeader::Compressed {
                reset: ResetState::Dict,
                ..
            }
        )
    }

    /// Append the encoded header to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.control_byte());
        match *self {
            ChunkHeader::End => {}
            ChunkHeader::Uncompressed { size, .. } => {
                debug_assert!((1..=COMPRESSED_SIZE_MAX).contains(&size));
                out.extend_from_slice(&((size - 1) as u16).to_be_bytes());
            }
            ChunkHeader::Compressed {
                uncompressed_size,
                compressed_size,
                props,
                reset,
            } => {
                debug_assert!((1..=UNCOMPRESSED_SIZE_MAX).contains(&uncompressed_size));
                debug_assert!((1..=COMPRESSED_SIZE_MAX).contains(&compressed_size));
                debug_assert_eq!(props.is_some(), reset >= ResetState::Props);
                out.extend_from_slice(&((uncompressed_size - 1) as u16).to_be_bytes());
                out.extend_from_slice(&((compressed_size - 1) as u16).to_be_bytes());
                if let Some(p) = props {
                    out.push(p.to_byte());
                }
            }
        }
    }

    /// Parse a header whose control byte has already been read.
    pub fn read_after_control<R: Read + ?Sized>(control: u8, r: &mut R) -> Result<ChunkHeader> {
        match control {
            END_MARKER => Ok(ChunkHeader::End),
            RAW_DICT_RESET | RAW_CONTINUE => {
                let mut b = [0u8; 2];
                r.read_exact(&mut b)?;
                Ok(ChunkHeader::Uncompressed {
                    dict_reset: control == RAW_DICT_RESET,
                    size: u16::from_be_bytes(b) as usize + 1,
                })
            }
            0x03..=0x7F => Err(Lzma2Error::CorruptedInput("invalid chunk control byte")),
            _ => {
                let reset = ResetState::from_control(control);
                let mut b = [0u8; 4];
                r.read_exact(&mut b)?;
                let uncompressed_size =
                    ((control as usize & 0x1F) << 16) + u16::from_be_bytes([b[0], b[1]]) as usize + 1;
                let compressed_size = u16::from_be_bytes([b[2], b[3]]) as usize + 1;
                let props = if reset >= ResetState::Props {
                    let mut p = [0u8; 1];
                    r.read_exact(&mut p)?;
                    Some(
                        LzmaProps::from_byte(p[0])
                            .ok_or(Lzma2Error::CorruptedInput("invalid properties byte"))?,
                    )
                } else {
                    None
                };
                Ok(ChunkHeader::Compressed {
                    reset,
                    uncompressed_size,
                    compressed_size,
                    props,
                })
            }
        }
    }

    /// Read one header from `r`. End of input before the control byte is
    /// reported as corruption; a stream must end with `0x00`.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<ChunkHeader> {
        let mut control = [0u8; 1];
        r.read_exact(&mut control)?;
        Self::read_after_control(control[0], r)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reset tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Encoder-side reset flags carried from one chunk to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EncoderResets {
    pub(crate) dict_reset_needed: bool,
    pub(crate) props_needed: bool,
    pub(crate) state_reset_needed: bool,
}

impl EncoderResets {
    /// Flags for the first chunk of a stream. With a preset dictionary the
    /// history is already shared, so only the properties are announced.
    pub(crate) fn new_stream(dict_reset: bool) -> Self {
        EncoderResets {
            dict_reset_needed: dict_reset,
            props_needed: true,
            state_reset_needed: true,
        }
    }

    /// Reset state to put on the next compressed chunk.
    pub(crate) fn compressed_reset(&self) -> ResetState {
        if self.props_needed {
            if self.dict_reset_needed {
                ResetState::Dict
            } else {
                ResetState::Props
            }
        } else if self.state_reset_needed {
            ResetState::State
        } else {
            ResetState::Continue
        }
    }

    pub(crate) fn after_compressed(&mut self) {
        self.dict_reset_needed = false;
        self.props_needed = false;
        self.state_reset_needed = false;
    }

    /// A raw chunk leaves the decoder's coder state stale.
    pub(crate) fn after_uncompressed(&mut self) {
        self.dict_reset_needed = false;
        self.state_reset_needed = true;
    }
}

/// Decoder-side validation of the chunk sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecoderResets {
    need_dict_reset: bool,
    need_props: bool,
}

/// What a decoder must do before handling a chunk's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkAction {
    pub(crate) reset_dict: bool,
    /// New properties to build a fresh symbol decoder from.
    pub(crate) new_props: Option<LzmaProps>,
    pub(crate) reset_state: bool,
}

impl DecoderResets {
    /// A stream with a preset dictionary may start without a dict reset.
    pub(crate) fn new(has_preset: bool) -> Self {
        DecoderResets {
            need_dict_reset: !has_preset,
            need_props: true,
        }
    }

    /// Validate `header` against the stream so far and update the flags.
    pub(crate) fn check(&mut self, header: &ChunkHeader) -> Result<ChunkAction> {
        let mut action = ChunkAction {
            reset_dict: false,
            new_props: None,
            reset_state: false,
        };
        match *header {
            ChunkHeader::End => return Ok(action),
            _ if header.is_dict_reset() => {
                self.need_props = true;
                self.need_dict_reset = false;
                action.reset_dict = true;
            }
            _ if self.need_dict_reset => {
                return Err(Lzma2Error::CorruptedInput("first chunk does not reset the dictionary"));
            }
            _ => {}
        }
        if let ChunkHeader::Compressed { reset, props, .. } = *header {
            if let Some(p) = props {
                self.need_props = false;
                action.new_props = Some(p);
            } else if self.need_props {
                return Err(Lzma2Error::CorruptedInput("compressed chunk without properties"));
            } else if reset >= ResetState::State {
                action.reset_state = true;
            }
        }
        Ok(action)
    }
}
