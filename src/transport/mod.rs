//! Wire transport: MLLP framing and acknowledgements

pub mod ack;
pub mod mllp;

pub use ack::{AckBuilder, AckCode, AckError, AckReply};
pub use mllp::{
    decode_frames, encode_frame, Frame, MllpCodec, CARRIAGE_RETURN, DEFAULT_MAX_FRAME_BYTES,
    END_BLOCK, START_BLOCK,
};
