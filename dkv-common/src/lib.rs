// dkv-common - Shared error type and wire protocol for DistKV
//
// This crate defines the framed message schema nodes use to talk to each
// other and the error type the rest of the workspace reports through.

pub mod error;
pub mod wire;

pub use error::{DkvError, DkvResult};
pub use wire::{
    decode_frame, encode_frame, GetRequest, GetResponse, Request, Response, SetRequest,
    StatusCode, DEFAULT_MAX_MSG_SIZE,
};
