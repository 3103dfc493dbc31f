// File: src/lib.rs
// Hyperledger Fabric block decoding with CLI and Web explorers

pub mod protos;
pub mod model;
pub mod error;
pub mod decoder;

pub mod block_store;
pub mod data_models;
pub mod cli_interface;
pub mod web_server;
pub mod logging;

pub mod samples;

pub use decoder::{byte_list_to_string_list, decode_block, decode_block_bytes, decode_envelope};
pub use error::{BlockError, DecodeError, DecodeStep};
pub use model::{BlockSummary, ChaincodeType, HeaderType, Response, Tx, ValidationCode};
