// File: src/error.rs
// Error types for envelope and block decoding

use std::fmt;

use thiserror::Error;

/// Nested message being unwrapped when an envelope decode failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    Envelope,
    Payload,
    SignatureHeader,
    SerializedIdentity,
    ChannelHeader,
    Transaction,
    ChaincodeActionPayload,
    ProposalResponsePayload,
    ChaincodeAction,
    ChaincodeEvent,
    ChaincodeProposalPayload,
    ChaincodeInvocationSpec,
}

impl fmt::Display for DecodeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeStep::Envelope => "Envelope",
            DecodeStep::Payload => "Payload",
            DecodeStep::SignatureHeader => "SignatureHeader",
            DecodeStep::SerializedIdentity => "SerializedIdentity",
            DecodeStep::ChannelHeader => "ChannelHeader",
            DecodeStep::Transaction => "Transaction",
            DecodeStep::ChaincodeActionPayload => "ChaincodeActionPayload",
            DecodeStep::ProposalResponsePayload => "ProposalResponsePayload",
            DecodeStep::ChaincodeAction => "ChaincodeAction",
            DecodeStep::ChaincodeEvent => "ChaincodeEvent",
            DecodeStep::ChaincodeProposalPayload => "ChaincodeProposalPayload",
            DecodeStep::ChaincodeInvocationSpec => "ChaincodeInvocationSpec",
        };
        f.write_str(name)
    }
}

/// Failure to turn one envelope into a transaction record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to unmarshal {step}")]
    Step {
        step: DecodeStep,
        #[source]
        source: prost::DecodeError,
    },

    /// The transaction parsed but carries no actions
    #[error("at least one TransactionAction required")]
    NoActions,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl DecodeError {
    /// Step that failed, if the failure came from the wire decoder.
    pub fn step(&self) -> Option<DecodeStep> {
        match self {
            DecodeError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Failure to summarize a whole block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("failed to unmarshal Block")]
    Block(#[source] prost::DecodeError),

    #[error("block has no header")]
    MissingHeader,

    #[error("no validation code for transaction {index}")]
    MissingValidationCode { index: usize },

    #[error("failed to decode transaction {index}")]
    Envelope {
        index: usize,
        #[source]
        source: DecodeError,
    },
}
