// File: src/model.rs
// Flat block and transaction records produced by the decoder

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::protos;

/// Declares a closed wire enumeration with a fallback variant for values
/// this build does not know about.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident($raw:ty) {
            $($variant:ident = $value:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown($raw),
        }

        impl From<$raw> for $name {
            fn from(value: $raw) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    other => $name::Unknown(other),
                }
            }
        }

        impl $name {
            /// Raw value as carried on the wire.
            pub fn raw(&self) -> $raw {
                match self {
                    $($name::$variant => $value,)+
                    $name::Unknown(other) => *other,
                }
            }

            /// Fabric constant name, `None` for unknown values.
            pub fn name(&self) -> Option<&'static str> {
                match self {
                    $($name::$variant => Some($label),)+
                    $name::Unknown(_) => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.name() {
                    Some(label) => f.write_str(label),
                    None => write!(f, "UNKNOWN({})", self.raw()),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.name() {
                    Some(label) => serializer.serialize_str(label),
                    None => self.raw().serialize(serializer),
                }
            }
        }
    };
}

wire_enum! {
    /// Transaction category from the channel header
    HeaderType(i32) {
        Message = 0 => "MESSAGE",
        Config = 1 => "CONFIG",
        ConfigUpdate = 2 => "CONFIG_UPDATE",
        EndorserTransaction = 3 => "ENDORSER_TRANSACTION",
        OrdererTransaction = 4 => "ORDERER_TRANSACTION",
        DeliverSeekInfo = 5 => "DELIVER_SEEK_INFO",
        ChaincodePackage = 6 => "CHAINCODE_PACKAGE",
        PeerAdminOperation = 8 => "PEER_ADMIN_OPERATION",
    }
}

wire_enum! {
    /// Committer's verdict on a transaction, one byte per envelope in the
    /// block's transaction filter
    ValidationCode(u8) {
        Valid = 0 => "VALID",
        NilEnvelope = 1 => "NIL_ENVELOPE",
        BadPayload = 2 => "BAD_PAYLOAD",
        BadCommonHeader = 3 => "BAD_COMMON_HEADER",
        BadCreatorSignature = 4 => "BAD_CREATOR_SIGNATURE",
        InvalidEndorserTransaction = 5 => "INVALID_ENDORSER_TRANSACTION",
        InvalidConfigTransaction = 6 => "INVALID_CONFIG_TRANSACTION",
        UnsupportedTxPayload = 7 => "UNSUPPORTED_TX_PAYLOAD",
        BadProposalTxid = 8 => "BAD_PROPOSAL_TXID",
        DuplicateTxid = 9 => "DUPLICATE_TXID",
        EndorsementPolicyFailure = 10 => "ENDORSEMENT_POLICY_FAILURE",
        MvccReadConflict = 11 => "MVCC_READ_CONFLICT",
        PhantomReadConflict = 12 => "PHANTOM_READ_CONFLICT",
        UnknownTxType = 13 => "UNKNOWN_TX_TYPE",
        TargetChainNotFound = 14 => "TARGET_CHAIN_NOT_FOUND",
        MarshalTxError = 15 => "MARSHAL_TX_ERROR",
        NilTxaction = 16 => "NIL_TXACTION",
        ExpiredChaincode = 17 => "EXPIRED_CHAINCODE",
        ChaincodeVersionConflict = 18 => "CHAINCODE_VERSION_CONFLICT",
        BadHeaderExtension = 19 => "BAD_HEADER_EXTENSION",
        BadChannelHeader = 20 => "BAD_CHANNEL_HEADER",
        BadResponsePayload = 21 => "BAD_RESPONSE_PAYLOAD",
        BadRwset = 22 => "BAD_RWSET",
        IllegalWriteset = 23 => "ILLEGAL_WRITESET",
        InvalidWriteset = 24 => "INVALID_WRITESET",
        InvalidChaincode = 25 => "INVALID_CHAINCODE",
        NotValidated = 254 => "NOT_VALIDATED",
        InvalidOtherReason = 255 => "INVALID_OTHER_REASON",
    }
}

wire_enum! {
    /// Runtime of the invoked chaincode
    ChaincodeType(i32) {
        Undefined = 0 => "UNDEFINED",
        Golang = 1 => "GOLANG",
        Node = 2 => "NODE",
        Car = 3 => "CAR",
        Java = 4 => "JAVA",
    }
}

impl ValidationCode {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationCode::Valid)
    }
}

/// Decoded block header plus one record per envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    #[serde(rename = "blockHeight")]
    pub height: u64,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    #[serde(rename = "dataHash")]
    pub data_hash: String,
    /// Fabric blocks carry no creation time, so this is the last
    /// transaction's timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "txList")]
    pub transactions: Vec<Tx>,
}

impl BlockSummary {
    pub fn valid_transaction_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.validation_code.is_valid())
            .count()
    }

    /// Position and record of the transaction with this id.
    pub fn find_transaction(&self, id: &str) -> Option<(usize, &Tx)> {
        self.transactions.iter().enumerate().find(|(_, tx)| tx.id == id)
    }
}

/// Chaincode execution result, passed through from the chaincode action
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    pub status: i32,
    pub message: String,
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
}

impl From<protos::Response> for Response {
    fn from(r: protos::Response) -> Self {
        Self {
            status: r.status,
            message: r.message,
            payload: r.payload,
        }
    }
}

/// One normalized transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tx {
    pub id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "headerType")]
    pub header_type: HeaderType,
    #[serde(rename = "validationCode")]
    pub validation_code: ValidationCode,
    pub chaincode_type: ChaincodeType,
    pub chaincode_name: String,
    #[serde(rename = "chaincodeVersion")]
    pub chaincode_version: String,
    #[serde(rename = "chain_code_input")]
    pub input_args: Vec<String>,
    #[serde(rename = "transientMap", serialize_with = "serialize_hex_map")]
    pub transient_map: BTreeMap<String, Vec<u8>>,
    #[serde(rename = "isInit")]
    pub is_init: bool,
    pub response: Option<Response>,
    /// Empty when the chaincode emitted no event
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(rename = "eventInput", serialize_with = "serialize_hex")]
    pub event_payload: Vec<u8>,
    #[serde(rename = "endorser")]
    pub msp_id: String,
    #[serde(rename = "endorserId")]
    pub msp_id_bytes: String,
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn serialize_hex_map<S: Serializer>(
    map: &BTreeMap<String, Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(map.iter().map(|(k, v)| (k, hex::encode(v))))
}
