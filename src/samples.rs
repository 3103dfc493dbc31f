// File: src/samples.rs
// Protobuf-encoded sample blocks and envelopes for demo mode and tests

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use prost::Message;

use crate::protos::{
    Block, BlockData, BlockHeader, BlockMetadata, ChaincodeAction, ChaincodeActionPayload,
    ChaincodeEndorsedAction, ChaincodeEvent, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
    ChaincodeProposalPayload, ChaincodeSpec, ChannelHeader, Endorsement, Envelope, Header, Payload,
    ProposalResponsePayload, Response, SerializedIdentity, SignatureHeader, Transaction,
    TransactionAction, TRANSACTIONS_FILTER,
};

/// Default channel used by samples.
pub const TEST_CHANNEL: &str = "mychannel";

/// Default creator organisation.
pub const TEST_MSP_ID: &str = "Org1MSP";

/// Default creator certificate material.
pub const TEST_ID_BYTES: &str = "-----BEGIN CERTIFICATE-----";

/// Default channel header timestamp (2023-11-14T22:13:20Z).
pub const TEST_TIMESTAMP: i64 = 1_700_000_000;

/// A chaincode invocation envelope with every field the decoder reads.
#[derive(Debug, Clone)]
pub struct TxFixture {
    pub tx_id: String,
    pub channel_id: String,
    pub timestamp_secs: i64,
    pub timestamp_nanos: i32,
    pub omit_timestamp: bool,
    pub header_type: i32,
    pub chaincode_type: i32,
    pub chaincode_name: String,
    pub chaincode_version: String,
    pub args: Vec<Vec<u8>>,
    pub transient: BTreeMap<String, Vec<u8>>,
    pub is_init: bool,
    pub event: Option<(String, Vec<u8>)>,
    pub msp_id: String,
    pub id_bytes: Vec<u8>,
    /// Replaces the encoded invocation spec inside the proposal payload.
    pub raw_invocation: Option<Vec<u8>>,
}

impl TxFixture {
    pub fn new(tx_id: &str) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            channel_id: TEST_CHANNEL.to_string(),
            timestamp_secs: TEST_TIMESTAMP,
            timestamp_nanos: 0,
            omit_timestamp: false,
            header_type: 3,
            chaincode_type: 1,
            chaincode_name: "mycc".to_string(),
            chaincode_version: "1.0".to_string(),
            args: Vec::new(),
            transient: BTreeMap::new(),
            is_init: false,
            event: None,
            msp_id: TEST_MSP_ID.to_string(),
            id_bytes: TEST_ID_BYTES.as_bytes().to_vec(),
            raw_invocation: None,
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        self
    }

    pub fn with_transient(mut self, key: &str, value: &[u8]) -> Self {
        self.transient.insert(key.to_string(), value.to_vec());
        self
    }

    pub fn with_event(mut self, name: &str, payload: &[u8]) -> Self {
        self.event = Some((name.to_string(), payload.to_vec()));
        self
    }

    pub fn with_timestamp(mut self, secs: i64) -> Self {
        self.timestamp_secs = secs;
        self
    }

    pub fn header(&self) -> Header {
        let channel_header = ChannelHeader {
            r#type: self.header_type,
            version: 0,
            timestamp: (!self.omit_timestamp).then(|| prost_types::Timestamp {
                seconds: self.timestamp_secs,
                nanos: self.timestamp_nanos,
            }),
            channel_id: self.channel_id.clone(),
            tx_id: self.tx_id.clone(),
            epoch: 0,
            extension: Vec::new(),
            tls_cert_hash: Vec::new(),
        };
        let identity = SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.id_bytes.clone(),
        };
        let signature_header = SignatureHeader {
            creator: identity.encode_to_vec(),
            nonce: vec![7; 24],
        };
        Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header: signature_header.encode_to_vec(),
        }
    }

    pub fn proposal_payload(&self) -> ChaincodeProposalPayload {
        let input = match &self.raw_invocation {
            Some(raw) => raw.clone(),
            None => ChaincodeInvocationSpec {
                chaincode_spec: Some(ChaincodeSpec {
                    r#type: self.chaincode_type,
                    chaincode_id: Some(ChaincodeId {
                        path: String::new(),
                        name: self.chaincode_name.clone(),
                        version: self.chaincode_version.clone(),
                    }),
                    input: Some(ChaincodeInput {
                        args: self.args.clone(),
                        decorations: BTreeMap::new(),
                        is_init: self.is_init,
                    }),
                    timeout: 0,
                }),
            }
            .encode_to_vec(),
        };
        ChaincodeProposalPayload {
            input,
            transient_map: self.transient.clone(),
        }
    }

    pub fn chaincode_action(&self) -> ChaincodeAction {
        let events = self
            .event
            .as_ref()
            .map(|(name, payload)| {
                ChaincodeEvent {
                    chaincode_id: self.chaincode_name.clone(),
                    tx_id: self.tx_id.clone(),
                    event_name: name.clone(),
                    payload: payload.clone(),
                }
                .encode_to_vec()
            })
            .unwrap_or_default();
        ChaincodeAction {
            results: Vec::new(),
            events,
            response: Some(Response {
                status: 200,
                message: "OK".to_string(),
                payload: b"done".to_vec(),
            }),
            chaincode_id: Some(ChaincodeId {
                path: String::new(),
                name: self.chaincode_name.clone(),
                version: self.chaincode_version.clone(),
            }),
        }
    }

    pub fn transaction(&self) -> Transaction {
        let response_payload = ProposalResponsePayload {
            proposal_hash: vec![1; 32],
            extension: self.chaincode_action().encode_to_vec(),
        };
        let action_payload = ChaincodeActionPayload {
            chaincode_proposal_payload: self.proposal_payload().encode_to_vec(),
            action: Some(ChaincodeEndorsedAction {
                proposal_response_payload: response_payload.encode_to_vec(),
                endorsements: vec![Endorsement {
                    endorser: self.id_bytes.clone(),
                    signature: vec![9; 8],
                }],
            }),
        };
        Transaction {
            actions: vec![TransactionAction {
                header: Vec::new(),
                payload: action_payload.encode_to_vec(),
            }],
        }
    }

    pub fn envelope_bytes(&self) -> Vec<u8> {
        envelope_with_transaction(self, self.transaction())
    }
}

/// Envelope around an arbitrary (possibly malformed) payload.
pub fn envelope_with_payload(payload: Vec<u8>) -> Vec<u8> {
    Envelope {
        payload,
        signature: vec![0; 8],
    }
    .encode_to_vec()
}

/// Envelope using the fixture's header around a custom transaction body.
pub fn envelope_with_transaction(fixture: &TxFixture, transaction: Transaction) -> Vec<u8> {
    let payload = Payload {
        header: Some(fixture.header()),
        data: transaction.encode_to_vec(),
    };
    envelope_with_payload(payload.encode_to_vec())
}

/// Block with the given envelopes and transaction filter.
pub fn block(height: u64, envelopes: Vec<Vec<u8>>, filter: Vec<u8>) -> Block {
    let mut metadata = vec![Vec::new(); TRANSACTIONS_FILTER + 1];
    metadata[TRANSACTIONS_FILTER] = filter;
    Block {
        header: Some(BlockHeader {
            number: height,
            previous_hash: vec![0xaa; 32],
            data_hash: vec![0xbb; 32],
        }),
        data: Some(BlockData { data: envelopes }),
        metadata: Some(BlockMetadata { metadata }),
    }
}

/// Encoded block where every transaction is valid.
pub fn valid_block_bytes(height: u64, fixtures: &[TxFixture]) -> Vec<u8> {
    let envelopes = fixtures.iter().map(TxFixture::envelope_bytes).collect();
    block(height, envelopes, vec![0; fixtures.len()]).encode_to_vec()
}

/// Write `count` demo block files (heights 1..=count) into `dir`.
///
/// Each block holds one to three `basic` asset transfers; every third
/// block contains an MVCC conflict and transfers emit a `transfer` event.
pub fn write_demo_blocks(dir: &Path, count: u64) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for height in 1..=count {
        let tx_count = 1 + (height % 3) as usize;
        let fixtures: Vec<TxFixture> = (0..tx_count)
            .map(|i| {
                let tx_id = format!("{:064x}", height * 1000 + i as u64);
                let amount = (10 * (i + 1)).to_string();
                TxFixture::new(&tx_id)
                    .with_args(&["transfer", "alice", "bob", amount.as_str()])
                    .with_event("transfer", amount.as_bytes())
                    .with_timestamp(TEST_TIMESTAMP + (height as i64) * 120 + i as i64)
            })
            .collect();

        let envelopes = fixtures.iter().map(TxFixture::envelope_bytes).collect();
        let mut filter = vec![0u8; tx_count];
        if height % 3 == 0 {
            filter[tx_count - 1] = 11;
        }

        let path = dir.join(format!("{:06}.block", height));
        std::fs::write(&path, block(height, envelopes, filter).encode_to_vec())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
