// File: src/decoder.rs
// Block and envelope decoding: protobuf wire messages -> flat records

use chrono::{DateTime, Utc};
use prost::Message;

use crate::error::{BlockError, DecodeError, DecodeStep};
use crate::model::{BlockSummary, ChaincodeType, HeaderType, Tx, ValidationCode};
use crate::protos::{
    Block, ChaincodeAction, ChaincodeActionPayload, ChaincodeEvent, ChaincodeInvocationSpec,
    ChaincodeProposalPayload, ChannelHeader, Envelope, Payload, ProposalResponsePayload,
    SerializedIdentity, SignatureHeader, Transaction, TRANSACTIONS_FILTER,
};

/// Decode raw block bytes (the `common.Block` encoding) into a summary.
pub fn decode_block_bytes(bytes: &[u8]) -> Result<Option<BlockSummary>, BlockError> {
    let block = Block::decode(bytes).map_err(BlockError::Block)?;
    decode_block(&block)
}

/// Summarize a block.
///
/// Returns `Ok(None)` for the genesis block (height 0), which carries only
/// channel configuration. Any envelope that fails to decode fails the whole
/// block; no partial summary is produced.
pub fn decode_block(block: &Block) -> Result<Option<BlockSummary>, BlockError> {
    let header = block.header.as_ref().ok_or(BlockError::MissingHeader)?;
    if header.number == 0 {
        return Ok(None);
    }

    let envelopes = block.data.as_ref().map(|d| d.data.as_slice()).unwrap_or_default();
    let filter = block
        .metadata
        .as_ref()
        .and_then(|m| m.metadata.get(TRANSACTIONS_FILTER))
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut summary = BlockSummary {
        height: header.number,
        previous_hash: hex::encode(&header.previous_hash),
        data_hash: hex::encode(&header.data_hash),
        timestamp: None,
        transactions: Vec::with_capacity(envelopes.len()),
    };

    for (index, raw) in envelopes.iter().enumerate() {
        let code = *filter
            .get(index)
            .ok_or(BlockError::MissingValidationCode { index })?;
        let tx = decode_envelope(raw, code)
            .map_err(|source| BlockError::Envelope { index, source })?;
        summary.transactions.push(tx);
    }

    summary.timestamp = summary.transactions.last().map(|tx| tx.timestamp);
    Ok(Some(summary))
}

/// Unwrap one transaction envelope into a flat record.
///
/// `validation_code` is the envelope's byte from the block's transaction
/// filter. Only the first transaction action is inspected.
pub fn decode_envelope(raw: &[u8], validation_code: u8) -> Result<Tx, DecodeError> {
    let envelope: Envelope = unmarshal(DecodeStep::Envelope, raw)?;
    let payload: Payload = unmarshal(DecodeStep::Payload, &envelope.payload)?;
    let header = payload
        .header
        .as_ref()
        .ok_or(DecodeError::MissingField("payload.header"))?;

    let signature_header: SignatureHeader =
        unmarshal(DecodeStep::SignatureHeader, &header.signature_header)?;
    let identity: SerializedIdentity =
        unmarshal(DecodeStep::SerializedIdentity, &signature_header.creator)?;

    let channel_header: ChannelHeader = unmarshal(DecodeStep::ChannelHeader, &header.channel_header)?;

    let transaction: Transaction = unmarshal(DecodeStep::Transaction, &payload.data)?;
    let first_action = transaction.actions.first().ok_or(DecodeError::NoActions)?;

    let (action_payload, chaincode_action) = action_payloads(&first_action.payload)?;

    let event: ChaincodeEvent = unmarshal(DecodeStep::ChaincodeEvent, &chaincode_action.events)?;

    let proposal_payload: ChaincodeProposalPayload = unmarshal(
        DecodeStep::ChaincodeProposalPayload,
        &action_payload.chaincode_proposal_payload,
    )?;
    let invocation: ChaincodeInvocationSpec =
        unmarshal(DecodeStep::ChaincodeInvocationSpec, &proposal_payload.input)?;
    let spec = invocation
        .chaincode_spec
        .ok_or(DecodeError::MissingField("chaincode_spec"))?;
    let chaincode_id = spec.chaincode_id.unwrap_or_default();
    let input = spec.input.unwrap_or_default();

    Ok(Tx {
        id: channel_header.tx_id,
        channel_id: channel_header.channel_id,
        timestamp: to_datetime(channel_header.timestamp.as_ref()),
        header_type: HeaderType::from(channel_header.r#type),
        validation_code: ValidationCode::from(validation_code),
        chaincode_type: ChaincodeType::from(spec.r#type),
        chaincode_name: chaincode_id.name,
        chaincode_version: chaincode_id.version,
        input_args: byte_list_to_string_list(&input.args),
        transient_map: proposal_payload.transient_map,
        is_init: input.is_init,
        response: chaincode_action.response.map(Into::into),
        event_name: event.event_name,
        event_payload: event.payload,
        msp_id: identity.mspid,
        msp_id_bytes: String::from_utf8_lossy(&identity.id_bytes).into_owned(),
        payload: payload.data,
    })
}

/// Convert raw chaincode arguments to strings, preserving order.
///
/// Bytes are copied as-is; sequences that are not UTF-8 become U+FFFD.
pub fn byte_list_to_string_list(args: &[Vec<u8>]) -> Vec<String> {
    args.iter()
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// Split a transaction action payload into the chaincode action payload and
/// the chaincode action carried in the proposal response extension.
fn action_payloads(raw: &[u8]) -> Result<(ChaincodeActionPayload, ChaincodeAction), DecodeError> {
    let action_payload: ChaincodeActionPayload = unmarshal(DecodeStep::ChaincodeActionPayload, raw)?;

    let response_bytes = action_payload
        .action
        .as_ref()
        .map(|a| a.proposal_response_payload.as_slice())
        .filter(|b| !b.is_empty())
        .ok_or(DecodeError::MissingField("action.proposal_response_payload"))?;
    let response_payload: ProposalResponsePayload =
        unmarshal(DecodeStep::ProposalResponsePayload, response_bytes)?;

    if response_payload.extension.is_empty() {
        return Err(DecodeError::MissingField("proposal_response_payload.extension"));
    }
    let chaincode_action: ChaincodeAction =
        unmarshal(DecodeStep::ChaincodeAction, &response_payload.extension)?;

    Ok((action_payload, chaincode_action))
}

fn unmarshal<M: Message + Default>(step: DecodeStep, bytes: &[u8]) -> Result<M, DecodeError> {
    M::decode(bytes).map_err(|source| DecodeError::Step { step, source })
}

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// Nanos outside `0..1e9` carry into the seconds; seconds past chrono's range
/// clamp to its limits. Only a missing timestamp becomes the epoch.
fn to_datetime(ts: Option<&prost_types::Timestamp>) -> DateTime<Utc> {
    let Some(ts) = ts else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    let seconds = ts.seconds.saturating_add(i64::from(ts.nanos.div_euclid(NANOS_PER_SECOND)));
    let nanos = ts.nanos.rem_euclid(NANOS_PER_SECOND).unsigned_abs();
    DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap_or(if seconds < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::{
        BlockData, BlockHeader, BlockMetadata, ChaincodeEndorsedAction, Header, TransactionAction,
    };
    use crate::samples::{TxFixture, block, envelope_with_payload, envelope_with_transaction};

    #[test]
    fn test_byte_list_to_string_list() {
        assert!(byte_list_to_string_list(&[]).is_empty());
        assert_eq!(
            byte_list_to_string_list(&[b"a".to_vec(), b"bc".to_vec()]),
            vec!["a".to_string(), "bc".to_string()]
        );
        assert_eq!(byte_list_to_string_list(&[vec![]]), vec![String::new()]);
    }

    #[test]
    fn test_decode_envelope_fields() {
        let fixture = TxFixture::new("tx-1")
            .with_args(&["transfer", "alice"])
            .with_transient("secret", b"shh")
            .with_event("transfer", &[1, 2, 3]);
        let tx = decode_envelope(&fixture.envelope_bytes(), 0).unwrap();

        assert_eq!(tx.id, "tx-1");
        assert_eq!(tx.channel_id, "mychannel");
        assert_eq!(tx.timestamp.timestamp(), fixture.timestamp_secs);
        assert_eq!(tx.header_type, HeaderType::EndorserTransaction);
        assert_eq!(tx.validation_code, ValidationCode::Valid);
        assert_eq!(tx.chaincode_type, ChaincodeType::Golang);
        assert_eq!(tx.chaincode_name, "mycc");
        assert_eq!(tx.chaincode_version, "1.0");
        assert_eq!(tx.input_args, vec!["transfer", "alice"]);
        assert_eq!(tx.transient_map.get("secret").map(Vec::as_slice), Some(&b"shh"[..]));
        assert!(!tx.is_init);
        assert_eq!(tx.event_name, "transfer");
        assert_eq!(tx.event_payload, vec![1, 2, 3]);
        assert_eq!(tx.msp_id, "Org1MSP");
        assert_eq!(tx.msp_id_bytes, "-----BEGIN CERTIFICATE-----");
        assert_eq!(tx.payload, fixture.transaction().encode_to_vec());

        let response = tx.response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.message, "OK");
    }

    #[test]
    fn test_missing_event_yields_empty_fields() {
        let tx = decode_envelope(&TxFixture::new("tx-2").envelope_bytes(), 0).unwrap();
        assert_eq!(tx.event_name, "");
        assert!(tx.event_payload.is_empty());
    }

    #[test]
    fn test_missing_timestamp_is_epoch() {
        let mut fixture = TxFixture::new("tx-3");
        fixture.timestamp_secs = 0;
        fixture.omit_timestamp = true;
        let tx = decode_envelope(&fixture.envelope_bytes(), 0).unwrap();
        assert_eq!(tx.timestamp, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_overflowing_nanos_carry_into_seconds() {
        let mut fixture = TxFixture::new("tx-3a");
        fixture.timestamp_nanos = 1_000_000_000;
        let tx = decode_envelope(&fixture.envelope_bytes(), 0).unwrap();
        assert_eq!(tx.timestamp.timestamp(), fixture.timestamp_secs + 1);
        assert_eq!(tx.timestamp.timestamp_subsec_nanos(), 0);
        assert_eq!(tx.timestamp.to_rfc3339(), "2023-11-14T22:13:21+00:00");
    }

    #[test]
    fn test_negative_nanos_borrow_from_seconds() {
        let mut fixture = TxFixture::new("tx-3b");
        fixture.timestamp_nanos = -250_000_000;
        let tx = decode_envelope(&fixture.envelope_bytes(), 0).unwrap();
        assert_eq!(tx.timestamp.timestamp(), fixture.timestamp_secs - 1);
        assert_eq!(tx.timestamp.timestamp_subsec_nanos(), 750_000_000);
    }

    #[test]
    fn test_out_of_range_seconds_clamp() {
        let late = prost_types::Timestamp { seconds: i64::MAX, nanos: 0 };
        let early = prost_types::Timestamp { seconds: i64::MIN, nanos: -1 };
        assert_eq!(to_datetime(Some(&late)), DateTime::<Utc>::MAX_UTC);
        assert_eq!(to_datetime(Some(&early)), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_validation_code_passed_through() {
        let tx = decode_envelope(&TxFixture::new("tx-4").envelope_bytes(), 11).unwrap();
        assert_eq!(tx.validation_code, ValidationCode::MvccReadConflict);
    }

    #[test]
    fn test_garbage_envelope_fails_at_envelope_step() {
        let err = decode_envelope(&[0xff, 0xff, 0xff], 0).unwrap_err();
        assert_eq!(err.step(), Some(DecodeStep::Envelope));
    }

    #[test]
    fn test_garbage_payload_fails_at_payload_step() {
        let err = decode_envelope(&envelope_with_payload(vec![0x0a, 0x05, 0x01]), 0).unwrap_err();
        assert_eq!(err.step(), Some(DecodeStep::Payload));
    }

    #[test]
    fn test_missing_payload_header() {
        let payload = Payload { header: None, data: vec![] };
        let err = decode_envelope(&envelope_with_payload(payload.encode_to_vec()), 0).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("payload.header")));
    }

    #[test]
    fn test_zero_actions_is_structural_error() {
        let fixture = TxFixture::new("tx-5");
        let raw = envelope_with_transaction(&fixture, Transaction { actions: vec![] });
        let err = decode_envelope(&raw, 0).unwrap_err();
        assert!(matches!(err, DecodeError::NoActions));
        assert_eq!(err.step(), None);
    }

    #[test]
    fn test_only_first_action_is_used() {
        let fixture = TxFixture::new("tx-6").with_args(&["first"]);
        let other = TxFixture::new("tx-6").with_args(&["second"]);
        let mut transaction = fixture.transaction();
        transaction.actions.extend(other.transaction().actions);

        let tx = decode_envelope(&envelope_with_transaction(&fixture, transaction), 0).unwrap();
        assert_eq!(tx.input_args, vec!["first"]);
    }

    #[test]
    fn test_missing_endorsed_action() {
        let fixture = TxFixture::new("tx-7");
        let action_payload = ChaincodeActionPayload {
            chaincode_proposal_payload: fixture.proposal_payload().encode_to_vec(),
            action: None,
        };
        let transaction = Transaction {
            actions: vec![TransactionAction {
                header: vec![],
                payload: action_payload.encode_to_vec(),
            }],
        };
        let err = decode_envelope(&envelope_with_transaction(&fixture, transaction), 0).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("action.proposal_response_payload")));
    }

    #[test]
    fn test_missing_response_extension() {
        let fixture = TxFixture::new("tx-8");
        let response_payload = ProposalResponsePayload {
            proposal_hash: vec![1; 32],
            extension: vec![],
        };
        let action_payload = ChaincodeActionPayload {
            chaincode_proposal_payload: fixture.proposal_payload().encode_to_vec(),
            action: Some(ChaincodeEndorsedAction {
                proposal_response_payload: response_payload.encode_to_vec(),
                endorsements: vec![],
            }),
        };
        let transaction = Transaction {
            actions: vec![TransactionAction {
                header: vec![],
                payload: action_payload.encode_to_vec(),
            }],
        };
        let err = decode_envelope(&envelope_with_transaction(&fixture, transaction), 0).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField("proposal_response_payload.extension")
        ));
    }

    #[test]
    fn test_bad_invocation_spec() {
        let mut fixture = TxFixture::new("tx-9");
        fixture.raw_invocation = Some(vec![0x0a, 0x7f]);
        let err = decode_envelope(&fixture.envelope_bytes(), 0).unwrap_err();
        assert_eq!(err.step(), Some(DecodeStep::ChaincodeInvocationSpec));
    }

    const CORRUPT: [u8; 2] = [0x0a, 0x7f];

    fn envelope_from(header: Header, transaction: Vec<u8>) -> Vec<u8> {
        envelope_with_payload(Payload { header: Some(header), data: transaction }.encode_to_vec())
    }

    fn single_action(action_payload: Vec<u8>) -> Vec<u8> {
        Transaction {
            actions: vec![TransactionAction { header: vec![], payload: action_payload }],
        }
        .encode_to_vec()
    }

    fn action_payload(proposal: Vec<u8>, response: Vec<u8>) -> Vec<u8> {
        ChaincodeActionPayload {
            chaincode_proposal_payload: proposal,
            action: Some(ChaincodeEndorsedAction {
                proposal_response_payload: response,
                endorsements: vec![],
            }),
        }
        .encode_to_vec()
    }

    fn response_payload(extension: Vec<u8>) -> Vec<u8> {
        ProposalResponsePayload { proposal_hash: vec![1; 32], extension }.encode_to_vec()
    }

    #[test]
    fn test_each_nested_message_fails_with_its_own_step() {
        let fixture = TxFixture::new("tx-10").with_event("transfer", &[1]);
        let header = fixture.header();
        let transaction = fixture.transaction().encode_to_vec();
        let proposal = fixture.proposal_payload().encode_to_vec();
        let action = fixture.chaincode_action();
        let response = response_payload(action.encode_to_vec());
        let with_action_payload = |raw: Vec<u8>| envelope_from(header.clone(), single_action(raw));

        let cases = vec![
            (
                DecodeStep::SignatureHeader,
                envelope_from(
                    Header { signature_header: CORRUPT.to_vec(), ..header.clone() },
                    transaction.clone(),
                ),
            ),
            (
                DecodeStep::SerializedIdentity,
                envelope_from(
                    Header {
                        signature_header: SignatureHeader { creator: CORRUPT.to_vec(), nonce: vec![] }
                            .encode_to_vec(),
                        ..header.clone()
                    },
                    transaction.clone(),
                ),
            ),
            (
                DecodeStep::ChannelHeader,
                envelope_from(
                    Header { channel_header: CORRUPT.to_vec(), ..header.clone() },
                    transaction.clone(),
                ),
            ),
            (DecodeStep::Transaction, envelope_from(header.clone(), CORRUPT.to_vec())),
            (DecodeStep::ChaincodeActionPayload, with_action_payload(CORRUPT.to_vec())),
            (
                DecodeStep::ProposalResponsePayload,
                with_action_payload(action_payload(proposal.clone(), CORRUPT.to_vec())),
            ),
            (
                DecodeStep::ChaincodeAction,
                with_action_payload(action_payload(proposal.clone(), response_payload(CORRUPT.to_vec()))),
            ),
            (
                DecodeStep::ChaincodeEvent,
                with_action_payload(action_payload(
                    proposal.clone(),
                    response_payload(
                        ChaincodeAction { events: CORRUPT.to_vec(), ..action.clone() }.encode_to_vec(),
                    ),
                )),
            ),
            (
                DecodeStep::ChaincodeProposalPayload,
                with_action_payload(action_payload(CORRUPT.to_vec(), response.clone())),
            ),
        ];

        for (step, raw) in cases {
            let err = decode_envelope(&raw, 0).unwrap_err();
            assert_eq!(err.step(), Some(step), "corrupted {}", step);
            assert!(err.to_string().contains(&step.to_string()));
        }

        // the untouched pieces still decode
        assert!(decode_envelope(&with_action_payload(action_payload(proposal, response)), 0).is_ok());
    }

    #[test]
    fn test_genesis_block_is_skipped() {
        let genesis = block(0, vec![vec![0xff]], vec![0]);
        assert!(decode_block(&genesis).unwrap().is_none());
    }

    #[test]
    fn test_block_without_header() {
        let headless = Block { header: None, data: None, metadata: None };
        assert!(matches!(decode_block(&headless), Err(BlockError::MissingHeader)));
    }

    #[test]
    fn test_empty_block() {
        let summary = decode_block(&block(3, vec![], vec![])).unwrap().unwrap();
        assert_eq!(summary.height, 3);
        assert!(summary.transactions.is_empty());
        assert!(summary.timestamp.is_none());
    }

    #[test]
    fn test_block_hashes_are_hex() {
        let raw = Block {
            header: Some(BlockHeader {
                number: 5,
                previous_hash: vec![0xab, 0xcd],
                data_hash: vec![0x01],
            }),
            data: Some(BlockData { data: vec![] }),
            metadata: Some(BlockMetadata { metadata: vec![] }),
        };
        let summary = decode_block(&raw).unwrap().unwrap();
        assert_eq!(summary.previous_hash, "abcd");
        assert_eq!(summary.data_hash, "01");
    }

    #[test]
    fn test_validation_codes_follow_position() {
        let envelopes = vec![
            TxFixture::new("a").envelope_bytes(),
            TxFixture::new("b").envelope_bytes(),
            TxFixture::new("c").envelope_bytes(),
        ];
        let summary = decode_block(&block(9, envelopes, vec![0, 10, 255])).unwrap().unwrap();
        let codes: Vec<_> = summary.transactions.iter().map(|tx| tx.validation_code).collect();
        assert_eq!(
            codes,
            vec![
                ValidationCode::Valid,
                ValidationCode::EndorsementPolicyFailure,
                ValidationCode::InvalidOtherReason,
            ]
        );
        assert_eq!(summary.valid_transaction_count(), 1);
    }

    #[test]
    fn test_short_filter_is_an_error() {
        let envelopes = vec![TxFixture::new("a").envelope_bytes(), TxFixture::new("b").envelope_bytes()];
        let err = decode_block(&block(4, envelopes, vec![0])).unwrap_err();
        assert!(matches!(err, BlockError::MissingValidationCode { index: 1 }));
    }

    #[test]
    fn test_one_bad_envelope_fails_block() {
        let envelopes = vec![
            TxFixture::new("a").envelope_bytes(),
            vec![0xff, 0xff],
            TxFixture::new("c").envelope_bytes(),
        ];
        match decode_block(&block(4, envelopes, vec![0, 0, 0])) {
            Err(BlockError::Envelope { index, source }) => {
                assert_eq!(index, 1);
                assert_eq!(source.step(), Some(DecodeStep::Envelope));
            }
            other => panic!("expected envelope error, got {:?}", other),
        }
    }

    #[test]
    fn test_block_timestamp_is_last_transaction() {
        let mut first = TxFixture::new("a");
        first.timestamp_secs = 1_700_000_000;
        let mut last = TxFixture::new("b");
        last.timestamp_secs = 1_700_000_123;
        let summary = decode_block(&block(2, vec![first.envelope_bytes(), last.envelope_bytes()], vec![0, 0]))
            .unwrap()
            .unwrap();
        assert_eq!(summary.timestamp, Some(summary.transactions[1].timestamp));
        assert_eq!(summary.timestamp.unwrap().timestamp(), 1_700_000_123);
    }

    #[test]
    fn test_decode_block_bytes_rejects_garbage() {
        assert!(matches!(decode_block_bytes(&[0xff, 0xff]), Err(BlockError::Block(_))));
    }
}
