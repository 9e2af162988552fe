/// Content hash and persisted-representation tests
///
/// Digests and status strings are stored and compared across restarts, so
/// their exact form is part of the on-disk contract.
use std::str::FromStr;
use trade_ledger_types::{
    is_sha256_hex, sha256_hex, short_digest, Attachment, ContentRef, DocType,
    DocumentInvariantError, DocumentStatus, LedgerAction, Role, TransactionStatus,
};

#[test]
fn test_known_digests() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_single_bit_flip_changes_digest() {
    let original = b"BILL OF LADING No. 4471 / 20 pallets".to_vec();
    let mut flipped = original.clone();
    flipped[5] ^= 0x01;
    assert_ne!(sha256_hex(&original), sha256_hex(&flipped));
}

#[test]
fn test_short_digest_for_messages() {
    let digest = sha256_hex(b"abc");
    assert_eq!(short_digest(&digest), "ba7816bf8f01cfea...");
    assert_eq!(short_digest("abc"), "abc");
}

#[test]
fn test_uppercase_hash_is_normalized() {
    let upper = sha256_hex(b"invoice").to_ascii_uppercase();
    assert!(is_sha256_hex(&upper));

    let attachment = Attachment::from_parts(Some(ContentRef::new("mem://1")), Some(upper))
        .unwrap()
        .unwrap();
    assert_eq!(attachment.content_hash(), sha256_hex(b"invoice"));
}

#[test]
fn test_half_attachments_rejected() {
    let hash = sha256_hex(b"po");
    assert!(matches!(
        Attachment::from_parts(None, Some(hash)),
        Err(DocumentInvariantError::HashWithoutRef(_))
    ));
    assert!(matches!(
        Attachment::from_parts(Some(ContentRef::new("mem://2")), None),
        Err(DocumentInvariantError::RefWithoutHash(_))
    ));
    assert_eq!(Attachment::from_parts(None, None), Ok(None));
}

#[test]
fn test_malformed_hashes_rejected() {
    let bad = vec![
        String::new(),
        "abc".to_string(),
        "not-a-digest".to_string(),
        "g".repeat(64),
        "a".repeat(63),
    ];
    for hash in bad {
        assert!(matches!(
            Attachment::from_parts(Some(ContentRef::new("mem://3")), Some(hash)),
            Err(DocumentInvariantError::MalformedHash(_))
        ));
    }
}

#[test]
fn test_stored_strings_parse_back() {
    for action in LedgerAction::ALL {
        assert_eq!(LedgerAction::from_str(action.as_str()).unwrap(), action);
    }
    for status in TransactionStatus::ALL {
        assert_eq!(TransactionStatus::from_str(status.as_str()).unwrap(), status);
    }
    for doc_type in DocType::ALL {
        assert_eq!(DocType::from_str(doc_type.as_str()).unwrap(), doc_type);
    }
    assert_eq!(DocumentStatus::from_str("PAID").unwrap(), DocumentStatus::Paid);
}

#[test]
fn test_unknown_values_rejected() {
    assert!(Role::from_str("superuser").is_err());
    assert!(LedgerAction::from_str("create_po").is_err());
    assert!(TransactionStatus::from_str("DONE").is_err());
}

#[test]
fn test_serde_matches_column_strings() {
    let json = serde_json::to_string(&TransactionStatus::InProgress).unwrap();
    assert_eq!(json, "\"IN_PROGRESS\"");
    let json = serde_json::to_string(&LedgerAction::MarkReceived).unwrap();
    assert_eq!(json, format!("\"{}\"", LedgerAction::MarkReceived.as_str()));
}
