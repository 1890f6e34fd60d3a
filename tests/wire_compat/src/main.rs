fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use veildrop_protocol::{FileChunk, ProtocolError, WireMessage};
    use veildrop_transfer::crypto;
    use veildrop_transfer::{Direction, Transfer, TransferKey};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Message shapes ---

    #[test]
    fn fixture_transfer_start() {
        let msg = roundtrip_test::<WireMessage>("transfer_start.json");
        let WireMessage::TransferStart(start) = msg else {
            panic!("expected transfer-start");
        };
        assert_eq!(start.chunk_size, Some(4));
        assert_eq!(start.total_chunks, 3);
    }

    #[test]
    fn fixture_legacy_transfer_start_without_chunk_size() {
        let msg = roundtrip_test::<WireMessage>("legacy_transfer_start.json");
        let WireMessage::TransferStart(start) = msg else {
            panic!("expected transfer-start");
        };
        assert_eq!(start.chunk_size, None);
    }

    #[test]
    fn fixture_file_chunk() {
        let msg = roundtrip_test::<WireMessage>("file_chunk.json");
        let WireMessage::FileChunk(chunk) = msg else {
            panic!("expected file-chunk");
        };
        assert_eq!(chunk.iv.len(), 12);
        // 4 plaintext bytes + 16-byte tag.
        assert_eq!(chunk.encrypted_data.len(), 20);
        assert!(!chunk.is_last_chunk);
    }

    #[test]
    fn fixture_key_imports() {
        let WireMessage::TransferStart(start) =
            serde_json::from_value(load_fixture("transfer_start.json")).unwrap()
        else {
            panic!("expected transfer-start");
        };
        let key = TransferKey::import(&start.encryption_key).unwrap();
        assert_eq!(key.export(), start.encryption_key);
    }

    /// The chunks in `digits_transfer.json` were sealed by an independent
    /// AES-256-GCM implementation.
    #[test]
    fn fixture_chunks_decrypt_and_reassemble() {
        let WireMessage::TransferStart(start) =
            serde_json::from_value(load_fixture("transfer_start.json")).unwrap()
        else {
            panic!("expected transfer-start");
        };
        let key = TransferKey::import(&start.encryption_key).unwrap();

        let chunks: Vec<WireMessage> =
            serde_json::from_value(load_fixture("digits_transfer.json")).unwrap();
        let mut file = Vec::new();
        for (i, msg) in chunks.into_iter().enumerate() {
            let WireMessage::FileChunk(FileChunk {
                chunk_index,
                encrypted_data,
                iv,
                checksum,
                is_last_chunk,
                ..
            }) = msg
            else {
                panic!("expected file-chunk");
            };
            assert_eq!(chunk_index as usize, i);
            assert_eq!(is_last_chunk, i == 2);
            let plain = crypto::decrypt(&encrypted_data, &key, &iv).unwrap();
            assert!(crypto::verify_checksum(&plain, &checksum));
            file.extend_from_slice(&plain);
        }
        assert_eq!(file, b"0123456789");
        assert!(crypto::verify_checksum(&file, &start.checksum));
    }

    #[test]
    fn decode_rejects_foreign_frames() {
        assert!(matches!(
            WireMessage::decode(r#"{"type":"offer","sdp":"..."}"#),
            Err(ProtocolError::UnknownType(t)) if t == "offer"
        ));
        assert!(matches!(
            WireMessage::decode(r#"{"transferId":"x"}"#),
            Err(ProtocolError::MissingType)
        ));
    }

    // --- Snapshot shape for UI layers ---

    #[test]
    fn transfer_snapshot_is_camel_case_without_key() {
        let t = Transfer::new(
            "t1",
            "digits.txt",
            10,
            4,
            3,
            TransferKey::generate(),
            "ab",
            "alice",
            Direction::Incoming,
        );
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["fileName"], "digits.txt");
        assert_eq!(v["totalChunks"], 3);
        assert_eq!(v["status"], "pending");
        assert_eq!(v["direction"], "incoming");
        assert!(v.get("encryptionKey").is_none());
        assert!(v.get("error").is_none());
    }
}
