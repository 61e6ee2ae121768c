fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use fileservice_protocol::{CommitRequest, ErrorCode, ErrorEnvelope, UploadSession};

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

    fn parse_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
        serde_json::from_value(load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str)
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
            "roundtrip mismatch for {name}:\n  service: {fixture}\n  client:  {reserialized}"
        );
    }

    #[test]
    fn fixture_upload_session() {
        roundtrip_test::<UploadSession>("upload_session.json");
    }

    #[test]
    fn fixture_commit_request() {
        roundtrip_test::<CommitRequest>("commit_request.json");

        let request: CommitRequest = parse_fixture("commit_request.json");
        let parts = &request.file_detail.parts;
        let total: u64 = parts.iter().map(|p| p.size).sum();
        assert_eq!(total, request.file_detail.size);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
        }
    }

    #[test]
    fn fixture_error_envelope() {
        roundtrip_test::<ErrorEnvelope>("error_envelope.json");

        let envelope: ErrorEnvelope = parse_fixture("error_envelope.json");
        assert_eq!(envelope.error_code(), Some(ErrorCode::SessionAlreadyExists));
    }

    #[test]
    fn numeric_error_code_decodes() {
        let envelope: ErrorEnvelope = parse_fixture("error_envelope_numeric.json");
        assert_eq!(envelope.error_code(), Some(ErrorCode::SessionAlreadyExists));
        assert!(envelope.message.contains("already open"));
    }

    #[test]
    fn service_session_with_naive_timestamps_and_nulls() {
        let session: UploadSession = parse_fixture("upload_session_service.json");
        assert_eq!(session.chunk_size_bytes, 1_048_576);
        assert!(session.finished_at_utc.is_none());
        assert!(session.file_hash.is_none());
        assert!(session.file_name.is_none());
        assert_eq!(
            session.started_at_utc.unwrap().to_rfc3339(),
            "2018-10-20T12:30:00.123+00:00"
        );

        let reserialized = serde_json::to_value(&session).unwrap();
        let object = reserialized.as_object().unwrap();
        assert!(!object.contains_key("FileHash"));
        assert!(!object.contains_key("SessionFinishedDateTimeUtc"));
    }
}
