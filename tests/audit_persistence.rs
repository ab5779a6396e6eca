mod common;

use std::sync::Arc;

use cedula_lookup::{CsvAuditLog, LookupConfig, LookupSource};
use common::{JANE, MockTransport, lookup_with, ok_json};
use http::Method;
use tempfile::TempDir;

#[tokio::test]
async fn audit_rows_survive_a_restart() {
    let dir = TempDir::new().expect("tempdir");
    let lookups = dir.path().join("audit/lookups.csv");
    let transcripts = dir.path().join("audit/chat_transcripts.csv");

    {
        let transport = Arc::new(MockTransport::new());
        transport.always_query(ok_json(JANE));
        let audit = Arc::new(CsvAuditLog::new(&lookups, &transcripts));
        let lookup = lookup_with(transport, audit.clone(), LookupConfig::default());
        assert_eq!(lookup.load_audit().await, 0);

        lookup.lookup("012345678-9").await.unwrap();
        lookup.lookup("0123456789").await.unwrap();
        cedula_lookup::AuditSink::flush(audit.as_ref()).await;
    }

    let content = std::fs::read_to_string(&lookups).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2, "{content}");
    assert_eq!(lines[0], "Date,Time,Identifier,DisplayName,Source");
    assert!(lines[1].ends_with(",0123456789,Jane Doe,live"), "{}", lines[1]);

    // Fresh process: empty cache, dedup set reloaded from disk.
    let transport = Arc::new(MockTransport::new());
    transport.always_query(ok_json(JANE));
    let audit = Arc::new(CsvAuditLog::new(&lookups, &transcripts));
    let lookup = lookup_with(transport.clone(), audit, LookupConfig::default());
    assert_eq!(lookup.load_audit().await, 1);

    let result = lookup.lookup("0123456789").await.unwrap();
    assert_eq!(result.source, LookupSource::Live);
    assert_eq!(transport.count(Method::POST), 1);

    let content = std::fs::read_to_string(&lookups).unwrap();
    assert_eq!(content.lines().count(), 2);
}
