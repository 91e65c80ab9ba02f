/// Key layout and encoding utilities for Fjall partitions.
///
/// Partition structure:
/// - `processes`: process:{process_number} -> Process (JSON)
/// - `documents`: doc:{process_number}:{document_id} -> Document (JSON)
/// - `jobs`: job:{job_id} -> Job (JSON)
/// - `active_jobs`: active:{process_number} -> job_id (string); enforces (I3)
/// - `last_jobs`: last:{process_number} -> job_id (string); most recent job,
///   kept past the job's terminal state so the Status Projection can still
///   report which job last ran
/// - `metadata`: meta:{key} -> value (string)

pub fn encode_process_key(process_number: &str) -> Vec<u8> {
    format!("process:{}", process_number).into_bytes()
}

pub fn encode_document_key(process_number: &str, document_id: &str) -> Vec<u8> {
    format!("doc:{}:{}", process_number, document_id).into_bytes()
}

pub fn encode_document_prefix(process_number: &str) -> Vec<u8> {
    format!("doc:{}:", process_number).into_bytes()
}

pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

pub fn encode_active_job_key(process_number: &str) -> Vec<u8> {
    format!("active:{}", process_number).into_bytes()
}

pub fn encode_last_job_key(process_number: &str) -> Vec<u8> {
    format!("last:{}", process_number).into_bytes()
}

pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_key_encoding() {
        let key = encode_process_key("2024.001");
        assert_eq!(key, b"process:2024.001");
    }

    #[test]
    fn test_document_key_encoding() {
        let key = encode_document_key("2024.001", "doc-1");
        assert_eq!(key, b"doc:2024.001:doc-1");
    }

    #[test]
    fn test_document_prefix() {
        let prefix = encode_document_prefix("2024.001");
        assert_eq!(prefix, b"doc:2024.001:");
        assert!(encode_document_key("2024.001", "doc-1").starts_with(&prefix));
    }

    #[test]
    fn test_job_key_encoding() {
        let job_id = "job_123";
        let key = encode_job_key(job_id);
        assert_eq!(key, b"job:job_123");

        let decoded = decode_job_key(&key).unwrap();
        assert_eq!(decoded, job_id);
    }

    #[test]
    fn test_active_job_key_encoding() {
        let key = encode_active_job_key("2024.001");
        assert_eq!(key, b"active:2024.001");
    }

    #[test]
    fn test_meta_key_encoding() {
        let key = encode_meta_key("last_prune");
        assert_eq!(key, b"meta:last_prune");
    }
}
