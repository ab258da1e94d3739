#[cfg(test)]
mod unit_tests {
    use crate::utils::{
        format_duration, measure_time, normalize, require_host, require_non_empty, ProbeError,
        ProbeResult,
    };
    use std::time::Duration;

    #[test]
    fn test_format_duration_milliseconds() {
        let duration = Duration::from_millis(500);
        assert_eq!(format_duration(duration), "500ms");
    }

    #[test]
    fn test_format_duration_seconds() {
        let duration = Duration::from_millis(1500);
        assert_eq!(format_duration(duration), "1.50s");
    }

    #[test]
    fn test_ok_becomes_success() {
        let result = ProbeResult::from(Ok("open".to_string()));
        assert_eq!(result, ProbeResult::success("open"));
        assert!(result.is_success());
        assert_eq!(result.text(), "open");
    }

    #[test]
    fn test_error_becomes_failure_with_reason() {
        let result = ProbeResult::from(Err(ProbeError::Resolution(
            "domain does not exist".to_string(),
        )));
        assert!(!result.is_success());
        assert_eq!(result.text(), "domain does not exist");
    }

    #[test]
    fn test_parse_error_reason_is_stable() {
        let result = ProbeResult::from(Err(ProbeError::Parse));
        assert_eq!(result, ProbeResult::failure("execution error"));
    }

    #[test]
    fn test_display_matches_text() {
        assert_eq!(ProbeResult::failure("resolver timeout").to_string(), "resolver timeout");
        assert_eq!(ProbeResult::success("200").to_string(), "200");
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let json = serde_json::to_value(ProbeResult::success("open")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["payload"], "open");

        let json = serde_json::to_value(ProbeResult::failure("nope")).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["reason"], "nope");
    }

    #[test]
    fn test_require_non_empty() {
        assert_eq!(require_non_empty("node", " host ").unwrap(), "host");
        let err = require_non_empty("node", "  ").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "node must not be empty");
    }

    #[test]
    fn test_require_host_accepts_names_and_addresses() {
        for host in ["example.com", "router1", "example.com.", "_dmarc.example.com", "10.0.0.1", "2001:db8::1"] {
            assert_eq!(require_host("node", host).unwrap(), host);
        }
        assert_eq!(require_host("node", " example.com ").unwrap(), "example.com");
    }

    #[test]
    fn test_require_host_rejects_options_and_junk() {
        let long_label = "a".repeat(64);
        for host in ["-f", "--help", "a.-b.com", "not a host name!", "a..b", ".", "user@host", long_label.as_str()] {
            let err = require_host("node", host).unwrap_err();
            assert!(err.is_validation(), "{host:?} should be rejected");
            assert!(err.to_string().starts_with("node must be a host name or IP address"));
        }
        assert_eq!(require_host("node", "").unwrap_err().to_string(), "node must not be empty");
    }

    #[tokio::test]
    async fn test_normalize_folds_errors() {
        let result = normalize("test", || async { Err(ProbeError::validation("bad input")) }).await;
        assert_eq!(result, ProbeResult::failure("bad input"));
    }

    #[tokio::test]
    async fn test_measure_time() {
        let (duration, result) = measure_time(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "test_result"
        })
        .await;

        assert!(duration >= Duration::from_millis(90));
        assert_eq!(result, "test_result");
    }
}
