use std::time::Duration;

use agentdeck::api::Credential;
use agentdeck::config::{read_token_file, Config};

fn config(api_url: &str, credential: Option<&str>) -> Config {
    Config {
        api_url: api_url.to_string(),
        credential: credential.and_then(Credential::new),
        request_timeout: Duration::from_secs(30),
        list_poll_interval: Duration::from_secs(5),
    }
}

#[test]
fn test_config_validation_requires_credential_for_remote_api() {
    assert!(config("https://chat.example.com", None).validate().is_err());
    assert!(config("https://chat.example.com", Some("tok"))
        .validate()
        .is_ok());
}

#[test]
fn test_config_validation_allows_local_endpoint_without_credential() {
    assert!(config("http://localhost:8000", None).validate().is_ok());
    assert!(config("http://127.0.0.1:8000/api", None).validate().is_ok());
}

#[test]
fn test_config_validation_rejects_bad_url_and_zero_intervals() {
    assert!(config("localhost:8000", None).validate().is_err());

    let mut zero_poll = config("http://localhost:8000", None);
    zero_poll.list_poll_interval = Duration::ZERO;
    assert!(zero_poll.validate().is_err());
}

#[test]
fn test_token_file_is_trimmed_and_blank_file_yields_none() {
    let dir = tempfile::tempdir().expect("tempdir");

    let path = dir.path().join("token");
    std::fs::write(&path, "  abc.def\n").expect("write token");
    let credential = read_token_file(&path).expect("readable").expect("present");
    assert_eq!(credential.expose(), "abc.def");

    let blank = dir.path().join("blank");
    std::fs::write(&blank, "\n").expect("write blank");
    assert!(read_token_file(&blank).expect("readable").is_none());

    assert!(read_token_file(&dir.path().join("missing")).is_err());
}
