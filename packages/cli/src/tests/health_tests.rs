use crate::api::health::health_check;

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let value = health_check().await.0;

    assert_eq!(
        value.get("status").and_then(|v| v.as_str()),
        Some("healthy")
    );
    assert_eq!(
        value.get("service").and_then(|v| v.as_str()),
        Some("codexa-cli")
    );
    assert!(value.get("version").is_some());
    assert!(value.get("preview_version").is_some());
}

#[tokio::test]
async fn test_health_check_timestamp() {
    let value = health_check().await.0;

    let timestamp = value.get("timestamp").and_then(|v| v.as_i64());

    assert!(timestamp.is_some());
    // Timestamp should be reasonable (after year 2020)
    assert!(timestamp.unwrap() > 1577836800);
}
