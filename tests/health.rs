mod common;

use reqwest::Client;

#[tokio::test]
async fn test_health_check_works() {
    let addr = common::spawn_server().await;

    let client = Client::new();
    let response = client.get(format!("{addr}/health")).send().await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "healthy");
}

#[tokio::test]
async fn test_health_check_over_tls() {
    let addr = common::spawn_tls_server().await;
    assert!(addr.starts_with("https://"));

    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let response = client.get(format!("{addr}/health")).send().await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "healthy");
}
