use crl_watch::feed::{FeedError, FeedReader};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const REPORT: &str = "\
Salesforce Record ID, Issuer ,Subject,Full CRL Issued By This CA,JSON Array of Partitioned CRLs
001,\"CN=Root R1, O=Example, Inc.\",\"CN=Issuing CA 1, O=Example, Inc.\",http://crl.example.com/ca1.crl,[]
002,\"CN=Root R1, O=Example, Inc.\",\"CN=Issuing CA 2, O=Example, Inc.\",,\"[\"\"http://crl.example.com/2/1.crl\"\",\"\"http://crl.example.com/2/2.crl\"\"]\"
003,\"CN=Root R2; O=Other\",\"CN=Issuing CA 3; O=Other\",,\"[,]\"
";

#[tokio::test]
async fn test_download_and_read_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REPORT))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let reader = FeedReader::download(&client, &format!("{}/report.csv", server.uri()))
        .await
        .unwrap();
    let rows: Vec<_> = reader.records().collect();
    assert_eq!(rows.len(), 3);

    let first = rows[0].as_ref().unwrap();
    assert_eq!(first.organization, "Example");
    assert_eq!(first.common_name, "Issuing CA 1");
    assert_eq!(
        first.crl_urls().collect::<Vec<_>>(),
        vec!["http://crl.example.com/ca1.crl"]
    );

    let second = rows[1].as_ref().unwrap();
    assert_eq!(second.full_crl_url, None);
    assert_eq!(
        second.partitioned_crl_urls,
        vec![
            "http://crl.example.com/2/1.crl".to_string(),
            "http://crl.example.com/2/2.crl".to_string()
        ]
    );

    assert!(matches!(rows[2], Err(FeedError::MalformedRow { .. })));
}

#[tokio::test]
async fn test_feed_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = FeedReader::download(&client, &server.uri()).await;
    assert!(matches!(result, Err(FeedError::Status(status)) if status.as_u16() == 500));
}

#[tokio::test]
async fn test_feed_missing_column() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Issuer,Subject\nA,B\n"))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = FeedReader::download(&client, &server.uri()).await;
    assert!(matches!(
        result,
        Err(FeedError::MissingColumn("Full CRL Issued By This CA"))
    ));
}
