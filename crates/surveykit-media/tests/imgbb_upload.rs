use serde_json::json;
use surveykit_config::ImgbbConfig;
use surveykit_media::ImgbbClient;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(mock_url: &str) -> ImgbbConfig {
    ImgbbConfig {
        endpoint: format!("{mock_url}/1/upload"),
        api_key: Some("test-key".to_string()),
    }
}

#[tokio::test]
async fn upload_parses_successful_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/upload"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "2ndCYJK",
                "url": "https://i.ibb.co/2ndCYJK/plan-rdc.png",
                "delete_url": "https://ibb.co/2ndCYJK/delete-token",
                "width": 1920,
                "height": 1080
            },
            "success": true,
            "status": 200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ImgbbClient::new(&test_config(&server.uri())).unwrap();
    let image = client.upload("plan-rdc.png", b"fake png bytes").await.unwrap();

    assert_eq!(image.id, "2ndCYJK");
    assert_eq!(image.url, "https://i.ibb.co/2ndCYJK/plan-rdc.png");
    assert_eq!(image.width, Some(1920));
}

#[tokio::test]
async fn non_2xx_status_maps_to_media_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/upload"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Invalid API key", "code": 100},
            "status_code": 400
        })))
        .mount(&server)
        .await;

    let client = ImgbbClient::new(&test_config(&server.uri())).unwrap();
    let err = client.upload("plan.png", b"bytes").await.unwrap_err();
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn success_false_maps_to_media_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": null, "success": false, "status": 200})),
        )
        .mount(&server)
        .await;

    let client = ImgbbClient::new(&test_config(&server.uri())).unwrap();
    let err = client.upload("plan.png", b"bytes").await.unwrap_err();
    assert!(err.to_string().contains("unsuccessful"));
}
