use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use surveykit_common::{Error, Result};
use surveykit_config::ImgbbConfig;
use tracing::info;
use url::Url;

/// Client for the ImgBB upload API. Images are sent base64-encoded in a
/// form body, with the API key as a query parameter.
#[derive(Debug)]
pub struct ImgbbClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

/// The fields we keep from a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    pub url: String,
    pub delete_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadedImage>,
    success: bool,
}

impl ImgbbClient {
    pub fn new(config: &ImgbbConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("IMGBB_API_KEY is not set".into()))?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("invalid imgbb endpoint: {e}")))?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        })
    }

    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadedImage> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let encoded = BASE64.encode(bytes);
        let form = [("image", encoded.as_str()), ("name", filename)];

        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Media(format!("imgbb request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Media(format!(
                "imgbb upload rejected ({status}): {body}"
            )));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Media(format!("imgbb response was not valid json: {e}")))?;

        match parsed {
            UploadResponse {
                success: true,
                data: Some(image),
            } => {
                info!("uploaded {} to imgbb as {}", filename, image.id);
                Ok(image)
            }
            _ => Err(Error::Media("imgbb reported an unsuccessful upload".into())),
        }
    }
}
