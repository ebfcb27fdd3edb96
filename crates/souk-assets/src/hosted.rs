//! HTTP client for the hosted asset service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use souk_shared::AssetReference;
use tracing::{debug, info, warn};

use crate::client::{AssetStore, DeleteCredentials, UploadFile};
use crate::config::{AssetConfig, UploadPresets};
use crate::error::{AssetError, Result};
use crate::signing::destroy_signature;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Clone)]
pub struct HostedAssetClient {
    http: reqwest::Client,
    api_url: String,
    cloud: String,
    presets: UploadPresets,
    max_size: usize,
}

impl HostedAssetClient {
    pub fn new(config: &AssetConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &AssetConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            cloud: config.cloud.clone(),
            presets: config.presets.clone(),
            max_size: config.max_asset_size,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_url, self.cloud, action)
    }
}

#[async_trait]
impl AssetStore for HostedAssetClient {
    async fn upload(&self, file: UploadFile, folder: &str) -> Result<AssetReference> {
        if file.bytes.is_empty() {
            return Err(AssetError::Empty);
        }
        if file.bytes.len() > self.max_size {
            return Err(AssetError::TooLarge {
                size: file.bytes.len(),
                max: self.max_size,
            });
        }

        let size = file.bytes.len();
        let part = Part::stream_with_length(file.bytes, size as u64).file_name(file.file_name.clone());
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.presets.for_folder(folder).to_string())
            .text("folder", folder.to_string());

        let resp = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), file = %file.file_name, "Upload rejected");
            return Err(AssetError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = resp.json().await?;
        let url = parsed
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or(AssetError::MissingUrl)?;

        info!(file = %file.file_name, size, folder, "Uploaded asset");
        Ok(AssetReference::new(url, parsed.public_id))
    }

    async fn delete(&self, public_id: &str, credentials: &DeleteCredentials) -> Result<bool> {
        if public_id.trim().is_empty() {
            return Err(AssetError::BadPath("empty public id".to_string()));
        }

        let timestamp = chrono::Utc::now().timestamp();
        let signature = destroy_signature(public_id, timestamp, &credentials.api_secret);
        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.to_string()),
            ("api_key", credentials.api_key.clone()),
            ("signature", signature),
        ];

        let resp = self
            .http
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssetError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DestroyResponse = resp.json().await?;
        let deleted = parsed.result == "ok";
        debug!(public_id, result = %parsed.result, "Destroy answered");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};
    use souk_shared::constants::{AVATAR_FOLDER, CHAT_FOLDER};

    type Seen = Arc<Mutex<HashMap<String, String>>>;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn hosted(base: &str) -> HostedAssetClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let config = AssetConfig {
            api_url: base.to_string(),
            cloud: "demo".to_string(),
            ..AssetConfig::default()
        };
        HostedAssetClient::with_client(http, &config)
    }

    /// Upload endpoint that records every multipart field, then answers.
    fn upload_route(seen: Seen, status: StatusCode, reply: Value) -> Router {
        Router::new().route(
            "/demo/image/upload",
            post(move |mut form: Multipart| async move {
                while let Some(field) = form.next_field().await.unwrap() {
                    let name = field.name().unwrap_or("").to_string();
                    if let Some(file_name) = field.file_name() {
                        let file_name = file_name.to_string();
                        seen.lock().unwrap().insert("file_name".to_string(), file_name);
                    }
                    let text = field.text().await.unwrap();
                    seen.lock().unwrap().insert(name, text);
                }
                (status, Json(reply))
            }),
        )
    }

    /// Destroy endpoint that records the form fields, then answers `result`.
    fn destroy_route(seen: Seen, result: &'static str) -> Router {
        Router::new().route(
            "/demo/image/destroy",
            post(move |Form(params): Form<HashMap<String, String>>| async move {
                seen.lock().unwrap().extend(params);
                Json(json!({ "result": result }))
            }),
        )
    }

    fn field(seen: &Seen, name: &str) -> Option<String> {
        seen.lock().unwrap().get(name).cloned()
    }

    #[tokio::test]
    async fn upload_posts_file_preset_and_folder() {
        let seen = Seen::default();
        let reply = json!({
            "secure_url": "https://res.test/demo/image/upload/v1/souk-chat-pictures/x.jpg",
            "public_id": "souk-chat-pictures/x",
        });
        let base = serve(upload_route(seen.clone(), StatusCode::OK, reply)).await;
        let c = hosted(&base);

        let reference = c
            .upload(UploadFile::new("pic.jpg", b"abc".to_vec()), CHAT_FOLDER)
            .await
            .unwrap();
        assert_eq!(reference.url, "https://res.test/demo/image/upload/v1/souk-chat-pictures/x.jpg");
        assert_eq!(reference.id.as_deref(), Some("souk-chat-pictures/x"));

        assert_eq!(field(&seen, "file").as_deref(), Some("abc"));
        assert_eq!(field(&seen, "file_name").as_deref(), Some("pic.jpg"));
        assert_eq!(field(&seen, "folder").as_deref(), Some(CHAT_FOLDER));
        assert_eq!(
            field(&seen, "upload_preset").as_deref(),
            Some(c.presets.for_folder(CHAT_FOLDER))
        );
    }

    #[tokio::test]
    async fn upload_without_public_id_keeps_url_only() {
        let reply = json!({ "secure_url": "https://res.test/demo/image/upload/v1/a.jpg" });
        let base = serve(upload_route(Seen::default(), StatusCode::OK, reply)).await;

        let reference = hosted(&base)
            .upload(UploadFile::new("a.jpg", b"a".to_vec()), "f")
            .await
            .unwrap();
        assert!(reference.id.is_none());
        assert_eq!(reference.resolved_id().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn upload_without_url_fails() {
        let reply = json!({ "public_id": "f/a" });
        let base = serve(upload_route(Seen::default(), StatusCode::OK, reply)).await;

        let err = hosted(&base)
            .upload(UploadFile::new("a.jpg", b"a".to_vec()), "f")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::MissingUrl));
    }

    #[tokio::test]
    async fn upload_error_status_is_rejected() {
        let reply = json!({ "error": { "message": "Upload preset not found" } });
        let base = serve(upload_route(Seen::default(), StatusCode::BAD_REQUEST, reply)).await;

        let err = hosted(&base)
            .upload(UploadFile::new("a.jpg", b"a".to_vec()), "f")
            .await
            .unwrap_err();
        match err {
            AssetError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Upload preset not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn destroy_is_signed_and_maps_result() {
        let seen = Seen::default();
        let base = serve(destroy_route(seen.clone(), "ok")).await;
        let creds = DeleteCredentials::new("k", "s");

        assert!(hosted(&base).delete("f/a", &creds).await.unwrap());

        assert_eq!(field(&seen, "public_id").as_deref(), Some("f/a"));
        assert_eq!(field(&seen, "api_key").as_deref(), Some("k"));
        let timestamp: i64 = field(&seen, "timestamp").unwrap().parse().unwrap();
        assert_eq!(
            field(&seen, "signature"),
            Some(destroy_signature("f/a", timestamp, "s"))
        );

        let base = serve(destroy_route(Seen::default(), "not found")).await;
        assert!(!hosted(&base).delete("f/gone", &creds).await.unwrap());
    }

    #[tokio::test]
    async fn destroy_error_status_is_rejected() {
        let app = Router::new().route(
            "/demo/image/destroy",
            post(|_body: axum::body::Bytes| async { (StatusCode::UNAUTHORIZED, "invalid signature") }),
        );
        let base = serve(app).await;

        let err = hosted(&base)
            .delete("f/a", &DeleteCredentials::new("k", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Rejected { status: 401, .. }));
        assert_eq!(err.delete_kind(), souk_shared::ErrorKind::DeleteFailed);
    }

    fn client() -> HostedAssetClient {
        let config = AssetConfig {
            api_url: "https://assets.example/v1_1/".to_string(),
            cloud: "demo".to_string(),
            max_asset_size: 8,
            ..AssetConfig::default()
        };
        HostedAssetClient::new(&config)
    }

    #[test]
    fn endpoints_follow_cloud_layout() {
        let c = client();
        assert_eq!(c.endpoint("upload"), "https://assets.example/v1_1/demo/image/upload");
        assert_eq!(c.endpoint("destroy"), "https://assets.example/v1_1/demo/image/destroy");
        assert_eq!(c.presets.for_folder(AVATAR_FOLDER), "souk_avatars");
    }

    #[tokio::test]
    async fn oversized_and_empty_uploads_fail_before_network() {
        let c = client();
        let err = c
            .upload(UploadFile::new("big.jpg", vec![0u8; 9]), "f")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::TooLarge { size: 9, max: 8 }));

        let err = c.upload(UploadFile::new("e.jpg", Vec::<u8>::new()), "f").await.unwrap_err();
        assert!(matches!(err, AssetError::Empty));
    }

    #[tokio::test]
    async fn blank_public_id_rejected() {
        let creds = DeleteCredentials::new("k", "s");
        assert!(matches!(
            client().delete("  ", &creds).await,
            Err(AssetError::BadPath(_))
        ));
    }

    #[test]
    fn upload_response_without_id() {
        let parsed: UploadResponse =
            serde_json::from_str(r#"{"secure_url":"https://h/demo/image/upload/v1/a.jpg"}"#)
                .unwrap();
        assert!(parsed.public_id.is_none());
        assert!(parsed.secure_url.is_some());
    }
}
