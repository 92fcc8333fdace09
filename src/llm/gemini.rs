use super::{LlmError, ReplyService, Turn};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn new(api_key: String) -> Self {
        GeminiConfig {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: &'a [Turn],
}

/// Pull `candidates[0].content.parts[*].text` out of a response body, joined by
/// newlines. Missing or null pieces yield an empty string; only non-JSON is an
/// error.
pub fn parse_reply(body: &str) -> Result<String, LlmError> {
    let data: Value = serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;

    let text = data
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|p| p.get("text").and_then(Value::as_str).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    Ok(text)
}

pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        GeminiProvider {
            config,
            client: Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ReplyService for GeminiProvider {
    async fn reply(&self, turns: &[Turn]) -> Result<String, LlmError> {
        tracing::debug!(
            model = %self.config.model,
            turns = turns.len(),
            "Sending generateContent request"
        );

        let resp = self
            .client
            .post(self.config.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&GenerateRequest { contents: turns })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return parse_reply(&body);
        }

        // Error bodies are still JSON; they just carry no candidates.
        tracing::warn!(status = status.as_u16(), "generateContent returned an error status");
        match parse_reply(&body) {
            Ok(text) => Ok(text),
            Err(_) => Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_parse_reply_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}],"role":"model"}},
                       {"content":{"parts":[{"text":"ignored"}]}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "a\nb");
    }

    #[test]
    fn test_parse_reply_missing_shape_is_empty() {
        assert_eq!(parse_reply("{}").unwrap(), "");
        assert_eq!(parse_reply(r#"{"candidates":[]}"#).unwrap(), "");
        assert_eq!(parse_reply(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap(), "");
        assert_eq!(
            parse_reply(r#"{"error":{"code":400,"message":"bad"}}"#).unwrap(),
            ""
        );
        assert_eq!(parse_reply("null").unwrap(), "");
        assert_eq!(parse_reply(r#"{"candidates":null}"#).unwrap(), "");
        assert_eq!(
            parse_reply(r#"{"candidates":[{"content":{"parts":null}}]}"#).unwrap(),
            ""
        );
        assert_eq!(
            parse_reply(r#"{"candidates":[{"content":{"parts":[{"text":null}]}}]}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn test_parse_reply_part_without_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"x"},{"inlineData":{}}]}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "x\n");
    }

    #[test]
    fn test_parse_reply_rejects_non_json() {
        assert!(matches!(parse_reply("<html>"), Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let turns = vec![Turn::text(Role::User, "hi"), Turn::text(Role::Model, "hello")];
        let body = serde_json::to_value(GenerateRequest { contents: &turns }).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"contents": [
                {"role": "user", "parts": [{"text": "hi"}]},
                {"role": "model", "parts": [{"text": "hello"}]}
            ]})
        );
    }

    /// Serve exactly one HTTP response and return the base URL to reach it.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Drain headers and the JSON body before answering.
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider_at(base_url: String) -> GeminiProvider {
        let mut config = GeminiConfig::new("not-a-key".into());
        config.base_url = base_url;
        GeminiProvider::new(config)
    }

    #[tokio::test]
    async fn test_error_status_with_json_body_yields_empty_reply() {
        let base = serve_once(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"API key not valid"}}"#,
        )
        .await;
        let provider = provider_at(base);

        let reply = provider
            .reply(&[Turn::text(Role::User, "hello")])
            .await
            .unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_error_status_with_non_json_body_is_api_error() {
        let base = serve_once("502 Bad Gateway", "<html>upstream down</html>").await;
        let provider = provider_at(base);

        let err = provider
            .reply(&[Turn::text(Role::User, "hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_success_status_parses_reply() {
        let base = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi there"}]}}]}"#,
        )
        .await;
        let provider = provider_at(base);

        let reply = provider
            .reply(&[Turn::text(Role::User, "hello")])
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[test]
    fn test_endpoint() {
        let mut config = GeminiConfig::new("k".into());
        config.base_url = "http://localhost:9000/v1beta/".into();
        assert_eq!(
            config.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
