use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{SummarizeError, Summarizer};
use crate::types::{Article, Language, SummaryPayload};
use crate::util::truncate_chars;

/// Characters of article body included in the prompt.
const MAX_PROMPT_CONTENT_CHARS: usize = 2000;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Summarizer backed by a local Ollama server (`POST /api/generate`).
#[derive(Debug, Clone)]
pub struct OllamaSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaSummarizer {
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, SummarizeError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", host.trim_end_matches('/')),
            model: model.into(),
            timeout,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, SummarizeError> {
        let body = tokio::time::timeout(self.timeout, self.post_prompt(prompt))
            .await
            .map_err(|_| SummarizeError::Timeout(self.timeout.as_secs()))??;

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| SummarizeError::MalformedResponse(format!("invalid envelope: {e}")))?;
        Ok(parsed.response)
    }

    async fn post_prompt(&self, prompt: &str) -> Result<String, SummarizeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SummarizeError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, article: &Article) -> Result<SummaryPayload, SummarizeError> {
        let prompt = build_prompt(article);
        let reply = self.generate(&prompt).await?;
        let payload = payload_from_reply(&reply)?;
        tracing::debug!(link = %article.link, model = %self.model, "Summarized article");
        Ok(payload)
    }
}

/// Builds the generation prompt in the article's language.
///
/// The body is the description (or the title when the description is empty),
/// cut to its first 2000 characters.
pub fn build_prompt(article: &Article) -> String {
    let body = if article.description.is_empty() {
        article.title.as_str()
    } else {
        article.description.as_str()
    };
    let body = truncate_chars(body, MAX_PROMPT_CONTENT_CHARS);
    let title = &article.title;

    match article.language {
        Language::Ko => format!(
            "다음은 IT/기술 뉴스 기사다.\n\n\
             기사를 읽고 아래 JSON 형식으로만 답하라:\n\n\
             {{\n  \"summary\": \"핵심 내용을 2~3문장으로 요약 (한국어)\",\n  \
             \"points\": [\"핵심 포인트 1\", \"핵심 포인트 2\", \"핵심 포인트 3\"],\n  \
             \"insight\": \"IT 업계에 주는 의미를 1~2문장으로 (한국어)\"\n}}\n\n\
             기사 제목: {title}\n\n기사 내용:\n---\n{body}\n---\n\n\
             JSON 외의 설명은 쓰지 마라."
        ),
        Language::En => format!(
            "The following is an IT/technology news article.\n\n\
             Read it and answer only in this JSON format:\n\n\
             {{\n  \"summary\": \"The core content in 2-3 sentences\",\n  \
             \"points\": [\"Key point 1\", \"Key point 2\", \"Key point 3\"],\n  \
             \"insight\": \"What this means for the tech industry, in 1-2 sentences\"\n}}\n\n\
             Article Title: {title}\n\nArticle Content:\n---\n{body}\n---\n\n\
             Output only JSON, no other explanation."
        ),
    }
}

/// Pulls a JSON object out of a model reply.
///
/// Markdown code fences are removed and the text between the first `{` and
/// the last `}` is parsed. Returns `None` if nothing parses.
///
/// # Examples
///
/// ```
/// use newsbrief::summary::extract_json;
///
/// let reply = "Sure!\n```json\n{\"summary\": \"ok\"}\n```";
/// assert_eq!(extract_json(reply).unwrap()["summary"], "ok");
/// assert!(extract_json("no json here").is_none());
/// ```
pub fn extract_json(reply: &str) -> Option<Value> {
    let unfenced = reply.replace("```json", "").replace("```", "");
    let cleaned = unfenced.trim();
    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    };
    serde_json::from_str(candidate).ok()
}

fn payload_from_reply(reply: &str) -> Result<SummaryPayload, SummarizeError> {
    let value = extract_json(reply)
        .ok_or_else(|| SummarizeError::MalformedResponse("no JSON object in reply".to_string()))?;

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SummarizeError::MalformedResponse("missing summary".to_string()))?
        .to_string();

    let points = value
        .get("points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .take(SummaryPayload::MAX_POINTS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let insight = value
        .get("insight")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(SummaryPayload {
        summary,
        points,
        insight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(language: Language, description: &str) -> Article {
        Article {
            link: "https://example.com/a".to_string(),
            title: "Chip exports rise".to_string(),
            description: description.to_string(),
            published_at: Utc::now(),
            source: "Example".to_string(),
            language,
        }
    }

    fn summarizer(server: &MockServer) -> OllamaSummarizer {
        OllamaSummarizer::new(&server.uri(), "phi3:mini", Duration::from_secs(5)).unwrap()
    }

    fn ollama_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "phi3:mini",
            "response": text,
            "done": true
        }))
    }

    #[test]
    fn test_prompt_language_and_truncation() {
        let long = "가".repeat(2500);
        let ko = build_prompt(&article(Language::Ko, &long));
        assert!(ko.contains("기사 제목: Chip exports rise"));
        assert!(ko.contains(&"가".repeat(2000)));
        assert!(!ko.contains(&"가".repeat(2001)));

        let en = build_prompt(&article(Language::En, "Body text"));
        assert!(en.contains("Article Title: Chip exports rise"));
        assert!(en.contains("---\nBody text\n---"));
    }

    #[test]
    fn test_prompt_uses_title_when_description_empty() {
        let prompt = build_prompt(&article(Language::En, ""));
        assert!(prompt.contains("---\nChip exports rise\n---"));
    }

    #[test]
    fn test_payload_from_fenced_reply() {
        let reply = "```json\n{\"summary\": \" Exports grew. \", \"points\": [\"a\", \"b\", \"c\", \"d\"], \"insight\": \"Demand\"}\n```";
        let payload = payload_from_reply(reply).unwrap();
        assert_eq!(
            payload,
            SummaryPayload {
                summary: "Exports grew.".to_string(),
                points: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                insight: "Demand".to_string(),
            }
        );
    }

    #[test]
    fn test_payload_missing_optional_fields() {
        let payload = payload_from_reply(r#"{"summary": "Only this", "points": "oops"}"#).unwrap();
        assert!(payload.points.is_empty());
        assert_eq!(payload.insight, "");
    }

    #[test]
    fn test_payload_without_summary_is_malformed() {
        assert!(matches!(
            payload_from_reply(r#"{"summary": "  ", "points": []}"#),
            Err(SummarizeError::MalformedResponse(_))
        ));
        assert!(matches!(
            payload_from_reply("I cannot help with that."),
            Err(SummarizeError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_summarize_posts_generate_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "phi3:mini",
                "stream": false
            })))
            .respond_with(ollama_reply(
                "Here you go: {\"summary\": \"S\", \"points\": [\"P\"], \"insight\": \"I\"}",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let payload = summarizer(&server)
            .summarize(&article(Language::En, "Body"))
            .await
            .unwrap();
        assert_eq!(payload.summary, "S");
        assert_eq!(payload.points, vec!["P".to_string()]);
        assert_eq!(payload.insight, "I");
    }

    #[tokio::test]
    async fn test_summarize_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = summarizer(&server)
            .summarize(&article(Language::En, "Body"))
            .await;
        assert!(matches!(result, Err(SummarizeError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_summarize_non_json_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let result = summarizer(&server)
            .summarize(&article(Language::En, "Body"))
            .await;
        assert!(matches!(result, Err(SummarizeError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_summarize_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ollama_reply("{}").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let summarizer =
            OllamaSummarizer::new(&server.uri(), "phi3:mini", Duration::from_millis(50)).unwrap();
        let result = summarizer.summarize(&article(Language::En, "Body")).await;
        assert!(matches!(result, Err(SummarizeError::Timeout(_))));
    }
}
