use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, Response };
use serde::Serialize;
use serde_json::{ Map, Value };
use url::Url;

use super::{ ChatClient, ChatError, DeltaCallback };
use crate::llm::GeminiConfig;
use crate::models::chat::{ Role, Turn };

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

pub fn build_request(turns: &[Turn], config: &GeminiConfig) -> GenerateContentRequest {
    let contents = turns
        .iter()
        .map(|turn| Content {
            role: turn.role,
            parts: vec![Part { text: turn.text.clone() }],
        })
        .collect();

    GenerateContentRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: (config.max_output_tokens > 0).then_some(config.max_output_tokens),
        },
    }
}

/// Pulls `candidates[0].content.parts[0].text` out of one response object.
///
/// Missing links yield an empty string; only a payload that is not a JSON
/// object at all is an error.
pub fn extract_text(payload: &str) -> Result<String, ChatError> {
    let response: Map<String, Value> = serde_json::from_str(payload)?;
    Ok(first_candidate_text(&response))
}

fn first_candidate_text(response: &Map<String, Value>) -> String {
    response
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Incremental decoder for `streamGenerateContent` bodies.
///
/// Bytes are fed as they arrive; complete `data:` lines are decoded right
/// away. Lines that fail to decode are skipped. If nothing was extracted by
/// the end and the body looks like a JSON array, the whole body is decoded
/// once more as an array of response objects.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    pending: Vec<u8>,
    raw: Vec<u8>,
    text: String,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8], on_delta: &mut dyn FnMut(&str)) {
        // The raw body only matters for the array fallback, which needs an empty result.
        if self.text.is_empty() {
            self.raw.extend_from_slice(bytes);
        }
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line, on_delta);
        }

        if !self.text.is_empty() && self.raw.capacity() > 0 {
            self.raw = Vec::new();
        }
    }

    /// Flushes the last unterminated line, applies the array fallback and
    /// returns the concatenated text.
    pub fn finish(mut self, on_delta: &mut dyn FnMut(&str)) -> String {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line, on_delta);
        }

        if self.text.is_empty() {
            let raw = std::mem::take(&mut self.raw);
            let body = String::from_utf8_lossy(&raw);
            if body.trim_start().starts_with('[') {
                self.recover_json_array(&body, on_delta);
            }
        }

        self.text
    }

    fn handle_line(&mut self, line: &[u8], on_delta: &mut dyn FnMut(&str)) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        match extract_text(payload) {
            Ok(chunk) => self.emit(&chunk, on_delta),
            Err(e) => debug!("Skipping undecodable stream payload: {}", e),
        }
    }

    fn recover_json_array(&mut self, body: &str, on_delta: &mut dyn FnMut(&str)) {
        match serde_json::from_str::<Vec<Value>>(body) {
            Ok(items) => {
                debug!("Decoding stream body as a JSON array of {} responses", items.len());
                for item in items {
                    let chunk = item.as_object().map(first_candidate_text).unwrap_or_default();
                    self.emit(&chunk, on_delta);
                }
            }
            Err(e) => warn!("Stream body looked like a JSON array but could not be parsed: {}", e),
        }
    }

    fn emit(&mut self, chunk: &str, on_delta: &mut dyn FnMut(&str)) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        on_delta(chunk);
    }
}

/// Decodes a fully buffered event-stream body.
pub fn decode_event_stream(body: &str, on_delta: &mut dyn FnMut(&str)) -> String {
    let mut decoder = EventStreamDecoder::new();
    decoder.push(body.as_bytes(), on_delta);
    decoder.finish(on_delta)
}

pub struct GeminiChatClient {
    http: HttpClient,
    config: GeminiConfig,
}

impl GeminiChatClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ChatError> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, streaming: bool) -> Result<Url, ChatError> {
        let method = if streaming { "streamGenerateContent" } else { "generateContent" };
        let raw = format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model_id(),
            method
        );
        let mut url = Url::parse(&raw).map_err(|e|
            ChatError::Configuration(format!("invalid Gemini URL '{}': {}", raw, e))
        )?;
        {
            let mut query = url.query_pairs_mut();
            if streaming {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", &self.config.api_key);
        }
        Ok(url)
    }

    async fn send(
        &self,
        streaming: bool,
        payload: &GenerateContentRequest
    ) -> Result<Response, ChatError> {
        let url = self.endpoint(streaming)?;
        info!(
            "GeminiChatClient → POST {} (turns={}, streaming={})",
            url.path(),
            payload.contents.len(),
            streaming
        );
        let response = self.http.post(url).json(payload).send().await?;
        ensure_success(response).await
    }

    async fn read_single(&self, payload: &GenerateContentRequest) -> Result<String, ChatError> {
        let response = self.send(false, payload).await?;
        let body = response.text().await?;
        extract_text(&body)
    }

    async fn read_streaming(
        &self,
        payload: &GenerateContentRequest,
        on_delta: DeltaCallback<'_>
    ) -> Result<String, ChatError> {
        let response = self.send(true, payload).await?;
        let mut decoder = EventStreamDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            decoder.push(&chunk, &mut *on_delta);
        }

        let text = decoder.finish(&mut *on_delta);
        debug!("Stream finished with {} chars", text.len());
        Ok(text)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Gemini responded with HTTP {}", status.as_u16());
    Err(ChatError::Transport { status: status.as_u16(), body })
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn generate_content(
        &self,
        turns: &[Turn],
        on_delta: Option<DeltaCallback<'_>>
    ) -> Result<String, ChatError> {
        if !self.config.has_api_key() {
            return Err(ChatError::Configuration("Gemini API key is missing".to_string()));
        }

        let payload = build_request(turns, &self.config);
        match on_delta {
            Some(on_delta) if self.config.streaming => self.read_streaming(&payload, on_delta).await,
            _ => self.read_single(&payload).await,
        }
    }

    fn supports_streaming(&self) -> bool {
        self.config.streaming
    }

    fn get_model(&self) -> String {
        self.config.model_id().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(text: &str) -> String {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
    }

    fn collect(body: &str) -> (String, Vec<String>) {
        let mut deltas = Vec::new();
        let text = decode_event_stream(body, &mut |d: &str| deltas.push(d.to_string()));
        (text, deltas)
    }

    #[test]
    fn request_body_carries_roles_parts_and_config() {
        let turns = vec![Turn::user("hi"), Turn::model("hello"), Turn::user("again")];
        let config = GeminiConfig { temperature: 0.5, max_output_tokens: 128, ..Default::default() };

        let body = serde_json::to_value(build_request(&turns, &config)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "hi" }] },
                    { "role": "model", "parts": [{ "text": "hello" }] },
                    { "role": "user", "parts": [{ "text": "again" }] }
                ],
                "generationConfig": { "temperature": 0.5, "maxOutputTokens": 128 }
            })
        );
    }

    #[test]
    fn zero_max_tokens_is_omitted() {
        let config = GeminiConfig { temperature: 1.0, max_output_tokens: 0, ..Default::default() };
        let body = serde_json::to_value(build_request(&[Turn::user("x")], &config)).unwrap();
        assert_eq!(body["generationConfig"], json!({ "temperature": 1.0 }));
    }

    #[test]
    fn extract_text_defaults_missing_links_to_empty() {
        assert_eq!(extract_text(&response("abc")).unwrap(), "abc");
        assert_eq!(extract_text("{}").unwrap(), "");
        assert_eq!(extract_text(r#"{"candidates":[]}"#).unwrap(), "");
        assert_eq!(extract_text(r#"{"candidates":[{"finishReason":"STOP"}]}"#).unwrap(), "");
        assert_eq!(extract_text(r#"{"candidates":[{"content":{"parts":[{}]}}]}"#).unwrap(), "");
    }

    #[test]
    fn extract_text_rejects_non_objects() {
        assert!(matches!(extract_text("not json"), Err(ChatError::Decode(_))));
        assert!(matches!(extract_text("[1, 2]"), Err(ChatError::Decode(_))));
    }

    #[test]
    fn malformed_line_between_valid_lines_is_skipped() {
        let body = format!(
            "data: {}\n\ndata: {{\"candidates\": [\n\ndata: {}\n\n",
            response("Hello, "),
            response("world")
        );
        let (text, deltas) = collect(&body);
        assert_eq!(text, "Hello, world");
        assert_eq!(deltas, vec!["Hello, ", "world"]);
    }

    #[test]
    fn blank_payloads_and_done_sentinel_are_ignored() {
        let body = format!("data:\n\ndata: {}\r\n\r\ndata: [DONE]\n", response("only"));
        let (text, deltas) = collect(&body);
        assert_eq!(text, "only");
        assert_eq!(deltas, vec!["only"]);
    }

    #[test]
    fn empty_chunks_produce_no_callback() {
        let body = format!("data: {}\ndata: {}\n", response(""), response("x"));
        let (_, deltas) = collect(&body);
        assert_eq!(deltas, vec!["x"]);
    }

    #[test]
    fn json_array_body_is_recovered() {
        let body = format!("[{},\n{}]", response("foo"), response("bar"));
        let (text, deltas) = collect(&body);
        assert_eq!(text, "foobar");
        assert_eq!(deltas, vec!["foo", "bar"]);
    }

    #[test]
    fn unparseable_array_yields_nothing() {
        let (text, deltas) = collect("[{\"candidates\": ");
        assert!(text.is_empty());
        assert!(deltas.is_empty());
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let line = format!("data: {}\n", response("héllo"));
        let bytes = line.as_bytes();
        let mut decoder = EventStreamDecoder::new();
        let mut deltas = Vec::new();
        for chunk in bytes.chunks(3) {
            decoder.push(chunk, &mut |d: &str| deltas.push(d.to_string()));
        }
        let text = decoder.finish(&mut |d: &str| deltas.push(d.to_string()));
        assert_eq!(text, "héllo");
        assert_eq!(deltas, vec!["héllo"]);
    }

    #[test]
    fn raw_body_is_dropped_once_text_arrives() {
        let mut decoder = EventStreamDecoder::new();
        let mut deltas = Vec::new();
        let mut on_delta = |d: &str| deltas.push(d.to_string());

        decoder.push(b"data: ", &mut on_delta);
        assert!(!decoder.raw.is_empty());

        decoder.push(format!("{}\n\n", response("first")).as_bytes(), &mut on_delta);
        assert!(decoder.raw.is_empty());

        decoder.push(format!("data: {}\n\n", response(" second")).as_bytes(), &mut on_delta);
        assert!(decoder.raw.is_empty());

        assert_eq!(decoder.finish(&mut on_delta), "first second");
        assert_eq!(deltas, vec!["first", " second"]);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let body = format!("data: {}", response("tail"));
        assert_eq!(collect(&body).0, "tail");
    }

    #[test]
    fn endpoint_encodes_model_mode_and_key() {
        let client = GeminiChatClient::new(GeminiConfig {
            api_key: "secret".to_string(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "http://localhost:9999/v1beta/".to_string(),
            ..Default::default()
        }).unwrap();

        let stream = client.endpoint(true).unwrap();
        assert_eq!(stream.path(), "/v1beta/models/gemini-2.0-flash:streamGenerateContent");
        assert_eq!(stream.query(), Some("alt=sse&key=secret"));

        let single = client.endpoint(false).unwrap();
        assert_eq!(single.path(), "/v1beta/models/gemini-2.0-flash:generateContent");
        assert_eq!(single.query(), Some("key=secret"));
    }

    #[test]
    fn blank_model_falls_back_to_default() {
        let client = GeminiChatClient::new(GeminiConfig {
            api_key: "k".to_string(),
            model: "  ".to_string(),
            ..Default::default()
        }).unwrap();
        assert_eq!(client.get_model(), "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn blank_api_key_fails_before_network() {
        let client = GeminiChatClient::new(GeminiConfig {
            api_key: "   ".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        }).unwrap();

        let err = client.generate_content(&[Turn::user("hi")], None).await.unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
    }
}
