//! Streaming end to end: SSE bytes from a provider, through the codec,
//! into the neutral response.

#![allow(clippy::panic)]

use futures::StreamExt;
use integration_tests::{MockProvider, MockResponse};
use llm::{CallOptions, FinishReason, Message, Part, StreamEvent, collect_response};

fn spec_stream_body() -> String {
    concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Sure\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"t1\",\"function\":{\"name\":\"add\",\"arguments\":\"{\\\"a\\\":2,\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"b\\\":3}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    )
    .to_string()
}

fn conversation() -> Vec<Message> {
    vec![
        Message::system("you are helpful"),
        Message::user("add 2 and 3 using add"),
    ]
}

#[tokio::test]
async fn text_and_tool_call_stream_produces_the_expected_response() {
    let mock = MockProvider::spawn(vec![MockResponse::Sse(spec_stream_body())]).await;
    let model = mock.provider_set().language_model("mock/test-model").unwrap();

    let stream = model
        .stream(&conversation(), &CallOptions::default())
        .await
        .unwrap();

    let response = collect_response(stream).await.unwrap();

    assert_eq!(response.parts.len(), 2);
    assert_eq!(response.parts[0], Part::Text { text: "Sure".to_string() });

    let Part::ToolCall(call) = &response.parts[1] else {
        panic!("expected a tool call part");
    };
    assert_eq!(call.id, "t1");
    assert_eq!(call.name, "add");
    assert_eq!(call.input, r#"{"a":2,"b":3}"#);

    assert_eq!(response.finish_reason, FinishReason::ToolCalls);

    // Streaming requests must opt into the final usage block.
    let request = &mock.requests()[0];
    assert_eq!(request["stream"], true);
    assert_eq!(request["stream_options"]["include_usage"], true);
}

#[tokio::test]
async fn events_arrive_in_wire_order_with_tool_calls_after_content() {
    let mock = MockProvider::spawn(vec![MockResponse::Sse(spec_stream_body())]).await;
    let model = mock.provider_set().language_model("mock/test-model").unwrap();

    let stream = model
        .stream(&conversation(), &CallOptions::default())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = stream.map(|event| event.unwrap()).collect().await;

    assert!(matches!(events[0], StreamEvent::TextDelta { .. }));
    assert!(matches!(events[1], StreamEvent::ToolCall(_)));
    assert!(matches!(events[2], StreamEvent::Usage(_)));
    assert!(matches!(events[3], StreamEvent::Finish(FinishReason::ToolCalls)));
}

#[tokio::test]
async fn stream_decode_matches_generate_on_the_same_exchange() {
    let text = "The answer is 5.";

    let buffered = serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 6, "total_tokens": 18}
    });

    let streamed = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"The answer\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" is 5.\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":6,\"total_tokens\":18}}\n\n",
        "data: [DONE]\n\n",
    )
    .to_string();

    let mock = MockProvider::spawn(vec![
        MockResponse::Json(buffered),
        MockResponse::Sse(streamed),
    ])
    .await;
    let model = mock.provider_set().language_model("mock/test-model").unwrap();

    let generated = model
        .generate(&conversation(), &CallOptions::default())
        .await
        .unwrap();

    let stream = model
        .stream(&conversation(), &CallOptions::default())
        .await
        .unwrap();
    let collected = collect_response(stream).await.unwrap();

    assert_eq!(generated.text(), collected.text());
    assert_eq!(generated.finish_reason, collected.finish_reason);
    assert_eq!(generated.usage, collected.usage);
}

#[tokio::test]
async fn provider_error_bodies_surface_with_status_and_provider() {
    let mock = MockProvider::spawn(vec![MockResponse::Error(
        429,
        serde_json::json!({"error": {"message": "rate limited", "type": "rate_limit_error"}}),
    )])
    .await;
    let model = mock.provider_set().language_model("mock/test-model").unwrap();

    let error = model
        .generate(&conversation(), &CallOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(429));
    assert_eq!(error.provider(), Some("mock"));
}
