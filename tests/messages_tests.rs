// Wire format tests for Gemini Live messages

use serde_json::json;
use voice_onboarding::audio::EncodedChunk;
use voice_onboarding::live::messages::{
    ClientMessage, FunctionResponse, FunctionResult, ServerMessage,
};

#[test]
fn test_realtime_input_serialization() {
    let chunk = EncodedChunk {
        data: "AAA=".to_string(),
        sample_rate: 16000,
        sequence: 7,
    };

    let json = serde_json::to_value(ClientMessage::audio(&chunk)).unwrap();
    assert_eq!(
        json,
        json!({
            "realtimeInput": {
                "mediaChunks": [{"mimeType": "audio/pcm;rate=16000", "data": "AAA="}]
            }
        })
    );
}

#[test]
fn test_tool_response_serialization() {
    let message = ClientMessage::tool_response(FunctionResponse {
        id: "fc-1".to_string(),
        name: "selectPaymentOption".to_string(),
        response: FunctionResult {
            result: "EMI selected.".to_string(),
        },
    });

    let json = serde_json::to_value(message).unwrap();
    assert_eq!(
        json,
        json!({
            "toolResponse": {
                "functionResponses": [{
                    "id": "fc-1",
                    "name": "selectPaymentOption",
                    "response": {"result": "EMI selected."}
                }]
            }
        })
    );
}

#[test]
fn test_setup_complete_deserialization() {
    let message: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
    assert!(message.setup_complete.is_some());
    assert!(message.server_content.is_none());
}

#[test]
fn test_server_content_deserialization() {
    let json = r#"{
        "serverContent": {
            "modelTurn": {
                "parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                    {"text": "ignored"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBBB"}}
                ]
            },
            "outputTranscription": {"text": "Hello"},
            "inputTranscription": {"text": "Hi", "isFinal": true},
            "turnComplete": true
        }
    }"#;

    let message: ServerMessage = serde_json::from_str(json).unwrap();
    let content = message.server_content.unwrap();

    let payloads: Vec<&str> = content.audio_payloads().map(|b| b.data.as_str()).collect();
    assert_eq!(payloads, vec!["AAAA", "BBBB"]);

    let output = content.output_transcription.unwrap();
    assert_eq!(output.text, "Hello");
    assert!(!output.is_final);
    assert!(content.input_transcription.unwrap().is_final);
    assert!(content.turn_complete);
    assert!(!content.interrupted);
}

#[test]
fn test_interrupted_deserialization() {
    let message: ServerMessage =
        serde_json::from_str(r#"{"serverContent": {"interrupted": true}}"#).unwrap();
    let content = message.server_content.unwrap();
    assert!(content.interrupted);
    assert_eq!(content.audio_payloads().count(), 0);
}

#[test]
fn test_tool_call_deserialization() {
    let json = r#"{
        "toolCall": {
            "functionCalls": [
                {"id": "fc-9", "name": "selectPaymentOption", "args": {"option": "EMI"}}
            ]
        }
    }"#;

    let message: ServerMessage = serde_json::from_str(json).unwrap();
    let calls = message.tool_call.unwrap().function_calls;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "fc-9");
    assert_eq!(calls[0].args["option"], "EMI");
}

#[test]
fn test_unknown_fields_ignored() {
    let json = r#"{
        "usageMetadata": {"totalTokenCount": 12},
        "goAway": {"timeLeft": "10s"},
        "toolCallCancellation": {"ids": ["fc-1"]}
    }"#;

    let message: ServerMessage = serde_json::from_str(json).unwrap();
    assert_eq!(message.go_away.unwrap().time_left.as_deref(), Some("10s"));
    assert_eq!(message.tool_call_cancellation.unwrap().ids, vec!["fc-1"]);
}
