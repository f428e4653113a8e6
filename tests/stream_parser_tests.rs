use agentdeck::api::{decode_event, DecodeError, SseFrame, StreamParser};
use agentdeck::types::{DoneStatus, Role, StreamEvent, ToolCallStatus};

fn decode_all(frames: &[SseFrame]) -> Vec<Result<StreamEvent, DecodeError>> {
    frames
        .iter()
        .map(|frame| decode_event(&frame.event, &frame.data))
        .collect()
}

#[test]
fn test_fragmented_message_decodes_once_complete() {
    let mut parser = StreamParser::new();

    let chunk1 = b"event: message\ndata: {\"index\":12,\"type\":\"mess";
    assert!(parser.process(chunk1).is_empty());

    let chunk2 = b"age\",\"data\":{\"role\":\"assistant\",\"content\":\"Hi\"}}\n\n";
    let frames = parser.process(chunk2);
    assert_eq!(frames.len(), 1);

    match decode_event(&frames[0].event, &frames[0].data).expect("decodes") {
        StreamEvent::Message(message) => {
            assert_eq!(message.ordinal, 12);
            assert_eq!(message.role, Role::Assistant);
            assert_eq!(message.content, "Hi");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_malformed_payload_does_not_poison_the_parser() {
    let mut parser = StreamParser::new();

    let frames = parser.process(
        b"event: text\ndata: {invalid json}\n\nevent: done\ndata: {\"status\":\"interrupted\"}\n\n",
    );
    assert_eq!(frames.len(), 2);

    let decoded = decode_all(&frames);
    assert!(matches!(decoded[0], Err(DecodeError::MalformedJson { .. })));
    assert!(matches!(
        decoded[1],
        Ok(StreamEvent::Done {
            status: DoneStatus::Interrupted
        })
    ));
}

#[test]
fn test_ask_with_object_arguments_and_status() {
    let mut parser = StreamParser::new();

    let chunk = b"event: ask\ndata: {\"tool_calls\":[{\"id\":\"t1\",\"name\":\"file_write\",\"arguments\":{\"path\":\"a.txt\",\"content\":\"x\"},\"status\":\"pending\"}]}\n\n";
    let frames = parser.process(chunk);
    assert_eq!(frames.len(), 1);

    match decode_event(&frames[0].event, &frames[0].data).expect("ask decodes") {
        StreamEvent::Ask { tool_calls } => {
            assert_eq!(tool_calls.len(), 1);
            assert_eq!(tool_calls[0].name, "file_write");
            assert_eq!(tool_calls[0].status, Some(ToolCallStatus::Pending));
            assert_eq!(tool_calls[0].arguments()["path"], "a.txt");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_keepalive_between_events_is_ignored() {
    let mut parser = StreamParser::new();

    let frames = parser.process(
        b": ping - 2024-05-01 10:00:00\r\n\r\nevent: tool_result\r\ndata: {\"index\":3,\"type\":\"message\",\"data\":{\"role\":\"tool\",\"tool_call_id\":\"t1\",\"content\":\"ok\"}}\r\n\r\n",
    );
    assert_eq!(frames.len(), 1);

    match decode_event(&frames[0].event, &frames[0].data).expect("decodes") {
        StreamEvent::Message(message) => {
            assert_eq!(message.role, Role::Tool);
            assert_eq!(message.tool_call_id.as_deref(), Some("t1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_unknown_event_with_plain_payload_passes_through() {
    let mut parser = StreamParser::new();

    let frames = parser.process(b"event: status\ndata: {\"content\":\"thinking\"}\n\n");
    match decode_event(&frames[0].event, &frames[0].data).expect("never fails") {
        StreamEvent::Passthrough {
            event,
            content,
            ordinal,
        } => {
            assert_eq!(event, "status");
            assert_eq!(content, "thinking");
            assert_eq!(ordinal, None);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn test_non_ascii_text_survives_byte_by_byte_delivery() {
    let mut parser = StreamParser::new();
    let payload = "event: text\r\ndata: {\"index\":2,\"type\":\"message\",\"data\":{\"role\":\"assistant\",\"content\":\"héllo 日本 ✓\"}}\r\n\r\n";

    let mut frames = Vec::new();
    for byte in payload.as_bytes() {
        frames.extend(parser.process(std::slice::from_ref(byte)));
    }
    assert_eq!(frames.len(), 1);

    match decode_event(&frames[0].event, &frames[0].data).expect("decodes") {
        StreamEvent::Message(message) => assert_eq!(message.content, "héllo 日本 ✓"),
        other => panic!("unexpected event: {other:?}"),
    }
}
