use super::*;

#[test]
fn default_document_greets() {
    let store = SharedMessage::new();
    assert_eq!(store.document().get("message").and_then(Value::as_str), Some(DEFAULT_MESSAGE));
}

#[test]
fn update_replaces_whole_document() {
    let mut store = SharedMessage::default();
    let mut next = Map::new();
    next.insert("title".into(), Value::String("round two".into()));

    store.update(next);

    assert!(store.document().get("message").is_none());
    assert_eq!(store.document().get("title").and_then(Value::as_str), Some("round two"));
}

#[test]
fn snapshot_is_state_event() {
    let frame = SharedMessage::new().snapshot();
    assert_eq!(frame.event, EVENT_STATE);
    assert_eq!(frame.data.get("message").and_then(Value::as_str), Some(DEFAULT_MESSAGE));
}
