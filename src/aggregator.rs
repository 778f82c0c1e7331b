//! Stream aggregation
//!
//! [`StreamAggregator`] consumes decoded [`StreamingEvent`]s in order and turns
//! them into [`Notification`]s: text deltas to forward, items that just became
//! final, function calls ready to run, and finally the terminal outcome.
//!
//! # Buffers
//!
//! Deltas accumulate in a buffer keyed by item id, the event family (output
//! text, refusal, reasoning, summary, arguments) and the content or summary
//! index. A buffer moves from *accumulating* to *done* exactly once, when the
//! matching `done` event arrives. The `done` event's own value is the ground
//! truth: if it differs from the concatenated deltas the mismatch is logged and
//! the final value wins. Done buffers are discarded; late deltas for them are
//! ignored.
//!
//! # Terminal events
//!
//! `response.completed`, `response.failed`, `response.incomplete` and `error`
//! are terminal. The aggregator accepts exactly one; any later event is an
//! [`ErrorKind::IllegalState`](crate::ErrorKind::IllegalState) error.

use crate::events::StreamingEvent;
use crate::types::{ContentPart, MessageRole, OutputItem, Response, ResponseStatus, ToolCall};
use crate::{Error, ErrorKind};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    OutputText,
    Refusal,
    Reasoning,
    ReasoningSummary,
    Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BufferKey {
    item_id: String,
    family: Family,
    index: u32,
}

impl BufferKey {
    fn new(item_id: &str, family: Family, index: u32) -> Self {
        Self {
            item_id: item_id.to_string(),
            family,
            index,
        }
    }
}

/// A value that just became final
#[derive(Debug, Clone, PartialEq)]
pub enum CompletedItem {
    Text { item_id: String, text: String },
    Refusal { item_id: String, refusal: String },
    Reasoning { item_id: String, text: String },
    ReasoningSummary { item_id: String, text: String },
    Arguments { item_id: String, arguments: String },
    Output { output_index: u32, item: OutputItem },
}

/// What the stream driver should do in response to an event
#[derive(Debug)]
pub enum Notification {
    TextDelta { item_id: String, delta: String },
    RefusalDelta { item_id: String, delta: String },
    ReasoningDelta { item_id: String, delta: String },
    ArgumentsDelta { item_id: String, delta: String },
    ItemCompleted(CompletedItem),
    /// A function call's arguments are final and it can be executed
    ToolCallReady(ToolCall),
    Completed(Box<Response>),
    Failed(Error),
}

#[derive(Debug, Clone)]
struct CallInfo {
    call_id: String,
    name: String,
}

/// Reassembles a response from its streaming events.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    buffers: HashMap<BufferKey, String>,
    done: HashSet<BufferKey>,
    calls: HashMap<String, CallInfo>,
    dispatched_calls: HashSet<String>,
    done_items: BTreeMap<u32, OutputItem>,
    final_texts: BTreeMap<(u32, u32), (String, String)>,
    text: String,
    last_sequence: Option<u64>,
    terminal: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All output text received so far, in arrival order.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a terminal event has been applied.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Current contents of an accumulating output text buffer.
    pub fn pending_text(&self, item_id: &str, content_index: u32) -> Option<&str> {
        self.buffers
            .get(&BufferKey::new(item_id, Family::OutputText, content_index))
            .map(String::as_str)
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &StreamingEvent) -> crate::Result<Vec<Notification>> {
        if self.terminal {
            return Err(Error::illegal_state(format!(
                "stream already terminated; unexpected '{}' event",
                event.event_type()
            )));
        }

        let sequence = event.sequence_number();
        if let Some(last) = self.last_sequence {
            if sequence < last {
                log::warn!(
                    "Out-of-order stream event '{}': sequence {} after {}",
                    event.event_type(),
                    sequence,
                    last
                );
            }
        }
        self.last_sequence = Some(sequence);

        let mut out = Vec::new();

        match event {
            StreamingEvent::OutputItemAdded(added) => {
                if let OutputItem::FunctionCall {
                    id: Some(id),
                    call_id,
                    name,
                    ..
                } = &added.item
                {
                    self.calls.insert(
                        id.clone(),
                        CallInfo {
                            call_id: call_id.clone(),
                            name: name.clone(),
                        },
                    );
                }
            }
            StreamingEvent::OutputItemDone(done) => {
                if let OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                    ..
                } = &done.item
                {
                    let item_id = id.clone().unwrap_or_else(|| call_id.clone());
                    if let Some(call) =
                        self.ready_call(&item_id, Some(call_id), Some(name.as_str()), arguments)
                    {
                        out.push(Notification::ToolCallReady(call));
                    }
                }
                self.done_items.insert(done.output_index, done.item.clone());
                out.push(Notification::ItemCompleted(CompletedItem::Output {
                    output_index: done.output_index,
                    item: done.item.clone(),
                }));
            }

            StreamingEvent::OutputTextDelta(delta) => {
                let key = BufferKey::new(&delta.item_id, Family::OutputText, delta.content_index);
                if self.push_delta(key, &delta.delta) {
                    self.text.push_str(&delta.delta);
                    out.push(Notification::TextDelta {
                        item_id: delta.item_id.clone(),
                        delta: delta.delta.clone(),
                    });
                }
            }
            StreamingEvent::OutputTextDone(done) => {
                let key = BufferKey::new(&done.item_id, Family::OutputText, done.content_index);
                if self.close_buffer(key, &done.text) {
                    self.final_texts.insert(
                        (done.output_index, done.content_index),
                        (done.item_id.clone(), done.text.clone()),
                    );
                    out.push(Notification::ItemCompleted(CompletedItem::Text {
                        item_id: done.item_id.clone(),
                        text: done.text.clone(),
                    }));
                }
            }

            StreamingEvent::RefusalDelta(delta) => {
                let key = BufferKey::new(&delta.item_id, Family::Refusal, delta.content_index);
                if self.push_delta(key, &delta.delta) {
                    out.push(Notification::RefusalDelta {
                        item_id: delta.item_id.clone(),
                        delta: delta.delta.clone(),
                    });
                }
            }
            StreamingEvent::RefusalDone(done) => {
                let key = BufferKey::new(&done.item_id, Family::Refusal, done.content_index);
                if self.close_buffer(key, &done.refusal) {
                    out.push(Notification::ItemCompleted(CompletedItem::Refusal {
                        item_id: done.item_id.clone(),
                        refusal: done.refusal.clone(),
                    }));
                }
            }

            StreamingEvent::ReasoningTextDelta(delta) => {
                let key = BufferKey::new(&delta.item_id, Family::Reasoning, delta.content_index);
                if self.push_delta(key, &delta.delta) {
                    out.push(Notification::ReasoningDelta {
                        item_id: delta.item_id.clone(),
                        delta: delta.delta.clone(),
                    });
                }
            }
            StreamingEvent::ReasoningTextDone(done) => {
                let key = BufferKey::new(&done.item_id, Family::Reasoning, done.content_index);
                if self.close_buffer(key, &done.text) {
                    out.push(Notification::ItemCompleted(CompletedItem::Reasoning {
                        item_id: done.item_id.clone(),
                        text: done.text.clone(),
                    }));
                }
            }

            StreamingEvent::ReasoningSummaryTextDelta(delta) => {
                let key = BufferKey::new(&delta.item_id, Family::ReasoningSummary, delta.summary_index);
                if self.push_delta(key, &delta.delta) {
                    out.push(Notification::ReasoningDelta {
                        item_id: delta.item_id.clone(),
                        delta: delta.delta.clone(),
                    });
                }
            }
            StreamingEvent::ReasoningSummaryTextDone(done) => {
                let key = BufferKey::new(&done.item_id, Family::ReasoningSummary, done.summary_index);
                if self.close_buffer(key, &done.text) {
                    out.push(Notification::ItemCompleted(CompletedItem::ReasoningSummary {
                        item_id: done.item_id.clone(),
                        text: done.text.clone(),
                    }));
                }
            }

            StreamingEvent::FunctionCallArgumentsDelta(delta)
            | StreamingEvent::McpCallArgumentsDelta(delta)
            | StreamingEvent::CustomToolCallInputDelta(delta)
            | StreamingEvent::CodeInterpreterCallCodeDelta(delta) => {
                let key = BufferKey::new(&delta.item_id, Family::Arguments, 0);
                if self.push_delta(key, &delta.delta) {
                    out.push(Notification::ArgumentsDelta {
                        item_id: delta.item_id.clone(),
                        delta: delta.delta.clone(),
                    });
                }
            }
            StreamingEvent::FunctionCallArgumentsDone(done) => {
                let key = BufferKey::new(&done.item_id, Family::Arguments, 0);
                if self.close_buffer(key, &done.arguments) {
                    out.push(Notification::ItemCompleted(CompletedItem::Arguments {
                        item_id: done.item_id.clone(),
                        arguments: done.arguments.clone(),
                    }));
                }
                if let Some(call) =
                    self.ready_call(&done.item_id, None, done.name.as_deref(), &done.arguments)
                {
                    out.push(Notification::ToolCallReady(call));
                }
            }
            StreamingEvent::McpCallArgumentsDone(done) => {
                self.finish_arguments(&done.item_id, &done.arguments, &mut out);
            }
            StreamingEvent::CustomToolCallInputDone(done) => {
                self.finish_arguments(&done.item_id, &done.input, &mut out);
            }
            StreamingEvent::CodeInterpreterCallCodeDone(done) => {
                self.finish_arguments(&done.item_id, &done.code, &mut out);
            }

            StreamingEvent::Completed(completed) => {
                self.terminal = true;
                let response = self.assemble(completed.response.clone());
                log::debug!(
                    "Stream completed: response {} with {} output items",
                    response.id,
                    response.output.len()
                );
                out.push(Notification::Completed(Box::new(response)));
            }
            StreamingEvent::Failed(failed) => {
                self.terminal = true;
                let response = &failed.response;
                let (code, message) = match &response.error {
                    Some(error) => (error.code.clone(), error.message.clone()),
                    None => (None, "no error details provided".to_string()),
                };
                out.push(Notification::Failed(self.failure(
                    format!(
                        "Response {} failed{}: {}",
                        response.id,
                        code.map(|c| format!(" [{}]", c)).unwrap_or_default(),
                        message
                    ),
                )));
            }
            StreamingEvent::Incomplete(incomplete) => {
                self.terminal = true;
                let reason = incomplete
                    .response
                    .incomplete_details
                    .as_ref()
                    .and_then(|d| d.reason.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                out.push(Notification::Failed(self.failure(format!(
                    "Response {} is incomplete: {}",
                    incomplete.response.id, reason
                ))));
            }
            StreamingEvent::Error(error) => {
                self.terminal = true;
                out.push(Notification::Failed(self.failure(format!(
                    "Streaming error{}: {}",
                    error
                        .code
                        .as_ref()
                        .map(|c| format!(" [{}]", c))
                        .unwrap_or_default(),
                    error.message
                ))));
            }

            // Lifecycle, content part and hosted tool progress events carry no
            // state the aggregator needs.
            _ => {}
        }

        Ok(out)
    }

    /// Report a byte stream that ended without a terminal event.
    pub fn finish(&mut self) -> Option<Error> {
        if self.terminal {
            return None;
        }
        self.terminal = true;
        Some(
            Error::connection_dropped("stream ended before a terminal event")
                .with_partial_output(self.text.clone()),
        )
    }

    fn failure(&self, message: String) -> Error {
        Error::new(ErrorKind::ResponseFailed, message)
            .with_retryable(false)
            .with_partial_output(self.text.clone())
    }

    /// Returns false when the buffer is already done.
    fn push_delta(&mut self, key: BufferKey, delta: &str) -> bool {
        if self.done.contains(&key) {
            log::warn!(
                "Ignoring delta for finished item {} ({:?})",
                key.item_id,
                key.family
            );
            return false;
        }
        self.buffers.entry(key).or_default().push_str(delta);
        true
    }

    /// Move a buffer to done. Returns false if it already was.
    fn close_buffer(&mut self, key: BufferKey, final_value: &str) -> bool {
        if !self.done.insert(key.clone()) {
            log::warn!("Duplicate done event for item {} ({:?})", key.item_id, key.family);
            return false;
        }
        if let Some(accumulated) = self.buffers.remove(&key) {
            if accumulated != final_value {
                log::warn!(
                    "Accumulated deltas for item {} ({:?}) differ from final value; using final value",
                    key.item_id,
                    key.family
                );
            }
        }
        true
    }

    fn finish_arguments(&mut self, item_id: &str, value: &str, out: &mut Vec<Notification>) {
        let key = BufferKey::new(item_id, Family::Arguments, 0);
        if self.close_buffer(key, value) {
            out.push(Notification::ItemCompleted(CompletedItem::Arguments {
                item_id: item_id.to_string(),
                arguments: value.to_string(),
            }));
        }
    }

    /// Build a tool call for `item_id` unless one was already dispatched.
    fn ready_call(
        &mut self,
        item_id: &str,
        call_id: Option<&String>,
        name: Option<&str>,
        arguments: &str,
    ) -> Option<ToolCall> {
        if self.dispatched_calls.contains(item_id) {
            return None;
        }

        let known = self.calls.get(item_id);
        let call_id = call_id
            .cloned()
            .or_else(|| known.map(|c| c.call_id.clone()));
        let name = name
            .map(str::to_string)
            .or_else(|| known.map(|c| c.name.clone()));

        match (call_id, name) {
            (Some(call_id), Some(name)) => {
                self.dispatched_calls.insert(item_id.to_string());
                Some(ToolCall {
                    item_id: Some(item_id.to_string()),
                    call_id,
                    name,
                    arguments: arguments.to_string(),
                })
            }
            _ => {
                log::debug!(
                    "Arguments for {} are final but the call is not identified yet",
                    item_id
                );
                None
            }
        }
    }

    /// Fill an empty completed response from the items seen on the stream.
    fn assemble(&self, mut response: Response) -> Response {
        if response.status == ResponseStatus::InProgress {
            response.status = ResponseStatus::Completed;
        }
        if !response.output.is_empty() {
            return response;
        }

        if !self.done_items.is_empty() {
            response.output = self.done_items.values().cloned().collect();
            return response;
        }

        let mut messages: Vec<(String, Vec<ContentPart>)> = Vec::new();
        for (item_id, text) in self.final_texts.values() {
            let part = ContentPart::OutputText {
                text: text.clone(),
                annotations: Vec::new(),
            };
            match messages.last_mut() {
                Some((id, parts)) if id == item_id => parts.push(part),
                _ => messages.push((item_id.clone(), vec![part])),
            }
        }
        response.output = messages
            .into_iter()
            .map(|(id, content)| OutputItem::Message {
                id,
                role: MessageRole::Assistant,
                status: Some("completed".to_string()),
                content,
            })
            .collect();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::decode_event;
    use serde_json::json;

    fn event(value: serde_json::Value) -> StreamingEvent {
        decode_event(&value.to_string()).unwrap()
    }

    fn text_delta(seq: u64, item: &str, delta: &str) -> StreamingEvent {
        event(json!({
            "type": "response.output_text.delta", "sequence_number": seq,
            "item_id": item, "output_index": 0, "content_index": 0, "delta": delta
        }))
    }

    fn text_done(seq: u64, item: &str, text: &str) -> StreamingEvent {
        event(json!({
            "type": "response.output_text.done", "sequence_number": seq,
            "item_id": item, "output_index": 0, "content_index": 0, "text": text
        }))
    }

    fn completed(seq: u64, output: serde_json::Value) -> StreamingEvent {
        event(json!({
            "type": "response.completed", "sequence_number": seq,
            "response": {"id": "resp_1", "status": "completed", "output": output,
                         "usage": {"input_tokens": 3, "output_tokens": 3, "total_tokens": 6}}
        }))
    }

    fn deltas(notifications: &[Notification]) -> Vec<String> {
        notifications
            .iter()
            .filter_map(|n| match n {
                Notification::TextDelta { delta, .. } => Some(delta.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_deltas_in_order() {
        let mut agg = StreamAggregator::new();
        let mut seen = Vec::new();
        for (seq, piece) in ["Hello", " ", "World"].iter().enumerate() {
            seen.extend(deltas(&agg.apply(&text_delta(seq as u64 + 1, "msg_1", piece)).unwrap()));
        }
        assert_eq!(seen, vec!["Hello", " ", "World"]);
        assert_eq!(agg.text(), "Hello World");
        assert_eq!(agg.pending_text("msg_1", 0), Some("Hello World"));
    }

    #[test]
    fn test_equal_and_regressing_sequence_numbers_still_deliver() {
        let mut agg = StreamAggregator::new();
        let mut seen = Vec::new();
        // Equal numbers are allowed; a regression only logs a warning
        for (seq, piece) in [(1, "a"), (1, "b"), (0, "c")] {
            seen.extend(deltas(&agg.apply(&text_delta(seq, "msg_1", piece)).unwrap()));
        }
        assert_eq!(seen, vec!["a", "b", "c"]);

        agg.apply(&text_done(2, "msg_1", "abc")).unwrap();
        agg.apply(&completed(3, json!([]))).unwrap();
        assert!(agg.is_terminal());
        assert_eq!(agg.text(), "abc");
    }

    #[test]
    fn test_done_uses_final_value_and_discards_buffer() {
        let mut agg = StreamAggregator::new();
        agg.apply(&text_delta(1, "msg_1", "Helo")).unwrap();
        let out = agg.apply(&text_done(2, "msg_1", "Hello")).unwrap();

        assert!(matches!(
            &out[0],
            Notification::ItemCompleted(CompletedItem::Text { text, .. }) if text == "Hello"
        ));
        assert_eq!(agg.pending_text("msg_1", 0), None);

        // late delta for a finished buffer is ignored
        assert!(agg.apply(&text_delta(3, "msg_1", "!")).unwrap().is_empty());
    }

    #[test]
    fn test_completed_response_is_assembled_from_done_text() {
        let mut agg = StreamAggregator::new();
        agg.apply(&text_delta(1, "msg_1", "Hi")).unwrap();
        agg.apply(&text_done(2, "msg_1", "Hi")).unwrap();
        let out = agg.apply(&completed(3, json!([]))).unwrap();

        match &out[0] {
            Notification::Completed(response) => {
                assert_eq!(response.output_text(), "Hi");
                assert_eq!(response.usage.unwrap().total_tokens, 6);
            }
            other => panic!("unexpected notification {:?}", other),
        }
        assert!(agg.is_terminal());
    }

    #[test]
    fn test_completed_response_keeps_server_output() {
        let mut agg = StreamAggregator::new();
        let out = agg
            .apply(&completed(
                1,
                json!([{"type": "message", "id": "m", "role": "assistant",
                        "content": [{"type": "output_text", "text": "server"}]}]),
            ))
            .unwrap();
        match &out[0] {
            Notification::Completed(response) => assert_eq!(response.output_text(), "server"),
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_terminal_state_rejects_further_events() {
        let mut agg = StreamAggregator::new();
        agg.apply(&completed(1, json!([]))).unwrap();
        let err = agg.apply(&text_delta(2, "msg_1", "late")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert!(agg.finish().is_none());
    }

    #[test]
    fn test_failed_event_carries_partial_output() {
        let mut agg = StreamAggregator::new();
        agg.apply(&text_delta(1, "msg_1", "Partial")).unwrap();
        let out = agg
            .apply(&event(json!({
                "type": "response.failed", "sequence_number": 2,
                "response": {"id": "resp_1", "status": "failed",
                             "error": {"code": "server_error", "message": "model crashed"}}
            })))
            .unwrap();

        match &out[0] {
            Notification::Failed(err) => {
                assert_eq!(err.kind(), ErrorKind::ResponseFailed);
                assert!(err.message().contains("model crashed"));
                assert!(err.message().contains("server_error"));
                assert_eq!(err.partial_output(), Some("Partial"));
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_and_error_events_fail() {
        let mut agg = StreamAggregator::new();
        let out = agg
            .apply(&event(json!({
                "type": "response.incomplete", "sequence_number": 1,
                "response": {"id": "r", "status": "incomplete",
                             "incomplete_details": {"reason": "max_output_tokens"}}
            })))
            .unwrap();
        assert!(matches!(&out[0], Notification::Failed(e) if e.message().contains("max_output_tokens")));

        let mut agg = StreamAggregator::new();
        let out = agg
            .apply(&event(json!({"type": "error", "sequence_number": 1, "message": "overloaded"})))
            .unwrap();
        assert!(matches!(&out[0], Notification::Failed(e) if e.message().contains("overloaded")));
    }

    #[test]
    fn test_finish_without_terminal_is_connection_dropped() {
        let mut agg = StreamAggregator::new();
        agg.apply(&text_delta(1, "msg_1", "Hel")).unwrap();
        let err = agg.finish().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConnectionDropped);
        assert_eq!(err.partial_output(), Some("Hel"));
    }

    #[test]
    fn test_function_call_ready_after_arguments_done() {
        let mut agg = StreamAggregator::new();
        agg.apply(&event(json!({
            "type": "response.output_item.added", "sequence_number": 1, "output_index": 0,
            "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1",
                     "name": "get_weather", "arguments": ""}
        })))
        .unwrap();
        for (seq, piece) in [r#"{"loca"#, r#"tion":"Tok"#, r#"yo"}"#].iter().enumerate() {
            let out = agg
                .apply(&event(json!({
                    "type": "response.function_call_arguments.delta", "sequence_number": seq + 2,
                    "item_id": "fc_1", "output_index": 0, "delta": piece
                })))
                .unwrap();
            assert!(matches!(&out[0], Notification::ArgumentsDelta { .. }));
        }

        let out = agg
            .apply(&event(json!({
                "type": "response.function_call_arguments.done", "sequence_number": 5,
                "item_id": "fc_1", "output_index": 0, "arguments": r#"{"location":"Tokyo"}"#
            })))
            .unwrap();

        let call = out
            .iter()
            .find_map(|n| match n {
                Notification::ToolCallReady(call) => Some(call.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.call_id, "call_1");
        assert_eq!(call.arguments, r#"{"location":"Tokyo"}"#);

        // output_item.done for the same call does not dispatch it twice
        let out = agg
            .apply(&event(json!({
                "type": "response.output_item.done", "sequence_number": 6, "output_index": 0,
                "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1",
                         "name": "get_weather", "arguments": r#"{"location":"Tokyo"}"#}
            })))
            .unwrap();
        assert!(!out.iter().any(|n| matches!(n, Notification::ToolCallReady(_))));
    }

    #[test]
    fn test_function_call_from_output_item_done_only() {
        let mut agg = StreamAggregator::new();
        let out = agg
            .apply(&event(json!({
                "type": "response.output_item.done", "sequence_number": 1, "output_index": 0,
                "item": {"type": "function_call", "id": "fc_9", "call_id": "call_9",
                         "name": "lookup", "arguments": "{}"}
            })))
            .unwrap();
        assert!(out.iter().any(|n| matches!(n, Notification::ToolCallReady(c) if c.call_id == "call_9")));
    }

    #[test]
    fn test_interleaved_items_stay_separate() {
        let mut agg = StreamAggregator::new();
        agg.apply(&text_delta(1, "msg_a", "A1")).unwrap();
        agg.apply(&text_delta(2, "msg_b", "B1")).unwrap();
        agg.apply(&text_delta(3, "msg_a", "A2")).unwrap();
        assert_eq!(agg.pending_text("msg_a", 0), Some("A1A2"));
        assert_eq!(agg.pending_text("msg_b", 0), Some("B1"));
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        let mut agg = StreamAggregator::new();
        let out = agg
            .apply(&event(json!({"type": "response.new_thing", "sequence_number": 1})))
            .unwrap();
        assert!(out.is_empty());
    }
}
