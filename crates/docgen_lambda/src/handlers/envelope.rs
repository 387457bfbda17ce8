use docgen_core::contract::PubSubMessage;
use serde_json::Value;

/// Splits a raw invocation event into transport messages.
///
/// Accepted shapes: an SQS batch (`Records` with `eventSource == "aws:sqs"`,
/// each body a JSON message), a push wrapper (`{"message": {...}}`) and a bare
/// message (`{"data": "..."}`). Any other `Records` batch is rejected.
pub fn extract_messages(event: Value) -> Result<Vec<PubSubMessage>, String> {
    if is_sqs_event(&event) {
        return decode_sqs_messages(&event);
    }
    if event.get("Records").is_some() {
        return Err("`Records` must be a non-empty batch of aws:sqs records".to_string());
    }

    let Value::Object(mut object) = event else {
        return Err("event payload must be a JSON object".to_string());
    };

    let message = match object.remove("message") {
        Some(inner @ Value::Object(_)) => inner,
        Some(_) => return Err("`message` must be a JSON object".to_string()),
        None => Value::Object(object),
    };

    serde_json::from_value(message)
        .map(|message| vec![message])
        .map_err(|error| format!("invalid message: {error}"))
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

fn decode_sqs_messages(event: &Value) -> Result<Vec<PubSubMessage>, String> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| "SQS event must include Records array".to_string())?;

    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| "SQS record body must be a string".to_string())?;
        let message: PubSubMessage = serde_json::from_str(body)
            .map_err(|error| format!("invalid message in SQS record body: {error}"))?;
        messages.push(message);
    }

    Ok(messages)
}
