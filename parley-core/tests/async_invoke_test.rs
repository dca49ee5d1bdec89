use capture_observer::CaptureObserver;
use echo_endpoint::{EchoTransport, LineSerializer, Script, ScriptedReply};
use parley_core::schema::{MethodSpec, ResolveError, ServiceSchema};
use parley_core::value::{Value, ValueKind};
use parley_core::{InvokeError, ParleyClient};
use std::sync::Arc;
use std::time::Duration;

mod capture_observer;

fn schema() -> ServiceSchema {
    ServiceSchema::builder()
        .endpoint("http://quotes.example/rpc".parse().unwrap())
        .method(
            MethodSpec::rpc_named("GetQuote", "getQuote")
                .params([ValueKind::String])
                .returns(ValueKind::String),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn begin_end_produces_the_same_bytes_as_the_inline_path() {
    let observer = Arc::new(CaptureObserver::default());
    let transport = EchoTransport::new();
    let client = ParleyClient::new(transport, LineSerializer, schema())
        .with_observer(observer.clone());

    let inline = client
        .invoke("GetQuote", vec![Value::from("IBM")])
        .await
        .unwrap();

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let deferred = client.end_invoke(&mut handle).await.unwrap();

    assert_eq!(inline, deferred);
    let responses = observer.responses.lock().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].1, responses[1].1);
}

#[tokio::test]
async fn unknown_length_body_is_gathered_across_suspending_reads() {
    let transport = EchoTransport::new();
    transport.push_reply(
        ScriptedReply::chunked(vec![b"hello ".to_vec(), b"body".to_vec()]).yielding(),
    );
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let value = client.end_invoke(&mut handle).await.unwrap();
    assert_eq!(value, Value::from("hello body"));
}

#[tokio::test]
async fn second_end_invoke_on_one_handle_is_a_duplicate_completion() {
    let client = ParleyClient::new(EchoTransport::new(), LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    client.end_invoke(&mut handle).await.unwrap();

    let err = client.end_invoke(&mut handle).await.unwrap_err();
    assert!(matches!(err, InvokeError::DuplicateCompletion));
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_callback_fires_after_the_exchange_finishes() {
    let client = ParleyClient::new(EchoTransport::new(), LineSerializer, schema());
    let (notify, notified) = std::sync::mpsc::channel();

    let mut handle = client
        .begin_invoke(
            "GetQuote",
            vec![Value::from("IBM")],
            Some(Box::new(move || {
                notify.send(()).expect("callback channel open");
            })),
        )
        .unwrap();

    notified
        .recv_timeout(Duration::from_secs(5))
        .expect("callback fired");
    client.end_invoke(&mut handle).await.unwrap();
}

#[tokio::test]
async fn transport_failure_surfaces_from_end_invoke_not_begin() {
    let transport = EchoTransport::new();
    transport.push(Script::Fail {
        message: "connection reset".to_string(),
        reply: None,
    });
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let err = client.end_invoke(&mut handle).await.unwrap_err();
    assert!(matches!(err, InvokeError::Transport(_)));
}

#[tokio::test]
async fn transport_failure_with_an_attached_reply_is_judged_by_its_status() {
    let transport = EchoTransport::new();
    transport.push(Script::Fail {
        message: "protocol violation".to_string(),
        reply: Some(ScriptedReply::status(500, "Internal Server Error")),
    });
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let err = client.end_invoke(&mut handle).await.unwrap_err();
    assert!(matches!(err, InvokeError::ServerProtocol(_)));
}

#[tokio::test]
async fn write_failure_leaves_no_recorded_request() {
    let transport = EchoTransport::new();
    transport.push(Script::FailOnWrite {
        message: "broken pipe".to_string(),
    });
    let log = transport.log();
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let err = client.end_invoke(&mut handle).await.unwrap_err();
    assert!(matches!(err, InvokeError::Transport(_)));
    assert!(log.written_requests().is_empty());
}

#[tokio::test]
async fn sequence_numbers_increase_across_calls() {
    let client = ParleyClient::new(EchoTransport::new(), LineSerializer, schema());

    let mut first = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let mut second = client
        .begin_invoke("GetQuote", vec![Value::from("MSFT")], None)
        .unwrap();

    assert!(first.identity().sequence < second.identity().sequence);
    assert_eq!(first.identity().proxy, second.identity().proxy);
    client.end_invoke(&mut first).await.unwrap();
    client.end_invoke(&mut second).await.unwrap();
}

#[tokio::test]
async fn begin_invoke_raises_resolution_failures_synchronously() {
    let transport = EchoTransport::new();
    let log = transport.log();
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let err = client
        .begin_invoke("nosuch", vec![], None)
        .unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Resolve(ResolveError::UnknownMethod(name)) if name == "nosuch"
    ));
    assert_eq!(log.open_count(), 0);
}

#[tokio::test]
async fn zero_length_reply_completes_without_reading() {
    let transport = EchoTransport::new();
    transport.push_reply(ScriptedReply::status(200, "OK"));
    let client = ParleyClient::new(transport, LineSerializer, schema());

    let mut handle = client
        .begin_invoke("GetQuote", vec![Value::from("IBM")], None)
        .unwrap();
    let value = client.end_invoke(&mut handle).await.unwrap();
    assert_eq!(value, Value::from(""));
}
