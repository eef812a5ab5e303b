//! Integration tests for lookin-mcp.
//!
//! These drive the real transport against in-process fake LookinServers:
//! TCP listeners that parse frames with the same wire rules and answer
//! with hand-built keyed archives.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lookin_mcp::archive::classes::{AttributeModification, DisplayItem, HierarchyInfo, LookinObject};
use lookin_mcp::archive::{decode_bytes, encode_root, ArchiveValue, ArchivedObject};
use lookin_mcp::attributes;
use lookin_mcp::error::LookinError;
use lookin_mcp::protocol::{build_frame, request_types, Header, HEADER_SIZE};
use lookin_mcp::requests::{InvokeOutcome, RequestManager};
use lookin_mcp::transport::{self, Connection, ConnectionState};

fn object(class: &str, fields: Vec<(&str, ArchiveValue)>) -> ArchiveValue {
    ArchiveValue::Object(ArchivedObject {
        class_name: class.into(),
        fields: fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    })
}

/// Bytes of a response envelope the way the agent archives one.
fn response_bytes(data: ArchiveValue, error: Option<&str>, background: bool) -> Vec<u8> {
    let error = match error {
        Some(msg) => ArchiveValue::String(msg.into()),
        None => ArchiveValue::Null,
    };
    encode_root(&object(
        "LookinConnectionResponseAttachment",
        vec![
            ("data", data),
            ("error", error),
            ("appIsInBackground", ArchiveValue::Bool(background)),
        ],
    ))
    .unwrap()
}

/// Unwrap the `data` field of a request attachment payload.
fn attachment_data(payload: &[u8]) -> ArchiveValue {
    let root = decode_bytes(payload).unwrap();
    let obj = root.as_object().expect("request payload is an attachment");
    assert_eq!(obj.class_name, "LookinConnectionAttachment");
    obj.field("data").clone()
}

async fn read_request(stream: &mut TcpStream) -> Option<(u32, u32, Vec<u8>)> {
    let mut header_buf = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_buf).await.ok()?;
    let header = Header::decode(&header_buf).unwrap();
    assert_eq!(header.version, 1, "client must send version 1");
    let mut payload = vec![0u8; header.payload_length as usize];
    stream.read_exact(&mut payload).await.ok()?;
    Some((header.frame_type, header.tag, payload))
}

async fn respond(stream: &mut TcpStream, frame_type: u32, tag: u32, payload: &[u8]) {
    let bytes = build_frame(frame_type, tag, payload);
    stream.write_all(&bytes).await.unwrap();
}

/// Spawn a fake server answering every request through `handler`.
async fn spawn_server<F>(mut handler: F) -> u16
where
    F: FnMut(u32, Vec<u8>) -> Option<Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Some((frame_type, tag, payload)) = read_request(&mut stream).await {
            if let Some(response) = handler(frame_type, payload) {
                respond(&mut stream, frame_type, tag, &response).await;
            }
        }
    });
    port
}

async fn connected_manager(port: u16) -> RequestManager {
    let connection = Arc::new(Connection::new());
    connection.connect(port).await.unwrap();
    RequestManager::new(connection)
}

// Scenario: port discovery hit. One listener inside the well-known range;
// the sweep finds exactly that port.
#[tokio::test]
async fn port_discovery_finds_the_live_port() {
    // Take whichever port of the range is free in this environment.
    let mut bound = None;
    for port in transport::PORT_RANGE {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            bound = Some((listener, port));
            break;
        }
    }
    let (listener, port) = bound.expect("no free port in the Lookin range");

    let found = transport::find_first(transport::PORT_RANGE, Duration::from_secs(2)).await;
    assert_eq!(found, Some(port));

    let all = transport::find_all(transport::PORT_RANGE, Duration::from_secs(2)).await;
    assert_eq!(all, vec![port]);
    drop(listener);
}

// Scenario: ping happy path.
#[tokio::test]
async fn ping_reports_foreground_app() {
    let port = spawn_server(|frame_type, _payload| {
        assert_eq!(frame_type, request_types::PING);
        Some(response_bytes(ArchiveValue::Null, None, false))
    })
    .await;

    let manager = connected_manager(port).await;
    let status = manager.ping().await.unwrap();
    assert!(!status.app_is_in_background);
}

#[tokio::test]
async fn ping_accepts_empty_reply_payload() {
    let port = spawn_server(|_, _| Some(Vec::new())).await;
    let manager = connected_manager(port).await;
    let status = manager.ping().await.unwrap();
    assert!(!status.app_is_in_background);
}

#[tokio::test]
async fn ping_surfaces_backgrounded_app() {
    let port = spawn_server(|_, _| Some(response_bytes(ArchiveValue::Null, None, true))).await;
    let manager = connected_manager(port).await;
    assert!(manager.ping().await.unwrap().app_is_in_background);
}

// Scenario: interleaved requests answered out of request order.
#[tokio::test]
async fn interleaved_requests_resolve_independently() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Hierarchy arrives first, ping second; answer ping first.
        let (h_type, h_tag, _) = read_request(&mut stream).await.unwrap();
        assert_eq!(h_type, request_types::HIERARCHY);
        let (p_type, p_tag, _) = read_request(&mut stream).await.unwrap();
        assert_eq!(p_type, request_types::PING);

        respond(
            &mut stream,
            p_type,
            p_tag,
            &response_bytes(ArchiveValue::Null, None, false),
        )
        .await;
        let hierarchy = object(
            "LookinHierarchyInfo",
            vec![("displayItems", ArchiveValue::Array(vec![]))],
        );
        respond(
            &mut stream,
            h_type,
            h_tag,
            &response_bytes(hierarchy, None, false),
        )
        .await;
    });

    let manager = Arc::new(connected_manager(port).await);

    let m1 = manager.clone();
    let hierarchy_task = tokio::spawn(async move { m1.hierarchy().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    let m2 = manager.clone();
    let ping_task = tokio::spawn(async move { m2.ping().await });

    let hierarchy = hierarchy_task.await.unwrap().unwrap();
    let ping = ping_task.await.unwrap().unwrap();
    assert!(hierarchy.display_items.is_empty());
    assert!(!ping.app_is_in_background);
}

// Scenario: server error surfacing without teardown.
#[tokio::test]
async fn server_error_surfaces_and_connection_survives() {
    let port = spawn_server(|frame_type, _| match frame_type {
        request_types::INBUILT_ATTR_MODIFICATION => Some(response_bytes(
            ArchiveValue::Null,
            Some("no object found for oid 0"),
            false,
        )),
        _ => Some(response_bytes(ArchiveValue::Null, None, false)),
    })
    .await;

    let manager = connected_manager(port).await;
    let modification = AttributeModification {
        target_oid: 0,
        setter_selector: "setFoo:".into(),
        attr_type: attributes::AttrType::Bool.code(),
        value: ArchiveValue::Bool(true),
    };

    let err = manager.modify_attribute(&modification).await.unwrap_err();
    match err {
        LookinError::ServerError(msg) => assert_eq!(msg, "no object found for oid 0"),
        other => panic!("expected ServerError, got {other:?}"),
    }

    // The transport is still Ready and serving.
    assert_eq!(manager.connection().state(), ConnectionState::Ready);
    manager.ping().await.unwrap();
}

// App info may come back as a full hierarchy; the manager extracts appInfo.
#[tokio::test]
async fn app_info_accepts_hierarchy_shaped_response() {
    let port = spawn_server(|frame_type, payload| {
        assert_eq!(frame_type, request_types::APP);
        let data = attachment_data(&payload);
        let params = data.as_dict().unwrap();
        assert_eq!(params["needImages"].as_bool(), Some(false));
        assert_eq!(params["local"].as_array().unwrap().len(), 0);

        let app_info = object(
            "LookinAppInfo",
            vec![
                ("appName", ArchiveValue::String("Demo".into())),
                ("deviceDescription", ArchiveValue::String("iPhone 15".into())),
                ("osDescription", ArchiveValue::String("iOS 17.2".into())),
                ("screenWidth", ArchiveValue::Double(390.0)),
                ("screenHeight", ArchiveValue::Double(844.0)),
                ("screenScale", ArchiveValue::Double(3.0)),
            ],
        );
        let hierarchy = object(
            "LookinHierarchyInfo",
            vec![
                ("displayItems", ArchiveValue::Array(vec![])),
                ("appInfo", app_info),
            ],
        );
        Some(response_bytes(hierarchy, None, false))
    })
    .await;

    let manager = connected_manager(port).await;
    let info = manager.app_info().await.unwrap();
    assert_eq!(info.app_name, "Demo");
    assert_eq!(info.screen_width, 390.0);
    assert_eq!(info.screen_scale, 3.0);
}

#[tokio::test]
async fn invoke_method_distinguishes_void_and_value() {
    let port = spawn_server(|frame_type, payload| {
        assert_eq!(frame_type, request_types::INVOKE_METHOD);
        let data = attachment_data(&payload);
        let params = data.as_dict().unwrap();
        let selector = params["text"].as_str().unwrap();
        let description = if selector == "layoutIfNeeded" {
            "LOOKIN_TAG_RETURN_VALUE_VOID".to_string()
        } else {
            "<UILabel: 0x600>".to_string()
        };
        let dict = ArchiveValue::Dict(
            [("description".to_string(), ArchiveValue::String(description))]
                .into_iter()
                .collect(),
        );
        Some(response_bytes(dict, None, false))
    })
    .await;

    let manager = connected_manager(port).await;
    assert_eq!(
        manager.invoke_method(0x600, "layoutIfNeeded").await.unwrap(),
        InvokeOutcome::Void
    );
    match manager.invoke_method(0x600, "description").await.unwrap() {
        InvokeOutcome::Description(d) => assert!(d.contains("UILabel")),
        other => panic!("expected a description, got {other:?}"),
    }
}

#[tokio::test]
async fn list_selectors_roundtrip() {
    let port = spawn_server(|frame_type, payload| {
        assert_eq!(frame_type, request_types::ALL_SELECTOR_NAMES);
        let data = attachment_data(&payload);
        let params = data.as_dict().unwrap();
        assert_eq!(params["className"].as_str(), Some("UILabel"));
        assert_eq!(params["hasArg"].as_bool(), Some(false));

        let names = ArchiveValue::Array(vec![
            ArchiveValue::String("text".into()),
            ArchiveValue::String("sizeToFit".into()),
        ]);
        Some(response_bytes(names, None, false))
    })
    .await;

    let manager = connected_manager(port).await;
    let selectors = manager.list_selectors("UILabel", false).await.unwrap();
    assert_eq!(selectors, vec!["text".to_string(), "sizeToFit".to_string()]);
}

fn text_bearing_item(view_oid: u64, layer_oid: u64) -> DisplayItem {
    DisplayItem {
        view_object: Some(LookinObject {
            oid: view_oid,
            class_chain: vec!["UILabel".into(), "UIView".into()],
        }),
        layer_object: Some(LookinObject {
            oid: layer_oid,
            class_chain: vec!["CALayer".into()],
        }),
        ..Default::default()
    }
}

/// Attribute-groups payload carrying one `lb_t_t` string.
fn label_groups(text: &str) -> ArchiveValue {
    ArchiveValue::Array(vec![object(
        "LookinAttributesGroup",
        vec![
            ("identifier", ArchiveValue::String("UILabel".into())),
            (
                "attrSections",
                ArchiveValue::Array(vec![object(
                    "LookinAttributesSection",
                    vec![
                        ("identifier", ArchiveValue::String("text".into())),
                        (
                            "attributes",
                            ArchiveValue::Array(vec![object(
                                "LookinAttribute",
                                vec![
                                    ("identifier", ArchiveValue::String("lb_t_t".into())),
                                    ("attrType", ArchiveValue::Integer(23)),
                                    ("value", ArchiveValue::String(text.into())),
                                ],
                            )]),
                        ),
                    ],
                )]),
            ),
        ],
    )])
}

// Scenario: text enrichment with per-view failures swallowed.
#[tokio::test]
async fn text_enrichment_swallows_per_view_failures() {
    // 25 labels; layer oids 1001..=1025. Views #3 and #17 fail server-side.
    let items: Vec<DisplayItem> = (1..=25u64)
        .map(|i| text_bearing_item(i, 1000 + i))
        .collect();
    let hierarchy = HierarchyInfo {
        display_items: items,
        app_info: None,
    };

    let port = spawn_server(move |frame_type, payload| {
        assert_eq!(frame_type, request_types::ALL_ATTR_GROUPS);
        let layer_oid = attachment_data(&payload).as_u64().unwrap();
        let index = layer_oid - 1000;
        if index == 3 || index == 17 {
            return Some(response_bytes(
                ArchiveValue::Null,
                Some("object was released"),
                false,
            ));
        }
        Some(response_bytes(
            label_groups(&format!("text-{index}")),
            None,
            false,
        ))
    })
    .await;

    let manager = connected_manager(port).await;
    let map = manager.fetch_text_content_map(&hierarchy, 10).await;

    assert_eq!(map.len(), 23);
    assert!(!map.contains_key(&3));
    assert!(!map.contains_key(&17));
    assert_eq!(map.get(&1).map(String::as_str), Some("text-1"));
    assert_eq!(map.get(&25).map(String::as_str), Some("text-25"));
}

fn display_item_value(view_oid: u64, layer_oid: u64, class: &str) -> ArchiveValue {
    let chain = |names: &[&str]| {
        ArchiveValue::Array(
            names
                .iter()
                .map(|n| ArchiveValue::String((*n).into()))
                .collect(),
        )
    };
    object(
        "LookinDisplayItem",
        vec![
            (
                "viewObject",
                object(
                    "LookinObject",
                    vec![
                        ("oid", ArchiveValue::Integer(view_oid as i64)),
                        ("classChainList", chain(&[class, "UIView"])),
                    ],
                ),
            ),
            (
                "layerObject",
                object(
                    "LookinObject",
                    vec![
                        ("oid", ArchiveValue::Integer(layer_oid as i64)),
                        ("classChainList", chain(&["CALayer"])),
                    ],
                ),
            ),
            ("frame", ArchiveValue::String("{{0, 0}, {100, 44}}".into())),
            ("isHidden", ArchiveValue::Bool(false)),
            ("alpha", ArchiveValue::Double(1.0)),
            ("subitems", ArchiveValue::Array(vec![])),
        ],
    )
}

// Invariant: a successful modification empties the text cache, so the next
// text lookup goes back to the server.
#[tokio::test]
async fn modification_invalidates_the_text_cache() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let attr_fetches = Arc::new(AtomicUsize::new(0));
    let counter = attr_fetches.clone();

    let port = spawn_server(move |frame_type, _payload| match frame_type {
        request_types::HIERARCHY => {
            let hierarchy = object(
                "LookinHierarchyInfo",
                vec![(
                    "displayItems",
                    ArchiveValue::Array(vec![display_item_value(2, 102, "UILabel")]),
                )],
            );
            Some(response_bytes(hierarchy, None, false))
        }
        request_types::ALL_ATTR_GROUPS => {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(response_bytes(label_groups("Hello"), None, false))
        }
        request_types::INBUILT_ATTR_MODIFICATION => {
            let detail = object(
                "LookinDisplayItemDetail",
                vec![("oid", ArchiveValue::Integer(2))],
            );
            Some(response_bytes(detail, None, false))
        }
        _ => Some(response_bytes(ArchiveValue::Null, None, false)),
    })
    .await;

    let mut session = lookin_mcp::Session::new();
    session.connect(Some(port)).await.unwrap();
    session.hierarchy(true).await.unwrap();

    let map = session.text_map().await.unwrap();
    assert_eq!(map.get(&2).map(String::as_str), Some("Hello"));
    assert_eq!(attr_fetches.load(Ordering::SeqCst), 1);

    // Cached: no new server traffic.
    session.text_map().await.unwrap();
    assert_eq!(attr_fetches.load(Ordering::SeqCst), 1);

    // A successful modification clears the cache...
    session.modify(2, "hidden", "true").await.unwrap();

    // ...so the next lookup fetches again.
    session.text_map().await.unwrap();
    assert_eq!(attr_fetches.load(Ordering::SeqCst), 2);
}

// Invariant: concurrent senders never interleave bytes on the wire. The
// fake server parses the stream with strict framing; interleaved writes
// would corrupt the read_exact cadence and fail the test.
#[tokio::test]
async fn concurrent_writes_stay_framed() {
    let port = spawn_server(|_, payload| Some(payload)).await;

    let connection = Arc::new(Connection::new());
    connection.connect(port).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..32u32 {
        let conn = connection.clone();
        tasks.push(tokio::spawn(async move {
            let payload = vec![i as u8; 512 + i as usize];
            let frame = conn
                .send_request(
                    request_types::PING,
                    Some(payload.clone()),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            assert_eq!(frame.payload(), &payload[..]);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

// Invariant: after disconnect every pending caller resolves promptly.
#[tokio::test]
async fn disconnect_is_a_broadcast_cancellation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let connection = Arc::new(Connection::new());
    connection.connect(port).await.unwrap();

    let mut pending = Vec::new();
    for _ in 0..8 {
        let conn = connection.clone();
        pending.push(tokio::spawn(async move {
            conn.send_request(request_types::HIERARCHY, None, Duration::from_secs(30))
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    connection.disconnect();
    for task in pending {
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pending request must resolve after disconnect")
            .unwrap();
        assert!(matches!(result.unwrap_err(), LookinError::NotConnected));
    }
}
