//! Typed operations over the transport.
//!
//! Each operation builds its payload value, archives it, sends one frame,
//! and decodes the response envelope. A non-null envelope `error` becomes
//! `ServerError`; a `data` field of the wrong shape becomes `InvalidFrame`.
//! The transport performs no retries - each timeout below is a deadline
//! measured from send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::archive::classes::{
    AppInfo, AttributeModification, AttributesGroup, ConnectionResponse, DisplayItemDetail,
    HierarchyInfo, VOID_RETURN_SENTINEL,
};
use crate::archive::{encode_attachment, ArchiveValue};
use crate::error::{LookinError, Result};
use crate::protocol::request_types;
use crate::transport::Connection;

/// Default deadlines per operation, measured from send.
pub mod timeouts {
    use std::time::Duration;

    pub const PING: Duration = Duration::from_secs(5);
    pub const APP_INFO: Duration = Duration::from_secs(10);
    pub const HIERARCHY: Duration = Duration::from_secs(15);
    pub const ATTR_GROUPS: Duration = Duration::from_secs(15);
    pub const MODIFY: Duration = Duration::from_secs(10);
    pub const INVOKE: Duration = Duration::from_secs(10);
    pub const SELECTORS: Duration = Duration::from_secs(10);
}

/// Attribute identifiers that carry user-visible text.
pub const TEXT_ATTR_IDENTIFIERS: &[&str] = &["lb_t_t", "tf_t_t", "tf_p_p", "te_t_t"];

/// Separator used when one view carries several text strings.
const TEXT_JOIN_SEPARATOR: &str = " | ";

/// Classes whose instances can carry user-visible text.
const TEXT_BEARING_CLASSES: &[&str] = &["UILabel", "UITextField", "UITextView"];

/// Upper bound on in-flight attribute fetches during text enrichment. The
/// agent serves a single TCP client, so wider fan-out buys no speedup and
/// can exhaust its buffers.
pub const DEFAULT_TEXT_CONCURRENCY: usize = 10;

/// Result of a ping.
#[derive(Debug, Clone, Copy)]
pub struct PingStatus {
    pub app_is_in_background: bool,
}

/// Result of a method invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The method returned `void`.
    Void,
    /// Description of the returned value.
    Description(String),
}

/// Typed request layer over one [`Connection`].
pub struct RequestManager {
    connection: Arc<Connection>,
}

impl RequestManager {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Send one request and decode the response envelope, surfacing the
    /// envelope error if present. An empty payload decodes as an empty
    /// envelope (the agent answers pings that way from the foreground).
    async fn request_envelope(
        &self,
        frame_type: u32,
        payload: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<ConnectionResponse> {
        let frame = self
            .connection
            .send_request(frame_type, payload, timeout)
            .await?;

        let response = if frame.payload().is_empty() {
            ConnectionResponse::empty()
        } else {
            ConnectionResponse::from_bytes(frame.payload())?
        };

        if let Some(message) = response.error {
            return Err(LookinError::ServerError(message));
        }
        Ok(response)
    }

    /// Liveness check (request code 200).
    pub async fn ping(&self) -> Result<PingStatus> {
        let response = self
            .request_envelope(request_types::PING, None, timeouts::PING)
            .await?;
        Ok(PingStatus {
            app_is_in_background: response.app_is_in_background,
        })
    }

    /// Fetch app metadata (request code 201).
    ///
    /// Older agents occasionally answer with a full `LookinHierarchyInfo`;
    /// its `appInfo` field is used in that case.
    pub async fn app_info(&self) -> Result<AppInfo> {
        let mut params = HashMap::new();
        params.insert("needImages".to_string(), ArchiveValue::Bool(false));
        params.insert("local".to_string(), ArchiveValue::Array(vec![]));
        let payload = encode_attachment(&ArchiveValue::Dict(params))?;

        let response = self
            .request_envelope(request_types::APP, Some(payload), timeouts::APP_INFO)
            .await?;

        if let Ok(info) = AppInfo::from_value(&response.data) {
            return Ok(info);
        }
        if let Ok(hierarchy) = HierarchyInfo::from_value(&response.data) {
            if let Some(info) = hierarchy.app_info {
                return Ok(info);
            }
        }
        Err(LookinError::InvalidFrame(
            "app info response is neither LookinAppInfo nor LookinHierarchyInfo".into(),
        ))
    }

    /// Fetch the full display-item hierarchy (request code 202).
    pub async fn hierarchy(&self) -> Result<HierarchyInfo> {
        let response = self
            .request_envelope(request_types::HIERARCHY, None, timeouts::HIERARCHY)
            .await?;
        HierarchyInfo::from_value(&response.data)
    }

    /// Fetch every attribute group for a layer (request code 210).
    pub async fn all_attr_groups(&self, layer_oid: u64) -> Result<Vec<AttributesGroup>> {
        let payload = encode_attachment(&ArchiveValue::Integer(layer_oid as i64))?;
        let response = self
            .request_envelope(
                request_types::ALL_ATTR_GROUPS,
                Some(payload),
                timeouts::ATTR_GROUPS,
            )
            .await?;

        response
            .data
            .as_array()
            .ok_or_else(|| LookinError::InvalidFrame("attribute groups are not a list".into()))?
            .iter()
            .map(AttributesGroup::from_value)
            .collect()
    }

    /// Apply one attribute modification (request code 204).
    pub async fn modify_attribute(
        &self,
        modification: &AttributeModification,
    ) -> Result<DisplayItemDetail> {
        let payload = encode_attachment(&modification.to_value())?;
        let response = self
            .request_envelope(
                request_types::INBUILT_ATTR_MODIFICATION,
                Some(payload),
                timeouts::MODIFY,
            )
            .await?;
        DisplayItemDetail::from_value(&response.data)
    }

    /// Invoke a zero-argument method (request code 206).
    pub async fn invoke_method(&self, oid: u64, selector: &str) -> Result<InvokeOutcome> {
        let mut params = HashMap::new();
        params.insert("oid".to_string(), ArchiveValue::Integer(oid as i64));
        params.insert(
            "text".to_string(),
            ArchiveValue::String(selector.to_string()),
        );
        let payload = encode_attachment(&ArchiveValue::Dict(params))?;

        let response = self
            .request_envelope(
                request_types::INVOKE_METHOD,
                Some(payload),
                timeouts::INVOKE,
            )
            .await?;

        let description = response
            .data
            .as_dict()
            .and_then(|d| d.get("description"))
            .and_then(ArchiveValue::as_str)
            .ok_or_else(|| {
                LookinError::InvalidFrame("invoke response has no description".into())
            })?;

        if description == VOID_RETURN_SENTINEL {
            Ok(InvokeOutcome::Void)
        } else {
            Ok(InvokeOutcome::Description(description.to_string()))
        }
    }

    /// List selector names for a class (request code 213).
    pub async fn list_selectors(&self, class_name: &str, has_arg: bool) -> Result<Vec<String>> {
        let mut params = HashMap::new();
        params.insert(
            "className".to_string(),
            ArchiveValue::String(class_name.to_string()),
        );
        params.insert("hasArg".to_string(), ArchiveValue::Bool(has_arg));
        let payload = encode_attachment(&ArchiveValue::Dict(params))?;

        let response = self
            .request_envelope(
                request_types::ALL_SELECTOR_NAMES,
                Some(payload),
                timeouts::SELECTORS,
            )
            .await?;

        response
            .data
            .as_array()
            .ok_or_else(|| LookinError::InvalidFrame("selector list is not a list".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| LookinError::InvalidFrame("selector name is not a string".into()))
            })
            .collect()
    }

    /// Collect user-visible text for every text-bearing view in `hierarchy`.
    ///
    /// Fetches attribute groups in chunks of at most `concurrency` in-flight
    /// requests; a chunk must fully drain before the next one starts.
    /// Per-view failures are swallowed - those views simply get no entry.
    pub async fn fetch_text_content_map(
        &self,
        hierarchy: &HierarchyInfo,
        concurrency: usize,
    ) -> HashMap<u64, String> {
        let mut targets: Vec<(u64, u64)> = Vec::new();
        hierarchy.walk(|item, _depth| {
            if is_text_bearing(item) {
                targets.push((item.view_oid(), item.layer_oid()));
            }
        });

        tracing::debug!(count = targets.len(), "enriching text-bearing views");

        let mut map = HashMap::new();
        for chunk in targets.chunks(concurrency.max(1)) {
            let fetches = chunk.iter().map(|&(view_oid, layer_oid)| async move {
                match self.all_attr_groups(layer_oid).await {
                    Ok(groups) => extract_text(&groups).map(|text| (view_oid, text)),
                    Err(e) => {
                        tracing::debug!(view_oid, layer_oid, error = %e, "text fetch failed");
                        None
                    }
                }
            });
            map.extend(join_all(fetches).await.into_iter().flatten());
        }
        map
    }
}

/// Whether a display item's class chain marks it as text-bearing.
fn is_text_bearing(item: &crate::archive::classes::DisplayItem) -> bool {
    item.class_chain_matches(|class| TEXT_BEARING_CLASSES.iter().any(|t| class.contains(t)))
}

/// Pull the non-empty text attribute values out of `groups`, joined with
/// [`TEXT_JOIN_SEPARATOR`]. `None` when the view carries no text.
fn extract_text(groups: &[AttributesGroup]) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for group in groups {
        for section in &group.sections {
            for attr in &section.attributes {
                if !TEXT_ATTR_IDENTIFIERS.contains(&attr.identifier.as_str()) {
                    continue;
                }
                if let Some(text) = attr.value.as_str() {
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(TEXT_JOIN_SEPARATOR))
    }
}
