//! Session: one server target, one connection, and the multi-request caches.
//!
//! The MCP dispatcher runs tool calls serially, so the session does not
//! synchronize beyond what the transport already provides. Cache policy:
//! re-fetching the hierarchy clears the text map, a successful modification
//! clears the text map, and `disconnect` clears both.

use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::classes::{
    AppInfo, AttributeModification, AttributesGroup, DisplayItemDetail, HierarchyInfo,
};
use crate::attributes::{self, AttributeMapping, TargetKind};
use crate::error::{LookinError, Result};
use crate::requests::{InvokeOutcome, PingStatus, RequestManager, DEFAULT_TEXT_CONCURRENCY};
use crate::transport::{self, Connection, ConnectionState, DEFAULT_PROBE_TIMEOUT};

/// A connected (or connectable) LookinServer target plus cached state.
#[derive(Default)]
pub struct Session {
    manager: Option<RequestManager>,
    cached_hierarchy: Option<HierarchyInfo>,
    cached_text_map: Option<HashMap<u64, String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.manager
            .as_ref()
            .map(|m| m.connection().state() == ConnectionState::Ready)
            .unwrap_or(false)
    }

    fn manager(&self) -> Result<&RequestManager> {
        match &self.manager {
            Some(m) if m.connection().state() == ConnectionState::Ready => Ok(m),
            _ => Err(LookinError::NotConnected),
        }
    }

    /// Connect to `port`, or probe the well-known range when `port` is None.
    ///
    /// Returns the port actually connected to.
    pub async fn connect(&mut self, port: Option<u16>) -> Result<u16> {
        if self.is_connected() {
            return Err(LookinError::AlreadyConnected);
        }
        // A previous connection may have died underneath us; start clean.
        self.drop_connection();

        let port = match port {
            Some(p) => p,
            None => transport::find_first(transport::PORT_RANGE, DEFAULT_PROBE_TIMEOUT)
                .await
                .ok_or_else(|| {
                    LookinError::ConnectionFailed(format!(
                        "no LookinServer found on 127.0.0.1 ports {}-{}",
                        transport::PORT_RANGE.start(),
                        transport::PORT_RANGE.end()
                    ))
                })?,
        };

        let connection = Arc::new(Connection::new());
        connection.connect(port).await?;
        self.manager = Some(RequestManager::new(connection));
        Ok(port)
    }

    /// Tear down the connection and clear every cache.
    pub fn disconnect(&mut self) {
        self.drop_connection();
    }

    fn drop_connection(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.connection().disconnect();
        }
        self.cached_hierarchy = None;
        self.cached_text_map = None;
    }

    /// Liveness check. A transport failure drops the connection so the next
    /// call starts from `Idle`.
    pub async fn ping(&mut self) -> Result<PingStatus> {
        let result = self.manager()?.ping().await;
        if let Err(e) = &result {
            if e.is_transport() {
                tracing::debug!(error = %e, "ping failed, dropping connection");
                self.drop_connection();
            }
        }
        result
    }

    pub async fn app_info(&self) -> Result<AppInfo> {
        self.manager()?.app_info().await
    }

    /// Fetch the hierarchy (or reuse the cache). A fresh fetch invalidates
    /// the text map. Transport failures drop the connection.
    pub async fn hierarchy(&mut self, refresh: bool) -> Result<HierarchyInfo> {
        if !refresh {
            if let Some(cached) = &self.cached_hierarchy {
                return Ok(cached.clone());
            }
        }

        match self.manager()?.hierarchy().await {
            Ok(info) => {
                self.cached_hierarchy = Some(info.clone());
                self.cached_text_map = None;
                Ok(info)
            }
            Err(e) => {
                if e.is_transport() {
                    tracing::debug!(error = %e, "hierarchy fetch failed, dropping connection");
                    self.drop_connection();
                }
                Err(e)
            }
        }
    }

    /// The view-oid → text mapping for the current hierarchy, computing and
    /// caching it on first use.
    pub async fn text_map(&mut self) -> Result<HashMap<u64, String>> {
        if let Some(cached) = &self.cached_text_map {
            return Ok(cached.clone());
        }

        let hierarchy = self.hierarchy(false).await?;
        let map = self
            .manager()?
            .fetch_text_content_map(&hierarchy, DEFAULT_TEXT_CONCURRENCY)
            .await;
        self.cached_text_map = Some(map.clone());
        Ok(map)
    }

    /// Attribute groups for the layer behind `oid` (view oids are
    /// translated through the cached hierarchy).
    pub async fn view_detail(&self, oid: u64) -> Result<Vec<AttributesGroup>> {
        let layer_oid = self.resolve_target(oid, TargetKind::Layer);
        self.manager()?.all_attr_groups(layer_oid).await
    }

    /// Parse and apply one attribute modification. On success the text map
    /// is invalidated - the visible text may have changed.
    pub async fn modify(
        &mut self,
        oid: u64,
        attribute_name: &str,
        raw_value: &str,
    ) -> Result<(DisplayItemDetail, &'static AttributeMapping)> {
        let mapping = attributes::lookup(attribute_name)?;
        let value = attributes::parse_value(mapping, raw_value)?;
        if mapping.needs_patch {
            tracing::debug!(attribute = mapping.name, "setter requires the agent's method patch");
        }

        let modification = AttributeModification {
            target_oid: self.resolve_target(oid, mapping.target),
            setter_selector: mapping.setter.to_string(),
            attr_type: mapping.attr_type.code(),
            value,
        };

        let detail = self.manager()?.modify_attribute(&modification).await?;
        self.cached_text_map = None;
        Ok((detail, mapping))
    }

    pub async fn invoke(&self, oid: u64, selector: &str) -> Result<InvokeOutcome> {
        self.manager()?.invoke_method(oid, selector).await
    }

    pub async fn selectors(&self, class_name: &str, has_arg: bool) -> Result<Vec<String>> {
        self.manager()?.list_selectors(class_name, has_arg).await
    }

    /// Translate `oid` to the requested target kind using the cached
    /// hierarchy. Without a cache (or for an unknown oid) the input is
    /// passed through unchanged - the agent accepts either for some
    /// properties.
    pub fn resolve_target(&self, oid: u64, kind: TargetKind) -> u64 {
        let Some(hierarchy) = &self.cached_hierarchy else {
            return oid;
        };
        let Some(item) = hierarchy.find_by_oid(oid) else {
            return oid;
        };
        match kind {
            TargetKind::View if item.view_oid() != 0 => item.view_oid(),
            TargetKind::Layer => item.layer_oid(),
            _ => oid,
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_hierarchy(&mut self, hierarchy: HierarchyInfo) {
        self.cached_hierarchy = Some(hierarchy);
    }
}
