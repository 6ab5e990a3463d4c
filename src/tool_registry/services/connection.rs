//! Live session bookkeeping.

use crate::tool_registry::{domain::McpServerId, ports::McpSession};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// At most one live session per server.
#[derive(Default)]
pub(super) struct ConnectionTable {
    sessions: RwLock<HashMap<McpServerId, Arc<dyn McpSession>>>,
}

impl ConnectionTable {
    pub(super) fn get(&self, server_id: &McpServerId) -> Option<Arc<dyn McpSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .cloned()
    }

    pub(super) fn contains(&self, server_id: &McpServerId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(server_id)
    }

    fn insert(
        &self,
        server_id: McpServerId,
        session: Arc<dyn McpSession>,
    ) -> Option<Arc<dyn McpSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server_id, session)
    }

    pub(super) fn remove(&self, server_id: &McpServerId) -> Option<Arc<dyn McpSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
    }

    /// Removes the entry only while it still holds `session`.
    fn remove_session(&self, server_id: &McpServerId, session: &Arc<dyn McpSession>) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let matches = sessions
            .get(server_id)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if matches {
            sessions.remove(server_id);
        }
        matches
    }

    pub(super) fn drain(&self) -> Vec<(McpServerId, Arc<dyn McpSession>)> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }
}

/// A session registered in the table for the duration of a connection
/// attempt.
///
/// Unless [`ScopedConnection::commit`] is called, the session is removed
/// from the table and closed: explicitly through
/// [`ScopedConnection::release`], or from `Drop` when the attempt is
/// cancelled.
pub(super) struct ScopedConnection<'table> {
    table: &'table ConnectionTable,
    server_id: McpServerId,
    session: Arc<dyn McpSession>,
    armed: bool,
}

impl<'table> ScopedConnection<'table> {
    pub(super) fn open(
        table: &'table ConnectionTable,
        server_id: McpServerId,
        session: Arc<dyn McpSession>,
    ) -> Self {
        if let Some(stale) = table.insert(server_id.clone(), Arc::clone(&session)) {
            close_in_background(&server_id, stale);
        }
        Self {
            table,
            server_id,
            session,
            armed: true,
        }
    }

    pub(super) const fn session(&self) -> &Arc<dyn McpSession> {
        &self.session
    }

    /// Keeps the session in the table.
    pub(super) fn commit(mut self) {
        self.armed = false;
    }

    /// Removes and closes the session.
    pub(super) async fn release(mut self) {
        self.armed = false;
        self.table.remove_session(&self.server_id, &self.session);
        self.session.close().await;
    }
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.table.remove_session(&self.server_id, &self.session);
        close_in_background(&self.server_id, Arc::clone(&self.session));
    }
}

/// Closes a session on the current runtime without awaiting it. Outside a
/// runtime the session is only dropped.
pub(super) fn close_in_background(server_id: &McpServerId, session: Arc<dyn McpSession>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { session.close().await });
        }
        Err(_) => debug!(server_id = %server_id, "no runtime available to close MCP session"),
    }
}
