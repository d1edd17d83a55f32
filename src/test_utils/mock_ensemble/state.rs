//! Shared ensemble state: data tree, sessions and per-connection watches.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use rand::RngCore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::proto::ConnectRequest;
use crate::proto::ConnectResponse;
use crate::proto::ReplyHeader;
use crate::proto::ReplyPacket;
use crate::proto::Request;
use crate::proto::Response;
use crate::proto::WatcherEvent;
use crate::proto::NOTIFICATION_XID;
use crate::utils::time::now_millis;
use crate::Acl;
use crate::CreateMode;
use crate::EventType;
use crate::Perms;
use crate::SessionState;
use crate::Stat;
use crate::ZkError;

pub(crate) const MIN_SESSION_TIMEOUT_MS: i32 = 200;
pub(crate) const MAX_SESSION_TIMEOUT_MS: i32 = 60_000;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) data: Vec<u8>,
    pub(crate) acl: Vec<Acl>,
    pub(crate) stat: Stat,
}

#[derive(Debug)]
struct SessionEntry {
    passwd: Vec<u8>,
    timeout_ms: i32,
    /// (scheme, id) pairs added through auth packets
    auth_ids: Vec<(String, String)>,
}

pub(crate) struct ConnEntry {
    pub(crate) session_id: i64,
    pub(crate) member: usize,
    pub(crate) outbox: mpsc::UnboundedSender<ReplyPacket>,
    pub(crate) cancel: CancellationToken,
    data_watches: HashSet<String>,
    exist_watches: HashSet<String>,
    child_watches: HashSet<String>,
}

impl ConnEntry {
    pub(crate) fn new(
        session_id: i64,
        member: usize,
        outbox: mpsc::UnboundedSender<ReplyPacket>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            member,
            outbox,
            cancel,
            data_watches: HashSet::new(),
            exist_watches: HashSet::new(),
            child_watches: HashSet::new(),
        }
    }

    /// Removes and reports whether any watch matching `event_type` exists.
    fn take_watch(
        &mut self,
        event_type: EventType,
        path: &str,
    ) -> bool {
        let mut hit = false;
        match event_type {
            EventType::Created | EventType::Changed => {
                hit |= self.data_watches.remove(path);
                hit |= self.exist_watches.remove(path);
            }
            EventType::Deleted => {
                hit |= self.data_watches.remove(path);
                hit |= self.exist_watches.remove(path);
                hit |= self.child_watches.remove(path);
            }
            EventType::Child => {
                hit |= self.child_watches.remove(path);
            }
            EventType::Session | EventType::NotWatching => {}
        }
        hit
    }
}

/// Result of handling one request on one connection.
pub(crate) struct Handled {
    /// Frames to write back in order (own notifications first)
    pub(crate) frames: Vec<ReplyPacket>,
    /// Close the connection after writing
    pub(crate) close: bool,
}

pub(crate) struct EnsembleState {
    zxid: i64,
    next_session: i64,
    next_conn: u64,
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<i64, SessionEntry>,
    pub(crate) connections: HashMap<u64, ConnEntry>,

    pub(crate) muted: bool,
    pub(crate) corrupt_next_xid: bool,
    pub(crate) ping_count: usize,
    pub(crate) requests_received: usize,
    pub(crate) connections_accepted: usize,
}

impl Default for EnsembleState {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                acl: Acl::open_unsafe(),
                stat: Stat::default(),
            },
        );
        Self {
            zxid: 0,
            next_session: 0x1000,
            next_conn: 1,
            nodes,
            sessions: HashMap::new(),
            connections: HashMap::new(),
            muted: false,
            corrupt_next_xid: false,
            ping_count: 0,
            requests_received: 0,
            connections_accepted: 0,
        }
    }
}

impl EnsembleState {
    pub(crate) fn handshake(
        &mut self,
        request: &ConnectRequest,
    ) -> ConnectResponse {
        let rejected = ConnectResponse {
            protocol_version: request.protocol_version,
            timeout_ms: 0,
            session_id: 0,
            passwd: Vec::new(),
        };

        if request.session_id != 0 {
            return match self.sessions.get(&request.session_id) {
                Some(session) if session.passwd == request.passwd => ConnectResponse {
                    protocol_version: request.protocol_version,
                    timeout_ms: session.timeout_ms,
                    session_id: request.session_id,
                    passwd: session.passwd.clone(),
                },
                _ => rejected,
            };
        }

        let session_id = self.next_session;
        self.next_session += 1;
        let mut passwd = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut passwd);
        let timeout_ms = request
            .timeout_ms
            .clamp(MIN_SESSION_TIMEOUT_MS, MAX_SESSION_TIMEOUT_MS);
        self.sessions.insert(
            session_id,
            SessionEntry {
                passwd: passwd.clone(),
                timeout_ms,
                auth_ids: Vec::new(),
            },
        );
        ConnectResponse {
            protocol_version: request.protocol_version,
            timeout_ms,
            session_id,
            passwd,
        }
    }

    pub(crate) fn register_connection(
        &mut self,
        entry: ConnEntry,
    ) -> u64 {
        let id = self.next_conn;
        self.next_conn += 1;
        self.connections.insert(id, entry);
        id
    }

    pub(crate) fn unregister_connection(
        &mut self,
        conn_id: u64,
    ) {
        self.connections.remove(&conn_id);
    }

    pub(crate) fn node(
        &self,
        path: &str,
    ) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub(crate) fn has_session(
        &self,
        session_id: i64,
    ) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Ends a session as the ensemble would on timeout: its ephemeral nodes
    /// go away and its connections are dropped.
    pub(crate) fn expire_session(
        &mut self,
        session_id: i64,
    ) {
        for conn in self.connections.values().filter(|c| c.session_id == session_id) {
            conn.cancel.cancel();
        }
        self.end_session(session_id, None);
    }

    fn end_session(
        &mut self,
        session_id: i64,
        origin: Option<u64>,
    ) -> Vec<ReplyPacket> {
        if self.sessions.remove(&session_id).is_none() {
            return Vec::new();
        }
        let ephemerals: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.stat.ephemeral_owner == session_id)
            .map(|(p, _)| p.clone())
            .collect();
        let mut own = Vec::new();
        for path in ephemerals {
            self.zxid += 1;
            self.remove_node(&path);
            own.extend(self.fire(EventType::Deleted, &path, origin));
            own.extend(self.fire(EventType::Child, &parent_of(&path), origin));
        }
        own
    }

    /// Handles one request received on `conn_id`.
    pub(crate) fn handle(
        &mut self,
        conn_id: u64,
        xid: i32,
        request: Request,
    ) -> Handled {
        let Some(session_id) = self.connections.get(&conn_id).map(|c| c.session_id) else {
            return Handled {
                frames: Vec::new(),
                close: true,
            };
        };

        let mut own = Vec::new();
        let mut close = false;
        let mut reply_xid = xid;

        let outcome: Result<Response, ZkError> = match request {
            Request::Ping => {
                self.ping_count += 1;
                Ok(Response::Empty)
            }
            Request::Auth { scheme, auth } => self.add_auth(session_id, scheme, auth),
            Request::CloseSession => {
                own = self.end_session(session_id, Some(conn_id));
                close = true;
                Ok(Response::Empty)
            }
            Request::SetWatches {
                relative_zxid,
                data_watches,
                exist_watches,
                child_watches,
            } => {
                own = self.set_watches(conn_id, relative_zxid, data_watches, exist_watches, child_watches);
                Ok(Response::Empty)
            }
            request => {
                if self.corrupt_next_xid {
                    self.corrupt_next_xid = false;
                    reply_xid = xid.wrapping_add(1000);
                }
                self.apply(conn_id, session_id, request, &mut own)
            }
        };

        let (err, response) = match outcome {
            Ok(response) => (0, response),
            Err(e) => (e.code(), Response::Empty),
        };
        own.push(ReplyPacket {
            header: ReplyHeader {
                xid: reply_xid,
                zxid: self.zxid,
                err,
            },
            response,
        });
        Handled { frames: own, close }
    }

    fn add_auth(
        &mut self,
        session_id: i64,
        scheme: String,
        auth: Vec<u8>,
    ) -> Result<Response, ZkError> {
        if scheme == "fail" {
            return Err(ZkError::AuthFailed);
        }
        let credential = String::from_utf8_lossy(&auth).to_string();
        let id = match scheme.as_str() {
            "digest" => credential.split(':').next().unwrap_or_default().to_string(),
            _ => credential,
        };
        if let Some(session) = self.sessions.get_mut(&session_id) {
            if !session.auth_ids.contains(&(scheme.clone(), id.clone())) {
                session.auth_ids.push((scheme, id));
            }
        }
        Ok(Response::Empty)
    }

    fn set_watches(
        &mut self,
        conn_id: u64,
        relative_zxid: i64,
        data_watches: Vec<String>,
        exist_watches: Vec<String>,
        child_watches: Vec<String>,
    ) -> Vec<ReplyPacket> {
        let mut fired = Vec::new();
        let mut rearm_data = Vec::new();
        let mut rearm_exist = Vec::new();
        let mut rearm_child = Vec::new();

        for path in data_watches {
            match self.nodes.get(&path) {
                None => fired.push((EventType::Deleted, path)),
                Some(n) if n.stat.mzxid > relative_zxid => fired.push((EventType::Changed, path)),
                Some(_) => rearm_data.push(path),
            }
        }
        for path in exist_watches {
            match self.nodes.get(&path) {
                Some(n) if n.stat.czxid > relative_zxid => fired.push((EventType::Created, path)),
                Some(n) if n.stat.mzxid > relative_zxid => fired.push((EventType::Changed, path)),
                _ => rearm_exist.push(path),
            }
        }
        for path in child_watches {
            match self.nodes.get(&path) {
                None => fired.push((EventType::Deleted, path)),
                Some(n) if n.stat.pzxid > relative_zxid => fired.push((EventType::Child, path)),
                Some(_) => rearm_child.push(path),
            }
        }

        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.data_watches.extend(rearm_data);
            conn.exist_watches.extend(rearm_exist);
            conn.child_watches.extend(rearm_child);
        }
        fired
            .into_iter()
            .map(|(event_type, path)| notification(event_type, &path))
            .collect()
    }

    fn apply(
        &mut self,
        conn_id: u64,
        session_id: i64,
        request: Request,
        own: &mut Vec<ReplyPacket>,
    ) -> Result<Response, ZkError> {
        match request {
            Request::Create {
                path,
                data,
                acl,
                flags,
            } => {
                let mode = CreateMode::from_flags(flags)?;
                if acl.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                let parent = parent_of(&path);
                let parent_node = self.nodes.get(&parent).ok_or(ZkError::NoNode)?;
                self.check_perm(session_id, parent_node, Perms::CREATE)?;
                if parent_node.stat.ephemeral_owner != 0 {
                    return Err(ZkError::NoChildrenForEphemerals);
                }
                let path = if mode.is_sequential() {
                    format!("{}{:010}", path, parent_node.stat.cversion)
                } else {
                    path
                };
                if self.nodes.contains_key(&path) {
                    return Err(ZkError::NodeExists);
                }
                let acl = self.resolve_acl(session_id, acl)?;

                self.zxid += 1;
                let now = now_millis();
                let stat = Stat {
                    czxid: self.zxid,
                    mzxid: self.zxid,
                    ctime: now,
                    mtime: now,
                    version: 0,
                    cversion: 0,
                    aversion: 0,
                    ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
                    data_length: data.len() as i32,
                    num_children: 0,
                    pzxid: self.zxid,
                };
                self.nodes.insert(path.clone(), Node { data, acl, stat });
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.stat.cversion += 1;
                    parent_node.stat.num_children += 1;
                    parent_node.stat.pzxid = self.zxid;
                }
                own.extend(self.fire(EventType::Created, &path, Some(conn_id)));
                own.extend(self.fire(EventType::Child, &parent, Some(conn_id)));
                Ok(Response::Create { path })
            }
            Request::Delete { path, version } => {
                if path == "/" {
                    return Err(ZkError::BadArguments);
                }
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                let parent = parent_of(&path);
                if let Some(parent_node) = self.nodes.get(&parent) {
                    self.check_perm(session_id, parent_node, Perms::DELETE)?;
                }
                if version != -1 && version != node.stat.version {
                    return Err(ZkError::BadVersion);
                }
                if node.stat.num_children > 0 {
                    return Err(ZkError::NotEmpty);
                }
                self.zxid += 1;
                self.remove_node(&path);
                own.extend(self.fire(EventType::Deleted, &path, Some(conn_id)));
                own.extend(self.fire(EventType::Child, &parent, Some(conn_id)));
                Ok(Response::Empty)
            }
            Request::Exists { path, watch } => {
                if watch {
                    self.arm(conn_id, |c| &mut c.exist_watches, &path);
                }
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                Ok(Response::Stat(node.stat))
            }
            Request::GetData { path, watch } => {
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                self.check_perm(session_id, node, Perms::READ)?;
                let response = Response::Data {
                    data: node.data.clone(),
                    stat: node.stat,
                };
                if watch {
                    self.arm(conn_id, |c| &mut c.data_watches, &path);
                }
                Ok(response)
            }
            Request::SetData { path, data, version } => {
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                self.check_perm(session_id, node, Perms::WRITE)?;
                if version != -1 && version != node.stat.version {
                    return Err(ZkError::BadVersion);
                }
                self.zxid += 1;
                let zxid = self.zxid;
                let stat = match self.nodes.get_mut(&path) {
                    Some(node) => {
                        node.stat.version += 1;
                        node.stat.mzxid = zxid;
                        node.stat.mtime = now_millis();
                        node.stat.data_length = data.len() as i32;
                        node.data = data;
                        node.stat
                    }
                    None => return Err(ZkError::NoNode),
                };
                own.extend(self.fire(EventType::Changed, &path, Some(conn_id)));
                Ok(Response::Stat(stat))
            }
            Request::GetChildren { path, watch } => {
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                self.check_perm(session_id, node, Perms::READ)?;
                let children = self.children_of(&path);
                if watch {
                    self.arm(conn_id, |c| &mut c.child_watches, &path);
                }
                Ok(Response::Children { children })
            }
            Request::GetAcl { path } => {
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                Ok(Response::Acl {
                    acl: node.acl.clone(),
                    stat: node.stat,
                })
            }
            Request::SetAcl { path, acl, version } => {
                let node = self.nodes.get(&path).ok_or(ZkError::NoNode)?;
                self.check_perm(session_id, node, Perms::ADMIN)?;
                if version != -1 && version != node.stat.aversion {
                    return Err(ZkError::BadVersion);
                }
                if acl.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                let acl = self.resolve_acl(session_id, acl)?;
                self.zxid += 1;
                match self.nodes.get_mut(&path) {
                    Some(node) => {
                        node.acl = acl;
                        node.stat.aversion += 1;
                        Ok(Response::Stat(node.stat))
                    }
                    None => Err(ZkError::NoNode),
                }
            }
            Request::Ping | Request::Auth { .. } | Request::SetWatches { .. } | Request::CloseSession => {
                Err(ZkError::Unimplemented)
            }
        }
    }

    fn arm(
        &mut self,
        conn_id: u64,
        set: impl FnOnce(&mut ConnEntry) -> &mut HashSet<String>,
        path: &str,
    ) {
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            set(conn).insert(path.to_string());
        }
    }

    fn remove_node(
        &mut self,
        path: &str,
    ) {
        self.nodes.remove(path);
        let zxid = self.zxid;
        if let Some(parent) = self.nodes.get_mut(&parent_of(path)) {
            parent.stat.cversion += 1;
            parent.stat.num_children -= 1;
            parent.stat.pzxid = zxid;
        }
    }

    fn children_of(
        &self,
        path: &str,
    ) -> Vec<String> {
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, _)| {
                let rest = &p[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    /// Sends the event to every live connection watching it. Frames for
    /// `origin` are returned so they precede that connection's own reply.
    fn fire(
        &mut self,
        event_type: EventType,
        path: &str,
        origin: Option<u64>,
    ) -> Vec<ReplyPacket> {
        let mut own = Vec::new();
        for (id, conn) in self.connections.iter_mut() {
            if conn.cancel.is_cancelled() || !conn.take_watch(event_type, path) {
                continue;
            }
            let frame = notification(event_type, path);
            if Some(*id) == origin {
                own.push(frame);
            } else {
                let _ = conn.outbox.send(frame);
            }
        }
        own
    }

    fn check_perm(
        &self,
        session_id: i64,
        node: &Node,
        perm: Perms,
    ) -> Result<(), ZkError> {
        let ids = self
            .sessions
            .get(&session_id)
            .map(|s| s.auth_ids.as_slice())
            .unwrap_or_default();
        let allowed = node.acl.iter().any(|entry| {
            entry.perms.contains(perm)
                && ((entry.scheme == "world" && entry.id == "anyone")
                    || ids.iter().any(|(scheme, id)| *scheme == entry.scheme && *id == entry.id))
        });
        if allowed {
            Ok(())
        } else {
            Err(ZkError::NoAuth)
        }
    }

    /// `auth` entries stand for every identity the session authenticated as.
    fn resolve_acl(
        &self,
        session_id: i64,
        acl: Vec<Acl>,
    ) -> Result<Vec<Acl>, ZkError> {
        let mut resolved = Vec::new();
        for entry in acl {
            if entry.scheme == "auth" {
                let ids = self
                    .sessions
                    .get(&session_id)
                    .map(|s| s.auth_ids.clone())
                    .unwrap_or_default();
                if ids.is_empty() {
                    return Err(ZkError::InvalidAcl);
                }
                resolved.extend(ids.into_iter().map(|(scheme, id)| Acl::new(entry.perms, scheme, id)));
            } else {
                resolved.push(entry);
            }
        }
        Ok(resolved)
    }
}

pub(crate) fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn notification(
    event_type: EventType,
    path: &str,
) -> ReplyPacket {
    ReplyPacket {
        header: ReplyHeader {
            xid: NOTIFICATION_XID,
            zxid: -1,
            err: 0,
        },
        response: Response::Notification(WatcherEvent {
            event_type: event_type.code(),
            state: SessionState::Connected.code(),
            path: path.to_string(),
        }),
    }
}
