// RPC method name constants.

// ── Daemon-internal ────────────────────────────────────────────────
pub const RPC_PING: &str = "rpc.ping";
pub const DAEMON_SHUTDOWN: &str = "daemon.shutdown";

// ── Document ───────────────────────────────────────────────────────
pub const DOC_CREATE: &str = "doc.create";
pub const DOC_OPEN: &str = "doc.open";
pub const DOC_CLOSE: &str = "doc.close";
pub const DOC_APPLY_CHANGESET: &str = "doc.apply_changeset";
pub const DOC_OUTLINE: &str = "doc.outline";
pub const DOC_INFO: &str = "doc.info";
pub const DOC_RECENT: &str = "doc.recent";
pub const DOC_SEARCH: &str = "doc.search";
pub const DOC_TRASH: &str = "doc.trash";
pub const DOC_RECOVER: &str = "doc.recover";
pub const DOC_DELETE_PERMANENTLY: &str = "doc.delete_permanently";
pub const DOC_FETCH_TRASH: &str = "doc.fetch_trash";

// ── Subscriptions ──────────────────────────────────────────────────
pub const DOC_SUBSCRIBE: &str = "doc.subscribe";
pub const DOC_UNSUBSCRIBE: &str = "doc.unsubscribe";
pub const DOCLIST_SUBSCRIBE: &str = "doclist.subscribe";
pub const DOCLIST_UNSUBSCRIBE: &str = "doclist.unsubscribe";

// ── Graph / blobs ──────────────────────────────────────────────────
pub const GRAPH_GET: &str = "graph.get";
pub const BLOB_STORE: &str = "blob.store";
pub const BLOB_GET: &str = "blob.get";

/// All methods the daemon currently dispatches.
pub const IMPLEMENTED_METHODS: &[&str] = &[
    RPC_PING,
    DAEMON_SHUTDOWN,
    DOC_CREATE,
    DOC_OPEN,
    DOC_CLOSE,
    DOC_APPLY_CHANGESET,
    DOC_OUTLINE,
    DOC_INFO,
    DOC_RECENT,
    DOC_SEARCH,
    DOC_TRASH,
    DOC_RECOVER,
    DOC_DELETE_PERMANENTLY,
    DOC_FETCH_TRASH,
    DOC_SUBSCRIBE,
    DOC_UNSUBSCRIBE,
    DOCLIST_SUBSCRIBE,
    DOCLIST_UNSUBSCRIBE,
    GRAPH_GET,
    BLOB_STORE,
    BLOB_GET,
];
