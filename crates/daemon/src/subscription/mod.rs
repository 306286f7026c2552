// Subscriber bookkeeping and push fan-out: per-document content channels, the
// global document-list channel, and debounced outline pushes.

pub mod debounce;
pub mod doc_content;
pub mod doc_list;
pub mod outline_notifier;
pub mod sink;

pub use debounce::{Coalescer, DebounceConfig};
pub use doc_content::DocContentSubscriptions;
pub use doc_list::DocListSubscriptions;
pub use outline_notifier::OutlineNotifier;
pub use sink::{BroadcastPushSink, PushSink};
