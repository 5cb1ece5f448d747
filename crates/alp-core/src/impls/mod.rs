//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FileStateStore**: `<state_dir>/<id>.json` に保存する本番用ストア
//! - **InMemoryStateStore**: テスト・組み込み用
//! - **JsonlEventSink**: JSON lines ファイルへの追記
//! - **NoopEventSink** / **InMemoryEventSink**

pub mod fs_store;
pub mod inmem_sink;
pub mod inmem_store;
pub mod jsonl_sink;

// 主要な型を再エクスポート
pub use self::fs_store::FileStateStore;
pub use self::inmem_sink::{InMemoryEventSink, NoopEventSink};
pub use self::inmem_store::InMemoryStateStore;
pub use self::jsonl_sink::{JsonlEventSink, LogReadError};
