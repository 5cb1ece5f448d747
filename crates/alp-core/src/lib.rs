//! alp-core
//!
//! Bookkeeping for an iterative learning process: iteration state tracking,
//! termination rules, retry with backoff, per-iteration persistence and an
//! append-only iteration log.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, iteration, termination, events, errors）
//! - **retry**: BackoffPolicy と RetryExecutor
//! - **ports**: 抽象化レイヤー（Clock, Sleeper, IdGenerator, EventSink, IterationStateStore）
//! - **impls**: 実装（FileStateStore, JsonlEventSink, InMemory 系）
//! - **app**: アプリケーションロジック（LoopBuilder, IterationLoop, IterationTracker, ErrorReporter, LogReport）
//! - **config**: 設定の読み込み（defaults < TOML file < `ALP__*` env）
//! - **observability**: ステータス集計

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod retry;

pub use self::error::AlpError;
