//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **LoopBuilder**: ループの構築とワイヤリング
//! - **IterationLoop**: 評価・保存・リトライ・ログをつなぐ実行ループ
//! - **IterationTracker**: 実行全体の進行状態
//! - **ErrorReporter**: エラー報告・通知・リカバリ
//! - **LogReport**: イテレーションログの集計

pub mod builder;
pub mod error_reporter;
pub mod iteration_loop;
pub mod report;
pub mod tracker;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, LoopBuilder};
pub use self::error_reporter::{ErrorNotifier, ErrorReporter, NotifyError};
pub use self::iteration_loop::{IterationLoop, LoopError, LoopSummary, PERFORMANCE_METRIC};
pub use self::report::LogReport;
pub use self::tracker::{IterationTracker, TrackerError};
