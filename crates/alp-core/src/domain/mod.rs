//! Domain - ドメインモデル
//!
//! ids, status, iteration state, termination rules, events, errors.
//!
//! Nothing in here touches the filesystem or the clock directly; timestamps are
//! passed in or taken at the transition call.

pub mod errors;
pub mod events;
pub mod ids;
pub mod iteration;
pub mod state;
pub mod termination;

pub use self::errors::{Classify, ErrorKind, ErrorSeverity, TransitionError, UnknownSeverity};
pub use self::events::{DomainEvent, ErrorReport, IterationLogEntry, TerminationEvent};
pub use self::ids::{EventId, Id, IdMarker, InvalidIterationId, IterationId};
pub use self::iteration::{Attributes, IterationState, RecordError};
pub use self::state::{IterationStatus, UnknownStatus};
pub use self::termination::{TerminationDecision, TerminationEvaluator, TerminationReason};
