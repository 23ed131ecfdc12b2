pub mod dialog;
pub mod engine;
pub mod states;

pub use dialog::{advance as advance_dialog, DialogAdvance, DialogCommit};
pub use engine::{CompletedFields, FieldProgress, FunnelEngine, TransitionOutcome};
pub use states::{FieldValue, FunnelState, FunnelStep};
