//! State observer: normalized page snapshots, change detection and action verification.

pub mod catalog;
pub mod differ;
pub mod errors;
pub mod model;
pub mod observer;
pub mod ports;
pub mod verify;

pub use differ::{detect_change, detect_change_with_threshold};
pub use errors::ObserveError;
pub use model::{
    ChangeSet, LoadPhase, Observation, ObserverConfig, StateChange, StructureSignal, Verification,
};
pub use observer::{content_hash, StateObserver};
pub use ports::{PageProbe, ScriptPort};
pub use verify::{
    verify_click_navigation, verify_navigation, verify_selected_value, verify_typed_text,
};
