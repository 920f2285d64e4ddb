//! The switch data model: state machine, check-in history,
//! persistence, and the creation/release pipelines that fill in and
//! later consume its commit material.

pub mod creation;
pub mod model;
pub mod release;
pub mod store;
pub mod wrapped_key;

pub use creation::{prepare_switch, CreationError, PreparedSwitch};
pub use model::{CheckinRecord, ShareMeta, Switch, SwitchError, SwitchState};
pub use release::{recover_message, ReleaseError};
pub use store::{FileSwitchStore, InMemorySwitchStore, StoreError, SwitchStore};
pub use wrapped_key::WrappedPrivateKey;
