//! Replicated field store.
//!
//! Every networked entity carries a fixed set of server-owned fields,
//! declared once in a static descriptor table ([`field`]). The server
//! writes them through [`FieldStore`], which yields an ordered
//! [`ChangeRecord`] for each effective change. Clients keep a
//! [`ShadowFields`] copy that applies those records and may be tweaked
//! locally, but local edits are never sent anywhere and are overwritten by
//! the next server update.
//!
//! Both sides run the same change hooks, so UI code reacts to
//! [`ReplicaEvent`]s identically on the server and on every client.

pub mod field;
mod shadow;
mod store;

pub use field::{
    descriptor, ChangeRecord, FieldDescriptor, FieldId, FieldType, FieldValue, ReplicaEvent,
};
pub use shadow::ShadowFields;
pub use store::{Caller, FieldStore};
