//! Membership records and export loading

mod data;
pub mod loader;
mod summary;

pub use data::{MemberPayment, MembershipRecord, MembershipSnapshot, UNKNOWN_TYPE};
pub(crate) use data::type_label;
pub use loader::{load_members, load_members_from_reader, LoadedMembers, MemberRow};
pub use summary::TenureSummary;
