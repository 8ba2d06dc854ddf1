mod bulk_sync;
mod roles;
mod user_sync;

pub use bulk_sync::{
    BulkSyncClient, BulkSyncError, CompanyMembership, CompanyRef, ExternalUserRecord, SyncReport,
};
pub use roles::{DEFAULT_ROLE_MAPPING, RoleMapper};
pub use user_sync::{COMPANY_ID_KEY, SyncError, SyncRequest, UserSyncService};
