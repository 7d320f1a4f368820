//! `deploybar-reconcile`: turns freshly fetched deploys and feed items into
//! buckets and notification decisions.
//!
//! Everything here is synchronous and free of I/O. The only state kept
//! between calls is the last observed snapshot ([`DeployTracker`],
//! [`IncidentFeed`]).

pub mod deploys;
pub mod feed;

pub use deploys::{
    classify_deploys, current_deploy, notification_for_deploy_transition, pending_badge,
    DeployBuckets, DeployTracker,
};
pub use feed::{
    find_new_items, find_updated_items, incident_notifications, recent_items, IncidentFeed,
};
